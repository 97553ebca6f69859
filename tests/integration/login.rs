// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//! Test a complete login through an identity provider.

use async_trait::async_trait;
use eyre::Report;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

use identity_broker::error::ErrorCause;
use identity_broker::idp::{
    CredentialVerifier, Credentials, IdpError, IdpKind, LoginProvider, VerifiedUser,
};
use identity_broker::meeting::WaitContext;
use identity_broker::store::Pool;

use crate::common::get_pool;

/// Accepts a single token.
struct StaticToken;

#[async_trait]
impl CredentialVerifier for StaticToken {
    async fn verify(&self, credentials: &Credentials) -> Result<VerifiedUser, IdpError> {
        match credentials {
            Credentials::Token { token } if token.expose_secret() == "t0ken" => Ok(VerifiedUser {
                id: "42".into(),
                name: "carol".into(),
                groups: vec!["admins".into()],
                ..Default::default()
            }),
            _ => Err(IdpError::VerificationFailed("unknown token".into())),
        }
    }
}

fn provider(pool: &Pool) -> Result<LoginProvider, Report> {
    Ok(LoginProvider::from_config(
        IdpKind::Token,
        "sso",
        Some("sso".into()),
        pool.config(),
        Arc::new(StaticToken),
    )?)
}

#[tokio::test]
async fn test_login() -> Result<(), Report> {
    let (_dir, pool) = get_pool(4, "").await?;
    let provider = provider(&pool)?;

    let interaction = provider.begin_interaction("w1")?;
    assert_eq!(
        "https://idm.example.com/login/sso/token?id=w1",
        interaction.url.as_str()
    );

    let waiter = {
        let pool = pool.clone();
        let provider = provider.clone();
        tokio::spawn(async move {
            provider
                .wait_for_login(&pool, &WaitContext::default(), "w1")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let completed = provider
        .complete_interaction(
            &pool,
            "w1",
            &Credentials::Token {
                token: "t0ken".into(),
            },
        )
        .await?;
    let identity = waiter.await??;
    assert_eq!("carol@sso", identity.username);
    assert_eq!(Some("sso:42".to_string()), identity.external_id);
    assert_eq!(vec!["admins@sso"], identity.groups);
    assert_eq!(completed.username, identity.username);
    Ok(())
}

#[tokio::test]
async fn test_login_rejected() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let provider = provider(&pool)?;

    let err = provider
        .complete_interaction(
            &pool,
            "w1",
            &Credentials::Token {
                token: "wrong".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IdpError::VerificationFailed(..)));

    let err = provider
        .complete_interaction(
            &pool,
            "w1",
            &Credentials::Password {
                username: "carol".into(),
                password: "t0ken".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(ErrorCause::InvalidData, err.cause());

    // Nothing was handed over.
    assert!(pool.acquire().await?.get("w1").await.is_err());
    Ok(())
}
