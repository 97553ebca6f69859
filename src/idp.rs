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

//! # Login variants
//!
//! A closed set of ways for a human to log in. Every variant verifies the
//! supplied credentials through a [`CredentialVerifier`], records the user
//! in the identity repository and hands the username to the request waiting
//! on the rendezvous id of the interaction.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::error::{BrokerError, ErrorCause};
use crate::identity::IdentityProviderError;
use crate::identity::types::Identity;
use crate::meeting::{MeetingError, WaitContext};
use crate::store::{Pool, StoreError};

#[derive(Error, Debug)]
pub enum IdpError {
    #[error("{got} credentials cannot be used for a {expected} login")]
    KindMismatch { expected: IdpKind, got: IdpKind },

    #[error("login failed: {0}")]
    VerificationFailed(String),

    #[error("no public location of the broker configured")]
    NoLocation,

    #[error("cannot build interaction url: {source}")]
    Url {
        #[from]
        source: url::ParseError,
    },

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
    },

    #[error(transparent)]
    Meeting {
        #[from]
        source: MeetingError,
    },

    #[error(transparent)]
    Store {
        #[from]
        source: StoreError,
    },
}

impl IdpError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::KindMismatch { .. } | Self::VerificationFailed(..) => ErrorCause::InvalidData,
            Self::NoLocation | Self::Url { .. } => ErrorCause::Internal,
            Self::Identity { source } => source.cause(),
            Self::Meeting { source } => source.cause(),
            Self::Store { source } => source.cause(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IdpKind {
    /// Interactive login through a web page.
    Password,
    /// Login with a token issued by the provider.
    Token,
    /// Non interactive username and password form.
    Form,
}

impl fmt::Display for IdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Password => "password",
            Self::Token => "token",
            Self::Form => "form",
        })
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Password {
        username: String,
        password: SecretString,
    },
    Token {
        token: SecretString,
    },
    Form {
        username: String,
        password: SecretString,
    },
}

impl Credentials {
    pub fn kind(&self) -> IdpKind {
        match self {
            Self::Password { .. } => IdpKind::Password,
            Self::Token { .. } => IdpKind::Token,
            Self::Form { .. } => IdpKind::Form,
        }
    }
}

/// User as reported by the external identity provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VerifiedUser {
    /// Stable identifier at the provider.
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub groups: Vec<String>,
}

/// Checks credentials against the external identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credentials: &Credentials) -> Result<VerifiedUser, IdpError>;
}

/// Where the user completes a login.
#[derive(Clone, Debug, PartialEq)]
pub struct Interaction {
    pub kind: IdpKind,
    pub url: Url,
}

#[derive(Clone)]
pub struct LoginProvider {
    kind: IdpKind,
    name: String,
    domain: Option<String>,
    location: Url,
    verifier: Arc<dyn CredentialVerifier>,
}

impl fmt::Debug for LoginProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginProvider")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("location", &self.location.as_str())
            .finish()
    }
}

impl LoginProvider {
    /// `location` is the public URL of the broker. Users are created as
    /// `<name>@<domain>` when a domain is given.
    pub fn new<N: Into<String>>(
        kind: IdpKind,
        name: N,
        domain: Option<String>,
        location: Url,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            domain,
            location,
            verifier,
        }
    }

    /// Provider rooted at the `location` of the `[DEFAULT]` configuration
    /// section.
    pub fn from_config<N: Into<String>>(
        kind: IdpKind,
        name: N,
        domain: Option<String>,
        config: &Config,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, IdpError> {
        let location = config
            .default
            .as_ref()
            .and_then(|x| x.location.clone())
            .ok_or(IdpError::NoLocation)?;
        Ok(Self::new(kind, name, domain, location, verifier))
    }

    pub fn kind(&self) -> IdpKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL of the page completing the login for `wait_id`.
    pub fn begin_interaction(&self, wait_id: &str) -> Result<Interaction, IdpError> {
        let mut url = self
            .location
            .join(&format!("login/{}/{}", self.name, self.kind))?;
        url.query_pairs_mut().append_pair("id", wait_id);
        Ok(Interaction {
            kind: self.kind,
            url,
        })
    }

    fn qualify(&self, name: &str) -> String {
        match &self.domain {
            Some(domain) => format!("{name}@{domain}"),
            None => name.to_string(),
        }
    }

    fn identity(&self, user: VerifiedUser) -> Identity {
        Identity {
            username: self.qualify(&user.name),
            external_id: Some(format!("{}:{}", self.name, user.id)),
            email: user.email,
            display_name: user.display_name,
            groups: user.groups.iter().map(|x| self.qualify(x)).collect(),
            last_login: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Verify the credentials, record the user and hand its username to the
    /// waiter of `wait_id`.
    #[tracing::instrument(level = "info", skip(self, pool, credentials), fields(idp = %self.name, kind = %self.kind))]
    pub async fn complete_interaction(
        &self,
        pool: &Pool,
        wait_id: &str,
        credentials: &Credentials,
    ) -> Result<Identity, IdpError> {
        if credentials.kind() != self.kind {
            return Err(IdpError::KindMismatch {
                expected: self.kind,
                got: credentials.kind(),
            });
        }
        let user = self.verifier.verify(credentials).await?;
        let identity = self.identity(user);

        let store = pool.acquire().await?;
        store.upsert_user(&identity).await?;
        store
            .put_in(wait_id, &format!("login/{}", self.kind), &identity.username)
            .await?;
        info!(username = %identity.username, "login completed");
        Ok(identity)
    }

    /// Wait for the login of `wait_id` to complete and return the user.
    pub async fn wait_for_login(
        &self,
        pool: &Pool,
        ctx: &WaitContext,
        wait_id: &str,
    ) -> Result<Identity, BrokerError> {
        let username = pool.wait(ctx, wait_id).await?;
        let store = pool.acquire().await?;
        Ok(store.get_identity(&username).await?)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use std::time::Duration;

    use super::*;
    use crate::tests::sqlite_config;

    fn location() -> Url {
        Url::parse("https://idm.example.com/").unwrap()
    }

    fn password(password: &str) -> Credentials {
        Credentials::Password {
            username: "bob".into(),
            password: password.into(),
        }
    }

    fn verifier() -> MockCredentialVerifier {
        let mut verifier = MockCredentialVerifier::default();
        verifier.expect_verify().returning(|credentials| match credentials {
            Credentials::Password { username, password } if password.expose_secret() == "secret" => {
                Ok(VerifiedUser {
                    id: "u-123".into(),
                    name: username.clone(),
                    email: Some("bob@example.com".into()),
                    display_name: Some("Bob".into()),
                    groups: vec!["project1".into()],
                })
            }
            _ => Err(IdpError::VerificationFailed("invalid credentials".into())),
        });
        verifier
    }

    fn provider(verifier: MockCredentialVerifier) -> LoginProvider {
        LoginProvider::new(
            IdpKind::Password,
            "openstack",
            Some("openstack".into()),
            location(),
            Arc::new(verifier),
        )
    }

    #[test]
    fn test_begin_interaction() {
        let provider = provider(MockCredentialVerifier::default());
        let interaction = provider.begin_interaction("w 1").unwrap();
        assert_eq!(IdpKind::Password, interaction.kind);
        assert_eq!(
            "https://idm.example.com/login/openstack/password?id=w+1",
            interaction.url.as_str()
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        let err = LoginProvider::from_config(
            IdpKind::Token,
            "openstack",
            None,
            &config,
            Arc::new(MockCredentialVerifier::default()),
        )
        .unwrap_err();
        assert!(matches!(err, IdpError::NoLocation));
        assert_eq!(ErrorCause::Internal, err.cause());

        config.default = Some(crate::config::DefaultSection {
            location: Some(Url::parse("https://idm.example.com/broker/").unwrap()),
        });
        let provider = LoginProvider::from_config(
            IdpKind::Token,
            "openstack",
            None,
            &config,
            Arc::new(MockCredentialVerifier::default()),
        )
        .unwrap();
        assert_eq!(
            "https://idm.example.com/broker/login/openstack/token?id=w1",
            provider.begin_interaction("w1").unwrap().url.as_str()
        );
    }

    #[tokio::test]
    async fn test_login() {
        let (_dir, config) = sqlite_config(4);
        let pool = Pool::new(&config, None).await.unwrap();
        let provider = provider(verifier());

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
            .complete_interaction(&pool, "w1", &password("secret"))
            .await
            .unwrap();
        assert_eq!("bob@openstack", completed.username);

        let identity = waiter.await.unwrap().unwrap();
        assert_eq!("bob@openstack", identity.username);
        assert_eq!(Some("openstack:u-123".to_string()), identity.external_id);
        assert_eq!(vec!["project1@openstack"], identity.groups);
        assert!(identity.last_login.is_some());
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();
        let err = provider(MockCredentialVerifier::default())
            .complete_interaction(
                &pool,
                "w1",
                &Credentials::Token {
                    token: "t".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorCause::InvalidData, err.cause());
        assert_eq!(
            "token credentials cannot be used for a password login",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn test_failed_login_puts_nothing() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();
        let err = provider(verifier())
            .complete_interaction(&pool, "w1", &password("wrong"))
            .await
            .unwrap_err();
        assert_eq!(ErrorCause::InvalidData, err.cause());

        let store = pool.acquire().await.unwrap();
        assert!(matches!(store.get("w1").await, Err(MeetingError::NotFound)));
    }
}
