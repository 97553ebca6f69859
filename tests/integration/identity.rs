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
//! Test the identity repository and the store ACLs.

use eyre::Report;
use std::collections::BTreeMap;

use identity_broker::authz::{Authorizer, Op, READ_ACTION, RequestScope};
use identity_broker::config::AuthzSection;
use identity_broker::error::ErrorCause;
use identity_broker::identity::types::{Identity, IdentityBuilder, PublicKey};

use crate::common::get_pool;

fn bob() -> Result<Identity, Report> {
    Ok(IdentityBuilder::default()
        .username("bob")
        .external_id("test:bob")
        .email("bob@example.com")
        .groups(vec!["devs".to_string()])
        .extra_info(BTreeMap::from([("team".to_string(), "a".to_string())]))
        .build()?)
}

#[tokio::test]
async fn test_user_lifecycle() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let store = pool.acquire().await?;

    store.upsert_user(&bob()?).await?;
    store
        .add_groups("bob", &["ops".to_string(), "devs".to_string()])
        .await?;
    store.remove_groups("bob", &["devs".to_string()]).await?;

    let stored = store.get_identity("bob").await?;
    assert_eq!(vec!["ops"], stored.groups);
    assert_eq!(Some("bob@example.com".to_string()), stored.email);
    assert_eq!(Some(&"a".to_string()), stored.extra_info.get("team"));

    // Another external id cannot take over the username.
    let mut other = bob()?;
    other.external_id = Some("test:mallory".into());
    let err = store.upsert_user(&other).await.unwrap_err();
    assert_eq!(ErrorCause::AlreadyExists, err.cause());

    let err = store.get_identity("alice").await.unwrap_err();
    assert_eq!(ErrorCause::NotFound, err.cause());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_upsert() -> Result<(), Report> {
    let (_dir, pool) = get_pool(8, "").await?;

    let racers: Vec<_> = (0..6)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let identity = IdentityBuilder::default()
                    .username("dave")
                    .external_id(format!("test:dave{i}"))
                    .build()?;
                let store = pool.acquire().await?;
                Ok::<_, Report>(store.upsert_user(&identity).await.map_err(|e| e.cause()))
            })
        })
        .collect();

    let mut successes = 0;
    for racer in racers {
        match racer.await?? {
            Ok(()) => successes += 1,
            Err(cause) => assert_eq!(ErrorCause::AlreadyExists, cause),
        }
    }
    assert_eq!(1, successes);

    let stored = pool.acquire().await?.get_identity("dave").await?;
    assert!(stored.external_id.is_some_and(|x| x.starts_with("test:dave")));
    Ok(())
}

#[tokio::test]
async fn test_agent() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let store = pool.acquire().await?;

    let agent = IdentityBuilder::default()
        .username("ci@bob")
        .owner("bob")
        .groups(vec!["builders".to_string()])
        .build()?;
    store.upsert_agent(&agent).await?;
    store
        .set_public_keys("ci@bob", &[PublicKey::new([7; 32])])
        .await?;

    let stored = store.get_identity("ci@bob").await?;
    assert!(stored.is_agent());
    assert_eq!(vec![PublicKey::new([7; 32])], stored.public_keys);

    store.set_groups("ci@bob", &[]).await?;
    assert!(store.get_identity("ci@bob").await?.groups.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_store_acl() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let store = pool.acquire().await?;
    store.upsert_user(&bob()?).await?;
    let agent = IdentityBuilder::default()
        .username("ci@bob")
        .owner("bob")
        .build()?;
    store.upsert_agent(&agent).await?;

    let authorizer = Authorizer::new(&AuthzSection { allow_public: true });
    let scope = RequestScope::with_store(&*store);
    let bob = bob()?;

    // Owners manage their agents, agents read themselves.
    assert!(
        authorizer
            .allow(&scope, Some(&bob), &[Op::on_user("ci@bob", "write")])
            .await?
    );
    assert!(
        authorizer
            .allow(&scope, Some(&agent), &[Op::on_user("ci@bob", READ_ACTION)])
            .await?
    );
    assert!(
        !authorizer
            .allow(&scope, Some(&agent), &[Op::on_user("ci@bob", "write")])
            .await?
    );

    // Login discharge is public, everything else needs a caller.
    assert!(authorizer.allow(&scope, None, &[Op::login_discharge()]).await?);
    assert!(
        !authorizer
            .allow(&scope, None, &[Op::new("global", READ_ACTION)])
            .await?
    );
    Ok(())
}
