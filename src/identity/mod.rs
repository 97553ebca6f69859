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

//! # Identity repository
//!
//! Persistent identity records of two kinds:
//!
//! ## User
//!
//! A human authenticated by an external identity provider. Users are keyed by
//! the username together with the identifier assigned by the provider
//! (external id). Repeated logins merge into the stored record: scalar fields
//! are overwritten, groups and SSH keys only ever grow, extra info is merged
//! key by key.
//!
//! ## Agent
//!
//! A machine identity named `name@owner` and managed by its owner. Agents
//! authenticate with public keys and have no external id. Upserting an agent
//! replaces its groups and public keys.
//!
//! Uniqueness of usernames and external ids is enforced by the database, so
//! concurrent first time upserts for the same identity cannot both succeed.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use validator::Validate;

pub mod backend;
pub mod error;
pub mod names;
pub mod types;

use crate::config::Config;
use crate::identity::backend::{IdentityBackend, sql::SqlBackend};
pub use crate::identity::error::IdentityProviderError;
use crate::identity::types::{Identity, PublicKey};

pub use types::IdentityApi;

#[derive(Clone, Debug)]
pub struct IdentityProvider {
    backend_driver: Box<dyn IdentityBackend>,
}

impl IdentityProvider {
    pub fn new(config: &Config) -> Result<Self, IdentityProviderError> {
        let backend_driver: Box<dyn IdentityBackend> = match config.identity.driver.as_str() {
            "sql" => Box::new(SqlBackend::default()),
            _ => {
                return Err(IdentityProviderError::UnsupportedDriver(
                    config.identity.driver.clone(),
                ));
            }
        };
        Ok(Self { backend_driver })
    }
}

#[async_trait]
impl IdentityApi for IdentityProvider {
    #[tracing::instrument(level = "info", skip(self, db, identity), fields(username = %identity.username))]
    async fn upsert_user(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError> {
        if !names::is_valid_user(&identity.username) {
            return Err(IdentityProviderError::InvalidData(format!(
                "invalid username {:?}",
                identity.username
            )));
        }
        if identity.external_id.as_deref().is_none_or(str::is_empty) {
            return Err(IdentityProviderError::InvalidData(
                "no external_id specified".into(),
            ));
        }
        identity.validate()?;
        self.backend_driver.upsert_user(db, identity).await
    }

    #[tracing::instrument(level = "info", skip(self, db, identity), fields(username = %identity.username))]
    async fn upsert_agent(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError> {
        if names::split_agent(&identity.username).is_none() {
            return Err(IdentityProviderError::InvalidData(format!(
                "invalid agent username {:?}",
                identity.username
            )));
        }
        match identity.owner.as_deref() {
            Some(owner) if names::is_valid_user(owner) => {}
            Some(owner) => {
                return Err(IdentityProviderError::InvalidData(format!(
                    "invalid agent owner {owner:?}"
                )));
            }
            None => {
                return Err(IdentityProviderError::InvalidData(
                    "no owner specified".into(),
                ));
            }
        }
        if identity.external_id.is_some() {
            return Err(IdentityProviderError::InvalidData(
                "agents cannot have an external_id".into(),
            ));
        }
        identity.validate()?;
        self.backend_driver.upsert_agent(db, identity).await
    }

    #[tracing::instrument(level = "info", skip(self, db))]
    async fn set_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.backend_driver.set_groups(db, username, groups).await
    }

    #[tracing::instrument(level = "info", skip(self, db))]
    async fn add_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.backend_driver.add_groups(db, username, groups).await
    }

    #[tracing::instrument(level = "info", skip(self, db))]
    async fn remove_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.backend_driver.remove_groups(db, username, groups).await
    }

    #[tracing::instrument(level = "info", skip(self, db, keys))]
    async fn set_public_keys<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        keys: &[PublicKey],
    ) -> Result<(), IdentityProviderError> {
        self.backend_driver.set_public_keys(db, username, keys).await
    }

    #[tracing::instrument(level = "debug", skip(self, db))]
    async fn get_identity<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
    ) -> Result<Identity, IdentityProviderError> {
        self.backend_driver
            .get_identity(db, username)
            .await?
            .ok_or_else(|| IdentityProviderError::NotFound(username.to_string()))
    }

    #[tracing::instrument(level = "trace", skip(self, db))]
    async fn count(&self, db: &DatabaseConnection) -> Result<u64, IdentityProviderError> {
        self.backend_driver.count(db).await
    }
}
