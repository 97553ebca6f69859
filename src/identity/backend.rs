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

use async_trait::async_trait;
use dyn_clone::DynClone;
use sea_orm::DatabaseConnection;

use crate::identity::IdentityProviderError;
use crate::identity::types::*;

pub mod error;
pub mod sql;

#[async_trait]
pub trait IdentityBackend: DynClone + Send + Sync + std::fmt::Debug {
    /// Create or merge a human user.
    async fn upsert_user(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError>;

    /// Create or update an agent.
    async fn upsert_agent(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError>;

    /// Get an identity by the username.
    async fn get_identity<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
    ) -> Result<Option<Identity>, IdentityProviderError>;

    /// Replace the groups of the identity.
    async fn set_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Add groups to the identity.
    async fn add_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Remove groups from the identity.
    async fn remove_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Replace the public keys of the identity.
    async fn set_public_keys<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        keys: &[PublicKey],
    ) -> Result<(), IdentityProviderError>;

    /// Number of stored identities.
    async fn count(&self, db: &DatabaseConnection) -> Result<u64, IdentityProviderError>;
}

dyn_clone::clone_trait_object!(IdentityBackend);
