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
use sea_orm::DatabaseConnection;

use crate::identity::error::IdentityProviderError;
use crate::identity::types::{Identity, PublicKey};

#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Create or merge a human user keyed by (username, external id).
    ///
    /// Groups and SSH keys are added to the stored sets, extra info entries
    /// are merged key by key and the scalar fields are overwritten.
    async fn upsert_user(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError>;

    /// Create or update an agent keyed by (username, owner).
    ///
    /// Groups and public keys replace the stored ones.
    async fn upsert_agent(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError>;

    /// Replace the group set.
    async fn set_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Add groups to the group set.
    async fn add_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Remove groups from the group set.
    async fn remove_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError>;

    /// Replace the public keys.
    async fn set_public_keys<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        keys: &[PublicKey],
    ) -> Result<(), IdentityProviderError>;

    async fn get_identity<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
    ) -> Result<Identity, IdentityProviderError>;

    /// Number of stored identities, users and agents alike.
    async fn count(&self, db: &DatabaseConnection) -> Result<u64, IdentityProviderError>;
}
