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
use std::collections::BTreeSet;

mod extra_info;
mod group;
mod identity;
mod public_key;
mod ssh_key;
mod upsert;

use super::IdentityBackend;
use crate::identity::IdentityProviderError;
use crate::identity::types::*;

#[derive(Clone, Debug, Default)]
pub struct SqlBackend {}

/// Deduplicated and sorted copy of the input.
fn unique_strings<S: AsRef<str>>(items: &[S]) -> BTreeSet<String> {
    items.iter().map(|x| x.as_ref().to_string()).collect()
}

#[async_trait]
impl IdentityBackend for SqlBackend {
    async fn upsert_user(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError> {
        Ok(upsert::upsert_user(db, identity).await?)
    }

    async fn upsert_agent(
        &self,
        db: &DatabaseConnection,
        identity: &Identity,
    ) -> Result<(), IdentityProviderError> {
        Ok(upsert::upsert_agent(db, identity).await?)
    }

    async fn get_identity<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
    ) -> Result<Option<Identity>, IdentityProviderError> {
        Ok(identity::get(db, username).await?)
    }

    async fn set_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        Ok(group::set(db, username, groups).await?)
    }

    async fn add_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        Ok(group::add(db, username, groups).await?)
    }

    async fn remove_groups<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        Ok(group::remove(db, username, groups).await?)
    }

    async fn set_public_keys<'a>(
        &self,
        db: &DatabaseConnection,
        username: &'a str,
        keys: &[PublicKey],
    ) -> Result<(), IdentityProviderError> {
        Ok(public_key::set(db, username, keys).await?)
    }

    async fn count(&self, db: &DatabaseConnection) -> Result<u64, IdentityProviderError> {
        Ok(identity::count(db).await?)
    }
}
