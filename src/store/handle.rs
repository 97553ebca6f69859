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
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;

use super::session::Session;
use crate::authz::{
    AclSource, AuthzError, DISCHARGE_ACTION, EVERYONE, GLOBAL_ENTITY, LOGIN_ENTITY, Op,
    READ_ACTION, USER_ENTITY_PREFIX,
};
use crate::error::ErrorCause;
use crate::identity::types::{Identity, PublicKey};
use crate::identity::{IdentityApi, IdentityProvider, IdentityProviderError};
use crate::meeting::{MeetingApi, MeetingError, MeetingProvider, Removed};
use crate::metrics::StoreMetrics;
use crate::pool::{Lease, Reset};

/// Per request state of a [`Store`], recycled between requests.
pub struct StoreState {
    identity: IdentityProvider,
    meeting: MeetingProvider,
    admin: String,
    metrics: Option<Arc<StoreMetrics>>,
    acl_cache: Mutex<HashMap<Op, Vec<String>>>,
}

impl StoreState {
    pub(super) fn new(
        identity: IdentityProvider,
        meeting: MeetingProvider,
        admin: String,
        metrics: Option<Arc<StoreMetrics>>,
    ) -> Self {
        Self {
            identity,
            meeting,
            admin,
            metrics,
            acl_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Reset for StoreState {
    fn reset(&mut self) {
        self.acl_cache.get_mut().clear();
    }
}

/// Identity repository and rendezvous operations bound to one database
/// session.
pub struct Store {
    pub(super) session: Lease<Session>,
    pub(super) state: StoreState,
}

impl Store {
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn db(&self) -> &DatabaseConnection {
        self.session.db()
    }

    /// Drop the ACLs cached by this checkout after an identity update.
    fn forget_acls(&self) {
        self.state.acl_cache.lock().clear();
    }

    fn observe(&self, cause: ErrorCause) {
        if cause == ErrorCause::ServiceUnavailable {
            self.session.mark_broken();
        }
    }

    pub async fn upsert_user(&self, identity: &Identity) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .upsert_user(self.db(), identity)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn upsert_agent(&self, identity: &Identity) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .upsert_agent(self.db(), identity)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn set_groups(
        &self,
        username: &str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .set_groups(self.db(), username, groups)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn add_groups(
        &self,
        username: &str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .add_groups(self.db(), username, groups)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn remove_groups(
        &self,
        username: &str,
        groups: &[String],
    ) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .remove_groups(self.db(), username, groups)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn set_public_keys(
        &self,
        username: &str,
        keys: &[PublicKey],
    ) -> Result<(), IdentityProviderError> {
        self.state
            .identity
            .set_public_keys(self.db(), username, keys)
            .await
            .inspect(|_| self.forget_acls())
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn get_identity(&self, username: &str) -> Result<Identity, IdentityProviderError> {
        self.state
            .identity
            .get_identity(self.db(), username)
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn count_identities(&self) -> Result<u64, IdentityProviderError> {
        self.state
            .identity
            .count(self.db())
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn count_meetings(&self) -> Result<u64, MeetingError> {
        self.state
            .meeting
            .count(self.db())
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn put(&self, id: &str, address: &str) -> Result<(), MeetingError> {
        self.state
            .meeting
            .put(self.db(), id, address)
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    pub async fn put_in(&self, id: &str, category: &str, address: &str) -> Result<(), MeetingError> {
        self.state
            .meeting
            .put_in(self.db(), id, category, address)
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    #[cfg(test)]
    pub(crate) async fn put_at(
        &self,
        id: &str,
        category: &str,
        address: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), MeetingError> {
        self.state
            .meeting
            .put_at(self.db(), id, category, address, created_at)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<String, MeetingError> {
        self.state
            .meeting
            .get(self.db(), id)
            .await
            .inspect_err(|e| self.observe(e.cause()))
    }

    /// Delete the entry, recording how long it waited when this call
    /// consumed it.
    pub async fn remove(&self, id: &str) -> Result<Removed, MeetingError> {
        let removed = self
            .state
            .meeting
            .remove(self.db(), id)
            .await
            .inspect_err(|e| self.observe(e.cause()))?;
        if let (Removed::Consumed { created_at }, Some(metrics)) = (removed, &self.state.metrics) {
            let waited = Utc::now() - created_at;
            metrics.meeting_completed(waited.num_milliseconds() as f64 / 1000.0);
        }
        Ok(removed)
    }

    pub async fn remove_old(
        &self,
        prefix: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, MeetingError> {
        let ids = self
            .state
            .meeting
            .remove_old(self.db(), prefix, cutoff)
            .await
            .inspect_err(|e| self.observe(e.cause()))?;
        if let Some(metrics) = &self.state.metrics {
            metrics.meetings_expired(ids.len());
        }
        Ok(ids)
    }

    async fn resolve_acl(&self, op: &Op) -> Result<Vec<String>, AuthzError> {
        let admin = self.state.admin.clone();
        if op.entity == GLOBAL_ENTITY {
            return Ok(vec![admin]);
        }
        if let Some(username) = op.entity.strip_prefix(USER_ENTITY_PREFIX) {
            let owner = match self.get_identity(username).await {
                Ok(identity) => identity.owner,
                Err(IdentityProviderError::NotFound(..)) => None,
                Err(err) => return Err(err.into()),
            };
            let mut acl = Vec::with_capacity(3);
            if op.action == READ_ACTION {
                acl.push(username.to_string());
            }
            acl.extend(owner);
            acl.push(admin);
            return Ok(acl);
        }
        if op.entity == LOGIN_ENTITY && op.action == DISCHARGE_ACTION {
            return Ok(vec![EVERYONE.to_string()]);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl AclSource for Store {
    async fn acl_for_op(&self, op: &Op) -> Result<Vec<String>, AuthzError> {
        let cached = self.state.acl_cache.lock().get(op).cloned();
        if let Some(acl) = cached {
            return Ok(acl);
        }
        let acl = self.resolve_acl(op).await?;
        self.state.acl_cache.lock().insert(op.clone(), acl.clone());
        Ok(acl)
    }
}
