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

//! # Discharge authorization
//!
//! Decides whether an identity may perform a set of operations when a third
//! party caveat is discharged. ACLs come from the store handle bound to the
//! request. Without such a handle every operation is denied.
//!
//! An ACL lists usernames and group names. The special entry
//! [`EVERYONE`] only grants operations explicitly flagged as public, and only
//! when public access is enabled.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AuthzSection;
use crate::error::ErrorCause;
use crate::identity::IdentityProviderError;
use crate::identity::types::Identity;

/// ACL entry matching any caller of a public operation.
pub const EVERYONE: &str = "everyone";

/// Entity guarding operations on the whole broker.
pub const GLOBAL_ENTITY: &str = "global";

/// Entity guarding the login discharge.
pub const LOGIN_ENTITY: &str = "login";

pub const READ_ACTION: &str = "read";
pub const DISCHARGE_ACTION: &str = "discharge";

/// Prefix of the entity guarding a single identity.
pub const USER_ENTITY_PREFIX: &str = "u-";

#[derive(Error, Debug)]
pub enum AuthzError {
    /// The request has no store handle to resolve ACLs with.
    #[error("no store found")]
    NoStore,

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
    },
}

impl AuthzError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::NoStore => ErrorCause::Internal,
            Self::Identity { source } => source.cause(),
        }
    }
}

/// Operation to authorize.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Op {
    pub entity: String,
    pub action: String,
    /// Whether [`EVERYONE`] in the ACL applies.
    pub public: bool,
}

impl Op {
    pub fn new<E: Into<String>, A: Into<String>>(entity: E, action: A) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
            public: false,
        }
    }

    /// Mark the operation as public.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Operation on the identity record of `username`.
    pub fn on_user<A: Into<String>>(username: &str, action: A) -> Self {
        Self::new(format!("{USER_ENTITY_PREFIX}{username}"), action)
    }

    /// Discharge of a login caveat.
    pub fn login_discharge() -> Self {
        Self::new(LOGIN_ENTITY, DISCHARGE_ACTION).public()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.action)
    }
}

/// Resolves the ACL of an operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AclSource: Send + Sync {
    async fn acl_for_op(&self, op: &Op) -> Result<Vec<String>, AuthzError>;
}

/// Request scoped bindings visible to the authorizer.
#[derive(Clone, Copy, Default)]
pub struct RequestScope<'a> {
    acl: Option<&'a dyn AclSource>,
}

impl<'a> RequestScope<'a> {
    pub fn with_store(acl: &'a dyn AclSource) -> Self {
        Self { acl: Some(acl) }
    }
}

#[derive(Clone, Debug)]
pub struct Authorizer {
    allow_public: bool,
}

impl Authorizer {
    pub fn new(config: &AuthzSection) -> Self {
        Self {
            allow_public: config.allow_public,
        }
    }

    /// Whether `caller` may perform all of `ops`. An unauthenticated caller
    /// only gets public operations.
    ///
    /// Fails when no store is bound to the request, which callers must treat
    /// as a denial.
    #[tracing::instrument(level = "debug", skip(self, scope, caller), fields(caller = caller.map(|x| x.username.as_str())))]
    pub async fn allow(
        &self,
        scope: &RequestScope<'_>,
        caller: Option<&Identity>,
        ops: &[Op],
    ) -> Result<bool, AuthzError> {
        let Some(source) = scope.acl else {
            warn!("authorization requested without a store");
            return Err(AuthzError::NoStore);
        };
        if ops.is_empty() {
            return Ok(false);
        }
        for op in ops {
            let acl = source.acl_for_op(op).await?;
            if !self.is_allowed(&acl, caller, op) {
                debug!(%op, "operation denied");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_allowed(&self, acl: &[String], caller: Option<&Identity>, op: &Op) -> bool {
        acl.iter().any(|entry| {
            if entry == EVERYONE {
                return op.public && self.allow_public;
            }
            caller.is_some_and(|who| {
                who.username == *entry || who.groups.iter().any(|group| group == entry)
            })
        })
    }
}
