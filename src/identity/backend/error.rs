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

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::identity::types::PublicKeyError;

#[derive(Error, Debug)]
pub enum IdentityDatabaseError {
    /// Conflict.
    #[error("{message} while {context}")]
    Conflict {
        /// Human readable error.
        message: String,
        /// Error context.
        context: String,
    },

    /// SqlError
    #[error("{message}")]
    Sql { message: String, context: String },

    #[error("Database error while {context}")]
    Database {
        source: sea_orm::DbErr,
        context: String,
    },

    #[error("{0}")]
    IdentityNotFound(String),

    #[error("stored public key of {username} is malformed: {source}")]
    PublicKey {
        username: String,
        source: PublicKeyError,
    },
}

impl IdentityDatabaseError {
    /// Whether the error means that the database could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Database {
                source: DbErr::Conn(..) | DbErr::ConnectionAcquire(..),
                ..
            }
        )
    }
}

/// Convert the DB error into the [IdentityDatabaseError] with the context
/// information.
pub fn db_err(e: sea_orm::DbErr, context: &str) -> IdentityDatabaseError {
    e.sql_err().map_or_else(
        || IdentityDatabaseError::Database {
            source: e,
            context: context.to_string(),
        },
        |err| match err {
            SqlErr::UniqueConstraintViolation(descr) => IdentityDatabaseError::Conflict {
                message: descr.to_string(),
                context: context.to_string(),
            },
            other => IdentityDatabaseError::Sql {
                message: other.to_string(),
                context: context.to_string(),
            },
        },
    )
}

/// Replace the message of a uniqueness conflict with one that names the
/// domain object.
pub fn conflict_as(err: IdentityDatabaseError, message: &str) -> IdentityDatabaseError {
    match err {
        IdentityDatabaseError::Conflict { context, .. } => IdentityDatabaseError::Conflict {
            message: message.to_string(),
            context,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait, Set};

    use super::*;
    use crate::db::entity::identity_group as db_identity_group;
    use crate::error::ErrorCause;
    use crate::identity::IdentityProviderError;
    use crate::tests::get_database;

    #[tokio::test]
    async fn test_dangling_reference_is_not_a_conflict() {
        let db = get_database().await;
        let err = db_identity_group::ActiveModel {
            username: Set("ghost".into()),
            group_name: Set("g".into()),
        }
        .insert(&db)
        .await
        .unwrap_err();
        assert!(matches!(
            err.sql_err(),
            Some(SqlErr::ForeignKeyConstraintViolation(..))
        ));

        let err = db_err(err, "adding groups");
        assert!(matches!(err, IdentityDatabaseError::Sql { .. }), "{err:?}");
        assert_eq!(
            ErrorCause::Internal,
            IdentityProviderError::from(err).cause()
        );
    }
}
