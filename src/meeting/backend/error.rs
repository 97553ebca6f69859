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

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeetingDatabaseError {
    #[error("{message}")]
    Sql { message: String, context: String },

    #[error("Database error while {context}")]
    Database {
        source: sea_orm::DbErr,
        context: String,
    },

    /// A stored creation time does not fit a timestamp.
    #[error("rendezvous {id} has a malformed creation time {created_at}")]
    CreatedAt { id: String, created_at: i64 },
}

impl MeetingDatabaseError {
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

/// Convert the DB error into the [MeetingDatabaseError] with the context
/// information.
pub fn db_err(e: sea_orm::DbErr, context: &str) -> MeetingDatabaseError {
    e.sql_err().map_or_else(
        || MeetingDatabaseError::Database {
            source: e,
            context: context.to_string(),
        },
        |err| MeetingDatabaseError::Sql {
            message: err.to_string(),
            context: context.to_string(),
        },
    )
}
