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
use derive_builder::Builder;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::error::BuilderError;
use crate::meeting::error::MeetingError;

/// Rendezvous entry.
#[derive(Builder, Clone, Debug, Deserialize, PartialEq, Serialize)]
#[builder(build_fn(error = "BuilderError"))]
#[builder(setter(into))]
pub struct Meeting {
    pub id: String,

    /// Sweep filter. Expired entries are removed by category prefix.
    pub category: String,

    /// Opaque payload supplied by the producer.
    pub address: String,

    #[builder(default = "Utc::now()")]
    pub created_at: DateTime<Utc>,
}

/// Outcome of removing a rendezvous entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Removed {
    /// This call deleted the entry.
    Consumed { created_at: DateTime<Utc> },
    /// Nothing to delete: never set, removed by somebody else or expired.
    Absent,
}

#[async_trait]
pub trait MeetingApi: Send + Sync {
    /// Store `address` under `id`, using the address as category.
    async fn put<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
        address: &'a str,
    ) -> Result<(), MeetingError>;

    /// Store `address` under `id` in the given category. A later put for
    /// the same id overwrites the entry and its creation time.
    async fn put_in<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
        category: &'a str,
        address: &'a str,
    ) -> Result<(), MeetingError>;

    async fn get<'a>(&self, db: &DatabaseConnection, id: &'a str) -> Result<String, MeetingError>;

    /// Delete the entry. Removing an absent entry is not an error.
    async fn remove<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Removed, MeetingError>;

    /// Delete every entry of the category prefix created at or before
    /// `cutoff` and return their ids. An empty prefix matches everything.
    async fn remove_old<'a>(
        &self,
        db: &DatabaseConnection,
        prefix: &'a str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, MeetingError>;

    /// Number of pending entries, expired ones included until swept.
    async fn count(&self, db: &DatabaseConnection) -> Result<u64, MeetingError>;
}
