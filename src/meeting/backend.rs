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
use dyn_clone::DynClone;
use sea_orm::DatabaseConnection;

use crate::meeting::error::MeetingError;
use crate::meeting::types::{Meeting, Removed};

pub mod error;
pub mod sql;

#[async_trait]
pub trait MeetingBackend: DynClone + Send + Sync + std::fmt::Debug {
    /// Insert or overwrite the entry.
    async fn put(&self, db: &DatabaseConnection, entry: &Meeting) -> Result<(), MeetingError>;

    async fn get<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Option<Meeting>, MeetingError>;

    async fn remove<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Removed, MeetingError>;

    async fn remove_old<'a>(
        &self,
        db: &DatabaseConnection,
        prefix: &'a str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, MeetingError>;

    async fn count(&self, db: &DatabaseConnection) -> Result<u64, MeetingError>;
}

dyn_clone::clone_trait_object!(MeetingBackend);
