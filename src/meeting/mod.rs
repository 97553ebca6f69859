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

//! # Meeting place
//!
//! Rendezvous between an out of band completion step, such as a human
//! finishing a login in a browser, and a request waiting elsewhere for its
//! outcome. The two sides share nothing but an opaque id: the producer puts
//! an address under the id, the waiter polls for it and removes it.
//!
//! Entries are kept in the database so that producer and waiter may be
//! served by different processes. Every operation is a single atomic
//! statement (upsert, conditional delete) and entries are swept by age
//! whether they were consumed or not.
//!
//! Waiting is cooperative: a waiter polls with backoff until its
//! [`WaitContext`] is cancelled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::debug;

pub mod backend;
pub mod error;
pub mod place;
pub mod types;

use crate::config::Config;
use crate::meeting::backend::{MeetingBackend, sql::SqlBackend};
pub use crate::meeting::error::MeetingError;
pub use crate::meeting::place::{ContextGuard, Place, WaitContext};
pub use crate::meeting::types::{Meeting, MeetingApi, Removed};

#[derive(Clone, Debug)]
pub struct MeetingProvider {
    backend_driver: Box<dyn MeetingBackend>,
}

impl MeetingProvider {
    pub fn new(config: &Config) -> Result<Self, MeetingError> {
        let backend_driver: Box<dyn MeetingBackend> = match config.meeting.driver.as_str() {
            "sql" => Box::new(SqlBackend::default()),
            _ => {
                return Err(MeetingError::UnsupportedDriver(
                    config.meeting.driver.clone(),
                ));
            }
        };
        Ok(Self { backend_driver })
    }

    /// Store an entry with an explicit creation time.
    pub(crate) async fn put_at(
        &self,
        db: &DatabaseConnection,
        id: &str,
        category: &str,
        address: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), MeetingError> {
        if id.is_empty() {
            return Err(MeetingError::InvalidData("empty rendezvous id".into()));
        }
        let entry = Meeting {
            id: id.to_string(),
            category: category.to_string(),
            address: address.to_string(),
            created_at,
        };
        self.backend_driver.put(db, &entry).await
    }
}

#[async_trait]
impl MeetingApi for MeetingProvider {
    #[tracing::instrument(level = "debug", skip(self, db, address))]
    async fn put<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
        address: &'a str,
    ) -> Result<(), MeetingError> {
        self.put_at(db, id, address, address, Utc::now()).await
    }

    #[tracing::instrument(level = "debug", skip(self, db, address))]
    async fn put_in<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
        category: &'a str,
        address: &'a str,
    ) -> Result<(), MeetingError> {
        self.put_at(db, id, category, address, Utc::now()).await
    }

    #[tracing::instrument(level = "debug", skip(self, db))]
    async fn get<'a>(&self, db: &DatabaseConnection, id: &'a str) -> Result<String, MeetingError> {
        self.backend_driver
            .get(db, id)
            .await?
            .map(|entry| entry.address)
            .ok_or(MeetingError::NotFound)
    }

    #[tracing::instrument(level = "debug", skip(self, db))]
    async fn remove<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Removed, MeetingError> {
        self.backend_driver.remove(db, id).await
    }

    #[tracing::instrument(level = "debug", skip(self, db))]
    async fn remove_old<'a>(
        &self,
        db: &DatabaseConnection,
        prefix: &'a str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, MeetingError> {
        let ids = self.backend_driver.remove_old(db, prefix, cutoff).await?;
        if !ids.is_empty() {
            debug!(count = ids.len(), "removed expired rendezvous entries");
        }
        Ok(ids)
    }

    #[tracing::instrument(level = "trace", skip(self, db))]
    async fn count(&self, db: &DatabaseConnection) -> Result<u64, MeetingError> {
        self.backend_driver.count(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCause;
    use crate::tests::get_database;

    #[tokio::test]
    async fn test_not_found() {
        let db = get_database().await;
        let provider = MeetingProvider::new(&Config::default()).unwrap();

        let err = provider.get(&db, "x").await.unwrap_err();
        assert_eq!(ErrorCause::NotFound, err.cause());
        assert_eq!("rendezvous not found, probably expired", err.to_string());

        assert_eq!(Removed::Absent, provider.remove(&db, "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_category() {
        let db = get_database().await;
        let provider = MeetingProvider::new(&Config::default()).unwrap();
        provider.put(&db, "x", "host-a").await.unwrap();
        provider
            .put_in(&db, "y", "login/password", "bob")
            .await
            .unwrap();

        let cutoff = Utc::now();
        assert_eq!(
            vec!["y"],
            provider.remove_old(&db, "login/", cutoff).await.unwrap()
        );
        assert_eq!(
            vec!["x"],
            provider.remove_old(&db, "host-", cutoff).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_put_long_address() {
        let db = get_database().await;
        let provider = MeetingProvider::new(&Config::default()).unwrap();
        let address = "a".repeat(300);
        provider.put(&db, "x", &address).await.unwrap();
        assert_eq!(address, provider.get(&db, "x").await.unwrap());
        assert_eq!(
            vec!["x"],
            provider
                .remove_old(&db, &address, Utc::now())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_id() {
        let db = DatabaseConnection::Disconnected;
        let provider = MeetingProvider::new(&Config::default()).unwrap();
        let err = provider.put(&db, "", "addr").await.unwrap_err();
        assert_eq!(ErrorCause::InvalidData, err.cause());
    }
}
