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
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

use crate::pool::Manager;

/// One checked out database slot.
#[derive(Debug)]
pub struct Session {
    db: Arc<DatabaseConnection>,
    broken: AtomicBool,
}

impl Session {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            broken: AtomicBool::new(false),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Keep the session from being reused after it failed to reach the
    /// database.
    pub fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::SeqCst) {
            warn!("database session marked as broken");
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}

/// Hands out sessions on top of a shared connection, checking that the
/// database answers before a new session is used.
#[derive(Debug)]
pub struct SessionManager {
    db: Arc<DatabaseConnection>,
}

impl SessionManager {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }
}

#[async_trait]
impl Manager for SessionManager {
    type Item = Session;
    type Error = DbErr;

    async fn create(&self) -> Result<Session, DbErr> {
        trace!("opening database session");
        self.db.ping().await?;
        Ok(Session::new(self.db.clone()))
    }

    fn recycle(&self, item: &mut Session) -> bool {
        !item.is_broken()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::get_database;

    #[tokio::test]
    async fn test_broken_not_recycled() {
        let manager = SessionManager::new(get_database().await);
        let mut session = manager.create().await.unwrap();
        assert!(manager.recycle(&mut session));
        session.mark_broken();
        assert!(session.is_broken());
        assert!(!manager.recycle(&mut session));
    }

    #[tokio::test]
    async fn test_sessions_share_connection() {
        let manager = SessionManager::new(get_database().await);
        let first = manager.create().await.unwrap();
        let second = manager.create().await.unwrap();
        assert!(Arc::ptr_eq(&first.db, &second.db));
        assert!(Arc::ptr_eq(&manager.db, &first.db));
    }

    #[tokio::test]
    async fn test_create_needs_database() {
        let manager = SessionManager::new(DatabaseConnection::Disconnected);
        assert!(manager.create().await.is_err());
    }
}
