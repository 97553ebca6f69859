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

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;

use crate::config::{Config, DatabaseSection};
use crate::db_migration::Migrator;

/// Migrated in-memory SQLite database.
pub(crate) async fn get_database() -> DatabaseConnection {
    let opt = ConnectOptions::new("sqlite::memory:")
        .max_connections(1)
        .sqlx_logging(false)
        .to_owned();
    let db = Database::connect(opt).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// Configuration pointing to a SQLite database file in a fresh temporary
/// directory, so that several sessions share it.
pub(crate) fn sqlite_config(max_sessions: usize) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.db");
    let config = Config {
        database: DatabaseSection {
            connection: format!("sqlite://{}?mode=rwc", path.display()).into(),
            max_sessions,
            ..Default::default()
        },
        ..Default::default()
    };
    (dir, config)
}
