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

use eyre::{Result, WrapErr};
use std::path::PathBuf;
use tempfile::TempDir;

use identity_broker::config::Config;
use identity_broker::store::Pool;

/// Write a broker config file backed by a SQLite database in a fresh
/// directory.
///
/// `meeting` holds additional lines of the `[meeting]` section.
pub fn write_config(max_sessions: usize, meeting: &str) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("broker.db");
    let path = dir.path().join("identity-broker.conf");
    std::fs::write(
        &path,
        format!(
            "[DEFAULT]\nlocation = https://idm.example.com/\n\n[database]\nconnection = sqlite://{}?mode=rwc\nmax_sessions = {max_sessions}\nrequest_timeout = 1\n\n[meeting]\npoll_interval = 5\n{meeting}\n",
            db_path.display()
        ),
    )?;
    Ok((dir, path))
}

/// Open a pool on an isolated database.
///
/// The returned directory must outlive the pool.
pub async fn get_pool(max_sessions: usize, meeting: &str) -> Result<(TempDir, Pool)> {
    let (dir, path) = write_config(max_sessions, meeting)?;
    let config = Config::new(path)?;
    let pool = Pool::new(&config, None)
        .await
        .wrap_err("Failed to open the broker pool")?;
    Ok((dir, pool))
}
