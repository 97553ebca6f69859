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

use config::{File, FileFormat};
use eyre::{Report, WrapErr};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    /// Global configuration options
    #[serde(rename = "DEFAULT")]
    pub default: Option<DefaultSection>,

    /// Database configuration
    pub database: DatabaseSection,

    /// Identity repository configuration
    #[serde(default)]
    pub identity: IdentitySection,

    /// Rendezvous (meeting place) configuration
    #[serde(default)]
    pub meeting: MeetingSection,

    /// Discharge authorization
    #[serde(default)]
    pub authz: AuthzSection,

    /// Bootstrap admin agent
    #[serde(default)]
    pub admin: AdminSection,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DefaultSection {
    /// Public location of the broker. Login interaction URLs are relative to it.
    pub location: Option<Url>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSection {
    /// Database URL.
    pub connection: SecretString,

    /// Maximum number of sessions checked out at the same time.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Seconds a request waits for a free session before giving up.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            connection: SecretString::from("sqlite::memory:"),
            max_sessions: default_max_sessions(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl DatabaseSection {
    pub fn get_connection(&self) -> SecretString {
        let val = self.connection.expose_secret();
        if val.contains("+") {
            return Regex::new(r"(?<type>\w+)\+(\w+)://")
                .map(|re| SecretString::from(re.replace(val, "${type}://").to_string()))
                .unwrap_or(self.connection.clone());
        }
        self.connection.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentitySection {
    #[serde(default = "default_sql_driver")]
    pub driver: String,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            driver: default_sql_driver(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeetingSection {
    #[serde(default = "default_sql_driver")]
    pub driver: String,

    /// Seconds after which a rendezvous entry is removed, consumed or not.
    pub expiry: u64,

    /// Seconds between two sweeps of expired rendezvous entries.
    pub sweep_interval: u64,

    /// Seconds a waiter may block on a single rendezvous.
    pub wait_timeout: u64,

    /// Initial delay in milliseconds between two polls of a waiter.
    pub poll_interval: u64,

    /// Category prefix swept by this instance. Empty sweeps everything.
    #[serde(default)]
    pub sweep_category: String,
}

impl Default for MeetingSection {
    fn default() -> Self {
        Self {
            driver: default_sql_driver(),
            expiry: 3600,
            sweep_interval: 60,
            wait_timeout: 900,
            poll_interval: 100,
            sweep_category: String::new(),
        }
    }
}

impl MeetingSection {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthzSection {
    /// Whether operations flagged as public may be granted to everyone.
    pub allow_public: bool,
}

impl Default for AuthzSection {
    fn default() -> Self {
        Self { allow_public: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminSection {
    /// Username of the admin agent. It owns itself.
    pub username: String,

    /// Base64 encoded public key of the admin agent.
    pub public_key: Option<String>,
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            username: "admin@idm".into(),
            public_key: None,
        }
    }
}

fn default_sql_driver() -> String {
    "sql".into()
}

fn default_max_sessions() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    2
}

impl Config {
    pub fn new(path: PathBuf) -> Result<Self, Report> {
        let mut builder = config::Config::builder();

        if std::path::Path::new(&path).is_file() {
            builder = builder.add_source(File::from(path).format(FileFormat::Ini));
        }

        builder.try_into()
    }
}

impl TryFrom<config::ConfigBuilder<config::builder::DefaultState>> for Config {
    type Error = Report;
    fn try_from(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, Self::Error> {
        let mut builder = builder;
        builder = builder
            .set_default("database.max_sessions", "100")?
            .set_default("database.request_timeout", "2")?
            .set_default("meeting.expiry", "3600")?
            .set_default("meeting.sweep_interval", "60")?
            .set_default("meeting.wait_timeout", "900")?
            .set_default("meeting.poll_interval", "100")?
            .set_default("authz.allow_public", "true")?
            .set_default("admin.username", "admin@idm")?;

        builder
            .build()
            .wrap_err("Failed to read configuration file")?
            .try_deserialize()
            .wrap_err("Failed to parse configuration file")
    }
}
