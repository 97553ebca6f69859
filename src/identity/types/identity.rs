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

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use validator::Validate;

use crate::error::BuilderError;

/// Identity record.
///
/// Human users are keyed by (`username`, `external_id`). Agents have no
/// external id, are named `name@owner` and carry an `owner`.
#[derive(Builder, Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[builder(build_fn(error = "BuilderError"))]
#[builder(setter(strip_option, into))]
pub struct Identity {
    /// Globally unique username.
    #[validate(length(min = 1, max = 255))]
    pub username: String,

    /// Identifier of the user at the external identity provider.
    #[builder(default)]
    #[validate(length(min = 1, max = 255))]
    pub external_id: Option<String>,

    /// Owner of an agent.
    #[builder(default)]
    #[validate(length(min = 1, max = 255))]
    pub owner: Option<String>,

    #[builder(default)]
    #[validate(length(max = 255))]
    pub email: Option<String>,

    #[builder(default)]
    #[validate(length(max = 255))]
    pub display_name: Option<String>,

    /// Avatar reference (gravatar id).
    #[builder(default)]
    #[validate(length(max = 255))]
    pub avatar_id: Option<String>,

    #[builder(default)]
    pub groups: Vec<String>,

    #[builder(default)]
    pub ssh_keys: Vec<String>,

    #[builder(default)]
    pub public_keys: Vec<PublicKey>,

    #[builder(default)]
    pub extra_info: BTreeMap<String, String>,

    #[builder(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl Identity {
    /// Whether the identity is an agent.
    pub fn is_agent(&self) -> bool {
        self.owner.is_some() && self.external_id.is_none()
    }
}

#[derive(Debug, Error)]
pub enum PublicKeyError {
    #[error(transparent)]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },

    #[error("public key must be {expected} bytes long, got {got}")]
    Length { expected: usize, got: usize },
}

/// Public key of an agent. Stored base64 encoded.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const LEN: usize = 32;

    pub fn new(key: [u8; Self::LEN]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl TryFrom<&str> for PublicKey {
    type Error = PublicKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let raw = STANDARD.decode(value)?;
        let key: [u8; Self::LEN] =
            raw.as_slice()
                .try_into()
                .map_err(|_| PublicKeyError::Length {
                    expected: Self::LEN,
                    got: raw.len(),
                })?;
        Ok(Self(key))
    }
}

impl TryFrom<String> for PublicKey {
    type Error = PublicKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.to_base64()
    }
}
