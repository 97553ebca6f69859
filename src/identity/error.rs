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

use thiserror::Error;

use crate::error::ErrorCause;
use crate::identity::backend::error::*;

#[derive(Error, Debug)]
pub enum IdentityProviderError {
    /// Unsupported driver
    #[error("unsupported driver {0}")]
    UnsupportedDriver(String),

    #[error("{0}")]
    InvalidData(String),

    #[error("request validation failed: {source}")]
    Validator {
        #[from]
        source: validator::ValidationErrors,
    },

    #[error("user {0:?} not found")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// The backing store could not be reached.
    #[error("identity store unavailable: {source}")]
    Unavailable { source: IdentityDatabaseError },

    #[error(transparent)]
    IdentityDatabase { source: IdentityDatabaseError },
}

impl IdentityProviderError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::InvalidData(..) | Self::Validator { .. } => ErrorCause::InvalidData,
            Self::NotFound(..) => ErrorCause::NotFound,
            Self::AlreadyExists(..) => ErrorCause::AlreadyExists,
            Self::Unavailable { .. } => ErrorCause::ServiceUnavailable,
            Self::UnsupportedDriver(..) | Self::IdentityDatabase { .. } => ErrorCause::Internal,
        }
    }
}

impl From<IdentityDatabaseError> for IdentityProviderError {
    fn from(source: IdentityDatabaseError) -> Self {
        match source {
            IdentityDatabaseError::Conflict { message, .. } => Self::AlreadyExists(message),
            IdentityDatabaseError::IdentityNotFound(x) => Self::NotFound(x),
            source if source.is_unavailable() => Self::Unavailable { source },
            _ => Self::IdentityDatabase { source },
        }
    }
}
