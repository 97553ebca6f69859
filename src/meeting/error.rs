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
use crate::meeting::backend::error::MeetingDatabaseError;

#[derive(Error, Debug)]
pub enum MeetingError {
    /// Unsupported driver
    #[error("unsupported driver {0}")]
    UnsupportedDriver(String),

    #[error("{0}")]
    InvalidData(String),

    /// Never set, already consumed or expired. These are not told apart.
    #[error("rendezvous not found, probably expired")]
    NotFound,

    /// The backing store could not be reached.
    #[error("rendezvous store unavailable: {source}")]
    Unavailable { source: MeetingDatabaseError },

    #[error(transparent)]
    MeetingDatabase { source: MeetingDatabaseError },
}

impl MeetingError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::InvalidData(..) => ErrorCause::InvalidData,
            Self::NotFound => ErrorCause::NotFound,
            Self::Unavailable { .. } => ErrorCause::ServiceUnavailable,
            Self::UnsupportedDriver(..) | Self::MeetingDatabase { .. } => ErrorCause::Internal,
        }
    }

    /// Whether the error means that the database could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<MeetingDatabaseError> for MeetingError {
    fn from(source: MeetingDatabaseError) -> Self {
        if source.is_unavailable() {
            Self::Unavailable { source }
        } else {
            Self::MeetingDatabase { source }
        }
    }
}
