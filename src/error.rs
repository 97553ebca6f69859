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

use crate::authz::AuthzError;
use crate::identity::error::IdentityProviderError;
use crate::idp::IdpError;
use crate::meeting::error::MeetingError;
use crate::metrics::MetricsError;
use crate::store::StoreError;

/// Failure classification exposed to the transport layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCause {
    /// Malformed input. The caller must fix the request.
    InvalidData,
    /// Missing entity, or an expired or consumed rendezvous.
    NotFound,
    /// Uniqueness conflict.
    AlreadyExists,
    /// Pool exhaustion or unreachable backing store. Retryable after backoff.
    ServiceUnavailable,
    /// Unexpected backing store fault.
    Internal,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Authz {
        #[from]
        source: AuthzError,
    },

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
    },

    #[error(transparent)]
    Idp {
        #[from]
        source: IdpError,
    },

    #[error(transparent)]
    Meeting {
        #[from]
        source: MeetingError,
    },

    #[error(transparent)]
    Metrics {
        #[from]
        source: MetricsError,
    },

    #[error(transparent)]
    Store {
        #[from]
        source: StoreError,
    },
}

impl BrokerError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::Authz { source } => source.cause(),
            Self::Identity { source } => source.cause(),
            Self::Idp { source } => source.cause(),
            Self::Meeting { source } => source.cause(),
            Self::Metrics { .. } => ErrorCause::Internal,
            Self::Store { source } => source.cause(),
        }
    }
}

/// Error returned by the `derive_builder` generated builders.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// A required field was not set.
    #[error("{0} must be initialized")]
    UninitializedField(&'static str),

    /// Custom validation failed.
    #[error("{0}")]
    Validation(String),
}

impl From<derive_builder::UninitializedFieldError> for BuilderError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        Self::UninitializedField(value.field_name())
    }
}

impl From<String> for BuilderError {
    fn from(value: String) -> Self {
        Self::Validation(value)
    }
}
