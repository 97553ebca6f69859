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

//! # Broker API error.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::error::{BrokerError, ErrorCause};

/// Protocol status of an error cause.
pub fn status_code(cause: ErrorCause) -> StatusCode {
    match cause {
        ErrorCause::InvalidData => StatusCode::BAD_REQUEST,
        ErrorCause::NotFound => StatusCode::NOT_FOUND,
        ErrorCause::AlreadyExists => StatusCode::CONFLICT,
        ErrorCause::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCause::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status_code = status_code(self.cause());
        if status_code.is_server_error() {
            error!("Error happened during request processing: {:#?}", self);
        }

        (
            status_code,
            Json(json!({"error": {"code": status_code.as_u16(), "message": self.to_string()}})),
        )
            .into_response()
    }
}
