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

//! Operational HTTP endpoints of the broker.
use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

pub mod error;

use crate::error::BrokerError;
use crate::metrics::MetricsRegistry;
use crate::store::Pool;

#[derive(Clone)]
pub struct ApiState {
    pub pool: Pool,
    pub metrics: Arc<MetricsRegistry>,
}

/// Session pool counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolStatus {
    pub limit: usize,
    pub free: usize,
    pub in_use: usize,
    pub closed: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

async fn metrics(State(state): State<ApiState>) -> Result<impl IntoResponse, BrokerError> {
    state.pool.refresh_collection_sizes().await;
    let text = state.metrics.encode_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

async fn status(State(state): State<ApiState>) -> Json<PoolStatus> {
    let stats = state.pool.stats();
    Json(PoolStatus {
        limit: stats.limit,
        free: stats.free,
        in_use: stats.in_use,
        closed: state.pool.is_closed(),
    })
}
