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

//! Prometheus metrics of the broker pool and meeting place.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `identity_broker_sessions_free` | Gauge | Idle database sessions |
//! | `identity_broker_sessions_in_use` | Gauge | Checked out database sessions |
//! | `identity_broker_meetings_completed_seconds` | Histogram | Time between put and consumption of a rendezvous |
//! | `identity_broker_meetings_expired_total` | Counter | Rendezvous entries removed by the sweeper |
//! | `identity_broker_collection_size{collection}` | Gauge | Stored rows of the `identity` and `meeting` collections |
//!
//! Collection sizes are counted in the database, so they are only refreshed
//! when the pool is asked to, typically once per scrape.
//!
//! The registry is owned by the caller and passed in explicitly. Asking a
//! [`MetricsRegistry`] for its [`StoreMetrics`] several times registers them
//! once and hands out the same instance.

use parking_lot::Mutex;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use thiserror::Error;

use crate::pool::PoolStats;

/// Buckets in seconds for the rendezvous completion time. A human logs in
/// between these bounds.
pub const MEETING_COMPLETED_BUCKETS: &[f64] = &[1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Clone, Debug)]
pub struct StoreMetrics {
    sessions_free: IntGauge,
    sessions_in_use: IntGauge,
    meetings_completed: Histogram,
    meetings_expired: IntCounter,
    collection_size: IntGaugeVec,
}

impl StoreMetrics {
    fn new(registry: &Registry) -> MetricsResult<Self> {
        let sessions_free = IntGauge::with_opts(Opts::new(
            "identity_broker_sessions_free",
            "Idle database sessions",
        ))?;
        registry.register(Box::new(sessions_free.clone()))?;

        let sessions_in_use = IntGauge::with_opts(Opts::new(
            "identity_broker_sessions_in_use",
            "Checked out database sessions",
        ))?;
        registry.register(Box::new(sessions_in_use.clone()))?;

        let meetings_completed = Histogram::with_opts(
            HistogramOpts::new(
                "identity_broker_meetings_completed_seconds",
                "Time between put and consumption of a rendezvous",
            )
            .buckets(MEETING_COMPLETED_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(meetings_completed.clone()))?;

        let meetings_expired = IntCounter::with_opts(Opts::new(
            "identity_broker_meetings_expired_total",
            "Rendezvous entries removed by the sweeper",
        ))?;
        registry.register(Box::new(meetings_expired.clone()))?;

        let collection_size = IntGaugeVec::new(
            Opts::new(
                "identity_broker_collection_size",
                "Stored rows per collection",
            ),
            &["collection"],
        )?;
        registry.register(Box::new(collection_size.clone()))?;

        Ok(Self {
            sessions_free,
            sessions_in_use,
            meetings_completed,
            meetings_expired,
            collection_size,
        })
    }

    pub fn observe_pool(&self, stats: &PoolStats) {
        self.sessions_free
            .set(i64::try_from(stats.free).unwrap_or(i64::MAX));
        self.sessions_in_use
            .set(i64::try_from(stats.in_use).unwrap_or(i64::MAX));
    }

    pub fn meeting_completed(&self, seconds: f64) {
        self.meetings_completed.observe(seconds.max(0.0));
    }

    pub fn meetings_expired(&self, count: usize) {
        self.meetings_expired
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    pub fn observe_collection(&self, collection: &str, size: u64) {
        self.collection_size
            .with_label_values(&[collection])
            .set(i64::try_from(size).unwrap_or(i64::MAX));
    }
}

pub struct MetricsRegistry {
    registry: Registry,
    store: Mutex<Option<Arc<StoreMetrics>>>,
}

impl MetricsRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            store: Mutex::new(None),
        }
    }

    /// Store metrics, registered on first use.
    pub fn store_metrics(&self) -> MetricsResult<Arc<StoreMetrics>> {
        let mut guard = self.store.lock();
        if let Some(metrics) = guard.as_ref() {
            return Ok(metrics.clone());
        }
        let metrics = Arc::new(StoreMetrics::new(&self.registry)?);
        *guard = Some(metrics.clone());
        Ok(metrics)
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }

    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }
}
