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
//! # Two level resource pool
//!
//! [`LimitPool`] bounds the number of raw resources (database sessions)
//! checked out at the same time. Requests over the limit wait for a free
//! permit up to a timeout and are rejected afterwards. An unbounded checkout
//! bypasses the limit for startup and maintenance paths.
//!
//! [`RecyclePool`] keeps higher level objects built on top of a raw resource
//! so that their per request state does not need to be rebuilt every time.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod limit;
mod recycle;

pub use limit::{Lease, LimitPool};
pub use recycle::{RecyclePool, Reset};

/// Creates and recycles the raw resources of a [`LimitPool`].
#[async_trait]
pub trait Manager: Send + Sync {
    type Item: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a new resource.
    async fn create(&self) -> Result<Self::Item, Self::Error>;

    /// Prepare a returned resource for an unrelated request. A resource for
    /// which `false` is returned is dropped instead of reused.
    fn recycle(&self, item: &mut Self::Item) -> bool;
}

#[derive(Debug, Error)]
pub enum PoolError<E: std::error::Error + 'static> {
    /// No resource was freed in time.
    #[error("pool limit reached, nothing freed within {0:?}")]
    Timeout(Duration),

    /// The pool is closed.
    #[error("pool closed")]
    Closed,

    /// Creating a new resource failed.
    #[error(transparent)]
    Manager(E),
}

/// Point in time counters of a [`LimitPool`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// Configured ceiling for bounded checkouts.
    pub limit: usize,
    /// Idle resources ready for reuse.
    pub free: usize,
    /// Checked out resources, bounded and unbounded.
    pub in_use: usize,
}
