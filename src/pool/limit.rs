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

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tracing::{debug, trace};

use super::{Manager, PoolError, PoolStats};

/// Fixed capacity pool guarded by a semaphore.
///
/// Waiters are served in FIFO order, so a returned resource wakes exactly one
/// pending [`LimitPool::get`].
pub struct LimitPool<M: Manager> {
    manager: M,
    limit: usize,
    semaphore: Arc<Semaphore>,
    free: Mutex<Vec<M::Item>>,
    in_use: Arc<AtomicUsize>,
    closed: AtomicBool,
}

/// A resource checked out of a [`LimitPool`].
///
/// Return it with [`LimitPool::put`]. Dropping it releases the permit but
/// throws the resource away.
pub struct Lease<T> {
    item: T,
    permit: Option<OwnedSemaphorePermit>,
    ticket: InUse,
}

struct InUse(Arc<AtomicUsize>);

impl InUse {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InUse {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Lease<T> {
    /// Whether the lease counts against the pool limit.
    pub fn is_bounded(&self) -> bool {
        self.permit.is_some()
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.item
    }
}

impl<M: Manager> LimitPool<M> {
    pub fn new(manager: M, limit: usize) -> Self {
        Self {
            manager,
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            free: Mutex::new(Vec::with_capacity(limit)),
            in_use: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Check out a resource, waiting at most `timeout` for one to be
    /// returned when the limit is reached.
    pub async fn get(&self, timeout: Duration) -> Result<Lease<M::Item>, PoolError<M::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let permit = match time::timeout(timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is only closed together with the pool.
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                debug!(limit = self.limit, "no pooled resource freed within {:?}", timeout);
                return Err(PoolError::Timeout(timeout));
            }
        };
        self.checkout(Some(permit)).await
    }

    /// Check out a resource ignoring the limit.
    pub async fn get_no_limit(&self) -> Result<Lease<M::Item>, PoolError<M::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        self.checkout(None).await
    }

    async fn checkout(
        &self,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Lease<M::Item>, PoolError<M::Error>> {
        let reused = self.free.lock().pop();
        let item = match reused {
            Some(item) => item,
            None => {
                trace!("creating new pooled resource");
                self.manager.create().await.map_err(PoolError::Manager)?
            }
        };
        Ok(Lease {
            item,
            permit,
            ticket: InUse::new(&self.in_use),
        })
    }

    /// Return a resource. It is recycled and kept for reuse unless the pool
    /// is closed, the manager rejects it or enough resources are idle.
    pub fn put(&self, lease: Lease<M::Item>) {
        let Lease {
            mut item,
            permit,
            ticket,
        } = lease;
        if !self.is_closed() && self.manager.recycle(&mut item) {
            let mut free = self.free.lock();
            if free.len() < self.limit {
                free.push(item);
            }
        }
        // Release the permit only after the resource is back on the free list.
        drop(ticket);
        drop(permit);
    }

    /// Reject all further checkouts, including the currently waiting ones,
    /// and drop every idle resource.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();
        self.free.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            limit: self.limit,
            free: self.free.lock().len(),
            in_use: self.in_use.load(Ordering::SeqCst),
        }
    }
}
