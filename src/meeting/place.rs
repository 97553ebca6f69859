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

//! Cancellable wait contexts bound to the lifetime of a meeting place.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

static PLACE_IDS: AtomicU64 = AtomicU64::new(1);

/// Lifecycle owner of the wait contexts handed to rendezvous waiters.
///
/// Closing the place cancels every context derived from it.
#[derive(Debug)]
pub struct Place {
    id: u64,
    closing: CancellationToken,
    wait_timeout: Duration,
    serial: AtomicU64,
}

/// Cancellation source of a rendezvous waiter.
///
/// Cancelled when the parent is cancelled, the guard returned together with
/// it is released, the place closes or the watchdog deadline passes.
#[derive(Clone, Debug)]
pub struct WaitContext {
    token: CancellationToken,
    closing: Vec<CancellationToken>,
    deadline: Option<Instant>,
    place: Option<u64>,
    serial: u64,
}

/// Cancels the derived context when released or dropped.
#[derive(Debug)]
#[must_use = "dropping the guard cancels the context"]
pub struct ContextGuard {
    token: Option<CancellationToken>,
}

impl Place {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            id: PLACE_IDS.fetch_add(1, Ordering::Relaxed),
            closing: CancellationToken::new(),
            wait_timeout,
            serial: AtomicU64::new(0),
        }
    }

    /// Derive a wait context from `parent`.
    ///
    /// A context that was already derived from this place is returned as is,
    /// together with a guard that does nothing.
    pub fn context(&self, parent: &WaitContext) -> (WaitContext, ContextGuard) {
        if parent.place == Some(self.id) {
            return (parent.clone(), ContextGuard { token: None });
        }
        let token = parent.token.child_token();
        let watchdog = Instant::now() + self.wait_timeout;
        let deadline = Some(parent.deadline.map_or(watchdog, |x| x.min(watchdog)));
        let mut closing = parent.closing.clone();
        closing.push(self.closing.clone());
        let ctx = WaitContext {
            token: token.clone(),
            closing,
            deadline,
            place: Some(self.id),
            serial: self.serial.fetch_add(1, Ordering::Relaxed),
        };
        (ctx, ContextGuard { token: Some(token) })
    }

    /// Cancel every derived context.
    pub fn close(&self) {
        debug!(place = self.id, "closing meeting place");
        self.closing.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once the place is closed.
    pub async fn closed(&self) {
        self.closing.cancelled().await
    }
}

impl WaitContext {
    /// Root context cancelled only through `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            closing: Vec::new(),
            deadline: None,
            place: None,
            serial: 0,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self.closing.iter().any(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|x| Instant::now() >= x)
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let closing = async {
            match self.closing.as_slice() {
                [] => std::future::pending().await,
                tokens => {
                    futures::future::select_all(tokens.iter().map(|x| Box::pin(x.cancelled())))
                        .await;
                }
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = closing => {}
            _ = deadline => {}
        }
    }
}

impl Default for WaitContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl PartialEq for WaitContext {
    fn eq(&self, other: &Self) -> bool {
        self.place == other.place
            && self.serial == other.serial
            && self.deadline == other.deadline
    }
}

impl ContextGuard {
    /// Cancel the context. Same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
