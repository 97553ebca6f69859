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

/// Clears request scoped state before an object is reused.
pub trait Reset {
    fn reset(&mut self);
}

/// Unbounded recycle list of derived objects.
pub struct RecyclePool<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
    new: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Reset> RecyclePool<T> {
    /// Create a recycle list keeping at most `max_idle` objects around.
    pub fn new<F>(max_idle: usize, new: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
            new: Box::new(new),
        }
    }

    pub fn get(&self) -> T {
        let reused = self.free.lock().pop();
        reused.unwrap_or_else(|| (self.new)())
    }

    pub fn put(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn clear(&self) {
        self.free.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    struct Scratch {
        serial: usize,
        seen: Vec<String>,
    }

    impl Reset for Scratch {
        fn reset(&mut self) {
            self.seen.clear();
        }
    }

    fn counting_pool(max_idle: usize) -> RecyclePool<Scratch> {
        let created = Arc::new(AtomicUsize::new(0));
        RecyclePool::new(max_idle, move || Scratch {
            serial: created.fetch_add(1, Ordering::SeqCst),
            seen: Vec::new(),
        })
    }

    #[test]
    fn test_reuse_resets() {
        let pool = counting_pool(4);
        let mut item = pool.get();
        item.seen.push("request".into());
        pool.put(item);
        assert_eq!(1, pool.idle());

        let item = pool.get();
        assert_eq!(0, item.serial);
        assert!(item.seen.is_empty());
    }

    #[test]
    fn test_max_idle() {
        let pool = counting_pool(1);
        let first = pool.get();
        let second = pool.get();
        assert_eq!(1, second.serial);
        pool.put(first);
        pool.put(second);
        assert_eq!(1, pool.idle());

        pool.clear();
        assert_eq!(0, pool.idle());
        assert_eq!(2, pool.get().serial);
    }
}
