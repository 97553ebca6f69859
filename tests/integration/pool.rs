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
//! Test the session limit of the broker pool.

use eyre::Report;
use std::time::Duration;

use identity_broker::error::ErrorCause;
use identity_broker::store::StoreError;

use crate::common::get_pool;

#[tokio::test]
async fn test_limit_and_release() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;

    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    assert_eq!(2, pool.stats().in_use);

    let err = pool
        .acquire_timeout(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Busy));
    assert_eq!(ErrorCause::ServiceUnavailable, err.cause());

    // Maintenance paths are not subject to the limit.
    let unbounded = pool.acquire_unbounded().await?;
    assert_eq!(3, pool.stats().in_use);

    pool.release(first);
    drop(second);
    drop(unbounded);
    let stats = pool.stats();
    assert_eq!(0, stats.in_use);
    assert!(stats.free >= 2);

    let _store = pool.acquire().await?;
    Ok(())
}

#[tokio::test]
async fn test_waiter_gets_released_session() -> Result<(), Report> {
    let (_dir, pool) = get_pool(1, "").await?;
    let held = pool.acquire().await?;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);

    let store = waiter.await??;
    store.put("w1", "bob").await?;
    assert_eq!("bob", store.get("w1").await?);
    Ok(())
}

#[tokio::test]
async fn test_close() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let held = pool.acquire().await?;
    pool.close();

    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(StoreError::Closed)));
    assert!(matches!(
        pool.acquire_unbounded().await,
        Err(StoreError::Closed)
    ));
    // Outstanding stores stay usable, their release drops the session.
    held.put("w1", "bob").await?;
    drop(held);
    assert_eq!(0, pool.stats().free);
    Ok(())
}
