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
//! Test the login rendezvous through the broker pool.

use eyre::Report;
use std::time::Duration;

use identity_broker::error::ErrorCause;
use identity_broker::meeting::{MeetingError, Removed, WaitContext};

use crate::common::get_pool;

#[tokio::test]
async fn test_rendezvous() -> Result<(), Report> {
    let (_dir, pool) = get_pool(4, "").await?;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.wait(&WaitContext::default(), "w1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.acquire().await?.put("w1", "bob").await?;

    assert_eq!("bob", waiter.await??);

    // Consumed by the waiter.
    let store = pool.acquire().await?;
    let err = store.get("w1").await.unwrap_err();
    assert!(matches!(err, MeetingError::NotFound));
    assert_eq!(ErrorCause::NotFound, err.cause());
    assert_eq!(Removed::Absent, store.remove("w1").await?);
    Ok(())
}

#[tokio::test]
async fn test_wait_cancelled() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let (ctx, guard) = pool.context(&WaitContext::default());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        guard.release();
    });
    let err = pool.wait(&ctx, "never").await.unwrap_err();
    assert_eq!(ErrorCause::NotFound, err.cause());
    canceller.await?;
    Ok(())
}

#[tokio::test]
async fn test_close_stops_waiters() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "").await?;
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.wait(&WaitContext::default(), "w1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close();

    let err = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await??
        .unwrap_err();
    assert_ne!(ErrorCause::Internal, err.cause());
    Ok(())
}

#[tokio::test]
async fn test_sweep_category() -> Result<(), Report> {
    let (_dir, pool) = get_pool(2, "expiry = 0\nsweep_category = login/").await?;
    {
        let store = pool.acquire().await?;
        store.put_in("w1", "login/password", "bob").await?;
        store.put_in("w2", "discharge", "alice").await?;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(vec!["w1".to_string()], pool.sweep().await?);

    let store = pool.acquire().await?;
    assert!(store.get("w1").await.is_err());
    assert_eq!("alice", store.get("w2").await?);
    Ok(())
}
