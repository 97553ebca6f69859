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

//! # Broker pool
//!
//! A [`Pool`] hands out [`Store`] handles. Each handle holds one database
//! session out of a bounded [`LimitPool`] for as long as it is checked out,
//! plus request scoped state recycled through a [`RecyclePool`]. Returning a
//! handle, explicitly with [`Pool::release`] or by dropping it, clears that
//! state and puts the session back unless it lost its database.
//!
//! The pool also owns the meeting [`Place`]: waiters derive their contexts
//! from it, and the sweeper removing expired rendezvous entries runs until
//! it closes.

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use secrecy::ExposeSecret;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

mod handle;
mod session;

pub use handle::{Store, StoreState};
pub use session::{Session, SessionManager};

use crate::config::Config;
use crate::db_migration::Migrator;
use crate::error::{BrokerError, ErrorCause};
use crate::identity::names::split_agent;
use crate::identity::types::{Identity, PublicKey, PublicKeyError};
use crate::identity::{IdentityProvider, IdentityProviderError};
use crate::meeting::{ContextGuard, MeetingError, MeetingProvider, Place, WaitContext};
use crate::metrics::{MetricsError, MetricsRegistry, StoreMetrics};
use crate::pool::{Lease, LimitPool, PoolError, PoolStats, RecyclePool};

/// Upper bound of the delay between two polls of a waiter.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("too many database sessions in use")]
    Busy,

    #[error("pool closed")]
    Closed,

    /// The database could not be reached.
    #[error("database unavailable: {source}")]
    Unavailable { source: DbErr },

    #[error("database connection failed: {source}")]
    Connection { source: DbErr },

    #[error("database migration failed: {source}")]
    Migration { source: DbErr },

    #[error("invalid admin agent: {0}")]
    InvalidAdmin(String),

    #[error("invalid admin public key: {source}")]
    AdminKey {
        #[from]
        source: PublicKeyError,
    },

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
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
}

impl StoreError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            Self::Busy | Self::Closed | Self::Unavailable { .. } => ErrorCause::ServiceUnavailable,
            Self::InvalidAdmin(..) | Self::AdminKey { .. } => ErrorCause::InvalidData,
            Self::Identity { source } => source.cause(),
            Self::Meeting { source } => source.cause(),
            Self::Connection { .. } | Self::Migration { .. } | Self::Metrics { .. } => {
                ErrorCause::Internal
            }
        }
    }
}

impl From<PoolError<DbErr>> for StoreError {
    fn from(value: PoolError<DbErr>) -> Self {
        match value {
            PoolError::Timeout(..) => Self::Busy,
            PoolError::Closed => Self::Closed,
            PoolError::Manager(source) => Self::Unavailable { source },
        }
    }
}

struct PoolInner {
    sessions: LimitPool<SessionManager>,
    states: RecyclePool<StoreState>,
    place: Place,
    config: Config,
    metrics: Option<Arc<StoreMetrics>>,
}

impl PoolInner {
    fn release(&self, store: Store) {
        let Store { session, state } = store;
        self.sessions.put(session);
        self.states.put(state);
        self.observe();
    }

    fn observe(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_pool(&self.sessions.stats());
        }
    }
}

/// Broker pool. Cloning is cheap and shares the sessions.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

/// A [`Store`] checked out of a [`Pool`]. Released when dropped.
pub struct PooledStore {
    pool: Arc<PoolInner>,
    store: Option<Store>,
}

impl fmt::Debug for PooledStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledStore")
            .field("session", &self.store.as_ref().map(Store::session))
            .finish()
    }
}

impl Deref for PooledStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        // Only taken on drop.
        self.store
            .as_ref()
            .unwrap_or_else(|| unreachable!("store used after release"))
    }
}

impl Drop for PooledStore {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            self.pool.release(store);
        }
    }
}

fn connect_options(config: &Config) -> ConnectOptions {
    let url = config.database.get_connection();
    let url = url.expose_secret();
    // Every connection to an in-memory SQLite database opens a new one.
    let max_connections = if url.contains(":memory:") || url.contains("mode=memory") {
        1
    } else {
        // Unbounded checkouts may exceed the session limit.
        u32::try_from(config.database.max_sessions.saturating_add(2)).unwrap_or(u32::MAX)
    };
    ConnectOptions::new(url)
        .max_connections(max_connections)
        .sqlx_logging(false)
        .to_owned()
}

impl Pool {
    /// Connect to the configured database, apply the migrations and
    /// bootstrap the admin agent.
    pub async fn new(config: &Config, metrics: Option<&MetricsRegistry>) -> Result<Self, StoreError> {
        debug!("Establishing the database connection...");
        let db = Database::connect(connect_options(config))
            .await
            .map_err(|source| StoreError::Connection { source })?;
        Migrator::up(&db, None)
            .await
            .map_err(|source| StoreError::Migration { source })?;

        let pool = Self::with_connection(config, db, metrics)?;
        pool.bootstrap_admin().await?;
        Ok(pool)
    }

    /// Build a pool on top of an already migrated database.
    pub fn with_connection(
        config: &Config,
        db: DatabaseConnection,
        metrics: Option<&MetricsRegistry>,
    ) -> Result<Self, StoreError> {
        let identity = IdentityProvider::new(config)?;
        let meeting = MeetingProvider::new(config)?;
        let metrics = metrics.map(MetricsRegistry::store_metrics).transpose()?;
        let admin = config.admin.username.clone();
        let state_metrics = metrics.clone();
        let max_sessions = config.database.max_sessions;

        let inner = PoolInner {
            sessions: LimitPool::new(SessionManager::new(db), max_sessions),
            states: RecyclePool::new(max_sessions, move || {
                StoreState::new(
                    identity.clone(),
                    meeting.clone(),
                    admin.clone(),
                    state_metrics.clone(),
                )
            }),
            place: Place::new(config.meeting.wait_timeout()),
            config: config.clone(),
            metrics,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    async fn bootstrap_admin(&self) -> Result<(), StoreError> {
        let Some(key) = &self.inner.config.admin.public_key else {
            return Ok(());
        };
        let username = &self.inner.config.admin.username;
        let Some((_, owner)) = split_agent(username) else {
            return Err(StoreError::InvalidAdmin(username.clone()));
        };
        let admin = Identity {
            username: username.clone(),
            owner: Some(owner.to_string()),
            public_keys: vec![PublicKey::try_from(key.as_str())?],
            ..Default::default()
        };
        let store = self.acquire_unbounded().await?;
        store.upsert_agent(&admin).await?;
        info!(username, "admin agent bootstrapped");
        Ok(())
    }

    fn checkout(
        &self,
        session: Result<Lease<Session>, PoolError<DbErr>>,
    ) -> Result<PooledStore, StoreError> {
        let session = session.inspect_err(|err| debug!("no database session: {err}"))?;
        let store = Store {
            session,
            state: self.inner.states.get(),
        };
        self.inner.observe();
        Ok(PooledStore {
            pool: self.inner.clone(),
            store: Some(store),
        })
    }

    /// Check out a store, waiting up to the configured request timeout.
    pub async fn acquire(&self) -> Result<PooledStore, StoreError> {
        self.acquire_timeout(self.inner.config.database.request_timeout())
            .await
    }

    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledStore, StoreError> {
        let session = self.inner.sessions.get(timeout).await;
        self.checkout(session)
    }

    /// Check out a store ignoring the session limit. For startup and
    /// maintenance only.
    pub async fn acquire_unbounded(&self) -> Result<PooledStore, StoreError> {
        let session = self.inner.sessions.get_no_limit().await;
        self.checkout(session)
    }

    pub fn release(&self, store: PooledStore) {
        drop(store);
    }

    /// Stop handing out stores and cancel every wait context. Stores still
    /// checked out are discarded when returned.
    pub fn close(&self) {
        info!("closing the broker pool");
        self.inner.place.close();
        self.inner.sessions.close();
        self.inner.states.clear();
        self.inner.observe();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.sessions.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.sessions.stats()
    }

    /// Count the stored identities and rendezvous entries into the collection
    /// size gauges. A failed count is logged and leaves its gauge as it was.
    pub async fn refresh_collection_sizes(&self) {
        let Some(metrics) = &self.inner.metrics else {
            return;
        };
        let store = match self.acquire_unbounded().await {
            Ok(store) => store,
            Err(e) => {
                warn!("cannot count collections: {e}");
                return;
            }
        };
        match store.count_identities().await {
            Ok(size) => metrics.observe_collection("identity", size),
            Err(e) => warn!(collection = "identity", "cannot count collection: {e}"),
        }
        match store.count_meetings().await {
            Ok(size) => metrics.observe_collection("meeting", size),
            Err(e) => warn!(collection = "meeting", "cannot count collection: {e}"),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Derive a wait context bound to the lifetime of the pool.
    pub fn context(&self, parent: &WaitContext) -> (WaitContext, ContextGuard) {
        self.inner.place.context(parent)
    }

    /// Wait for an address to be put under `id`, then remove it.
    ///
    /// Fails with [`MeetingError::NotFound`] when the context is cancelled
    /// first.
    #[tracing::instrument(level = "debug", skip(self, ctx))]
    pub async fn wait(&self, ctx: &WaitContext, id: &str) -> Result<String, BrokerError> {
        let (ctx, _guard) = self.context(ctx);
        let mut delay = self
            .inner
            .config
            .meeting
            .poll_interval()
            .clamp(Duration::from_millis(1), MAX_POLL_INTERVAL);
        loop {
            if ctx.is_cancelled() {
                debug!("gave up waiting for rendezvous");
                return Err(MeetingError::NotFound.into());
            }
            {
                let store = tokio::select! {
                    () = ctx.cancelled() => {
                        debug!("gave up waiting for rendezvous");
                        return Err(MeetingError::NotFound.into());
                    }
                    store = self.acquire() => store?,
                };
                match store.get(id).await {
                    Ok(address) => {
                        store.remove(id).await?;
                        return Ok(address);
                    }
                    Err(MeetingError::NotFound) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            tokio::select! {
                () = ctx.cancelled() => {}
                () = time::sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_POLL_INTERVAL);
        }
    }

    /// Remove the rendezvous entries of the configured category that are
    /// older than the expiry.
    pub async fn sweep(&self) -> Result<Vec<String>, BrokerError> {
        let meeting = &self.inner.config.meeting;
        let expiry = TimeDelta::from_std(meeting.expiry()).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(expiry)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let store = self.acquire_unbounded().await?;
        Ok(store.remove_old(&meeting.sweep_category, cutoff).await?)
    }

    /// Run [`Pool::sweep`] periodically until the pool is closed.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move { pool.sweeper().await })
    }

    async fn sweeper(self) {
        let period = self
            .inner
            .config
            .meeting
            .sweep_interval()
            .max(Duration::from_secs(1));
        let mut interval = time::interval(period);
        interval.tick().await;
        info!("Start the rendezvous sweeper");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    trace!("sweeper tick");
                    if let Err(e) = self.sweep().await {
                        error!("Error during rendezvous sweep: {}", e);
                    }
                },
                () = self.inner.place.closed() => {
                    info!("Pool closed. Stopping the rendezvous sweeper.");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use prometheus::Registry;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use super::*;
    use crate::authz::{AclSource, Op, READ_ACTION};
    use crate::meeting::Removed;
    use crate::tests::sqlite_config;

    const ADMIN_KEY: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

    #[tokio::test]
    async fn test_acquire_release() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();

        let store = pool.acquire().await.unwrap();
        assert_eq!(1, pool.stats().in_use);
        pool.release(store);
        assert_eq!(
            PoolStats {
                limit: 2,
                free: 1,
                in_use: 0
            },
            pool.stats()
        );

        {
            let _store = pool.acquire().await.unwrap();
            assert_eq!(0, pool.stats().free);
        }
        assert_eq!(1, pool.stats().free);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let (_dir, config) = sqlite_config(1);
        let pool = Pool::new(&config, None).await.unwrap();
        let held = pool.acquire().await.unwrap();
        assert!(format!("{held:?}").starts_with("PooledStore { session: Some(Session"));

        let err = pool
            .acquire_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Busy));
        assert_eq!(ErrorCause::ServiceUnavailable, err.cause());
        assert_eq!("too many database sessions in use", err.to_string());

        let unbounded = pool.acquire_unbounded().await.unwrap();
        assert!(!unbounded.session.is_bounded());
        assert_eq!(2, pool.stats().in_use);
    }

    #[tokio::test]
    async fn test_release_unblocks_waiter() {
        let (_dir, config) = sqlite_config(1);
        let pool = Pool::new(&config, None).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(10)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_broken_session_discarded() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();
        let store = pool.acquire().await.unwrap();
        store.session().mark_broken();
        pool.release(store);
        assert_eq!(0, pool.stats().free);
        assert_eq!(0, pool.stats().in_use);
    }

    #[tokio::test]
    async fn test_close() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();
        let held = pool.acquire().await.unwrap();
        let (ctx, _guard) = pool.context(&WaitContext::default());

        pool.close();
        assert!(pool.is_closed());
        assert!(ctx.is_cancelled());
        let err = pool.acquire().await.err().unwrap();
        assert_eq!("pool closed", err.to_string());
        assert!(matches!(
            pool.acquire_unbounded().await.err(),
            Some(StoreError::Closed)
        ));

        drop(held);
        assert_eq!(0, pool.stats().free);
    }

    #[tokio::test]
    async fn test_admin_bootstrap() {
        let (_dir, mut config) = sqlite_config(2);
        config.admin.public_key = Some(ADMIN_KEY.into());
        let pool = Pool::new(&config, None).await.unwrap();

        let store = pool.acquire().await.unwrap();
        let admin = store.get_identity("admin@idm").await.unwrap();
        assert_eq!(Some("idm".to_string()), admin.owner);
        assert_eq!(vec![PublicKey::new([1; 32])], admin.public_keys);
        assert!(admin.is_agent());
    }

    #[tokio::test]
    async fn test_admin_bootstrap_invalid() {
        let (_dir, mut config) = sqlite_config(2);
        config.admin.username = "admin".into();
        config.admin.public_key = Some(ADMIN_KEY.into());
        let err = Pool::new(&config, None).await.err().unwrap();
        assert_eq!(ErrorCause::InvalidData, err.cause());

        config.admin.username = "admin@idm".into();
        config.admin.public_key = Some("AAAA".into());
        let err = Pool::new(&config, None).await.err().unwrap();
        assert!(matches!(err, StoreError::AdminKey { .. }));
    }

    #[tokio::test]
    async fn test_acl_cache_reset_on_release() {
        let (_dir, config) = sqlite_config(1);
        let pool = Pool::new(&config, None).await.unwrap();
        let op = Op::on_user("agent@bob", READ_ACTION);

        let store = pool.acquire().await.unwrap();
        assert_eq!(
            vec!["agent@bob", "admin@idm"],
            store.acl_for_op(&op).await.unwrap()
        );
        store
            .upsert_agent(&Identity {
                username: "agent@bob".into(),
                owner: Some("bob".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        // Identity updates through the handle drop the cached ACLs.
        assert_eq!(
            vec!["agent@bob", "bob", "admin@idm"],
            store.acl_for_op(&op).await.unwrap()
        );
        pool.release(store);

        let store = pool.acquire().await.unwrap();
        assert_eq!(
            vec!["agent@bob", "bob", "admin@idm"],
            store.acl_for_op(&op).await.unwrap()
        );
        assert_eq!(
            vec!["bob", "admin@idm"],
            store
                .acl_for_op(&Op::on_user("agent@bob", "write"))
                .await
                .unwrap()
        );
        assert_eq!(
            vec!["admin@idm"],
            store
                .acl_for_op(&Op::new(crate::authz::GLOBAL_ENTITY, "write"))
                .await
                .unwrap()
        );
        assert_eq!(
            vec![crate::authz::EVERYONE],
            store.acl_for_op(&Op::login_discharge()).await.unwrap()
        );
        assert!(
            store
                .acl_for_op(&Op::new("other", "read"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_wait() {
        let (_dir, config) = sqlite_config(4);
        let registry = MetricsRegistry::new(Registry::new());
        let pool = Pool::new(&config, Some(&registry)).await.unwrap();

        let producer = {
            let pool = pool.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let store = pool.acquire().await.unwrap();
                store.put("w1", "bob").await.unwrap();
            })
        };
        let address = pool.wait(&WaitContext::default(), "w1").await.unwrap();
        producer.await.unwrap();

        assert_eq!("bob", address);
        let store = pool.acquire().await.unwrap();
        assert_eq!(Removed::Absent, store.remove("w1").await.unwrap());
        assert!(
            registry
                .encode_text()
                .unwrap()
                .contains("identity_broker_meetings_completed_seconds_count 1")
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_wait_cancelled() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();

        let root = CancellationToken::new();
        let canceller = {
            let root = root.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                root.cancel();
            })
        };
        let err = pool
            .wait(&WaitContext::new(root), "never")
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(ErrorCause::NotFound, err.cause());
        assert!(logs_contain("gave up waiting for rendezvous"));
        assert_eq!(0, pool.stats().in_use);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_wait_cancelled_while_pool_exhausted() {
        let (_dir, mut config) = sqlite_config(1);
        config.database.request_timeout = 30;
        let pool = Pool::new(&config, None).await.unwrap();
        let _held = pool.acquire().await.unwrap();

        let root = CancellationToken::new();
        let canceller = {
            let root = root.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                root.cancel();
            })
        };
        let err = time::timeout(
            Duration::from_secs(5),
            pool.wait(&WaitContext::new(root), "never"),
        )
        .await
        .unwrap()
        .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(ErrorCause::NotFound, err.cause());
        assert!(logs_contain("gave up waiting for rendezvous"));
        assert_eq!(1, pool.stats().in_use);
    }

    #[tokio::test]
    async fn test_refresh_collection_sizes() {
        let (_dir, mut config) = sqlite_config(1);
        config.admin.public_key = Some(ADMIN_KEY.into());
        let registry = MetricsRegistry::new(Registry::new());
        let pool = Pool::new(&config, Some(&registry)).await.unwrap();

        // Counting does not wait for the exhausted session limit.
        let store = pool.acquire().await.unwrap();
        store.put("m1", "bob").await.unwrap();
        store.put("m2", "alice").await.unwrap();
        pool.refresh_collection_sizes().await;

        let text = registry.encode_text().unwrap();
        assert!(text.contains(r#"identity_broker_collection_size{collection="identity"} 1"#));
        assert!(text.contains(r#"identity_broker_collection_size{collection="meeting"} 2"#));

        store.remove("m1").await.unwrap();
        drop(store);
        pool.refresh_collection_sizes().await;
        assert!(
            registry
                .encode_text()
                .unwrap()
                .contains(r#"identity_broker_collection_size{collection="meeting"} 1"#)
        );
        assert_eq!(0, pool.stats().in_use);
    }

    #[tokio::test]
    async fn test_sweep() {
        let (_dir, mut config) = sqlite_config(2);
        config.meeting.expiry = 60;
        let registry = MetricsRegistry::new(Registry::new());
        let pool = Pool::new(&config, Some(&registry)).await.unwrap();

        {
            let store = pool.acquire().await.unwrap();
            let now = Utc::now();
            store
                .put_at("old", "login/password", "bob", now - TimeDelta::seconds(120))
                .await
                .unwrap();
            store
                .put_at("new", "login/password", "alice", now)
                .await
                .unwrap();
        }

        assert_eq!(vec!["old"], pool.sweep().await.unwrap());
        let store = pool.acquire().await.unwrap();
        assert!(store.get("old").await.is_err());
        assert_eq!("alice", store.get("new").await.unwrap());
        assert!(
            registry
                .encode_text()
                .unwrap()
                .contains("identity_broker_meetings_expired_total 1")
        );
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_close() {
        let (_dir, config) = sqlite_config(2);
        let pool = Pool::new(&config, None).await.unwrap();
        let sweeper = pool.spawn_sweeper();
        pool.close();
        time::timeout(Duration::from_secs(5), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
