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

//! Main identity broker executable.
//!
//! Opens the broker pool, runs the rendezvous sweeper and serves the
//! operational endpoints until interrupted.

use clap::Parser;
use color_eyre::eyre::{Report, Result};
use eyre::WrapErr;
use prometheus::Registry;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, Targets},
    prelude::*,
};

use identity_broker::api::{self, ApiState};
use identity_broker::config::Config;
use identity_broker::metrics::MetricsRegistry;
use identity_broker::store::Pool;

/// Identity broker.
///
/// Federates external identity providers into local identities and hands
/// login results over to the requests waiting for them.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the broker config file.
    #[arg(
        short,
        long,
        default_value = "/etc/identity-broker/identity-broker.conf"
    )]
    config: PathBuf,

    /// Verbosity level. Repeat to increase level.
    #[arg(short, long, global=true, action = clap::ArgAction::Count, display_order = 920)]
    pub verbose: u8,

    /// Listening port of the operational endpoints.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    let args = Args::parse();

    let filter = Targets::new()
        .with_default(match args.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        })
        .with_target("sqlx", LevelFilter::WARN);

    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(log_layer).init();

    info!("Starting the identity broker...");

    let cfg = Config::new(args.config)?;
    let metrics = Arc::new(MetricsRegistry::new(Registry::new()));
    let pool = Pool::new(&cfg, Some(&metrics))
        .await
        .wrap_err("Opening the broker pool failed")?;

    let sweeper = pool.spawn_sweeper();

    let app = api::router(ApiState {
        pool: pool.clone(),
        metrics,
    });

    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let listener = TcpListener::bind(&address).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close();
    sweeper
        .await
        .inspect_err(|e| error!("sweeper task failed: {e}"))
        .ok();
    Ok(())
}

/// Install shutdown and interrupt signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .inspect_err(|e| error!("failed to install Ctrl+C handler: {e}"))
            .ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = signal::unix::signal(signal::unix::SignalKind::terminate())
            .inspect_err(|e| error!("failed to install signal handler: {e}"))
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown requested");
}
