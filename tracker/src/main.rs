// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use hyperchain_tracker::config::TrackerNodeConfig;
use hyperchain_tracker::metrics::start_metrics_server;
use hyperchain_tracker::node::run_tracker_node;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = TrackerNodeConfig::load(&args.config_path)?;

    let registry = prometheus::Registry::new();
    let metrics_address =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), config.metrics_port);
    start_metrics_server(metrics_address, registry.clone());

    let node = run_tracker_node(config, &registry).await?;
    info!("Parent trackers running; ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    node.stop_all().await;
    Ok(())
}
