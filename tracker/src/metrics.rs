// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

/// Per-chain tracker metrics. All metrics are labelled by chain name.
#[derive(Clone, Debug)]
pub struct TrackerMetrics {
    pub(crate) synced_height: IntGaugeVec,
    pub(crate) processed_parent_blocks: IntCounterVec,
    pub(crate) reorgs_detected: IntCounterVec,
    pub(crate) announcements: IntCounterVec,
    pub(crate) dropped_stale_tips: IntCounterVec,
    pub(crate) send_tx_errors: IntCounterVec,
}

impl TrackerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            synced_height: register_int_gauge_vec_with_registry!(
                "tracker_synced_height",
                "Height of the confirmed parent-chain tip after the latest sync",
                &["chain"],
                registry,
            )
            .unwrap(),
            processed_parent_blocks: register_int_counter_vec_with_registry!(
                "tracker_processed_parent_blocks",
                "Parent blocks derived and persisted during sync walks",
                &["chain"],
                registry,
            )
            .unwrap(),
            reorgs_detected: register_int_counter_vec_with_registry!(
                "tracker_reorgs_detected",
                "Forks that required a backward walk across histories",
                &["chain"],
                registry,
            )
            .unwrap(),
            announcements: register_int_counter_vec_with_registry!(
                "tracker_announcements",
                "Confirmed tips advertised on the parent manager",
                &["chain"],
                registry,
            )
            .unwrap(),
            dropped_stale_tips: register_int_counter_vec_with_registry!(
                "tracker_dropped_stale_tips",
                "Connector-pushed tips dropped for not increasing the height",
                &["chain"],
                registry,
            )
            .unwrap(),
            send_tx_errors: register_int_counter_vec_with_registry!(
                "tracker_send_tx_errors",
                "Commitment submissions rejected by the connector",
                &["chain"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}

/// Serve `GET /metrics` for the given registry on `addr`.
pub fn start_metrics_server(addr: SocketAddr, registry: Registry) {
    tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || {
                let registry = registry.clone();
                async move {
                    TextEncoder::new()
                        .encode_to_string(&registry.gather())
                        .unwrap_or_default()
                }
            }),
        );
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server on {addr}: {e}");
                return;
            }
        };
        info!("Metrics server listening on {addr}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server terminated: {e}");
        }
    });
}
