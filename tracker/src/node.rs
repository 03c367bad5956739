// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node wiring: builds the store and one tracker per configured parent
//! chain, and tears them down together.

use crate::config::{ParentChainConfig, TrackerNodeConfig};
use crate::connector::ParentConnector;
use crate::fjall_store::FjallStore;
use crate::manager::ParentManager;
use crate::memory_store::MemoryStore;
use crate::metrics::TrackerMetrics;
use crate::sim_connector::SimConnector;
use crate::store::TrackerStore;
use crate::tracker::{Tracker, TrackerHandle};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct TrackerNode {
    manager: Arc<ParentManager>,
    handles: Vec<TrackerHandle>,
}

impl TrackerNode {
    pub fn manager(&self) -> Arc<ParentManager> {
        self.manager.clone()
    }

    pub fn handles(&self) -> &[TrackerHandle] {
        &self.handles
    }

    pub fn handle(&self, name: &str) -> Option<&TrackerHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    /// Stop every tracker, reporting (but not aborting on) individual
    /// failures.
    pub async fn stop_all(self) {
        for handle in self.handles {
            let name = handle.name().to_string();
            if let Err(e) = handle.stop().await {
                warn!("[{name}] Tracker stop returned error: {e}");
            }
        }
    }
}

fn resolve_connector(config: &ParentChainConfig) -> Result<Arc<dyn ParentConnector>> {
    match config.connector.as_str() {
        "sim" => {
            let pointer = config.pointer_hash()?;
            Ok(SimConnector::new(pointer))
        }
        other => bail!(
            "parent chain '{}': unknown connector id '{other}'",
            config.name
        ),
    }
}

/// Start all configured trackers against a shared store and manager.
pub async fn run_tracker_node(
    config: TrackerNodeConfig,
    registry: &prometheus::Registry,
) -> Result<TrackerNode> {
    config.validate()?;

    let store: Arc<dyn TrackerStore> = match &config.db_path {
        Some(path) => {
            info!("Opening tracker store at {}", path.display());
            Arc::new(FjallStore::open(path).context("opening tracker store")?)
        }
        None => {
            info!("No db-path configured; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let manager = Arc::new(ParentManager::new());
    let metrics = Arc::new(TrackerMetrics::new(registry));
    let mut handles = Vec::with_capacity(config.parents.len());

    for parent in &config.parents {
        let connector = resolve_connector(parent)?;
        let handle = Tracker::start(
            parent,
            connector,
            store.clone(),
            manager.clone(),
            Some(metrics.clone()),
        )
        .await
        .with_context(|| format!("starting tracker for '{}'", parent.name))?;
        info!(
            "[{}] Tracker started (connector '{}', genesis {})",
            parent.name, parent.connector, parent.genesis
        );
        handles.push(handle);
    }

    Ok(TrackerNode { manager, handles })
}
