// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide announcement bus ("parent manager").
//!
//! Each tracker announces its confirmed tip here exactly once per
//! successful sync. Downstream consumers either poll `latest` or hold a
//! watch subscription per chain.

use hyperchain_parent_types::ParentHash;
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};
use tracing::info;

#[derive(Debug)]
pub struct ParentManager {
    channels: RwLock<HashMap<String, watch::Sender<Option<ParentHash>>>>,
}

impl ParentManager {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Advertise a newly confirmed tip for `from`.
    pub async fn announce(&self, from: &str, indicator: ParentHash) {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(from.to_string())
            .or_insert_with(|| watch::channel(None).0);
        let _ = sender.send(Some(indicator));
        info!(chain = from, indicator = %indicator.short(), "announced parent tip");
    }

    /// Most recently announced tip for `from`, if any.
    pub async fn latest(&self, from: &str) -> Option<ParentHash> {
        let channels = self.channels.read().await;
        channels.get(from).and_then(|sender| *sender.borrow())
    }

    /// Subscribe to announcements for `from`. Subscribing before the first
    /// announcement is fine; the receiver starts at `None`.
    pub async fn subscribe(&self, from: &str) -> watch::Receiver<Option<ParentHash>> {
        let mut channels = self.channels.write().await;
        channels
            .entry(from.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

impl Default for ParentManager {
    fn default() -> Self {
        Self::new()
    }
}
