// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::connector::ConnectorArgs;
use anyhow::{anyhow, bail, Context, Result};
use hyperchain_parent_types::ParentHash;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One tracked parent chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParentChainConfig {
    /// Name this chain is announced under, e.g. "btc".
    pub name: String,
    /// Connector id, e.g. "sim".
    pub connector: String,
    /// Connector connect parameters.
    #[serde(default)]
    pub args: ConnectorArgs,
    /// Hex-encoded 32-byte hash of the history origin.
    pub pointer: String,
    /// Height below which reorgs are fatal.
    pub genesis: u64,
}

impl ParentChainConfig {
    pub fn pointer_hash(&self) -> Result<ParentHash> {
        ParentHash::from_hex(&self.pointer)
            .map_err(|e| anyhow!("parent chain '{}': {e}", self.name))
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrackerNodeConfig {
    /// Port for the prometheus /metrics endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Database directory; in-memory storage when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    pub parents: Vec<ParentChainConfig>,
}

fn default_metrics_port() -> u16 {
    9184
}

impl TrackerNodeConfig {
    /// Load from a YAML (`.yaml`/`.yml`) or JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parents.is_empty() {
            bail!("no parent chains configured");
        }
        let mut names = HashSet::new();
        for parent in &self.parents {
            if parent.name.is_empty() {
                bail!("parent chain with empty name");
            }
            if !names.insert(parent.name.as_str()) {
                bail!("duplicate parent chain name '{}'", parent.name);
            }
            parent.pointer_hash()?;
        }
        Ok(())
    }
}
