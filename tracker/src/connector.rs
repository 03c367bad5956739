// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connector capability: the adapter between a tracker and a real parent
//! chain.
//!
//! A connector is trusted for consensus (the tracker does not re-validate
//! parent-chain rules) but not for delivery: every block pushed through the
//! `on_block` callback is re-checked by the tracker's own height and hash
//! bookkeeping.

use hyperchain_parent_types::{ParentChainBlock, ParentHash};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connect parameters, as loaded from configuration.
pub type ConnectorArgs = BTreeMap<String, String>;

/// Installed at `connect` time; invoked for every new top the connector
/// observes.
pub type BlockCallback = Arc<dyn Fn(ParentChainBlock) + Send + Sync>;

/// Error type for connector operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("block not found: {0}")]
    BlockNotFound(ParentHash),

    #[error("transaction rejected: {0}")]
    TxRejected(String),

    #[error("connector is not connected")]
    NotConnected,
}

impl ConnectorError {
    /// Whether a supervisor restart is expected to clear this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectorError::Rpc(_) | ConnectorError::NotConnected)
    }
}

/// Adapter to a parent chain.
///
/// `get_block_by_hash` is total on hashes the connector has ever produced
/// and fails cleanly otherwise. `disconnect` is idempotent. The handle is
/// owned by exactly one tracker.
#[async_trait::async_trait]
pub trait ParentConnector: Send + Sync {
    /// Connector identifier, e.g. `sim`.
    fn id(&self) -> &str;

    /// Connect and install the new-top callback.
    async fn connect(
        &self,
        args: &ConnectorArgs,
        on_block: BlockCallback,
    ) -> Result<(), ConnectorError>;

    async fn disconnect(&self);

    /// Hash of the current best tip known to the connector.
    async fn get_top_block(&self) -> Result<ParentHash, ConnectorError>;

    async fn get_block_by_hash(&self, hash: &ParentHash)
        -> Result<ParentChainBlock, ConnectorError>;

    /// Submit a transaction; semantics mirror the parent chain.
    async fn send_tx(&self, payload: Vec<u8>) -> Result<(), ConnectorError>;
}
