// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::connector::ConnectorError;
use crate::store::StoreError;
use hyperchain_parent_types::{HashParseError, ParentHash};

/// Errors produced by a tracker instance.
///
/// Connector and store failures terminate the tracker task; an external
/// supervisor restarts it and the walk replays from the last committed
/// snapshot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An ancestor expected on the stored canonical chain is missing.
    #[error("parent block {0} missing from store")]
    MissingAncestor(ParentHash),

    /// A reorg walked below the configured genesis height. The operator
    /// must reconfigure a lower genesis and restart.
    #[error("State machine got exceeded genesis entry (genesis: {genesis}, height: {height})")]
    GenesisExceeded { genesis: u64, height: u64 },

    #[error("invalid pointer: {0}")]
    InvalidPointer(#[from] HashParseError),

    #[error("tracker is not running")]
    NotRunning,

    #[error("tracker task failed: {0}")]
    Task(String),

    #[error("invalid tracker configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// Stable snake_case label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            TrackerError::Connector(_) => "connector",
            TrackerError::Store(_) => "store",
            TrackerError::MissingAncestor(_) => "missing_ancestor",
            TrackerError::GenesisExceeded { .. } => "genesis_exceeded",
            TrackerError::InvalidPointer(_) => "invalid_pointer",
            TrackerError::NotRunning => "not_running",
            TrackerError::Task(_) => "task",
            TrackerError::Config(_) => "config",
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
