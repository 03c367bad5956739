// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Store capability consumed by the tracker.
//!
//! Three keyspaces: `parent_state` (committed tracker snapshot per
//! pointer), `parent_block` (derived parent block per parent-chain hash)
//! and `parent_block_state` (delegate-trees snapshot per parent-chain
//! hash). Atomicity is per key; the tracker never needs a multi-key
//! transaction. Overwrites are permitted — re-processing a block during a
//! reorg produces identical content.

use crate::types::{DelegateTrees, ParentBlock, TrackerSnapshot};
use hyperchain_parent_types::ParentHash;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait TrackerStore: Send + Sync {
    /// Last committed tracker snapshot for this pointer, if any.
    async fn get_parent_state(&self, pointer: &ParentHash)
        -> StoreResult<Option<TrackerSnapshot>>;

    async fn write_parent_state(
        &self,
        pointer: &ParentHash,
        state: &TrackerSnapshot,
    ) -> StoreResult<()>;

    async fn get_parent_block(&self, hash: &ParentHash) -> StoreResult<Option<ParentBlock>>;

    /// Persist a parent block together with its delegate-trees snapshot.
    async fn write_parent_block(
        &self,
        block: &ParentBlock,
        trees: &DelegateTrees,
    ) -> StoreResult<()>;

    async fn get_parent_block_state(
        &self,
        hash: &ParentHash,
    ) -> StoreResult<Option<DelegateTrees>>;
}
