// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory tracker store, used when no database path is configured and
//! throughout the tests.

use crate::store::{StoreResult, TrackerStore};
use crate::types::{DelegateTrees, ParentBlock, TrackerSnapshot};
use hyperchain_parent_types::ParentHash;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    parent_state: RwLock<HashMap<ParentHash, TrackerSnapshot>>,
    parent_blocks: RwLock<HashMap<ParentHash, ParentBlock>>,
    block_states: RwLock<HashMap<ParentHash, DelegateTrees>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored parent blocks.
    pub async fn parent_block_count(&self) -> usize {
        self.parent_blocks.read().await.len()
    }
}

#[async_trait::async_trait]
impl TrackerStore for MemoryStore {
    async fn get_parent_state(
        &self,
        pointer: &ParentHash,
    ) -> StoreResult<Option<TrackerSnapshot>> {
        Ok(self.parent_state.read().await.get(pointer).cloned())
    }

    async fn write_parent_state(
        &self,
        pointer: &ParentHash,
        state: &TrackerSnapshot,
    ) -> StoreResult<()> {
        self.parent_state
            .write()
            .await
            .insert(*pointer, state.clone());
        Ok(())
    }

    async fn get_parent_block(&self, hash: &ParentHash) -> StoreResult<Option<ParentBlock>> {
        Ok(self.parent_blocks.read().await.get(hash).cloned())
    }

    async fn write_parent_block(
        &self,
        block: &ParentBlock,
        trees: &DelegateTrees,
    ) -> StoreResult<()> {
        let hash = block.hash();
        self.parent_blocks.write().await.insert(hash, block.clone());
        self.block_states.write().await.insert(hash, trees.clone());
        Ok(())
    }

    async fn get_parent_block_state(
        &self,
        hash: &ParentHash,
    ) -> StoreResult<Option<DelegateTrees>> {
        Ok(self.block_states.read().await.get(hash).cloned())
    }
}
