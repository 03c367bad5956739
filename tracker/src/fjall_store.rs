// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistent tracker store backed by fjall, one partition per keyspace.
//! Values are bincode-encoded; keys are the raw 32 hash bytes.

use crate::store::{StoreError, StoreResult, TrackerStore};
use crate::types::{DelegateTrees, ParentBlock, TrackerSnapshot};
use fjall::{Config, Keyspace, Partition, PartitionCreateOptions};
use hyperchain_parent_types::ParentHash;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub struct FjallStore {
    _keyspace: Keyspace,
    parent_state: Partition,
    parent_blocks: Partition,
    block_states: Partition,
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let keyspace = Keyspace::open(Config::new(path)).map_err(io_err)?;
        let parent_state = keyspace
            .open_partition("parent_state", PartitionCreateOptions::default())
            .map_err(io_err)?;
        let parent_blocks = keyspace
            .open_partition("parent_block", PartitionCreateOptions::default())
            .map_err(io_err)?;
        let block_states = keyspace
            .open_partition("parent_block_state", PartitionCreateOptions::default())
            .map_err(io_err)?;
        Ok(Self {
            _keyspace: keyspace,
            parent_state,
            parent_blocks,
            block_states,
        })
    }
}

fn io_err(e: fjall::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

fn get<T: DeserializeOwned>(partition: &Partition, key: &ParentHash) -> StoreResult<Option<T>> {
    match partition.get(key.as_bytes()).map_err(io_err)? {
        Some(bytes) => {
            let value = bincode::deserialize(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn put<T: Serialize>(partition: &Partition, key: &ParentHash, value: &T) -> StoreResult<()> {
    let bytes = bincode::serialize(value).map_err(|e| StoreError::Codec(e.to_string()))?;
    partition.insert(key.as_bytes(), bytes).map_err(io_err)
}

#[async_trait::async_trait]
impl TrackerStore for FjallStore {
    async fn get_parent_state(
        &self,
        pointer: &ParentHash,
    ) -> StoreResult<Option<TrackerSnapshot>> {
        get(&self.parent_state, pointer)
    }

    async fn write_parent_state(
        &self,
        pointer: &ParentHash,
        state: &TrackerSnapshot,
    ) -> StoreResult<()> {
        put(&self.parent_state, pointer, state)
    }

    async fn get_parent_block(&self, hash: &ParentHash) -> StoreResult<Option<ParentBlock>> {
        get(&self.parent_blocks, hash)
    }

    async fn write_parent_block(
        &self,
        block: &ParentBlock,
        trees: &DelegateTrees,
    ) -> StoreResult<()> {
        put(&self.parent_blocks, &block.hash(), block)?;
        put(&self.block_states, &block.hash(), trees)
    }

    async fn get_parent_block_state(
        &self,
        hash: &ParentHash,
    ) -> StoreResult<Option<DelegateTrees>> {
        get(&self.block_states, hash)
    }
}
