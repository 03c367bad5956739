// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Records derived from parent-chain blocks.

use hyperchain_parent_types::ParentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A commitment extracted from a parent-chain transaction: a delegate
/// account committing to a hyper-chain key block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// The committing delegate's parent-chain account.
    pub delegate: String,
    /// The hyper-chain key block being committed to.
    pub keyblock_hash: ParentHash,
}

impl Commitment {
    /// Deterministic content hash, used in the parent block header.
    pub fn content_hash(&self) -> ParentHash {
        let mut hasher = Sha256::new();
        hasher.update(b"hc1:commitment");
        hasher.update((self.delegate.len() as u64).to_le_bytes());
        hasher.update(self.delegate.as_bytes());
        hasher.update(self.keyblock_hash.as_bytes());
        ParentHash::new(hasher.finalize().into())
    }
}

/// Header of a derived parent block. Content-addressed by the observed
/// parent-chain block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentBlockHeader {
    pub hash: ParentHash,
    pub prev_hash: ParentHash,
    pub height: u64,
    /// Content hashes of the commitments, in parent-chain tx order.
    pub commitment_hashes: Vec<ParentHash>,
}

/// A derived parent block: header plus the commitments it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentBlock {
    pub header: ParentBlockHeader,
    pub commitments: Vec<Commitment>,
}

impl ParentBlock {
    pub fn hash(&self) -> ParentHash {
        self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// Accumulated delegate registrations at a given parent block.
///
/// Ordered map so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateTrees {
    entries: BTreeMap<String, Vec<u8>>,
}

impl DelegateTrees {
    /// Register (or re-register) an account as a delegate.
    pub fn enter(&mut self, account: String, registration: Vec<u8>) {
        self.entries.insert(account, registration);
    }

    pub fn get(&self, account: &str) -> Option<&[u8]> {
        self.entries.get(account).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.entries.iter()
    }
}

/// The persisted tracker state, keyed in the store by `pointer`.
///
/// The in-memory tracker additionally carries the connector args and the
/// pending downstream queue; neither is persisted, so neither appears
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Immutable history origin (configured genesis pointer).
    pub pointer: ParentHash,
    /// Height below which a reorg is fatal.
    pub genesis: u64,
    /// Confirmed canonical tip after the latest successful sync.
    pub indicator: ParentHash,
    /// Height of `indicator`.
    pub height: u64,
    /// Hash being walked during sync; equals `indicator` when synced.
    pub cursor: ParentHash,
    /// Remaining backward steps until the cursor meets the old indicator.
    pub index: u64,
    /// Delegate trees at `cursor`.
    pub trees: DelegateTrees,
}
