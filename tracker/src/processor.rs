// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The block processor: turns an observed parent-chain block into a
//! derived parent block plus the updated delegate-trees snapshot.
//!
//! Pure and deterministic: the same `(block, trees)` input always yields
//! the same output, so re-processing a block during a reorg produces
//! byte-identical records. Persistence is the caller's job.

use crate::types::{Commitment, DelegateTrees, ParentBlock, ParentBlockHeader};
use hyperchain_parent_types::payload::ParentPayload;
use hyperchain_parent_types::ParentChainBlock;

/// Result of processing a single parent-chain block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedBlock {
    pub block: ParentBlock,
    pub trees: DelegateTrees,
}

/// Extract commitments and delegate registrations from `block`, starting
/// from the delegate trees of its parent.
///
/// Transactions with unrecognised payloads are ignored; the commitment
/// hash list in the header preserves parent-chain tx order.
pub fn process_block(block: &ParentChainBlock, trees: DelegateTrees) -> ProcessedBlock {
    let mut trees = trees;
    let mut commitments = Vec::new();

    for tx in &block.txs {
        match ParentPayload::decode(&tx.payload) {
            ParentPayload::Commitment { keyblock_hash } => {
                commitments.push(Commitment {
                    delegate: tx.origin.clone(),
                    keyblock_hash,
                });
            }
            ParentPayload::Delegate { registration } => {
                trees.enter(tx.origin.clone(), registration);
            }
            ParentPayload::Other => {}
        }
    }

    let header = ParentBlockHeader {
        hash: block.hash,
        prev_hash: block.prev_hash,
        height: block.height,
        commitment_hashes: commitments.iter().map(|c| c.content_hash()).collect(),
    };

    ProcessedBlock {
        block: ParentBlock {
            header,
            commitments,
        },
        trees,
    }
}
