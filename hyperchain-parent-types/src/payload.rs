// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Recognition and decoding of parent-chain transaction payloads.
//!
//! Two payload formats are recognised, both carrying a fixed ASCII prefix:
//!
//! - commitment: `hc1:commit:` followed by exactly 32 bytes naming a
//!   hyper-chain key-block hash;
//! - delegate registration: `hc1:delegate:` followed by a non-empty
//!   registration blob.
//!
//! Everything else decodes to [`ParentPayload::Other`]. Decoding is total:
//! malformed bytes never fail, they are simply not recognised.

use crate::ParentHash;

/// Prefix of a commitment payload.
pub const COMMITMENT_PREFIX: &[u8] = b"hc1:commit:";

/// Prefix of a delegate-registration payload.
pub const DELEGATE_PREFIX: &[u8] = b"hc1:delegate:";

/// A decoded parent-chain transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentPayload {
    /// The transaction commits to a hyper-chain key block.
    Commitment { keyblock_hash: ParentHash },
    /// The transaction registers its origin account as a delegate.
    Delegate { registration: Vec<u8> },
    /// Not a recognised payload; ignored by the tracker.
    Other,
}

impl ParentPayload {
    /// Decode a raw payload. Total: never fails.
    pub fn decode(bytes: &[u8]) -> Self {
        if let Some(rest) = bytes.strip_prefix(COMMITMENT_PREFIX) {
            if rest.len() == ParentHash::LEN {
                let mut hash = [0u8; ParentHash::LEN];
                hash.copy_from_slice(rest);
                return ParentPayload::Commitment {
                    keyblock_hash: ParentHash::new(hash),
                };
            }
            return ParentPayload::Other;
        }
        if let Some(rest) = bytes.strip_prefix(DELEGATE_PREFIX) {
            if !rest.is_empty() {
                return ParentPayload::Delegate {
                    registration: rest.to_vec(),
                };
            }
        }
        ParentPayload::Other
    }

    pub fn is_commitment(&self) -> bool {
        matches!(self, ParentPayload::Commitment { .. })
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, ParentPayload::Delegate { .. })
    }
}

/// Encode a commitment payload for submission to the parent chain.
pub fn commitment_payload(keyblock_hash: &ParentHash) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMITMENT_PREFIX.len() + ParentHash::LEN);
    out.extend_from_slice(COMMITMENT_PREFIX);
    out.extend_from_slice(keyblock_hash.as_bytes());
    out
}

/// Encode a delegate-registration payload.
pub fn delegate_payload(registration: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DELEGATE_PREFIX.len() + registration.len());
    out.extend_from_slice(DELEGATE_PREFIX);
    out.extend_from_slice(registration);
    out
}
