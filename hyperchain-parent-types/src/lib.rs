// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Raw parent-chain types.
//!
//! These are the types a connector produces when it observes an external
//! ("parent") blockchain: block headers with their transactions, and the
//! 32-byte hashes that identify them. Everything derived from these (parent
//! blocks, commitments, delegate trees) lives in the tracker crate.

pub mod payload;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Errors from parsing a hex-encoded parent-chain hash.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashParseError {
    #[error("expected {expected} hash bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 32-byte parent-chain hash.
///
/// Rendered as lowercase hex (with or without a `0x` prefix accepted on
/// parse) for consistency across chains.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ParentHash([u8; 32]);

impl ParentHash {
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const ZERO: ParentHash = ParentHash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from hex, accepting an optional `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let s = s.trim_start_matches("0x");
        let bytes = hex::decode(s)?;
        if bytes.len() != Self::LEN {
            return Err(HashParseError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        let full = self.to_hex();
        format!("{}...{}", &full[..8], &full[full.len() - 6..])
    }
}

impl fmt::Display for ParentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ParentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParentHash({})", self.short())
    }
}

impl FromStr for ParentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ParentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

struct ParentHashVisitor;

impl Visitor<'_> for ParentHashVisitor {
    type Value = ParentHash;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a hex-encoded 32-byte hash")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        ParentHash::from_hex(v).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for ParentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(ParentHashVisitor)
    }
}

/// A transaction as observed on the parent chain.
///
/// Only the fields the tracker consumes: the originating account and the
/// opaque payload. Chain-specific detail (signatures, fees, ...) stays in
/// the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChainTx {
    /// Originating account, hex-encoded the way the parent chain renders it.
    pub origin: String,
    /// Opaque payload; recognised formats are decoded by [`payload`].
    pub payload: Vec<u8>,
}

/// A block as observed on the parent chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChainBlock {
    pub hash: ParentHash,
    pub prev_hash: ParentHash,
    pub height: u64,
    pub txs: Vec<ParentChainTx>,
}
