// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An in-process simulated parent chain.
//!
//! Backs the `sim` connector id so a node can run devnets without a real
//! parent chain, and drives the tracker tests. The simulated chain is a
//! block DAG: helpers build children of any known block (so forks are
//! first-class), `set_top` moves the advertised tip, and `publish` pushes
//! a block through the registered callback exactly like a real connector
//! subscription would.

use crate::connector::{BlockCallback, ConnectorArgs, ConnectorError, ParentConnector};
use hyperchain_parent_types::{ParentChainBlock, ParentChainTx, ParentHash};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

struct SimChain {
    blocks: HashMap<ParentHash, ParentChainBlock>,
    top: ParentHash,
}

pub struct SimConnector {
    id: String,
    chain: Mutex<SimChain>,
    on_block: Mutex<Option<BlockCallback>>,
    connected: AtomicBool,
    /// Artificial latency applied to every block fetch.
    latency: Mutex<Duration>,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: AtomicBool,
}

impl SimConnector {
    /// Create a simulated chain whose genesis block carries `pointer` as
    /// its hash, at height 0.
    pub fn new(pointer: ParentHash) -> Arc<Self> {
        let genesis = ParentChainBlock {
            hash: pointer,
            prev_hash: ParentHash::ZERO,
            height: 0,
            txs: vec![],
        };
        let mut blocks = HashMap::new();
        blocks.insert(pointer, genesis);
        Arc::new(Self {
            id: "sim".to_string(),
            chain: Mutex::new(SimChain {
                blocks,
                top: pointer,
            }),
            on_block: Mutex::new(None),
            connected: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Deterministic block hash: all inputs, nothing else.
    fn derive_hash(prev: &ParentHash, height: u64, salt: u64, txs: &[ParentChainTx]) -> ParentHash {
        let mut hasher = Sha256::new();
        hasher.update(prev.as_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(salt.to_le_bytes());
        for tx in txs {
            hasher.update((tx.origin.len() as u64).to_le_bytes());
            hasher.update(tx.origin.as_bytes());
            hasher.update((tx.payload.len() as u64).to_le_bytes());
            hasher.update(&tx.payload);
        }
        ParentHash::new(hasher.finalize().into())
    }

    /// Build a child of `parent` without moving the tip. `salt`
    /// distinguishes competing children with identical transactions.
    pub fn fork_block(
        &self,
        parent: ParentHash,
        txs: Vec<ParentChainTx>,
        salt: u64,
    ) -> ParentChainBlock {
        let mut chain = self.chain.lock().unwrap();
        let height = chain
            .blocks
            .get(&parent)
            .expect("parent block must exist in simulated chain")
            .height
            + 1;
        let block = ParentChainBlock {
            hash: Self::derive_hash(&parent, height, salt, &txs),
            prev_hash: parent,
            height,
            txs,
        };
        chain.blocks.insert(block.hash, block.clone());
        block
    }

    /// Build a child of the current tip and adopt it as the new tip.
    pub fn extend(&self, txs: Vec<ParentChainTx>) -> ParentChainBlock {
        let top = self.top();
        let block = self.fork_block(top, txs, 0);
        self.set_top(block.hash);
        block
    }

    /// `extend` plus a callback delivery, as a live chain would do.
    pub fn extend_published(&self, txs: Vec<ParentChainTx>) -> ParentChainBlock {
        let block = self.extend(txs);
        self.publish(block.hash);
        block
    }

    pub fn set_top(&self, hash: ParentHash) {
        let mut chain = self.chain.lock().unwrap();
        assert!(chain.blocks.contains_key(&hash), "unknown top block");
        chain.top = hash;
    }

    /// Deliver a known block through the registered callback.
    pub fn publish(&self, hash: ParentHash) {
        let block = {
            let chain = self.chain.lock().unwrap();
            chain
                .blocks
                .get(&hash)
                .expect("published block must exist in simulated chain")
                .clone()
        };
        let callback = self.on_block.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(block);
        }
    }

    pub fn top(&self) -> ParentHash {
        self.chain.lock().unwrap().top
    }

    pub fn block(&self, hash: &ParentHash) -> Option<ParentChainBlock> {
        self.chain.lock().unwrap().blocks.get(hash).cloned()
    }

    /// Payloads submitted through `send_tx`, in order.
    pub fn sent_txs(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ParentConnector for SimConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(
        &self,
        args: &ConnectorArgs,
        on_block: BlockCallback,
    ) -> Result<(), ConnectorError> {
        if let Some(ms) = args.get("latency-ms") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| ConnectorError::Rpc(format!("invalid latency-ms: {ms}")))?;
            self.set_latency(Duration::from_millis(ms));
        }
        *self.on_block.lock().unwrap() = Some(on_block);
        self.connected.store(true, Ordering::SeqCst);
        debug!(connector = self.id, "sim connector connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.on_block.lock().unwrap().take();
    }

    async fn get_top_block(&self) -> Result<ParentHash, ConnectorError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectorError::NotConnected);
        }
        Ok(self.top())
    }

    async fn get_block_by_hash(
        &self,
        hash: &ParentHash,
    ) -> Result<ParentChainBlock, ConnectorError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectorError::NotConnected);
        }
        let latency = *self.latency.lock().unwrap();
        if latency > Duration::ZERO {
            sleep(latency).await;
        }
        self.block(hash)
            .ok_or(ConnectorError::BlockNotFound(*hash))
    }

    async fn send_tx(&self, payload: Vec<u8>) -> Result<(), ConnectorError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectorError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectorError::TxRejected("simulated rejection".to_string()));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn connect_args() -> ConnectorArgs {
        ConnectorArgs::new()
    }

    #[tokio::test]
    async fn test_extend_builds_a_linked_chain() {
        let pointer = ParentHash::new([0xaa; 32]);
        let sim = SimConnector::new(pointer);
        let b1 = sim.extend(vec![]);
        let b2 = sim.extend(vec![]);
        assert_eq!(b1.prev_hash, pointer);
        assert_eq!(b1.height, 1);
        assert_eq!(b2.prev_hash, b1.hash);
        assert_eq!(b2.height, 2);
        assert_eq!(sim.top(), b2.hash);
    }

    #[tokio::test]
    async fn test_fork_block_does_not_move_top() {
        let pointer = ParentHash::new([0xaa; 32]);
        let sim = SimConnector::new(pointer);
        let b1 = sim.extend(vec![]);
        let fork = sim.fork_block(pointer, vec![], 1);
        assert_eq!(sim.top(), b1.hash);
        assert_eq!(fork.height, 1);
        assert_ne!(fork.hash, b1.hash);
    }

    #[tokio::test]
    async fn test_hashes_are_deterministic() {
        let pointer = ParentHash::new([0xaa; 32]);
        let a = SimConnector::new(pointer).extend(vec![]);
        let b = SimConnector::new(pointer).extend(vec![]);
        assert_eq!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn test_publish_invokes_callback() {
        let pointer = ParentHash::new([0xaa; 32]);
        let sim = SimConnector::new(pointer);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        sim.connect(
            &connect_args(),
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

        sim.extend_published(vec![]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // After disconnect the callback is gone; publishing is a no-op.
        sim.disconnect().await;
        sim.disconnect().await;
        let b2 = sim.extend(vec![]);
        sim.publish(b2.hash);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_block_fails_cleanly() {
        let sim = SimConnector::new(ParentHash::new([0xaa; 32]));
        sim.connect(&connect_args(), Arc::new(|_| {})).await.unwrap();
        let unknown = ParentHash::new([0xee; 32]);
        assert_eq!(
            sim.get_block_by_hash(&unknown).await,
            Err(ConnectorError::BlockNotFound(unknown))
        );
    }

    #[tokio::test]
    async fn test_send_tx_records_and_rejects() {
        let sim = SimConnector::new(ParentHash::new([0xaa; 32]));
        sim.connect(&connect_args(), Arc::new(|_| {})).await.unwrap();

        sim.send_tx(b"one".to_vec()).await.unwrap();
        sim.send_tx(b"two".to_vec()).await.unwrap();
        assert_eq!(sim.sent_txs(), vec![b"one".to_vec(), b"two".to_vec()]);

        sim.set_fail_sends(true);
        assert!(matches!(
            sim.send_tx(b"three".to_vec()).await,
            Err(ConnectorError::TxRejected(_))
        ));
        assert_eq!(sim.sent_txs().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let sim = SimConnector::new(ParentHash::new([0xaa; 32]));
        assert_eq!(sim.get_top_block().await, Err(ConnectorError::NotConnected));
        assert_eq!(
            sim.send_tx(vec![]).await,
            Err(ConnectorError::NotConnected)
        );
    }
}
