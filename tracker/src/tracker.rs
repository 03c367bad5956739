// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The per-chain tracker state machine.
//!
//! Each tracker is a single tokio task that exclusively owns its state and
//! services a mailbox. Three states:
//!
//! - `fetched`: a new top was announced; walk backward from it, one block
//!   per internal step, until the walk meets the old canonical tip.
//! - `migrated`: the walk exhausted the expected number of new blocks
//!   without meeting the old tip, so a fork exists; keep walking both the
//!   new chain (via the connector) and the stored chain (via the cursor)
//!   until they share an ancestor, or fail fatally if that would descend
//!   below the configured genesis height.
//! - `synced`: steady state; the confirmed tip has been committed and
//!   announced, and client requests are serviced.
//!
//! Internal walk steps are carried on a dedicated front-run queue, so the
//! mailbox is only read in `synced`. Connector pushes and client requests
//! arriving mid-walk simply wait in the mailbox, in arrival order, until
//! the walk commits — which is exactly the deferral the protocol requires:
//! clients can never observe mid-sync state, and a request sent during a
//! walk is answered only after the new tip has been announced.

use crate::config::ParentChainConfig;
use crate::connector::{BlockCallback, ConnectorError, ParentConnector};
use crate::error::{TrackerError, TrackerResult};
use crate::manager::ParentManager;
use crate::metrics::TrackerMetrics;
use crate::processor::process_block;
use crate::store::TrackerStore;
use crate::types::{DelegateTrees, ParentBlock, TrackerSnapshot};
use hyperchain_parent_types::{ParentChainBlock, ParentHash};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mailbox events. `Publish` comes from the connector callback; the rest
/// are client requests carrying a reply channel answered exactly once.
pub(crate) enum TrackerEvent {
    Publish(ParentChainBlock),
    SendTx {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
    ProcessBlock {
        hash: ParentHash,
        reply: oneshot::Sender<Option<ParentBlock>>,
    },
    Pop {
        reply: oneshot::Sender<Option<ParentBlock>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Fetched,
    Migrated,
    Synced,
}

/// The tracker's owned state.
///
/// `indicator`/`height` describe the confirmed canonical tip and are
/// rewritten only on entry into `synced`. `cursor`/`index` drive the
/// backward walk. `queue` holds the parent blocks produced by the current
/// sync, in chain order, for downstream `pop`.
#[derive(Debug, Clone)]
struct TrackerData {
    pointer: ParentHash,
    genesis: u64,
    indicator: ParentHash,
    height: u64,
    cursor: ParentHash,
    index: u64,
    queue: VecDeque<ParentBlock>,
    trees: DelegateTrees,
}

impl TrackerData {
    fn from_snapshot(snapshot: TrackerSnapshot) -> Self {
        Self {
            pointer: snapshot.pointer,
            genesis: snapshot.genesis,
            indicator: snapshot.indicator,
            height: snapshot.height,
            cursor: snapshot.cursor,
            index: snapshot.index,
            queue: VecDeque::new(),
            trees: snapshot.trees,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            pointer: self.pointer,
            genesis: self.genesis,
            indicator: self.indicator,
            height: self.height,
            cursor: self.cursor,
            index: self.index,
            trees: self.trees.clone(),
        }
    }

    /// A new tip entered the machine: move `indicator`/`height` to it and
    /// derive the number of backward steps expected until the walk meets
    /// the old tip. `cursor` keeps pointing at the old tip so the walk can
    /// recognise it.
    fn indicate(&mut self, block: &ParentChainBlock) {
        self.index = block.height.saturating_sub(self.height);
        self.height = block.height;
        self.indicator = block.hash;
    }

    /// One backward step completed.
    fn locate(&mut self, _block: &ParentChainBlock) {
        self.index = self.index.saturating_sub(1);
    }
}

/// Handle to a running tracker. Dropping the handle does not stop the
/// task; call [`TrackerHandle::stop`].
#[derive(Debug)]
pub struct TrackerHandle {
    name: String,
    tx: mpsc::UnboundedSender<TrackerEvent>,
    cancel: CancellationToken,
    join: JoinHandle<TrackerResult<()>>,
}

impl TrackerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a commitment transaction to the parent chain. Deferred while
    /// a sync is in progress; answered exactly once.
    pub async fn send_tx(&self, payload: Vec<u8>) -> TrackerResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TrackerEvent::SendTx { payload, reply })
            .map_err(|_| TrackerError::NotRunning)?;
        let result = rx.await.map_err(|_| TrackerError::NotRunning)?;
        Ok(result?)
    }

    /// Fetch a stored parent block.
    pub async fn process_block(&self, hash: ParentHash) -> TrackerResult<Option<ParentBlock>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TrackerEvent::ProcessBlock { hash, reply })
            .map_err(|_| TrackerError::NotRunning)?;
        rx.await.map_err(|_| TrackerError::NotRunning)
    }

    /// Dequeue the next parent block produced by the most recent sync.
    pub async fn pop(&self) -> TrackerResult<Option<ParentBlock>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TrackerEvent::Pop { reply })
            .map_err(|_| TrackerError::NotRunning)?;
        rx.await.map_err(|_| TrackerError::NotRunning)
    }

    /// Inject a new parent-chain top. Intended for the connector callback.
    pub fn publish(&self, block: ParentChainBlock) {
        let _ = self.tx.send(TrackerEvent::Publish(block));
    }

    /// Stop the tracker and wait for it to wind down (disconnecting the
    /// connector on the way out).
    pub async fn stop(self) -> TrackerResult<()> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| TrackerError::Task(e.to_string()))?
    }

    /// Wait for the tracker task to exit on its own, returning its final
    /// result. Useful to observe fatal stops.
    pub async fn join(self) -> TrackerResult<()> {
        self.join
            .await
            .map_err(|e| TrackerError::Task(e.to_string()))?
    }
}

pub struct Tracker {
    name: String,
    connector: Arc<dyn ParentConnector>,
    store: Arc<dyn TrackerStore>,
    manager: Arc<ParentManager>,
    metrics: Option<Arc<TrackerMetrics>>,
    data: TrackerData,
    state: TrackerState,
    rx: mpsc::UnboundedReceiver<TrackerEvent>,
    /// Self-posted `added_block` walk steps, strictly FIFO and always
    /// drained before the mailbox is read.
    internal: VecDeque<ParentChainBlock>,
    cancel: CancellationToken,
}

impl Tracker {
    /// Connect, initialise and load persistent state, then spawn the
    /// state-machine task.
    pub async fn start(
        config: &ParentChainConfig,
        connector: Arc<dyn ParentConnector>,
        store: Arc<dyn TrackerStore>,
        manager: Arc<ParentManager>,
        metrics: Option<Arc<TrackerMetrics>>,
    ) -> TrackerResult<TrackerHandle> {
        let pointer = ParentHash::from_hex(&config.pointer)?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Republish every connector-observed block into our own mailbox.
        let callback_tx = tx.clone();
        let on_block: BlockCallback = Arc::new(move |block| {
            let _ = callback_tx.send(TrackerEvent::Publish(block));
        });
        connector.connect(&config.args, on_block).await?;

        let data = match Self::load_state(
            &config.name,
            store.as_ref(),
            connector.as_ref(),
            pointer,
            config.genesis,
        )
        .await
        {
            Ok(data) => data,
            Err(e) => {
                connector.disconnect().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let tracker = Tracker {
            name: config.name.clone(),
            connector,
            store,
            manager,
            metrics,
            data,
            state: TrackerState::Synced,
            rx,
            internal: VecDeque::new(),
            cancel: cancel.clone(),
        };
        let name = config.name.clone();
        let join = tokio::spawn(tracker.run());

        Ok(TrackerHandle {
            name,
            tx,
            cancel,
            join,
        })
    }

    /// `init_state` then `sync_state`: create the genesis parent block and
    /// the initial snapshot if this pointer has never been tracked, then
    /// reload whatever is committed. The live configuration's genesis
    /// height wins over the persisted one — lowering it is the operator
    /// remedy after a genesis-exceeded stop.
    async fn load_state(
        name: &str,
        store: &dyn TrackerStore,
        connector: &dyn ParentConnector,
        pointer: ParentHash,
        genesis: u64,
    ) -> TrackerResult<TrackerData> {
        if store.get_parent_state(&pointer).await?.is_none() {
            let genesis_block = connector.get_block_by_hash(&pointer).await?;
            let processed = process_block(&genesis_block, DelegateTrees::default());
            store
                .write_parent_block(&processed.block, &processed.trees)
                .await?;
            let snapshot = TrackerSnapshot {
                pointer,
                genesis,
                indicator: pointer,
                height: genesis_block.height,
                cursor: pointer,
                index: 0,
                trees: processed.trees,
            };
            store.write_parent_state(&pointer, &snapshot).await?;
            info!(
                "[{name}] Derived genesis parent block {} at height {}",
                genesis_block.hash.short(),
                genesis_block.height
            );
        }

        let snapshot = store
            .get_parent_state(&pointer)
            .await?
            .ok_or_else(|| TrackerError::Config("initial tracker state not persisted".into()))?;
        let mut data = TrackerData::from_snapshot(snapshot);
        data.genesis = genesis;
        Ok(data)
    }

    async fn run(mut self) -> TrackerResult<()> {
        let result = self.drive().await;
        self.connector.disconnect().await;
        match &result {
            Ok(()) => info!("[{}] Tracker stopped", self.name),
            Err(e) => error!("[{}] Tracker terminated: {e}", self.name),
        }
        result
    }

    async fn drive(&mut self) -> TrackerResult<()> {
        self.prime().await?;
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            // Walk steps first, strictly in order. The mailbox is not
            // touched until the walk has committed, so anything arriving
            // meanwhile is deferred in arrival order.
            if let Some(block) = self.internal.pop_front() {
                self.on_added_block(block).await?;
                continue;
            }

            debug_assert_eq!(self.state, TrackerState::Synced);
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = self.rx.recv() => event,
            };
            let Some(event) = event else { return Ok(()) };
            self.on_synced_event(event).await?;
        }
    }

    /// Obtain the connector's current top and either start a walk toward
    /// it or settle straight into `synced` (restart with no new blocks).
    async fn prime(&mut self) -> TrackerResult<()> {
        let top_hash = self.connector.get_top_block().await?;
        let top = self.connector.get_block_by_hash(&top_hash).await?;

        if top.height < self.data.height || top.hash == self.data.indicator {
            self.enter_synced().await
        } else {
            info!(
                "[{}] Priming from parent top {} at height {} (known height {})",
                self.name,
                top.hash.short(),
                top.height,
                self.data.height
            );
            self.begin_sync(top);
            Ok(())
        }
    }

    /// Accept `block` as the new target tip and start the backward walk.
    fn begin_sync(&mut self, block: ParentChainBlock) {
        // The queue holds the blocks of the current sync only; anything
        // the downstream did not drain is superseded.
        self.data.queue.clear();
        self.data.indicate(&block);
        self.state = TrackerState::Fetched;
        self.internal.push_back(block);
    }

    async fn on_added_block(&mut self, block: ParentChainBlock) -> TrackerResult<()> {
        match self.state {
            TrackerState::Fetched => self.fetched_added_block(block).await,
            TrackerState::Migrated => self.migrated_added_block(block).await,
            TrackerState::Synced => {
                // Walk steps only exist while syncing.
                warn!("[{}] Dropping stray walk step in synced state", self.name);
                Ok(())
            }
        }
    }

    /// Linear extension from a new tip.
    async fn fetched_added_block(&mut self, block: ParentChainBlock) -> TrackerResult<()> {
        if block.hash == self.data.cursor {
            // Reached the old canonical chain with no fork.
            return self.enter_synced().await;
        }

        if self.data.index > 0 {
            self.process_and_queue(&block).await?;
            let prev = self.connector.get_block_by_hash(&block.prev_hash).await?;
            self.data.locate(&block);
            self.internal.push_back(prev);
            return Ok(());
        }

        // The expected number of new blocks is exhausted and the hash does
        // not match the old tip: the histories fork.
        info!(
            "[{}] Fork detected at height {}: {} does not extend {}",
            self.name,
            block.height,
            block.hash.short(),
            self.data.cursor.short()
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .reorgs_detected
                .with_label_values(&[&self.name])
                .inc();
        }
        self.state = TrackerState::Migrated;
        self.internal.push_back(block);
        Ok(())
    }

    /// Backward walk across a fork: descend the new chain and the stored
    /// chain in lockstep until they share an ancestor.
    async fn migrated_added_block(&mut self, block: ParentChainBlock) -> TrackerResult<()> {
        self.process_and_queue(&block).await?;

        let cursor_block = self
            .store
            .get_parent_block(&self.data.cursor)
            .await?
            .ok_or(TrackerError::MissingAncestor(self.data.cursor))?;
        let db_prev_hash = cursor_block.header.prev_hash;

        if block.prev_hash == db_prev_hash {
            // Both histories descend from the same parent.
            return self.enter_synced().await;
        }

        if block.height >= self.data.genesis {
            let prev = self.connector.get_block_by_hash(&block.prev_hash).await?;
            self.data.locate(&block);
            self.data.cursor = db_prev_hash;
            self.internal.push_back(prev);
            return Ok(());
        }

        Err(TrackerError::GenesisExceeded {
            genesis: self.data.genesis,
            height: block.height,
        })
    }

    /// Derive and persist the parent block for one walked block, and make
    /// it available to downstream `pop`.
    ///
    /// The delegate trees are rebuilt from the stored snapshot of the
    /// parent block rather than from the carried state, so re-walks over a
    /// reorg start from the right accumulation point; a parent above the
    /// stored chain has no snapshot yet and contributes the empty tree.
    async fn process_and_queue(&mut self, block: &ParentChainBlock) -> TrackerResult<()> {
        let prev_trees = self
            .store
            .get_parent_block_state(&block.prev_hash)
            .await?
            .unwrap_or_default();
        let processed = process_block(block, prev_trees);
        self.store
            .write_parent_block(&processed.block, &processed.trees)
            .await?;
        debug!(
            "[{}] Processed parent block {} at height {} ({} commitments, {} delegates)",
            self.name,
            block.hash.short(),
            block.height,
            processed.block.commitments.len(),
            processed.trees.len()
        );
        self.data.trees = processed.trees;
        // Walks run tip-down; prepend so the queue drains in chain order.
        self.data.queue.push_front(processed.block);
        if let Some(metrics) = &self.metrics {
            metrics
                .processed_parent_blocks
                .with_label_values(&[&self.name])
                .inc();
        }
        Ok(())
    }

    /// Commit the walk: the new tip becomes the canonical reference point,
    /// the snapshot is persisted, and only then is the tip announced.
    async fn enter_synced(&mut self) -> TrackerResult<()> {
        self.data.cursor = self.data.indicator;
        self.data.index = 0;
        self.store
            .write_parent_state(&self.data.pointer, &self.data.snapshot())
            .await?;
        self.manager
            .announce(&self.name, self.data.indicator)
            .await;
        info!(
            "[{}] Synced to parent tip {} at height {} ({} queued)",
            self.name,
            self.data.indicator.short(),
            self.data.height,
            self.data.queue.len()
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .synced_height
                .with_label_values(&[&self.name])
                .set(self.data.height as i64);
            metrics
                .announcements
                .with_label_values(&[&self.name])
                .inc();
        }
        self.state = TrackerState::Synced;
        Ok(())
    }

    async fn on_synced_event(&mut self, event: TrackerEvent) -> TrackerResult<()> {
        match event {
            TrackerEvent::Publish(block) => {
                if block.height < self.data.height || block.hash == self.data.indicator {
                    debug!(
                        "[{}] Dropping stale tip {} at height {} (current height {})",
                        self.name,
                        block.hash.short(),
                        block.height,
                        self.data.height
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .dropped_stale_tips
                            .with_label_values(&[&self.name])
                            .inc();
                    }
                    return Ok(());
                }
                info!(
                    "[{}] New parent top {} at height {}",
                    self.name,
                    block.hash.short(),
                    block.height
                );
                self.begin_sync(block);
            }
            TrackerEvent::SendTx { payload, reply } => {
                let result = self.connector.send_tx(payload).await;
                if result.is_err() {
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .send_tx_errors
                            .with_label_values(&[&self.name])
                            .inc();
                    }
                }
                let _ = reply.send(result);
            }
            TrackerEvent::ProcessBlock { hash, reply } => {
                let block = self.store.get_parent_block(&hash).await?;
                let _ = reply.send(block);
            }
            TrackerEvent::Pop { reply } => {
                let _ = reply.send(self.data.queue.pop_front());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParentChainConfig;
    use crate::connector::ConnectorArgs;
    use crate::memory_store::MemoryStore;
    use crate::sim_connector::SimConnector;
    use hyperchain_parent_types::payload::{commitment_payload, delegate_payload};
    use hyperchain_parent_types::ParentChainTx;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::timeout;

    const CHAIN: &str = "btc";

    struct TestRig {
        pointer: ParentHash,
        sim: Arc<SimConnector>,
        store: Arc<MemoryStore>,
        manager: Arc<ParentManager>,
    }

    impl TestRig {
        fn new(pointer: ParentHash) -> Self {
            Self {
                pointer,
                sim: SimConnector::new(pointer),
                store: Arc::new(MemoryStore::new()),
                manager: Arc::new(ParentManager::new()),
            }
        }

        fn config(&self, genesis: u64) -> ParentChainConfig {
            ParentChainConfig {
                name: CHAIN.to_string(),
                connector: "sim".to_string(),
                args: ConnectorArgs::new(),
                pointer: self.pointer.to_hex(),
                genesis,
            }
        }

        async fn start(
            &self,
            genesis: u64,
        ) -> (TrackerHandle, watch::Receiver<Option<ParentHash>>) {
            let sub = self.manager.subscribe(CHAIN).await;
            let handle = Tracker::start(
                &self.config(genesis),
                self.sim.clone(),
                self.store.clone(),
                self.manager.clone(),
                Some(Arc::new(TrackerMetrics::new_for_testing())),
            )
            .await
            .unwrap();
            (handle, sub)
        }
    }

    fn commitment_tx(origin: &str, keyblock: u8) -> ParentChainTx {
        ParentChainTx {
            origin: origin.to_string(),
            payload: commitment_payload(&ParentHash::new([keyblock; 32])),
        }
    }

    fn delegate_tx(origin: &str, registration: &[u8]) -> ParentChainTx {
        ParentChainTx {
            origin: origin.to_string(),
            payload: delegate_payload(registration),
        }
    }

    async fn wait_announce(sub: &mut watch::Receiver<Option<ParentHash>>) -> ParentHash {
        timeout(Duration::from_secs(5), sub.changed())
            .await
            .expect("timed out waiting for announcement")
            .expect("announcement channel closed");
        sub.borrow_and_update().expect("announced value")
    }

    /// Walk `prev_hash` links from `tip` down to `pointer`, asserting every
    /// block on the way is stored.
    async fn assert_canonical_chain(store: &MemoryStore, pointer: ParentHash, tip: ParentHash) {
        let mut hash = tip;
        for _ in 0..100 {
            let block = store
                .get_parent_block(&hash)
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("canonical chain broken at {hash}"));
            if hash == pointer {
                return;
            }
            hash = block.header.prev_hash;
        }
        panic!("canonical chain from {tip} did not reach {pointer}");
    }

    #[tokio::test]
    async fn test_cold_start() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![commitment_tx("0xd1", 0x77)]);

        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);
        assert_eq!(rig.manager.latest(CHAIN).await, Some(b1.hash));

        // Genesis parent block derived from the pointer block.
        let genesis = rig.store.get_parent_block(&pointer).await.unwrap().unwrap();
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.commitments.len(), 0);

        // Parent block for the observed tip, with its commitment.
        let parent = rig.store.get_parent_block(&b1.hash).await.unwrap().unwrap();
        assert_eq!(parent.header.prev_hash, pointer);
        assert_eq!(parent.height(), 1);
        assert_eq!(parent.commitments.len(), 1);
        assert_eq!(parent.commitments[0].delegate, "0xd1");
        assert_eq!(
            parent.commitments[0].keyblock_hash,
            ParentHash::new([0x77; 32])
        );

        // Committed snapshot: confirmed tip with a settled walk.
        let snapshot = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
        assert_eq!(snapshot.indicator, b1.hash);
        assert_eq!(snapshot.height, 1);
        assert_eq!(snapshot.cursor, snapshot.indicator);
        assert_eq!(snapshot.index, 0);

        // Exactly one announcement.
        assert!(!sub.has_changed().unwrap());

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_linear_extension_and_pop_order() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);

        // Extend by three and publish only the tip; the tracker fetches
        // the intermediate blocks itself.
        let _b2 = rig.sim.extend(vec![delegate_tx("alice", b"a")]);
        let _b3 = rig.sim.extend(vec![]);
        let b4 = rig.sim.extend(vec![commitment_tx("0xd1", 0x11)]);
        rig.sim.publish(b4.hash);

        assert_eq!(wait_announce(&mut sub).await, b4.hash);

        // The queue drains in chain order: heights 2, 3, 4, then empty.
        let heights: Vec<u64> = [
            handle.pop().await.unwrap().unwrap(),
            handle.pop().await.unwrap().unwrap(),
            handle.pop().await.unwrap().unwrap(),
        ]
        .iter()
        .map(|b| b.height())
        .collect();
        assert_eq!(heights, vec![2, 3, 4]);
        assert_eq!(handle.pop().await.unwrap(), None);

        let snapshot = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
        assert_eq!(snapshot.indicator, b4.hash);
        assert_eq!(snapshot.height, 4);
        assert_eq!(snapshot.cursor, snapshot.indicator);
        assert_eq!(snapshot.index, 0);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reorg_within_genesis() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let _b2 = rig.sim.extend(vec![]);
        let _b3 = rig.sim.extend(vec![]);
        let b4 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b4.hash);

        // Competing history of the same height, diverging above b1.
        let c2 = rig.sim.fork_block(b1.hash, vec![], 1);
        let c3 = rig.sim.fork_block(c2.hash, vec![], 1);
        let c4 = rig.sim.fork_block(c3.hash, vec![], 1);
        rig.sim.set_top(c4.hash);
        rig.sim.publish(c4.hash);

        assert_eq!(wait_announce(&mut sub).await, c4.hash);
        let snapshot = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
        assert_eq!(snapshot.indicator, c4.hash);
        assert_eq!(snapshot.height, 4);
        assert_eq!(snapshot.cursor, snapshot.indicator);

        // The new canonical chain is fully stored down to the pointer.
        assert_canonical_chain(&rig.store, pointer, c4.hash).await;

        // The fork's blocks drain in chain order.
        let popped: Vec<ParentHash> = [
            handle.pop().await.unwrap().unwrap(),
            handle.pop().await.unwrap().unwrap(),
            handle.pop().await.unwrap().unwrap(),
        ]
        .iter()
        .map(|b| b.hash())
        .collect();
        assert_eq!(popped, vec![c2.hash, c3.hash, c4.hash]);
        assert_eq!(handle.pop().await.unwrap(), None);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reorg_past_genesis_is_fatal() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        for _ in 0..4 {
            rig.sim.extend(vec![]);
        }
        let b4 = rig.sim.block(&rig.sim.top()).unwrap();
        let (handle, mut sub) = rig.start(3).await;
        assert_eq!(wait_announce(&mut sub).await, b4.hash);
        let before = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();

        // A history sharing only the pointer, one block longer so it is
        // accepted as a new tip. The walk must descend below genesis
        // height 3 looking for common ancestry and give up.
        let f1 = rig.sim.fork_block(pointer, vec![], 9);
        let f2 = rig.sim.fork_block(f1.hash, vec![], 9);
        let f3 = rig.sim.fork_block(f2.hash, vec![], 9);
        let f4 = rig.sim.fork_block(f3.hash, vec![], 9);
        let f5 = rig.sim.fork_block(f4.hash, vec![], 9);
        rig.sim.set_top(f5.hash);
        rig.sim.publish(f5.hash);

        let err = timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("tracker did not stop")
            .unwrap_err();
        assert!(matches!(
            err,
            TrackerError::GenesisExceeded {
                genesis: 3,
                height: 2
            }
        ));
        assert!(err.to_string().contains("genesis: 3, height: 2"));

        // The committed snapshot is untouched by the aborted walk.
        let after = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(rig.manager.latest(CHAIN).await, Some(b4.hash));
    }

    #[tokio::test]
    async fn test_send_tx_deferred_during_sync() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);

        // Slow down block fetches so the walk is observably in progress
        // when the request arrives.
        rig.sim.set_latency(Duration::from_millis(50));
        let _b2 = rig.sim.extend(vec![]);
        let _b3 = rig.sim.extend(vec![]);
        let b4 = rig.sim.extend(vec![]);
        rig.sim.publish(b4.hash);
        let reply = handle.send_tx(b"commitment-payload".to_vec());

        timeout(Duration::from_secs(5), reply)
            .await
            .expect("send_tx reply timed out")
            .unwrap();

        // The reply arrived after the sync committed and announced.
        assert_eq!(rig.manager.latest(CHAIN).await, Some(b4.hash));
        assert_eq!(rig.sim.sent_txs(), vec![b"commitment-payload".to_vec()]);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_tx_error_returned_verbatim() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);

        rig.sim.set_fail_sends(true);
        let err = handle.send_tx(b"doomed".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Connector(ConnectorError::TxRejected(_))
        ));

        // The tracker survives client call errors.
        assert!(handle
            .process_block(b1.hash)
            .await
            .unwrap()
            .is_some());

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_process_block_lookup() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);

        let stored = handle.process_block(pointer).await.unwrap().unwrap();
        assert_eq!(stored.hash(), pointer);
        assert_eq!(
            handle
                .process_block(ParentHash::new([0xee; 32]))
                .await
                .unwrap(),
            None
        );

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_tips_are_dropped() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let b2 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b2.hash);

        // A lower tip and a duplicate of the current tip are both ignored:
        // no state change, no announcement.
        handle.publish(b1.clone());
        rig.sim.publish(b2.hash);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sub.has_changed().unwrap());

        // The tracker still follows genuine extensions afterwards.
        let b3 = rig.sim.extend_published(vec![]);
        assert_eq!(wait_announce(&mut sub).await, b3.hash);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        // The same publish sequence against a clean store yields
        // byte-identical records and the same committed snapshot.
        async fn run_once() -> (Vec<Vec<u8>>, Vec<u8>) {
            let pointer = ParentHash::new([0xaa; 32]);
            let rig = TestRig::new(pointer);
            let b1 = rig
                .sim
                .extend(vec![commitment_tx("0xd1", 1), delegate_tx("alice", b"a")]);
            let (handle, mut sub) = rig.start(0).await;
            assert_eq!(wait_announce(&mut sub).await, b1.hash);
            let _b2 = rig.sim.extend(vec![delegate_tx("bob", b"b")]);
            let b3 = rig.sim.extend(vec![commitment_tx("0xd2", 2)]);
            rig.sim.publish(b3.hash);
            assert_eq!(wait_announce(&mut sub).await, b3.hash);
            handle.stop().await.unwrap();

            let mut records = Vec::new();
            let mut hash = b3.hash;
            loop {
                let block = rig.store.get_parent_block(&hash).await.unwrap().unwrap();
                let trees = rig
                    .store
                    .get_parent_block_state(&hash)
                    .await
                    .unwrap()
                    .unwrap();
                records.push(bincode::serialize(&(block.clone(), trees)).unwrap());
                if hash == pointer {
                    break;
                }
                hash = block.header.prev_hash;
            }
            let snapshot = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
            (records, bincode::serialize(&snapshot).unwrap())
        }

        let (records_a, snapshot_a) = run_once().await;
        let (records_b, snapshot_b) = run_once().await;
        assert_eq!(records_a, records_b);
        assert_eq!(snapshot_a, snapshot_b);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_snapshot() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let b1 = rig.sim.extend(vec![]);
        let (handle, mut sub) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub).await, b1.hash);
        handle.stop().await.unwrap();

        // Same store, same chain: the restarted tracker reloads the
        // snapshot, finds nothing new and re-announces the known tip.
        let (handle2, mut sub2) = rig.start(0).await;
        assert_eq!(wait_announce(&mut sub2).await, b1.hash);

        // It keeps following the chain afterwards.
        let b2 = rig.sim.extend_published(vec![]);
        assert_eq!(wait_announce(&mut sub2).await, b2.hash);
        let snapshot = rig.store.get_parent_state(&pointer).await.unwrap().unwrap();
        assert_eq!(snapshot.indicator, b2.hash);
        assert_eq!(snapshot.height, 2);

        handle2.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_delegate_trees_accumulate_along_chain() {
        let pointer = ParentHash::new([0xaa; 32]);
        let rig = TestRig::new(pointer);
        let _b1 = rig.sim.extend(vec![delegate_tx("alice", b"a1")]);
        let (handle, mut sub) = rig.start(0).await;
        wait_announce(&mut sub).await;

        let b2 = rig
            .sim
            .extend_published(vec![delegate_tx("bob", b"b1"), delegate_tx("alice", b"a2")]);
        assert_eq!(wait_announce(&mut sub).await, b2.hash);

        let trees = rig
            .store
            .get_parent_block_state(&b2.hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trees.get("alice"), Some(&b"a2"[..]));
        assert_eq!(trees.get("bob"), Some(&b"b1"[..]));

        handle.stop().await.unwrap();
    }

    #[test]
    fn test_indicate_and_locate() {
        let pointer = ParentHash::new([0xaa; 32]);
        let old_tip = ParentHash::new([0x05; 32]);
        let mut data = TrackerData {
            pointer,
            genesis: 0,
            indicator: old_tip,
            height: 5,
            cursor: old_tip,
            index: 0,
            queue: VecDeque::new(),
            trees: DelegateTrees::default(),
        };

        let new_tip = ParentChainBlock {
            hash: ParentHash::new([0x08; 32]),
            prev_hash: ParentHash::new([0x07; 32]),
            height: 8,
            txs: vec![],
        };
        data.indicate(&new_tip);
        assert_eq!(data.index, 3);
        assert_eq!(data.height, 8);
        assert_eq!(data.indicator, new_tip.hash);
        // The cursor still references the old tip for fork detection.
        assert_eq!(data.cursor, old_tip);

        data.locate(&new_tip);
        assert_eq!(data.index, 2);

        // Snapshot round-trip drops only the queue.
        data.queue.push_back(ParentBlock {
            header: crate::types::ParentBlockHeader {
                hash: new_tip.hash,
                prev_hash: new_tip.prev_hash,
                height: 8,
                commitment_hashes: vec![],
            },
            commitments: vec![],
        });
        let restored = TrackerData::from_snapshot(data.snapshot());
        assert_eq!(restored.indicator, data.indicator);
        assert_eq!(restored.index, data.index);
        assert!(restored.queue.is_empty());
    }
}
