//! Round-synchronous message exchange between partitions.
//!
//! The distributed union-find only needs four collective operations per
//! round: an all-to-all delivery of protocol messages, a global reduction
//! of the round status, and gathers of the converged pairs and feature
//! records to the root rank. [Exchange] captures exactly that surface, so
//! the protocol runs unchanged on the in-process backend below and on the
//! MPI backend.
//!
//! Ordering between partitions is established only by the round structure;
//! within a round, messages from different senders arrive in unspecified
//! order and the protocol must not depend on it.

use std::sync::{Arc, Barrier, Mutex};

use crate::constants::ROOT_RANK;
use crate::types::{FeatureRecord, RootPair, UnionMessage};

/// Per-round bookkeeping, reduced across all ranks to detect the fixpoint.
#[derive(Copy, Clone, Debug, Default)]
pub struct RoundStatus {
    /// Number of root changes this round.
    pub changes: usize,
    /// Number of messages queued for the next round.
    pub messages: usize,
    /// A fatal error occurred on this rank.
    pub failed: bool,
}

impl RoundStatus {
    /// Fold another rank's status into this one.
    pub fn merge(&mut self, other: &RoundStatus) {
        self.changes += other.changes;
        self.messages += other.messages;
        self.failed |= other.failed;
    }

    /// Whether the computation reached the global fixpoint.
    pub fn converged(&self) -> bool {
        self.changes == 0 && self.messages == 0 && !self.failed
    }
}

/// The collective operations a distributed union-find round needs.
///
/// Every method is collective: all ranks must call it the same number of
/// times in the same order. A rank that hits a local error must keep
/// participating and report the failure through [Exchange::reduce].
pub trait Exchange {
    /// This partition's rank.
    fn rank(&self) -> usize;

    /// Total number of partitions.
    fn size(&self) -> usize;

    /// Deliver `outbox[r]` to rank `r` and return this rank's inbox.
    /// `outbox` must have exactly [Exchange::size] entries.
    fn all_to_all(&mut self, outbox: Vec<Vec<UnionMessage>>) -> Vec<UnionMessage>;

    /// Merge the round status across all ranks; every rank gets the result.
    fn reduce(&mut self, local: RoundStatus) -> RoundStatus;

    /// Gather root pairs to the root rank, which receives `Some`.
    fn gather_pairs(&mut self, pairs: &[RootPair]) -> Option<Vec<RootPair>>;

    /// Gather feature records to the root rank, which receives `Some`.
    fn gather_features(&mut self, records: &[FeatureRecord]) -> Option<Vec<FeatureRecord>>;
}

// Shared state of an in-process cluster. Each collective uses a write
// barrier and a read barrier so that consecutive rounds can never
// interleave in the mailboxes or slots.
struct Cluster {
    barrier: Barrier,
    mailboxes: Vec<Mutex<Vec<UnionMessage>>>,
    status: Vec<Mutex<RoundStatus>>,
    pairs: Vec<Mutex<Vec<RootPair>>>,
    records: Vec<Mutex<Vec<FeatureRecord>>>,
}

impl Cluster {
    fn new(size: usize) -> Self {
        Self {
            barrier: Barrier::new(size),
            mailboxes: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
            status: (0..size).map(|_| Mutex::new(RoundStatus::default())).collect(),
            pairs: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
            records: (0..size).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }
}

/// In-process exchange backend.
///
/// Partitions run as one thread each and communicate through per-rank
/// mailboxes; the mailboxes are a transport, not shared algorithm state.
/// This backend drives all tests and single-machine runs.
pub struct LocalExchange {
    rank: usize,
    cluster: Arc<Cluster>,
}

impl Exchange for LocalExchange {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.cluster.mailboxes.len()
    }

    fn all_to_all(&mut self, outbox: Vec<Vec<UnionMessage>>) -> Vec<UnionMessage> {
        assert_eq!(outbox.len(), self.size());

        for (dest, messages) in outbox.into_iter().enumerate() {
            if messages.is_empty() {
                continue;
            }
            self.cluster.mailboxes[dest]
                .lock()
                .unwrap()
                .extend(messages);
        }
        self.cluster.barrier.wait();

        let inbox = std::mem::take(&mut *self.cluster.mailboxes[self.rank].lock().unwrap());
        self.cluster.barrier.wait();
        inbox
    }

    fn reduce(&mut self, local: RoundStatus) -> RoundStatus {
        *self.cluster.status[self.rank].lock().unwrap() = local;
        self.cluster.barrier.wait();

        let mut global = RoundStatus::default();
        for slot in &self.cluster.status {
            global.merge(&slot.lock().unwrap());
        }
        self.cluster.barrier.wait();
        global
    }

    fn gather_pairs(&mut self, pairs: &[RootPair]) -> Option<Vec<RootPair>> {
        *self.cluster.pairs[self.rank].lock().unwrap() = pairs.to_vec();
        self.cluster.barrier.wait();

        let result = (self.rank == ROOT_RANK).then(|| {
            self.cluster
                .pairs
                .iter()
                .flat_map(|slot| slot.lock().unwrap().clone())
                .collect()
        });
        self.cluster.barrier.wait();
        result
    }

    fn gather_features(&mut self, records: &[FeatureRecord]) -> Option<Vec<FeatureRecord>> {
        *self.cluster.records[self.rank].lock().unwrap() = records.to_vec();
        self.cluster.barrier.wait();

        let result = (self.rank == ROOT_RANK).then(|| {
            self.cluster
                .records
                .iter()
                .flat_map(|slot| slot.lock().unwrap().clone())
                .collect()
        });
        self.cluster.barrier.wait();
        result
    }
}

/// Run `f` once per partition on an in-process cluster of `size` threads
/// and collect the per-rank results in rank order.
pub fn run_local<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalExchange) -> R + Sync,
{
    assert!(size > 0);
    let cluster = Arc::new(Cluster::new(size));

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..size)
            .map(|rank| {
                let cluster = Arc::clone(&cluster);
                let f = &f;
                scope.spawn(move || {
                    f(LocalExchange { rank, cluster })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}
