//! Distributed union-find across partitions.
//!
//! Every rank holds the union-find of its owned feature ids plus relation
//! edges pointing at foreign ids. The protocol attaches foreign ids as
//! proxies, exchanges relate/update messages in barrier-synchronized rounds
//! and keeps iterating until no rank reports a root change or a pending
//! message. Roots only ever decrease ([SparseUnionFind::unite_min]) and the
//! id universe is finite, so the fixpoint is reached after finitely many
//! rounds; in practice after about the partition adjacency diameter.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TrackingError;
use crate::exchange::{Exchange, RoundStatus};
use crate::mesh::Ownership;
use crate::types::{
    ElementId, RelationEdge, RootPair, UnionMessage, TAG_RELATE, TAG_UPDATE,
};
use crate::union_find::SparseUnionFind;

/// Per-rank state of the distributed union-find.
///
/// Wraps the scanner's local union-find together with the ownership split
/// between owned ids and remote proxies, the outbound relation edges and
/// the interest bookkeeping that drives root update propagation.
#[derive(Default)]
pub struct UnionFindBlock {
    union_find: SparseUnionFind,
    owned: BTreeSet<ElementId>,
    relations: Vec<RelationEdge>,
    // For every id this rank ever exchanged: the peers that hold it and
    // must hear about root changes.
    interest: BTreeMap<ElementId, BTreeSet<usize>>,
    // Last root sent out per id; an update is due whenever the current
    // root differs.
    reported: BTreeMap<ElementId, ElementId>,
}

impl UnionFindBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a block from a scanned union-find and its relation edges.
    pub fn from_parts(union_find: SparseUnionFind, relations: Vec<RelationEdge>) -> Self {
        let owned = union_find.ids().collect();
        Self {
            union_find,
            owned,
            relations,
            interest: BTreeMap::new(),
            reported: BTreeMap::new(),
        }
    }

    /// Register an owned feature id.
    pub fn add_feature(&mut self, id: ElementId) {
        self.union_find.add(id);
        self.owned.insert(id);
    }

    /// Unite two owned feature ids discovered as directly connected.
    pub fn unite(&mut self, a: ElementId, b: ElementId) -> Result<bool, TrackingError> {
        for id in [a, b] {
            if !self.owned.contains(&id) {
                return Err(TrackingError::UnknownElement(id));
            }
        }
        self.union_find.unite(a, b)
    }

    /// Record a relation edge from an owned id to a foreign id.
    pub fn relate(&mut self, local: ElementId, foreign: ElementId) {
        self.relations.push(RelationEdge { local, foreign });
    }

    /// Current root of an id known to this block.
    pub fn find(&mut self, id: ElementId) -> Result<ElementId, TrackingError> {
        self.union_find.find(id)
    }

    /// The converged `(id, root)` mapping for the ids this rank owns.
    ///
    /// Proxies are excluded; their owners report them.
    pub fn root_pairs(&mut self) -> Result<Vec<RootPair>, TrackingError> {
        let owned: Vec<ElementId> = self.owned.iter().copied().collect();
        owned
            .into_iter()
            .map(|id| {
                Ok(RootPair {
                    id,
                    root: self.union_find.find(id)?,
                })
            })
            .collect()
    }

    // Attach the foreign endpoint of every relation edge as a proxy and
    // queue the seed message to its owner.
    fn seed<O: Ownership>(
        &mut self,
        ownership: &O,
        rank: usize,
        size: usize,
        failure: &mut Option<TrackingError>,
    ) -> Result<Vec<Vec<UnionMessage>>, TrackingError> {
        let mut outbox = vec![Vec::new(); size];

        for edge in self.relations.clone() {
            if !self.union_find.has(edge.local) {
                record_failure(failure, TrackingError::ScannerInconsistency(edge.local));
                continue;
            }
            let owner = match ownership.owner(edge.foreign) {
                Some(owner) if owner < size => owner,
                _ => {
                    record_failure(failure, TrackingError::ScannerInconsistency(edge.foreign));
                    continue;
                }
            };

            self.union_find.add(edge.foreign);
            self.union_find.unite_min(edge.local, edge.foreign)?;
            let source_root = self.union_find.find(edge.local)?;

            outbox[owner].push(UnionMessage::relate(rank, edge.foreign, edge.local, source_root));
            for id in [edge.local, edge.foreign, source_root] {
                self.interest.entry(id).or_default().insert(owner);
                self.reported.insert(id, source_root);
            }
        }

        Ok(outbox)
    }

    // Apply one round's inbox. Returns the number of root merges.
    fn apply(&mut self, inbox: &[UnionMessage]) -> Result<usize, TrackingError> {
        let mut changes = 0;

        for message in inbox {
            let sender = message.sender as usize;
            match message.tag {
                TAG_RELATE => {
                    let target = ElementId(message.a);
                    let source = ElementId(message.b);
                    let source_root = ElementId(message.c);

                    // The target is claimed to be owned here. If it was
                    // never scanned the relation edge is malformed.
                    if !self.union_find.has(target) {
                        return Err(TrackingError::ScannerInconsistency(target));
                    }
                    self.union_find.add(source);
                    self.union_find.add(source_root);

                    changes += usize::from(self.union_find.unite_min(target, source)?);
                    changes += usize::from(self.union_find.unite_min(source, source_root)?);

                    for id in [target, source, source_root] {
                        self.interest.entry(id).or_default().insert(sender);
                    }
                }
                TAG_UPDATE => {
                    let id = ElementId(message.a);
                    let root = ElementId(message.b);

                    if !self.union_find.has(id) {
                        return Err(TrackingError::ProtocolViolation(id));
                    }
                    self.union_find.add(root);
                    changes += usize::from(self.union_find.unite_min(id, root)?);

                    for id in [id, root] {
                        self.interest.entry(id).or_default().insert(sender);
                    }
                }
                _ => return Err(TrackingError::ProtocolViolation(ElementId(message.a))),
            }
        }

        Ok(changes)
    }

    // Queue an update to every interested peer for each id whose root moved
    // since it was last reported.
    fn propagate(
        &mut self,
        rank: usize,
        outbox: &mut [Vec<UnionMessage>],
    ) -> Result<(), TrackingError> {
        let ids: Vec<ElementId> = self.interest.keys().copied().collect();
        let mut announced: Vec<(ElementId, BTreeSet<usize>)> = Vec::new();

        for id in ids {
            let root = self.union_find.find(id)?;
            if self.reported.get(&id) == Some(&root) {
                continue;
            }
            let peers = self.interest.get(&id).cloned().unwrap_or_default();
            for &peer in &peers {
                outbox[peer].push(UnionMessage::update(rank, id, root));
            }
            self.reported.insert(id, root);
            announced.push((root, peers));
        }

        // Peers that just received a root id may now hold a proxy of it, so
        // they become interested in that root as well.
        for (root, peers) in announced {
            self.interest.entry(root).or_default().extend(peers);
        }

        Ok(())
    }
}

fn record_failure(failure: &mut Option<TrackingError>, error: TrackingError) {
    if failure.is_none() {
        *failure = Some(error);
    }
}

/// Run the distributed union-find to its global fixpoint.
///
/// Collective: every rank calls this once with its own block; the call
/// blocks until all ranks converge. A fatal condition on any rank aborts
/// every rank (the detecting rank gets the specific error, the others
/// [TrackingError::PeerAbort]), so a partially converged mapping can never
/// escape.
pub fn run_distributed_union_find<E, O>(
    block: &mut UnionFindBlock,
    ownership: &O,
    exchange: &mut E,
    round_cap: usize,
) -> Result<(), TrackingError>
where
    E: Exchange,
    O: Ownership,
{
    let rank = exchange.rank();
    let size = exchange.size();

    let mut failure: Option<TrackingError> = None;
    let mut outbox = match block.seed(ownership, rank, size, &mut failure) {
        Ok(outbox) => outbox,
        Err(error) => {
            record_failure(&mut failure, error);
            vec![Vec::new(); size]
        }
    };

    let mut round = 0;
    loop {
        let inbox = exchange.all_to_all(outbox);

        let mut changes = 0;
        if failure.is_none() {
            match block.apply(&inbox) {
                Ok(n) => changes = n,
                Err(error) => record_failure(&mut failure, error),
            }
        }

        let mut next_outbox = vec![Vec::new(); size];
        if failure.is_none() {
            if let Err(error) = block.propagate(rank, &mut next_outbox) {
                record_failure(&mut failure, error);
            }
        }

        let local = RoundStatus {
            changes,
            messages: next_outbox.iter().map(Vec::len).sum(),
            failed: failure.is_some(),
        };
        let global = exchange.reduce(local);

        if global.failed {
            return Err(failure.unwrap_or(TrackingError::PeerAbort));
        }

        log::debug!(
            "union-find round {}: {} changes, {} pending messages",
            round,
            global.changes,
            global.messages
        );

        if global.converged() {
            log::info!("distributed union-find converged after {} rounds", round + 1);
            return Ok(());
        }

        round += 1;
        if round >= round_cap {
            // Every rank sees the same global status and round counter, so
            // all ranks abort together.
            return Err(TrackingError::NonConvergence {
                rounds: round,
                last_changes: global.changes,
            });
        }

        outbox = next_outbox;
    }
}
