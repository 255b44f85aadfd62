//! Sparse union-find over element ids.
//!
//! The structure is an arena: ids are interned into an index map and the
//! parent/rank tables are plain vectors of indices. No language-level
//! references are involved, so the state is trivially serializable and
//! cheap to move between threads.

use std::collections::{BTreeMap, HashMap};

use crate::error::TrackingError;
use crate::types::ElementId;

/// A union-find restricted to the ids that were explicitly added.
///
/// Operating on an id that was never [added](SparseUnionFind::add) is a
/// contract violation and fails with [TrackingError::UnknownElement]; a
/// phantom entry is never created silently.
#[derive(Clone, Debug, Default)]
pub struct SparseUnionFind {
    index: HashMap<ElementId, usize>,
    ids: Vec<ElementId>,
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl SparseUnionFind {
    /// Create an empty union-find.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as its own singleton root. Idempotent.
    pub fn add(&mut self, id: ElementId) {
        if self.index.contains_key(&id) {
            return;
        }
        let slot = self.ids.len();
        self.index.insert(id, slot);
        self.ids.push(id);
        self.parent.push(slot);
        self.rank.push(0);
    }

    /// Whether `id` has been added.
    pub fn has(&self, id: ElementId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of known ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no ids are known.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All known ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.ids.iter().copied()
    }

    fn slot_of(&self, id: ElementId) -> Result<usize, TrackingError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(TrackingError::UnknownElement(id))
    }

    fn find_slot(&mut self, slot: usize) -> usize {
        // Iterative find with full path compression.
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = slot;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Return the current root of `id`, compressing the path to it.
    pub fn find(&mut self, id: ElementId) -> Result<ElementId, TrackingError> {
        let slot = self.slot_of(id)?;
        let root = self.find_slot(slot);
        Ok(self.ids[root])
    }

    /// Whether two ids currently share a root.
    pub fn same(&mut self, a: ElementId, b: ElementId) -> Result<bool, TrackingError> {
        Ok(self.find(a)? == self.find(b)?)
    }

    /// Merge the sets of `a` and `b` using union by rank, breaking rank ties
    /// towards the smaller id. No-op if they already share a root.
    ///
    /// Returns whether a merge actually happened.
    pub fn unite(&mut self, a: ElementId, b: ElementId) -> Result<bool, TrackingError> {
        let slot_a = self.slot_of(a)?;
        let slot_b = self.slot_of(b)?;
        let root_a = self.find_slot(slot_a);
        let root_b = self.find_slot(slot_b);
        if root_a == root_b {
            return Ok(false);
        }

        let (winner, loser) = if self.rank[root_a] > self.rank[root_b] {
            (root_a, root_b)
        } else if self.rank[root_a] < self.rank[root_b] {
            (root_b, root_a)
        } else if self.ids[root_a] < self.ids[root_b] {
            self.rank[root_a] += 1;
            (root_a, root_b)
        } else {
            self.rank[root_b] += 1;
            (root_b, root_a)
        };
        self.parent[loser] = winner;
        Ok(true)
    }

    /// Merge the sets of `a` and `b` so that the smaller of the two roots
    /// becomes the root of the merged set.
    ///
    /// The distributed protocol relies on this ordering: every rank makes
    /// the same choice without negotiation, so all ranks converge a
    /// component onto its global minimum id.
    pub fn unite_min(&mut self, a: ElementId, b: ElementId) -> Result<bool, TrackingError> {
        let slot_a = self.slot_of(a)?;
        let slot_b = self.slot_of(b)?;
        let root_a = self.find_slot(slot_a);
        let root_b = self.find_slot(slot_b);
        if root_a == root_b {
            return Ok(false);
        }
        let (winner, loser) = if self.ids[root_a] < self.ids[root_b] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[loser] = winner;
        Ok(true)
    }

    /// Partition all known ids into disjoint sets keyed by their canonical
    /// root. Members are sorted, so the output is deterministic.
    pub fn get_sets(&mut self) -> BTreeMap<ElementId, Vec<ElementId>> {
        let mut sets = BTreeMap::<ElementId, Vec<ElementId>>::new();
        for slot in 0..self.ids.len() {
            let root = self.find_slot(slot);
            sets.entry(self.ids[root]).or_default().push(self.ids[slot]);
        }
        for members in sets.values_mut() {
            members.sort_unstable();
        }
        sets
    }
}

#[cfg(test)]
mod test {
    use super::SparseUnionFind;
    use crate::error::TrackingError;
    use crate::types::ElementId;

    fn id(raw: u64) -> ElementId {
        ElementId(raw)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut uf = SparseUnionFind::new();
        uf.add(id(7));
        uf.add(id(7));
        assert_eq!(uf.len(), 1);
        assert_eq!(uf.find(id(7)).unwrap(), id(7));
    }

    #[test]
    fn test_unknown_id_fails_loudly() {
        let mut uf = SparseUnionFind::new();
        uf.add(id(1));
        assert!(matches!(
            uf.find(id(2)),
            Err(TrackingError::UnknownElement(e)) if e == id(2)
        ));
        assert!(uf.unite(id(1), id(2)).is_err());
        // The failed operations must not have created an entry.
        assert!(!uf.has(id(2)));
    }

    #[test]
    fn test_unite_is_idempotent() {
        let mut uf = SparseUnionFind::new();
        for raw in 1..=3 {
            uf.add(id(raw));
        }
        assert!(uf.unite(id(1), id(2)).unwrap());
        assert!(uf.unite(id(2), id(3)).unwrap());
        let sets = uf.get_sets();

        for _ in 0..5 {
            assert!(!uf.unite(id(1), id(2)).unwrap());
        }
        assert_eq!(uf.get_sets(), sets);
    }

    #[test]
    fn test_transitivity() {
        let mut uf = SparseUnionFind::new();
        for raw in 1..=4 {
            uf.add(id(raw));
        }
        uf.unite(id(1), id(2)).unwrap();
        uf.unite(id(2), id(3)).unwrap();
        assert!(uf.same(id(1), id(3)).unwrap());
        assert!(!uf.same(id(1), id(4)).unwrap());
    }

    #[test]
    fn test_unite_min_converges_to_minimum() {
        let mut uf = SparseUnionFind::new();
        for raw in [9, 4, 6, 2] {
            uf.add(id(raw));
        }
        uf.unite_min(id(9), id(4)).unwrap();
        uf.unite_min(id(6), id(2)).unwrap();
        uf.unite_min(id(9), id(6)).unwrap();
        for raw in [9, 4, 6, 2] {
            assert_eq!(uf.find(id(raw)).unwrap(), id(2));
        }
    }

    #[test]
    fn test_get_sets_partitions_all_ids() {
        let mut uf = SparseUnionFind::new();
        for raw in 1..=5 {
            uf.add(id(raw));
        }
        uf.unite(id(1), id(2)).unwrap();
        uf.unite(id(4), id(5)).unwrap();

        let sets = uf.get_sets();
        assert_eq!(sets.len(), 3);
        let total: usize = sets.values().map(|s| s.len()).sum();
        assert_eq!(total, 5);
        assert_eq!(sets.get(&id(3)).unwrap(), &vec![id(3)]);
    }
}
