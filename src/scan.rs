//! Partition feature scanner.
//!
//! Walks one partition's ghost-extended mesh, classifies every feature
//! dimension element through the detection oracle, labels directly connected
//! owned features in a local union-find and emits relation edges for
//! connections that reach into foreign partitions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use itertools::Itertools;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::TrackingError;
use crate::mesh::{Detector, MeshPartition};
use crate::types::{ElementId, FeatureRecord, RelationEdge};
use crate::union_find::SparseUnionFind;

/// The result of scanning one partition.
pub struct ScanOutput {
    /// Local union-find over the owned feature ids, with directly connected
    /// owned features already united.
    pub union_find: SparseUnionFind,
    /// All detected feature records, including ghost copies of features
    /// owned by neighbouring partitions.
    pub features: HashMap<ElementId, FeatureRecord>,
    /// Relation edges whose foreign endpoint is owned by another partition.
    pub relations: Vec<RelationEdge>,
}

impl ScanOutput {
    /// The feature records this partition is authoritative for.
    pub fn owned_features(&self) -> Vec<FeatureRecord> {
        let mut records: Vec<FeatureRecord> = self
            .features
            .values()
            .filter(|record| self.union_find.has(record.id))
            .copied()
            .collect();
        records.sort_unstable_by_key(|record| record.id);
        records
    }
}

/// Scan one partition and produce its local labels and relation edges.
///
/// The two scan phases are parallel over elements; all shared mutation goes
/// through a single coarse lock since union-find updates do not commute
/// under races. Detector failures on single elements are logged and the
/// element is skipped.
pub fn scan_partition<M, D>(mesh: &M, detector: &D) -> Result<ScanOutput, TrackingError>
where
    M: MeshPartition,
    D: Detector<M>,
{
    // Phase one: classify feature elements. Only elements inside the core
    // region enter the union-find; ghost features are recorded so that the
    // linking phase can see them.
    let state = Mutex::new((SparseUnionFind::new(), HashMap::new()));

    mesh.feature_elements().par_iter().for_each(|element| {
        let payload = match detector.detect(mesh, element) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(err) => {
                log::warn!(
                    "skipping element {}: {}",
                    mesh.element_id(element),
                    err
                );
                return;
            }
        };
        let id = mesh.element_id(element);
        let record = FeatureRecord::new(id, payload);
        let in_core = mesh.is_core(element);

        let mut guard = state.lock().unwrap();
        let (union_find, features) = &mut *guard;
        features.insert(id, record);
        if in_core {
            union_find.add(id);
        }
    });

    let (union_find, features) = state.into_inner().unwrap();
    let owned: HashSet<ElementId> = union_find.ids().collect();

    log::info!(
        "scan found {} features ({} owned)",
        features.len(),
        owned.len()
    );

    // Phase two: walk the cofaces one dimension higher. A coface touching
    // two or more features connects them: owned features unite locally,
    // every (owned, foreign) pair becomes a relation edge. Uniting is never
    // attempted on a foreign id.
    let state = Mutex::new((union_find, HashSet::<RelationEdge>::new()));

    mesh.linking_elements()
        .par_iter()
        .try_for_each(|link| -> Result<(), TrackingError> {
            let touched: Vec<ElementId> = mesh
                .sides(link)
                .iter()
                .map(|side| mesh.element_id(side))
                .filter(|id| features.contains_key(id))
                .sorted_unstable()
                .dedup()
                .collect();
            if touched.len() < 2 {
                return Ok(());
            }

            let (in_block, foreign): (Vec<ElementId>, Vec<ElementId>) =
                touched.iter().partition(|id| owned.contains(id));
            if in_block.is_empty() {
                // The coface connects only foreign features; the owning
                // partitions will discover it themselves.
                return Ok(());
            }

            let mut guard = state.lock().unwrap();
            let (union_find, relations) = &mut *guard;

            // Relate all owned features at this coface pairwise, so the
            // local labels are correct without relying on transitive
            // closure through later cofaces.
            for (i, &a) in in_block.iter().enumerate() {
                for &b in &in_block[i + 1..] {
                    union_find.unite(a, b)?;
                }
            }

            for &foreign_id in &foreign {
                for &local_id in &in_block {
                    relations.insert(RelationEdge {
                        local: local_id,
                        foreign: foreign_id,
                    });
                }
            }
            Ok(())
        })?;

    let (union_find, relations) = state.into_inner().unwrap();
    let relations: Vec<RelationEdge> = relations
        .into_iter()
        .sorted_unstable_by_key(|edge| (edge.local, edge.foreign))
        .collect();

    log::info!("scan emitted {} relation edges", relations.len());

    Ok(ScanOutput {
        union_find,
        features,
        relations,
    })
}
