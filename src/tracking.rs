//! End-to-end tracking pipeline.
//!
//! Composes the three stages for one rank: scan the partition, converge
//! the distributed union-find, gather and linearize the components at the
//! root rank.

use crate::curves::gather_components;
use crate::error::TrackingError;
use crate::exchange::{run_local, Exchange};
use crate::mesh::{Detector, MeshPartition, Ownership};
use crate::parallel_union_find::{run_distributed_union_find, UnionFindBlock};
use crate::scan::{scan_partition, ScanOutput};
use crate::types::{Curve, ElementId, TrackingConfig};

/// Run the full pipeline for this rank's partition.
///
/// Collective across all ranks of the exchange. `adjacency` must be the
/// same coface neighbourhood the mesh exposes to the scanner; the root
/// rank uses it to rebuild component adjacency from the gathered ids.
/// Returns `Ok(Some(curves))` on the root rank, `Ok(None)` elsewhere.
pub fn track_partition<M, D, O, E, F>(
    mesh: &M,
    detector: &D,
    ownership: &O,
    exchange: &mut E,
    adjacency: &F,
    config: &TrackingConfig,
) -> Result<Option<Vec<Curve>>, TrackingError>
where
    M: MeshPartition,
    D: Detector<M>,
    O: Ownership,
    E: Exchange,
    F: Fn(ElementId) -> Vec<ElementId>,
{
    log::info!("rank {}: scanning partition", exchange.rank());
    let output = scan_partition(mesh, detector)?;
    let records = output.owned_features();

    let ScanOutput {
        union_find,
        relations,
        ..
    } = output;
    let mut block = UnionFindBlock::from_parts(union_find, relations);

    run_distributed_union_find(&mut block, ownership, exchange, config.round_cap)?;

    gather_components(exchange, &mut block, &records, adjacency, config)
}

/// Drive every partition of an in-process cluster through the pipeline and
/// return the curves the root rank produced.
pub fn track_local<M, D, O, F>(
    partitions: &[M],
    detector: &D,
    ownership: &O,
    adjacency: &F,
    config: &TrackingConfig,
) -> Result<Vec<Curve>, TrackingError>
where
    M: MeshPartition,
    D: Detector<M>,
    O: Ownership,
    F: Fn(ElementId) -> Vec<ElementId> + Sync,
{
    let results = run_local(partitions.len(), |mut exchange| {
        let mesh = &partitions[exchange.rank()];
        track_partition(mesh, detector, ownership, &mut exchange, adjacency, config)
    });

    let mut curves = Vec::new();
    for result in results {
        if let Some(root_curves) = result? {
            curves = root_curves;
        }
    }
    Ok(curves)
}
