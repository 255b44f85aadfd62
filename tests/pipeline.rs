//! End-to-end pipeline tests on the space-time grid.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use feattrack::exchange::{run_local, Exchange};
use feattrack::grid::{GridSpec, LocalMaximumDetector, SyntheticField};
use feattrack::mesh::Ownership;
use feattrack::parallel_union_find::{run_distributed_union_find, UnionFindBlock};
use feattrack::tracking::track_local;
use feattrack::types::{Curve, ElementId, TrackingConfig};
use feattrack::union_find::SparseUnionFind;

// Order-free, direction-free canonical form of a curve set. Coordinates
// are compared exactly through their bit patterns; the pipeline is
// deterministic and must reproduce them bit for bit.
fn canonical(curves: &[Curve]) -> BTreeSet<Vec<[u64; 4]>> {
    curves
        .iter()
        .map(|curve| {
            let forward: Vec<[u64; 4]> = curve
                .points
                .iter()
                .map(|p| {
                    [
                        p.x.to_bits(),
                        p.y.to_bits(),
                        p.t.to_bits(),
                        p.value.to_bits(),
                    ]
                })
                .collect();
            let mut backward = forward.clone();
            backward.reverse();
            forward.min(backward)
        })
        .collect()
}

fn tracked_grid_curves(spec: GridSpec, nparts: usize, config: &TrackingConfig) -> Vec<Curve> {
    let field = SyntheticField {
        spec,
        scaling: 15.0,
    };
    let detector = LocalMaximumDetector { field: &field };
    let partitions = spec.partition(nparts);
    let ownership = spec.ownership(nparts);
    let adjacency = |id| spec.neighbours(id);

    track_local(&partitions, &detector, &ownership, &adjacency, config).unwrap()
}

#[test]
fn test_grid_tracking_finds_trajectories() {
    let spec = GridSpec {
        nx: 32,
        ny: 32,
        nt: 8,
    };
    let curves = tracked_grid_curves(spec, 1, &TrackingConfig::default());

    assert!(!curves.is_empty());
    // The rotating pattern keeps its extrema alive across steps, so at
    // least one trajectory spans several time steps.
    assert!(curves.iter().any(|curve| curve.points.len() > 2));
    for curve in &curves {
        assert!(curve.points.len() > 1);
    }
}

#[test]
fn test_grid_curves_are_partition_invariant() {
    let spec = GridSpec {
        nx: 24,
        ny: 24,
        nt: 9,
    };
    let config = TrackingConfig::default();
    let baseline = canonical(&tracked_grid_curves(spec, 1, &config));

    for nparts in [2, 3] {
        let curves = canonical(&tracked_grid_curves(spec, nparts, &config));
        assert_eq!(curves, baseline, "nparts = {nparts}");
    }
}

#[test]
fn test_singleton_config_only_adds_single_point_curves() {
    let spec = GridSpec {
        nx: 24,
        ny: 24,
        nt: 6,
    };
    let without = tracked_grid_curves(
        spec,
        2,
        &TrackingConfig {
            keep_singletons: false,
            ..TrackingConfig::default()
        },
    );
    let with = tracked_grid_curves(
        spec,
        2,
        &TrackingConfig {
            keep_singletons: true,
            ..TrackingConfig::default()
        },
    );

    assert!(without.iter().all(|curve| curve.points.len() > 1));
    let multi: Vec<Curve> = with
        .iter()
        .filter(|curve| curve.points.len() > 1)
        .cloned()
        .collect();
    assert_eq!(canonical(&multi), canonical(&without));
    assert!(with.len() >= without.len());
}

struct MapOwnership(HashMap<ElementId, usize>);

impl Ownership for MapOwnership {
    fn owner(&self, id: ElementId) -> Option<usize> {
        self.0.get(&id).copied()
    }
}

fn group(pairs: &[(ElementId, ElementId)]) -> BTreeSet<BTreeSet<ElementId>> {
    let mut by_root = BTreeMap::<ElementId, BTreeSet<ElementId>>::new();
    for &(id, root) in pairs {
        by_root.entry(root).or_default().insert(id);
    }
    by_root.into_values().collect()
}

// Random edge universes, distributed over varying partition counts, must
// always reproduce the serial union-find grouping.
#[test]
fn test_random_graphs_match_serial_baseline() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let n_ids = 40_u64;

    for trial in 0..8 {
        let n_edges = rng.gen_range(10..60);
        let edges: Vec<(u64, u64)> = (0..n_edges)
            .map(|_| (rng.gen_range(0..n_ids), rng.gen_range(0..n_ids)))
            .filter(|&(a, b)| a != b)
            .collect();

        let mut uf = SparseUnionFind::new();
        for raw in 0..n_ids {
            uf.add(ElementId(raw));
        }
        for &(a, b) in &edges {
            uf.unite(ElementId(a), ElementId(b)).unwrap();
        }
        let baseline: BTreeSet<BTreeSet<ElementId>> = uf
            .get_sets()
            .into_values()
            .map(|members| members.into_iter().collect())
            .collect();

        for nparts in [2, 3, 4] {
            let ownership = MapOwnership(
                (0..n_ids)
                    .map(|raw| (ElementId(raw), raw as usize % nparts))
                    .collect(),
            );

            let results = run_local(nparts, |mut exchange| {
                let rank = exchange.rank();
                let mut block = UnionFindBlock::new();
                for raw in 0..n_ids {
                    if raw as usize % nparts == rank {
                        block.add_feature(ElementId(raw));
                    }
                }
                for &(a, b) in &edges {
                    let a_local = a as usize % nparts == rank;
                    let b_local = b as usize % nparts == rank;
                    match (a_local, b_local) {
                        (true, true) => {
                            block.unite(ElementId(a), ElementId(b)).unwrap();
                        }
                        (true, false) => block.relate(ElementId(a), ElementId(b)),
                        (false, true) => block.relate(ElementId(b), ElementId(a)),
                        (false, false) => {}
                    }
                }
                run_distributed_union_find(&mut block, &ownership, &mut exchange, 256)?;
                block.root_pairs()
            });

            let mut pairs = Vec::new();
            for result in results {
                for pair in result.unwrap() {
                    pairs.push((pair.id, pair.root));
                }
            }
            assert_eq!(
                group(&pairs),
                baseline,
                "trial = {trial}, nparts = {nparts}"
            );
        }
    }
}
