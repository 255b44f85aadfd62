//! Gathering converged components and turning them into curves.
//!
//! After the distributed union-find reaches its fixpoint, the root rank
//! collects every partition's `(id, root)` pairs and feature records,
//! groups the ids by root into components and decomposes each component
//! into linear pieces. A component is in general not a simple path: a
//! feature element can sit on a branch point, so the decomposition walks
//! the component's adjacency graph as a set of simple paths that together
//! cover every adjacency edge exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::TrackingError;
use crate::exchange::Exchange;
use crate::parallel_union_find::UnionFindBlock;
use crate::types::{Curve, CurvePoint, ElementId, FeatureRecord, RootPair, TrackingConfig};

/// Group gathered root pairs into components, one sorted id set per root.
pub fn components_from_pairs(pairs: &[RootPair]) -> Vec<BTreeSet<ElementId>> {
    let mut by_root = BTreeMap::<ElementId, BTreeSet<ElementId>>::new();
    for pair in pairs {
        by_root.entry(pair.root).or_default().insert(pair.id);
    }
    by_root.into_values().collect()
}

fn edge_key(a: ElementId, b: ElementId) -> (ElementId, ElementId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Decompose one component into simple paths covering every adjacency edge
/// exactly once.
///
/// `adjacency` is the same coface neighbourhood the scanner used for
/// relation discovery; neighbours outside the component and self loops are
/// ignored. Vertices of degree other than two start and end paths, so a
/// branch point is a shared endpoint of several paths and is never
/// duplicated as a separate feature. Leftover edges form pure cycles and
/// are walked with the start id repeated at the end. Isolated ids become
/// singleton paths; the caller decides whether to keep them.
pub fn linear_components<F>(component: &BTreeSet<ElementId>, adjacency: &F) -> Vec<Vec<ElementId>>
where
    F: Fn(ElementId) -> Vec<ElementId>,
{
    // Restrict the adjacency to the component, symmetrized and deduplicated.
    let mut adj = BTreeMap::<ElementId, BTreeSet<ElementId>>::new();
    for &v in component {
        adj.entry(v).or_default();
        for w in adjacency(v) {
            if w != v && component.contains(&w) {
                adj.entry(v).or_default().insert(w);
                adj.entry(w).or_default().insert(v);
            }
        }
    }

    let mut unused = BTreeSet::<(ElementId, ElementId)>::new();
    for (&v, neighbours) in &adj {
        for &w in neighbours {
            unused.insert(edge_key(v, w));
        }
    }

    let mut paths = Vec::new();

    // Isolated ids first.
    for (&v, neighbours) in &adj {
        if neighbours.is_empty() {
            paths.push(vec![v]);
        }
    }

    // Paths starting at endpoints and branch points.
    for (&start, neighbours) in &adj {
        if neighbours.len() == 2 || neighbours.is_empty() {
            continue;
        }
        for &first in neighbours {
            if !unused.remove(&edge_key(start, first)) {
                continue;
            }
            let mut path = vec![start, first];
            let mut prev = start;
            let mut current = first;
            while adj[&current].len() == 2 {
                let next = match adj[&current].iter().find(|&&n| n != prev) {
                    Some(&next) => next,
                    None => break,
                };
                if !unused.remove(&edge_key(current, next)) {
                    break;
                }
                path.push(next);
                prev = current;
                current = next;
            }
            paths.push(path);
        }
    }

    // Whatever is left are pure cycles of degree two vertices.
    for &start in adj.keys() {
        loop {
            let first = adj[&start]
                .iter()
                .find(|&&n| unused.contains(&edge_key(start, n)))
                .copied();
            let first = match first {
                Some(first) => first,
                None => break,
            };
            unused.remove(&edge_key(start, first));
            let mut path = vec![start, first];
            let mut prev = start;
            let mut current = first;
            while current != start {
                let next = adj[&current]
                    .iter()
                    .find(|&&n| n != prev && unused.contains(&edge_key(current, n)))
                    .copied();
                let next = match next {
                    Some(next) => next,
                    None => break,
                };
                unused.remove(&edge_key(current, next));
                path.push(next);
                prev = current;
                current = next;
            }
            paths.push(path);
        }
    }

    paths
}

/// Convert components into curves by walking their linear pieces through
/// the gathered feature records.
pub fn build_curves<F>(
    pairs: &[RootPair],
    records: &[FeatureRecord],
    adjacency: &F,
    config: &TrackingConfig,
) -> Result<Vec<Curve>, TrackingError>
where
    F: Fn(ElementId) -> Vec<ElementId>,
{
    let index: HashMap<ElementId, &FeatureRecord> =
        records.iter().map(|record| (record.id, record)).collect();

    let mut curves = Vec::new();
    for component in components_from_pairs(pairs) {
        for path in linear_components(&component, adjacency) {
            if path.len() == 1 && !config.keep_singletons {
                continue;
            }
            let mut points = Vec::with_capacity(path.len());
            for id in path {
                let record = index
                    .get(&id)
                    .ok_or(TrackingError::ScannerInconsistency(id))?;
                points.push(CurvePoint {
                    x: record.x[0],
                    y: record.x[1],
                    t: record.x[2],
                    value: record.value,
                });
            }
            curves.push(Curve { points });
        }
    }

    log::info!("built {} curves", curves.len());
    Ok(curves)
}

/// Gather the converged mapping and the feature records to the root rank
/// and build the curves there.
///
/// Collective; the root rank receives `Ok(Some(curves))`, all other ranks
/// `Ok(None)`.
pub fn gather_components<E, F>(
    exchange: &mut E,
    block: &mut UnionFindBlock,
    records: &[FeatureRecord],
    adjacency: &F,
    config: &TrackingConfig,
) -> Result<Option<Vec<Curve>>, TrackingError>
where
    E: Exchange,
    F: Fn(ElementId) -> Vec<ElementId>,
{
    let pairs = block.root_pairs()?;
    let gathered_pairs = exchange.gather_pairs(&pairs);
    let gathered_records = exchange.gather_features(records);

    match (gathered_pairs, gathered_records) {
        (Some(pairs), Some(records)) => {
            Ok(Some(build_curves(&pairs, &records, adjacency, config)?))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::{build_curves, components_from_pairs, linear_components};
    use crate::types::{ElementId, FeaturePayload, FeatureRecord, RootPair, TrackingConfig};

    fn id(raw: u64) -> ElementId {
        ElementId(raw)
    }

    fn component(ids: &[u64]) -> BTreeSet<ElementId> {
        ids.iter().map(|&raw| ElementId(raw)).collect()
    }

    fn table_adjacency(edges: &[(u64, u64)]) -> impl Fn(ElementId) -> Vec<ElementId> + '_ {
        move |v: ElementId| {
            edges
                .iter()
                .flat_map(|&(a, b)| {
                    if ElementId(a) == v {
                        Some(ElementId(b))
                    } else if ElementId(b) == v {
                        Some(ElementId(a))
                    } else {
                        None
                    }
                })
                .collect()
        }
    }

    #[test]
    fn test_chain_is_one_path() {
        let adjacency = table_adjacency(&[(1, 2), (2, 3), (3, 4)]);
        let paths = linear_components(&component(&[1, 2, 3, 4]), &adjacency);
        assert_eq!(paths, vec![vec![id(1), id(2), id(3), id(4)]]);
    }

    #[test]
    fn test_branching_component_splits_at_branch_point() {
        // A "Y": centre 3 adjacent to 1, 2 and 4.
        let adjacency = table_adjacency(&[(1, 3), (2, 3), (3, 4)]);
        let paths = linear_components(&component(&[1, 2, 3, 4]), &adjacency);

        assert_eq!(paths.len(), 3);
        let as_sets: BTreeSet<BTreeSet<ElementId>> = paths
            .iter()
            .map(|path| path.iter().copied().collect())
            .collect();
        assert_eq!(
            as_sets,
            [component(&[1, 3]), component(&[2, 3]), component(&[3, 4])]
                .into_iter()
                .collect()
        );
        // The branch point is an endpoint of every path, never interior.
        for path in &paths {
            assert_eq!(path.len(), 2);
        }
    }

    #[test]
    fn test_cycle_is_closed() {
        let adjacency = table_adjacency(&[(1, 2), (2, 3), (3, 1)]);
        let paths = linear_components(&component(&[1, 2, 3]), &adjacency);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn test_every_edge_covered_exactly_once() {
        // Two branch points sharing a chain plus a dangling edge.
        let edges = [(1, 2), (2, 3), (3, 4), (3, 5), (2, 6)];
        let adjacency = table_adjacency(&edges);
        let paths = linear_components(&component(&[1, 2, 3, 4, 5, 6]), &adjacency);

        let mut covered = Vec::new();
        for path in &paths {
            for pair in path.windows(2) {
                let (a, b) = (pair[0].0.min(pair[1].0), pair[0].0.max(pair[1].0));
                covered.push((a, b));
            }
        }
        covered.sort_unstable();
        let mut expected: Vec<(u64, u64)> = edges.to_vec();
        expected.sort_unstable();
        assert_eq!(covered, expected);
    }

    fn records(ids: &[u64]) -> Vec<FeatureRecord> {
        ids.iter()
            .map(|&raw| {
                FeatureRecord::new(
                    ElementId(raw),
                    FeaturePayload {
                        x: [raw as f64, 0.0, 0.0],
                        value: raw as f64,
                    },
                )
            })
            .collect()
    }

    #[rstest]
    #[case(true, 3)]
    #[case(false, 0)]
    fn test_singleton_curves_follow_config(#[case] keep: bool, #[case] expected: usize) {
        let pairs: Vec<RootPair> = (1..=3)
            .map(|raw| RootPair {
                id: id(raw),
                root: id(raw),
            })
            .collect();
        let config = TrackingConfig {
            keep_singletons: keep,
            ..TrackingConfig::default()
        };
        let adjacency = |_id: ElementId| Vec::new();

        let curves = build_curves(&pairs, &records(&[1, 2, 3]), &adjacency, &config).unwrap();
        assert_eq!(curves.len(), expected);
        for curve in &curves {
            assert_eq!(curve.points.len(), 1);
        }
    }

    #[test]
    fn test_missing_record_is_an_inconsistency() {
        let pairs = [
            RootPair { id: id(1), root: id(1) },
            RootPair { id: id(2), root: id(1) },
        ];
        let adjacency = table_adjacency(&[(1, 2)]);

        let result = build_curves(&pairs, &records(&[1]), &adjacency, &TrackingConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_components_group_by_root() {
        let pairs = [
            RootPair { id: id(1), root: id(1) },
            RootPair { id: id(2), root: id(1) },
            RootPair { id: id(5), root: id(5) },
        ];
        let components = components_from_pairs(&pairs);
        assert_eq!(components, vec![component(&[1, 2]), component(&[5])]);
    }
}
