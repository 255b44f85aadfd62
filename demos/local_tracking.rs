//! Track the extrema of the rotating synthetic field on an in-process
//! cluster of partitions.
//!
//! Usage: local_tracking [nparts]

use feattrack::grid::{GridSpec, LocalMaximumDetector, SyntheticField};
use feattrack::tracking::track_local;
use feattrack::types::TrackingConfig;

pub fn main() {
    env_logger::init();

    let nparts: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse().expect("nparts must be a positive integer"))
        .unwrap_or(2);

    let spec = GridSpec {
        nx: 64,
        ny: 64,
        nt: 16,
    };
    let field = SyntheticField {
        spec,
        scaling: 15.0,
    };
    let detector = LocalMaximumDetector { field: &field };
    let partitions = spec.partition(nparts);
    let ownership = spec.ownership(nparts);
    let adjacency = |id| spec.neighbours(id);

    let curves = track_local(
        &partitions,
        &detector,
        &ownership,
        &adjacency,
        &TrackingConfig::default(),
    )
    .expect("tracking failed");

    println!("{} curves from {} partitions", curves.len(), nparts);
    for (index, curve) in curves.iter().enumerate() {
        let first = &curve.points[0];
        let last = &curve.points[curve.points.len() - 1];
        println!(
            "curve {index}: {} points, ({:.1}, {:.1}, t={:.0}) -> ({:.1}, {:.1}, t={:.0})",
            curve.points.len(),
            first.x,
            first.y,
            first.t,
            last.x,
            last.y,
            last.t
        );
    }
}
