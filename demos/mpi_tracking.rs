//! Track the extrema of the rotating synthetic field with one partition
//! per MPI rank.
//!
//! Run with `mpirun -n <ranks> mpi_tracking`; rank 0 prints the curves.

use mpi::traits::Communicator;

use feattrack::grid::{GridSpec, LocalMaximumDetector, SyntheticField};
use feattrack::mpi_exchange::MpiExchange;
use feattrack::tracking::track_partition;
use feattrack::types::TrackingConfig;

pub fn main() {
    env_logger::init();

    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let rank = world.rank() as usize;
    let nparts = world.size() as usize;

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
    let mut exchange = MpiExchange::new(&world);

    let curves = track_partition(
        &partitions[rank],
        &detector,
        &ownership,
        &mut exchange,
        &adjacency,
        &TrackingConfig::default(),
    )
    .expect("tracking failed");

    if let Some(curves) = curves {
        println!("{} curves from {} ranks", curves.len(), nparts);
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
}
