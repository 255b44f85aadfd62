//! Crate wide constants.

/// The rank at which converged results are gathered.
pub const ROOT_RANK: usize = 0;

/// Default safety cap on distributed union-find rounds.
///
/// Convergence normally takes on the order of the partition adjacency
/// diameter. The cap only exists to turn a protocol bug into a typed
/// error instead of an endless loop.
pub const DEFAULT_ROUND_CAP: usize = 1024;
