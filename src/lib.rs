//! Distributed critical point tracking over partitioned space-time meshes.
//!
//! The crate takes feature elements discovered per partition (with ghost
//! overlap), merges them into globally consistent connected components via a
//! round-based distributed union-find, and linearizes the components into
//! ordered trajectory curves at a root rank.
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

// Exercised by the integration tests and the example binaries.
#[cfg(test)]
use env_logger as _;
#[cfg(test)]
use rand as _;
#[cfg(test)]
use rand_chacha as _;

pub mod constants;
pub mod curves;
pub mod error;
pub mod exchange;
pub mod grid;
pub mod mesh;
#[cfg(feature = "mpi")]
pub mod mpi_exchange;
pub mod parallel_union_find;
pub mod scan;
pub mod tracking;
pub mod types;
pub mod union_find;
