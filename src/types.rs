//! Core data types of the feature connectivity engine.

use serde::{Deserialize, Serialize};

#[cfg(feature = "mpi")]
use mpi::traits::Equivalence;

use crate::constants::DEFAULT_ROUND_CAP;

/// Globally unique identifier of a mesh element.
///
/// Ids are derived deterministically from the element's mesh position, so
/// every partition computes the same id for the same element. Ids are
/// ordered; the distributed union-find converges each component onto its
/// minimum id as the canonical root.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Payload returned by the detection oracle for a positively classified
/// element: the interpolated space-time position and the scalar value there.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FeaturePayload {
    /// Space-time coordinates `(x, y, t)`.
    pub x: [f64; 3],
    /// Scalar value at the feature position.
    pub value: f64,
}

/// A feature element discovered by the scanner.
///
/// Produced once, immutable afterwards, owned by the partition whose core
/// region contains it until gathered at the root rank. A flat aggregate
/// with no internal pointers so that checkpointing collaborators can
/// serialize lists of records directly.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct FeatureRecord {
    /// Stable element id.
    pub id: ElementId,
    /// Space-time coordinates `(x, y, t)`.
    pub x: [f64; 3],
    /// Scalar value at the feature position.
    pub value: f64,
}

impl FeatureRecord {
    /// Assemble a record from an id and the detector payload.
    pub fn new(id: ElementId, payload: FeaturePayload) -> Self {
        Self {
            id,
            x: payload.x,
            value: payload.value,
        }
    }
}

/// A relation between a locally owned feature element and a feature element
/// owned by another partition, discovered at a shared coface in the ghost
/// zone. Relation edges are facts and are never retracted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelationEdge {
    /// The endpoint owned by the emitting partition.
    pub local: ElementId,
    /// The endpoint owned by some other partition.
    pub foreign: ElementId,
}

/// One entry of the converged global mapping: an owned element id together
/// with its canonical root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct RootPair {
    /// The element id.
    pub id: ElementId,
    /// The canonical root of the element's component.
    pub root: ElementId,
}

/// Message tag: relate a remote element to the receiver's element.
pub const TAG_RELATE: u64 = 0;
/// Message tag: the root of an element changed.
pub const TAG_UPDATE: u64 = 1;

/// Wire message of the distributed union-find protocol.
///
/// Kept as a flat struct of integers rather than an enum so that the MPI
/// backend can send inboxes as plain typed buffers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct UnionMessage {
    /// One of [TAG_RELATE] or [TAG_UPDATE].
    pub tag: u64,
    /// Rank of the sending partition.
    pub sender: u64,
    /// `Relate`: the receiver-owned target id. `Update`: the id whose root changed.
    pub a: u64,
    /// `Relate`: the sender-owned source id. `Update`: the new root.
    pub b: u64,
    /// `Relate`: the sender's current root of the source id. `Update`: unused.
    pub c: u64,
}

impl UnionMessage {
    /// Build a relate message `(target, source, source_root)`.
    pub fn relate(sender: usize, target: ElementId, source: ElementId, source_root: ElementId) -> Self {
        Self {
            tag: TAG_RELATE,
            sender: sender as u64,
            a: target.0,
            b: source.0,
            c: source_root.0,
        }
    }

    /// Build a root update message `(id, new_root)`.
    pub fn update(sender: usize, id: ElementId, root: ElementId) -> Self {
        Self {
            tag: TAG_UPDATE,
            sender: sender as u64,
            a: id.0,
            b: root.0,
            c: 0,
        }
    }
}

/// One sample of an output trajectory.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Spatial x coordinate.
    pub x: f64,
    /// Spatial y coordinate.
    pub y: f64,
    /// Time coordinate.
    pub t: f64,
    /// Scalar value at the feature position.
    pub value: f64,
}

/// An ordered trajectory obtained by walking one linear component of a
/// connected feature component. A flat serializable aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// The ordered samples of the trajectory.
    pub points: Vec<CurvePoint>,
}

/// Configuration of the tracking pipeline.
#[derive(Copy, Clone, Debug)]
pub struct TrackingConfig {
    /// Safety cap on distributed union-find rounds.
    pub round_cap: usize,
    /// Emit single-point curves for isolated feature elements.
    pub keep_singletons: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            round_cap: DEFAULT_ROUND_CAP,
            keep_singletons: false,
        }
    }
}
