//! Contracts of the mesh, detection and ownership collaborators.
//!
//! The engine never iterates a mesh itself. It consumes three oracles: a
//! partition view of the mesh (elements of the feature dimension and of one
//! dimension higher, with side queries and stable ids), a detector that
//! classifies single elements, and an ownership map from element ids to the
//! rank whose core region contains them.

use crate::error::OracleError;
use crate::types::{ElementId, FeaturePayload};

/// One partition's view of the mesh, including its ghost layer.
pub trait MeshPartition: Sync {
    /// Handle to a mesh element. Cheap to clone.
    type Element: Clone + Send + Sync;

    /// All valid elements of the feature dimension in the ghost-extended
    /// region of this partition.
    fn feature_elements(&self) -> Vec<Self::Element>;

    /// All valid elements one dimension higher in the ghost-extended
    /// region. These are the cofaces at which feature elements relate.
    fn linking_elements(&self) -> Vec<Self::Element>;

    /// The boundary sides of a linking element, i.e. the candidate feature
    /// elements it touches.
    fn sides(&self, link: &Self::Element) -> Vec<Self::Element>;

    /// The stable, globally unique id of a feature element. Every partition
    /// derives the same id for the same element.
    fn element_id(&self, element: &Self::Element) -> ElementId;

    /// Whether the element lies in this partition's core (non-ghost) region,
    /// i.e. whether this partition owns it.
    fn is_core(&self, element: &Self::Element) -> bool;
}

/// Classifies a single mesh element.
///
/// Deterministic, side-effect free and safe to call concurrently.
pub trait Detector<M: MeshPartition>: Sync {
    /// Return the feature payload if the element contains a feature,
    /// `Ok(None)` otherwise. An `Err` marks the element as undecidable; the
    /// scanner logs and skips it.
    fn detect(
        &self,
        mesh: &M,
        element: &M::Element,
    ) -> Result<Option<FeaturePayload>, OracleError>;
}

/// Maps an element id to the rank that is authoritative for it.
pub trait Ownership: Sync {
    /// The owning rank, derived from which partition's core region contains
    /// the element. `None` if the id lies outside every core region.
    fn owner(&self, id: ElementId) -> Option<usize>;
}
