//! A regular space-time grid collaborator.
//!
//! The engine itself is mesh agnostic; this module provides the concrete
//! partition, ownership and detection oracles that the demos and the
//! integration tests drive it with. Vertices of an `(x, y, t)` grid are
//! the feature elements, vertex pairs within the space-time neighbourhood
//! are the linking elements, and the domain is partitioned into contiguous
//! time slabs with a one layer ghost margin.

use crate::error::OracleError;
use crate::mesh::{Detector, MeshPartition, Ownership};
use crate::types::{ElementId, FeaturePayload};

// Forward half of the space-time neighbourhood: axis steps at equal time
// plus the full 3x3 block one step forward in time. The diagonal forward
// links keep a drifting extremum connected between consecutive steps.
const FORWARD_OFFSETS: [[i64; 3]; 11] = [
    [1, 0, 0],
    [0, 1, 0],
    [-1, -1, 1],
    [-1, 0, 1],
    [-1, 1, 1],
    [0, -1, 1],
    [0, 0, 1],
    [0, 1, 1],
    [1, -1, 1],
    [1, 0, 1],
    [1, 1, 1],
];

/// Global dimensions of the space-time grid.
#[derive(Copy, Clone, Debug)]
pub struct GridSpec {
    /// Number of vertices along x.
    pub nx: usize,
    /// Number of vertices along y.
    pub ny: usize,
    /// Number of time steps.
    pub nt: usize,
}

impl GridSpec {
    /// Stable id of a vertex: its linear index in the grid.
    pub fn vertex_id(&self, vertex: [usize; 3]) -> ElementId {
        let [x, y, t] = vertex;
        ElementId(((t * self.ny + y) * self.nx + x) as u64)
    }

    /// Decode a vertex id back into grid coordinates.
    pub fn vertex_of(&self, id: ElementId) -> [usize; 3] {
        let raw = id.0 as usize;
        let x = raw % self.nx;
        let y = (raw / self.nx) % self.ny;
        let t = raw / (self.nx * self.ny);
        [x, y, t]
    }

    fn contains(&self, vertex: [i64; 3]) -> bool {
        let [x, y, t] = vertex;
        x >= 0
            && (x as usize) < self.nx
            && y >= 0
            && (y as usize) < self.ny
            && t >= 0
            && (t as usize) < self.nt
    }

    /// The symmetric space-time neighbourhood of a vertex. This is the
    /// adjacency the curve builder walks; it mirrors the linking elements
    /// the partitions enumerate.
    pub fn neighbours(&self, id: ElementId) -> Vec<ElementId> {
        let [x, y, t] = self.vertex_of(id);
        let centre = [x as i64, y as i64, t as i64];

        let mut result = Vec::new();
        for offset in FORWARD_OFFSETS {
            for signed in [offset, [-offset[0], -offset[1], -offset[2]]] {
                let candidate = [
                    centre[0] + signed[0],
                    centre[1] + signed[1],
                    centre[2] + signed[2],
                ];
                if self.contains(candidate) {
                    result.push(self.vertex_id([
                        candidate[0] as usize,
                        candidate[1] as usize,
                        candidate[2] as usize,
                    ]));
                }
            }
        }
        result
    }

    fn slabs(&self, nparts: usize) -> Vec<(usize, usize)> {
        assert!(nparts > 0 && nparts <= self.nt);
        let base = self.nt / nparts;
        let rem = self.nt % nparts;

        (0..nparts)
            .map(|rank| {
                let start = rank * base + rank.min(rem);
                let len = base + usize::from(rank < rem);
                (start, start + len - 1)
            })
            .collect()
    }

    /// Partition the grid into `nparts` contiguous time slabs with a one
    /// layer ghost margin.
    pub fn partition(&self, nparts: usize) -> Vec<GridPartition> {
        self.slabs(nparts)
            .into_iter()
            .enumerate()
            .map(|(rank, core_t)| GridPartition {
                spec: *self,
                rank,
                core_t,
                ghost_t: (
                    core_t.0.saturating_sub(1),
                    (core_t.1 + 1).min(self.nt - 1),
                ),
            })
            .collect()
    }

    /// The ownership oracle matching [GridSpec::partition].
    pub fn ownership(&self, nparts: usize) -> GridOwnership {
        GridOwnership {
            spec: *self,
            slabs: self.slabs(nparts),
        }
    }
}

/// A mesh element of the grid partition.
#[derive(Clone, Debug)]
pub enum GridElement {
    /// A grid vertex, the feature dimension.
    Vertex([usize; 3]),
    /// A pair of neighbouring vertices, the linking dimension.
    Link([usize; 3], [usize; 3]),
}

/// One time slab of the grid, including its ghost margin.
#[derive(Clone, Debug)]
pub struct GridPartition {
    spec: GridSpec,
    rank: usize,
    core_t: (usize, usize),
    ghost_t: (usize, usize),
}

impl GridPartition {
    /// The rank this partition belongs to.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Inclusive time bounds of the core region.
    pub fn core_bounds(&self) -> (usize, usize) {
        self.core_t
    }

    fn ghost_vertices(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let spec = self.spec;
        (self.ghost_t.0..=self.ghost_t.1).flat_map(move |t| {
            (0..spec.ny).flat_map(move |y| (0..spec.nx).map(move |x| [x, y, t]))
        })
    }
}

impl MeshPartition for GridPartition {
    type Element = GridElement;

    fn feature_elements(&self) -> Vec<GridElement> {
        self.ghost_vertices().map(GridElement::Vertex).collect()
    }

    fn linking_elements(&self) -> Vec<GridElement> {
        let mut links = Vec::new();
        for vertex in self.ghost_vertices() {
            let centre = [vertex[0] as i64, vertex[1] as i64, vertex[2] as i64];
            for offset in FORWARD_OFFSETS {
                let candidate = [
                    centre[0] + offset[0],
                    centre[1] + offset[1],
                    centre[2] + offset[2],
                ];
                if self.spec.contains(candidate) && (candidate[2] as usize) <= self.ghost_t.1 {
                    links.push(GridElement::Link(
                        vertex,
                        [
                            candidate[0] as usize,
                            candidate[1] as usize,
                            candidate[2] as usize,
                        ],
                    ));
                }
            }
        }
        links
    }

    fn sides(&self, link: &GridElement) -> Vec<GridElement> {
        match link {
            GridElement::Link(a, b) => {
                vec![GridElement::Vertex(*a), GridElement::Vertex(*b)]
            }
            GridElement::Vertex(_) => Vec::new(),
        }
    }

    fn element_id(&self, element: &GridElement) -> ElementId {
        match element {
            GridElement::Vertex(vertex) => self.spec.vertex_id(*vertex),
            GridElement::Link(a, _) => self.spec.vertex_id(*a),
        }
    }

    fn is_core(&self, element: &GridElement) -> bool {
        match element {
            GridElement::Vertex(vertex) => {
                self.core_t.0 <= vertex[2] && vertex[2] <= self.core_t.1
            }
            GridElement::Link(_, _) => false,
        }
    }
}

/// Ownership oracle of the time slab partitioning.
pub struct GridOwnership {
    spec: GridSpec,
    slabs: Vec<(usize, usize)>,
}

impl Ownership for GridOwnership {
    fn owner(&self, id: ElementId) -> Option<usize> {
        if id.0 as usize >= self.spec.nx * self.spec.ny * self.spec.nt {
            return None;
        }
        let [_, _, t] = self.spec.vertex_of(id);
        self.slabs
            .iter()
            .position(|&(start, end)| start <= t && t <= end)
    }
}

/// A synthetic scalar field whose extrema rotate smoothly around the
/// domain centre over time, evaluated on grid vertices. Rotation keeps
/// each extremum alive across consecutive time steps, so the field
/// produces long trajectories to track.
pub struct SyntheticField {
    /// Grid the field lives on.
    pub spec: GridSpec,
    /// Controls the spatial frequency of the pattern.
    pub scaling: f64,
}

impl SyntheticField {
    /// Field value at a vertex.
    pub fn value(&self, vertex: [usize; 3]) -> f64 {
        let [x, y, t] = vertex;
        let nx = (self.spec.nx - 1).max(1) as f64;
        let ny = (self.spec.ny - 1).max(1) as f64;
        let nt = (self.spec.nt - 1).max(1) as f64;

        let x = (x as f64 / nx - 0.5) * self.scaling;
        let y = (y as f64 / ny - 0.5) * self.scaling;
        let t = t as f64 / nt + 1e-4;

        (x * t.cos() - y * t.sin()).cos() * (x * t.sin() + y * t.cos()).sin()
    }
}

/// Detection oracle: a vertex is a feature if it is a strict spatial local
/// maximum of the field at its time step. Interior vertices only, so every
/// partition classifies a shared vertex identically.
pub struct LocalMaximumDetector<'f> {
    /// The field to classify on.
    pub field: &'f SyntheticField,
}

impl Detector<GridPartition> for LocalMaximumDetector<'_> {
    fn detect(
        &self,
        _mesh: &GridPartition,
        element: &GridElement,
    ) -> Result<Option<FeaturePayload>, OracleError> {
        let vertex = match element {
            GridElement::Vertex(vertex) => *vertex,
            GridElement::Link(_, _) => return Ok(None),
        };
        let [x, y, t] = vertex;
        let spec = self.field.spec;
        if x == 0 || x + 1 == spec.nx || y == 0 || y + 1 == spec.ny {
            return Ok(None);
        }

        let value = self.field.value(vertex);
        let spatial_neighbours = [
            [x - 1, y, t],
            [x + 1, y, t],
            [x, y - 1, t],
            [x, y + 1, t],
        ];
        for neighbour in spatial_neighbours {
            if self.field.value(neighbour) >= value {
                return Ok(None);
            }
        }

        Ok(Some(FeaturePayload {
            x: [x as f64, y as f64, t as f64],
            value,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::{GridSpec, SyntheticField};
    use crate::mesh::{MeshPartition, Ownership};

    #[test]
    fn test_vertex_id_round_trip() {
        let spec = GridSpec { nx: 5, ny: 4, nt: 3 };
        for t in 0..spec.nt {
            for y in 0..spec.ny {
                for x in 0..spec.nx {
                    let id = spec.vertex_id([x, y, t]);
                    assert_eq!(spec.vertex_of(id), [x, y, t]);
                }
            }
        }
    }

    #[test]
    fn test_slabs_cover_the_time_axis() {
        let spec = GridSpec { nx: 4, ny: 4, nt: 7 };
        let partitions = spec.partition(3);

        assert_eq!(partitions[0].core_bounds(), (0, 2));
        assert_eq!(partitions[1].core_bounds(), (3, 4));
        assert_eq!(partitions[2].core_bounds(), (5, 6));

        // Ghost margins clamp at the domain boundary.
        assert_eq!(partitions[0].ghost_t, (0, 3));
        assert_eq!(partitions[1].ghost_t, (2, 5));
        assert_eq!(partitions[2].ghost_t, (4, 6));
    }

    #[test]
    fn test_linking_elements_match_the_neighbourhood() {
        let spec = GridSpec { nx: 4, ny: 3, nt: 3 };
        let partitions = spec.partition(1);
        let partition = &partitions[0];

        for link in partition.linking_elements() {
            let sides = partition.sides(&link);
            assert_eq!(sides.len(), 2);
            let a = partition.element_id(&sides[0]);
            let b = partition.element_id(&sides[1]);
            assert!(spec.neighbours(a).contains(&b));
            assert!(spec.neighbours(b).contains(&a));
        }
    }

    #[test]
    fn test_ownership_matches_core_regions() {
        let spec = GridSpec { nx: 3, ny: 3, nt: 8 };
        let nparts = 3;
        let partitions = spec.partition(nparts);
        let ownership = spec.ownership(nparts);

        for partition in &partitions {
            for element in partition.feature_elements() {
                let id = partition.element_id(&element);
                if partition.is_core(&element) {
                    assert_eq!(ownership.owner(id), Some(partition.rank()));
                }
            }
        }
        // Ids outside the grid have no owner.
        assert_eq!(ownership.owner(crate::types::ElementId(10_000)), None);
    }

    #[test]
    fn test_field_is_deterministic() {
        let spec = GridSpec { nx: 16, ny: 16, nt: 4 };
        let field = SyntheticField { spec, scaling: 15.0 };
        assert_eq!(field.value([3, 7, 2]), field.value([3, 7, 2]));
    }
}
