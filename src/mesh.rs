//! Simplicial and quadrilateral meshes of dimension one and two.
use crate::error::DiscretizationError;
use nalgebra::{DMatrix, DVectorView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod procedural;
mod refinement;

pub use refinement::ChildMap;

/// The kind of cell a mesh is made of.
///
/// Reference cells are the unit interval `[0, 1]`, the unit triangle with vertices
/// `(0, 0), (1, 0), (0, 1)` and the unit square `[0, 1]^2` with counter-clockwise vertices
/// `(0, 0), (1, 0), (1, 1), (0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Interval,
    Triangle,
    Quadrilateral,
}

const INTERVAL_FACETS: &[&[usize]] = &[&[0], &[1]];
const TRIANGLE_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
const QUADRILATERAL_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];

const INTERVAL_VERTICES: &[[f64; 2]] = &[[0.0, 0.0], [1.0, 0.0]];
const TRIANGLE_VERTICES: &[[f64; 2]] = &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
const QUADRILATERAL_VERTICES: &[[f64; 2]] = &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

impl CellKind {
    /// Topological (and geometric) dimension of the cell.
    pub fn dim(&self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle | Self::Quadrilateral => 2,
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Interval => 2,
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
        }
    }

    pub fn is_simplex(&self) -> bool {
        !matches!(self, Self::Quadrilateral)
    }

    /// Local vertex indices of each facet of the reference cell.
    pub fn local_facets(&self) -> &'static [&'static [usize]] {
        match self {
            Self::Interval => INTERVAL_FACETS,
            Self::Triangle => TRIANGLE_FACETS,
            Self::Quadrilateral => QUADRILATERAL_FACETS,
        }
    }

    /// Reference vertex coordinates, padded with zeros to two components.
    pub fn reference_vertices(&self) -> &'static [[f64; 2]] {
        match self {
            Self::Interval => INTERVAL_VERTICES,
            Self::Triangle => TRIANGLE_VERTICES,
            Self::Quadrilateral => QUADRILATERAL_VERTICES,
        }
    }

    /// Tests whether a reference point lies in the closed reference cell, up to `tol`.
    pub fn contains_reference_point(&self, xi: &[f64], tol: f64) -> bool {
        let in_unit = |t: f64| t >= -tol && t <= 1.0 + tol;
        match self {
            Self::Interval => in_unit(xi[0]),
            Self::Triangle => xi[0] >= -tol && xi[1] >= -tol && xi[0] + xi[1] <= 1.0 + tol,
            Self::Quadrilateral => in_unit(xi[0]) && in_unit(xi[1]),
        }
    }

    /// Evaluates the linear (bilinear for quadrilaterals) vertex shape functions.
    pub(crate) fn populate_vertex_shape_functions(&self, xi: &[f64], values: &mut [f64]) {
        match self {
            Self::Interval => {
                values[0] = 1.0 - xi[0];
                values[1] = xi[0];
            }
            Self::Triangle => {
                values[0] = 1.0 - xi[0] - xi[1];
                values[1] = xi[0];
                values[2] = xi[1];
            }
            Self::Quadrilateral => {
                let (x, y) = (xi[0], xi[1]);
                values[0] = (1.0 - x) * (1.0 - y);
                values[1] = x * (1.0 - y);
                values[2] = x * y;
                values[3] = (1.0 - x) * y;
            }
        }
    }

    /// Gradients of the vertex shape functions, stored row-wise as `[d/dxi, d/deta]` per vertex.
    pub(crate) fn populate_vertex_shape_gradients(&self, xi: &[f64], gradients: &mut [[f64; 2]]) {
        match self {
            Self::Interval => {
                gradients[0] = [-1.0, 0.0];
                gradients[1] = [1.0, 0.0];
            }
            Self::Triangle => {
                gradients[0] = [-1.0, -1.0];
                gradients[1] = [1.0, 0.0];
                gradients[2] = [0.0, 1.0];
            }
            Self::Quadrilateral => {
                let (x, y) = (xi[0], xi[1]);
                gradients[0] = [-(1.0 - y), -(1.0 - x)];
                gradients[1] = [1.0 - y, -x];
                gradients[2] = [y, x];
                gradients[3] = [-y, 1.0 - x];
            }
        }
    }
}

/// A facet on the boundary of a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFacet {
    /// The cell the facet belongs to.
    pub cell: usize,
    /// Index of the facet among the local facets of the cell.
    pub local_index: usize,
    /// Global vertex indices of the facet, in the orientation of the cell.
    pub vertices: Vec<usize>,
}

/// A mesh consisting of cells of a single kind.
///
/// Vertices are stored column-wise, so that `vertices().column(i)` holds the coordinates of
/// vertex `i`. Meshes are compared by instance when they are shared behind an `Arc`: two
/// function spaces live on the same mesh only when they point to the same allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    cell_kind: CellKind,
    vertices: DMatrix<f64>,
    cells: Vec<usize>,
}

impl Mesh {
    /// Creates a mesh from column-wise vertex coordinates and flat cell connectivity.
    pub fn new(cell_kind: CellKind, vertices: DMatrix<f64>, cells: Vec<usize>) -> Result<Self, DiscretizationError> {
        let dim = cell_kind.dim();
        if vertices.nrows() != dim {
            return Err(DiscretizationError::GeometryDimension {
                cell_kind,
                expected: dim,
                actual: vertices.nrows(),
            });
        }

        let nv = cell_kind.num_vertices();
        if cells.len() % nv != 0 {
            return Err(DiscretizationError::InvalidConnectivity(format!(
                "connectivity length {} is not a multiple of {nv}",
                cells.len()
            )));
        }
        if let Some(index) = cells.iter().find(|&&v| v >= vertices.ncols()) {
            return Err(DiscretizationError::InvalidConnectivity(format!(
                "vertex index {index} out of bounds for mesh with {} vertices",
                vertices.ncols()
            )));
        }

        Ok(Self {
            cell_kind,
            vertices,
            cells,
        })
    }

    pub fn cell_kind(&self) -> CellKind {
        self.cell_kind
    }

    pub fn geometric_dim(&self) -> usize {
        self.cell_kind.dim()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.ncols()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len() / self.cell_kind.num_vertices()
    }

    pub fn vertices(&self) -> &DMatrix<f64> {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> DVectorView<'_, f64> {
        self.vertices.column(index)
    }

    /// Global vertex indices of the given cell.
    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let nv = self.cell_kind.num_vertices();
        &self.cells[nv * cell..nv * (cell + 1)]
    }

    pub fn cells(&self) -> impl Iterator<Item = &[usize]> {
        self.cells.chunks_exact(self.cell_kind.num_vertices())
    }

    /// Maps reference coordinates in the given cell to physical coordinates.
    pub fn map_reference_coords(&self, cell: usize, xi: &[f64], x: &mut [f64]) {
        let mut shape = [0.0; 4];
        self.cell_kind
            .populate_vertex_shape_functions(xi, &mut shape);
        x.iter_mut().for_each(|x_i| *x_i = 0.0);
        for (&v, &phi) in self.cell_vertices(cell).iter().zip(&shape) {
            for (a, x_a) in x.iter_mut().enumerate() {
                *x_a += phi * self.vertices[(a, v)];
            }
        }
    }

    /// Jacobian of the reference-to-physical map in the given cell at `xi`.
    pub fn reference_jacobian(&self, cell: usize, xi: &[f64]) -> DMatrix<f64> {
        let dim = self.geometric_dim();
        let mut gradients = [[0.0; 2]; 4];
        self.cell_kind
            .populate_vertex_shape_gradients(xi, &mut gradients);
        let mut jacobian = DMatrix::zeros(dim, dim);
        for (&v, grad) in self.cell_vertices(cell).iter().zip(&gradients) {
            for a in 0..dim {
                for b in 0..dim {
                    jacobian[(a, b)] += self.vertices[(a, v)] * grad[b];
                }
            }
        }
        jacobian
    }

    /// Absolute value of the Jacobian determinant of the reference map at `xi`.
    pub fn reference_volume_factor(&self, cell: usize, xi: &[f64]) -> f64 {
        self.reference_jacobian(cell, xi).determinant().abs()
    }

    /// Finds the facets that belong to exactly one cell.
    ///
    /// The result is ordered by the sorted vertex indices of each facet.
    pub fn find_boundary_facets(&self) -> Vec<BoundaryFacet> {
        // Count facets by their sorted vertex indices. A BTreeMap keeps the output deterministic.
        let mut facet_counts: BTreeMap<Vec<usize>, (BoundaryFacet, usize)> = BTreeMap::new();
        for (cell, cell_vertices) in self.cells().enumerate() {
            for (local_index, local_facet) in self.cell_kind.local_facets().iter().enumerate() {
                let vertices: Vec<usize> = local_facet.iter().map(|&i| cell_vertices[i]).collect();
                let mut key = vertices.clone();
                key.sort_unstable();
                facet_counts
                    .entry(key)
                    .and_modify(|(_, count)| *count += 1)
                    .or_insert((
                        BoundaryFacet {
                            cell,
                            local_index,
                            vertices,
                        },
                        1,
                    ));
            }
        }

        facet_counts
            .into_values()
            .filter(|(_, count)| *count == 1)
            .map(|(facet, _)| facet)
            .collect()
    }

    /// Returns a sorted list of vertices that belong to a boundary facet.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .find_boundary_facets()
            .into_iter()
            .flat_map(|facet| facet.vertices)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
