//! Lagrange reference elements with equispaced nodes.
use crate::error::DiscretizationError;
use crate::mesh::CellKind;
use crate::space::Degree;
use nalgebra::{DMatrix, DVector};

pub trait ReferenceFiniteElement {
    /// Returns the number of nodes in the element.
    fn num_nodes(&self) -> usize;

    /// Evaluates each basis function at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// May panic if `basis_values` does not have exactly one entry per node.
    fn populate_basis(&self, basis_values: &mut [f64], reference_coords: &[f64]);

    /// Evaluates each basis function at the given reference coordinates.
    fn evaluate_basis(&self, reference_coords: &[f64]) -> DVector<f64> {
        let mut values = DVector::zeros(self.num_nodes());
        self.populate_basis(values.as_mut_slice(), reference_coords);
        values
    }
}

/// A scalar Lagrange element on one of the reference cells.
///
/// Nodes lie on an equispaced lattice. Every node carries integer weights with respect to the
/// vertices of the cell (its scaled barycentric coordinates on simplices, or products of the
/// scaled one-dimensional coordinates on quadrilaterals). These weights identify the node
/// independently of the cell it is seen from, which is what continuous spaces use to share nodes
/// between neighboring cells.
///
/// A degree of zero places a single node at the centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeElement {
    cell_kind: CellKind,
    degrees: [usize; 2],
    nodes: Vec<[f64; 2]>,
    vertex_weights: Vec<[usize; 4]>,
    exponents: Vec<[i32; 2]>,
    // Column j holds the monomial coefficients of basis function j
    coefficients: DMatrix<f64>,
}

/// Node positions and vertex weights along one direction of the lattice.
fn lattice_1d(degree: usize) -> Vec<(f64, [usize; 2])> {
    if degree == 0 {
        vec![(0.5, [1, 1])]
    } else {
        (0..=degree)
            .map(|i| (i as f64 / degree as f64, [degree - i, i]))
            .collect()
    }
}

impl LagrangeElement {
    pub fn new(cell_kind: CellKind, degree: &Degree) -> Result<Self, DiscretizationError> {
        let degrees = match (cell_kind, degree) {
            (_, Degree::Uniform(p)) => [*p, *p],
            (CellKind::Quadrilateral, Degree::PerDirection(d)) if d.len() == 2 => [d[0], d[1]],
            (CellKind::Interval, Degree::PerDirection(d)) if d.len() == 1 => [d[0], d[0]],
            _ => {
                return Err(DiscretizationError::UnsupportedDegree {
                    cell_kind,
                    degree: degree.clone(),
                })
            }
        };

        let mut nodes = Vec::new();
        let mut vertex_weights = Vec::new();
        let mut exponents = Vec::new();
        match cell_kind {
            CellKind::Interval => {
                let p = degrees[0];
                for (x, [w0, w1]) in lattice_1d(p) {
                    nodes.push([x, 0.0]);
                    vertex_weights.push([w0, w1, 0, 0]);
                }
                exponents.extend((0..=p).map(|a| [a as i32, 0]));
            }
            CellKind::Triangle => {
                let p = degrees[0];
                if p == 0 {
                    nodes.push([1.0 / 3.0, 1.0 / 3.0]);
                    vertex_weights.push([1, 1, 1, 0]);
                } else {
                    for j in 0..=p {
                        for i in 0..=(p - j) {
                            nodes.push([i as f64 / p as f64, j as f64 / p as f64]);
                            vertex_weights.push([p - i - j, i, j, 0]);
                        }
                    }
                }
                for b in 0..=p {
                    exponents.extend((0..=(p - b)).map(|a| [a as i32, b as i32]));
                }
            }
            CellKind::Quadrilateral => {
                let [p, q] = degrees;
                for (y, [g0, g1]) in lattice_1d(q) {
                    for (x, [f0, f1]) in lattice_1d(p) {
                        nodes.push([x, y]);
                        vertex_weights.push([f0 * g0, f1 * g0, f1 * g1, f0 * g1]);
                    }
                }
                for b in 0..=q {
                    exponents.extend((0..=p).map(|a| [a as i32, b as i32]));
                }
            }
        }

        // Vandermonde matrix V_ik = m_k(x_i). Basis function j is sum_k m_k C_kj with C = V^-1.
        let n = nodes.len();
        let vandermonde = DMatrix::from_fn(n, n, |i, k| monomial(&exponents[k], &nodes[i]));
        let coefficients = vandermonde
            .try_inverse()
            .ok_or_else(|| DiscretizationError::SingularElement {
                cell_kind,
                degree: degree.clone(),
            })?;

        Ok(Self {
            cell_kind,
            degrees,
            nodes,
            vertex_weights,
            exponents,
            coefficients,
        })
    }

    pub fn cell_kind(&self) -> CellKind {
        self.cell_kind
    }

    /// Polynomial degree in each reference direction.
    pub fn degrees(&self) -> &[usize] {
        &self.degrees[..self.cell_kind.dim()]
    }

    /// Largest total polynomial degree of any basis function.
    pub fn max_total_degree(&self) -> usize {
        match self.cell_kind {
            CellKind::Quadrilateral => self.degrees[0] + self.degrees[1],
            _ => self.degrees[0],
        }
    }

    /// Reference coordinates of the given node.
    pub fn reference_node(&self, node: usize) -> &[f64] {
        &self.nodes[node][..self.cell_kind.dim()]
    }

    /// Integer weights of the node with respect to the local vertices of the cell.
    pub fn vertex_weights(&self, node: usize) -> &[usize] {
        &self.vertex_weights[node][..self.cell_kind.num_vertices()]
    }

    /// Tests whether the node lies on the closure of the entity spanned by the given local vertices.
    ///
    /// Degree zero nodes are interior to the cell and never lie on a proper sub-entity.
    pub fn node_is_supported_by(&self, node: usize, local_vertices: &[usize]) -> bool {
        self.vertex_weights(node)
            .iter()
            .enumerate()
            .all(|(v, &w)| w == 0 || local_vertices.contains(&v))
    }

    /// A key identifying the node globally, given the global vertex indices of the cell.
    ///
    /// The key is the sorted list of `(global vertex, weight)` pairs with non-zero weight.
    pub(crate) fn global_node_key(&self, node: usize, cell_vertices: &[usize]) -> Vec<(usize, usize)> {
        let mut key: Vec<_> = self
            .vertex_weights(node)
            .iter()
            .zip(cell_vertices)
            .filter(|&(&w, _)| w > 0)
            .map(|(&w, &v)| (v, w))
            .collect();
        key.sort_unstable();
        key
    }
}

fn monomial(exponents: &[i32; 2], xi: &[f64]) -> f64 {
    let y = xi.get(1).copied().unwrap_or(0.0);
    xi[0].powi(exponents[0]) * y.powi(exponents[1])
}

impl ReferenceFiniteElement for LagrangeElement {
    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn populate_basis(&self, basis_values: &mut [f64], reference_coords: &[f64]) {
        assert_eq!(basis_values.len(), self.num_nodes(), "basis buffer has wrong size");
        basis_values.iter_mut().for_each(|phi| *phi = 0.0);
        for (k, exponents) in self.exponents.iter().enumerate() {
            let m_k = monomial(exponents, reference_coords);
            for (j, phi_j) in basis_values.iter_mut().enumerate() {
                *phi_j += m_k * self.coefficients[(k, j)];
            }
        }
    }
}
