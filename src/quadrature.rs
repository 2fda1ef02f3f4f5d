//! Quadrature on reference cells.
use crate::mesh::CellKind;
use projection_quadrature::{simplex, tensor, univariate};

pub use projection_quadrature::Error as QuadratureError;

/// A quadrature rule on a reference cell with points of the cell's dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CellQuadrature {
    dim: usize,
    weights: Vec<f64>,
    points: Vec<f64>,
}

impl CellQuadrature {
    /// A rule that integrates polynomials of total degree `strength` exactly on the reference cell.
    pub fn for_cell(cell_kind: CellKind, strength: usize) -> Result<Self, QuadratureError> {
        let (weights, points) = match cell_kind {
            CellKind::Interval => {
                let (weights, points) = univariate::gauss_for_strength(strength)?;
                (weights, points.into_iter().map(|[x]| x).collect())
            }
            CellKind::Triangle => {
                let (weights, points) = simplex::triangle(strength)?;
                (weights, points.into_iter().flatten().collect())
            }
            CellKind::Quadrilateral => {
                let (weights, points) = tensor::quadrilateral(strength)?;
                (weights, points.into_iter().flatten().collect())
            }
        };
        Ok(Self {
            dim: cell_kind.dim(),
            weights,
            points,
        })
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn point(&self, index: usize) -> &[f64] {
        &self.points[self.dim * index..self.dim * (index + 1)]
    }

    /// Iterates over weights and points.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.weights
            .iter()
            .copied()
            .zip(self.points.chunks_exact(self.dim))
    }
}
