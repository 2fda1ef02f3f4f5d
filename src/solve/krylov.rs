//! Preconditioned conjugate gradient and direct Cholesky solves.
use crate::solve::config::PreconditionerKind;
use crate::solve::SolverError;
use log::trace;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::fmt;
use std::fmt::{Debug, Formatter};

pub trait LinearOperator {
    /// Computes `y = A x`.
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>);
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) {
        spmm_csr_dense(0.0, &mut *y, 1.0, Op::NoOp(self), Op::NoOp(x));
    }
}

/// A preconditioner built from an assembled matrix.
pub enum Preconditioner {
    Identity,
    /// Stores the reciprocal of the matrix diagonal.
    Jacobi(DVector<f64>),
    Cholesky(CscCholesky<f64>),
}

impl Debug for Preconditioner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::Jacobi(_) => write!(f, "Jacobi"),
            Self::Cholesky(_) => write!(f, "Cholesky"),
        }
    }
}

impl Preconditioner {
    pub fn build(kind: PreconditionerKind, matrix: &CsrMatrix<f64>) -> Result<Self, SolverError> {
        match kind {
            PreconditionerKind::None => Ok(Self::Identity),
            PreconditionerKind::Jacobi => {
                let mut inverse_diagonal = DVector::zeros(matrix.nrows());
                for (i, row) in matrix.row_iter().enumerate() {
                    let diagonal = row
                        .col_indices()
                        .iter()
                        .zip(row.values())
                        .find(|(&j, _)| j == i)
                        .map(|(_, &value)| value)
                        .unwrap_or(0.0);
                    if diagonal <= 0.0 {
                        return Err(SolverError::IndefinitePreconditioner);
                    }
                    inverse_diagonal[i] = 1.0 / diagonal;
                }
                Ok(Self::Jacobi(inverse_diagonal))
            }
            PreconditionerKind::Cholesky => {
                let factorization = CscCholesky::factor(&CscMatrix::from(matrix))
                    .map_err(|err| SolverError::Factorization(format!("{err:?}")))?;
                Ok(Self::Cholesky(factorization))
            }
        }
    }

    /// Solves with the Cholesky factor, if this is a Cholesky preconditioner.
    pub fn solve_direct(&self, b: &DVector<f64>) -> Option<DVector<f64>> {
        match self {
            Self::Cholesky(factorization) => {
                let solution = factorization.solve(&DMatrix::from_column_slice(b.len(), 1, b.as_slice()));
                Some(solution.column(0).into_owned())
            }
            _ => None,
        }
    }
}

impl LinearOperator for Preconditioner {
    fn apply(&self, y: &mut DVector<f64>, x: &DVector<f64>) {
        match self {
            Self::Identity => y.copy_from(x),
            Self::Jacobi(inverse_diagonal) => y.zip_zip_apply(x, inverse_diagonal, |y_i, x_i, d_i| *y_i = d_i * x_i),
            Self::Cholesky(_) => {
                if let Some(solution) = self.solve_direct(x) {
                    y.copy_from(&solution);
                }
            }
        }
    }
}

/// Residual criterion `||r|| <= max(rtol ||b||, atol)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResidualCriterion {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl ResidualCriterion {
    fn has_converged(&self, residual_norm: f64, b_norm: f64) -> bool {
        residual_norm <= f64::max(self.relative_tolerance * b_norm, self.absolute_tolerance)
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace {
    r: DVector<f64>,
    z: DVector<f64>,
    p: DVector<f64>,
    Ap: DVector<f64>,
}

impl Default for CgWorkspace {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl CgWorkspace {
    fn prepare(&mut self, dim: usize) {
        for buffer in [&mut self.r, &mut self.z, &mut self.p, &mut self.Ap] {
            buffer.resize_vertically_mut(dim, 0.0);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CgOutput {
    /// Number of updates made to the solution vector.
    pub num_iterations: usize,
    /// Norm of the recursively updated residual when the solve ended.
    pub residual_norm: f64,
}

/// Preconditioned conjugate gradient for symmetric positive definite operators.
pub struct ConjugateGradient<'a> {
    workspace: &'a mut CgWorkspace,
    operator: &'a dyn LinearOperator,
    preconditioner: &'a dyn LinearOperator,
    criterion: ResidualCriterion,
    max_iter: Option<usize>,
}

impl<'a> ConjugateGradient<'a> {
    pub fn new(
        workspace: &'a mut CgWorkspace,
        operator: &'a dyn LinearOperator,
        preconditioner: &'a dyn LinearOperator,
        criterion: ResidualCriterion,
    ) -> Self {
        Self {
            workspace,
            operator,
            preconditioner,
            criterion,
            max_iter: None,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }

    /// Solves `A x = b`, starting from the given `x`.
    #[allow(non_snake_case)]
    pub fn solve_with_guess(&mut self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<CgOutput, SolverError> {
        assert_eq!(b.len(), x.len());
        self.workspace.prepare(x.len());
        let CgWorkspace { r, z, p, Ap } = &mut *self.workspace;

        // r = b - Ax
        self.operator.apply(r, x);
        r.axpy(1.0, b, -1.0);

        // z = Pr, p = z
        self.preconditioner.apply(z, r);
        p.copy_from(z);

        let mut zTr = z.dot(r);
        let b_norm = b.norm();
        let mut output = CgOutput {
            num_iterations: 0,
            residual_norm: r.norm(),
        };

        if b_norm == 0.0 {
            x.fill(0.0);
            output.residual_norm = 0.0;
            return Ok(output);
        }

        loop {
            output.residual_norm = r.norm();
            trace!(
                "CG iteration {}: residual norm {:e}",
                output.num_iterations,
                output.residual_norm
            );
            if self.criterion.has_converged(output.residual_norm, b_norm) {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolverError::Convergence {
                        iterations: output.num_iterations,
                        residual_norm: output.residual_norm,
                    });
                }
            }

            // Ap = A p
            self.operator.apply(Ap, p);
            let pAp = p.dot(Ap);
            if pAp <= 0.0 {
                return Err(SolverError::IndefiniteOperator);
            }
            if zTr <= 0.0 {
                return Err(SolverError::IndefinitePreconditioner);
            }

            let alpha = zTr / pAp;
            x.axpy(alpha, p, 1.0);
            r.axpy(-alpha, Ap, 1.0);
            output.num_iterations += 1;

            self.preconditioner.apply(z, r);
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;

            // p = z + beta p
            p.axpy(1.0, z, beta);
            zTr = zTr_next;
        }

        Ok(output)
    }
}
