//! Strong Dirichlet boundary conditions.
use crate::solve::SolverError;
use crate::space::FunctionSpace;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The prescribed value of a boundary condition.
#[derive(Clone)]
pub enum BoundaryValue {
    /// One value per component.
    Constant(Vec<f64>),
    /// Values written per component at the physical position of each boundary node.
    Function(Arc<dyn Fn(&[f64], &mut [f64]) + Send + Sync>),
}

/// The part of the boundary a condition applies to.
#[derive(Clone)]
pub enum BoundaryRegion {
    Everywhere,
    /// Boundary nodes whose position satisfies the predicate.
    Where(Arc<dyn Fn(&[f64]) -> bool + Send + Sync>),
}

/// Constrains the degrees of freedom of boundary nodes of a space to prescribed values.
#[derive(Clone)]
pub struct DirichletBC {
    space: Arc<FunctionSpace>,
    value: BoundaryValue,
    region: BoundaryRegion,
}

impl Debug for DirichletBC {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            BoundaryValue::Constant(values) => format!("{values:?}"),
            BoundaryValue::Function(_) => "<function>".to_string(),
        };
        let region = match &self.region {
            BoundaryRegion::Everywhere => "everywhere",
            BoundaryRegion::Where(_) => "<predicate>",
        };
        f.debug_struct("DirichletBC")
            .field("space", &self.space.to_string())
            .field("value", &value)
            .field("region", &region)
            .finish()
    }
}

impl DirichletBC {
    pub fn new(space: Arc<FunctionSpace>, value: BoundaryValue) -> Self {
        Self {
            space,
            value,
            region: BoundaryRegion::Everywhere,
        }
    }

    /// A condition with the same value at every boundary node.
    pub fn constant(space: Arc<FunctionSpace>, values: impl Into<Vec<f64>>) -> Self {
        Self::new(space, BoundaryValue::Constant(values.into()))
    }

    pub fn from_fn(space: Arc<FunctionSpace>, function: impl Fn(&[f64], &mut [f64]) + Send + Sync + 'static) -> Self {
        Self::new(space, BoundaryValue::Function(Arc::new(function)))
    }

    /// Restricts the condition to boundary nodes whose position satisfies the predicate.
    pub fn on_region(self, predicate: impl Fn(&[f64]) -> bool + Send + Sync + 'static) -> Self {
        Self {
            region: BoundaryRegion::Where(Arc::new(predicate)),
            ..self
        }
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }

    /// Constrained degrees of freedom and their values, sorted by degree of freedom.
    pub fn constrained_dofs(&self) -> Result<Vec<(usize, f64)>, SolverError> {
        let s = self.space.local_component_count();
        if let BoundaryValue::Constant(values) = &self.value {
            if values.len() != s {
                return Err(SolverError::BoundaryValueShape {
                    expected: s,
                    actual: values.len(),
                });
            }
        }

        let coords = self.space.node_coordinates();
        let mut values = vec![0.0; s];
        let mut constraints = Vec::new();
        for node in self.space.boundary_nodes() {
            let x: Vec<f64> = coords.column(node).iter().copied().collect();
            if let BoundaryRegion::Where(predicate) = &self.region {
                if !predicate(&x) {
                    continue;
                }
            }
            match &self.value {
                BoundaryValue::Constant(constant) => values.copy_from_slice(constant),
                BoundaryValue::Function(function) => function(&x, &mut values),
            }
            constraints.extend(values.iter().enumerate().map(|(c, &v)| (s * node + c, v)));
        }
        Ok(constraints)
    }
}

/// Collects the constraints of all conditions, checking that they belong to `space`.
///
/// Later conditions override earlier ones on shared degrees of freedom.
pub(crate) fn collect_constraints(
    space: &FunctionSpace,
    bcs: &[DirichletBC],
) -> Result<Vec<Option<f64>>, SolverError> {
    let mut constrained = vec![None; space.num_dofs()];
    for bc in bcs {
        if !bc.space().is_same_space(space) {
            return Err(SolverError::BoundaryConditionSpace);
        }
        for (dof, value) in bc.constrained_dofs()? {
            constrained[dof] = Some(value);
        }
    }
    Ok(constrained)
}

/// Replaces constrained rows and columns by those of the identity, keeping the matrix symmetric.
pub(crate) fn constrain_operator(matrix: &mut CsrMatrix<f64>, constrained: &[Option<f64>]) {
    for (i, mut row) in matrix.row_iter_mut().enumerate() {
        let row_constrained = constrained[i].is_some();
        let (cols, values) = row.cols_and_values_mut();
        for (&j, value) in cols.iter().zip(values.iter_mut()) {
            if row_constrained {
                *value = if i == j { 1.0 } else { 0.0 };
            } else if constrained[j].is_some() {
                *value = 0.0;
            }
        }
    }
}

/// Moves the known values of constrained degrees of freedom to the right-hand side, using the
/// unconstrained operator, and sets the constrained entries to their values.
pub(crate) fn lift_boundary_values(
    unconstrained: &CsrMatrix<f64>,
    rhs: &mut DVector<f64>,
    constrained: &[Option<f64>],
) {
    for (i, row) in unconstrained.row_iter().enumerate() {
        if let Some(value) = constrained[i] {
            rhs[i] = value;
        } else {
            let lifted: f64 = row
                .col_indices()
                .iter()
                .zip(row.values())
                .filter_map(|(&j, &a_ij)| constrained[j].map(|g_j| a_ij * g_j))
                .sum();
            rhs[i] -= lifted;
        }
    }
}
