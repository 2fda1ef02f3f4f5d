//! Discrete fields: coefficient vectors attached to a function space.
use crate::element::ReferenceFiniteElement;
use crate::error::DiscretizationError;
use crate::expression::AnalyticExpression;
use crate::interpolate::{InterpolationError, NodalInterpolator};
use crate::space::{FunctionSpace, ValueShape};
use nalgebra::{DMatrix, DVector, DVectorViewMut};
use std::sync::Arc;

/// A field in a function space, represented by one value per degree of freedom.
///
/// The length of the value buffer always equals the number of degrees of freedom of the space.
#[derive(Debug, Clone)]
pub struct DiscreteField {
    space: Arc<FunctionSpace>,
    name: Option<String>,
    values: DVector<f64>,
}

impl DiscreteField {
    /// A field with all values set to zero.
    pub fn zeros(space: Arc<FunctionSpace>) -> Self {
        let values = DVector::zeros(space.num_dofs());
        Self {
            space,
            name: None,
            values,
        }
    }

    pub fn from_values(space: Arc<FunctionSpace>, values: DVector<f64>) -> Result<Self, DiscretizationError> {
        if values.len() != space.num_dofs() {
            return Err(DiscretizationError::DofCountMismatch {
                expected: space.num_dofs(),
                actual: values.len(),
            });
        }
        Ok(Self {
            space,
            name: None,
            values,
        })
    }

    /// Nodal interpolant of an analytic expression.
    pub fn interpolated(space: Arc<FunctionSpace>, expression: &AnalyticExpression) -> Result<Self, InterpolationError> {
        let mut field = Self::zeros(space);
        field.interpolate(expression)?;
        Ok(field)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }

    pub fn value_shape(&self) -> &ValueShape {
        self.space.value_shape()
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    /// Mutable access to the values. The buffer cannot be resized through the view.
    pub fn values_mut(&mut self) -> DVectorViewMut<'_, f64> {
        DVectorViewMut::from(&mut self.values)
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Copies the values of another field in the same space.
    pub fn assign(&mut self, other: &DiscreteField) -> Result<(), DiscretizationError> {
        if !self.space.is_same_space(&other.space) {
            return Err(DiscretizationError::SpaceMismatch);
        }
        self.values.copy_from(&other.values);
        Ok(())
    }

    /// Divides every value by the corresponding value of `weights`.
    pub fn divide_pointwise(&mut self, weights: &DiscreteField) -> Result<(), DiscretizationError> {
        if !self.space.is_same_space(&weights.space) {
            return Err(DiscretizationError::SpaceMismatch);
        }
        self.values.component_div_assign(&weights.values);
        Ok(())
    }

    /// Overwrites the field with the nodal interpolant of `expression`.
    pub fn interpolate(&mut self, expression: &AnalyticExpression) -> Result<(), InterpolationError> {
        NodalInterpolator.interpolate(expression, self)
    }

    /// Gathers the values of the given cell into a matrix with one row per local node and
    /// one column per component.
    pub fn gather_cell_values(&self, cell: usize, local_values: &mut DMatrix<f64>) {
        let s = self.space.local_component_count();
        let nodes = self.space.cell_nodes(cell);
        local_values.resize_mut(nodes.len(), s, 0.0);
        for (i, &node) in nodes.iter().enumerate() {
            for c in 0..s {
                local_values[(i, c)] = self.values[node * s + c];
            }
        }
    }

    /// Adds cell-local values, laid out as in [`gather_cell_values`](Self::gather_cell_values),
    /// to the global values.
    pub fn add_cell_values(&mut self, cell: usize, local_values: &DMatrix<f64>) {
        let s = self.space.local_component_count();
        let nodes = self.space.cell_nodes(cell);
        assert_eq!(local_values.shape(), (nodes.len(), s), "Local value dimension mismatch");
        for (i, &node) in nodes.iter().enumerate() {
            for c in 0..s {
                self.values[node * s + c] += local_values[(i, c)];
            }
        }
    }

    /// Evaluates the field at reference coordinates `xi` of the given cell.
    ///
    /// `basis` must hold one entry per local node and is overwritten.
    pub fn evaluate_in_cell(&self, cell: usize, xi: &[f64], basis: &mut [f64], values: &mut [f64]) {
        let s = self.space.local_component_count();
        self.space.element().populate_basis(basis, xi);
        values.iter_mut().for_each(|v| *v = 0.0);
        for (&phi, &node) in basis.iter().zip(self.space.cell_nodes(cell)) {
            for (c, v) in values.iter_mut().enumerate().take(s) {
                *v += phi * self.values[node * s + c];
            }
        }
    }
}
