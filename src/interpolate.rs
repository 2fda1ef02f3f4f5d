//! Interpolation of analytic expressions into function spaces.
use crate::expression::AnalyticExpression;
use crate::field::DiscreteField;
use crate::space::{FunctionSpace, ValueShape};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("cannot interpolate an expression of shape {expression} into a space of shape {space}")]
    ShapeMismatch { expression: ValueShape, space: ValueShape },
}

/// Turns analytic expressions into discrete fields.
pub trait ExpressionInterpolator: Send + Sync + Debug {
    fn interpolate_into(
        &self,
        expression: &AnalyticExpression,
        space: Arc<FunctionSpace>,
    ) -> Result<DiscreteField, InterpolationError>;
}

/// Interpolation by point evaluation at the nodes of the space.
#[derive(Debug, Default, Copy, Clone)]
pub struct NodalInterpolator;

impl NodalInterpolator {
    /// Overwrites the values of `field` with the nodal interpolant of `expression`.
    pub fn interpolate(&self, expression: &AnalyticExpression, field: &mut DiscreteField) -> Result<(), InterpolationError> {
        let space = field.space().clone();
        if expression.value_shape() != space.value_shape() {
            return Err(InterpolationError::ShapeMismatch {
                expression: expression.value_shape().clone(),
                space: space.value_shape().clone(),
            });
        }

        let s = space.local_component_count();
        let coords = space.node_coordinates();
        let mut x = vec![0.0; coords.nrows()];
        let mut node_values = vec![0.0; s];
        let mut values = field.values_mut();
        for (node, column) in coords.column_iter().enumerate() {
            x.iter_mut()
                .zip(column.iter())
                .for_each(|(x_a, &c_a)| *x_a = c_a);
            expression.evaluate(&x, &mut node_values);
            values.rows_mut(s * node, s).copy_from_slice(&node_values);
        }
        Ok(())
    }
}

impl ExpressionInterpolator for NodalInterpolator {
    fn interpolate_into(
        &self,
        expression: &AnalyticExpression,
        space: Arc<FunctionSpace>,
    ) -> Result<DiscreteField, InterpolationError> {
        let mut field = DiscreteField::zeros(space);
        self.interpolate(expression, &mut field)?;
        Ok(field)
    }
}
