//! Analytic expressions given as closures of the spatial coordinate.
use crate::space::ValueShape;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A function that writes the value at the physical point `x` into `values`.
pub type PointFunction = dyn Fn(&[f64], &mut [f64]) + Send + Sync;

/// An expression of the spatial coordinate that is not tied to any function space.
///
/// Values are written in row-major order of the value shape, one entry per component.
#[derive(Clone)]
pub struct AnalyticExpression {
    value_shape: ValueShape,
    function: Arc<PointFunction>,
}

impl AnalyticExpression {
    pub fn new(value_shape: ValueShape, function: impl Fn(&[f64], &mut [f64]) + Send + Sync + 'static) -> Self {
        Self {
            value_shape,
            function: Arc::new(function),
        }
    }

    pub fn scalar(function: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self::new(ValueShape::scalar(), move |x, values| values[0] = function(x))
    }

    pub fn vector(dim: usize, function: impl Fn(&[f64], &mut [f64]) + Send + Sync + 'static) -> Self {
        Self::new(ValueShape::vector(dim), function)
    }

    pub fn tensor(
        dims: impl Into<Vec<usize>>,
        function: impl Fn(&[f64], &mut [f64]) + Send + Sync + 'static,
    ) -> Self {
        Self::new(ValueShape::tensor(dims), function)
    }

    /// An expression with the same value everywhere.
    pub fn constant(value_shape: ValueShape, values: impl Into<Vec<f64>>) -> Self {
        let values = values.into();
        Self::new(value_shape, move |_, out| out.copy_from_slice(&values))
    }

    pub fn value_shape(&self) -> &ValueShape {
        &self.value_shape
    }

    pub fn rank(&self) -> usize {
        self.value_shape.rank()
    }

    /// Evaluates the expression at `x`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per component.
    pub fn evaluate(&self, x: &[f64], values: &mut [f64]) {
        assert_eq!(values.len(), self.value_shape.num_components(), "value buffer has wrong size");
        (self.function)(x, values)
    }
}

impl Debug for AnalyticExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticExpression")
            .field("value_shape", &self.value_shape)
            .finish_non_exhaustive()
    }
}
