use crate::error::ProjectionError;
use crate::field::DiscreteField;
use crate::space::{FunctionSpace, ValueShape};

/// Fails unless the field lives on the same mesh instance as the target space.
pub(super) fn check_same_mesh(source: &DiscreteField, target: &FunctionSpace) -> Result<(), ProjectionError> {
    if target.is_on_mesh(source.space().mesh()) {
        Ok(())
    } else {
        Err(ProjectionError::MeshMismatch)
    }
}

pub(super) fn check_value_shape(source_shape: ValueShape, target: &FunctionSpace) -> Result<(), ProjectionError> {
    if &source_shape == target.value_shape() {
        Ok(())
    } else {
        Err(ProjectionError::ShapeMismatch {
            source_shape,
            target_shape: target.value_shape().clone(),
        })
    }
}
