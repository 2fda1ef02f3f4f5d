//! Error types shared across the discretization and projection layers.
//!
//! Subsystems with errors of their own (forms, solvers, kernels, interpolation and transfer)
//! define them next to the code that raises them. [`ProjectionError`] wraps all of them.
use crate::form::FormError;
use crate::interpolate::InterpolationError;
use crate::kernel::KernelError;
use crate::mesh::CellKind;
use crate::projection::SourceKind;
use crate::solve::SolverError;
use crate::space::{Degree, Family, ValueShape};
use thiserror::Error;

/// Errors raised while building meshes, elements, function spaces or fields.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiscretizationError {
    /// The vertex matrix does not have one row per geometric coordinate of the cell kind.
    #[error("{cell_kind:?} meshes need {expected} coordinates per vertex, but got {actual}")]
    GeometryDimension {
        cell_kind: CellKind,
        expected: usize,
        actual: usize,
    },
    /// Cell connectivity is malformed.
    #[error("invalid connectivity: {0}")]
    InvalidConnectivity(String),
    /// The degree cannot be used with the given cell kind.
    #[error("degree {degree} is not supported on {cell_kind:?} cells")]
    UnsupportedDegree { cell_kind: CellKind, degree: Degree },
    /// The degree cannot be used with the given family.
    #[error("degree {degree} is not valid for the {family} family")]
    InvalidDegree { family: Family, degree: Degree },
    /// Element family name not recognized.
    #[error("unknown element family `{0}`")]
    UnknownFamily(String),
    /// A value shape with a zero extent.
    #[error("invalid value shape {0}")]
    InvalidValueShape(ValueShape),
    /// The nodal Vandermonde matrix of the element could not be inverted.
    #[error("nodal basis of degree {degree} on {cell_kind:?} cells is singular")]
    SingularElement { cell_kind: CellKind, degree: Degree },
    /// A value buffer does not match the number of degrees of freedom of its space.
    #[error("expected {expected} degrees of freedom, but got {actual}")]
    DofCountMismatch { expected: usize, actual: usize },
    /// Two fields that must share a function space do not.
    #[error("fields do not share the same function space")]
    SpaceMismatch,
}

/// Errors raised by one-shot projections and [`Projector`](crate::projection::Projector)s.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The target is of a kind that cannot be used here.
    #[error("can only project into {expected}, not into {found}")]
    InvalidTargetKind {
        expected: &'static str,
        found: &'static str,
    },
    /// The source is of a kind that cannot be used with the requested method.
    #[error("can only project from {expected}, not from {found}")]
    InvalidSourceKind {
        expected: &'static str,
        found: SourceKind,
    },
    /// Source field and target space live on different mesh instances.
    #[error("cannot project between mismatching meshes")]
    MeshMismatch,
    /// The value shape of the source differs from that of the target space.
    #[error("shape mismatch between source {source_shape} and target function space {target_shape}")]
    ShapeMismatch {
        source_shape: ValueShape,
        target_shape: ValueShape,
    },
    /// The method string names neither `l2` nor `average`.
    #[error("projection method `{0}` not recognized")]
    UnknownMethod(String),
    #[error(transparent)]
    Discretization(#[from] DiscretizationError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
}
