//! Projection of expressions and fields into finite element spaces.
//!
//! The crate provides a small Lagrange finite element discretization (meshes, reference elements,
//! function spaces and discrete fields), a form language for mass matrices and load vectors, a
//! linear solver layer and, on top of these, L2 and averaging projections through
//! [`project`](projection::project) and [`Projector`](projection::Projector).
pub mod assembly;
pub mod element;
pub mod error;
pub mod expression;
pub mod field;
pub mod form;
pub mod interpolate;
pub mod kernel;
pub mod mesh;
pub mod projection;
pub mod quadrature;
pub mod solve;
pub mod space;
pub mod transfer;

pub use error::{DiscretizationError, ProjectionError};
pub use expression::AnalyticExpression;
pub use field::DiscreteField;
pub use form::Expr;
pub use mesh::{CellKind, Mesh};
pub use projection::{
    project, ProjectOptions, Projected, ProjectionEngine, ProjectionMethod, ProjectionTarget, Projector,
    ProjectorOptions, Source, SourceKind, SourceRef,
};
pub use space::{Degree, Family, FunctionSpace, ValueShape};

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
