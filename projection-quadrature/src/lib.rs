//! Quadrature rules for the reference cells used by `fenris-projection`.
//!
//! Reference domains:
//!
//! - the unit interval `[0, 1]`,
//! - the unit triangle with vertices `(0, 0)`, `(1, 0)` and `(0, 1)`,
//! - the unit square `[0, 1]^2`.
//!
//! Rules are selected by *strength*, the maximal total polynomial degree that the rule integrates
//! exactly.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// The largest number of points per direction that any rule in this crate will use.
pub const MAX_POINTS_PER_DIRECTION: usize = 64;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// No rule of the requested strength is available.
    NoRuleAvailable { strength: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { strength } => {
                write!(f, "no quadrature rule of strength {strength} is available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule, given as weights and points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional rule.
pub type Rule2d = Rule<2>;

/// Number of Gauss points needed to integrate univariate polynomials of the given degree exactly.
pub fn gauss_points_for_strength(strength: usize) -> Result<usize, Error> {
    let n = strength / 2 + 1;
    if n > MAX_POINTS_PER_DIRECTION {
        Err(Error::NoRuleAvailable { strength })
    } else {
        Ok(n)
    }
}
