//! Solver and form compiler configuration.
//!
//! [`SolverConfiguration`] holds user overrides under their conventional option names
//! (`ksp_type`, `ksp_rtol`, `ksp_atol`, `ksp_max_it`, `pc_type`), so that configurations can be
//! read from and written to any serde format. Overrides are merged over a set of complete
//! [`SolverParameters`].
use crate::solve::SolverError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KrylovMethod {
    /// Preconditioned conjugate gradient.
    Cg,
    /// Apply the preconditioner once. Only meaningful with a direct preconditioner.
    Preonly,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreconditionerKind {
    None,
    Jacobi,
    Cholesky,
}

impl FromStr for KrylovMethod {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cg" => Ok(Self::Cg),
            "preonly" => Ok(Self::Preonly),
            _ => Err(SolverError::InvalidOption {
                key: "ksp_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for PreconditionerKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "jacobi" => Ok(Self::Jacobi),
            "cholesky" => Ok(Self::Cholesky),
            _ => Err(SolverError::InvalidOption {
                key: "pc_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl Display for KrylovMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cg => write!(f, "cg"),
            Self::Preonly => write!(f, "preonly"),
        }
    }
}

impl Display for PreconditionerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Jacobi => write!(f, "jacobi"),
            Self::Cholesky => write!(f, "cholesky"),
        }
    }
}

/// A complete set of linear solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParameters {
    pub krylov_method: KrylovMethod,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub max_iterations: usize,
    pub preconditioner: PreconditionerKind,
}

impl Default for SolverParameters {
    /// Jacobi-preconditioned CG with a relative tolerance of `1e-8`.
    fn default() -> Self {
        Self {
            krylov_method: KrylovMethod::Cg,
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-50,
            max_iterations: 10000,
            preconditioner: PreconditionerKind::Jacobi,
        }
    }
}

impl SolverParameters {
    /// Rejects parameter combinations that cannot be solved with.
    pub fn validate(&self) -> Result<(), SolverError> {
        for (key, tolerance) in [
            ("ksp_rtol", self.relative_tolerance),
            ("ksp_atol", self.absolute_tolerance),
        ] {
            if !(tolerance >= 0.0 && tolerance.is_finite()) {
                return Err(SolverError::InvalidOption {
                    key: key.to_string(),
                    value: tolerance.to_string(),
                });
            }
        }
        if self.krylov_method == KrylovMethod::Preonly && self.preconditioner != PreconditionerKind::Cholesky {
            return Err(SolverError::UnsupportedConfiguration(format!(
                "ksp_type `preonly` requires a direct preconditioner, but pc_type is `{}`",
                self.preconditioner
            )));
        }
        Ok(())
    }
}

/// User-supplied solver options. Options that are not set fall back to the defaults they are
/// merged over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfiguration {
    #[serde(rename = "ksp_type", skip_serializing_if = "Option::is_none")]
    pub krylov_method: Option<KrylovMethod>,
    #[serde(rename = "ksp_rtol", skip_serializing_if = "Option::is_none")]
    pub relative_tolerance: Option<f64>,
    #[serde(rename = "ksp_atol", skip_serializing_if = "Option::is_none")]
    pub absolute_tolerance: Option<f64>,
    #[serde(rename = "ksp_max_it", skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(rename = "pc_type", skip_serializing_if = "Option::is_none")]
    pub preconditioner: Option<PreconditionerKind>,
}

impl SolverConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_krylov_method(self, krylov_method: KrylovMethod) -> Self {
        Self {
            krylov_method: Some(krylov_method),
            ..self
        }
    }

    pub fn with_relative_tolerance(self, relative_tolerance: f64) -> Self {
        Self {
            relative_tolerance: Some(relative_tolerance),
            ..self
        }
    }

    pub fn with_absolute_tolerance(self, absolute_tolerance: f64) -> Self {
        Self {
            absolute_tolerance: Some(absolute_tolerance),
            ..self
        }
    }

    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations: Some(max_iterations),
            ..self
        }
    }

    pub fn with_preconditioner(self, preconditioner: PreconditionerKind) -> Self {
        Self {
            preconditioner: Some(preconditioner),
            ..self
        }
    }

    /// Parses options given as string pairs, such as `("ksp_rtol", "1e-10")`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SolverError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut configuration = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let invalid = || SolverError::InvalidOption {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "ksp_type" => configuration.krylov_method = Some(value.parse()?),
                "pc_type" => configuration.preconditioner = Some(value.parse()?),
                "ksp_rtol" => configuration.relative_tolerance = Some(value.parse().map_err(|_| invalid())?),
                "ksp_atol" => configuration.absolute_tolerance = Some(value.parse().map_err(|_| invalid())?),
                "ksp_max_it" => configuration.max_iterations = Some(value.parse().map_err(|_| invalid())?),
                _ => return Err(invalid()),
            }
        }
        Ok(configuration)
    }

    /// Returns the defaults with every option set in this configuration taking precedence.
    ///
    /// Neither the configuration nor the defaults are modified.
    pub fn merged_over(&self, defaults: &SolverParameters) -> SolverParameters {
        SolverParameters {
            krylov_method: self.krylov_method.unwrap_or(defaults.krylov_method),
            relative_tolerance: self
                .relative_tolerance
                .unwrap_or(defaults.relative_tolerance),
            absolute_tolerance: self
                .absolute_tolerance
                .unwrap_or(defaults.absolute_tolerance),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            preconditioner: self.preconditioner.unwrap_or(defaults.preconditioner),
        }
    }
}

/// Parameters passed through to assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormCompilerParameters {
    /// Overrides the quadrature strength of every integral when set.
    pub quadrature_degree: Option<usize>,
}

impl FormCompilerParameters {
    pub fn with_quadrature_degree(degree: usize) -> Self {
        Self {
            quadrature_degree: Some(degree),
        }
    }
}
