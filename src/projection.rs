//! Projection of expressions and fields into function spaces.
//!
//! Two methods are supported. [`ProjectionMethod::L2`] solves the Galerkin system
//! `(v, u) = (v, f)` for all test functions `v` of the target space. [`ProjectionMethod::Average`]
//! sets every degree of freedom to the mean of the source values over the cells sharing it, which
//! is mainly useful for turning discontinuous fields into continuous ones.
//!
//! One-shot projections go through [`project`] (or [`ProjectionEngine::project`]). Repeated
//! projections of the same source into the same field should use a [`Projector`], which builds
//! forms, solvers and weights once.
use crate::error::{DiscretizationError, ProjectionError};
use crate::expression::AnalyticExpression;
use crate::field::DiscreteField;
use crate::form::{dx, inner, Equation, Expr, FormError, TestFunction, TrialFunction};
use crate::interpolate::{ExpressionInterpolator, NodalInterpolator};
use crate::kernel::{check_extents, AccumulationKernel, CellLoopExecutor, KernelArgument, KernelExecutor};
use crate::mesh::Mesh;
use crate::solve::{
    DirichletBC, FormCompilerParameters, KrylovSolver, LinearSolver, SolverConfiguration, SolverParameters,
};
use crate::space::{Family, FunctionSpace, ValueShape};
use log::debug;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::Arc;

mod projector;
mod validation;

pub use projector::{Projector, ProjectorOptions};

use validation::{check_same_mesh, check_value_shape};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMethod {
    /// Galerkin projection with respect to the L2 inner product.
    #[default]
    L2,
    /// Averaging of cell-local source values at shared degrees of freedom.
    Average,
}

impl FromStr for ProjectionMethod {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(Self::L2),
            "average" => Ok(Self::Average),
            other => Err(ProjectionError::UnknownMethod(other.to_string())),
        }
    }
}

impl AsRef<str> for ProjectionMethod {
    fn as_ref(&self) -> &str {
        match self {
            Self::L2 => "l2",
            Self::Average => "average",
        }
    }
}

impl Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The kind of a projection source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Analytic,
    Field,
    Symbolic,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analytic => write!(f, "analytic expressions"),
            Self::Field => write!(f, "discrete fields"),
            Self::Symbolic => write!(f, "symbolic expressions"),
        }
    }
}

/// An owned projection source.
#[derive(Debug, Clone)]
pub enum Source {
    Analytic(AnalyticExpression),
    Field(DiscreteField),
    Symbolic(Expr),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        SourceRef::from(self).kind()
    }

    fn into_field(self) -> Result<DiscreteField, Self> {
        match self {
            Self::Field(field) | Self::Symbolic(Expr::Coefficient(field)) => Ok(field),
            other => Err(other),
        }
    }
}

impl From<AnalyticExpression> for Source {
    fn from(expression: AnalyticExpression) -> Self {
        Self::Analytic(expression)
    }
}

impl From<DiscreteField> for Source {
    fn from(field: DiscreteField) -> Self {
        Self::Field(field)
    }
}

impl From<Expr> for Source {
    fn from(expr: Expr) -> Self {
        Self::Symbolic(expr)
    }
}

/// A borrowed projection source.
#[derive(Debug, Copy, Clone)]
pub enum SourceRef<'a> {
    Analytic(&'a AnalyticExpression),
    Field(&'a DiscreteField),
    Symbolic(&'a Expr),
}

impl<'a> SourceRef<'a> {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Analytic(_) => SourceKind::Analytic,
            Self::Field(_) => SourceKind::Field,
            Self::Symbolic(_) => SourceKind::Symbolic,
        }
    }

    /// The discrete field this source consists of, if any.
    ///
    /// A symbolic expression that is a single coefficient counts as that field.
    pub fn as_field(&self) -> Option<&'a DiscreteField> {
        match *self {
            Self::Analytic(_) => None,
            Self::Field(field) => Some(field),
            Self::Symbolic(expr) => expr.as_coefficient(),
        }
    }

    pub fn value_shape(&self) -> Result<ValueShape, FormError> {
        match self {
            Self::Analytic(expression) => Ok(expression.value_shape().clone()),
            Self::Field(field) => Ok(field.value_shape().clone()),
            Self::Symbolic(expr) => expr.value_shape(),
        }
    }
}

impl<'a> From<&'a AnalyticExpression> for SourceRef<'a> {
    fn from(expression: &'a AnalyticExpression) -> Self {
        Self::Analytic(expression)
    }
}

impl<'a> From<&'a DiscreteField> for SourceRef<'a> {
    fn from(field: &'a DiscreteField) -> Self {
        Self::Field(field)
    }
}

impl<'a> From<&'a Expr> for SourceRef<'a> {
    fn from(expr: &'a Expr) -> Self {
        Self::Symbolic(expr)
    }
}

impl<'a> From<&'a Source> for SourceRef<'a> {
    fn from(source: &'a Source) -> Self {
        match source {
            Source::Analytic(expression) => Self::Analytic(expression),
            Source::Field(field) => Self::Field(field),
            Source::Symbolic(expr) => Self::Symbolic(expr),
        }
    }
}

/// Where a projection writes its result.
#[derive(Debug)]
pub enum ProjectionTarget<'a> {
    /// A new field is allocated in the space.
    Space(Arc<FunctionSpace>),
    /// The existing field is overwritten.
    Field(&'a mut DiscreteField),
}

impl<'a> ProjectionTarget<'a> {
    pub fn space(&self) -> &Arc<FunctionSpace> {
        match self {
            Self::Space(space) => space,
            Self::Field(field) => field.space(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Space(_) => "function spaces",
            Self::Field(_) => "existing fields",
        }
    }
}

impl<'a> From<Arc<FunctionSpace>> for ProjectionTarget<'a> {
    fn from(space: Arc<FunctionSpace>) -> Self {
        Self::Space(space)
    }
}

impl<'a> From<&Arc<FunctionSpace>> for ProjectionTarget<'a> {
    fn from(space: &Arc<FunctionSpace>) -> Self {
        Self::Space(space.clone())
    }
}

impl<'a> From<&'a mut DiscreteField> for ProjectionTarget<'a> {
    fn from(field: &'a mut DiscreteField) -> Self {
        Self::Field(field)
    }
}

/// The result of a one-shot projection: a newly created field, or the caller's field.
#[derive(Debug)]
pub enum Projected<'a> {
    Created(DiscreteField),
    InPlace(&'a mut DiscreteField),
}

impl<'a> Projected<'a> {
    /// Returns the projected field, cloning it if it was projected in place.
    pub fn into_owned(self) -> DiscreteField {
        match self {
            Self::Created(field) => field,
            Self::InPlace(field) => field.clone(),
        }
    }
}

impl<'a> Deref for Projected<'a> {
    type Target = DiscreteField;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Created(field) => field,
            Self::InPlace(field) => field,
        }
    }
}

impl<'a> DerefMut for Projected<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Created(field) => field,
            Self::InPlace(field) => field,
        }
    }
}

/// Options for one-shot projections.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    method: String,
    bcs: Vec<DirichletBC>,
    solver_configuration: Option<SolverConfiguration>,
    form_compiler_parameters: Option<FormCompilerParameters>,
    mesh: Option<Arc<Mesh>>,
    name: Option<String>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            method: ProjectionMethod::default().to_string(),
            bcs: Vec::new(),
            solver_configuration: None,
            form_compiler_parameters: None,
            mesh: None,
            name: None,
        }
    }
}

impl ProjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The projection method, `"l2"` or `"average"`. Parsed when the projection runs.
    pub fn with_method(self, method: impl AsRef<str>) -> Self {
        Self {
            method: method.as_ref().to_string(),
            ..self
        }
    }

    /// Dirichlet conditions on the target space. Only used by L2 projections.
    pub fn with_bcs(self, bcs: impl IntoIterator<Item = DirichletBC>) -> Self {
        Self {
            bcs: bcs.into_iter().collect(),
            ..self
        }
    }

    /// Solver options, merged over the defaults (`cg` with a relative tolerance of `1e-8`).
    pub fn with_solver_configuration(self, configuration: SolverConfiguration) -> Self {
        Self {
            solver_configuration: Some(configuration),
            ..self
        }
    }

    /// Parameters forwarded to the linear solver's assembler.
    pub fn with_form_compiler_parameters(self, parameters: FormCompilerParameters) -> Self {
        Self {
            form_compiler_parameters: Some(parameters),
            ..self
        }
    }

    /// Accepted for interface compatibility. Projections always integrate over the mesh of the
    /// target space.
    pub fn with_mesh(self, mesh: Arc<Mesh>) -> Self {
        Self {
            mesh: Some(mesh),
            ..self
        }
    }

    /// Name given to the output field when projecting into a function space.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn bcs(&self) -> &[DirichletBC] {
        &self.bcs
    }

    pub fn solver_configuration(&self) -> Option<&SolverConfiguration> {
        self.solver_configuration.as_ref()
    }

    pub fn form_compiler_parameters(&self) -> Option<&FormCompilerParameters> {
        self.form_compiler_parameters.as_ref()
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The capabilities projections are built from.
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    linear_solver: Arc<dyn LinearSolver>,
    interpolator: Arc<dyn ExpressionInterpolator>,
    kernel_executor: Arc<dyn KernelExecutor>,
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self {
            linear_solver: Arc::new(KrylovSolver),
            interpolator: Arc::new(NodalInterpolator),
            kernel_executor: Arc::new(CellLoopExecutor),
        }
    }
}

impl ProjectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linear_solver(self, linear_solver: Arc<dyn LinearSolver>) -> Self {
        Self { linear_solver, ..self }
    }

    pub fn with_interpolator(self, interpolator: Arc<dyn ExpressionInterpolator>) -> Self {
        Self { interpolator, ..self }
    }

    pub fn with_kernel_executor(self, kernel_executor: Arc<dyn KernelExecutor>) -> Self {
        Self {
            kernel_executor,
            ..self
        }
    }

    pub fn linear_solver(&self) -> &Arc<dyn LinearSolver> {
        &self.linear_solver
    }

    pub fn interpolator(&self) -> &Arc<dyn ExpressionInterpolator> {
        &self.interpolator
    }

    pub fn kernel_executor(&self) -> &Arc<dyn KernelExecutor> {
        &self.kernel_executor
    }

    /// Projects `source` into `target`.
    ///
    /// A function space target yields a new field, a field target is overwritten in place.
    /// Analytic expressions are first interpolated into a discontinuous space one degree higher
    /// than the target. All kind, mesh and shape checks happen before the output is touched.
    pub fn project<'s, 't>(
        &self,
        source: impl Into<SourceRef<'s>>,
        target: impl Into<ProjectionTarget<'t>>,
        options: &ProjectOptions,
    ) -> Result<Projected<'t>, ProjectionError> {
        let method: ProjectionMethod = options.method.parse()?;
        let source = source.into();
        let target = target.into();
        let space = target.space().clone();
        debug!(
            "Projecting {} into {} of {} with method {}",
            source.kind(),
            target.kind_name(),
            space,
            method
        );

        let source = match source {
            SourceRef::Analytic(expression) => {
                let auxiliary = auxiliary_space(&space, expression.value_shape())?;
                let field = self.interpolator.interpolate_into(expression, auxiliary)?;
                ResolvedSource::Field(Cow::Owned(field))
            }
            SourceRef::Field(field) => ResolvedSource::Field(Cow::Borrowed(field)),
            SourceRef::Symbolic(expr) => match expr.as_coefficient() {
                Some(field) => ResolvedSource::Field(Cow::Borrowed(field)),
                None => ResolvedSource::Symbolic(expr),
            },
        };

        if let ResolvedSource::Field(field) = &source {
            check_same_mesh(field, &space)?;
        }
        check_value_shape(source.value_shape()?, &space)?;

        match method {
            ProjectionMethod::L2 => {
                let mut output = allocate_output(target, options.name());
                self.project_l2(source, &mut output, options)?;
                Ok(output)
            }
            ProjectionMethod::Average => {
                let field = match &source {
                    ResolvedSource::Field(field) => field.as_ref(),
                    ResolvedSource::Symbolic(_) => {
                        return Err(ProjectionError::InvalidSourceKind {
                            expected: "discrete fields",
                            found: SourceKind::Symbolic,
                        })
                    }
                };
                let kernel = AccumulationKernel::for_space(&space);
                check_extents(&kernel, AccumulationKernel::SOURCE, field.space())?;
                let mut output = allocate_output(target, options.name());
                let mut weights = DiscreteField::zeros(space.clone());
                average_into(self.kernel_executor.as_ref(), &kernel, field, &mut output, &mut weights)?;
                Ok(output)
            }
        }
    }

    fn project_l2(
        &self,
        source: ResolvedSource,
        output: &mut DiscreteField,
        options: &ProjectOptions,
    ) -> Result<(), ProjectionError> {
        let space = output.space().clone();
        if let ResolvedSource::Field(field) = &source {
            if options.bcs.is_empty() && field.space().is_same_space(&space) {
                debug!("Source already lives in the target space, copying values");
                output.values_mut().copy_from(field.values());
                return Ok(());
            }
        }

        let expr = match source {
            ResolvedSource::Field(field) => Expr::coefficient(field.into_owned()),
            ResolvedSource::Symbolic(expr) => expr.clone(),
        };
        let equation = l2_equation(&space, expr);
        let parameters = solver_parameters(options.solver_configuration());
        let report = self.linear_solver.solve(
            &equation,
            output,
            &options.bcs,
            &parameters,
            options.form_compiler_parameters(),
        )?;
        debug!(
            "L2 projection converged in {} iterations (residual norm {:e})",
            report.iterations, report.residual_norm
        );
        Ok(())
    }

    /// Creates a [`Projector`] that uses the capabilities of this engine.
    pub fn projector<'a>(
        &self,
        source: impl Into<Source>,
        target: impl Into<ProjectionTarget<'a>>,
        options: ProjectorOptions,
    ) -> Result<Projector<'a>, ProjectionError> {
        Projector::build(self, source.into(), target.into(), options)
    }
}

/// Projects `source` into `target` with the default engine.
///
/// See [`ProjectionEngine::project`].
pub fn project<'s, 't>(
    source: impl Into<SourceRef<'s>>,
    target: impl Into<ProjectionTarget<'t>>,
    options: &ProjectOptions,
) -> Result<Projected<'t>, ProjectionError> {
    ProjectionEngine::default().project(source, target, options)
}

/// A source after analytic expressions have been interpolated.
enum ResolvedSource<'a> {
    Field(Cow<'a, DiscreteField>),
    Symbolic(&'a Expr),
}

impl<'a> ResolvedSource<'a> {
    fn value_shape(&self) -> Result<ValueShape, FormError> {
        match self {
            Self::Field(field) => Ok(field.value_shape().clone()),
            Self::Symbolic(expr) => expr.value_shape(),
        }
    }
}

fn allocate_output<'t>(target: ProjectionTarget<'t>, name: Option<&str>) -> Projected<'t> {
    match target {
        ProjectionTarget::Space(space) => {
            let field = DiscreteField::zeros(space);
            Projected::Created(match name {
                Some(name) => field.with_name(name),
                None => field,
            })
        }
        ProjectionTarget::Field(field) => Projected::InPlace(field),
    }
}

/// A discontinuous space on the target's mesh, one degree higher than the target, with the
/// given value shape. Analytic sources are interpolated into it.
fn auxiliary_space(target: &FunctionSpace, value_shape: &ValueShape) -> Result<Arc<FunctionSpace>, DiscretizationError> {
    let degree = target.degree().max() + 1;
    let space = FunctionSpace::new(target.mesh().clone(), Family::Discontinuous, degree)?
        .with_value_shape(value_shape.clone())?;
    Ok(Arc::new(space))
}

/// The L2 projection system `inner(v, u) dx = inner(v, source) dx` over the space's mesh.
fn l2_equation(space: &Arc<FunctionSpace>, source: Expr) -> Equation {
    let test = TestFunction::new(space.clone());
    let trial = TrialFunction::new(space.clone());
    let measure = dx().with_domain(space.mesh());
    let a = inner(&test, &trial) * measure.clone();
    let l = inner(&test, source) * measure;
    a.equals(l)
}

fn solver_parameters(configuration: Option<&SolverConfiguration>) -> SolverParameters {
    let defaults = SolverParameters::default();
    match configuration {
        Some(configuration) => configuration.merged_over(&defaults),
        None => defaults,
    }
}

/// Overwrites `output` with the average of the cell-local values of `source`.
///
/// The local extents of `source` must already have been checked against the kernel, since
/// `output` is zeroed before the kernel runs. Degrees of freedom not covered by any cell end up
/// as NaN.
fn average_into(
    executor: &dyn KernelExecutor,
    kernel: &AccumulationKernel,
    source: &DiscreteField,
    output: &mut DiscreteField,
    weights: &mut DiscreteField,
) -> Result<(), ProjectionError> {
    output.fill(0.0);
    weights.fill(0.0);
    let measure = dx().with_domain(output.space().mesh());
    executor.run_kernel(
        kernel,
        &measure,
        &mut [
            (AccumulationKernel::OUTPUT, KernelArgument::Increment(output)),
            (AccumulationKernel::WEIGHT, KernelArgument::Increment(weights)),
            (AccumulationKernel::SOURCE, KernelArgument::Read(source)),
        ],
    )?;
    output.divide_pointwise(weights)?;
    Ok(())
}
