use super::validation::{check_same_mesh, check_value_shape};
use super::{
    average_into, l2_equation, solver_parameters, ProjectionEngine, ProjectionMethod, ProjectionTarget, Source,
    SourceKind, SourceRef,
};
use crate::error::ProjectionError;
use crate::field::DiscreteField;
use crate::form::Expr;
use crate::kernel::{check_extents, AccumulationKernel, KernelExecutor};
use crate::solve::{DirichletBC, FormCompilerParameters, LinearVariationalProblem, SolverConfiguration, VariationalSolver};
use log::debug;
use nalgebra::DVectorViewMut;
use std::sync::Arc;

/// Options for [`Projector`]s.
#[derive(Debug, Clone)]
pub struct ProjectorOptions {
    method: String,
    bcs: Vec<DirichletBC>,
    solver_configuration: Option<SolverConfiguration>,
    form_compiler_parameters: Option<FormCompilerParameters>,
    constant_operator: bool,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            method: ProjectionMethod::default().to_string(),
            bcs: Vec::new(),
            solver_configuration: None,
            form_compiler_parameters: None,
            constant_operator: true,
        }
    }
}

impl ProjectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(self, method: impl AsRef<str>) -> Self {
        Self {
            method: method.as_ref().to_string(),
            ..self
        }
    }

    pub fn with_bcs(self, bcs: impl IntoIterator<Item = DirichletBC>) -> Self {
        Self {
            bcs: bcs.into_iter().collect(),
            ..self
        }
    }

    pub fn with_solver_configuration(self, configuration: SolverConfiguration) -> Self {
        Self {
            solver_configuration: Some(configuration),
            ..self
        }
    }

    pub fn with_form_compiler_parameters(self, parameters: FormCompilerParameters) -> Self {
        Self {
            form_compiler_parameters: Some(parameters),
            ..self
        }
    }

    /// Whether the solver may reuse the assembled operator across calls. Defaults to `true`.
    pub fn with_constant_operator(self, constant_operator: bool) -> Self {
        Self {
            constant_operator,
            ..self
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn bcs(&self) -> &[DirichletBC] {
        &self.bcs
    }

    pub fn constant_operator(&self) -> bool {
        self.constant_operator
    }
}

#[derive(Debug)]
enum ProjectorState {
    /// The source lives in the target space and there are no constraints.
    FastPath { source: DiscreteField },
    ConstraintBuilt { solver: Box<dyn VariationalSolver> },
    Average {
        source: DiscreteField,
        weights: DiscreteField,
        kernel: AccumulationKernel,
    },
}

/// Repeatedly projects a source into a fixed output field.
///
/// Everything that does not depend on the values of the source is set up once at construction:
/// the forms and solver for L2 projections, the weights and kernel for averaging. The values of
/// source coefficients may be updated between calls to [`project`](Self::project).
#[derive(Debug)]
pub struct Projector<'a> {
    target: &'a mut DiscreteField,
    method: ProjectionMethod,
    state: ProjectorState,
    kernel_executor: Arc<dyn KernelExecutor>,
}

impl<'a> Projector<'a> {
    /// Creates a projector with the default [`ProjectionEngine`].
    pub fn new(
        source: impl Into<Source>,
        target: impl Into<ProjectionTarget<'a>>,
        options: ProjectorOptions,
    ) -> Result<Self, ProjectionError> {
        ProjectionEngine::default().projector(source, target, options)
    }

    pub(super) fn build(
        engine: &ProjectionEngine,
        source: Source,
        target: ProjectionTarget<'a>,
        options: ProjectorOptions,
    ) -> Result<Self, ProjectionError> {
        if let Source::Analytic(_) = source {
            return Err(ProjectionError::InvalidSourceKind {
                expected: "discrete fields or symbolic expressions",
                found: SourceKind::Analytic,
            });
        }
        let target = match target {
            ProjectionTarget::Field(field) => field,
            other @ ProjectionTarget::Space(_) => {
                return Err(ProjectionError::InvalidTargetKind {
                    expected: "existing fields",
                    found: other.kind_name(),
                })
            }
        };
        let method: ProjectionMethod = options.method.parse()?;

        let space = target.space().clone();
        let source_ref = SourceRef::from(&source);
        if let Some(field) = source_ref.as_field() {
            check_same_mesh(field, &space)?;
        }
        check_value_shape(source_ref.value_shape()?, &space)?;

        let state = match method {
            ProjectionMethod::L2 => {
                let same_space = source_ref
                    .as_field()
                    .map_or(false, |field| field.space().is_same_space(&space));
                match source.into_field() {
                    Ok(source) if same_space && options.bcs.is_empty() => {
                        debug!("Projector source already lives in the target space, using fast path");
                        ProjectorState::FastPath { source }
                    }
                    source => {
                        let expr = match source {
                            Ok(field) => Expr::coefficient(field),
                            Err(Source::Symbolic(expr)) => expr,
                            Err(other) => {
                                return Err(ProjectionError::InvalidSourceKind {
                                    expected: "discrete fields or symbolic expressions",
                                    found: other.kind(),
                                })
                            }
                        };
                        let mut problem = LinearVariationalProblem::new(l2_equation(&space, expr), options.bcs)
                            .with_constant_operator(options.constant_operator);
                        if let Some(parameters) = options.form_compiler_parameters {
                            problem = problem.with_form_compiler_parameters(parameters);
                        }
                        let parameters = solver_parameters(options.solver_configuration.as_ref());
                        debug!("Building L2 projection solver with {:?}", parameters);
                        let solver = engine.linear_solver().create_solver(problem, &parameters)?;
                        ProjectorState::ConstraintBuilt { solver }
                    }
                }
            }
            ProjectionMethod::Average => {
                let source = source
                    .into_field()
                    .map_err(|source| ProjectionError::InvalidSourceKind {
                        expected: "discrete fields",
                        found: source.kind(),
                    })?;
                let kernel = AccumulationKernel::for_space(&space);
                check_extents(&kernel, AccumulationKernel::SOURCE, source.space())?;
                ProjectorState::Average {
                    source,
                    weights: DiscreteField::zeros(space.clone()),
                    kernel,
                }
            }
        };

        Ok(Self {
            target,
            method,
            state,
            kernel_executor: engine.kernel_executor().clone(),
        })
    }

    /// Projects the current source values into the target.
    ///
    /// Averaging projections return the target, L2 projections return `None`.
    pub fn project(&mut self) -> Result<Option<&DiscreteField>, ProjectionError> {
        match &mut self.state {
            ProjectorState::FastPath { source } => {
                self.target.assign(source)?;
                Ok(None)
            }
            ProjectorState::ConstraintBuilt { solver } => {
                let report = solver.solve(self.target)?;
                debug!(
                    "Projector solve finished after {} iterations (residual norm {:e})",
                    report.iterations, report.residual_norm
                );
                Ok(None)
            }
            ProjectorState::Average {
                source,
                weights,
                kernel,
            } => {
                average_into(self.kernel_executor.as_ref(), kernel, source, self.target, weights)?;
                Ok(Some(&*self.target))
            }
        }
    }

    pub fn target(&self) -> &DiscreteField {
        &*self.target
    }

    pub fn method(&self) -> ProjectionMethod {
        self.method
    }

    /// The source as it is used by the projector.
    pub fn source(&self) -> SourceRef<'_> {
        match &self.state {
            ProjectorState::FastPath { source } | ProjectorState::Average { source, .. } => SourceRef::Field(source),
            ProjectorState::ConstraintBuilt { solver } => {
                let expr = solver.problem().equation().rhs().source();
                match expr.as_coefficient() {
                    Some(field) => SourceRef::Field(field),
                    None => SourceRef::Symbolic(expr),
                }
            }
        }
    }

    /// Whether projecting copies values instead of solving.
    pub fn is_fast_path(&self) -> bool {
        matches!(self.state, ProjectorState::FastPath { .. })
    }

    pub fn solver(&self) -> Option<&dyn VariationalSolver> {
        match &self.state {
            ProjectorState::ConstraintBuilt { solver } => Some(&**solver),
            _ => None,
        }
    }

    pub fn has_solver(&self) -> bool {
        self.solver().is_some()
    }

    /// Mutable values of the source, if the source is a single field.
    pub fn source_values_mut(&mut self) -> Option<DVectorViewMut<'_, f64>> {
        match &mut self.state {
            ProjectorState::FastPath { source } | ProjectorState::Average { source, .. } => Some(source.values_mut()),
            ProjectorState::ConstraintBuilt { solver } => solver
                .problem_mut()
                .equation_mut()
                .rhs_mut()
                .source_mut()
                .coefficient_values_mut(),
        }
    }

    /// Mutable values of the source coefficient with the given name.
    pub fn coefficient_values_mut(&mut self, name: &str) -> Option<DVectorViewMut<'_, f64>> {
        match &mut self.state {
            ProjectorState::FastPath { source } | ProjectorState::Average { source, .. } => {
                if source.name() == Some(name) {
                    Some(source.values_mut())
                } else {
                    None
                }
            }
            ProjectorState::ConstraintBuilt { solver } => solver
                .problem_mut()
                .equation_mut()
                .rhs_mut()
                .source_mut()
                .named_coefficient_values_mut(name),
        }
    }
}
