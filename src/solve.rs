//! Linear variational problems and the solvers for them.
//!
//! A [`LinearSolver`] solves an [`Equation`] once, or turns a [`LinearVariationalProblem`] into a
//! reusable [`VariationalSolver`]. [`KrylovSolver`] is the default implementation: it assembles
//! the mass matrix and load vector, applies Dirichlet conditions by symmetric elimination and
//! solves with preconditioned conjugate gradients or a direct Cholesky factorization.
use crate::assembly::{assemble_load_vector, assemble_mass_matrix, load_quadrature_strength, mass_quadrature_strength};
use crate::field::DiscreteField;
use crate::form::{Equation, FormError};
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt::Debug;
use thiserror::Error;

mod bc;
pub mod config;
pub mod krylov;

pub use bc::{BoundaryRegion, BoundaryValue, DirichletBC};
pub use config::{FormCompilerParameters, KrylovMethod, PreconditionerKind, SolverConfiguration, SolverParameters};

use bc::{collect_constraints, constrain_operator, lift_boundary_values};
use krylov::{CgWorkspace, ConjugateGradient, LinearOperator, Preconditioner, ResidualCriterion};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Form(#[from] FormError),
    /// Assembly of the operator or right-hand side failed.
    #[error("assembly failed")]
    Assembly(#[source] Box<dyn Error + Send + Sync>),
    /// The solution field does not belong to the space of the problem.
    #[error("solution field does not belong to the function space of the problem")]
    OutputSpaceMismatch,
    /// A boundary condition is defined on a different space than the problem.
    #[error("boundary condition is not defined on the function space of the problem")]
    BoundaryConditionSpace,
    /// A constant boundary value with the wrong number of components.
    #[error("boundary value has {actual} components, but the space has {expected}")]
    BoundaryValueShape { expected: usize, actual: usize },
    /// An option name or value that is not recognized.
    #[error("invalid solver option `{key}` = `{value}`")]
    InvalidOption { key: String, value: String },
    /// A combination of options that cannot be used together.
    #[error("unsupported solver configuration: {0}")]
    UnsupportedConfiguration(String),
    /// The iterative solver did not reach the tolerance within the iteration limit.
    #[error("solver failed to converge after {iterations} iterations (residual norm {residual_norm:e})")]
    Convergence { iterations: usize, residual_norm: f64 },
    #[error("operator appears to be indefinite")]
    IndefiniteOperator,
    #[error("preconditioner appears to be indefinite")]
    IndefinitePreconditioner,
    #[error("factorization failed: {0}")]
    Factorization(String),
}

impl SolverError {
    fn assembly(report: eyre::Report) -> Self {
        Self::Assembly(report.into())
    }
}

/// Summary of a completed linear solve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual_norm: f64,
}

/// An equation together with its boundary conditions and assembly options.
#[derive(Debug, Clone)]
pub struct LinearVariationalProblem {
    equation: Equation,
    bcs: Vec<DirichletBC>,
    form_compiler_parameters: Option<FormCompilerParameters>,
    constant_operator: bool,
}

impl LinearVariationalProblem {
    pub fn new(equation: Equation, bcs: Vec<DirichletBC>) -> Self {
        Self {
            equation,
            bcs,
            form_compiler_parameters: None,
            constant_operator: false,
        }
    }

    pub fn with_form_compiler_parameters(self, parameters: FormCompilerParameters) -> Self {
        Self {
            form_compiler_parameters: Some(parameters),
            ..self
        }
    }

    /// Declares that the bilinear form does not change between solves, so that the assembled
    /// operator and its preconditioner may be reused.
    pub fn with_constant_operator(self, constant_operator: bool) -> Self {
        Self {
            constant_operator,
            ..self
        }
    }

    pub fn equation(&self) -> &Equation {
        &self.equation
    }

    pub fn equation_mut(&mut self) -> &mut Equation {
        &mut self.equation
    }

    pub fn bcs(&self) -> &[DirichletBC] {
        &self.bcs
    }

    pub fn form_compiler_parameters(&self) -> Option<&FormCompilerParameters> {
        self.form_compiler_parameters.as_ref()
    }

    pub fn constant_operator(&self) -> bool {
        self.constant_operator
    }
}

pub trait LinearSolver: Send + Sync + Debug {
    /// Solves the equation once, writing the result into `solution`.
    fn solve(
        &self,
        equation: &Equation,
        solution: &mut DiscreteField,
        bcs: &[DirichletBC],
        parameters: &SolverParameters,
        form_compiler_parameters: Option<&FormCompilerParameters>,
    ) -> Result<SolveReport, SolverError>;

    /// Creates a solver that can solve the problem repeatedly.
    fn create_solver(
        &self,
        problem: LinearVariationalProblem,
        parameters: &SolverParameters,
    ) -> Result<Box<dyn VariationalSolver>, SolverError>;
}

/// A solver bound to a problem.
pub trait VariationalSolver: Send + Debug {
    fn problem(&self) -> &LinearVariationalProblem;

    /// Mutable access to the problem, for updating coefficients of the right-hand side between
    /// solves. Changing the bilinear form of a problem with a constant operator has no effect.
    fn problem_mut(&mut self) -> &mut LinearVariationalProblem;

    fn solve(&mut self, solution: &mut DiscreteField) -> Result<SolveReport, SolverError>;

    /// Whether an assembled operator is currently held for reuse by the next solve.
    fn has_cached_operator(&self) -> bool;
}

/// Assembled and constrained operator with its preconditioner.
#[derive(Debug)]
struct AssembledOperator {
    operator: CsrMatrix<f64>,
    // The unconstrained operator, kept only when there are constraints to lift
    lifting: Option<CsrMatrix<f64>>,
    constraints: Vec<Option<f64>>,
    preconditioner: Preconditioner,
}

impl AssembledOperator {
    fn assemble(
        equation: &Equation,
        bcs: &[DirichletBC],
        parameters: &SolverParameters,
        form_compiler_parameters: Option<&FormCompilerParameters>,
    ) -> Result<Self, SolverError> {
        let space = equation.space();
        let strength = form_compiler_parameters
            .and_then(|p| p.quadrature_degree)
            .unwrap_or_else(|| mass_quadrature_strength(space));
        let mut operator = assemble_mass_matrix(space, strength).map_err(SolverError::assembly)?;

        let constraints = collect_constraints(space, bcs)?;
        let lifting = if constraints.iter().any(Option::is_some) {
            let unconstrained = operator.clone();
            constrain_operator(&mut operator, &constraints);
            Some(unconstrained)
        } else {
            None
        };

        let preconditioner = Preconditioner::build(parameters.preconditioner, &operator)?;
        debug!(
            "Assembled {}x{} operator with {} nonzeros and {:?} preconditioner",
            operator.nrows(),
            operator.ncols(),
            operator.nnz(),
            preconditioner
        );

        Ok(Self {
            operator,
            lifting,
            constraints,
            preconditioner,
        })
    }

    fn solve(
        &self,
        equation: &Equation,
        solution: &mut DiscreteField,
        parameters: &SolverParameters,
        form_compiler_parameters: Option<&FormCompilerParameters>,
        workspace: &mut CgWorkspace,
    ) -> Result<SolveReport, SolverError> {
        let space = equation.space();
        let source = equation.rhs().source();
        let strength = form_compiler_parameters
            .and_then(|p| p.quadrature_degree)
            .unwrap_or_else(|| load_quadrature_strength(space, source));
        let mut rhs = assemble_load_vector(space, source, strength).map_err(SolverError::assembly)?;
        if let Some(unconstrained) = &self.lifting {
            lift_boundary_values(unconstrained, &mut rhs, &self.constraints);
        }

        let mut x = DVector::from_iterator(
            rhs.len(),
            self.constraints.iter().map(|value| value.unwrap_or(0.0)),
        );

        let report = match parameters.krylov_method {
            KrylovMethod::Cg => {
                let criterion = ResidualCriterion {
                    relative_tolerance: parameters.relative_tolerance,
                    absolute_tolerance: parameters.absolute_tolerance,
                };
                let output =
                    ConjugateGradient::new(workspace, &self.operator, &self.preconditioner, criterion)
                        .with_max_iter(parameters.max_iterations)
                        .solve_with_guess(&rhs, &mut x)?;
                SolveReport {
                    iterations: output.num_iterations,
                    residual_norm: output.residual_norm,
                }
            }
            KrylovMethod::Preonly => {
                x = self.preconditioner.solve_direct(&rhs).ok_or_else(|| {
                    SolverError::UnsupportedConfiguration("ksp_type `preonly` requires a direct preconditioner".into())
                })?;
                let mut residual = DVector::zeros(rhs.len());
                self.operator.apply(&mut residual, &x);
                residual -= &rhs;
                SolveReport {
                    iterations: 1,
                    residual_norm: residual.norm(),
                }
            }
        };

        debug!(
            "Linear solve finished after {} iterations with residual norm {:e}",
            report.iterations, report.residual_norm
        );
        solution.values_mut().copy_from(&x);
        Ok(report)
    }
}

fn check_solution_space(equation: &Equation, solution: &DiscreteField) -> Result<(), SolverError> {
    if solution.space().is_same_space(equation.space()) {
        Ok(())
    } else {
        Err(SolverError::OutputSpaceMismatch)
    }
}

/// Assembles the projection system and solves it with CG or a Cholesky factorization.
#[derive(Debug, Default, Copy, Clone)]
pub struct KrylovSolver;

impl LinearSolver for KrylovSolver {
    fn solve(
        &self,
        equation: &Equation,
        solution: &mut DiscreteField,
        bcs: &[DirichletBC],
        parameters: &SolverParameters,
        form_compiler_parameters: Option<&FormCompilerParameters>,
    ) -> Result<SolveReport, SolverError> {
        equation.validate()?;
        parameters.validate()?;
        check_solution_space(equation, solution)?;

        let operator = AssembledOperator::assemble(equation, bcs, parameters, form_compiler_parameters)?;
        operator.solve(
            equation,
            solution,
            parameters,
            form_compiler_parameters,
            &mut CgWorkspace::default(),
        )
    }

    fn create_solver(
        &self,
        problem: LinearVariationalProblem,
        parameters: &SolverParameters,
    ) -> Result<Box<dyn VariationalSolver>, SolverError> {
        problem.equation().validate()?;
        parameters.validate()?;
        for bc in problem.bcs() {
            if !bc.space().is_same_space(problem.equation().space()) {
                return Err(SolverError::BoundaryConditionSpace);
            }
        }

        Ok(Box::new(KrylovVariationalSolver {
            problem,
            parameters: parameters.clone(),
            cached_operator: None,
            workspace: CgWorkspace::default(),
        }))
    }
}

/// A [`VariationalSolver`] that caches the assembled operator when the problem declares it
/// constant.
#[derive(Debug)]
pub struct KrylovVariationalSolver {
    problem: LinearVariationalProblem,
    parameters: SolverParameters,
    cached_operator: Option<AssembledOperator>,
    workspace: CgWorkspace,
}

impl VariationalSolver for KrylovVariationalSolver {
    fn problem(&self) -> &LinearVariationalProblem {
        &self.problem
    }

    fn problem_mut(&mut self) -> &mut LinearVariationalProblem {
        &mut self.problem
    }

    fn solve(&mut self, solution: &mut DiscreteField) -> Result<SolveReport, SolverError> {
        let Self {
            problem,
            parameters,
            cached_operator,
            workspace,
        } = self;
        problem.equation().validate()?;
        check_solution_space(problem.equation(), solution)?;
        let fcp = problem.form_compiler_parameters();

        if let Some(operator) = cached_operator.as_ref() {
            return operator.solve(problem.equation(), solution, parameters, fcp, workspace);
        }

        let operator = AssembledOperator::assemble(problem.equation(), problem.bcs(), parameters, fcp)?;
        let report = operator.solve(problem.equation(), solution, parameters, fcp, workspace)?;
        if problem.constant_operator() {
            *cached_operator = Some(operator);
        }
        Ok(report)
    }

    fn has_cached_operator(&self) -> bool {
        self.cached_operator.is_some()
    }
}
