use crate::{field_from_node_fn, scalar_space};
use fenris_projection::field::DiscreteField;
use fenris_projection::form::{dx, inner, Equation, Expr, TestFunction, TrialFunction};
use fenris_projection::mesh::procedural::create_unit_square_tri_mesh;
use fenris_projection::solve::{
    DirichletBC, KrylovMethod, KrylovSolver, LinearSolver, LinearVariationalProblem, PreconditionerKind, SolverError,
    SolverParameters,
};
use fenris_projection::space::{Family, FunctionSpace};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use std::sync::Arc;

fn l2_equation(space: &Arc<FunctionSpace>, source: Expr) -> Equation {
    let v = TestFunction::new(space.clone());
    let u = TrialFunction::new(space.clone());
    (inner(&v, &u) * dx()).equals(inner(&v, source) * dx())
}

fn tight_parameters() -> SolverParameters {
    SolverParameters {
        relative_tolerance: 1e-12,
        ..SolverParameters::default()
    }
}

#[test]
fn mass_system_reproduces_functions_in_the_space() {
    let mesh = Arc::new(create_unit_square_tri_mesh(4));
    let space = scalar_space(&mesh, Family::Continuous, 2);
    let f = field_from_node_fn(&space, |x| x[0] * x[1] - x[1] * x[1] + 1.0);
    let equation = l2_equation(&space, Expr::coefficient(f.clone()));

    let mut solution = DiscreteField::zeros(space.clone());
    let report = KrylovSolver
        .solve(&equation, &mut solution, &[], &tight_parameters(), None)
        .unwrap();
    assert!(report.iterations > 0);
    assert_matrix_eq!(solution.values().clone(), f.values().clone(), comp = abs, tol = 1e-9);
}

#[test]
fn direct_and_iterative_solves_agree() {
    let mesh = Arc::new(create_unit_square_tri_mesh(3));
    let p2 = scalar_space(&mesh, Family::Continuous, 2);
    let p1 = scalar_space(&mesh, Family::Continuous, 1);
    let source = field_from_node_fn(&p2, |x| x[0] * x[0] + 3.0 * x[1]);
    let equation = l2_equation(&p1, Expr::coefficient(source));

    let mut iterative = DiscreteField::zeros(p1.clone());
    KrylovSolver
        .solve(&equation, &mut iterative, &[], &tight_parameters(), None)
        .unwrap();

    let direct_parameters = SolverParameters {
        krylov_method: KrylovMethod::Preonly,
        preconditioner: PreconditionerKind::Cholesky,
        ..SolverParameters::default()
    };
    let mut direct = DiscreteField::zeros(p1.clone());
    let report = KrylovSolver
        .solve(&equation, &mut direct, &[], &direct_parameters, None)
        .unwrap();
    assert_eq!(report.iterations, 1);
    assert!(report.residual_norm < 1e-12);
    assert_matrix_eq!(direct.values().clone(), iterative.values().clone(), comp = abs, tol = 1e-9);
}

#[test]
fn boundary_conditions_are_imposed_exactly() {
    let mesh = Arc::new(create_unit_square_tri_mesh(4));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let equation = l2_equation(&space, Expr::scalar(1.0));
    let bcs = [
        DirichletBC::constant(space.clone(), [2.0]),
        DirichletBC::from_fn(space.clone(), |x, u| u[0] = -x[1]).on_region(|x| x[0] < 1e-12),
    ];

    let mut solution = DiscreteField::zeros(space.clone());
    KrylovSolver
        .solve(&equation, &mut solution, &bcs, &tight_parameters(), None)
        .unwrap();

    let coords = space.node_coordinates();
    for node in space.boundary_nodes() {
        let x = coords.column(node);
        // The second condition overrides the first on the left edge
        let expected = if x[0] < 1e-12 { -x[1] } else { 2.0 };
        assert_scalar_eq!(solution.values()[node], expected, comp = abs, tol = 1e-14);
    }
}

#[test]
fn boundary_conditions_must_match_the_space() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let other = scalar_space(&mesh, Family::Continuous, 2);
    let equation = l2_equation(&space, Expr::scalar(1.0));
    let mut solution = DiscreteField::zeros(space.clone());

    let result = KrylovSolver.solve(
        &equation,
        &mut solution,
        &[DirichletBC::constant(other.clone(), [0.0])],
        &SolverParameters::default(),
        None,
    );
    assert!(matches!(result, Err(SolverError::BoundaryConditionSpace)));

    let result = KrylovSolver.solve(
        &equation,
        &mut solution,
        &[DirichletBC::constant(space.clone(), [0.0, 1.0])],
        &SolverParameters::default(),
        None,
    );
    assert!(matches!(
        result,
        Err(SolverError::BoundaryValueShape { expected: 1, actual: 2 })
    ));

    let problem = LinearVariationalProblem::new(equation.clone(), vec![DirichletBC::constant(other.clone(), [0.0])]);
    let result = KrylovSolver.create_solver(problem, &SolverParameters::default());
    assert!(matches!(result, Err(SolverError::BoundaryConditionSpace)));

    let mut wrong_output = DiscreteField::zeros(other);
    let result = KrylovSolver.solve(&equation, &mut wrong_output, &[], &SolverParameters::default(), None);
    assert!(matches!(result, Err(SolverError::OutputSpaceMismatch)));
}

#[test]
fn iteration_limit_is_reported() {
    let mesh = Arc::new(create_unit_square_tri_mesh(4));
    let p2 = scalar_space(&mesh, Family::Continuous, 2);
    let p1 = scalar_space(&mesh, Family::Continuous, 1);
    let source = field_from_node_fn(&p2, |x| x[0] * x[0] + x[1]);
    let equation = l2_equation(&p1, Expr::coefficient(source));
    let parameters = SolverParameters {
        max_iterations: 1,
        preconditioner: PreconditionerKind::None,
        ..tight_parameters()
    };

    let mut solution = DiscreteField::zeros(p1);
    let result = KrylovSolver.solve(&equation, &mut solution, &[], &parameters, None);
    assert!(matches!(result, Err(SolverError::Convergence { iterations: 1, .. })));
}

#[test]
fn reusable_solver_sees_updated_coefficients() {
    let mesh = Arc::new(create_unit_square_tri_mesh(3));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let f = field_from_node_fn(&space, |x| x[0]);
    let problem = LinearVariationalProblem::new(l2_equation(&space, Expr::coefficient(f)), Vec::new())
        .with_constant_operator(true);
    assert!(problem.constant_operator());

    let mut solver = KrylovSolver
        .create_solver(problem, &tight_parameters())
        .unwrap();
    assert!(!solver.has_cached_operator());
    let mut solution = DiscreteField::zeros(space.clone());
    solver.solve(&mut solution).unwrap();
    assert!(solver.has_cached_operator());
    let first = solution.values().clone();

    let mut values = solver
        .problem_mut()
        .equation_mut()
        .rhs_mut()
        .source_mut()
        .coefficient_values_mut()
        .unwrap();
    values *= 3.0;
    solver.solve(&mut solution).unwrap();
    assert_matrix_eq!(solution.values().clone(), 3.0 * first, comp = abs, tol = 1e-9);
}
