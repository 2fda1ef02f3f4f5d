use crate::{field_from_node_fn, scalar_space};
use fenris_projection::expression::AnalyticExpression;
use fenris_projection::field::DiscreteField;
use fenris_projection::form::Expr;
use fenris_projection::kernel::KernelError;
use fenris_projection::mesh::procedural::{
    create_unit_interval_mesh, create_unit_square_quad_mesh, create_unit_square_tri_mesh,
};
use fenris_projection::solve::{
    DirichletBC, FormCompilerParameters, KrylovMethod, PreconditionerKind, SolverConfiguration,
};
use fenris_projection::space::{Family, FunctionSpace, ValueShape};
use fenris_projection::{project, ProjectOptions, Projected, ProjectionEngine, ProjectionError, SourceKind};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;
use std::sync::Arc;

fn tight_options() -> ProjectOptions {
    ProjectOptions::new().with_solver_configuration(SolverConfiguration::new().with_relative_tolerance(1e-12))
}

#[test]
fn field_in_target_space_is_copied_exactly() {
    let mesh = Arc::new(create_unit_square_tri_mesh(3));
    let space = scalar_space(&mesh, Family::Continuous, 2);
    let source = field_from_node_fn(&space, |x| (3.0 * x[0]).sin() + x[1]);

    let projected = project(&source, &space, &ProjectOptions::new()).unwrap();
    assert!(matches!(projected, Projected::Created(_)));
    assert_eq!(projected.values(), source.values());

    let mut target = DiscreteField::zeros(space.clone());
    let projected = project(&source, &mut target, &ProjectOptions::new()).unwrap();
    assert!(matches!(projected, Projected::InPlace(_)));
    assert_eq!(target.values(), source.values());
}

#[test]
fn linear_analytic_function_is_reproduced() {
    let mesh = Arc::new(create_unit_square_tri_mesh(4));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let f = |x: &[f64]| 1.0 + 2.0 * x[0] - x[1];

    let projected = project(&AnalyticExpression::scalar(f), &space, &tight_options())
        .unwrap()
        .into_owned();
    let expected = field_from_node_fn(&space, f);
    assert!(projected.space().is_same_space(&space));
    assert_matrix_eq!(projected.values().clone(), expected.values().clone(), comp = abs, tol = 1e-8);
}

#[test]
fn vector_analytic_function_is_reproduced() {
    let mesh = Arc::new(create_unit_square_quad_mesh(3));
    let space = Arc::new(FunctionSpace::vector(mesh, Family::Continuous, 2, 2).unwrap());
    let expression = AnalyticExpression::vector(2, |x, u| {
        u[0] = x[0] * x[1];
        u[1] = x[0] * x[0] - 2.0 * x[1];
    });

    let projected = project(&expression, &space, &tight_options()).unwrap();
    let expected = DiscreteField::interpolated(space.clone(), &expression).unwrap();
    assert_matrix_eq!(projected.values().clone(), expected.values().clone(), comp = abs, tol = 1e-8);
}

#[test]
fn l2_projection_is_orthogonal_to_the_space() {
    // Projecting a quadratic into P1 and then projecting the result again changes nothing
    let mesh = Arc::new(create_unit_interval_mesh(5));
    let p1 = scalar_space(&mesh, Family::Continuous, 1);
    let p2 = scalar_space(&mesh, Family::Continuous, 2);
    let quadratic = field_from_node_fn(&p2, |x| x[0] * x[0]);

    let once = project(&quadratic, &p1, &tight_options()).unwrap().into_owned();
    let interpolant = field_from_node_fn(&p1, |x| x[0] * x[0]);
    assert!((once.values() - interpolant.values()).amax() > 1e-3);

    let symbolic = Expr::coefficient(once.clone());
    let twice = project(&symbolic, &p1, &tight_options()).unwrap();
    assert_matrix_eq!(twice.values().clone(), once.values().clone(), comp = abs, tol = 1e-12);
}

#[test]
fn symbolic_sources_are_projected() {
    let mesh = Arc::new(create_unit_square_tri_mesh(3));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let f = field_from_node_fn(&space, |x| x[0] - x[1]);
    let expr = 2.0 * Expr::coefficient(f.clone()) + Expr::scalar(1.0);

    let projected = project(&expr, &space, &tight_options()).unwrap();
    let expected = f.values() * 2.0 + DVector::repeat(space.num_dofs(), 1.0);
    assert_matrix_eq!(projected.values().clone(), expected, comp = abs, tol = 1e-8);
}

#[test]
fn boundary_conditions_are_applied() {
    let mesh = Arc::new(create_unit_square_tri_mesh(4));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let options = tight_options().with_bcs([DirichletBC::constant(space.clone(), [0.0])]);

    let projected = project(&AnalyticExpression::scalar(|_| 1.0), &space, &options).unwrap();
    let boundary = space.boundary_nodes();
    for node in 0..space.num_nodes() {
        if boundary.contains(&node) {
            assert_eq!(projected.values()[node], 0.0);
        } else {
            assert!(projected.values()[node] > 0.5);
        }
    }
}

#[test]
fn direct_solver_configuration_is_honored() {
    let mesh = Arc::new(create_unit_square_quad_mesh(3));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let source = AnalyticExpression::scalar(|x| (x[0] * x[1]).exp());
    let direct = ProjectOptions::new()
        .with_solver_configuration(
            SolverConfiguration::new()
                .with_krylov_method(KrylovMethod::Preonly)
                .with_preconditioner(PreconditionerKind::Cholesky),
        )
        .with_form_compiler_parameters(FormCompilerParameters::with_quadrature_degree(8));

    let iterative = project(&source, &space, &tight_options()).unwrap();
    let direct = project(&source, &space, &direct).unwrap();
    assert_matrix_eq!(direct.values().clone(), iterative.values().clone(), comp = abs, tol = 1e-8);
}

#[test]
fn invalid_solver_configuration_is_reported() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let options =
        ProjectOptions::new().with_solver_configuration(SolverConfiguration::new().with_krylov_method(KrylovMethod::Preonly));
    let result = project(&AnalyticExpression::scalar(|x| x[0]), &space, &options);
    assert!(matches!(result, Err(ProjectionError::Solver(_))));
}

#[test]
fn output_is_named_when_requested() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let options = tight_options().with_name("u_h");
    let projected = project(&AnalyticExpression::scalar(|x| x[1]), &space, &options).unwrap();
    assert_eq!(projected.name(), Some("u_h"));
}

#[test]
fn shape_mismatch_leaves_target_untouched() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let vector_space = Arc::new(FunctionSpace::vector(mesh, Family::Continuous, 1, 2).unwrap());
    let source = DiscreteField::zeros(vector_space);
    let mut target = DiscreteField::zeros(space.clone());
    target.fill(7.0);

    let result = project(&source, &mut target, &ProjectOptions::new());
    match result {
        Err(ProjectionError::ShapeMismatch {
            source_shape,
            target_shape,
        }) => {
            assert_eq!(source_shape, ValueShape::vector(2));
            assert_eq!(target_shape, ValueShape::scalar());
        }
        other => panic!("expected shape mismatch, got {:?}", other.map(|_| ())),
    }
    assert!(target.values().iter().all(|&v| v == 7.0));

    let expression = AnalyticExpression::vector(2, |x, u| u.copy_from_slice(x));
    let result = project(&expression, &space, &ProjectOptions::new());
    assert!(matches!(result, Err(ProjectionError::ShapeMismatch { .. })));
}

#[test]
fn fields_on_other_meshes_are_rejected() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let copy = Arc::new(create_unit_square_tri_mesh(2));
    let source = DiscreteField::zeros(scalar_space(&copy, Family::Continuous, 1));
    let space = scalar_space(&mesh, Family::Continuous, 1);

    for method in ["l2", "average"] {
        let result = project(&source, &space, &ProjectOptions::new().with_method(method));
        assert!(matches!(result, Err(ProjectionError::MeshMismatch)));
    }

    let symbolic = Expr::coefficient(source);
    let result = project(&symbolic, &space, &ProjectOptions::new());
    assert!(matches!(result, Err(ProjectionError::MeshMismatch)));
}

#[test]
fn unknown_methods_are_rejected() {
    let mesh = Arc::new(create_unit_square_tri_mesh(1));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let source = DiscreteField::zeros(space.clone());
    for method in ["h1", "L2 ", "Average"] {
        let result = project(&source, &space, &ProjectOptions::new().with_method(method));
        assert!(matches!(result, Err(ProjectionError::UnknownMethod(name)) if name == method));
    }
}

#[test]
fn average_with_single_coverage_is_identity() {
    let mesh = Arc::new(create_unit_square_tri_mesh(3));
    let dg = scalar_space(&mesh, Family::Discontinuous, 1);
    let source = field_from_node_fn(&dg, |x| x[0] * x[0] - x[1]);

    let averaged = project(&source, &dg, &ProjectOptions::new().with_method("average")).unwrap();
    assert_matrix_eq!(averaged.values().clone(), source.values().clone(), comp = abs, tol = 1e-14);
}

#[test]
fn average_of_shared_nodes_is_mean_of_cell_values() {
    let mesh = Arc::new(create_unit_interval_mesh(2));
    let dg = scalar_space(&mesh, Family::Discontinuous, 1);
    let cg = scalar_space(&mesh, Family::Continuous, 1);

    // Cell values 1, 2 on the left cell and 3, 4 on the right cell
    let coords = dg.node_coordinates();
    let mut source = DiscreteField::zeros(dg.clone());
    for cell in 0..mesh.num_cells() {
        for &node in dg.cell_nodes(cell) {
            source.values_mut()[node] = 1.0 + 2.0 * coords[(0, node)] + cell as f64;
        }
    }

    let mut target = DiscreteField::zeros(cg.clone());
    project(&source, &mut target, &ProjectOptions::new().with_method("average")).unwrap();
    let coords = cg.node_coordinates();
    for node in 0..cg.num_nodes() {
        let expected = match coords[(0, node)] {
            x if x < 0.25 => 1.0,
            x if x < 0.75 => 2.5,
            _ => 4.0,
        };
        assert_scalar_eq!(target.values()[node], expected, comp = abs, tol = 1e-14);
    }
}

#[test]
fn average_requires_discrete_fields() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let f = field_from_node_fn(&space, |x| x[0]);
    let options = ProjectOptions::new().with_method("average");

    let symbolic = Expr::coefficient(f.clone()) * Expr::scalar(2.0);
    let result = project(&symbolic, &space, &options);
    assert!(matches!(
        result,
        Err(ProjectionError::InvalidSourceKind {
            expected: "discrete fields",
            found: SourceKind::Symbolic,
        })
    ));

    // A lone coefficient is just a field
    let coefficient = Expr::coefficient(f.clone());
    let averaged = project(&coefficient, &space, &options).unwrap();
    assert_matrix_eq!(averaged.values().clone(), f.values().clone(), comp = abs, tol = 1e-14);

    // Analytic sources live in a richer auxiliary space than the kernel expects
    let result = project(&AnalyticExpression::scalar(|x| x[0]), &space, &options);
    assert!(matches!(
        result,
        Err(ProjectionError::Kernel(KernelError::ExtentMismatch { .. }))
    ));
}

#[test]
fn failed_average_leaves_target_untouched() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let mut target = DiscreteField::zeros(space);
    target.fill(7.0);

    let result = project(
        &AnalyticExpression::scalar(|x| x[0]),
        &mut target,
        &ProjectOptions::new().with_method("average"),
    );
    assert!(matches!(
        result,
        Err(ProjectionError::Kernel(KernelError::ExtentMismatch { .. }))
    ));
    assert!(target.values().iter().all(|&v| v == 7.0));
}

#[test]
fn engine_reports_its_capabilities() {
    let engine = ProjectionEngine::new();
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Discontinuous, 0);
    let expression = AnalyticExpression::scalar(|x| x[0] + x[1]);
    let projected = engine.project(&expression, &space, &tight_options()).unwrap();

    // Degree zero L2 projection gives cell averages, and linear functions average to their
    // value at the centroid
    let coords = space.node_coordinates();
    for node in 0..space.num_nodes() {
        assert_scalar_eq!(
            projected.values()[node],
            coords[(0, node)] + coords[(1, node)],
            comp = abs,
            tol = 1e-8
        );
    }
}
