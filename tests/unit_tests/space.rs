use crate::{field_from_node_fn, scalar_space};
use fenris_projection::error::DiscretizationError;
use fenris_projection::field::DiscreteField;
use fenris_projection::mesh::procedural::{
    create_unit_interval_mesh, create_unit_square_quad_mesh, create_unit_square_tri_mesh,
};
use fenris_projection::space::{Degree, Family, FunctionSpace, ValueShape};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;
use std::sync::Arc;

#[test]
fn names_display_as_they_parse() {
    for family in [Family::Continuous, Family::Discontinuous] {
        assert_eq!(family.to_string().parse::<Family>().unwrap(), family);
    }
    assert!(matches!(
        "N1curl".parse::<Family>(),
        Err(DiscretizationError::UnknownFamily(name)) if name == "N1curl"
    ));
    assert_eq!(Degree::from((2, 1)).to_string(), "(2, 1)");
    assert_eq!(Degree::from([1, 2]).incremented(), Degree::PerDirection(vec![2, 3]));

    let mesh = Arc::new(create_unit_square_tri_mesh(1));
    let space = FunctionSpace::vector(mesh, Family::Continuous, 2, 2).unwrap();
    assert_eq!(space.to_string(), "CG2 on Triangle mesh with value shape (2,)");
}

#[test]
fn unsupported_degrees_are_rejected() {
    let triangles = Arc::new(create_unit_square_tri_mesh(1));
    assert!(matches!(
        FunctionSpace::new(triangles.clone(), Family::Continuous, [1, 2]),
        Err(DiscretizationError::UnsupportedDegree { .. })
    ));
    assert!(matches!(
        FunctionSpace::new(triangles.clone(), Family::Continuous, 0),
        Err(DiscretizationError::InvalidDegree { family: Family::Continuous, .. })
    ));
    assert!(FunctionSpace::new(triangles, Family::Discontinuous, 0).is_ok());

    let quads = Arc::new(create_unit_square_quad_mesh(1));
    assert!(matches!(
        FunctionSpace::new(quads, Family::Continuous, [0, 2]),
        Err(DiscretizationError::InvalidDegree { .. })
    ));
}

#[test]
fn tensor_spaces_carry_every_component() {
    let mesh = Arc::new(create_unit_square_quad_mesh(2));
    let space = FunctionSpace::tensor(mesh, Family::Discontinuous, 1, [2, 3]).unwrap();
    assert_eq!(space.value_shape(), &ValueShape::tensor([2, 3]));
    assert_eq!(space.value_shape().rank(), 2);
    assert_eq!(space.local_component_count(), 6);
    assert_eq!(space.num_nodes(), 4 * 4);
    assert_eq!(space.num_dofs(), 6 * 16);
}

#[test]
fn node_coordinates_follow_the_lattice() {
    let mesh = Arc::new(create_unit_interval_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 2);
    let mut coords: Vec<f64> = space.node_coordinates().iter().copied().collect();
    coords.sort_by(f64::total_cmp);
    assert_eq!(coords.len(), 5);
    for (i, x) in coords.into_iter().enumerate() {
        assert_scalar_eq!(x, 0.25 * i as f64, comp = abs, tol = 1e-14);
    }

    // Discontinuous degree zero places a single node in the cell center
    let dg0 = scalar_space(&mesh, Family::Discontinuous, 0);
    let coords = dg0.node_coordinates();
    assert_scalar_eq!(coords[(0, 0)], 0.25, comp = abs, tol = 1e-14);
    assert_scalar_eq!(coords[(0, 1)], 0.75, comp = abs, tol = 1e-14);
}

#[test]
fn continuous_cells_share_nodes() {
    let mesh = Arc::new(create_unit_square_tri_mesh(1));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let shared: Vec<_> = space
        .cell_nodes(0)
        .iter()
        .filter(|node| space.cell_nodes(1).contains(node))
        .collect();
    assert_eq!(shared.len(), 2);

    let dg = scalar_space(&mesh, Family::Discontinuous, 1);
    assert!(dg
        .cell_nodes(0)
        .iter()
        .all(|node| !dg.cell_nodes(1).contains(node)));
}

#[test]
fn reconstructed_spaces_keep_their_element() {
    let coarse = Arc::new(create_unit_square_quad_mesh(1));
    let fine = Arc::new(coarse.refine_uniformly());
    let space = FunctionSpace::vector(coarse, Family::Continuous, [2, 1], 2).unwrap();
    let reconstructed = space.reconstruct_on(fine.clone()).unwrap();
    assert!(reconstructed.has_same_element(&space));
    assert!(!reconstructed.is_same_space(&space));
    assert!(reconstructed.is_on_mesh(&fine));
    assert_eq!(reconstructed.num_nodes(), 5 * 3);
}

#[test]
fn field_values_follow_their_space() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let other = scalar_space(&mesh, Family::Continuous, 2);

    assert!(matches!(
        DiscreteField::from_values(space.clone(), DVector::zeros(3)),
        Err(DiscretizationError::DofCountMismatch { expected: 9, actual: 3 })
    ));

    let mut field = DiscreteField::zeros(space.clone()).with_name("u");
    assert_eq!(field.name(), Some("u"));
    let source = field_from_node_fn(&space, |x| x[0] + 2.0 * x[1]);
    field.assign(&source).unwrap();
    assert_matrix_eq!(field.values().clone(), source.values().clone());
    assert_eq!(field.name(), Some("u"));

    assert_eq!(
        field.assign(&DiscreteField::zeros(other)),
        Err(DiscretizationError::SpaceMismatch)
    );

    let mut weights = DiscreteField::zeros(space);
    weights.fill(2.0);
    field.divide_pointwise(&weights).unwrap();
    assert_matrix_eq!(field.values().clone(), 0.5 * source.values(), comp = abs, tol = 1e-14);
}
