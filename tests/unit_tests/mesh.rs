use fenris_projection::error::DiscretizationError;
use fenris_projection::mesh::procedural::{
    create_interval_mesh, create_rectangular_quad_mesh, create_rectangular_tri_mesh, create_unit_square_quad_mesh,
    create_unit_square_tri_mesh,
};
use fenris_projection::mesh::{CellKind, Mesh};
use matrixcompare::assert_scalar_eq;
use nalgebra::DMatrix;
use proptest::prelude::*;

#[test]
fn mesh_construction_checks_geometry_and_connectivity() {
    let vertices = DMatrix::from_column_slice(2, 3, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    let mesh = Mesh::new(CellKind::Triangle, vertices.clone(), vec![0, 1, 2]).unwrap();
    assert_eq!(mesh.num_cells(), 1);
    assert_eq!(mesh.num_vertices(), 3);
    assert_eq!(mesh.cell_vertices(0), &[0, 1, 2]);

    assert!(matches!(
        Mesh::new(CellKind::Interval, vertices.clone(), vec![0, 1]),
        Err(DiscretizationError::GeometryDimension {
            expected: 1,
            actual: 2,
            ..
        })
    ));
    assert!(matches!(
        Mesh::new(CellKind::Triangle, vertices.clone(), vec![0, 1]),
        Err(DiscretizationError::InvalidConnectivity(_))
    ));
    assert!(matches!(
        Mesh::new(CellKind::Triangle, vertices, vec![0, 1, 3]),
        Err(DiscretizationError::InvalidConnectivity(_))
    ));
}

#[test]
fn procedural_meshes_have_expected_sizes() {
    let interval = create_interval_mesh(-1.0, 2.0, 6);
    assert_eq!(interval.num_cells(), 6);
    assert_eq!(interval.num_vertices(), 7);
    assert_scalar_eq!(interval.vertex(6)[0], 2.0, comp = abs, tol = 1e-14);

    let quads = create_rectangular_quad_mesh(2.0, 1.0, 4, 2);
    assert_eq!(quads.num_cells(), 8);
    assert_eq!(quads.num_vertices(), 15);

    let triangles = create_rectangular_tri_mesh(2.0, 1.0, 4, 2);
    assert_eq!(triangles.num_cells(), 16);
    assert_eq!(triangles.num_vertices(), 15);

    assert_eq!(create_rectangular_quad_mesh(1.0, 1.0, 0, 3).num_cells(), 0);
}

#[test]
fn cell_volumes_sum_to_domain_area() {
    // The reference triangle has area 1/2 while the reference square has area 1
    let triangles = create_rectangular_tri_mesh(2.0, 3.0, 3, 5);
    let area: f64 = (0..triangles.num_cells())
        .map(|cell| 0.5 * triangles.reference_volume_factor(cell, &[1.0 / 3.0, 1.0 / 3.0]))
        .sum();
    assert_scalar_eq!(area, 6.0, comp = abs, tol = 1e-12);

    let quads = create_rectangular_quad_mesh(2.0, 3.0, 3, 5);
    let area: f64 = (0..quads.num_cells())
        .map(|cell| quads.reference_volume_factor(cell, &[0.5, 0.5]))
        .sum();
    assert_scalar_eq!(area, 6.0, comp = abs, tol = 1e-12);
}

#[test]
fn reference_map_sends_vertices_to_vertices() {
    let mesh = create_unit_square_quad_mesh(3);
    let mut x = [0.0; 2];
    for cell in 0..mesh.num_cells() {
        for (local, xi) in CellKind::Quadrilateral.reference_vertices().iter().enumerate() {
            mesh.map_reference_coords(cell, xi, &mut x);
            let vertex = mesh.vertex(mesh.cell_vertices(cell)[local]);
            assert_scalar_eq!(x[0], vertex[0], comp = abs, tol = 1e-14);
            assert_scalar_eq!(x[1], vertex[1], comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn boundary_of_unit_square() {
    let mesh = create_unit_square_tri_mesh(3);
    let facets = mesh.find_boundary_facets();
    assert_eq!(facets.len(), 12);
    for facet in &facets {
        let local = mesh.cell_kind().local_facets()[facet.local_index];
        let expected: Vec<_> = local
            .iter()
            .map(|&i| mesh.cell_vertices(facet.cell)[i])
            .collect();
        assert_eq!(facet.vertices, expected);
    }

    let boundary_vertices = mesh.find_boundary_vertices();
    assert_eq!(boundary_vertices.len(), 12);
    for &v in &boundary_vertices {
        let x = mesh.vertex(v);
        let on_boundary = [x[0], x[1]]
            .iter()
            .any(|&t| t.abs() < 1e-12 || (t - 1.0).abs() < 1e-12);
        assert!(on_boundary);
    }
}

#[test]
fn interval_boundary_is_its_end_points() {
    let mesh = create_interval_mesh(0.0, 1.0, 5);
    assert_eq!(mesh.find_boundary_vertices(), vec![0, 5]);
}

#[test]
fn refined_vertices_are_shared_between_neighbors() {
    // Two triangles sharing an edge: 4 vertices, 5 edges
    let triangles = create_unit_square_tri_mesh(1).refine_uniformly();
    assert_eq!(triangles.num_cells(), 8);
    assert_eq!(triangles.num_vertices(), 9);

    // One quadrilateral gains four edge midpoints and one center
    let quads = create_unit_square_quad_mesh(1).refine_uniformly();
    assert_eq!(quads.num_cells(), 4);
    assert_eq!(quads.num_vertices(), 9);
}

proptest! {
    #[test]
    fn refined_grids_match_finer_grids(cells_x in 1usize..5, cells_y in 1usize..5) {
        let refined = create_rectangular_quad_mesh(1.0, 1.0, cells_x, cells_y).refine_uniformly();
        let fine = create_rectangular_quad_mesh(1.0, 1.0, 2 * cells_x, 2 * cells_y);
        prop_assert_eq!(refined.num_cells(), fine.num_cells());
        prop_assert_eq!(refined.num_vertices(), fine.num_vertices());
        prop_assert_eq!(refined.find_boundary_facets().len(), fine.find_boundary_facets().len());

        let refined_triangles = create_rectangular_tri_mesh(1.0, 1.0, cells_x, cells_y).refine_uniformly();
        prop_assert_eq!(refined_triangles.num_cells(), 4 * 2 * cells_x * cells_y);
        prop_assert_eq!(refined_triangles.num_vertices(), fine.num_vertices());
    }
}
