//! Basic procedural mesh generation routines.
use crate::mesh::{CellKind, Mesh};
use nalgebra::DMatrix;

/// A uniform mesh of the interval `[a, b]` with the given number of cells.
pub fn create_interval_mesh(a: f64, b: f64, num_cells: usize) -> Mesh {
    let n = num_cells;
    let vertices = DMatrix::from_fn(1, n + 1, |_, i| a + (b - a) * (i as f64) / (n.max(1) as f64));
    let cells = (0..n).flat_map(|i| [i, i + 1]).collect();
    Mesh {
        cell_kind: CellKind::Interval,
        vertices: if n == 0 { DMatrix::zeros(1, 0) } else { vertices },
        cells,
    }
}

pub fn create_unit_interval_mesh(num_cells: usize) -> Mesh {
    create_interval_mesh(0.0, 1.0, num_cells)
}

/// Vertices of a `cells_x` by `cells_y` grid over `[0, width] x [0, height]`, numbered row by row
/// from the bottom left corner.
fn grid_vertices(width: f64, height: f64, cells_x: usize, cells_y: usize) -> DMatrix<f64> {
    let num_vertices = (cells_x + 1) * (cells_y + 1);
    DMatrix::from_fn(2, num_vertices, |a, v| {
        let (i, j) = (v % (cells_x + 1), v / (cells_x + 1));
        match a {
            0 => width * (i as f64) / (cells_x as f64),
            _ => height * (j as f64) / (cells_y as f64),
        }
    })
}

/// A uniform quadrilateral mesh of `[0, width] x [0, height]` with counter-clockwise cells.
pub fn create_rectangular_quad_mesh(width: f64, height: f64, cells_x: usize, cells_y: usize) -> Mesh {
    if cells_x == 0 || cells_y == 0 {
        return Mesh {
            cell_kind: CellKind::Quadrilateral,
            vertices: DMatrix::zeros(2, 0),
            cells: Vec::new(),
        };
    }

    let vertex_index = |i: usize, j: usize| j * (cells_x + 1) + i;
    let mut cells = Vec::with_capacity(4 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            cells.extend_from_slice(&[
                vertex_index(i, j),
                vertex_index(i + 1, j),
                vertex_index(i + 1, j + 1),
                vertex_index(i, j + 1),
            ]);
        }
    }

    Mesh {
        cell_kind: CellKind::Quadrilateral,
        vertices: grid_vertices(width, height, cells_x, cells_y),
        cells,
    }
}

/// A uniform triangle mesh of `[0, width] x [0, height]`, obtained by splitting every
/// grid square along its diagonal from the bottom left to the top right corner.
pub fn create_rectangular_tri_mesh(width: f64, height: f64, cells_x: usize, cells_y: usize) -> Mesh {
    let quads = create_rectangular_quad_mesh(width, height, cells_x, cells_y);
    let cells = quads
        .cells()
        .flat_map(|q| [q[0], q[1], q[2], q[0], q[2], q[3]])
        .collect();
    Mesh {
        cell_kind: CellKind::Triangle,
        vertices: quads.vertices,
        cells,
    }
}

pub fn create_unit_square_quad_mesh(cells_per_dim: usize) -> Mesh {
    create_rectangular_quad_mesh(1.0, 1.0, cells_per_dim, cells_per_dim)
}

pub fn create_unit_square_tri_mesh(cells_per_dim: usize) -> Mesh {
    create_rectangular_tri_mesh(1.0, 1.0, cells_per_dim, cells_per_dim)
}
