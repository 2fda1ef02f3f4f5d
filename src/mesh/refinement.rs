use crate::mesh::{CellKind, Mesh};
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;

/// The affine map `xi_parent = offset + scale * xi_child` from the reference cell of a child to
/// the reference cell of its parent.
///
/// Uniform refinement only ever scales by `±1/2`, so a scalar factor is enough.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ChildMap {
    pub offset: [f64; 2],
    pub scale: f64,
}

impl ChildMap {
    pub fn to_parent(&self, xi_child: &[f64], xi_parent: &mut [f64]) {
        for (a, p) in xi_parent.iter_mut().enumerate() {
            *p = self.offset[a] + self.scale * xi_child[a];
        }
    }

    pub fn to_child(&self, xi_parent: &[f64], xi_child: &mut [f64]) {
        for (a, c) in xi_child.iter_mut().enumerate() {
            *c = (xi_parent[a] - self.offset[a]) / self.scale;
        }
    }
}

const fn child(offset: [f64; 2], scale: f64) -> ChildMap {
    ChildMap { offset, scale }
}

const INTERVAL_CHILDREN: &[ChildMap] = &[child([0.0, 0.0], 0.5), child([0.5, 0.0], 0.5)];

const TRIANGLE_CHILDREN: &[ChildMap] = &[
    child([0.0, 0.0], 0.5),
    child([0.5, 0.0], 0.5),
    child([0.0, 0.5], 0.5),
    // The center child is the parent rotated by 180 degrees
    child([0.5, 0.5], -0.5),
];

const QUADRILATERAL_CHILDREN: &[ChildMap] = &[
    child([0.0, 0.0], 0.5),
    child([0.5, 0.0], 0.5),
    child([0.5, 0.5], 0.5),
    child([0.0, 0.5], 0.5),
];

impl CellKind {
    /// Number of children produced by one uniform refinement of a cell.
    pub fn num_children(&self) -> usize {
        self.child_maps().len()
    }

    /// Reference maps of the children of a uniformly refined cell, in child order.
    pub fn child_maps(&self) -> &'static [ChildMap] {
        match self {
            Self::Interval => INTERVAL_CHILDREN,
            Self::Triangle => TRIANGLE_CHILDREN,
            Self::Quadrilateral => QUADRILATERAL_CHILDREN,
        }
    }
}

/// Collects vertices of a refined mesh, sharing the vertices created on common edges.
struct VertexBuilder<'a> {
    mesh: &'a Mesh,
    coords: Vec<f64>,
    edge_midpoints: FxHashMap<(usize, usize), usize>,
}

impl<'a> VertexBuilder<'a> {
    fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            coords: mesh.vertices().as_slice().to_vec(),
            edge_midpoints: FxHashMap::default(),
        }
    }

    fn push_average(&mut self, vertices: &[usize]) -> usize {
        let dim = self.mesh.geometric_dim();
        let index = self.coords.len() / dim;
        let weight = 1.0 / vertices.len() as f64;
        for a in 0..dim {
            let sum: f64 = vertices
                .iter()
                .map(|&v| self.mesh.vertices()[(a, v)])
                .sum();
            self.coords.push(weight * sum);
        }
        index
    }

    fn midpoint(&mut self, a: usize, b: usize) -> usize {
        let key = (a.min(b), a.max(b));
        if let Some(&index) = self.edge_midpoints.get(&key) {
            index
        } else {
            let index = self.push_average(&[a, b]);
            self.edge_midpoints.insert(key, index);
            index
        }
    }

    fn into_vertices(self) -> DMatrix<f64> {
        let dim = self.mesh.geometric_dim();
        DMatrix::from_vec(dim, self.coords.len() / dim, self.coords)
    }
}

impl Mesh {
    /// Uniformly refines every cell.
    ///
    /// Cell `c` of this mesh is split into the cells
    /// `n * c, ..., n * c + n - 1` of the refined mesh, with `n = cell_kind().num_children()`.
    /// The reference cell of child `k` is related to that of its parent by
    /// `cell_kind().child_maps()[k]`.
    pub fn refine_uniformly(&self) -> Mesh {
        let kind = self.cell_kind();
        let mut builder = VertexBuilder::new(self);
        let mut cells = Vec::with_capacity(self.num_cells() * kind.num_children() * kind.num_vertices());

        for cell in 0..self.num_cells() {
            let v = self.cell_vertices(cell);
            match kind {
                CellKind::Interval => {
                    let m = builder.midpoint(v[0], v[1]);
                    cells.extend_from_slice(&[v[0], m, m, v[1]]);
                }
                CellKind::Triangle => {
                    let m01 = builder.midpoint(v[0], v[1]);
                    let m12 = builder.midpoint(v[1], v[2]);
                    let m20 = builder.midpoint(v[2], v[0]);
                    cells.extend_from_slice(&[v[0], m01, m20]);
                    cells.extend_from_slice(&[m01, v[1], m12]);
                    cells.extend_from_slice(&[m20, m12, v[2]]);
                    cells.extend_from_slice(&[m12, m20, m01]);
                }
                CellKind::Quadrilateral => {
                    let e01 = builder.midpoint(v[0], v[1]);
                    let e12 = builder.midpoint(v[1], v[2]);
                    let e23 = builder.midpoint(v[2], v[3]);
                    let e30 = builder.midpoint(v[3], v[0]);
                    let c = builder.push_average(v);
                    cells.extend_from_slice(&[v[0], e01, c, e30]);
                    cells.extend_from_slice(&[e01, v[1], e12, c]);
                    cells.extend_from_slice(&[c, e12, v[2], e23]);
                    cells.extend_from_slice(&[e30, c, e23, v[3]]);
                }
            }
        }

        Mesh {
            cell_kind: kind,
            vertices: builder.into_vertices(),
            cells,
        }
    }
}
