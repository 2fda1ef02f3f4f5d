//! Function spaces of Lagrange elements on a mesh.
use crate::element::{LagrangeElement, ReferenceFiniteElement};
use crate::error::DiscretizationError;
use crate::mesh::Mesh;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// The continuity of a Lagrange family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Continuous Lagrange (`"CG"`). Nodes on shared vertices and edges are shared between cells.
    Continuous,
    /// Discontinuous Lagrange (`"DG"`). Every cell owns its nodes.
    Discontinuous,
}

impl FromStr for Family {
    type Err = DiscretizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CG" | "Lagrange" | "P" | "Q" => Ok(Self::Continuous),
            "DG" | "Discontinuous Lagrange" | "DP" | "DQ" => Ok(Self::Discontinuous),
            other => Err(DiscretizationError::UnknownFamily(other.to_string())),
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "CG"),
            Self::Discontinuous => write!(f, "DG"),
        }
    }
}

/// Polynomial degree of an element, either the same in every direction or given per direction.
///
/// Per-direction degrees are only meaningful on tensor-product cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Degree {
    Uniform(usize),
    PerDirection(Vec<usize>),
}

impl Degree {
    /// The largest degree over all directions.
    pub fn max(&self) -> usize {
        match self {
            Self::Uniform(p) => *p,
            Self::PerDirection(degrees) => degrees.iter().copied().max().unwrap_or(0),
        }
    }

    /// The same kind of degree with every entry incremented by one.
    pub fn incremented(&self) -> Self {
        match self {
            Self::Uniform(p) => Self::Uniform(p + 1),
            Self::PerDirection(degrees) => Self::PerDirection(degrees.iter().map(|p| p + 1).collect()),
        }
    }
}

impl From<usize> for Degree {
    fn from(p: usize) -> Self {
        Self::Uniform(p)
    }
}

impl From<[usize; 2]> for Degree {
    fn from(degrees: [usize; 2]) -> Self {
        Self::PerDirection(degrees.to_vec())
    }
}

impl From<(usize, usize)> for Degree {
    fn from((p, q): (usize, usize)) -> Self {
        Self::PerDirection(vec![p, q])
    }
}

impl Display for Degree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform(p) => write!(f, "{p}"),
            Self::PerDirection(degrees) => {
                let entries: Vec<_> = degrees.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", entries.join(", "))
            }
        }
    }
}

/// The shape of the values of a field at a point: `()` for scalars, `(n,)` for vectors,
/// `(m, n)` for matrices and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ValueShape(Vec<usize>);

impl ValueShape {
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn vector(dim: usize) -> Self {
        Self(vec![dim])
    }

    pub fn tensor(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of scalar components, which is one for scalars.
    pub fn num_components(&self) -> usize {
        self.0.iter().product()
    }
}

impl Display for ValueShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "()"),
            [n] => write!(f, "({n},)"),
            dims => {
                let entries: Vec<_> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "({})", entries.join(", "))
            }
        }
    }
}

/// A space of piecewise polynomial fields on a mesh.
///
/// Each node carries one degree of freedom per value component. The degree of freedom of
/// component `c` at node `n` has the index `n * num_components + c`.
#[derive(Debug, Clone)]
pub struct FunctionSpace {
    mesh: Arc<Mesh>,
    family: Family,
    degree: Degree,
    value_shape: ValueShape,
    element: LagrangeElement,
    cell_nodes: Vec<usize>,
    num_nodes: usize,
}

impl FunctionSpace {
    /// Creates a scalar space of the given family and degree.
    pub fn new(mesh: Arc<Mesh>, family: Family, degree: impl Into<Degree>) -> Result<Self, DiscretizationError> {
        let degree = degree.into();
        let element = LagrangeElement::new(mesh.cell_kind(), &degree)?;
        if family == Family::Continuous && element.degrees().contains(&0) {
            return Err(DiscretizationError::InvalidDegree { family, degree });
        }

        let (cell_nodes, num_nodes) = match family {
            Family::Continuous => number_shared_nodes(&mesh, &element),
            Family::Discontinuous => {
                let n = mesh.num_cells() * element.num_nodes();
                ((0..n).collect(), n)
            }
        };

        Ok(Self {
            mesh,
            family,
            degree,
            value_shape: ValueShape::scalar(),
            element,
            cell_nodes,
            num_nodes,
        })
    }

    /// Creates a space of vectors with `dim` components.
    pub fn vector(
        mesh: Arc<Mesh>,
        family: Family,
        degree: impl Into<Degree>,
        dim: usize,
    ) -> Result<Self, DiscretizationError> {
        Self::new(mesh, family, degree)?.with_value_shape(ValueShape::vector(dim))
    }

    /// Creates a space of tensors with the given shape.
    pub fn tensor(
        mesh: Arc<Mesh>,
        family: Family,
        degree: impl Into<Degree>,
        shape: impl Into<Vec<usize>>,
    ) -> Result<Self, DiscretizationError> {
        Self::new(mesh, family, degree)?.with_value_shape(ValueShape::tensor(shape))
    }

    /// Replaces the value shape of the space, keeping its nodes.
    pub fn with_value_shape(mut self, value_shape: ValueShape) -> Result<Self, DiscretizationError> {
        if value_shape.dims().contains(&0) {
            return Err(DiscretizationError::InvalidValueShape(value_shape));
        }
        self.value_shape = value_shape;
        Ok(self)
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn degree(&self) -> &Degree {
        &self.degree
    }

    pub fn value_shape(&self) -> &ValueShape {
        &self.value_shape
    }

    pub fn element(&self) -> &LagrangeElement {
        &self.element
    }

    pub fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    /// Number of nodes in each cell.
    pub fn local_dof_count(&self) -> usize {
        self.element.num_nodes()
    }

    /// Number of value components carried by each node.
    pub fn local_component_count(&self) -> usize {
        self.value_shape.num_components()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_dofs(&self) -> usize {
        self.num_nodes * self.local_component_count()
    }

    /// Global node indices of the given cell, in local node order.
    pub fn cell_nodes(&self, cell: usize) -> &[usize] {
        let n = self.local_dof_count();
        &self.cell_nodes[n * cell..n * (cell + 1)]
    }

    /// Physical coordinates of every node, stored column-wise.
    pub fn node_coordinates(&self) -> DMatrix<f64> {
        let dim = self.mesh.geometric_dim();
        let mut coords = DMatrix::zeros(dim, self.num_nodes);
        let mut x = vec![0.0; dim];
        for cell in 0..self.num_cells() {
            for (local, &node) in self.cell_nodes(cell).iter().enumerate() {
                self.mesh
                    .map_reference_coords(cell, self.element.reference_node(local), &mut x);
                coords.column_mut(node).copy_from_slice(&x);
            }
        }
        coords
    }

    /// Sorted indices of the nodes that lie on a boundary facet of the mesh.
    pub fn boundary_nodes(&self) -> Vec<usize> {
        let mut nodes = Vec::new();
        for facet in self.mesh.find_boundary_facets() {
            let local_facet = self.mesh.cell_kind().local_facets()[facet.local_index];
            let cell_nodes = self.cell_nodes(facet.cell);
            for (local, &node) in cell_nodes.iter().enumerate() {
                if self.element.node_is_supported_by(local, local_facet) {
                    nodes.push(node);
                }
            }
        }
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Tests whether the two spaces share mesh instance, element and value shape.
    pub fn is_same_space(&self, other: &FunctionSpace) -> bool {
        self.is_on_mesh(&other.mesh) && self.has_same_element(other)
    }

    /// Tests whether the space is defined on the given mesh instance.
    pub fn is_on_mesh(&self, mesh: &Arc<Mesh>) -> bool {
        Arc::ptr_eq(&self.mesh, mesh)
    }

    /// Tests whether the two spaces have the same family, element and value shape, regardless of mesh.
    ///
    /// Elements are compared by cell kind and per-direction degrees, so a uniform degree `p` on
    /// quadrilaterals matches the degree `(p, p)`.
    pub fn has_same_element(&self, other: &FunctionSpace) -> bool {
        self.family == other.family
            && self.element.cell_kind() == other.element.cell_kind()
            && self.element.degrees() == other.element.degrees()
            && self.value_shape == other.value_shape
    }

    /// The same kind of space on a different mesh.
    pub fn reconstruct_on(&self, mesh: Arc<Mesh>) -> Result<Self, DiscretizationError> {
        Self::new(mesh, self.family, self.degree.clone())?.with_value_shape(self.value_shape.clone())
    }
}

impl Display for FunctionSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} on {:?} mesh with value shape {}",
            self.family,
            self.degree,
            self.mesh.cell_kind(),
            self.value_shape
        )
    }
}

/// Numbers nodes so that nodes with the same global key share an index.
fn number_shared_nodes(mesh: &Mesh, element: &LagrangeElement) -> (Vec<usize>, usize) {
    let mut node_indices = FxHashMap::default();
    let mut cell_nodes = Vec::with_capacity(mesh.num_cells() * element.num_nodes());
    for cell_vertices in mesh.cells() {
        for local in 0..element.num_nodes() {
            let key = element.global_node_key(local, cell_vertices);
            let next_index = node_indices.len();
            let index = *node_indices.entry(key).or_insert(next_index);
            cell_nodes.push(index);
        }
    }
    let num_nodes = node_indices.len();
    (cell_nodes, num_nodes)
}
