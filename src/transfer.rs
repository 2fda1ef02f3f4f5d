//! Transfer of fields between the levels of a uniformly refined mesh hierarchy.
use crate::element::ReferenceFiniteElement;
use crate::error::DiscretizationError;
use crate::field::DiscreteField;
use crate::mesh::Mesh;
use log::debug;
use std::borrow::Cow;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

const CONTAINMENT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferKind {
    Prolong,
    Inject,
    Restrict,
}

impl Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prolong => write!(f, "prolong"),
            Self::Inject => write!(f, "inject"),
            Self::Restrict => write!(f, "restrict"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    /// The mesh of the source or target field is not a level of the hierarchy.
    #[error("{role} mesh is not part of the mesh hierarchy")]
    NotInHierarchy { role: &'static str },
    /// The levels of source and target do not fit the direction of the transfer.
    #[error("cannot {transfer} from level {source_level} to level {target_level}")]
    InvalidLevels {
        transfer: TransferKind,
        source_level: usize,
        target_level: usize,
    },
    /// Source and target spaces differ in family, degree or value shape.
    #[error("cannot transfer between {source_space} and {target_space}")]
    IncompatibleSpaces { source_space: String, target_space: String },
    #[error(transparent)]
    Discretization(#[from] DiscretizationError),
}

/// A sequence of meshes where each level is the uniform refinement of the previous one.
#[derive(Debug, Clone)]
pub struct MeshHierarchy {
    meshes: Vec<Arc<Mesh>>,
}

impl MeshHierarchy {
    /// Builds `refinements` levels on top of `base`, which becomes level 0.
    pub fn new(base: Arc<Mesh>, refinements: usize) -> Self {
        let mut meshes = Vec::with_capacity(refinements + 1);
        meshes.push(base);
        for _ in 0..refinements {
            let finer = meshes[meshes.len() - 1].refine_uniformly();
            meshes.push(Arc::new(finer));
        }
        Self { meshes }
    }

    pub fn num_levels(&self) -> usize {
        self.meshes.len()
    }

    /// The mesh at the given level.
    ///
    /// # Panics
    ///
    /// Panics if the level is out of bounds.
    pub fn mesh(&self, level: usize) -> &Arc<Mesh> {
        &self.meshes[level]
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    /// The level of the given mesh instance, if it is part of the hierarchy.
    pub fn level_of(&self, mesh: &Arc<Mesh>) -> Option<usize> {
        self.meshes.iter().position(|m| Arc::ptr_eq(m, mesh))
    }

    /// Interpolates a field on a coarse level into a field on a finer level.
    pub fn prolong(&self, source: &DiscreteField, target: &mut DiscreteField) -> Result<(), TransferError> {
        let (source_level, target_level) = self.validate(TransferKind::Prolong, source, target)?;
        let mut current = Cow::Borrowed(source);
        for level in source_level + 1..target_level {
            let mut next = self.intermediate(&current, level)?;
            prolong_once(&current, &mut next);
            current = Cow::Owned(next);
        }
        prolong_once(&current, target);
        Ok(())
    }

    /// Evaluates a field on a fine level at the nodes of a field on a coarser level.
    pub fn inject(&self, source: &DiscreteField, target: &mut DiscreteField) -> Result<(), TransferError> {
        let (source_level, target_level) = self.validate(TransferKind::Inject, source, target)?;
        let mut current = Cow::Borrowed(source);
        for level in (target_level + 1..source_level).rev() {
            let mut next = self.intermediate(&current, level)?;
            inject_once(&current, &mut next);
            current = Cow::Owned(next);
        }
        inject_once(&current, target);
        Ok(())
    }

    /// Applies the transpose of prolongation to dual data, from a fine level to a coarser level.
    ///
    /// Where prolongation maps coarse coefficients to fine coefficients, restriction maps fine
    /// residuals (or load vectors) to coarse ones.
    pub fn restrict(&self, source: &DiscreteField, target: &mut DiscreteField) -> Result<(), TransferError> {
        let (source_level, target_level) = self.validate(TransferKind::Restrict, source, target)?;
        let mut current = Cow::Borrowed(source);
        for level in (target_level + 1..source_level).rev() {
            let mut next = self.intermediate(&current, level)?;
            restrict_once(&current, &mut next);
            current = Cow::Owned(next);
        }
        restrict_once(&current, target);
        Ok(())
    }

    fn validate(
        &self,
        transfer: TransferKind,
        source: &DiscreteField,
        target: &DiscreteField,
    ) -> Result<(usize, usize), TransferError> {
        let source_level = self
            .level_of(source.space().mesh())
            .ok_or(TransferError::NotInHierarchy { role: "source" })?;
        let target_level = self
            .level_of(target.space().mesh())
            .ok_or(TransferError::NotInHierarchy { role: "target" })?;

        let valid_levels = match transfer {
            TransferKind::Prolong => target_level > source_level,
            TransferKind::Inject | TransferKind::Restrict => target_level < source_level,
        };
        if !valid_levels {
            return Err(TransferError::InvalidLevels {
                transfer,
                source_level,
                target_level,
            });
        }

        if !source.space().has_same_element(target.space()) {
            return Err(TransferError::IncompatibleSpaces {
                source_space: source.space().to_string(),
                target_space: target.space().to_string(),
            });
        }

        debug!("{transfer} from level {source_level} to level {target_level}");
        Ok((source_level, target_level))
    }

    fn intermediate(&self, field: &DiscreteField, level: usize) -> Result<DiscreteField, TransferError> {
        let space = field.space().reconstruct_on(self.mesh(level).clone())?;
        Ok(DiscreteField::zeros(Arc::new(space)))
    }
}

/// Prolongs from a mesh to its uniform refinement.
fn prolong_once(coarse: &DiscreteField, fine: &mut DiscreteField) {
    let coarse_space = coarse.space().clone();
    let fine_space = fine.space().clone();
    let kind = coarse_space.mesh().cell_kind();
    let element = fine_space.element();
    let s = fine_space.local_component_count();

    let mut xi = vec![0.0; kind.dim()];
    let mut basis = vec![0.0; coarse_space.local_dof_count()];
    let mut node_values = vec![0.0; s];
    let mut values = fine.values_mut();
    for cell in 0..coarse_space.num_cells() {
        for (k, child_map) in kind.child_maps().iter().enumerate() {
            let child = kind.num_children() * cell + k;
            for (i, &node) in fine_space.cell_nodes(child).iter().enumerate() {
                child_map.to_parent(element.reference_node(i), &mut xi);
                coarse.evaluate_in_cell(cell, &xi, &mut basis, &mut node_values);
                values.rows_mut(s * node, s).copy_from_slice(&node_values);
            }
        }
    }
}

/// Injects from the uniform refinement of a mesh into the mesh itself.
fn inject_once(fine: &DiscreteField, coarse: &mut DiscreteField) {
    let coarse_space = coarse.space().clone();
    let fine_space = fine.space().clone();
    let kind = coarse_space.mesh().cell_kind();
    let element = coarse_space.element();
    let s = coarse_space.local_component_count();

    let mut xi_child = vec![0.0; kind.dim()];
    let mut basis = vec![0.0; fine_space.local_dof_count()];
    let mut node_values = vec![0.0; s];
    let mut values = coarse.values_mut();
    for cell in 0..coarse_space.num_cells() {
        for (i, &node) in coarse_space.cell_nodes(cell).iter().enumerate() {
            let xi = element.reference_node(i);
            let containing_child = kind.child_maps().iter().position(|child_map| {
                child_map.to_child(xi, &mut xi_child);
                kind.contains_reference_point(&xi_child, CONTAINMENT_TOLERANCE)
            });
            // Children tile the parent, so some child always contains the node
            if let Some(k) = containing_child {
                let child = kind.num_children() * cell + k;
                fine.evaluate_in_cell(child, &xi_child, &mut basis, &mut node_values);
                values.rows_mut(s * node, s).copy_from_slice(&node_values);
            }
        }
    }
}

/// Restricts from the uniform refinement of a mesh to the mesh itself.
fn restrict_once(fine: &DiscreteField, coarse: &mut DiscreteField) {
    let coarse_space = coarse.space().clone();
    let fine_space = fine.space().clone();
    let kind = coarse_space.mesh().cell_kind();
    let coarse_element = coarse_space.element();
    let fine_element = fine_space.element();
    let s = coarse_space.local_component_count();

    let mut xi = vec![0.0; kind.dim()];
    let mut basis = vec![0.0; coarse_space.local_dof_count()];
    let mut visited = vec![false; fine_space.num_nodes()];
    let fine_values = fine.values();
    coarse.fill(0.0);
    let mut values = coarse.values_mut();
    for cell in 0..coarse_space.num_cells() {
        let coarse_nodes = coarse_space.cell_nodes(cell);
        for (k, child_map) in kind.child_maps().iter().enumerate() {
            let child = kind.num_children() * cell + k;
            for (i, &fine_node) in fine_space.cell_nodes(child).iter().enumerate() {
                // Shared fine nodes correspond to a single row of the prolongation
                if std::mem::replace(&mut visited[fine_node], true) {
                    continue;
                }
                child_map.to_parent(fine_element.reference_node(i), &mut xi);
                coarse_element.populate_basis(&mut basis, &xi);
                for (&phi, &coarse_node) in basis.iter().zip(coarse_nodes) {
                    for c in 0..s {
                        values[s * coarse_node + c] += phi * fine_values[s * fine_node + c];
                    }
                }
            }
        }
    }
}
