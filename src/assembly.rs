//! Assembly of mass matrices and load vectors.
//!
//! Element contributions are computed in parallel, one cell per task, and then scattered into
//! the global system serially.
use crate::element::{LagrangeElement, ReferenceFiniteElement};
use crate::form::{EvaluationWorkspace, Expr};
use crate::mesh::Mesh;
use crate::quadrature::CellQuadrature;
use crate::space::FunctionSpace;
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

define_thread_local_workspace!(WORKSPACE);

#[derive(Debug, Default)]
struct AssemblyWorkspace {
    basis_values: Vec<f64>,
    source_values: Vec<f64>,
    expression: EvaluationWorkspace,
}

/// Default quadrature strength for the mass matrix of a space.
pub fn mass_quadrature_strength(space: &FunctionSpace) -> usize {
    2 * space.element().max_total_degree()
}

/// Default quadrature strength for the load vector of a space and a source expression.
pub fn load_quadrature_strength(space: &FunctionSpace, source: &Expr) -> usize {
    space.element().max_total_degree() + source.estimated_degree()
}

/// Assembles the element mass matrix of a cell.
///
/// The element matrix consists of `s x s` blocks `M_IJ = I^s ∫_K φ_I φ_J dx`, where `s` is the
/// number of value components, so that the row of component `c` at local node `I` is `s I + c`.
///
/// # Panics
///
/// Panics if the output or basis buffer dimensions do not match the element.
#[allow(non_snake_case)]
pub fn assemble_element_mass_matrix(
    mut output: DMatrixViewMut<'_, f64>,
    mesh: &Mesh,
    element: &LagrangeElement,
    cell: usize,
    quadrature: &CellQuadrature,
    num_components: usize,
    basis_values: &mut [f64],
) -> eyre::Result<()> {
    let s = num_components;
    let n = element.num_nodes();
    assert_eq!(output.nrows(), s * n, "Output matrix dimension mismatch");
    assert_eq!(output.ncols(), s * n, "Output matrix dimension mismatch");
    output.fill(0.0);

    let phi = basis_values;
    for (weight, xi) in quadrature.iter() {
        let j_det = mesh.reference_volume_factor(cell, xi);
        if !(j_det > 0.0 && j_det.is_finite()) {
            return Err(eyre!("cell {cell} is degenerate (|det J| = {j_det})"));
        }
        element.populate_basis(phi, xi);
        let scale = weight * j_det;

        for I in 0..n {
            for J in I..n {
                let m_IJ = scale * phi[I] * phi[J];
                for c in 0..s {
                    output[(s * I + c, s * J + c)] += m_IJ;
                }
            }
        }
    }

    // Mirror the upper triangle
    for i in 0..output.nrows() {
        for j in 0..i {
            output[(i, j)] = output[(j, i)];
        }
    }

    Ok(())
}

/// Assembles the element load vector `b_(s I + c) = ∫_K φ_I f_c dx` of a source expression.
///
/// # Panics
///
/// Panics if the output or buffer dimensions do not match the element.
#[allow(clippy::too_many_arguments)]
pub fn assemble_element_load_vector(
    mut output: DVectorViewMut<'_, f64>,
    mesh: &Mesh,
    element: &LagrangeElement,
    cell: usize,
    quadrature: &CellQuadrature,
    source: &Expr,
    basis_values: &mut [f64],
    source_values: &mut [f64],
    expression_workspace: &mut EvaluationWorkspace,
) -> eyre::Result<()> {
    let s = source_values.len();
    let n = element.num_nodes();
    assert_eq!(output.len(), s * n, "Output vector dimension mismatch");
    output.fill(0.0);

    for (weight, xi) in quadrature.iter() {
        let j_det = mesh.reference_volume_factor(cell, xi);
        if !(j_det > 0.0 && j_det.is_finite()) {
            return Err(eyre!("cell {cell} is degenerate (|det J| = {j_det})"));
        }
        element.populate_basis(basis_values, xi);
        source.evaluate_in_cell_with(expression_workspace, cell, xi, source_values);

        let scale = weight * j_det;
        for (i, phi_i) in basis_values.iter().enumerate() {
            for (c, f_c) in source_values.iter().enumerate() {
                output[s * i + c] += scale * phi_i * f_c;
            }
        }
    }

    Ok(())
}

fn space_quadrature(space: &FunctionSpace, strength: usize) -> eyre::Result<CellQuadrature> {
    Ok(CellQuadrature::for_cell(space.mesh().cell_kind(), strength)?)
}

/// Assembles the global mass matrix of a space.
#[allow(non_snake_case)]
pub fn assemble_mass_matrix(space: &FunctionSpace, quadrature_strength: usize) -> eyre::Result<CsrMatrix<f64>> {
    let quadrature = space_quadrature(space, quadrature_strength)?;
    let s = space.local_component_count();
    let n = space.local_dof_count();

    let element_matrices = (0..space.num_cells())
        .into_par_iter()
        .map(|cell| {
            with_thread_local_workspace(&WORKSPACE, |ws: &mut AssemblyWorkspace| -> eyre::Result<DMatrix<f64>> {
                ws.basis_values.resize(n, 0.0);
                let mut matrix = DMatrix::zeros(s * n, s * n);
                assemble_element_mass_matrix(
                    DMatrixViewMut::from(&mut matrix),
                    space.mesh(),
                    space.element(),
                    cell,
                    &quadrature,
                    s,
                    &mut ws.basis_values,
                )?;
                Ok(matrix)
            })
        })
        .collect::<eyre::Result<Vec<_>>>()?;

    let num_dofs = space.num_dofs();
    let mut coo = CooMatrix::new(num_dofs, num_dofs);
    for (cell, matrix) in element_matrices.iter().enumerate() {
        let nodes = space.cell_nodes(cell);
        for (I, &node_I) in nodes.iter().enumerate() {
            for (J, &node_J) in nodes.iter().enumerate() {
                for c in 0..s {
                    coo.push(s * node_I + c, s * node_J + c, matrix[(s * I + c, s * J + c)]);
                }
            }
        }
    }

    Ok(CsrMatrix::from(&coo))
}

/// Assembles the global load vector of a source expression tested against a space.
///
/// The source must have the value shape of the space and be defined on its mesh.
pub fn assemble_load_vector(
    space: &FunctionSpace,
    source: &Expr,
    quadrature_strength: usize,
) -> eyre::Result<DVector<f64>> {
    let quadrature = space_quadrature(space, quadrature_strength)?;
    let s = space.local_component_count();
    let n = space.local_dof_count();

    let element_vectors = (0..space.num_cells())
        .into_par_iter()
        .map(|cell| {
            with_thread_local_workspace(&WORKSPACE, |ws: &mut AssemblyWorkspace| -> eyre::Result<DVector<f64>> {
                ws.basis_values.resize(n, 0.0);
                ws.source_values.resize(s, 0.0);
                let mut vector = DVector::zeros(s * n);
                assemble_element_load_vector(
                    DVectorViewMut::from(&mut vector),
                    space.mesh(),
                    space.element(),
                    cell,
                    &quadrature,
                    source,
                    &mut ws.basis_values,
                    &mut ws.source_values,
                    &mut ws.expression,
                )?;
                Ok(vector)
            })
        })
        .collect::<eyre::Result<Vec<_>>>()?;

    let mut load = DVector::zeros(space.num_dofs());
    for (cell, vector) in element_vectors.iter().enumerate() {
        for (i, &node) in space.cell_nodes(cell).iter().enumerate() {
            for c in 0..s {
                load[s * node + c] += vector[s * i + c];
            }
        }
    }
    Ok(load)
}
