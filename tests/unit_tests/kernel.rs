use crate::{field_from_node_fn, scalar_space};
use fenris_projection::field::DiscreteField;
use fenris_projection::form::dx;
use fenris_projection::kernel::{
    AccumulationKernel, CellLoopExecutor, KernelArgument, KernelError, KernelExecutor, LocalIncrements, LocalKernel,
    LocalReads,
};
use fenris_projection::mesh::procedural::{create_unit_interval_mesh, create_unit_square_tri_mesh};
use fenris_projection::space::Family;
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use std::sync::Arc;

/// Adds the cell index to every local entry of `cells`.
struct CellIndexKernel {
    local_nodes: usize,
}

impl LocalKernel for CellIndexKernel {
    fn extents(&self) -> (usize, usize) {
        (self.local_nodes, 1)
    }

    fn execute(&self, cell: usize, _reads: &LocalReads, increments: &mut LocalIncrements) -> eyre::Result<()> {
        increments.get_mut("cells")?.add_scalar_mut(cell as f64);
        Ok(())
    }
}

#[test]
fn increments_accumulate_over_shared_nodes() {
    // Nodes are at x = 0, 1/3, 2/3, 1 and interior nodes are shared by two cells
    let mesh = Arc::new(create_unit_interval_mesh(3));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let mut cells = DiscreteField::zeros(space.clone());

    CellLoopExecutor
        .run_kernel(
            &CellIndexKernel { local_nodes: 2 },
            &dx(),
            &mut [("cells", KernelArgument::Increment(&mut cells))],
        )
        .unwrap();

    let expected = field_from_node_fn(&space, |x| {
        let i = (3.0 * x[0]).round();
        // Node i touches cells i - 1 and i
        let left = if i > 0.0 { i - 1.0 } else { 0.0 };
        let right = if i < 3.0 { i } else { 0.0 };
        left + right
    });
    assert_matrix_eq!(cells.values().clone(), expected.values().clone(), comp = abs, tol = 1e-14);
}

#[test]
fn accumulation_kernel_sums_values_and_counts_cells() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let dg = scalar_space(&mesh, Family::Discontinuous, 1);
    let cg = scalar_space(&mesh, Family::Continuous, 1);
    let source = DiscreteField::from_values(dg.clone(), DVector::repeat(dg.num_dofs(), 2.0)).unwrap();
    let mut output = DiscreteField::zeros(cg.clone());
    let mut weights = DiscreteField::zeros(cg.clone());

    CellLoopExecutor
        .run_kernel(
            &AccumulationKernel::for_space(&cg),
            &dx().with_domain(&mesh),
            &mut [
                (AccumulationKernel::OUTPUT, KernelArgument::Increment(&mut output)),
                (AccumulationKernel::WEIGHT, KernelArgument::Increment(&mut weights)),
                (AccumulationKernel::SOURCE, KernelArgument::Read(&source)),
            ],
        )
        .unwrap();

    // Every cell contributes one to each of its three vertices
    assert_eq!(weights.values().sum(), 3.0 * mesh.num_cells() as f64);
    assert_matrix_eq!(output.values().clone(), 2.0 * weights.values(), comp = abs, tol = 1e-14);
}

#[test]
fn bindings_are_validated_before_execution() {
    let mesh = Arc::new(create_unit_square_tri_mesh(2));
    let other_mesh = Arc::new(create_unit_square_tri_mesh(2));
    let p1 = scalar_space(&mesh, Family::Continuous, 1);
    let p2 = scalar_space(&mesh, Family::Continuous, 2);
    let kernel = AccumulationKernel::for_space(&p1);

    let source = DiscreteField::zeros(p1.clone());
    let mut output = DiscreteField::zeros(p1.clone());
    let mut wrong_extents = DiscreteField::zeros(p2);
    let result = CellLoopExecutor.run_kernel(
        &kernel,
        &dx(),
        &mut [
            (AccumulationKernel::OUTPUT, KernelArgument::Increment(&mut output)),
            (AccumulationKernel::WEIGHT, KernelArgument::Increment(&mut wrong_extents)),
            (AccumulationKernel::SOURCE, KernelArgument::Read(&source)),
        ],
    );
    match result {
        Err(KernelError::ExtentMismatch {
            binding,
            expected,
            actual,
        }) => {
            assert_eq!(binding, AccumulationKernel::WEIGHT);
            assert_eq!(expected, (3, 1));
            assert_eq!(actual, (6, 1));
        }
        other => panic!("expected extent mismatch, got {other:?}"),
    }
    assert_eq!(output.values().sum(), 0.0);

    let mut other = DiscreteField::zeros(scalar_space(&other_mesh, Family::Continuous, 1));
    let result = CellLoopExecutor.run_kernel(
        &kernel,
        &dx().with_domain(&mesh),
        &mut [(AccumulationKernel::OUTPUT, KernelArgument::Increment(&mut other))],
    );
    assert!(matches!(result, Err(KernelError::MeshMismatch { binding }) if binding == AccumulationKernel::OUTPUT));

    let result = CellLoopExecutor.run_kernel(
        &kernel,
        &dx(),
        &mut [
            (AccumulationKernel::SOURCE, KernelArgument::Read(&source)),
            (AccumulationKernel::SOURCE, KernelArgument::Increment(&mut output)),
        ],
    );
    assert!(matches!(result, Err(KernelError::DuplicateBinding { .. })));

    let result = CellLoopExecutor.run_kernel(&kernel, &dx(), &mut []);
    assert!(matches!(result, Err(KernelError::MissingDomain)));
}

#[test]
fn missing_bindings_fail_in_the_kernel() {
    let mesh = Arc::new(create_unit_interval_mesh(2));
    let space = scalar_space(&mesh, Family::Continuous, 1);
    let mut output = DiscreteField::zeros(space.clone());
    let mut weights = DiscreteField::zeros(space.clone());

    // The source is bound as an increment, but the kernel reads it
    let result = CellLoopExecutor.run_kernel(
        &AccumulationKernel::for_space(&space),
        &dx(),
        &mut [
            (AccumulationKernel::OUTPUT, KernelArgument::Increment(&mut output)),
            (AccumulationKernel::SOURCE, KernelArgument::Increment(&mut weights)),
        ],
    );
    assert!(matches!(result, Err(KernelError::Execution { .. })));
}
