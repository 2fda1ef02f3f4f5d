//! Local kernels executed over every cell of a mesh.
//!
//! A kernel sees the values of its arguments restricted to a single cell: one row per local node
//! and one column per value component. Read arguments are gathered from the global fields before
//! the kernel runs. Increment arguments start out as zero and are added back to the global fields
//! afterwards, so that contributions from cells sharing a node accumulate.
use crate::field::DiscreteField;
use crate::form::Measure;
use crate::space::FunctionSpace;
use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::error::Error;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    /// An argument's local extents differ from those the kernel was built for.
    #[error(
        "argument `{binding}` has local extents {actual:?} (nodes, components), but the kernel expects {expected:?}"
    )]
    ExtentMismatch {
        binding: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// An argument lives on a different mesh than the one iterated over.
    #[error("argument `{binding}` is not defined on the mesh of the loop")]
    MeshMismatch { binding: String },
    #[error("argument name `{name}` is bound more than once")]
    DuplicateBinding { name: String },
    /// The kernel asked for an argument that is not bound with the requested access.
    #[error("no argument `{name}` bound with {access:?} access")]
    UnknownBinding { name: String, access: Access },
    /// Neither the measure nor any argument determines a mesh to iterate over.
    #[error("cannot determine the mesh to iterate over")]
    MissingDomain,
    #[error("kernel failed on cell {cell}")]
    Execution {
        cell: usize,
        source: Box<dyn Error + Send + Sync>,
    },
}

/// How a kernel accesses an argument.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    Read,
    Increment,
}

/// A field bound to a kernel argument.
#[derive(Debug)]
pub enum KernelArgument<'a> {
    Read(&'a DiscreteField),
    Increment(&'a mut DiscreteField),
}

impl<'a> KernelArgument<'a> {
    pub fn access(&self) -> Access {
        match self {
            Self::Read(_) => Access::Read,
            Self::Increment(_) => Access::Increment,
        }
    }

    pub fn field(&self) -> &DiscreteField {
        match self {
            Self::Read(field) => field,
            Self::Increment(field) => field,
        }
    }
}

/// Cell-local values of the read arguments.
#[derive(Debug)]
pub struct LocalReads<'n> {
    entries: Vec<(&'n str, DMatrix<f64>)>,
}

impl<'n> LocalReads<'n> {
    pub fn get(&self, name: &str) -> Result<&DMatrix<f64>, KernelError> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, values)| values)
            .ok_or_else(|| KernelError::UnknownBinding {
                name: name.to_string(),
                access: Access::Read,
            })
    }
}

/// Cell-local increments of the increment arguments. All entries start out as zero.
#[derive(Debug)]
pub struct LocalIncrements<'n> {
    entries: Vec<(&'n str, DMatrix<f64>)>,
}

impl<'n> LocalIncrements<'n> {
    pub fn get_mut(&mut self, name: &str) -> Result<&mut DMatrix<f64>, KernelError> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| *entry == name)
            .map(|(_, values)| values)
            .ok_or_else(|| KernelError::UnknownBinding {
                name: name.to_string(),
                access: Access::Increment,
            })
    }
}

pub trait LocalKernel: Send + Sync {
    /// The local extents `(nodes, components)` every argument must have.
    fn extents(&self) -> (usize, usize);

    fn execute(&self, cell: usize, reads: &LocalReads, increments: &mut LocalIncrements) -> eyre::Result<()>;
}

/// Runs local kernels over all cells of a mesh.
pub trait KernelExecutor: Send + Sync + Debug {
    /// Runs `kernel` once per cell of the measure's domain.
    ///
    /// Without an explicit domain on the measure, the mesh of the first argument is used.
    fn run_kernel(
        &self,
        kernel: &dyn LocalKernel,
        measure: &Measure,
        arguments: &mut [(&str, KernelArgument)],
    ) -> Result<(), KernelError>;
}

/// Fails unless the local extents of `space` are those the kernel expects.
pub fn check_extents(kernel: &dyn LocalKernel, binding: &str, space: &FunctionSpace) -> Result<(), KernelError> {
    let expected = kernel.extents();
    let actual = (space.local_dof_count(), space.local_component_count());
    if actual == expected {
        Ok(())
    } else {
        Err(KernelError::ExtentMismatch {
            binding: binding.to_string(),
            expected,
            actual,
        })
    }
}

/// Executes kernels on all cells in parallel and scatters increments serially.
#[derive(Debug, Default, Copy, Clone)]
pub struct CellLoopExecutor;

impl KernelExecutor for CellLoopExecutor {
    fn run_kernel(
        &self,
        kernel: &dyn LocalKernel,
        measure: &Measure,
        arguments: &mut [(&str, KernelArgument)],
    ) -> Result<(), KernelError> {
        let mesh = match measure.domain() {
            Some(mesh) => mesh.clone(),
            None => arguments
                .first()
                .map(|(_, argument)| argument.field().space().mesh().clone())
                .ok_or(KernelError::MissingDomain)?,
        };

        if let Some(name) = arguments.iter().map(|(name, _)| *name).duplicates().next() {
            return Err(KernelError::DuplicateBinding { name: name.to_string() });
        }

        let extents = kernel.extents();
        for (name, argument) in arguments.iter() {
            let space = argument.field().space();
            if !space.is_on_mesh(&mesh) {
                return Err(KernelError::MeshMismatch {
                    binding: name.to_string(),
                });
            }
            check_extents(kernel, name, space)?;
        }

        let reads: Vec<(&str, &DiscreteField)> = arguments
            .iter()
            .filter_map(|(name, argument)| match argument {
                KernelArgument::Read(field) => Some((*name, &**field)),
                KernelArgument::Increment(_) => None,
            })
            .collect();
        let increment_names: Vec<&str> = arguments
            .iter()
            .filter(|(_, argument)| argument.access() == Access::Increment)
            .map(|(name, _)| *name)
            .collect();

        debug!(
            "Running kernel over {} cells with {} read and {} increment arguments",
            mesh.num_cells(),
            reads.len(),
            increment_names.len()
        );

        let local_increments = (0..mesh.num_cells())
            .into_par_iter()
            .map(|cell| {
                let local_reads = LocalReads {
                    entries: reads
                        .iter()
                        .map(|(name, field)| {
                            let mut values = DMatrix::zeros(extents.0, extents.1);
                            field.gather_cell_values(cell, &mut values);
                            (*name, values)
                        })
                        .collect(),
                };
                let mut increments = LocalIncrements {
                    entries: increment_names
                        .iter()
                        .map(|name| (*name, DMatrix::zeros(extents.0, extents.1)))
                        .collect(),
                };
                kernel
                    .execute(cell, &local_reads, &mut increments)
                    .map_err(|err| KernelError::Execution {
                        cell,
                        source: err.into(),
                    })?;
                Ok(increments.entries)
            })
            .collect::<Result<Vec<_>, KernelError>>()?;

        for (cell, entries) in local_increments.into_iter().enumerate() {
            let mut entries = entries.into_iter();
            for (_, argument) in arguments.iter_mut() {
                if let KernelArgument::Increment(field) = argument {
                    if let Some((_, local_values)) = entries.next() {
                        field.add_cell_values(cell, &local_values);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Accumulates cell-local source values and visit counts.
///
/// For every cell, adds the local source values to the output and one to every local weight.
/// Afterwards each output entry holds the sum of the source values over the cells sharing the
/// node, and each weight entry the number of such cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccumulationKernel {
    local_nodes: usize,
    components: usize,
}

impl AccumulationKernel {
    pub const SOURCE: &'static str = "source";
    pub const OUTPUT: &'static str = "output";
    pub const WEIGHT: &'static str = "weight";

    pub fn new(local_nodes: usize, components: usize) -> Self {
        Self {
            local_nodes,
            components,
        }
    }

    /// A kernel with the local extents of the given space.
    pub fn for_space(space: &FunctionSpace) -> Self {
        Self::new(space.local_dof_count(), space.local_component_count())
    }
}

impl LocalKernel for AccumulationKernel {
    fn extents(&self) -> (usize, usize) {
        (self.local_nodes, self.components)
    }

    fn execute(&self, _cell: usize, reads: &LocalReads, increments: &mut LocalIncrements) -> eyre::Result<()> {
        let source = reads.get(Self::SOURCE)?;
        *increments.get_mut(Self::OUTPUT)? += source;
        increments.get_mut(Self::WEIGHT)?.add_scalar_mut(1.0);
        Ok(())
    }
}
