//! A small form language for the bilinear and linear forms of projection problems.
//!
//! Source expressions are built from discrete fields and constants with sums, scalings,
//! products, inner products and component extraction. Forms are built by integrating the
//! inner product of a test function with a trial function or an expression over a cell measure:
//!
//! ```ignore
//! let a = inner(&test, &trial) * dx();
//! let l = inner(&test, source) * dx();
//! let equation = a.equals(l);
//! ```
use crate::field::DiscreteField;
use crate::mesh::Mesh;
use crate::space::{FunctionSpace, ValueShape};
use nalgebra::DVectorViewMut;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormError {
    /// Operands of a binary operation have incompatible value shapes.
    #[error("cannot form {operation} of expressions with shapes {left} and {right}")]
    IncompatibleShapes {
        operation: &'static str,
        left: ValueShape,
        right: ValueShape,
    },
    /// A constant whose number of values does not match its shape.
    #[error("constant of shape {shape} needs {expected} values, but has {actual}")]
    InvalidConstant {
        shape: ValueShape,
        expected: usize,
        actual: usize,
    },
    /// A component index out of range, or component extraction from a scalar.
    #[error("cannot extract component {index} from an expression of shape {shape}")]
    InvalidComponent { index: usize, shape: ValueShape },
    /// Test and trial functions of an equation live in different spaces.
    #[error("test and trial functions must belong to the same function space")]
    ArgumentSpaceMismatch,
    /// The integration domain, or a coefficient, is not on the mesh of the arguments.
    #[error("form integrates over a different mesh than the one its arguments live on")]
    DomainMismatch,
    /// The integrand of a linear form does not match the shape of the test function.
    #[error("source expression has shape {actual}, but the test function has shape {expected}")]
    SourceShapeMismatch { expected: ValueShape, actual: ValueShape },
}

/// A source expression built from discrete fields and constants.
#[derive(Debug, Clone)]
pub enum Expr {
    Coefficient(DiscreteField),
    Constant { values: Vec<f64>, shape: ValueShape },
    Sum(Box<Expr>, Box<Expr>),
    Scaled(f64, Box<Expr>),
    /// Product where at least one factor is scalar.
    Product(Box<Expr>, Box<Expr>),
    /// Full contraction of two expressions of equal shape.
    Inner(Box<Expr>, Box<Expr>),
    /// A single component, counted in row-major order.
    Component(Box<Expr>, usize),
}

impl Expr {
    pub fn coefficient(field: DiscreteField) -> Self {
        Self::Coefficient(field)
    }

    pub fn constant(values: impl Into<Vec<f64>>, shape: ValueShape) -> Self {
        Self::Constant {
            values: values.into(),
            shape,
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self::constant(vec![value], ValueShape::scalar())
    }

    pub fn component(self, index: usize) -> Self {
        Self::Component(Box::new(self), index)
    }

    /// Determines the value shape, checking every operation along the way.
    pub fn value_shape(&self) -> Result<ValueShape, FormError> {
        match self {
            Self::Coefficient(field) => Ok(field.value_shape().clone()),
            Self::Constant { values, shape } => {
                if values.len() != shape.num_components() {
                    return Err(FormError::InvalidConstant {
                        shape: shape.clone(),
                        expected: shape.num_components(),
                        actual: values.len(),
                    });
                }
                Ok(shape.clone())
            }
            Self::Sum(a, b) => {
                let (left, right) = (a.value_shape()?, b.value_shape()?);
                if left != right {
                    return Err(FormError::IncompatibleShapes {
                        operation: "sum",
                        left,
                        right,
                    });
                }
                Ok(left)
            }
            Self::Scaled(_, a) => a.value_shape(),
            Self::Product(a, b) => {
                let (left, right) = (a.value_shape()?, b.value_shape()?);
                if left.is_scalar() {
                    Ok(right)
                } else if right.is_scalar() {
                    Ok(left)
                } else {
                    Err(FormError::IncompatibleShapes {
                        operation: "product",
                        left,
                        right,
                    })
                }
            }
            Self::Inner(a, b) => {
                let (left, right) = (a.value_shape()?, b.value_shape()?);
                if left != right {
                    return Err(FormError::IncompatibleShapes {
                        operation: "inner product",
                        left,
                        right,
                    });
                }
                Ok(ValueShape::scalar())
            }
            Self::Component(a, index) => {
                let shape = a.value_shape()?;
                if shape.is_scalar() || *index >= shape.num_components() {
                    return Err(FormError::InvalidComponent { index: *index, shape });
                }
                Ok(ValueShape::scalar())
            }
        }
    }

    /// Polynomial degree used to pick quadrature for integrals involving the expression.
    pub fn estimated_degree(&self) -> usize {
        match self {
            Self::Coefficient(field) => field.space().element().max_total_degree(),
            Self::Constant { .. } => 0,
            Self::Sum(a, b) => a.estimated_degree().max(b.estimated_degree()),
            Self::Scaled(_, a) | Self::Component(a, _) => a.estimated_degree(),
            Self::Product(a, b) | Self::Inner(a, b) => a.estimated_degree() + b.estimated_degree(),
        }
    }

    /// All discrete fields the expression depends on.
    pub fn coefficients(&self) -> Vec<&DiscreteField> {
        let mut fields = Vec::new();
        self.collect_coefficients(&mut fields);
        fields
    }

    fn collect_coefficients<'a>(&'a self, fields: &mut Vec<&'a DiscreteField>) {
        match self {
            Self::Coefficient(field) => fields.push(field),
            Self::Constant { .. } => {}
            Self::Scaled(_, a) | Self::Component(a, _) => a.collect_coefficients(fields),
            Self::Sum(a, b) | Self::Product(a, b) | Self::Inner(a, b) => {
                a.collect_coefficients(fields);
                b.collect_coefficients(fields);
            }
        }
    }

    /// The field this expression consists of, if it is a single coefficient.
    pub fn as_coefficient(&self) -> Option<&DiscreteField> {
        match self {
            Self::Coefficient(field) => Some(field),
            _ => None,
        }
    }

    /// Mutable values of the single coefficient this expression consists of, if any.
    pub fn coefficient_values_mut(&mut self) -> Option<DVectorViewMut<'_, f64>> {
        match self {
            Self::Coefficient(field) => Some(field.values_mut()),
            _ => None,
        }
    }

    /// Mutable values of the first coefficient with the given name.
    pub fn named_coefficient_values_mut(&mut self, name: &str) -> Option<DVectorViewMut<'_, f64>> {
        self.find_coefficient_mut(name).map(|field| field.values_mut())
    }

    fn find_coefficient_mut(&mut self, name: &str) -> Option<&mut DiscreteField> {
        match self {
            Self::Coefficient(field) if field.name() == Some(name) => Some(field),
            Self::Coefficient(_) | Self::Constant { .. } => None,
            Self::Scaled(_, a) | Self::Component(a, _) => a.find_coefficient_mut(name),
            Self::Sum(a, b) | Self::Product(a, b) | Self::Inner(a, b) => {
                match a.find_coefficient_mut(name) {
                    Some(field) => Some(field),
                    None => b.find_coefficient_mut(name),
                }
            }
        }
    }

    /// Evaluates the expression at reference coordinates `xi` of a cell.
    ///
    /// The expression must have a valid shape, every coefficient must live on the mesh the cell
    /// belongs to, and `values` must have one entry per component. Allocates its scratch space,
    /// see [`evaluate_in_cell_with`](Self::evaluate_in_cell_with) for repeated evaluation.
    pub fn evaluate_in_cell(&self, cell: usize, xi: &[f64], values: &mut [f64]) {
        self.evaluate_in_cell_with(&mut EvaluationWorkspace::default(), cell, xi, values);
    }

    /// Evaluates the expression like [`evaluate_in_cell`](Self::evaluate_in_cell), using the
    /// buffers of `workspace`. Once the buffers have grown to fit the expression, evaluation
    /// does not allocate.
    pub fn evaluate_in_cell_with(
        &self,
        workspace: &mut EvaluationWorkspace,
        cell: usize,
        xi: &[f64],
        values: &mut [f64],
    ) {
        workspace.stack.clear();
        self.push_value(workspace, cell, xi);
        values.copy_from_slice(&workspace.stack);
    }

    /// Pushes the components of the value at `xi` onto the workspace stack.
    ///
    /// Operands are evaluated onto the stack first, so their component counts follow from the
    /// stack length and no shapes need to be computed.
    fn push_value(&self, ws: &mut EvaluationWorkspace, cell: usize, xi: &[f64]) {
        let base = ws.stack.len();
        match self {
            Self::Coefficient(field) => {
                let space = field.space();
                ws.basis.resize(space.local_dof_count(), 0.0);
                ws.stack.resize(base + space.local_component_count(), 0.0);
                field.evaluate_in_cell(cell, xi, &mut ws.basis, &mut ws.stack[base..]);
            }
            Self::Constant { values, .. } => ws.stack.extend_from_slice(values),
            Self::Sum(a, b) => {
                a.push_value(ws, cell, xi);
                let mid = ws.stack.len();
                b.push_value(ws, cell, xi);
                for i in 0..mid - base {
                    ws.stack[base + i] += ws.stack[mid + i];
                }
                ws.stack.truncate(mid);
            }
            Self::Scaled(alpha, a) => {
                a.push_value(ws, cell, xi);
                ws.stack[base..].iter_mut().for_each(|v| *v *= alpha);
            }
            Self::Product(a, b) => {
                a.push_value(ws, cell, xi);
                let mid = ws.stack.len();
                b.push_value(ws, cell, xi);
                let end = ws.stack.len();
                let factor = if mid - base == 1 {
                    let factor = ws.stack[base];
                    ws.stack.copy_within(mid..end, base);
                    ws.stack.truncate(base + end - mid);
                    factor
                } else {
                    let factor = ws.stack[mid];
                    ws.stack.truncate(mid);
                    factor
                };
                ws.stack[base..].iter_mut().for_each(|v| *v *= factor);
            }
            Self::Inner(a, b) => {
                a.push_value(ws, cell, xi);
                let mid = ws.stack.len();
                b.push_value(ws, cell, xi);
                let dot = (0..mid - base)
                    .map(|i| ws.stack[base + i] * ws.stack[mid + i])
                    .sum();
                ws.stack.truncate(base);
                ws.stack.push(dot);
            }
            Self::Component(a, index) => {
                a.push_value(ws, cell, xi);
                let value = ws.stack[base + index];
                ws.stack.truncate(base);
                ws.stack.push(value);
            }
        }
    }
}

/// Scratch buffers for evaluating expressions at many points.
#[derive(Debug, Clone, Default)]
pub struct EvaluationWorkspace {
    stack: Vec<f64>,
    basis: Vec<f64>,
}

impl From<DiscreteField> for Expr {
    fn from(field: DiscreteField) -> Self {
        Self::Coefficient(field)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Sum(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Scaled(-1.0, Box::new(self))
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Product(Box::new(self), Box::new(rhs))
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Scaled(self, Box::new(rhs))
    }
}

impl Mul<f64> for Expr {
    type Output = Expr;

    fn mul(self, rhs: f64) -> Expr {
        Expr::Scaled(rhs, Box::new(self))
    }
}

/// The test function of a function space.
#[derive(Debug, Clone)]
pub struct TestFunction {
    space: Arc<FunctionSpace>,
}

/// The trial function of a function space.
#[derive(Debug, Clone)]
pub struct TrialFunction {
    space: Arc<FunctionSpace>,
}

impl TestFunction {
    pub fn new(space: Arc<FunctionSpace>) -> Self {
        Self { space }
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }
}

impl TrialFunction {
    pub fn new(space: Arc<FunctionSpace>) -> Self {
        Self { space }
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }
}

/// Integration over all cells of a mesh.
#[derive(Debug, Clone, Default)]
pub struct Measure {
    domain: Option<Arc<Mesh>>,
}

/// The cell measure. Without an explicit domain, integration happens over the mesh of the
/// form arguments.
pub fn dx() -> Measure {
    Measure::default()
}

impl Measure {
    pub fn with_domain(mut self, mesh: &Arc<Mesh>) -> Self {
        self.domain = Some(mesh.clone());
        self
    }

    pub fn domain(&self) -> Option<&Arc<Mesh>> {
        self.domain.as_ref()
    }
}

/// Inner products between form arguments and expressions.
pub trait Inner<Rhs> {
    type Output;

    fn inner(self, rhs: Rhs) -> Self::Output;
}

pub fn inner<A, B>(a: A, b: B) -> A::Output
where
    A: Inner<B>,
{
    a.inner(b)
}

/// `inner(test, trial)`, awaiting a measure.
#[derive(Debug, Clone)]
pub struct BilinearIntegrand {
    test: TestFunction,
    trial: TrialFunction,
}

/// `inner(test, source)`, awaiting a measure.
#[derive(Debug, Clone)]
pub struct LinearIntegrand {
    test: TestFunction,
    source: Expr,
}

impl<'a, 'b> Inner<&'b TrialFunction> for &'a TestFunction {
    type Output = BilinearIntegrand;

    fn inner(self, trial: &'b TrialFunction) -> BilinearIntegrand {
        BilinearIntegrand {
            test: self.clone(),
            trial: trial.clone(),
        }
    }
}

impl<'a> Inner<Expr> for &'a TestFunction {
    type Output = LinearIntegrand;

    fn inner(self, source: Expr) -> LinearIntegrand {
        LinearIntegrand {
            test: self.clone(),
            source,
        }
    }
}

impl Inner<Expr> for Expr {
    type Output = Expr;

    fn inner(self, rhs: Expr) -> Expr {
        Expr::Inner(Box::new(self), Box::new(rhs))
    }
}

/// The bilinear form `a(v, u) = ∫ inner(v, u) dx`.
#[derive(Debug, Clone)]
pub struct BilinearForm {
    test: TestFunction,
    trial: TrialFunction,
    measure: Measure,
}

/// The linear form `L(v) = ∫ inner(v, f) dx`.
#[derive(Debug, Clone)]
pub struct LinearForm {
    test: TestFunction,
    source: Expr,
    measure: Measure,
}

impl Mul<Measure> for BilinearIntegrand {
    type Output = BilinearForm;

    fn mul(self, measure: Measure) -> BilinearForm {
        BilinearForm {
            test: self.test,
            trial: self.trial,
            measure,
        }
    }
}

impl Mul<Measure> for LinearIntegrand {
    type Output = LinearForm;

    fn mul(self, measure: Measure) -> LinearForm {
        LinearForm {
            test: self.test,
            source: self.source,
            measure,
        }
    }
}

impl BilinearForm {
    pub fn test(&self) -> &TestFunction {
        &self.test
    }

    pub fn trial(&self) -> &TrialFunction {
        &self.trial
    }

    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// The equation `a == l`.
    pub fn equals(self, rhs: LinearForm) -> Equation {
        Equation { lhs: self, rhs }
    }
}

impl LinearForm {
    pub fn test(&self) -> &TestFunction {
        &self.test
    }

    pub fn source(&self) -> &Expr {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut Expr {
        &mut self.source
    }

    pub fn measure(&self) -> &Measure {
        &self.measure
    }
}

/// A linear variational equation `a(v, u) = L(v)` for all test functions `v`.
#[derive(Debug, Clone)]
pub struct Equation {
    lhs: BilinearForm,
    rhs: LinearForm,
}

impl Equation {
    pub fn lhs(&self) -> &BilinearForm {
        &self.lhs
    }

    pub fn rhs(&self) -> &LinearForm {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut LinearForm {
        &mut self.rhs
    }

    /// The space the solution lives in.
    pub fn space(&self) -> &Arc<FunctionSpace> {
        self.lhs.trial.space()
    }

    /// Checks that arguments, measures and source are consistent.
    pub fn validate(&self) -> Result<(), FormError> {
        let space = self.space();
        if !self.lhs.test.space().is_same_space(space) || !self.rhs.test.space().is_same_space(space) {
            return Err(FormError::ArgumentSpaceMismatch);
        }

        for measure in [&self.lhs.measure, &self.rhs.measure] {
            if let Some(domain) = measure.domain() {
                if !space.is_on_mesh(domain) {
                    return Err(FormError::DomainMismatch);
                }
            }
        }

        let source_shape = self.rhs.source.value_shape()?;
        if &source_shape != space.value_shape() {
            return Err(FormError::SourceShapeMismatch {
                expected: space.value_shape().clone(),
                actual: source_shape,
            });
        }

        if self
            .rhs
            .source
            .coefficients()
            .iter()
            .any(|field| !space.is_on_mesh(field.space().mesh()))
        {
            return Err(FormError::DomainMismatch);
        }

        Ok(())
    }
}
