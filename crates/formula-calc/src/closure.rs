//! Closure-graph backend.
//!
//! The tree is translated once into nested boxed closures. Operator selection, variable-name
//! case folding and function resolution all happen while building, so evaluating a compiled
//! formula is a straight chain of indirect calls with no matching on node kinds.

use crate::ast::{BinaryOp, CompareOp, Operation};
use crate::bindings::{fold_case, Bindings};
use crate::error::{CalcError, CalcResult};
use crate::executor::{Executor, Formula};
use crate::numeric::Numeric;
use crate::registry::{Callable, FunctionRegistry};
use crate::MAX_DIRECT_ARITY;
use smallvec::SmallVec;
use std::sync::Arc;

/// A compiled sub-expression.
pub type CompiledNode<T> = Box<dyn Fn(&Bindings<T>) -> CalcResult<T> + Send + Sync>;

#[derive(Clone, Copy, Debug, Default)]
pub struct ClosureCompiler;

impl ClosureCompiler {
    pub fn new() -> Self {
        ClosureCompiler
    }

    /// Fails with [`CalcError::TooDeep`] for trees deeper than [`crate::ast::MAX_DEPTH`].
    pub fn compile<T: Numeric>(
        &self,
        operation: &Operation<T>,
        functions: &FunctionRegistry<T>,
    ) -> CalcResult<CompiledNode<T>> {
        operation.check_depth()?;
        self.compile_node(operation, functions)
    }

    fn compile_node<T: Numeric>(
        &self,
        operation: &Operation<T>,
        functions: &FunctionRegistry<T>,
    ) -> CalcResult<CompiledNode<T>> {
        match operation {
            Operation::IntegerConstant(v) => {
                let value = T::from_i32(*v);
                Ok(Box::new(move |_| Ok(value)))
            }
            Operation::FloatingPointConstant(v) => {
                let value = *v;
                Ok(Box::new(move |_| Ok(value)))
            }
            Operation::Variable(name) => {
                let key = fold_case(name).into_owned();
                let name = name.clone();
                Ok(Box::new(move |bindings| {
                    bindings
                        .get_folded(&key)
                        .ok_or_else(|| CalcError::variable_not_defined(&name))
                }))
            }
            Operation::Binary { op, left, right } => {
                let left = self.compile_node(left, functions)?;
                let right = self.compile_node(right, functions)?;
                Ok(binary(*op, left, right))
            }
            Operation::UnaryMinus(operand) => {
                let operand = self.compile_node(operand, functions)?;
                Ok(Box::new(move |bindings| Ok(operand(bindings)?.negate()?)))
            }
            Operation::Comparison { op, left, right } => {
                let left = self.compile_node(left, functions)?;
                let right = self.compile_node(right, functions)?;
                Ok(comparison(*op, left, right))
            }
            Operation::FunctionCall { name, arguments } => {
                let info = functions.resolve(name, arguments.len())?;
                let args = arguments
                    .iter()
                    .map(|argument| self.compile_node(argument, functions))
                    .collect::<CalcResult<Vec<_>>>()?;
                call(&info.name, info.callable.clone(), args)
            }
        }
    }
}

fn binary<T: Numeric>(op: BinaryOp, l: CompiledNode<T>, r: CompiledNode<T>) -> CompiledNode<T> {
    match op {
        BinaryOp::Add => Box::new(move |b| Ok(l(b)?.add(r(b)?)?)),
        BinaryOp::Subtract => Box::new(move |b| Ok(l(b)?.subtract(r(b)?)?)),
        BinaryOp::Multiply => Box::new(move |b| Ok(l(b)?.multiply(r(b)?)?)),
        BinaryOp::Divide => Box::new(move |b| Ok(l(b)?.divide(r(b)?)?)),
        BinaryOp::Modulo => Box::new(move |b| Ok(l(b)?.modulo(r(b)?)?)),
        BinaryOp::Power => Box::new(move |b| Ok(l(b)?.power(r(b)?)?)),
    }
}

fn comparison<T: Numeric>(
    op: CompareOp,
    l: CompiledNode<T>,
    r: CompiledNode<T>,
) -> CompiledNode<T> {
    match op {
        CompareOp::LessThan => Box::new(move |b| Ok(l(b)?.less_than(r(b)?))),
        CompareOp::LessOrEqual => Box::new(move |b| Ok(l(b)?.less_or_equal(r(b)?))),
        CompareOp::GreaterThan => Box::new(move |b| Ok(l(b)?.greater_than(r(b)?))),
        CompareOp::GreaterOrEqual => Box::new(move |b| Ok(l(b)?.greater_or_equal(r(b)?))),
        CompareOp::Equal => Box::new(move |b| Ok(l(b)?.equal(r(b)?))),
        CompareOp::NotEqual => Box::new(move |b| Ok(l(b)?.not_equal(r(b)?))),
    }
}

fn take<T, const N: usize>(
    name: &str,
    args: Vec<CompiledNode<T>>,
) -> CalcResult<[CompiledNode<T>; N]> {
    let found = args.len();
    args.try_into().map_err(|_| CalcError::ArityMismatch {
        name: name.to_string(),
        expected: N,
        found,
    })
}

/// Binds the callable's positional shape to the compiled argument closures.
fn call<T: Numeric>(
    name: &str,
    callable: Callable<T>,
    args: Vec<CompiledNode<T>>,
) -> CalcResult<CompiledNode<T>> {
    Ok(match callable {
        Callable::Nullary(f) => {
            take::<T, 0>(name, args)?;
            Box::new(move |_| f())
        }
        Callable::Unary(f) => {
            let [a] = take::<T, 1>(name, args)?;
            Box::new(move |b| f(a(b)?))
        }
        Callable::Binary(f) => {
            let [a1, a2] = take::<T, 2>(name, args)?;
            Box::new(move |b| f(a1(b)?, a2(b)?))
        }
        Callable::Ternary(f) => {
            let [a1, a2, a3] = take::<T, 3>(name, args)?;
            Box::new(move |b| f(a1(b)?, a2(b)?, a3(b)?))
        }
        Callable::Quaternary(f) => {
            let [a1, a2, a3, a4] = take::<T, 4>(name, args)?;
            Box::new(move |b| f(a1(b)?, a2(b)?, a3(b)?, a4(b)?))
        }
        Callable::Quinary(f) => {
            let [a1, a2, a3, a4, a5] = take::<T, 5>(name, args)?;
            Box::new(move |b| f(a1(b)?, a2(b)?, a3(b)?, a4(b)?, a5(b)?))
        }
        Callable::Senary(f) => {
            let [a1, a2, a3, a4, a5, a6] = take::<T, 6>(name, args)?;
            Box::new(move |b| f(a1(b)?, a2(b)?, a3(b)?, a4(b)?, a5(b)?, a6(b)?))
        }
        Callable::Slice(f) => Box::new(move |b| {
            let mut values: SmallVec<[T; MAX_DIRECT_ARITY]> = SmallVec::with_capacity(args.len());
            for arg in &args {
                values.push(arg(b)?);
            }
            f(&values)
        }),
    })
}

impl<T: Numeric> Executor<T> for ClosureCompiler {
    fn build_formula(
        &self,
        operation: Arc<Operation<T>>,
        functions: Arc<FunctionRegistry<T>>,
    ) -> CalcResult<Formula<T>> {
        // Callables are cloned into the closures; the registry snapshot is not retained.
        let root = self.compile(&operation, &functions)?;
        Ok(Formula::new(root))
    }
}
