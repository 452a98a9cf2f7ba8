//! Tree-walking reference backend.

use crate::ast::Operation;
use crate::bindings::Bindings;
use crate::error::{CalcError, CalcResult};
use crate::executor::{Executor, Formula};
use crate::numeric::Numeric;
use crate::registry::FunctionRegistry;
use crate::MAX_DIRECT_ARITY;
use smallvec::SmallVec;
use std::sync::Arc;

/// Evaluates an [`Operation`] tree directly, one node at a time.
///
/// Every other backend is tested against this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Interpreter
    }

    /// Recurses once per tree level; the [`Executor`] entry points check the depth first.
    pub fn evaluate<T: Numeric>(
        &self,
        operation: &Operation<T>,
        functions: &FunctionRegistry<T>,
        bindings: &Bindings<T>,
    ) -> CalcResult<T> {
        match operation {
            Operation::IntegerConstant(v) => Ok(T::from_i32(*v)),
            Operation::FloatingPointConstant(v) => Ok(*v),
            Operation::Variable(name) => bindings
                .get(name)
                .ok_or_else(|| CalcError::variable_not_defined(name)),
            Operation::Binary { op, left, right } => {
                let l = self.evaluate(left, functions, bindings)?;
                let r = self.evaluate(right, functions, bindings)?;
                Ok(op.apply(l, r)?)
            }
            Operation::UnaryMinus(operand) => {
                Ok(self.evaluate(operand, functions, bindings)?.negate()?)
            }
            Operation::Comparison { op, left, right } => {
                let l = self.evaluate(left, functions, bindings)?;
                let r = self.evaluate(right, functions, bindings)?;
                Ok(op.apply(l, r))
            }
            Operation::FunctionCall { name, arguments } => {
                let info = functions.resolve(name, arguments.len())?;
                let mut args: SmallVec<[T; MAX_DIRECT_ARITY]> =
                    SmallVec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument, functions, bindings)?);
                }
                info.invoke(&args)
            }
        }
    }

    /// Checks that every function the tree calls exists with a matching arity.
    pub fn validate<T: Numeric>(
        &self,
        operation: &Operation<T>,
        functions: &FunctionRegistry<T>,
    ) -> CalcResult<()> {
        match operation {
            Operation::IntegerConstant(_)
            | Operation::FloatingPointConstant(_)
            | Operation::Variable(_) => Ok(()),
            Operation::Binary { left, right, .. } | Operation::Comparison { left, right, .. } => {
                self.validate(left, functions)?;
                self.validate(right, functions)
            }
            Operation::UnaryMinus(operand) => self.validate(operand, functions),
            Operation::FunctionCall { name, arguments } => {
                functions.resolve(name, arguments.len())?;
                arguments
                    .iter()
                    .try_for_each(|argument| self.validate(argument, functions))
            }
        }
    }
}

impl<T: Numeric> Executor<T> for Interpreter {
    fn build_formula(
        &self,
        operation: Arc<Operation<T>>,
        functions: Arc<FunctionRegistry<T>>,
    ) -> CalcResult<Formula<T>> {
        operation.check_depth()?;
        self.validate(&operation, &functions)?;
        let interpreter = *self;
        Ok(Formula::new(move |bindings| {
            interpreter.evaluate(&operation, &functions, bindings)
        }))
    }

    fn execute(
        &self,
        operation: &Operation<T>,
        functions: &Arc<FunctionRegistry<T>>,
        bindings: &Bindings<T>,
    ) -> CalcResult<T> {
        operation.check_depth()?;
        self.evaluate(operation, functions, bindings)
    }
}
