use crate::ast::Operation;
use crate::bindings::Bindings;
use crate::interpreter::Interpreter;
use crate::numeric::Numeric;
use crate::registry::FunctionRegistry;
use log::trace;

/// Rewrites an operation tree before it is built.
///
/// Implementations must not change the value (or error) the tree evaluates to. The engine only
/// passes trees within [`crate::ast::MAX_DEPTH`], and [`ConstantFolder`] recurses per level, so
/// callers invoking it directly must check the depth first.
pub trait Optimizer<T>: Send + Sync {
    fn optimize(&self, operation: Operation<T>, functions: &FunctionRegistry<T>) -> Operation<T>;
}

/// Replaces constant sub-trees by their value.
///
/// A sub-tree whose evaluation fails is kept as is, so the error still surfaces when the formula
/// runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantFolder;

impl ConstantFolder {
    pub fn new() -> Self {
        ConstantFolder
    }

    fn fold<T: Numeric>(&self, operation: Operation<T>, functions: &FunctionRegistry<T>) -> Operation<T> {
        if operation.is_leaf() {
            return operation;
        }
        if operation.is_idempotent() {
            return match Interpreter.evaluate(&operation, functions, &Bindings::new()) {
                Ok(value) => {
                    trace!("folded {operation} to {value}");
                    Operation::FloatingPointConstant(value)
                }
                // Leave the children folded where possible.
                Err(_) => self.fold_children(operation, functions),
            };
        }
        self.fold_children(operation, functions)
    }

    fn fold_children<T: Numeric>(
        &self,
        operation: Operation<T>,
        functions: &FunctionRegistry<T>,
    ) -> Operation<T> {
        match operation {
            Operation::Binary { op, left, right } => Operation::Binary {
                op,
                left: Box::new(self.fold(*left, functions)),
                right: Box::new(self.fold(*right, functions)),
            },
            Operation::Comparison { op, left, right } => Operation::Comparison {
                op,
                left: Box::new(self.fold(*left, functions)),
                right: Box::new(self.fold(*right, functions)),
            },
            Operation::UnaryMinus(operand) => {
                Operation::UnaryMinus(Box::new(self.fold(*operand, functions)))
            }
            Operation::FunctionCall { name, arguments } => Operation::FunctionCall {
                name,
                arguments: arguments
                    .into_iter()
                    .map(|argument| self.fold(argument, functions))
                    .collect(),
            },
            leaf @ (Operation::IntegerConstant(_)
            | Operation::FloatingPointConstant(_)
            | Operation::Variable(_)) => leaf,
        }
    }
}

impl<T: Numeric> Optimizer<T> for ConstantFolder {
    fn optimize(&self, operation: Operation<T>, functions: &FunctionRegistry<T>) -> Operation<T> {
        self.fold(operation, functions)
    }
}
