//! Post-order stack program backend.

mod compiler;
mod program;
mod vm;

pub use compiler::BytecodeCompiler;
pub use program::{FuncRef, Instruction, OpCode, Program};
pub use vm::Vm;

use crate::ast::Operation;
use crate::error::CalcResult;
use crate::executor::{Executor, Formula};
use crate::numeric::Numeric;
use crate::registry::FunctionRegistry;
use std::sync::Arc;

impl<T: Numeric> Executor<T> for BytecodeCompiler {
    fn build_formula(
        &self,
        operation: Arc<Operation<T>>,
        functions: Arc<FunctionRegistry<T>>,
    ) -> CalcResult<Formula<T>> {
        let program = self.compile(&operation, &functions)?;
        let vm = Vm::new();
        Ok(Formula::new(move |bindings| vm.eval(&program, bindings)))
    }
}
