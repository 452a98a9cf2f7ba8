use super::program::{FuncRef, Instruction, OpCode, Program};
use crate::ast::{BinaryOp, CompareOp, Operation};
use crate::bindings::fold_case;
use crate::error::{CalcError, CalcResult};
use crate::numeric::Numeric;
use crate::registry::FunctionRegistry;
use ahash::AHashMap;
use std::sync::Arc;

/// Lowers an operation tree into a post-order [`Program`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BytecodeCompiler;

impl BytecodeCompiler {
    pub fn new() -> Self {
        BytecodeCompiler
    }

    pub fn compile<T: Numeric>(
        &self,
        operation: &Operation<T>,
        functions: &FunctionRegistry<T>,
    ) -> CalcResult<Program<T>> {
        operation.check_depth()?;
        let mut program = Program::new();
        let mut ctx = CompileCtx::new(&mut program, functions);
        ctx.compile_expr(operation)?;
        let max_stack = ctx.max_depth;
        program.max_stack = max_stack;
        Ok(program)
    }
}

struct CompileCtx<'a, T> {
    program: &'a mut Program<T>,
    functions: &'a FunctionRegistry<T>,
    var_slots: AHashMap<Arc<str>, u32>,
    func_slots: AHashMap<Arc<str>, u32>,
    depth: usize,
    max_depth: usize,
}

impl<'a, T: Numeric> CompileCtx<'a, T> {
    fn new(program: &'a mut Program<T>, functions: &'a FunctionRegistry<T>) -> Self {
        Self {
            program,
            functions,
            var_slots: AHashMap::new(),
            func_slots: AHashMap::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Appends `inst`, which pops `pops` values and pushes one.
    fn emit(&mut self, inst: Instruction, pops: usize) {
        self.program.instrs.push(inst);
        self.depth = self.depth - pops + 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn push_const(&mut self, value: T) -> CalcResult<()> {
        let idx = operand(self.program.consts.len())?;
        self.program.consts.push(value);
        self.emit(Instruction::new(OpCode::PushConst, idx, 0), 0);
        Ok(())
    }

    fn intern_var(&mut self, name: &str) -> CalcResult<u32> {
        let folded: Arc<str> = Arc::from(fold_case(name).as_ref());
        if let Some(idx) = self.var_slots.get(&folded) {
            return Ok(*idx);
        }
        let idx = operand(self.program.vars.len())?;
        self.program
            .vars
            .push((Arc::clone(&folded), Arc::from(name)));
        self.var_slots.insert(folded, idx);
        Ok(idx)
    }

    fn intern_func(&mut self, name: &str, argc: usize) -> CalcResult<u32> {
        let info = self.functions.resolve(name, argc)?;
        let key: Arc<str> = Arc::from(info.name.as_str());
        if let Some(idx) = self.func_slots.get(&key) {
            return Ok(*idx);
        }
        let idx = operand(self.program.funcs.len())?;
        self.program.funcs.push(FuncRef {
            name: Arc::clone(&key),
            callable: info.callable.clone(),
        });
        self.func_slots.insert(key, idx);
        Ok(idx)
    }

    fn compile_expr(&mut self, expr: &Operation<T>) -> CalcResult<()> {
        match expr {
            Operation::IntegerConstant(v) => self.push_const(T::from_i32(*v))?,
            Operation::FloatingPointConstant(v) => self.push_const(*v)?,
            Operation::Variable(name) => {
                let idx = self.intern_var(name)?;
                self.emit(Instruction::new(OpCode::LoadVar, idx, 0), 0);
            }
            Operation::UnaryMinus(operand) => {
                self.compile_expr(operand)?;
                self.emit(Instruction::new(OpCode::Neg, 0, 0), 1);
            }
            Operation::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let opcode = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Subtract => OpCode::Sub,
                    BinaryOp::Multiply => OpCode::Mul,
                    BinaryOp::Divide => OpCode::Div,
                    BinaryOp::Modulo => OpCode::Mod,
                    BinaryOp::Power => OpCode::Pow,
                };
                self.emit(Instruction::new(opcode, 0, 0), 2);
            }
            Operation::Comparison { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let opcode = match op {
                    CompareOp::LessThan => OpCode::Lt,
                    CompareOp::LessOrEqual => OpCode::Le,
                    CompareOp::GreaterThan => OpCode::Gt,
                    CompareOp::GreaterOrEqual => OpCode::Ge,
                    CompareOp::Equal => OpCode::Eq,
                    CompareOp::NotEqual => OpCode::Ne,
                };
                self.emit(Instruction::new(opcode, 0, 0), 2);
            }
            Operation::FunctionCall { name, arguments } => {
                // Resolve first so unknown functions fail before any argument is lowered.
                let func_idx = self.intern_func(name, arguments.len())?;
                for argument in arguments {
                    self.compile_expr(argument)?;
                }
                let argc = arguments.len();
                self.emit(Instruction::new(OpCode::CallFunc, func_idx, operand(argc)?), argc);
            }
        }
        Ok(())
    }
}

/// Pool index or argument count as an instruction operand.
fn operand(value: usize) -> CalcResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= Instruction::MAX_OPERAND)
        .ok_or(CalcError::ProgramTooLarge {
            limit: Instruction::MAX_OPERAND as usize,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::error::CalcError;
    use pretty_assertions::assert_eq;

    fn functions() -> FunctionRegistry<f64> {
        let mut registry = FunctionRegistry::new();
        builtins::register_functions(&mut registry).unwrap();
        registry
    }

    fn opcodes(program: &Program<f64>) -> Vec<OpCode> {
        program.instrs().iter().map(|inst| inst.op()).collect()
    }

    #[test]
    fn lowers_in_post_order() {
        // 6 + 2 * 4
        let tree = Operation::add(
            Operation::integer(6),
            Operation::multiply(Operation::integer(2), Operation::integer(4)),
        );
        let program = BytecodeCompiler.compile(&tree, &functions()).unwrap();
        assert_eq!(
            opcodes(&program),
            vec![
                OpCode::PushConst,
                OpCode::PushConst,
                OpCode::PushConst,
                OpCode::Mul,
                OpCode::Add
            ]
        );
        assert_eq!(program.consts(), &[6.0, 2.0, 4.0]);
        assert_eq!(program.max_stack(), 3);
    }

    #[test]
    fn variables_are_interned_case_folded() {
        let tree = Operation::add(Operation::variable("X"), Operation::variable("x"));
        let program = BytecodeCompiler.compile(&tree, &functions()).unwrap();
        assert_eq!(program.variables().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(program.max_stack(), 2);
    }

    #[test]
    fn function_calls_record_argc_and_stack_depth() {
        let tree = Operation::call(
            "max",
            vec![
                Operation::integer(1),
                Operation::call("abs", vec![Operation::variable("y")]),
            ],
        );
        let program = BytecodeCompiler.compile(&tree, &functions()).unwrap();
        let call = program.instrs().last().copied().unwrap();
        assert_eq!(call.op(), OpCode::CallFunc);
        assert_eq!(call.b(), 2);
        assert_eq!(program.funcs.len(), 2);
        assert_eq!(program.max_stack(), 2);
    }

    #[test]
    fn operands_beyond_the_packed_width_are_rejected() {
        let limit = Instruction::MAX_OPERAND as usize;
        assert_eq!(operand(limit), Ok(Instruction::MAX_OPERAND));
        assert_eq!(operand(limit + 1), Err(CalcError::ProgramTooLarge { limit }));
        assert_eq!(operand(usize::MAX), Err(CalcError::ProgramTooLarge { limit }));
    }

    #[test]
    fn arity_mismatch_fails_at_compile_time() {
        let tree = Operation::call("max", vec![Operation::integer(1)]);
        assert!(matches!(
            BytecodeCompiler.compile(&tree, &functions()),
            Err(CalcError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }
}
