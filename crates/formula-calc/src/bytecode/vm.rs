use super::program::{OpCode, Program};
use crate::bindings::Bindings;
use crate::error::{CalcError, CalcResult};
use crate::numeric::Numeric;
use smallvec::SmallVec;

type Stack<T> = SmallVec<[T; 16]>;

/// A well-formed program never underflows; a miscompiled one fails loudly.
#[inline]
fn pop<T>(stack: &mut Stack<T>) -> CalcResult<T> {
    debug_assert!(!stack.is_empty(), "bytecode stack underflow");
    stack.pop().ok_or(CalcError::StackUnderflow)
}

/// Stack-based bytecode interpreter.
///
/// The VM itself holds no state between runs; the value stack lives on the Rust stack unless the
/// program is unusually deep.
#[derive(Clone, Copy, Debug, Default)]
pub struct Vm;

impl Vm {
    pub fn new() -> Self {
        Vm
    }

    pub fn eval<T: Numeric>(&self, program: &Program<T>, bindings: &Bindings<T>) -> CalcResult<T> {
        let mut stack: Stack<T> = SmallVec::with_capacity(program.max_stack());
        for inst in program.instrs() {
            match inst.op() {
                OpCode::PushConst => {
                    stack.push(program.consts[inst.a() as usize]);
                }
                OpCode::LoadVar => {
                    let (folded, written) = &program.vars[inst.a() as usize];
                    let value = bindings
                        .get_folded(folded)
                        .ok_or_else(|| CalcError::variable_not_defined(written))?;
                    stack.push(value);
                }
                OpCode::Neg => {
                    let v = pop(&mut stack)?;
                    stack.push(v.negate()?);
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Pow => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let value = match inst.op() {
                        OpCode::Add => left.add(right),
                        OpCode::Sub => left.subtract(right),
                        OpCode::Mul => left.multiply(right),
                        OpCode::Div => left.divide(right),
                        OpCode::Mod => left.modulo(right),
                        OpCode::Pow => left.power(right),
                        _ => unreachable!(),
                    }?;
                    stack.push(value);
                }
                OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge | OpCode::Eq | OpCode::Ne => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let value = match inst.op() {
                        OpCode::Lt => left.less_than(right),
                        OpCode::Le => left.less_or_equal(right),
                        OpCode::Gt => left.greater_than(right),
                        OpCode::Ge => left.greater_or_equal(right),
                        OpCode::Eq => left.equal(right),
                        OpCode::Ne => left.not_equal(right),
                        _ => unreachable!(),
                    };
                    stack.push(value);
                }
                OpCode::CallFunc => {
                    let func = &program.funcs[inst.a() as usize];
                    let argc = inst.b() as usize;
                    debug_assert!(argc <= stack.len(), "bytecode stack underflow");
                    let start = stack
                        .len()
                        .checked_sub(argc)
                        .ok_or(CalcError::StackUnderflow)?;
                    let result = func.callable.invoke(&func.name, &stack[start..])?;
                    stack.truncate(start);
                    stack.push(result);
                }
            }
        }
        let result = pop(&mut stack)?;
        debug_assert!(stack.is_empty(), "bytecode left values on the stack");
        Ok(result)
    }
}
