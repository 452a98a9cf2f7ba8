use crate::registry::Callable;
use std::sync::Arc;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    PushConst = 0,
    LoadVar = 1,
    Neg = 2,
    Add = 3,
    Sub = 4,
    Mul = 5,
    Div = 6,
    Mod = 7,
    Pow = 8,
    Lt = 9,
    Le = 10,
    Gt = 11,
    Ge = 12,
    Eq = 13,
    Ne = 14,
    CallFunc = 15,
}

/// Packed instruction:
/// - bits 56..63: opcode
/// - bits 28..55: operand a
/// - bits 0..27: operand b
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction(u64);

impl Instruction {
    pub const MAX_OPERAND: u32 = (1 << 28) - 1;

    #[inline]
    pub fn new(op: OpCode, a: u32, b: u32) -> Self {
        debug_assert!(a <= Self::MAX_OPERAND);
        debug_assert!(b <= Self::MAX_OPERAND);
        Instruction(((op as u64) << 56) | ((a as u64) << 28) | (b as u64))
    }

    #[inline]
    pub fn op(self) -> OpCode {
        match ((self.0 >> 56) & 0xFF) as u8 {
            0 => OpCode::PushConst,
            1 => OpCode::LoadVar,
            2 => OpCode::Neg,
            3 => OpCode::Add,
            4 => OpCode::Sub,
            5 => OpCode::Mul,
            6 => OpCode::Div,
            7 => OpCode::Mod,
            8 => OpCode::Pow,
            9 => OpCode::Lt,
            10 => OpCode::Le,
            11 => OpCode::Gt,
            12 => OpCode::Ge,
            13 => OpCode::Eq,
            14 => OpCode::Ne,
            15 => OpCode::CallFunc,
            _ => unreachable!("invalid opcode"),
        }
    }

    #[inline]
    pub fn a(self) -> u32 {
        ((self.0 >> 28) & 0x0FFF_FFFF) as u32
    }

    #[inline]
    pub fn b(self) -> u32 {
        (self.0 & 0x0FFF_FFFF) as u32
    }
}

/// A resolved function reference: the callable plus the name used in error messages.
#[derive(Clone, Debug)]
pub struct FuncRef<T> {
    pub(crate) name: Arc<str>,
    pub(crate) callable: Callable<T>,
}

/// Post-order stack program for one formula.
#[derive(Clone, Debug)]
pub struct Program<T> {
    pub(crate) instrs: Vec<Instruction>,
    pub(crate) consts: Vec<T>,
    /// `(case-folded, as written)` variable names.
    pub(crate) vars: Vec<(Arc<str>, Arc<str>)>,
    pub(crate) funcs: Vec<FuncRef<T>>,
    pub(crate) max_stack: usize,
}

impl<T> Default for Program<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Program<T> {
    pub fn new() -> Self {
        Self {
            instrs: Vec::new(),
            consts: Vec::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            max_stack: 0,
        }
    }

    #[inline]
    pub fn instrs(&self) -> &[Instruction] {
        &self.instrs
    }

    #[inline]
    pub fn consts(&self) -> &[T] {
        &self.consts
    }

    /// Deepest value stack the program needs.
    #[inline]
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Case-folded names of the variables the program loads.
    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.vars.iter().map(|(folded, _)| folded.as_ref())
    }
}
