use crate::error::{CalcError, CalcResult};
use crate::numeric::Numeric;
use std::fmt::{self, Write as _};

/// Deepest tree the parser produces and the backends accept.
///
/// Building, folding and evaluating recurse once per level. Trees assembled by hand must stay
/// within this bound before they are handed to an [`crate::Optimizer`] directly.
pub const MAX_DEPTH: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "^",
        }
    }

    #[inline]
    pub fn apply<T: Numeric>(self, left: T, right: T) -> Result<T, crate::ArithmeticError> {
        match self {
            BinaryOp::Add => left.add(right),
            BinaryOp::Subtract => left.subtract(right),
            BinaryOp::Multiply => left.multiply(right),
            BinaryOp::Divide => left.divide(right),
            BinaryOp::Modulo => left.modulo(right),
            BinaryOp::Power => left.power(right),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::LessThan => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }

    #[inline]
    pub fn apply<T: Numeric>(self, left: T, right: T) -> T {
        match self {
            CompareOp::LessThan => left.less_than(right),
            CompareOp::LessOrEqual => left.less_or_equal(right),
            CompareOp::GreaterThan => left.greater_than(right),
            CompareOp::GreaterOrEqual => left.greater_or_equal(right),
            CompareOp::Equal => left.equal(right),
            CompareOp::NotEqual => left.not_equal(right),
        }
    }
}

/// Expression tree over numeric type `T`.
///
/// Trees are immutable once built. Backends share them behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation<T> {
    IntegerConstant(i32),
    FloatingPointConstant(T),
    /// Name as written; lookups fold case.
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Operation<T>>,
        right: Box<Operation<T>>,
    },
    UnaryMinus(Box<Operation<T>>),
    Comparison {
        op: CompareOp,
        left: Box<Operation<T>>,
        right: Box<Operation<T>>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Operation<T>>,
    },
}

impl<T> Operation<T> {
    pub fn integer(value: i32) -> Self {
        Operation::IntegerConstant(value)
    }

    pub fn constant(value: T) -> Self {
        Operation::FloatingPointConstant(value)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Operation::Variable(name.into())
    }

    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Operation::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CompareOp, left: Self, right: Self) -> Self {
        Operation::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn subtract(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Subtract, left, right)
    }

    pub fn multiply(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Multiply, left, right)
    }

    pub fn divide(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Divide, left, right)
    }

    pub fn modulo(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Modulo, left, right)
    }

    pub fn power(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Power, left, right)
    }

    pub fn negate(operand: Self) -> Self {
        Operation::UnaryMinus(Box::new(operand))
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Self>) -> Self {
        Operation::FunctionCall {
            name: name.into(),
            arguments,
        }
    }

    /// True when the node depends only on constants.
    ///
    /// Function calls count as idempotent when their arguments are; registered functions are
    /// expected to be pure.
    pub fn is_idempotent(&self) -> bool {
        match self {
            Operation::IntegerConstant(_) | Operation::FloatingPointConstant(_) => true,
            Operation::Variable(_) => false,
            Operation::Binary { left, right, .. } | Operation::Comparison { left, right, .. } => {
                left.is_idempotent() && right.is_idempotent()
            }
            Operation::UnaryMinus(operand) => operand.is_idempotent(),
            Operation::FunctionCall { arguments, .. } => {
                arguments.iter().all(Operation::is_idempotent)
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Operation::IntegerConstant(_)
                | Operation::FloatingPointConstant(_)
                | Operation::Variable(_)
        )
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Operation::IntegerConstant(_)
            | Operation::FloatingPointConstant(_)
            | Operation::Variable(_) => 0,
            Operation::Binary { left, right, .. } | Operation::Comparison { left, right, .. } => {
                left.node_count() + right.node_count()
            }
            Operation::UnaryMinus(operand) => operand.node_count(),
            Operation::FunctionCall { arguments, .. } => {
                arguments.iter().map(Operation::node_count).sum()
            }
        }
    }

    /// Number of levels from the root to the deepest leaf. Does not recurse.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending: Vec<(&Operation<T>, usize)> = vec![(self, 1)];
        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);
            match node {
                Operation::IntegerConstant(_)
                | Operation::FloatingPointConstant(_)
                | Operation::Variable(_) => {}
                Operation::Binary { left, right, .. } | Operation::Comparison { left, right, .. } => {
                    pending.push((&**left, level + 1));
                    pending.push((&**right, level + 1));
                }
                Operation::UnaryMinus(operand) => pending.push((&**operand, level + 1)),
                Operation::FunctionCall { arguments, .. } => {
                    pending.extend(arguments.iter().map(|arg| (arg, level + 1)));
                }
            }
        }
        deepest
    }

    /// Fails with [`CalcError::TooDeep`] when the tree exceeds [`MAX_DEPTH`].
    pub fn check_depth(&self) -> CalcResult<()> {
        if self.depth() > MAX_DEPTH {
            return Err(CalcError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }
}

impl<T: fmt::Debug> Operation<T> {
    /// Rendering used as the tree's cache identity.
    ///
    /// Unlike `Display`, names are quoted and escaped, and floating constants use their `Debug`
    /// form, so distinct trees never share a key. Recursive: call [`Operation::check_depth`]
    /// first on untrusted trees.
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        // Writing into a `String` cannot fail.
        let _ = self.write_key(&mut key);
        key
    }

    fn write_key(&self, out: &mut String) -> fmt::Result {
        match self {
            Operation::IntegerConstant(v) => write!(out, "{v}"),
            Operation::FloatingPointConstant(v) => write!(out, "#{v:?}"),
            Operation::Variable(name) => write!(out, "{name:?}"),
            Operation::Binary { op, left, right } => {
                out.push('(');
                left.write_key(out)?;
                write!(out, " {} ", op.symbol())?;
                right.write_key(out)?;
                out.write_char(')')
            }
            Operation::Comparison { op, left, right } => {
                out.push('(');
                left.write_key(out)?;
                write!(out, " {} ", op.symbol())?;
                right.write_key(out)?;
                out.write_char(')')
            }
            Operation::UnaryMinus(operand) => {
                out.push_str("(-");
                operand.write_key(out)?;
                out.write_char(')')
            }
            Operation::FunctionCall { name, arguments } => {
                write!(out, "{name:?}(")?;
                for (idx, arg) in arguments.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    arg.write_key(out)?;
                }
                out.write_char(')')
            }
        }
    }
}

/// Fully parenthesised, human-readable rendering. Names are printed as written, so this is not a
/// unique identity; see [`Operation::cache_key`].
impl<T: fmt::Display> fmt::Display for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::IntegerConstant(v) => write!(f, "{v}"),
            // `#` keeps `2` (integer) and `2.0` (constant) distinct in cache keys.
            Operation::FloatingPointConstant(v) => write!(f, "#{v}"),
            Operation::Variable(name) => f.write_str(name),
            Operation::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Operation::Comparison { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Operation::UnaryMinus(operand) => write!(f, "(-{operand})"),
            Operation::FunctionCall { name, arguments } => {
                write!(f, "{name}(")?;
                for (idx, arg) in arguments.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
