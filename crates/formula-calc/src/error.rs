use crate::parser::ParseError;
use thiserror::Error;

pub type CalcResult<T> = Result<T, CalcError>;

/// Failure of a single numeric operation.
///
/// `f64` never produces these; [`crate::Fixed64`] reports overflow and division by zero instead
/// of saturating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivideByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("value is not representable in the target numeric type")]
    NotRepresentable,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("the variable \"{name}\" used is not defined")]
    VariableNotDefined { name: String },
    #[error("the function \"{name}\" is not defined")]
    UnknownFunction { name: String },
    #[error("the constant \"{name}\" is not defined")]
    UnknownConstant { name: String },
    #[error("the function \"{name}\" cannot be overwritten")]
    DuplicateFunction { name: String },
    #[error("the constant \"{name}\" cannot be overwritten")]
    DuplicateConstant { name: String },
    #[error("the function \"{name}\" expects {expected} argument(s) but was called with {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("\"{text}\" is not a valid number")]
    InvalidNumber { text: String },
    #[error("the name \"{name}\" is reserved and cannot be used as a variable")]
    ReservedVariableName { name: String },
    #[error("the variable \"{name}\" is bound more than once")]
    DuplicateVariable { name: String },
    #[error("the formula nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("the formula needs more than {limit} bytecode slots")]
    ProgramTooLarge { limit: usize },
    #[error("bytecode stack underflow")]
    StackUnderflow,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

impl CalcError {
    pub(crate) fn variable_not_defined(name: &str) -> Self {
        CalcError::VariableNotDefined {
            name: name.to_string(),
        }
    }

    pub(crate) fn unknown_function(name: &str) -> Self {
        CalcError::UnknownFunction {
            name: name.to_string(),
        }
    }
}
