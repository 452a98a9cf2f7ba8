#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! Compile-once, evaluate-many formula engine generic over the numeric type.
//!
//! A formula is an [`Operation`] tree (usually produced by [`Parser`] from formula text).
//! The [`CalculationEngine`] optionally folds constant sub-trees, looks the formula up in its
//! [`FormulaCache`], and on a miss hands the tree to one of three interchangeable backends:
//!
//! - [`Interpreter`]: a recursive tree walker. This is the reference semantics.
//! - [`ClosureCompiler`]: translates the tree once into nested closures (the default).
//! - [`BytecodeCompiler`]: lowers the tree into a post-order stack [`bytecode::Program`] run by
//!   a small [`bytecode::Vm`].
//!
//! All backends must produce the same result for the same tree and bindings; the integration
//! tests check this with randomly generated trees.
//!
//! The numeric representation is pluggable through the [`Numeric`] trait. The crate ships
//! implementations for `f64` (IEEE-754 semantics, so `1/0` is `inf`) and [`Fixed64`], a Q32.32
//! fixed-point type whose overflow and division by zero are reported as errors.
//!
//! ```
//! use formula_calc::DoubleEngine;
//! use std::collections::HashMap;
//!
//! let engine = DoubleEngine::new();
//! let vars = HashMap::from([("X".to_string(), 5.0)]);
//! assert_eq!(engine.calculate("if(x != 0, 2 * x, -1)", &vars).unwrap(), 10.0);
//! ```

pub mod ast;
pub mod bindings;
pub mod builtins;
pub mod bytecode;
pub mod cache;
pub mod closure;
pub mod engine;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod locale;
pub mod numeric;
pub mod optimizer;
pub mod parser;
pub mod registry;

/// Largest arity that gets a dedicated call path in every backend.
///
/// Functions with more (or a variable number of) arguments are invoked through
/// [`Callable::Slice`].
pub const MAX_DIRECT_ARITY: usize = 6;

pub use ast::{BinaryOp, CompareOp, Operation};
pub use bindings::Bindings;
pub use bytecode::BytecodeCompiler;
pub use cache::{CacheStats, FormulaCache, FormulaKey};
pub use closure::ClosureCompiler;
pub use engine::{CalculationEngine, DoubleEngine, EngineOptions, ExecutionMode, FixedEngine};
pub use error::{ArithmeticError, CalcError, CalcResult};
pub use executor::{Executor, Formula};
pub use interpreter::Interpreter;
pub use locale::NumberLocale;
pub use numeric::{Fixed64, Numeric};
pub use optimizer::{ConstantFolder, Optimizer};
pub use parser::{ParseError, Parser};
pub use registry::{Arity, Callable, ConstantInfo, ConstantRegistry, FunctionInfo, FunctionRegistry};
