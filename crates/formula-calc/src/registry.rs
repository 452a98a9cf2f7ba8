//! Function and constant registries.
//!
//! Both registries are plain `Clone` maps; the engine shares them as `Arc` snapshots and
//! mutates them copy-on-write, so a formula built against a snapshot never observes a later
//! registration.

use crate::bindings::fold_case;
use crate::error::{CalcError, CalcResult};
use crate::MAX_DIRECT_ARITY;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

type Fn0<T> = Arc<dyn Fn() -> CalcResult<T> + Send + Sync>;
type Fn1<T> = Arc<dyn Fn(T) -> CalcResult<T> + Send + Sync>;
type Fn2<T> = Arc<dyn Fn(T, T) -> CalcResult<T> + Send + Sync>;
type Fn3<T> = Arc<dyn Fn(T, T, T) -> CalcResult<T> + Send + Sync>;
type Fn4<T> = Arc<dyn Fn(T, T, T, T) -> CalcResult<T> + Send + Sync>;
type Fn5<T> = Arc<dyn Fn(T, T, T, T, T) -> CalcResult<T> + Send + Sync>;
type Fn6<T> = Arc<dyn Fn(T, T, T, T, T, T) -> CalcResult<T> + Send + Sync>;
type FnSlice<T> = Arc<dyn Fn(&[T]) -> CalcResult<T> + Send + Sync>;

/// A registered function body.
///
/// Arities up to [`MAX_DIRECT_ARITY`] get a positional variant so backends can call them without
/// materialising an argument slice. Larger or variable arities use [`Callable::Slice`].
#[derive(Clone)]
pub enum Callable<T> {
    Nullary(Fn0<T>),
    Unary(Fn1<T>),
    Binary(Fn2<T>),
    Ternary(Fn3<T>),
    Quaternary(Fn4<T>),
    Quinary(Fn5<T>),
    Senary(Fn6<T>),
    Slice(FnSlice<T>),
}

impl<T: Copy> Callable<T> {
    pub fn nullary(f: impl Fn() -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Nullary(Arc::new(f))
    }

    pub fn unary(f: impl Fn(T) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Unary(Arc::new(f))
    }

    pub fn binary(f: impl Fn(T, T) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Binary(Arc::new(f))
    }

    pub fn ternary(f: impl Fn(T, T, T) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Ternary(Arc::new(f))
    }

    pub fn quaternary(f: impl Fn(T, T, T, T) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Quaternary(Arc::new(f))
    }

    pub fn quinary(
        f: impl Fn(T, T, T, T, T) -> CalcResult<T> + Send + Sync + 'static,
    ) -> Self {
        Callable::Quinary(Arc::new(f))
    }

    pub fn senary(
        f: impl Fn(T, T, T, T, T, T) -> CalcResult<T> + Send + Sync + 'static,
    ) -> Self {
        Callable::Senary(Arc::new(f))
    }

    pub fn slice(f: impl Fn(&[T]) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Callable::Slice(Arc::new(f))
    }

    /// Positional arity, or `None` for the slice form.
    pub fn direct_arity(&self) -> Option<usize> {
        match self {
            Callable::Nullary(_) => Some(0),
            Callable::Unary(_) => Some(1),
            Callable::Binary(_) => Some(2),
            Callable::Ternary(_) => Some(3),
            Callable::Quaternary(_) => Some(4),
            Callable::Quinary(_) => Some(5),
            Callable::Senary(_) => Some(6),
            Callable::Slice(_) => None,
        }
    }

    /// Calls the function with already-evaluated arguments.
    ///
    /// The argument count must have been checked against the function's [`Arity`]; a positional
    /// variant receiving the wrong count reports `ArityMismatch` under `name`.
    pub fn invoke(&self, name: &str, args: &[T]) -> CalcResult<T> {
        match (self, args) {
            (Callable::Nullary(f), []) => f(),
            (Callable::Unary(f), &[a]) => f(a),
            (Callable::Binary(f), &[a, b]) => f(a, b),
            (Callable::Ternary(f), &[a, b, c]) => f(a, b, c),
            (Callable::Quaternary(f), &[a, b, c, d]) => f(a, b, c, d),
            (Callable::Quinary(f), &[a, b, c, d, e]) => f(a, b, c, d, e),
            (Callable::Senary(f), &[a, b, c, d, e, g]) => f(a, b, c, d, e, g),
            (Callable::Slice(f), args) => f(args),
            (callable, args) => Err(CalcError::ArityMismatch {
                name: name.to_string(),
                expected: callable.direct_arity().unwrap_or(args.len()),
                found: args.len(),
            }),
        }
    }
}

impl<T> fmt::Debug for Callable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Callable::Nullary(_) => "Nullary",
            Callable::Unary(_) => "Unary",
            Callable::Binary(_) => "Binary",
            Callable::Ternary(_) => "Ternary",
            Callable::Quaternary(_) => "Quaternary",
            Callable::Quinary(_) => "Quinary",
            Callable::Senary(_) => "Senary",
            Callable::Slice(_) => "Slice",
        };
        f.write_str(kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => n == count,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{n}"),
            Arity::Variadic => f.write_str("variadic"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionInfo<T> {
    pub name: String,
    pub arity: Arity,
    pub callable: Callable<T>,
    pub overwritable: bool,
}

impl<T: Copy> FunctionInfo<T> {
    /// Fails with `ArityMismatch` unless `count` arguments are acceptable.
    pub fn check_arity(&self, count: usize) -> CalcResult<()> {
        if self.arity.accepts(count) {
            return Ok(());
        }
        Err(CalcError::ArityMismatch {
            name: self.name.clone(),
            expected: match self.arity {
                Arity::Fixed(n) => n,
                Arity::Variadic => count,
            },
            found: count,
        })
    }

    pub fn invoke(&self, args: &[T]) -> CalcResult<T> {
        self.callable.invoke(&self.name, args)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantInfo<T> {
    pub name: String,
    pub value: T,
    pub overwritable: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionRegistry<T> {
    functions: AHashMap<String, FunctionInfo<T>>,
}

impl<T: Copy> Default for FunctionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> FunctionRegistry<T> {
    pub fn new() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Registers a positional callable; its arity is implied by the variant.
    ///
    /// A [`Callable::Slice`] registered this way is variadic; use [`Self::register_slice`] to pin
    /// a larger fixed arity.
    pub fn register(
        &mut self,
        name: &str,
        callable: Callable<T>,
        overwritable: bool,
    ) -> CalcResult<()> {
        let arity = callable.direct_arity().map_or(Arity::Variadic, Arity::Fixed);
        self.insert(name, arity, callable, overwritable)
    }

    pub fn register_slice(
        &mut self,
        name: &str,
        arity: Arity,
        f: impl Fn(&[T]) -> CalcResult<T> + Send + Sync + 'static,
        overwritable: bool,
    ) -> CalcResult<()> {
        self.insert(name, arity, Callable::slice(f), overwritable)
    }

    fn insert(
        &mut self,
        name: &str,
        arity: Arity,
        callable: Callable<T>,
        overwritable: bool,
    ) -> CalcResult<()> {
        let key = fold_case(name).into_owned();
        if self.functions.get(&key).is_some_and(|info| !info.overwritable) {
            return Err(CalcError::DuplicateFunction { name: key });
        }
        // A direct callable always matches its declared arity; this only guards slices.
        debug_assert!(match (arity, callable.direct_arity()) {
            (Arity::Fixed(n), Some(m)) => n == m && m <= MAX_DIRECT_ARITY,
            (_, None) => true,
            (Arity::Variadic, Some(_)) => false,
        });
        self.functions.insert(
            key.clone(),
            FunctionInfo {
                name: key,
                arity,
                callable,
                overwritable,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo<T>> {
        self.functions.get(fold_case(name).as_ref())
    }

    pub fn lookup(&self, name: &str) -> CalcResult<&FunctionInfo<T>> {
        self.get(name)
            .ok_or_else(|| CalcError::unknown_function(name))
    }

    /// Lookup plus arity check.
    pub fn resolve(&self, name: &str, argument_count: usize) -> CalcResult<&FunctionInfo<T>> {
        let info = self.lookup(name)?;
        info.check_arity(argument_count)?;
        Ok(info)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(fold_case(name).as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionInfo<T>> + '_ {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ConstantRegistry<T> {
    constants: AHashMap<String, ConstantInfo<T>>,
}

impl<T: Copy> Default for ConstantRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> ConstantRegistry<T> {
    pub fn new() -> Self {
        Self {
            constants: AHashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, value: T, overwritable: bool) -> CalcResult<()> {
        let key = fold_case(name).into_owned();
        if self.constants.get(&key).is_some_and(|info| !info.overwritable) {
            return Err(CalcError::DuplicateConstant { name: key });
        }
        self.constants.insert(
            key.clone(),
            ConstantInfo {
                name: key,
                value,
                overwritable,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConstantInfo<T>> {
        self.constants.get(fold_case(name).as_ref())
    }

    pub fn lookup(&self, name: &str) -> CalcResult<&ConstantInfo<T>> {
        self.get(name).ok_or_else(|| CalcError::UnknownConstant {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constants.contains_key(fold_case(name).as_ref())
    }

    /// `(lower-cased name, info)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstantInfo<T>)> + '_ {
        self.constants.iter().map(|(name, info)| (name.as_str(), info))
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_dispatches_on_arity() {
        let add3 = Callable::ternary(|a: f64, b, c| Ok(a + b + c));
        assert_eq!(add3.invoke("add3", &[1.0, 2.0, 3.0]), Ok(6.0));
        assert_eq!(
            add3.invoke("add3", &[1.0]),
            Err(CalcError::ArityMismatch {
                name: "add3".to_string(),
                expected: 3,
                found: 1,
            })
        );

        let sum = Callable::slice(|args: &[f64]| Ok(args.iter().sum()));
        assert_eq!(sum.invoke("sum", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]), Ok(28.0));
    }

    #[test]
    fn function_names_are_case_insensitive() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("Double", Callable::unary(|x: f64| Ok(x * 2.0)), true)
            .unwrap();
        assert!(registry.contains("DOUBLE"));
        let info = registry.lookup("double").unwrap();
        assert_eq!(info.name, "double");
        assert_eq!(info.arity, Arity::Fixed(1));
        assert_eq!(info.invoke(&[4.0]), Ok(8.0));
    }

    #[test]
    fn non_overwritable_functions_reject_reregistration() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("f", Callable::nullary(|| Ok(1.0_f64)), false)
            .unwrap();
        assert_eq!(
            registry.register("F", Callable::nullary(|| Ok(2.0)), true),
            Err(CalcError::DuplicateFunction {
                name: "f".to_string()
            })
        );
        assert_eq!(registry.lookup("f").unwrap().invoke(&[]), Ok(1.0));
    }

    #[test]
    fn overwritable_functions_can_be_replaced() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("g", Callable::nullary(|| Ok(1.0_f64)), true)
            .unwrap();
        registry
            .register("g", Callable::nullary(|| Ok(2.0)), true)
            .unwrap();
        assert_eq!(registry.lookup("g").unwrap().invoke(&[]), Ok(2.0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_checks_arity() {
        let mut registry: FunctionRegistry<f64> = FunctionRegistry::new();
        registry
            .register_slice("sum8", Arity::Fixed(8), |args| Ok(args.iter().sum()), false)
            .unwrap();
        assert!(registry.resolve("sum8", 8).is_ok());
        assert!(matches!(
            registry.resolve("sum8", 2),
            Err(CalcError::ArityMismatch { expected: 8, found: 2, .. })
        ));
        assert_eq!(
            registry.resolve("nope", 0).map(|_| ()),
            Err(CalcError::UnknownFunction {
                name: "nope".to_string()
            })
        );
    }

    #[test]
    fn constants_follow_the_same_rules() {
        let mut registry = ConstantRegistry::new();
        registry.register("Tau", 6.0_f64, true).unwrap();
        registry.register("tau", std::f64::consts::TAU, false).unwrap();
        assert_eq!(registry.lookup("TAU").unwrap().value, std::f64::consts::TAU);
        assert_eq!(
            registry.register("tau", 0.0, true),
            Err(CalcError::DuplicateConstant {
                name: "tau".to_string()
            })
        );
        assert!(matches!(
            registry.lookup("phi"),
            Err(CalcError::UnknownConstant { .. })
        ));
    }
}
