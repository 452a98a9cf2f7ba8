use crate::ast::Operation;
use crate::bindings::Bindings;
use crate::error::{CalcError, CalcResult};
use crate::numeric::Numeric;
use crate::registry::{ConstantRegistry, FunctionRegistry};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type EvalFn<T> = dyn Fn(&Bindings<T>) -> CalcResult<T> + Send + Sync;

/// A backend that turns an operation tree into a reusable [`Formula`].
pub trait Executor<T: Numeric>: Send + Sync {
    /// Validates `operation` against `functions` and returns an evaluator for it.
    ///
    /// Unknown functions and arity mismatches are reported here, not at evaluation time.
    fn build_formula(
        &self,
        operation: Arc<Operation<T>>,
        functions: Arc<FunctionRegistry<T>>,
    ) -> CalcResult<Formula<T>>;

    /// One-shot evaluation.
    fn execute(
        &self,
        operation: &Operation<T>,
        functions: &Arc<FunctionRegistry<T>>,
        bindings: &Bindings<T>,
    ) -> CalcResult<T> {
        self.build_formula(Arc::new(operation.clone()), Arc::clone(functions))?
            .evaluate_bindings(bindings)
    }
}

/// Registry snapshot a formula checks and completes its bindings against.
struct Scope<T> {
    constants: Arc<ConstantRegistry<T>>,
    functions: Arc<FunctionRegistry<T>>,
}

impl<T: Numeric> Scope<T> {
    fn prepare<'b>(&self, bindings: &'b Bindings<T>) -> CalcResult<Cow<'b, Bindings<T>>> {
        for (name, _) in bindings.iter() {
            let reserved_constant = self
                .constants
                .get(name)
                .is_some_and(|info| !info.overwritable);
            if reserved_constant || self.functions.contains(name) {
                return Err(CalcError::ReservedVariableName {
                    name: name.to_string(),
                });
            }
        }

        if self
            .constants
            .iter()
            .all(|(name, _)| bindings.contains(name))
        {
            return Ok(Cow::Borrowed(bindings));
        }

        let mut merged = bindings.clone();
        for (name, info) in self.constants.iter() {
            if !merged.contains(name) {
                merged.insert_folded(name.to_string(), info.value);
            }
        }
        Ok(Cow::Owned(merged))
    }
}

/// Compiled evaluator handle. Cheap to clone and shareable across threads.
pub struct Formula<T> {
    eval: Arc<EvalFn<T>>,
    scope: Option<Arc<Scope<T>>>,
}

impl<T> Clone for Formula<T> {
    fn clone(&self) -> Self {
        Self {
            eval: Arc::clone(&self.eval),
            scope: self.scope.clone(),
        }
    }
}

impl<T> fmt::Debug for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("scoped", &self.scope.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Numeric> Formula<T> {
    pub fn new(eval: impl Fn(&Bindings<T>) -> CalcResult<T> + Send + Sync + 'static) -> Self {
        Self {
            eval: Arc::new(eval),
            scope: None,
        }
    }

    /// Attaches the registries variables are checked against and constants are merged from.
    pub(crate) fn with_scope(
        self,
        constants: Arc<ConstantRegistry<T>>,
        functions: Arc<FunctionRegistry<T>>,
    ) -> Self {
        Self {
            eval: self.eval,
            scope: Some(Arc::new(Scope {
                constants,
                functions,
            })),
        }
    }

    /// Evaluates with caller-supplied variables; names are case-insensitive.
    ///
    /// Two keys that differ only in case fail with [`CalcError::DuplicateVariable`].
    pub fn evaluate(&self, variables: &HashMap<String, T>) -> CalcResult<T> {
        self.evaluate_bindings(&Bindings::try_from(variables)?)
    }

    pub fn evaluate_bindings(&self, bindings: &Bindings<T>) -> CalcResult<T> {
        match &self.scope {
            None => (self.eval)(bindings),
            Some(scope) => {
                let bindings = scope.prepare(bindings)?;
                (self.eval)(&bindings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Callable;

    fn scoped(formula: Formula<f64>) -> Formula<f64> {
        let mut constants = ConstantRegistry::new();
        constants.register("pi", std::f64::consts::PI, false).unwrap();
        constants.register("rate", 0.25, true).unwrap();
        let mut functions = FunctionRegistry::new();
        functions
            .register("sin", Callable::unary(|x: f64| Ok(x.sin())), false)
            .unwrap();
        formula.with_scope(Arc::new(constants), Arc::new(functions))
    }

    fn lookup(name: &'static str) -> Formula<f64> {
        Formula::new(move |bindings| {
            bindings
                .get(name)
                .ok_or_else(|| CalcError::variable_not_defined(name))
        })
    }

    #[test]
    fn unscoped_formula_sees_only_caller_bindings() {
        let formula = lookup("x");
        let vars = HashMap::from([("X".to_string(), 2.0)]);
        assert_eq!(formula.evaluate(&vars), Ok(2.0));
        assert_eq!(
            lookup("y").evaluate(&vars),
            Err(CalcError::VariableNotDefined {
                name: "y".to_string()
            })
        );
    }

    #[test]
    fn scope_merges_unbound_constants() {
        let formula = scoped(lookup("pi"));
        assert_eq!(formula.evaluate(&HashMap::new()), Ok(std::f64::consts::PI));

        // Overwritable constants may be shadowed by the caller.
        let rate = scoped(lookup("rate"));
        let vars = HashMap::from([("RATE".to_string(), 0.5)]);
        assert_eq!(rate.evaluate(&vars), Ok(0.5));
        assert_eq!(rate.evaluate(&HashMap::new()), Ok(0.25));
    }

    #[test]
    fn scope_rejects_reserved_variable_names() {
        let formula = scoped(lookup("x"));
        for reserved in ["PI", "sin"] {
            let vars = HashMap::from([(reserved.to_string(), 1.0), ("x".to_string(), 1.0)]);
            assert_eq!(
                formula.evaluate(&vars),
                Err(CalcError::ReservedVariableName {
                    name: reserved.to_lowercase()
                })
            );
        }
    }

    #[test]
    fn clones_share_the_evaluator() {
        let formula = lookup("x");
        let copy = formula.clone();
        assert!(Arc::ptr_eq(&formula.eval, &copy.eval));
    }
}
