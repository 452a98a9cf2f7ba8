use crate::ast::Operation;
use crate::builtins;
use crate::bytecode::BytecodeCompiler;
use crate::cache::{CacheStats, FormulaCache, FormulaKey};
use crate::closure::ClosureCompiler;
use crate::error::CalcResult;
use crate::executor::{Executor, Formula};
use crate::interpreter::Interpreter;
use crate::locale::NumberLocale;
use crate::numeric::{Fixed64, Numeric};
use crate::optimizer::{ConstantFolder, Optimizer};
use crate::parser::Parser;
use crate::registry::{Arity, Callable, ConstantInfo, ConstantRegistry, FunctionInfo, FunctionRegistry};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Backend used to turn operation trees into formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Walk the tree on every evaluation.
    Interpreted,
    /// Translate the tree into nested closures once.
    #[default]
    Compiled,
    /// Lower the tree into a stack program.
    Bytecode,
}

impl ExecutionMode {
    fn executor<T: Numeric>(self) -> Box<dyn Executor<T>> {
        match self {
            ExecutionMode::Interpreted => Box::new(Interpreter::new()),
            ExecutionMode::Compiled => Box::new(ClosureCompiler::new()),
            ExecutionMode::Bytecode => Box::new(BytecodeCompiler::new()),
        }
    }
}

/// Construction-time configuration of a [`CalculationEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Decimal and argument separators accepted by [`CalculationEngine::build`].
    pub locale: NumberLocale,
    pub execution_mode: ExecutionMode,
    pub cache_enabled: bool,
    /// Maximum number of cached formulas; `None` never evicts.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Fold constant sub-trees before building.
    pub optimizer_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            locale: NumberLocale::en_us(),
            execution_mode: ExecutionMode::default(),
            cache_enabled: true,
            cache_capacity: Some(DEFAULT_CACHE_CAPACITY),
            optimizer_enabled: true,
        }
    }
}

/// Parses, optimizes, caches, builds and evaluates formulas over one numeric type.
///
/// The engine owns its function and constant registries. Both are held as shared snapshots:
/// registering a function or constant copies the registry if a built formula still references
/// it, so formulas handed out earlier keep the registries they were built against. Every
/// registration also clears the formula cache.
///
/// All methods take `&self`; an engine can be shared between threads behind an `Arc`.
pub struct CalculationEngine<T: Numeric> {
    options: EngineOptions,
    executor: Box<dyn Executor<T>>,
    optimizer: Option<Box<dyn Optimizer<T>>>,
    functions: RwLock<Arc<FunctionRegistry<T>>>,
    constants: RwLock<Arc<ConstantRegistry<T>>>,
    cache: Option<FormulaCache<T>>,
}

pub type DoubleEngine = CalculationEngine<f64>;
pub type FixedEngine = CalculationEngine<Fixed64>;

impl<T: Numeric> Default for CalculationEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Numeric> std::fmt::Debug for CalculationEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationEngine")
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn read<R>(lock: &RwLock<Arc<R>>) -> RwLockReadGuard<'_, Arc<R>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<R>(lock: &RwLock<Arc<R>>) -> RwLockWriteGuard<'_, Arc<R>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Numeric> CalculationEngine<T> {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Uses [`ConstantFolder`] when `options.optimizer_enabled` is set.
    pub fn with_options(options: EngineOptions) -> Self {
        Self::with_optimizer(options, ConstantFolder::new())
    }

    /// Uses `optimizer` instead of the default constant folder.
    ///
    /// The optimizer is ignored unless `options.optimizer_enabled` is set.
    pub fn with_optimizer(options: EngineOptions, optimizer: impl Optimizer<T> + 'static) -> Self {
        let mut functions = FunctionRegistry::new();
        let mut constants = ConstantRegistry::new();
        // Fresh registries cannot hold a conflicting name.
        builtins::register_functions(&mut functions)
            .unwrap_or_else(|err| unreachable!("registering built-in functions: {err}"));
        builtins::register_constants(&mut constants)
            .unwrap_or_else(|err| unreachable!("registering built-in constants: {err}"));

        let optimizer: Option<Box<dyn Optimizer<T>>> = if options.optimizer_enabled {
            Some(Box::new(optimizer))
        } else {
            None
        };
        let cache = options
            .cache_enabled
            .then(|| FormulaCache::new(options.cache_capacity));

        debug!(
            "creating calculation engine (mode={:?}, cache={}, capacity={:?}, optimizer={})",
            options.execution_mode,
            options.cache_enabled,
            options.cache_capacity,
            options.optimizer_enabled
        );

        Self {
            executor: options.execution_mode.executor(),
            optimizer,
            functions: RwLock::new(Arc::new(functions)),
            constants: RwLock::new(Arc::new(constants)),
            cache,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current function registry snapshot.
    pub fn functions(&self) -> Arc<FunctionRegistry<T>> {
        Arc::clone(&read(&self.functions))
    }

    /// Current constant registry snapshot.
    pub fn constants(&self) -> Arc<ConstantRegistry<T>> {
        Arc::clone(&read(&self.constants))
    }

    pub fn function_info(&self, name: &str) -> Option<FunctionInfo<T>> {
        read(&self.functions).get(name).cloned()
    }

    pub fn constant_info(&self, name: &str) -> Option<ConstantInfo<T>> {
        read(&self.constants).get(name).cloned()
    }

    /// Registers a positional function. Fails if a non-overwritable function has that name.
    pub fn register_function(
        &self,
        name: &str,
        callable: Callable<T>,
        overwritable: bool,
    ) -> CalcResult<()> {
        {
            let mut functions = write(&self.functions);
            Arc::make_mut(&mut *functions).register(name, callable, overwritable)?;
        }
        debug!("registered function {name}");
        self.clear_cache();
        Ok(())
    }

    /// Registers a function that receives its arguments as a slice.
    pub fn register_slice_function(
        &self,
        name: &str,
        arity: Arity,
        f: impl Fn(&[T]) -> CalcResult<T> + Send + Sync + 'static,
        overwritable: bool,
    ) -> CalcResult<()> {
        {
            let mut functions = write(&self.functions);
            Arc::make_mut(&mut *functions).register_slice(name, arity, f, overwritable)?;
        }
        debug!("registered function {name} ({arity})");
        self.clear_cache();
        Ok(())
    }

    /// Registers a constant. Non-overwritable constants are inlined by the parser and cannot be
    /// bound as variables.
    pub fn register_constant(&self, name: &str, value: T, overwritable: bool) -> CalcResult<()> {
        {
            let mut constants = write(&self.constants);
            Arc::make_mut(&mut *constants).register(name, value, overwritable)?;
        }
        debug!("registered constant {name} = {value}");
        self.clear_cache();
        Ok(())
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(FormulaCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Builds (or reuses) the formula for an operation tree.
    ///
    /// Structurally equal trees share one formula. Trees deeper than [`crate::ast::MAX_DEPTH`]
    /// are rejected with [`crate::CalcError::TooDeep`].
    pub fn build_formula(&self, operation: &Operation<T>) -> CalcResult<Formula<T>> {
        operation.check_depth()?;
        self.cached(FormulaKey::tree(operation), || {
            let (functions, constants) = self.snapshot();
            self.build_tree(operation.clone(), functions, constants)
        })
    }

    /// Builds (or reuses) the formula for a tree and evaluates it once.
    pub fn execute(&self, operation: &Operation<T>, variables: &HashMap<String, T>) -> CalcResult<T> {
        self.build_formula(operation)?.evaluate(variables)
    }

    /// Parses `formula` with the engine locale and builds (or reuses) its formula.
    ///
    /// The formula text is the cache key as written; `"a+b"` and `"a + b"` are cached
    /// separately.
    pub fn build(&self, formula: &str) -> CalcResult<Formula<T>> {
        self.cached(FormulaKey::source(formula), || {
            let (functions, constants) = self.snapshot();
            let operation =
                Parser::new(&self.options.locale, &functions, &constants).parse(formula)?;
            self.build_tree(operation, functions, constants)
        })
    }

    /// Parses, builds (or reuses) and evaluates `formula` once.
    pub fn calculate(&self, formula: &str, variables: &HashMap<String, T>) -> CalcResult<T> {
        self.build(formula)?.evaluate(variables)
    }

    fn cached(
        &self,
        key: FormulaKey,
        build: impl FnOnce() -> CalcResult<Formula<T>>,
    ) -> CalcResult<Formula<T>> {
        match &self.cache {
            Some(cache) => cache.get_or_build(key, build),
            None => build(),
        }
    }

    fn snapshot(&self) -> (Arc<FunctionRegistry<T>>, Arc<ConstantRegistry<T>>) {
        (self.functions(), self.constants())
    }

    fn build_tree(
        &self,
        operation: Operation<T>,
        functions: Arc<FunctionRegistry<T>>,
        constants: Arc<ConstantRegistry<T>>,
    ) -> CalcResult<Formula<T>> {
        let operation = match &self.optimizer {
            Some(optimizer) => optimizer.optimize(operation, &functions),
            None => operation,
        };
        let formula = self
            .executor
            .build_formula(Arc::new(operation), Arc::clone(&functions))?;
        Ok(formula.with_scope(constants, functions))
    }
}
