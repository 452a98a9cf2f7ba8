use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use formula_calc::{
    builtins, Bindings, BytecodeCompiler, ClosureCompiler, ConstantRegistry, DoubleEngine,
    Executor, FixedEngine, Fixed64, FunctionRegistry, Interpreter, NumberLocale, Numeric,
    Operation, Parser,
};
use std::collections::HashMap;
use std::sync::Arc;

const FORMULA: &str = "if(x > y, sqrt(x * x + y * y), max(x, y) - min(x, 3)) * 2 + (x - y) % 7";

fn setup<T: Numeric>() -> (Arc<FunctionRegistry<T>>, Arc<Operation<T>>) {
    let mut functions = FunctionRegistry::new();
    builtins::register_functions(&mut functions).unwrap();
    let mut constants = ConstantRegistry::new();
    builtins::register_constants(&mut constants).unwrap();
    let tree = Parser::new(&NumberLocale::en_us(), &functions, &constants)
        .parse(FORMULA)
        .unwrap();
    (Arc::new(functions), Arc::new(tree))
}

fn bench_backends<T: Numeric>(c: &mut Criterion, group_name: &str, x: T, y: T) {
    let (functions, tree) = setup::<T>();
    let bindings: Bindings<T> = [("x", x), ("y", y)].into_iter().collect();

    let backends: [(&str, Box<dyn Executor<T>>); 3] = [
        ("interpreter", Box::new(Interpreter::new())),
        ("closure", Box::new(ClosureCompiler::new())),
        ("bytecode", Box::new(BytecodeCompiler::new())),
    ];

    let mut group = c.benchmark_group(group_name);
    for (name, backend) in &backends {
        let formula = backend
            .build_formula(Arc::clone(&tree), Arc::clone(&functions))
            .unwrap();
        group.bench_function(BenchmarkId::new("evaluate", name), |b| {
            b.iter(|| black_box(formula.evaluate_bindings(black_box(&bindings)).unwrap()))
        });
        group.bench_function(BenchmarkId::new("build", name), |b| {
            b.iter(|| {
                black_box(
                    backend
                        .build_formula(Arc::clone(&tree), Arc::clone(&functions))
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_f64(c: &mut Criterion) {
    bench_backends::<f64>(c, "f64", 12.5, 4.0);
}

fn bench_fixed(c: &mut Criterion) {
    bench_backends::<Fixed64>(c, "fixed64", Fixed64::from_i32(12), Fixed64::from_i32(4));
}

fn bench_engine(c: &mut Criterion) {
    let vars = HashMap::from([("x".to_string(), 12.5), ("y".to_string(), 4.0)]);
    let engine = DoubleEngine::new();
    let fixed = FixedEngine::new();
    let fixed_vars = HashMap::from([
        ("x".to_string(), Fixed64::from_i32(12)),
        ("y".to_string(), Fixed64::from_i32(4)),
    ]);

    let mut group = c.benchmark_group("engine");
    group.bench_function("calculate_cached_f64", |b| {
        b.iter(|| black_box(engine.calculate(black_box(FORMULA), &vars).unwrap()))
    });
    group.bench_function("calculate_cached_fixed64", |b| {
        b.iter(|| black_box(fixed.calculate(black_box(FORMULA), &fixed_vars).unwrap()))
    });
    group.bench_function("calculate_uncached_f64", |b| {
        b.iter(|| {
            engine.clear_cache();
            black_box(engine.calculate(black_box(FORMULA), &vars).unwrap())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_f64, bench_fixed, bench_engine);
criterion_main!(benches);
