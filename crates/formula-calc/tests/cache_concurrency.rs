#![cfg(not(target_arch = "wasm32"))]

use formula_calc::{
    CalcError, Callable, DoubleEngine, EngineOptions, Formula, FormulaCache, FormulaKey,
};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

#[test]
fn concurrent_first_requests_build_once() {
    let cache: FormulaCache<f64> = FormulaCache::new(None);
    let builds = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    let results: Vec<f64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let formula = cache
                        .get_or_build(FormulaKey::source("x + 1"), || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            // Keep the build open long enough for the others to queue up.
                            thread::sleep(Duration::from_millis(50));
                            Ok(Formula::new(|bindings| {
                                Ok(bindings.get("x").unwrap_or_default() + 1.0)
                            }))
                        })
                        .unwrap();
                    formula
                        .evaluate(&HashMap::from([("x".to_string(), 41.0)]))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(results, vec![42.0; THREADS]);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, (THREADS - 1) as u64);
}

#[test]
fn different_keys_build_independently() {
    let cache: FormulaCache<f64> = FormulaCache::new(None);
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let cache = &cache;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let value = i as f64;
                cache
                    .get_or_build(FormulaKey::source(&format!("k{i}")), || {
                        Ok(Formula::new(move |_| Ok(value)))
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(cache.len(), THREADS);
    assert_eq!(cache.stats().misses, THREADS as u64);
}

#[test]
fn failed_concurrent_build_is_retried_by_a_waiter() {
    let cache: FormulaCache<f64> = FormulaCache::new(None);
    let attempts = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<Result<(), CalcError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache
                        .get_or_build(FormulaKey::source("flaky"), || {
                            // Only the first attempt fails.
                            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                                thread::sleep(Duration::from_millis(20));
                                return Err(CalcError::UnknownFunction {
                                    name: "flaky".to_string(),
                                });
                            }
                            Ok(Formula::new(|_| Ok(1.0)))
                        })
                        .map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 1);
    assert!(attempts.load(Ordering::SeqCst) >= 2);
    let formula = cache
        .get_or_build(FormulaKey::source("flaky"), || Ok(Formula::new(|_| Ok(1.0))))
        .unwrap();
    assert_eq!(formula.evaluate(&HashMap::new()), Ok(1.0));
}

#[test]
fn shared_engine_evaluates_from_many_threads() {
    let engine = DoubleEngine::with_options(EngineOptions {
        cache_capacity: NonZeroUsize::new(4),
        ..EngineOptions::default()
    });
    engine
        .register_function("double", Callable::unary(|x: f64| Ok(x * 2.0)), false)
        .unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for t in 0..THREADS {
            let engine = &engine;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for i in 0..50 {
                    let x = f64::from(i + t as i32);
                    let vars = HashMap::from([("x".to_string(), x)]);
                    // Eight distinct texts cycle through a four-entry cache.
                    let formula = format!("double(x) + {}", i % 8);
                    let expected = x * 2.0 + f64::from(i % 8);
                    assert_eq!(engine.calculate(&formula, &vars), Ok(expected));
                }
            });
        }
    });

    let stats = engine.cache_stats().unwrap();
    assert!(stats.entries <= 4);
    assert!(stats.evictions > 0);
    assert_eq!(stats.hits + stats.misses, (THREADS * 50) as u64);
}

#[test]
fn eviction_does_not_invalidate_held_formulas() {
    let engine = DoubleEngine::with_options(EngineOptions {
        cache_capacity: NonZeroUsize::new(1),
        ..EngineOptions::default()
    });
    let first = engine.build("a + 1").unwrap();
    let _second = engine.build("a + 2").unwrap();
    assert_eq!(engine.cache_stats().unwrap().evictions, 1);

    let vars = HashMap::from([("a".to_string(), 1.0)]);
    assert_eq!(first.evaluate(&vars), Ok(2.0));
}
