use formula_calc::ast::MAX_DEPTH;
use formula_calc::{
    Callable, CalcError, CompareOp, DoubleEngine, EngineOptions, ExecutionMode, FixedEngine,
    Fixed64, Numeric, Operation,
};
use std::collections::HashMap;

fn engines() -> Vec<DoubleEngine> {
    [
        ExecutionMode::Interpreted,
        ExecutionMode::Compiled,
        ExecutionMode::Bytecode,
    ]
    .into_iter()
    .flat_map(|execution_mode| {
        // With and without folding so backends see the raw tree too.
        [true, false].map(|optimizer_enabled| {
            DoubleEngine::with_options(EngineOptions {
                execution_mode,
                optimizer_enabled,
                ..EngineOptions::default()
            })
        })
    })
    .collect()
}

fn no_vars<T>() -> HashMap<String, T> {
    HashMap::new()
}

#[test]
fn addition_and_multiplication() {
    let tree = Operation::add(
        Operation::integer(6),
        Operation::multiply(Operation::integer(2), Operation::integer(4)),
    );
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &no_vars()), Ok(14.0));
        assert_eq!(engine.calculate("6 + 2 * 4", &no_vars()), Ok(14.0));
    }
}

#[test]
fn subtraction_goes_negative() {
    let tree = Operation::subtract(Operation::integer(6), Operation::integer(9));
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &no_vars()), Ok(-3.0));
    }
}

#[test]
fn if_tests_for_nonzero() {
    let tree = Operation::call(
        "if",
        vec![
            Operation::compare(
                CompareOp::NotEqual,
                Operation::variable("x"),
                Operation::integer(0),
            ),
            Operation::integer(1),
            Operation::integer(0),
        ],
    );
    for engine in engines() {
        let five = HashMap::from([("x".to_string(), 5.0)]);
        let zero = HashMap::from([("x".to_string(), 0.0)]);
        assert_eq!(engine.execute(&tree, &five), Ok(1.0));
        assert_eq!(engine.execute(&tree, &zero), Ok(0.0));
    }
}

#[test]
fn max_of_two_integers() {
    let tree = Operation::call("max", vec![Operation::integer(3), Operation::integer(7)]);
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &no_vars()), Ok(7.0));
    }
}

#[test]
fn builtin_names_cannot_be_registered_again() {
    let engine = DoubleEngine::new();
    let result = engine.register_function("sin", Callable::unary(|x: f64| Ok(x)), false);
    assert_eq!(
        result,
        Err(CalcError::DuplicateFunction {
            name: "sin".to_string()
        })
    );
    // The built-in keeps working.
    assert_eq!(engine.calculate("sin(0)", &no_vars()), Ok(0.0));
}

#[test]
fn float_division_by_zero_is_not_an_error() {
    let tree = Operation::divide(Operation::integer(1), Operation::integer(0));
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &no_vars()), Ok(f64::INFINITY));
    }
}

fn equal<T: Numeric>(left: i32, right: i32) -> Operation<T> {
    Operation::compare(
        CompareOp::Equal,
        Operation::integer(left),
        Operation::integer(right),
    )
}

#[test]
fn comparisons_yield_one_or_zero() {
    for engine in engines() {
        assert_eq!(engine.execute(&equal(3, 3), &no_vars()), Ok(f64::ONE));
        assert_eq!(engine.execute(&equal(3, 4), &no_vars()), Ok(f64::ZERO));
    }

    let fixed = FixedEngine::new();
    assert_eq!(fixed.execute(&equal(3, 3), &no_vars()), Ok(Fixed64::ONE));
    assert_eq!(fixed.execute(&equal(3, 4), &no_vars()), Ok(Fixed64::ZERO));
}

#[test]
fn variable_lookup_ignores_case() {
    let tree = Operation::variable("X");
    let vars = HashMap::from([("x".to_string(), 2.5)]);
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &vars), Ok(2.5));
    }
}

#[test]
fn undefined_variables_fail_in_every_mode() {
    let tree = Operation::variable("z");
    for engine in engines() {
        assert_eq!(
            engine.execute(&tree, &HashMap::from([("y".to_string(), 1.0)])),
            Err(CalcError::VariableNotDefined {
                name: "z".to_string()
            })
        );
    }
}

#[test]
fn float_equality_is_exact() {
    // No epsilon: the classic rounding case compares unequal.
    let engine = DoubleEngine::new();
    assert_eq!(engine.calculate("0.1 + 0.2 == 0.3", &no_vars()), Ok(0.0));
    assert_eq!(engine.calculate("0.5 + 0.25 == 0.75", &no_vars()), Ok(1.0));
}

#[test]
fn text_and_tree_front_ends_agree() {
    let engine = DoubleEngine::new();
    let vars = HashMap::from([("Price".to_string(), 80.0), ("qty".to_string(), 3.0)]);
    let tree = Operation::subtract(
        Operation::multiply(Operation::variable("price"), Operation::variable("QTY")),
        Operation::call(
            "ifmore",
            vec![
                Operation::variable("qty"),
                Operation::integer(2),
                Operation::integer(10),
                Operation::integer(0),
            ],
        ),
    );
    let from_text = engine
        .calculate("price * QTY - ifmore(qty, 2, 10, 0)", &vars)
        .unwrap();
    assert_eq!(from_text, 230.0);
    assert_eq!(engine.execute(&tree, &vars), Ok(from_text));

    // One text key and one tree key.
    assert_eq!(engine.cache_stats().unwrap().entries, 2);
}

#[test]
fn formulas_are_reusable_across_bindings() {
    let engine = DoubleEngine::new();
    let formula = engine.build("a * a + b").unwrap();
    let results: Vec<f64> = (0..5)
        .map(|i| {
            let vars = HashMap::from([("a".to_string(), f64::from(i)), ("b".to_string(), 1.0)]);
            formula.evaluate(&vars).unwrap()
        })
        .collect();
    assert_eq!(results, vec![1.0, 2.0, 5.0, 10.0, 17.0]);
}

#[test]
fn unknown_functions_fail_before_evaluation() {
    let engine = DoubleEngine::new();
    assert_eq!(
        engine.build("foo(1)").unwrap_err(),
        CalcError::UnknownFunction {
            name: "foo".to_string()
        }
    );
    let tree = Operation::call("foo", vec![Operation::integer(1)]);
    for engine in engines() {
        assert_eq!(
            engine.build_formula(&tree).unwrap_err(),
            CalcError::UnknownFunction {
                name: "foo".to_string()
            }
        );
    }
}

#[test]
fn invalid_numbers_are_build_errors() {
    let engine = DoubleEngine::new();
    assert_eq!(
        engine.build("1.2.3 + 1").unwrap_err(),
        CalcError::InvalidNumber {
            text: "1.2.3".to_string()
        }
    );
}

#[test]
fn cached_trees_are_keyed_by_structure_not_rendering() {
    for engine in engines() {
        assert_eq!(engine.execute(&Operation::integer(2), &no_vars()), Ok(2.0));
        assert_eq!(
            engine.execute(&Operation::variable("2"), &no_vars()),
            Err(CalcError::VariableNotDefined {
                name: "2".to_string()
            })
        );

        assert_eq!(engine.execute(&Operation::constant(1.0), &no_vars()), Ok(1.0));
        let hash = HashMap::from([("#1".to_string(), 7.0)]);
        assert_eq!(engine.execute(&Operation::variable("#1"), &hash), Ok(7.0));

        let vars = HashMap::from([
            ("x".to_string(), 1.0),
            ("y".to_string(), 2.0),
            ("(x + y)".to_string(), 100.0),
        ]);
        let sum = Operation::add(Operation::variable("x"), Operation::variable("y"));
        assert_eq!(engine.execute(&sum, &vars), Ok(3.0));
        assert_eq!(engine.execute(&Operation::variable("(x + y)"), &vars), Ok(100.0));
    }
}

#[test]
fn deep_formulas_fail_instead_of_exhausting_the_stack() {
    let too_deep = Err(CalcError::TooDeep { limit: MAX_DEPTH });
    let mut tree = Operation::variable("x");
    for _ in 0..2 * MAX_DEPTH {
        tree = Operation::negate(tree);
    }
    let vars = HashMap::from([("x".to_string(), 1.0)]);
    let text = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    for engine in engines() {
        assert_eq!(engine.execute(&tree, &vars), too_deep);
        assert_eq!(engine.calculate(&text, &no_vars()), too_deep);
        // Nothing was cached for either.
        assert_eq!(engine.cache_stats().unwrap().entries, 0);
    }

    let nested = format!("{}x{}", "abs(".repeat(100), ")".repeat(100));
    for engine in engines() {
        assert_eq!(engine.calculate(&nested, &vars), Ok(1.0));
    }
}

#[test]
fn keys_differing_only_in_case_are_rejected() {
    let vars = HashMap::from([("X".to_string(), 1.0), ("x".to_string(), 2.0)]);
    for engine in engines() {
        assert_eq!(
            engine.calculate("x", &vars),
            Err(CalcError::DuplicateVariable {
                name: "x".to_string()
            })
        );
    }
}
