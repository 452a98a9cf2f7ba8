//! Built-in functions and constants, registered as non-overwritable by every engine.

use crate::error::CalcResult;
use crate::numeric::Numeric;
use crate::registry::{Callable, ConstantRegistry, FunctionRegistry};

/// Lifts an `f64` function into `T` via `to_f64`/`from_f64`.
fn via_f64<T: Numeric>(f: fn(f64) -> f64) -> Callable<T> {
    Callable::unary(move |x: T| Ok(T::from_f64(f(x.to_f64()))?))
}

fn acot(x: f64) -> f64 {
    (1.0 / x).atan()
}

fn csc(x: f64) -> f64 {
    1.0 / x.sin()
}

fn sec(x: f64) -> f64 {
    1.0 / x.cos()
}

fn cot(x: f64) -> f64 {
    1.0 / x.tan()
}

/// Returns whichever operand is NaN (x != x), otherwise `None`.
#[allow(clippy::eq_op)]
fn unordered<T: Numeric>(a: T, b: T) -> Option<T> {
    if a != a {
        Some(a)
    } else if b != b {
        Some(b)
    } else {
        None
    }
}

fn max<T: Numeric>(a: T, b: T) -> CalcResult<T> {
    Ok(unordered(a, b).unwrap_or(if b > a { b } else { a }))
}

fn min<T: Numeric>(a: T, b: T) -> CalcResult<T> {
    Ok(unordered(a, b).unwrap_or(if b < a { b } else { a }))
}

pub fn register_functions<T: Numeric>(registry: &mut FunctionRegistry<T>) -> CalcResult<()> {
    let transcendental: [(&str, fn(f64) -> f64); 13] = [
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("csc", csc),
        ("sec", sec),
        ("cot", cot),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("acot", acot),
        ("loge", f64::ln),
        ("log10", f64::log10),
        ("sqrt", f64::sqrt),
    ];
    for (name, f) in transcendental {
        registry.register(name, via_f64::<T>(f), false)?;
    }

    registry.register(
        "logn",
        Callable::binary(|a: T, b: T| Ok(T::from_f64(a.to_f64().ln() / b.to_f64().ln())?)),
        false,
    )?;

    registry.register("abs", Callable::unary(|x: T| Ok(x.abs()?)), false)?;
    registry.register("ceiling", Callable::unary(|x: T| Ok(x.ceiling()?)), false)?;
    registry.register("floor", Callable::unary(|x: T| Ok(x.floor()?)), false)?;
    registry.register("truncate", Callable::unary(|x: T| Ok(x.truncate()?)), false)?;
    registry.register("max", Callable::binary(max::<T>), false)?;
    registry.register("min", Callable::binary(min::<T>), false)?;

    // Both branches are evaluated before the call; `if` only selects.
    registry.register(
        "if",
        Callable::ternary(|cond: T, then: T, otherwise: T| {
            Ok(if cond.is_nonzero() { then } else { otherwise })
        }),
        false,
    )?;
    registry.register(
        "ifless",
        Callable::quaternary(|a: T, b: T, then: T, otherwise: T| {
            Ok(if a < b { then } else { otherwise })
        }),
        false,
    )?;
    registry.register(
        "ifmore",
        Callable::quaternary(|a: T, b: T, then: T, otherwise: T| {
            Ok(if a > b { then } else { otherwise })
        }),
        false,
    )?;
    registry.register(
        "ifequal",
        Callable::quaternary(|a: T, b: T, then: T, otherwise: T| {
            Ok(if a == b { then } else { otherwise })
        }),
        false,
    )?;
    Ok(())
}

pub fn register_constants<T: Numeric>(registry: &mut ConstantRegistry<T>) -> CalcResult<()> {
    registry.register("e", T::E, false)?;
    registry.register("pi", T::PI, false)?;
    Ok(())
}
