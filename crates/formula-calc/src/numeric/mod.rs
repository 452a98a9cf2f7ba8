//! The numeric abstraction every backend is generic over.

mod fixed;
mod float;

pub use fixed::Fixed64;

use crate::error::ArithmeticError;
use crate::locale::NumberLocale;
use std::fmt;

pub type ArithmeticResult<T> = Result<T, ArithmeticError>;

/// Arithmetic, comparison and parsing for one numeric representation.
///
/// Implementations carry no state: every method is a pure function of its operands, so the
/// interpreter and the compiled backends can call them from any thread without synchronization.
///
/// Comparisons return [`Numeric::ONE`] or [`Numeric::ZERO`] instead of `bool` and use the type's
/// own `PartialEq`/`PartialOrd` with no tolerance: for `f64`, `0.1 + 0.2 == 0.3` is false.
pub trait Numeric:
    Copy + PartialEq + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const ZERO: Self;
    const ONE: Self;
    const E: Self;
    const PI: Self;

    fn from_i32(value: i32) -> Self;

    fn from_f64(value: f64) -> ArithmeticResult<Self>;

    fn to_f64(self) -> f64;

    /// Parse text already in canonical form (ASCII digits, optional sign, `.` decimal point,
    /// optional exponent).
    fn parse_canonical(text: &str) -> Option<Self>;

    fn add(self, rhs: Self) -> ArithmeticResult<Self>;

    fn subtract(self, rhs: Self) -> ArithmeticResult<Self>;

    fn multiply(self, rhs: Self) -> ArithmeticResult<Self>;

    fn divide(self, rhs: Self) -> ArithmeticResult<Self>;

    fn modulo(self, rhs: Self) -> ArithmeticResult<Self>;

    fn negate(self) -> ArithmeticResult<Self>;

    fn abs(self) -> ArithmeticResult<Self>;

    fn floor(self) -> ArithmeticResult<Self>;

    fn ceiling(self) -> ArithmeticResult<Self>;

    fn truncate(self) -> ArithmeticResult<Self>;

    /// Exponentiation is always carried out in `f64`.
    fn power(self, exponent: Self) -> ArithmeticResult<Self> {
        Self::from_f64(self.to_f64().powf(exponent.to_f64()))
    }

    fn try_parse(text: &str, locale: &NumberLocale) -> Option<Self> {
        locale
            .normalize(text)
            .and_then(|canonical| Self::parse_canonical(&canonical))
    }

    #[inline]
    fn less_than(self, rhs: Self) -> Self {
        Self::from_bool(self < rhs)
    }

    #[inline]
    fn less_or_equal(self, rhs: Self) -> Self {
        Self::from_bool(self <= rhs)
    }

    #[inline]
    fn greater_than(self, rhs: Self) -> Self {
        Self::from_bool(self > rhs)
    }

    #[inline]
    fn greater_or_equal(self, rhs: Self) -> Self {
        Self::from_bool(self >= rhs)
    }

    #[inline]
    fn equal(self, rhs: Self) -> Self {
        Self::from_bool(self == rhs)
    }

    #[inline]
    fn not_equal(self, rhs: Self) -> Self {
        Self::from_bool(self != rhs)
    }

    #[inline]
    fn from_bool(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    #[inline]
    fn is_nonzero(self) -> bool {
        self != Self::ZERO
    }
}
