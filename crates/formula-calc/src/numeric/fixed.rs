use super::{ArithmeticResult, Numeric};
use crate::error::ArithmeticError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Q32.32 fixed-point number: `raw = value * 2^32`.
///
/// Addition, subtraction, multiplication and negation are checked; overflow is reported as
/// [`ArithmeticError::Overflow`] rather than saturated. Division and modulo by zero report
/// [`ArithmeticError::DivideByZero`].
#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Fixed64 {
    raw: i64,
}

impl Fixed64 {
    pub const FRAC_BITS: u32 = 32;
    pub const ONE_RAW: i64 = 1i64 << 32;
    const FRAC_MASK: i64 = Self::ONE_RAW - 1;
    const SCALE_F64: f64 = 4_294_967_296.0;

    pub const MIN: Fixed64 = Fixed64 { raw: i64::MIN };
    pub const MAX: Fixed64 = Fixed64 { raw: i64::MAX };
    pub const ZERO: Fixed64 = Fixed64 { raw: 0 };
    pub const ONE: Fixed64 = Fixed64 { raw: Self::ONE_RAW };

    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.raw
    }

    #[inline]
    pub const fn from_i32(value: i32) -> Self {
        Self {
            raw: (value as i64) << Self::FRAC_BITS,
        }
    }

    /// Integer part, rounded towards negative infinity.
    #[inline]
    pub const fn int_part(self) -> i64 {
        self.raw >> Self::FRAC_BITS
    }

    #[inline]
    pub const fn frac_part(self) -> i64 {
        self.raw & Self::FRAC_MASK
    }

    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.raw.checked_add(rhs.raw).map(Self::from_raw)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.raw.checked_sub(rhs.raw).map(Self::from_raw)
    }

    /// `(a * b) >> 32` with an `i128` intermediate.
    #[inline]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let prod = (self.raw as i128) * (rhs.raw as i128);
        narrow(prod >> Self::FRAC_BITS)
    }

    /// `(a << 32) / b`, truncated towards zero.
    #[inline]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.raw == 0 {
            return None;
        }
        let num = (self.raw as i128) << Self::FRAC_BITS;
        narrow(num / (rhs.raw as i128))
    }

    /// Remainder with the sign of the dividend; exact on the raw representation.
    #[inline]
    pub fn checked_rem(self, rhs: Self) -> Option<Self> {
        self.raw.checked_rem(rhs.raw).map(Self::from_raw)
    }

    #[inline]
    pub fn checked_neg(self) -> Option<Self> {
        self.raw.checked_neg().map(Self::from_raw)
    }

    fn from_f64_checked(value: f64) -> ArithmeticResult<Self> {
        if !value.is_finite() {
            return Err(ArithmeticError::NotRepresentable);
        }
        let scaled = (value * Self::SCALE_F64).round();
        // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
        if scaled >= 9_223_372_036_854_775_808.0 || scaled < -9_223_372_036_854_775_808.0 {
            return Err(ArithmeticError::Overflow);
        }
        Ok(Self::from_raw(scaled as i64))
    }

    /// Exact decimal -> binary conversion of canonical text, rounding half away from zero.
    fn parse_decimal(text: &str) -> Option<Self> {
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(idx) => (&text[..idx], text[idx + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let (negative, mantissa) = match mantissa.as_bytes().first() {
            Some(b'-') => (true, &mantissa[1..]),
            Some(b'+') => (false, &mantissa[1..]),
            _ => (false, mantissa),
        };
        let (int_digits, frac_digits) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }
        if !int_digits.bytes().chain(frac_digits.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        // Significant digits as an integer `m` with decimal scale `s`: value = m / 10^s.
        let int_digits = int_digits.trim_start_matches('0');
        let mut frac_digits = frac_digits.trim_end_matches('0');
        if int_digits.len() > 20 {
            return None;
        }
        // `m` must fit in a u128; fractional digits this far past 2^-32 no longer move the result.
        let max_frac = 28usize.saturating_sub(int_digits.len()).max(18);
        if frac_digits.len() > max_frac {
            frac_digits = &frac_digits[..max_frac];
        }
        let mut m: u128 = 0;
        for b in int_digits.bytes().chain(frac_digits.bytes()) {
            m = m.checked_mul(10)?.checked_add(u128::from(b - b'0'))?;
        }
        if m == 0 {
            return Some(Self::ZERO);
        }
        let scale = (frac_digits.len() as i32).checked_sub(exponent)?;

        let raw_magnitude: u128 = if scale <= 0 {
            let factor = 10u128.checked_pow(scale.unsigned_abs())?;
            m.checked_mul(factor)?.checked_mul(1u128 << Self::FRAC_BITS)?
        } else {
            if scale > 66 {
                return Some(Self::ZERO);
            }
            // Keep the remainder small enough that `r * 2^32` fits.
            let (m, scale) = if scale > 28 {
                let drop = 10u128.checked_pow((scale - 28) as u32).unwrap_or(u128::MAX);
                (m / drop + u128::from((m % drop) * 2 >= drop), 28)
            } else {
                (m, scale)
            };
            let divisor = 10u128.pow(scale as u32);
            // Split into quotient and remainder so `m * 2^32` never has to fit.
            let q = m / divisor;
            let r = m % divisor;
            let whole = q.checked_mul(1u128 << Self::FRAC_BITS)?;
            let frac_num = r.checked_mul(1u128 << Self::FRAC_BITS)?;
            let mut frac = frac_num / divisor;
            if (frac_num % divisor) * 2 >= divisor {
                frac += 1;
            }
            whole.checked_add(frac)?
        };

        if negative {
            if raw_magnitude > (i64::MAX as u128) + 1 {
                return None;
            }
            Some(Self::from_raw((raw_magnitude as i128).wrapping_neg() as i64))
        } else {
            i64::try_from(raw_magnitude).ok().map(Self::from_raw)
        }
    }
}

#[inline]
fn narrow(x: i128) -> Option<Fixed64> {
    i64::try_from(x).ok().map(Fixed64::from_raw)
}

impl Numeric for Fixed64 {
    const ZERO: Self = Fixed64::ZERO;
    const ONE: Self = Fixed64::ONE;
    // round(e * 2^32), round(pi * 2^32)
    const E: Self = Fixed64::from_raw(11_674_931_555);
    const PI: Self = Fixed64::from_raw(13_493_037_705);

    #[inline]
    fn from_i32(value: i32) -> Self {
        Fixed64::from_i32(value)
    }

    #[inline]
    fn from_f64(value: f64) -> ArithmeticResult<Self> {
        Self::from_f64_checked(value)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self.raw as f64 / Self::SCALE_F64
    }

    fn parse_canonical(text: &str) -> Option<Self> {
        Self::parse_decimal(text)
    }

    #[inline]
    fn add(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_add(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn subtract(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_sub(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn multiply(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_mul(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn divide(self, rhs: Self) -> ArithmeticResult<Self> {
        if rhs.raw == 0 {
            return Err(ArithmeticError::DivideByZero);
        }
        self.checked_div(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn modulo(self, rhs: Self) -> ArithmeticResult<Self> {
        if rhs.raw == 0 {
            return Err(ArithmeticError::DivideByZero);
        }
        // Only MIN % -epsilon overflows, and its remainder is zero.
        Ok(self.checked_rem(rhs).unwrap_or(Self::ZERO))
    }

    #[inline]
    fn negate(self) -> ArithmeticResult<Self> {
        self.checked_neg().ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn abs(self) -> ArithmeticResult<Self> {
        if self.raw < 0 {
            self.negate()
        } else {
            Ok(self)
        }
    }

    #[inline]
    fn floor(self) -> ArithmeticResult<Self> {
        Ok(Self::from_raw(self.raw & !Self::FRAC_MASK))
    }

    #[inline]
    fn ceiling(self) -> ArithmeticResult<Self> {
        if self.frac_part() == 0 {
            return Ok(self);
        }
        Self::from_raw(self.raw & !Self::FRAC_MASK)
            .checked_add(Self::ONE)
            .ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn truncate(self) -> ArithmeticResult<Self> {
        if self.raw < 0 {
            self.ceiling()
        } else {
            self.floor()
        }
    }
}

impl From<i32> for Fixed64 {
    fn from(value: i32) -> Self {
        Fixed64::from_i32(value)
    }
}

impl TryFrom<f64> for Fixed64 {
    type Error = ArithmeticError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Fixed64::from_f64_checked(value)
    }
}

impl std::str::FromStr for Fixed64 {
    type Err = ArithmeticError;

    /// Parses canonical (`en-US`) notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fixed64::parse_decimal(s.trim()).ok_or(ArithmeticError::NotRepresentable)
    }
}

/// Renders up to ten fractional digits with trailing zeros removed.
///
/// Ten digits are enough for the rendering to parse back to the same raw value.
impl fmt::Display for Fixed64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.raw < 0;
        let magnitude = (self.raw as i128).unsigned_abs();
        let int_part = magnitude >> Self::FRAC_BITS;
        let frac = magnitude & (Self::FRAC_MASK as u128);

        // frac / 2^32 * 10^10, rounded to nearest.
        let scaled = (frac * 10_000_000_000 + (1u128 << 31)) >> Self::FRAC_BITS;
        let (int_part, scaled) = if scaled >= 10_000_000_000 {
            (int_part + 1, scaled - 10_000_000_000)
        } else {
            (int_part, scaled)
        };

        let sign = if negative { "-" } else { "" };
        if scaled == 0 {
            write!(f, "{sign}{int_part}")
        } else {
            let digits = format!("{scaled:010}");
            write!(f, "{sign}{int_part}.{}", digits.trim_end_matches('0'))
        }
    }
}
