use super::{ArithmeticResult, Numeric};

/// IEEE-754 double precision. No operation fails: division by zero yields `inf`/`NaN` and
/// overflow yields `inf`, exactly as the hardware does.
impl Numeric for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const E: Self = std::f64::consts::E;
    const PI: Self = std::f64::consts::PI;

    #[inline]
    fn from_i32(value: i32) -> Self {
        f64::from(value)
    }

    #[inline]
    fn from_f64(value: f64) -> ArithmeticResult<Self> {
        Ok(value)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn parse_canonical(text: &str) -> Option<Self> {
        text.parse::<f64>().ok()
    }

    #[inline]
    fn add(self, rhs: Self) -> ArithmeticResult<Self> {
        Ok(self + rhs)
    }

    #[inline]
    fn subtract(self, rhs: Self) -> ArithmeticResult<Self> {
        Ok(self - rhs)
    }

    #[inline]
    fn multiply(self, rhs: Self) -> ArithmeticResult<Self> {
        Ok(self * rhs)
    }

    #[inline]
    fn divide(self, rhs: Self) -> ArithmeticResult<Self> {
        Ok(self / rhs)
    }

    #[inline]
    fn modulo(self, rhs: Self) -> ArithmeticResult<Self> {
        Ok(self % rhs)
    }

    #[inline]
    fn negate(self) -> ArithmeticResult<Self> {
        Ok(-self)
    }

    #[inline]
    fn abs(self) -> ArithmeticResult<Self> {
        Ok(f64::abs(self))
    }

    #[inline]
    fn floor(self) -> ArithmeticResult<Self> {
        Ok(f64::floor(self))
    }

    #[inline]
    fn ceiling(self) -> ArithmeticResult<Self> {
        Ok(f64::ceil(self))
    }

    #[inline]
    fn truncate(self) -> ArithmeticResult<Self> {
        Ok(f64::trunc(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::NumberLocale;

    #[test]
    fn division_by_zero_follows_ieee() {
        assert_eq!(f64::divide(1.0, 0.0), Ok(f64::INFINITY));
        assert_eq!(f64::divide(-1.0, 0.0), Ok(f64::NEG_INFINITY));
        assert!(f64::divide(0.0, 0.0).unwrap().is_nan());
    }

    #[test]
    fn comparisons_are_exact_and_nan_is_unordered() {
        let sum = f64::add(0.1, 0.2).unwrap();
        assert_eq!(sum.equal(0.3), 0.0);
        assert_eq!(f64::NAN.equal(f64::NAN), 0.0);
        assert_eq!(f64::NAN.not_equal(f64::NAN), 1.0);
        assert_eq!(f64::NAN.less_than(1.0), 0.0);
        assert_eq!(2.0_f64.greater_or_equal(2.0), 1.0);
    }

    #[test]
    fn modulo_keeps_the_sign_of_the_dividend() {
        assert_eq!(f64::modulo(-7.0, 3.0), Ok(-1.0));
        assert_eq!(f64::modulo(7.0, -3.0), Ok(1.0));
    }

    #[test]
    fn parses_with_locale() {
        assert_eq!(f64::try_parse("1.234,5", &NumberLocale::de_de()), Some(1234.5));
        assert_eq!(f64::try_parse("2.5e2", &NumberLocale::en_us()), Some(250.0));
        assert_eq!(f64::try_parse("abc", &NumberLocale::en_us()), None);
    }
}
