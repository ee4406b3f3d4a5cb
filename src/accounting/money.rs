use std::str::FromStr;

use bigdecimal::{num_traits::Zero, BigDecimal, RoundingMode};

/// Two amounts closer than one cent are considered equal when settling
/// documents or checking balances.
pub fn settlement_tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AmountError {
    #[error("invalid amount: '{0}'")]
    Invalid(String),
    #[error("amount must not be negative: {0}")]
    Negative(BigDecimal),
}

pub fn to_cents(v: &BigDecimal) -> BigDecimal {
    v.with_scale_round(2, RoundingMode::HalfUp)
}

/// Unit costs and stock quantities keep four decimals.
pub fn to_cost(v: &BigDecimal) -> BigDecimal {
    v.with_scale_round(4, RoundingMode::HalfUp)
}

pub fn zero() -> BigDecimal {
    BigDecimal::zero().with_scale(2)
}

pub fn percent(v: &BigDecimal) -> BigDecimal {
    v / BigDecimal::from(100)
}

pub fn max_zero(v: BigDecimal) -> BigDecimal {
    if v < BigDecimal::zero() {
        zero()
    } else {
        v
    }
}

/// `a` and `b` differ by at most one cent.
pub fn nearly_equal(a: &BigDecimal, b: &BigDecimal) -> bool {
    (to_cents(a) - to_cents(b)).abs() <= settlement_tolerance()
}

/// Parses user input the way cashiers type it: Arabic-Indic digits, the
/// Arabic decimal separator and grouping spaces are all accepted.
pub fn parse_amount(s: &str) -> Result<Option<BigDecimal>, AmountError> {
    let normalized: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06f0}'..='\u{06f9}' => char::from(b'0' + (c as u32 - 0x06f0) as u8),
            '\u{066b}' | '\u{060c}' => '.',
            c => c,
        })
        .collect();

    if normalized.is_empty() {
        return Ok(None);
    }

    BigDecimal::from_str(&normalized)
        .map(Some)
        .map_err(|_| AmountError::Invalid(s.to_string()))
}

pub fn parse_non_negative(s: &str) -> Result<BigDecimal, AmountError> {
    let v = parse_amount(s)?.unwrap_or_else(zero);
    if v < BigDecimal::zero() {
        return Err(AmountError::Negative(v));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_cents(&d("2.345")), d("2.35"));
        assert_eq!(to_cents(&d("2.344")), d("2.34"));
        assert_eq!(to_cents(&d("-2.345")), d("-2.35"));
        assert_eq!(to_cost(&d("1.23455")), d("1.2346"));
    }

    #[test]
    fn parses_arabic_digits_and_separators() {
        assert_eq!(parse_amount("١٢٣٫٥").unwrap(), Some(d("123.5")));
        assert_eq!(parse_amount("۴۵").unwrap(), Some(d("45")));
        assert_eq!(parse_amount(" 1 250.75 ").unwrap(), Some(d("1250.75")));
        assert_eq!(parse_amount("").unwrap(), None);
        assert!(matches!(parse_amount("12a"), Err(AmountError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_where_required() {
        assert_eq!(parse_non_negative("").unwrap(), zero());
        assert!(matches!(
            parse_non_negative("-3"),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn one_cent_tolerance() {
        assert!(nearly_equal(&d("10.00"), &d("10.01")));
        assert!(!nearly_equal(&d("10.00"), &d("10.02")));
    }
}
