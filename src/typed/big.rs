//! Arbitrary-precision integer and decimal values in canonical lexical form.
//!
//! Writers only need the lexical form of these numbers, so they are stored
//! as validated canonical digit strings rather than as binary bignums.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::TypedValue;

/// Error returned when a string is not a valid integer or decimal literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} literal '{literal}'")]
pub struct ParseNumberError {
    kind: &'static str,
    literal: String,
}

impl ParseNumberError {
    fn new(kind: &'static str, literal: &str) -> Self {
        Self {
            kind,
            literal: literal.to_string(),
        }
    }
}

/// Splits an optional leading sign off `s`.
fn split_sign(s: &str) -> (bool, &str) {
    match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// An integer of any size, e.g. an `xs:integer` value.
///
/// Equality is on the canonical form: no `+`, no leading zeros, and no
/// negative zero.
///
/// # Examples
///
/// ```
/// use xmlcursor::typed::BigInteger;
///
/// let n: BigInteger = "-000123456789012345678901234567890".parse().unwrap();
/// assert_eq!(n.to_string(), "-123456789012345678901234567890");
/// assert_eq!("+0".parse::<BigInteger>().unwrap(), BigInteger::from(0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInteger {
    canonical: String,
}

impl BigInteger {
    /// The canonical lexical form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Returns `true` for values below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.canonical.starts_with('-')
    }
}

impl FromStr for BigInteger {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = split_sign(s);
        if digits.is_empty() || !all_digits(digits) {
            return Err(ParseNumberError::new("integer", s));
        }
        let digits = digits.trim_start_matches('0');
        let canonical = match (digits.is_empty(), negative) {
            (true, _) => "0".to_string(),
            (false, true) => format!("-{digits}"),
            (false, false) => digits.to_string(),
        };
        Ok(Self { canonical })
    }
}

macro_rules! big_integer_from {
    ($($t:ty),*) => {$(
        impl From<$t> for BigInteger {
            fn from(value: $t) -> Self {
                Self {
                    canonical: itoa::Buffer::new().format(value).to_string(),
                }
            }
        }
    )*};
}

big_integer_from!(i32, i64, i128, u32, u64, u128);

impl fmt::Display for BigInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl TypedValue for BigInteger {
    fn lexicalize(&self, out: &mut String) {
        out.push_str(&self.canonical);
    }
}

/// A decimal number of any size and precision, e.g. an `xs:decimal` value.
///
/// The canonical form has no `+`, no redundant leading zeros in the integer
/// part, no trailing zeros in the fraction, no decimal point when the
/// fraction is empty, and no negative zero.
///
/// # Examples
///
/// ```
/// use xmlcursor::typed::BigDecimal;
///
/// let d: BigDecimal = "+0012.3400".parse().unwrap();
/// assert_eq!(d.to_string(), "12.34");
/// assert_eq!(".5".parse::<BigDecimal>().unwrap().to_string(), "0.5");
/// assert_eq!("-0.000".parse::<BigDecimal>().unwrap().to_string(), "0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal {
    canonical: String,
}

impl BigDecimal {
    /// The canonical lexical form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Number of digits after the decimal point in canonical form.
    #[must_use]
    pub fn scale(&self) -> usize {
        self.canonical
            .find('.')
            .map_or(0, |dot| self.canonical.len() - dot - 1)
    }
}

impl FromStr for BigDecimal {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, unsigned) = split_sign(s);
        let (integral, fractional) = match unsigned.find('.') {
            Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
            None => (unsigned, ""),
        };
        if (integral.is_empty() && fractional.is_empty())
            || !all_digits(integral)
            || !all_digits(fractional)
        {
            return Err(ParseNumberError::new("decimal", s));
        }

        let integral = integral.trim_start_matches('0');
        let fractional = fractional.trim_end_matches('0');
        let mut canonical = String::with_capacity(integral.len() + fractional.len() + 3);
        if negative && !(integral.is_empty() && fractional.is_empty()) {
            canonical.push('-');
        }
        canonical.push_str(if integral.is_empty() { "0" } else { integral });
        if !fractional.is_empty() {
            canonical.push('.');
            canonical.push_str(fractional);
        }
        Ok(Self { canonical })
    }
}

impl From<BigInteger> for BigDecimal {
    fn from(value: BigInteger) -> Self {
        Self {
            canonical: value.canonical,
        }
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl TypedValue for BigDecimal {
    fn lexicalize(&self, out: &mut String) {
        out.push_str(&self.canonical);
    }
}
