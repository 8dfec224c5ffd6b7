//! Lexical forms of typed values.
//!
//! [`TypedValue`] turns a scalar into its XML Schema lexical form:
//!
//! - integers: minimal decimal digits, optional leading `-`;
//! - floating point: the shortest representation that parses back to the
//!   same value, with `INF`, `-INF` and `NaN` for the non-finite values;
//! - booleans: `true` / `false`;
//! - [`BigInteger`] / [`BigDecimal`]: their canonical digit strings.
//!
//! None of these forms contains a character that needs escaping, which lets
//! the writer pass them straight to the output. Arrays are written as
//! space-separated tokens by [`lexicalize_array`].
//!
//! [`QName`] values are different: their lexical form depends on the
//! namespace bindings in scope, so the writer resolves them itself.

pub mod big;
pub mod buffer;

pub use big::{BigDecimal, BigInteger, ParseNumberError};
pub use buffer::{scratch, BufferPool, PooledBuffer};

/// A value with an XML lexical form.
pub trait TypedValue {
    /// Appends the lexical form to `out`.
    fn lexicalize(&self, out: &mut String);

    /// Returns the lexical form as a new string.
    fn to_lexical(&self) -> String {
        let mut out = String::new();
        self.lexicalize(&mut out);
        out
    }
}

impl TypedValue for bool {
    fn lexicalize(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

macro_rules! integer_typed_value {
    ($($t:ty),*) => {$(
        impl TypedValue for $t {
            fn lexicalize(&self, out: &mut String) {
                out.push_str(itoa::Buffer::new().format(*self));
            }
        }
    )*};
}

integer_typed_value!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! float_typed_value {
    ($($t:ty),*) => {$(
        impl TypedValue for $t {
            fn lexicalize(&self, out: &mut String) {
                if self.is_nan() {
                    out.push_str("NaN");
                } else if self.is_infinite() {
                    out.push_str(if self.is_sign_positive() { "INF" } else { "-INF" });
                } else {
                    out.push_str(ryu::Buffer::new().format_finite(*self));
                }
            }
        }
    )*};
}

float_typed_value!(f32, f64);

impl<T: TypedValue + ?Sized> TypedValue for &T {
    fn lexicalize(&self, out: &mut String) {
        (**self).lexicalize(out);
    }
}

/// Appends `values` as space-separated tokens.
///
/// With `leading_separator` set, a space is written before the first token
/// too, so consecutive array writes into the same element concatenate into
/// one list.
///
/// # Examples
///
/// ```
/// use xmlcursor::typed::lexicalize_array;
///
/// let mut out = String::new();
/// lexicalize_array(&[1, 2, 3], false, &mut out);
/// lexicalize_array(&[4], true, &mut out);
/// assert_eq!(out, "1 2 3 4");
/// ```
pub fn lexicalize_array<T: TypedValue>(values: &[T], leading_separator: bool, out: &mut String) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 || leading_separator {
            out.push(' ');
        }
        value.lexicalize(out);
    }
}

/// A qualified-name value (`xs:QName`).
///
/// The prefix is a suggestion; the writer picks whatever prefix is bound to
/// `namespace_uri` at the point of writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace URI, `""` for none.
    pub namespace_uri: String,
    /// Local part.
    pub local_name: String,
    /// Preferred prefix, if any.
    pub prefix: Option<String>,
}

impl QName {
    /// A name in no namespace.
    #[must_use]
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace_uri: String::new(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// A namespaced name without a preferred prefix.
    #[must_use]
    pub fn new(namespace_uri: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Sets the preferred prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(0i32.to_lexical(), "0");
        assert_eq!((-42i32).to_lexical(), "-42");
        assert_eq!(i64::MIN.to_lexical(), "-9223372036854775808");
        assert_eq!(u64::MAX.to_lexical(), "18446744073709551615");
    }

    #[test]
    fn test_booleans() {
        assert_eq!(true.to_lexical(), "true");
        assert_eq!(false.to_lexical(), "false");
    }

    #[test]
    fn test_floats_shortest_form() {
        assert_eq!(0.1f64.to_lexical(), "0.1");
        assert_eq!(1.0f64.to_lexical(), "1.0");
        assert_eq!(0.1f32.to_lexical(), "0.1");
        assert_eq!(1e300f64.to_lexical(), "1e300");
        assert_eq!((-0.0f64).to_lexical(), "-0.0");
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(f64::INFINITY.to_lexical(), "INF");
        assert_eq!(f64::NEG_INFINITY.to_lexical(), "-INF");
        assert_eq!(f32::NAN.to_lexical(), "NaN");
    }

    #[test]
    fn test_float_round_trip() {
        for value in [
            std::f64::consts::PI,
            f64::MIN_POSITIVE,
            f64::MAX,
            -123.456e-78,
            5e-324,
        ] {
            let parsed: f64 = value.to_lexical().parse().unwrap();
            assert_eq!(parsed.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_array_separators() {
        let mut out = String::new();
        lexicalize_array::<i32>(&[], true, &mut out);
        assert_eq!(out, "");
        lexicalize_array(&[1.5f64, -2.0], true, &mut out);
        assert_eq!(out, " 1.5 -2.0");
    }

    #[test]
    fn test_qname_builders() {
        let name = QName::new("urn:x", "item").with_prefix("x");
        assert_eq!(name.prefix.as_deref(), Some("x"));
        assert_eq!(QName::local("a").namespace_uri, "");
    }
}
