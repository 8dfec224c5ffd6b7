//! `QName` (qualified name) handling and XML name checks.
//!
//! A `QName` is a name of the form `prefix:localname` or just `localname` (with
//! no prefix). The writer builds qualified names from a resolved prefix and a
//! local part, and optionally verifies caller-supplied names against the
//! `Name`/`NCName` productions.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

use std::borrow::Cow;

/// Splits a `QName` into its prefix and local name parts.
///
/// Returns `(Some(prefix), localname)` if the name contains a colon,
/// or `(None, localname)` if it does not.
///
/// # Examples
///
/// ```
/// use xmlcursor::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Joins a prefix and a local name. An empty prefix yields the bare local name.
#[must_use]
pub fn join_qname<'a>(prefix: &str, local: &'a str) -> Cow<'a, str> {
    if prefix.is_empty() {
        Cow::Borrowed(local)
    } else {
        Cow::Owned(format!("{prefix}:{local}"))
    }
}

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
#[must_use]
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 `[4a]`.
#[must_use]
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// Returns `true` if `name` matches the XML `Name` production.
#[must_use]
pub fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// Returns `true` if `name` is a `Name` without any colon (an `NCName`).
#[must_use]
pub fn is_ncname(name: &str) -> bool {
    !name.contains(':') && is_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname_with_prefix() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
    }

    #[test]
    fn test_split_qname_without_prefix() {
        assert_eq!(split_qname("div"), (None, "div"));
    }

    #[test]
    fn test_split_qname_colon_at_start() {
        assert_eq!(split_qname(":local"), (Some(""), "local"));
    }

    #[test]
    fn test_split_qname_multiple_colons() {
        // Only splits on first colon
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_join_qname() {
        assert_eq!(join_qname("", "root"), "root");
        assert_eq!(join_qname("ns1", "leaf"), "ns1:leaf");
    }

    #[test]
    fn test_is_name() {
        assert!(is_name("root"));
        assert!(is_name("_a.b-c"));
        assert!(is_name("svg:rect"));
        assert!(!is_name(""));
        assert!(!is_name("1abc"));
        assert!(!is_name("a b"));
    }

    #[test]
    fn test_is_ncname() {
        assert!(is_ncname("rect"));
        assert!(!is_ncname("svg:rect"));
        assert!(!is_ncname("-x"));
    }
}
