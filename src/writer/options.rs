//! Writer configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{Result, WriteError};

/// Options controlling checking, repair and output shape.
///
/// # Examples
///
/// ```
/// use xmlcursor::WriterOptions;
///
/// let opts = WriterOptions::default()
///     .repairing(true)
///     .automatic_ns_prefix("p")
///     .fix_content(true);
/// assert!(opts.repairing);
/// assert!(opts.check_structure);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Resolve names against namespaces. When off, names are written
    /// verbatim and namespace URIs are rejected.
    pub namespace_aware: bool,
    /// Generate and fix namespace bindings automatically.
    pub repairing: bool,
    /// Enforce prolog/epilog content rules, a single root element, and
    /// declaration placement.
    pub check_structure: bool,
    /// Reject duplicate attributes on one element.
    pub check_attributes: bool,
    /// Reject CDATA, comment and PI content containing its terminator, and
    /// unknown XML versions.
    pub check_content: bool,
    /// Rewrite CDATA and comment content so it stays well-formed instead of
    /// rejecting it.
    pub fix_content: bool,
    /// Check element, attribute, PI and entity names against the XML name
    /// grammar.
    pub check_names: bool,
    /// Write elements that end without content as `<a/>`.
    pub automatic_empty_elements: bool,
    /// Write CDATA as escaped character data.
    pub cdata_as_text: bool,
    /// Base of synthesized prefixes (`ns` gives `ns1`, `ns2`, ...).
    pub automatic_ns_prefix: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            namespace_aware: true,
            repairing: false,
            check_structure: true,
            check_attributes: true,
            check_content: true,
            fix_content: false,
            check_names: false,
            automatic_empty_elements: true,
            cdata_as_text: false,
            automatic_ns_prefix: "ns".to_string(),
        }
    }
}

impl WriterOptions {
    /// Enables or disables namespace awareness.
    #[must_use]
    pub fn namespace_aware(mut self, yes: bool) -> Self {
        self.namespace_aware = yes;
        self
    }

    /// Enables or disables repairing mode.
    #[must_use]
    pub fn repairing(mut self, yes: bool) -> Self {
        self.repairing = yes;
        self
    }

    /// Enables or disables structure checks.
    #[must_use]
    pub fn check_structure(mut self, yes: bool) -> Self {
        self.check_structure = yes;
        self
    }

    /// Enables or disables the duplicate attribute check.
    #[must_use]
    pub fn check_attributes(mut self, yes: bool) -> Self {
        self.check_attributes = yes;
        self
    }

    /// Enables or disables content checks.
    #[must_use]
    pub fn check_content(mut self, yes: bool) -> Self {
        self.check_content = yes;
        self
    }

    /// Enables or disables content fixing.
    #[must_use]
    pub fn fix_content(mut self, yes: bool) -> Self {
        self.fix_content = yes;
        self
    }

    /// Enables or disables name checks.
    #[must_use]
    pub fn check_names(mut self, yes: bool) -> Self {
        self.check_names = yes;
        self
    }

    /// Enables or disables `<a/>` output for elements without content.
    #[must_use]
    pub fn automatic_empty_elements(mut self, yes: bool) -> Self {
        self.automatic_empty_elements = yes;
        self
    }

    /// Enables or disables writing CDATA as character data.
    #[must_use]
    pub fn cdata_as_text(mut self, yes: bool) -> Self {
        self.cdata_as_text = yes;
        self
    }

    /// Sets the base of synthesized prefixes.
    #[must_use]
    pub fn automatic_ns_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.automatic_ns_prefix = prefix.into();
        self
    }

    /// Reads one option.
    #[must_use]
    pub fn get(&self, property: Property) -> PropertyValue {
        use PropertyValue::Bool;
        match property {
            Property::NamespaceAware => Bool(self.namespace_aware),
            Property::Repairing => Bool(self.repairing),
            Property::CheckStructure => Bool(self.check_structure),
            Property::CheckAttributes => Bool(self.check_attributes),
            Property::CheckContent => Bool(self.check_content),
            Property::FixContent => Bool(self.fix_content),
            Property::CheckNames => Bool(self.check_names),
            Property::AutomaticEmptyElements => Bool(self.automatic_empty_elements),
            Property::CdataAsText => Bool(self.cdata_as_text),
            Property::AutomaticNsPrefix => PropertyValue::Text(self.automatic_ns_prefix.clone()),
        }
    }

    /// Changes one option.
    ///
    /// Returns `false` for options that are fixed once a writer exists
    /// (namespace awareness and repairing mode), leaving them unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Structure`] if the value has the wrong type.
    pub fn set(&mut self, property: Property, value: PropertyValue) -> Result<bool> {
        let slot = match property {
            Property::NamespaceAware | Property::Repairing => return Ok(false),
            Property::AutomaticNsPrefix => {
                return match value {
                    PropertyValue::Text(text) => {
                        self.automatic_ns_prefix = text;
                        Ok(true)
                    }
                    PropertyValue::Bool(_) => Err(mismatch(property, &value)),
                };
            }
            Property::CheckStructure => &mut self.check_structure,
            Property::CheckAttributes => &mut self.check_attributes,
            Property::CheckContent => &mut self.check_content,
            Property::FixContent => &mut self.fix_content,
            Property::CheckNames => &mut self.check_names,
            Property::AutomaticEmptyElements => &mut self.automatic_empty_elements,
            Property::CdataAsText => &mut self.cdata_as_text,
        };
        match value {
            PropertyValue::Bool(yes) => {
                *slot = yes;
                Ok(true)
            }
            PropertyValue::Text(_) => Err(mismatch(property, &value)),
        }
    }
}

fn mismatch(property: Property, value: &PropertyValue) -> WriteError {
    WriteError::structure(format!(
        "property '{property}' does not accept the value {value}"
    ))
}

/// The recognized writer options, by stable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    NamespaceAware,
    Repairing,
    CheckStructure,
    CheckAttributes,
    CheckContent,
    FixContent,
    CheckNames,
    AutomaticEmptyElements,
    CdataAsText,
    AutomaticNsPrefix,
}

impl Property {
    /// Every recognized property.
    pub const ALL: [Property; 10] = [
        Self::NamespaceAware,
        Self::Repairing,
        Self::CheckStructure,
        Self::CheckAttributes,
        Self::CheckContent,
        Self::FixContent,
        Self::CheckNames,
        Self::AutomaticEmptyElements,
        Self::CdataAsText,
        Self::AutomaticNsPrefix,
    ];

    /// The stable name of the property.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NamespaceAware => "namespace-aware",
            Self::Repairing => "repairing-namespaces",
            Self::CheckStructure => "check-structure",
            Self::CheckAttributes => "check-attributes",
            Self::CheckContent => "check-content",
            Self::FixContent => "fix-content",
            Self::CheckNames => "check-names",
            Self::AutomaticEmptyElements => "automatic-empty-elements",
            Self::CdataAsText => "cdata-as-text",
            Self::AutomaticNsPrefix => "automatic-ns-prefix",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown property name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown writer property '{0}'")]
pub struct UnknownProperty(pub String);

impl FromStr for Property {
    type Err = UnknownProperty;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProperty(s.to_string()))
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(t) => write!(f, "'{t}'"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = WriterOptions::default();
        assert!(opts.namespace_aware);
        assert!(!opts.repairing);
        assert!(opts.check_content);
        assert!(!opts.fix_content);
        assert!(opts.automatic_empty_elements);
        assert_eq!(opts.automatic_ns_prefix, "ns");
    }

    #[test]
    fn test_property_names_round_trip() {
        for property in Property::ALL {
            assert_eq!(property.as_str().parse::<Property>(), Ok(property));
        }
        assert!("no-such-thing".parse::<Property>().is_err());
    }

    #[test]
    fn test_set_and_get() {
        let mut opts = WriterOptions::default();
        assert!(opts
            .set(Property::FixContent, PropertyValue::Bool(true))
            .unwrap());
        assert_eq!(opts.get(Property::FixContent), PropertyValue::Bool(true));
        assert!(opts
            .set(Property::AutomaticNsPrefix, PropertyValue::Text("gen".into()))
            .unwrap());
        assert_eq!(
            opts.get(Property::AutomaticNsPrefix),
            PropertyValue::Text("gen".into())
        );
    }

    #[test]
    fn test_fixed_properties_refused() {
        let mut opts = WriterOptions::default();
        assert!(!opts
            .set(Property::Repairing, PropertyValue::Bool(true))
            .unwrap());
        assert!(!opts.repairing);
    }

    #[test]
    fn test_type_mismatch() {
        let mut opts = WriterOptions::default();
        let err = opts
            .set(Property::CheckNames, PropertyValue::Text("yes".into()))
            .unwrap_err();
        assert!(matches!(err, WriteError::Structure { .. }));
        assert!(opts
            .set(Property::AutomaticNsPrefix, PropertyValue::Bool(true))
            .is_err());
    }
}
