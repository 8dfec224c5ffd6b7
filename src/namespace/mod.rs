//! Scoped namespace bindings and the prefix repair algorithm.
//!
//! Each open element owns a [`Bindings`] set: the `(prefix, uri)` pairs
//! declared on that element. A [`ScopeChain`] exposes those sets innermost
//! first, which is all the resolution logic needs; the writer backs it with
//! its frame stack, but any stack of `Bindings` works.
//!
//! [`NamespaceBinder`] decides which prefix an element or attribute gets:
//!
//! * in **non-repairing** mode it only looks prefixes up and fails with
//!   [`WriteError::NamespaceConstraint`] when nothing is bound;
//! * in **repairing** mode it reuses valid bindings, honours caller hints,
//!   and finally synthesizes `ns1`, `ns2`, ... from a counter that never
//!   hands out a written prefix twice.
//!
//! The prefix `""` stands for the default namespace, and the URI `""` for
//! "no namespace". The `xml` and `xmlns` prefixes are implicitly bound and
//! can never be rebound.

use std::borrow::Cow;
use std::collections::HashMap;

use log::debug;

use crate::error::{Result, WriteError};
use crate::util::qname::join_qname;

/// The namespace URI permanently bound to the `xml` prefix.
pub const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace URI permanently bound to the `xmlns` prefix.
pub const XMLNS_NS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// A single prefix-to-URI binding. An empty prefix is the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    /// The bound prefix (`""` for the default namespace).
    pub prefix: String,
    /// The namespace URI (`""` undeclares the default namespace).
    pub uri: String,
}

/// A namespace-qualified name as seen by backends and validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedName<'a> {
    /// Resolved prefix, `""` when unprefixed.
    pub prefix: &'a str,
    /// Local part of the name.
    pub local_name: &'a str,
    /// Namespace URI, `""` when in no namespace.
    pub namespace_uri: &'a str,
}

impl<'a> ExpandedName<'a> {
    /// Creates a name from its parts.
    #[must_use]
    pub fn new(prefix: &'a str, local_name: &'a str, namespace_uri: &'a str) -> Self {
        Self {
            prefix,
            local_name,
            namespace_uri,
        }
    }

    /// Returns the `prefix:local` form written to the output.
    #[must_use]
    pub fn qualified(&self) -> Cow<'a, str> {
        join_qname(self.prefix, self.local_name)
    }
}

/// The namespace declarations made on one element.
///
/// Declarations are unique per prefix: a set never holds two bindings for
/// the same prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    decls: Vec<NamespaceBinding>,
}

impl Bindings {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the URI bound to `prefix` in this set, if declared here.
    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.decls
            .iter()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
    }

    /// Returns `true` if this set declares `prefix`.
    #[must_use]
    pub fn declares(&self, prefix: &str) -> bool {
        self.decls.iter().any(|b| b.prefix == prefix)
    }

    /// Adds a binding. Returns `false` (and changes nothing) if the prefix
    /// is already declared in this set.
    pub fn bind(&mut self, prefix: &str, uri: &str) -> bool {
        if self.declares(prefix) {
            return false;
        }
        self.decls.push(NamespaceBinding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        true
    }

    /// Iterates over the declarations in the order they were made.
    pub fn iter(&self) -> std::slice::Iter<'_, NamespaceBinding> {
        self.decls.iter()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Returns `true` if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

impl<'a> IntoIterator for &'a Bindings {
    type Item = &'a NamespaceBinding;
    type IntoIter = std::slice::Iter<'a, NamespaceBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Whether a prefix may be used for a URI at some point in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixStatus {
    /// The prefix currently resolves to the URI.
    Bound,
    /// The prefix resolves to nothing.
    Unbound,
    /// The prefix resolves to a different URI.
    Misbound,
}

/// An innermost-first view over nested [`Bindings`].
///
/// Implementors only provide indexed access; resolution is shared.
pub trait ScopeChain {
    /// Number of scopes in the chain.
    fn scope_count(&self) -> usize;

    /// Returns the scope at `depth`, where depth 0 is the innermost.
    fn scope(&self, depth: usize) -> Option<&Bindings>;

    /// Resolves `prefix` to its URI, walking from the innermost scope out.
    ///
    /// `xml` and `xmlns` always resolve to their fixed URIs. The default
    /// prefix resolves to `Some("")` once undeclared with `xmlns=""`.
    fn resolve(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => return Some(XML_NS_URI),
            "xmlns" => return Some(XMLNS_NS_URI),
            _ => {}
        }
        (0..self.scope_count())
            .filter_map(|depth| self.scope(depth))
            .find_map(|scope| scope.get(prefix))
    }

    /// Returns the default namespace in effect (`""` if none).
    fn default_namespace(&self) -> &str {
        self.resolve("").unwrap_or("")
    }

    /// Classifies `prefix` against `uri`.
    fn prefix_status(&self, prefix: &str, uri: &str) -> PrefixStatus {
        let resolved = if prefix.is_empty() {
            Some(self.default_namespace())
        } else {
            self.resolve(prefix)
        };
        match resolved {
            Some(bound) if bound == uri => PrefixStatus::Bound,
            Some(_) => PrefixStatus::Misbound,
            None => PrefixStatus::Unbound,
        }
    }

    /// Finds a prefix that currently resolves to `uri`, innermost first.
    ///
    /// Shadowed bindings are skipped. The default namespace (`""`) is only
    /// considered when `include_default` is set, since attributes can
    /// never use it.
    fn find_prefix(&self, uri: &str, include_default: bool) -> Option<&str> {
        if uri == XML_NS_URI {
            return Some("xml");
        }
        for depth in 0..self.scope_count() {
            let Some(scope) = self.scope(depth) else {
                continue;
            };
            for binding in scope {
                if binding.uri != uri || (binding.prefix.is_empty() && !include_default) {
                    continue;
                }
                if self.prefix_status(&binding.prefix, uri) == PrefixStatus::Bound {
                    return Some(binding.prefix.as_str());
                }
            }
        }
        None
    }
}

impl ScopeChain for [Bindings] {
    fn scope_count(&self) -> usize {
        self.len()
    }

    fn scope(&self, depth: usize) -> Option<&Bindings> {
        self.len()
            .checked_sub(depth + 1)
            .and_then(|index| self.get(index))
    }
}

/// A chain extended by one scope that is not (yet) part of it, such as the
/// frame of an element being started.
pub struct Nested<'a, C: ScopeChain + ?Sized> {
    /// The new innermost scope.
    pub inner: &'a Bindings,
    /// Everything outside it.
    pub outer: &'a C,
}

impl<C: ScopeChain + ?Sized> ScopeChain for Nested<'_, C> {
    fn scope_count(&self) -> usize {
        self.outer.scope_count() + 1
    }

    fn scope(&self, depth: usize) -> Option<&Bindings> {
        match depth {
            0 => Some(self.inner),
            _ => self.outer.scope(depth - 1),
        }
    }
}

/// Verifies the reserved-prefix rules for binding `prefix` to `uri`.
///
/// # Errors
///
/// Returns [`WriteError::NamespaceConstraint`] if `xml` or `xmlns` would be
/// bound to anything but their fixed URIs, or if either fixed URI would be
/// bound to another prefix.
pub fn check_reserved(prefix: &str, uri: &str) -> Result<()> {
    match prefix {
        "xml" if uri != XML_NS_URI => Err(WriteError::namespace(format!(
            "prefix 'xml' can only be bound to '{XML_NS_URI}', not '{uri}'"
        ))),
        "xmlns" if uri != XMLNS_NS_URI => Err(WriteError::namespace(format!(
            "prefix 'xmlns' can only be bound to '{XMLNS_NS_URI}', not '{uri}'"
        ))),
        "xml" | "xmlns" => Ok(()),
        _ if uri == XML_NS_URI => Err(WriteError::namespace(format!(
            "namespace '{XML_NS_URI}' can only be bound to prefix 'xml', not '{prefix}'"
        ))),
        _ if uri == XMLNS_NS_URI => Err(WriteError::namespace(format!(
            "namespace '{XMLNS_NS_URI}' can only be bound to prefix 'xmlns', not '{prefix}'"
        ))),
        _ => Ok(()),
    }
}

/// Caller-supplied URI → prefix hints. Advisory only: nothing here is
/// ever written unless the binder picks it.
#[derive(Debug, Clone, Default)]
pub struct SuggestedPrefixes {
    by_uri: HashMap<String, String>,
    default_uri: Option<String>,
}

impl SuggestedPrefixes {
    /// Records `prefix` as the preferred prefix for `uri`. An empty prefix
    /// records a default-namespace preference.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::NamespaceConstraint`] for reserved-prefix
    /// violations.
    pub fn set_prefix(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            self.set_default(uri);
            return Ok(());
        }
        check_reserved(prefix, uri)?;
        self.by_uri.insert(uri.to_string(), prefix.to_string());
        Ok(())
    }

    /// Records `uri` as the preferred default namespace. `""` clears it.
    pub fn set_default(&mut self, uri: &str) {
        self.default_uri = (!uri.is_empty()).then(|| uri.to_string());
    }

    /// The preferred default namespace, if any.
    #[must_use]
    pub fn default_uri(&self) -> Option<&str> {
        self.default_uri.as_deref()
    }

    /// The explicit (non-default) prefix hint for `uri`.
    #[must_use]
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.by_uri.get(uri).map(String::as_str)
    }

    /// Hint for an element name: the default namespace preference wins
    /// over an explicit prefix.
    #[must_use]
    pub fn element_hint(&self, uri: &str) -> Option<&str> {
        if self.default_uri.as_deref() == Some(uri) {
            return Some("");
        }
        self.prefix_for(uri)
    }
}

/// Monotonic source of synthesized prefixes.
///
/// The counter is never reset, so a prefix that reached the output is never
/// handed out twice by one writer even after its scope closes. Only numbers
/// taken by a call that then failed before writing anything are given back
/// (see [`rewind`](Self::rewind)).
#[derive(Debug, Clone)]
pub struct AutoPrefixSequence {
    base: String,
    next: u32,
}

impl AutoPrefixSequence {
    /// Creates a sequence producing `base1`, `base2`, ...
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            next: 1,
        }
    }

    /// Changes the base of later prefixes. The counter carries on.
    pub fn set_base(&mut self, base: &str) {
        self.base = base.to_string();
    }

    /// The value the next call to [`generate`](Self::generate) starts from.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Gives back the numbers generated since [`peek`](Self::peek) returned
    /// `mark`. The caller guarantees none of them was written.
    pub fn rewind(&mut self, mark: u32) {
        if mark < self.next {
            self.next = mark;
        }
    }

    /// Produces the next prefix for which `in_use` is false.
    pub fn generate(&mut self, mut in_use: impl FnMut(&str) -> bool) -> String {
        loop {
            let mut candidate = String::with_capacity(self.base.len() + 4);
            candidate.push_str(&self.base);
            candidate.push_str(itoa::Buffer::new().format(self.next));
            self.next += 1;
            if !in_use(&candidate) {
                return candidate;
            }
        }
    }
}

/// The outcome of resolving a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixResolution {
    /// Prefix to write (`""` for none).
    pub prefix: String,
    /// Whether `prefix` must be declared on the element being written.
    pub declare: bool,
}

impl PrefixResolution {
    fn existing(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            declare: false,
        }
    }

    fn declared(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            declare: true,
        }
    }
}

/// What to do with an explicit namespace declaration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationOutcome {
    /// Write the declaration and record the binding.
    Declare,
    /// Nothing to write: already declared identically, implicitly bound, or
    /// (in repairing mode) conflicting and therefore ignored.
    Skip,
}

/// Prefix resolution and repair for one writer instance.
#[derive(Debug, Clone)]
pub struct NamespaceBinder {
    repairing: bool,
    suggested: SuggestedPrefixes,
    sequence: AutoPrefixSequence,
}

impl NamespaceBinder {
    /// Creates a binder. `auto_prefix` is the base of synthesized prefixes.
    #[must_use]
    pub fn new(repairing: bool, auto_prefix: &str) -> Self {
        Self {
            repairing,
            suggested: SuggestedPrefixes::default(),
            sequence: AutoPrefixSequence::new(auto_prefix),
        }
    }

    /// Whether the repair algorithm is active.
    #[must_use]
    pub fn is_repairing(&self) -> bool {
        self.repairing
    }

    /// The caller hint table.
    #[must_use]
    pub fn suggested(&self) -> &SuggestedPrefixes {
        &self.suggested
    }

    /// Mutable access to the caller hint table.
    pub fn suggested_mut(&mut self) -> &mut SuggestedPrefixes {
        &mut self.suggested
    }

    /// The synthesized-prefix counter.
    #[must_use]
    pub fn sequence(&self) -> &AutoPrefixSequence {
        &self.sequence
    }

    /// Releases prefixes synthesized since the sequence stood at `mark`,
    /// after the call that needed them failed without writing them.
    pub fn release_prefixes(&mut self, mark: u32) {
        if self.sequence.peek() != mark {
            debug!("releasing synthesized prefixes from {mark}");
            self.sequence.rewind(mark);
        }
    }

    /// Changes the base of synthesized prefixes.
    pub fn set_auto_prefix(&mut self, base: &str) {
        self.sequence.set_base(base);
    }

    /// Resolves the prefix for an element in `uri`.
    ///
    /// `scope` must have the new element's (still empty) bindings as its
    /// innermost scope.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::NamespaceConstraint`] on reserved-prefix
    /// violations, or in non-repairing mode when no prefix is bound for a
    /// non-empty `uri`.
    pub fn resolve_element<C: ScopeChain + ?Sized>(
        &mut self,
        suggested: Option<&str>,
        uri: &str,
        scope: &C,
    ) -> Result<PrefixResolution> {
        if uri == XMLNS_NS_URI {
            return Err(WriteError::namespace(format!(
                "elements cannot be in the '{XMLNS_NS_URI}' namespace"
            )));
        }
        if !self.repairing {
            return self.lookup_element(suggested, uri, scope);
        }

        // No namespace: only the default prefix works, possibly undeclared.
        if uri.is_empty() {
            if scope.default_namespace().is_empty() {
                return Ok(PrefixResolution::existing(""));
            }
            debug!("undeclaring default namespace for element in no namespace");
            return Ok(PrefixResolution::declared(""));
        }

        if let Some(prefix) = suggested {
            check_reserved(prefix, uri)?;
            if scope.prefix_status(prefix, uri) == PrefixStatus::Bound {
                return Ok(PrefixResolution::existing(prefix));
            }
        }

        if let Some(prefix) = scope.find_prefix(uri, true) {
            return Ok(PrefixResolution::existing(prefix));
        }

        // The element's own scope is fresh, so any hint can be bound there.
        if let Some(prefix) = suggested.or_else(|| self.suggested.element_hint(uri)) {
            check_reserved(prefix, uri)?;
            debug!("binding hinted prefix '{prefix}' to '{uri}' on element");
            return Ok(PrefixResolution::declared(prefix));
        }

        check_bindable(uri)?;
        let innermost = scope.scope(0);
        let prefix = self
            .sequence
            .generate(|candidate| innermost.is_some_and(|b| b.declares(candidate)));
        debug!("synthesized prefix '{prefix}' for '{uri}' on element");
        Ok(PrefixResolution::declared(prefix))
    }

    fn lookup_element<C: ScopeChain + ?Sized>(
        &self,
        suggested: Option<&str>,
        uri: &str,
        scope: &C,
    ) -> Result<PrefixResolution> {
        if let Some(prefix) = suggested {
            if !prefix.is_empty() {
                check_reserved(prefix, uri)?;
            }
            return Ok(PrefixResolution::existing(prefix));
        }
        if uri.is_empty() {
            return Ok(PrefixResolution::existing(""));
        }
        scope
            .find_prefix(uri, true)
            .or_else(|| self.suggested.element_hint(uri))
            .map(PrefixResolution::existing)
            .ok_or_else(|| unbound_uri(uri))
    }

    /// Resolves the prefix for an attribute in `uri`.
    ///
    /// `scope` must have the open element's bindings as its innermost
    /// scope. Attributes never use the default namespace, and never rebind
    /// a prefix that is already in use.
    ///
    /// # Errors
    ///
    /// Same conditions as [`resolve_element`](Self::resolve_element).
    pub fn resolve_attribute<C: ScopeChain + ?Sized>(
        &mut self,
        suggested: Option<&str>,
        uri: &str,
        scope: &C,
    ) -> Result<PrefixResolution> {
        let suggested = suggested.filter(|p| !p.is_empty());
        if !self.repairing {
            return self.lookup_attribute(suggested, uri, scope);
        }

        if uri.is_empty() {
            return Ok(PrefixResolution::existing(""));
        }

        if let Some(prefix) = suggested {
            check_reserved(prefix, uri)?;
            match scope.prefix_status(prefix, uri) {
                PrefixStatus::Bound => return Ok(PrefixResolution::existing(prefix)),
                PrefixStatus::Unbound => {
                    debug!("binding suggested prefix '{prefix}' to '{uri}' for attribute");
                    return Ok(PrefixResolution::declared(prefix));
                }
                PrefixStatus::Misbound => {}
            }
        }

        if let Some(prefix) = scope.find_prefix(uri, false) {
            return Ok(PrefixResolution::existing(prefix));
        }

        let hint = suggested
            .or_else(|| self.suggested.prefix_for(uri))
            .filter(|p| !p.is_empty() && scope.resolve(p).is_none());
        if let Some(prefix) = hint {
            check_reserved(prefix, uri)?;
            debug!("binding hinted prefix '{prefix}' to '{uri}' for attribute");
            return Ok(PrefixResolution::declared(prefix));
        }

        check_bindable(uri)?;
        let prefix = self
            .sequence
            .generate(|candidate| scope.resolve(candidate).is_some());
        debug!("synthesized prefix '{prefix}' for '{uri}' for attribute");
        Ok(PrefixResolution::declared(prefix))
    }

    fn lookup_attribute<C: ScopeChain + ?Sized>(
        &self,
        suggested: Option<&str>,
        uri: &str,
        scope: &C,
    ) -> Result<PrefixResolution> {
        if let Some(prefix) = suggested {
            check_reserved(prefix, uri)?;
            return Ok(PrefixResolution::existing(prefix));
        }
        if uri.is_empty() {
            return Ok(PrefixResolution::existing(""));
        }
        scope
            .find_prefix(uri, false)
            .or_else(|| self.suggested.prefix_for(uri))
            .map(PrefixResolution::existing)
            .ok_or_else(|| unbound_uri(uri))
    }

    /// Decides whether an explicit `xmlns[:prefix]="uri"` request on the
    /// open element is written.
    ///
    /// `current` holds the open element's declarations; `in_use` is the URI
    /// the element name or one of its attributes already uses `prefix` for.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::NamespaceConstraint`] for reserved-prefix
    /// violations, for unbinding a non-default prefix, and (non-repairing
    /// mode only) for conflicting redeclarations.
    pub fn check_declaration(
        &self,
        prefix: &str,
        uri: &str,
        current: &Bindings,
        in_use: Option<&str>,
    ) -> Result<DeclarationOutcome> {
        if prefix == "xmlns" {
            return Err(WriteError::namespace("prefix 'xmlns' must not be declared"));
        }
        check_reserved(prefix, uri)?;
        if prefix == "xml" {
            return Ok(DeclarationOutcome::Skip);
        }
        if !prefix.is_empty() && uri.is_empty() {
            return Err(WriteError::namespace(format!(
                "prefix '{prefix}' cannot be bound to the empty namespace"
            )));
        }

        let conflict = match current.get(prefix) {
            Some(existing) if existing == uri => return Ok(DeclarationOutcome::Skip),
            Some(existing) => Some(existing),
            None => in_use.filter(|used| *used != uri),
        };
        match conflict {
            None => Ok(DeclarationOutcome::Declare),
            Some(existing) if self.repairing => {
                debug!(
                    "ignoring declaration of '{prefix}' as '{uri}': already bound to '{existing}' on this element"
                );
                Ok(DeclarationOutcome::Skip)
            }
            Some(existing) => Err(WriteError::namespace(format!(
                "prefix '{prefix}' is already bound to '{existing}' on this element"
            ))),
        }
    }
}

/// The reserved URIs only ever go with their fixed prefixes, so no
/// generated prefix may be declared for them.
fn check_bindable(uri: &str) -> Result<()> {
    if uri == XML_NS_URI || uri == XMLNS_NS_URI {
        return Err(WriteError::namespace(format!(
            "namespace '{uri}' cannot be bound to a generated prefix"
        )));
    }
    Ok(())
}

fn unbound_uri(uri: &str) -> WriteError {
    WriteError::namespace(format!("no prefix bound for URI '{uri}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        let mut b = Bindings::new();
        for (prefix, uri) in pairs {
            b.bind(prefix, uri);
        }
        b
    }

    #[test]
    fn test_resolve_walks_outward() {
        let chain = vec![
            bindings(&[("a", "urn:outer"), ("", "urn:default")]),
            bindings(&[("a", "urn:inner")]),
        ];
        assert_eq!(chain.resolve("a"), Some("urn:inner"));
        assert_eq!(chain.default_namespace(), "urn:default");
        assert_eq!(chain.resolve("b"), None);
        assert_eq!(chain.resolve("xml"), Some(XML_NS_URI));
    }

    #[test]
    fn test_undeclared_default_namespace() {
        let chain = vec![bindings(&[("", "urn:d")]), bindings(&[("", "")])];
        assert_eq!(chain.default_namespace(), "");
        assert_eq!(chain.prefix_status("", ""), PrefixStatus::Bound);
    }

    #[test]
    fn test_find_prefix_skips_shadowed_binding() {
        let chain = vec![bindings(&[("p", "urn:a")]), bindings(&[("p", "urn:b")])];
        assert_eq!(chain.find_prefix("urn:a", true), None);
        assert_eq!(chain.find_prefix("urn:b", true), Some("p"));
    }

    #[test]
    fn test_find_prefix_default_only_for_elements() {
        let chain = vec![bindings(&[("", "urn:d")])];
        assert_eq!(chain.find_prefix("urn:d", true), Some(""));
        assert_eq!(chain.find_prefix("urn:d", false), None);
    }

    #[test]
    fn test_check_reserved() {
        assert!(check_reserved("xml", XML_NS_URI).is_ok());
        assert!(check_reserved("xml", "urn:other").is_err());
        assert!(check_reserved("xmlns", "urn:other").is_err());
        assert!(check_reserved("foo", XML_NS_URI).is_err());
        assert!(check_reserved("foo", XMLNS_NS_URI).is_err());
        assert!(check_reserved("foo", "urn:foo").is_ok());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut seq = AutoPrefixSequence::new("ns");
        assert_eq!(seq.generate(|_| false), "ns1");
        assert_eq!(seq.generate(|p| p == "ns2"), "ns3");
        assert_eq!(seq.generate(|_| false), "ns4");
        assert_eq!(seq.peek(), 5);
        seq.rewind(4);
        assert_eq!(seq.generate(|_| false), "ns4");
        seq.rewind(9);
        assert_eq!(seq.peek(), 5);
    }

    #[test]
    fn test_repairing_element_synthesizes_prefix() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let outer: Vec<Bindings> = Vec::new();
        let fresh = Bindings::new();
        let scope = Nested {
            inner: &fresh,
            outer: outer.as_slice(),
        };
        let res = binder.resolve_element(None, "urn:x", &scope).unwrap();
        assert_eq!(res, PrefixResolution::declared("ns1"));
    }

    #[test]
    fn test_repairing_element_reuses_outer_binding() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let outer = vec![bindings(&[("foo", "http://bar")])];
        let fresh = Bindings::new();
        let scope = Nested {
            inner: &fresh,
            outer: outer.as_slice(),
        };
        let res = binder.resolve_element(None, "http://bar", &scope).unwrap();
        assert_eq!(res, PrefixResolution::existing("foo"));
    }

    #[test]
    fn test_repairing_element_empty_uri_under_default() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let outer = vec![bindings(&[("", "urn:d")])];
        let fresh = Bindings::new();
        let scope = Nested {
            inner: &fresh,
            outer: outer.as_slice(),
        };
        let res = binder.resolve_element(None, "", &scope).unwrap();
        assert_eq!(res, PrefixResolution::declared(""));

        let none: Vec<Bindings> = Vec::new();
        let scope = Nested {
            inner: &fresh,
            outer: none.as_slice(),
        };
        let res = binder.resolve_element(None, "", &scope).unwrap();
        assert_eq!(res, PrefixResolution::existing(""));
    }

    #[test]
    fn test_repairing_element_default_hint() {
        let mut binder = NamespaceBinder::new(true, "ns");
        binder.suggested_mut().set_default("urn:d");
        let fresh = Bindings::new();
        let outer: Vec<Bindings> = Vec::new();
        let scope = Nested {
            inner: &fresh,
            outer: outer.as_slice(),
        };
        let res = binder.resolve_element(None, "urn:d", &scope).unwrap();
        assert_eq!(res, PrefixResolution::declared(""));
    }

    #[test]
    fn test_non_repairing_element_requires_binding() {
        let mut binder = NamespaceBinder::new(false, "ns");
        let chain: Vec<Bindings> = vec![Bindings::new()];
        let err = binder
            .resolve_element(None, "urn:x", chain.as_slice())
            .unwrap_err();
        assert!(matches!(err, WriteError::NamespaceConstraint { .. }));
        assert!(err.to_string().contains("no prefix bound for URI"));
    }

    #[test]
    fn test_repairing_attribute_binds_unbound_suggestion() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let chain = vec![Bindings::new()];
        let res = binder
            .resolve_attribute(Some("a"), "urn:a", chain.as_slice())
            .unwrap();
        assert_eq!(res, PrefixResolution::declared("a"));
    }

    #[test]
    fn test_repairing_attribute_never_uses_default() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let chain = vec![bindings(&[("", "urn:d")])];
        let res = binder
            .resolve_attribute(None, "urn:d", chain.as_slice())
            .unwrap();
        assert_eq!(res, PrefixResolution::declared("ns1"));
    }

    #[test]
    fn test_repairing_attribute_rejects_bound_hint() {
        let mut binder = NamespaceBinder::new(true, "ns");
        binder.suggested_mut().set_prefix("p", "urn:new").unwrap();
        let chain = vec![bindings(&[("p", "urn:old")])];
        let res = binder
            .resolve_attribute(None, "urn:new", chain.as_slice())
            .unwrap();
        assert_eq!(res, PrefixResolution::declared("ns1"));
    }

    #[test]
    fn test_repairing_attribute_misbound_suggestion_falls_back() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let chain = vec![bindings(&[("p", "urn:old"), ("q", "urn:new")])];
        let res = binder
            .resolve_attribute(Some("p"), "urn:new", chain.as_slice())
            .unwrap();
        assert_eq!(res, PrefixResolution::existing("q"));
    }

    #[test]
    fn test_xmlns_uri_never_gets_a_prefix() {
        let mut binder = NamespaceBinder::new(true, "ns");
        let chain = vec![Bindings::new()];
        for result in [
            binder.resolve_element(None, XMLNS_NS_URI, chain.as_slice()),
            binder.resolve_element(Some("x"), XMLNS_NS_URI, chain.as_slice()),
            binder.resolve_attribute(None, XMLNS_NS_URI, chain.as_slice()),
        ] {
            assert!(matches!(result, Err(WriteError::NamespaceConstraint { .. })));
        }
        assert_eq!(binder.sequence().peek(), 1);

        let mut strict = NamespaceBinder::new(false, "ns");
        assert!(strict
            .resolve_element(None, XMLNS_NS_URI, chain.as_slice())
            .is_err());
    }

    #[test]
    fn test_check_declaration_duplicate_handling() {
        let repairing = NamespaceBinder::new(true, "ns");
        let strict = NamespaceBinder::new(false, "ns");
        let current = bindings(&[("p", "urn:a")]);

        assert_eq!(
            repairing.check_declaration("p", "urn:a", &current, None).unwrap(),
            DeclarationOutcome::Skip
        );
        assert_eq!(
            repairing.check_declaration("p", "urn:b", &current, None).unwrap(),
            DeclarationOutcome::Skip
        );
        assert!(strict.check_declaration("p", "urn:b", &current, None).is_err());
        assert_eq!(
            strict.check_declaration("q", "urn:b", &current, None).unwrap(),
            DeclarationOutcome::Declare
        );
    }

    #[test]
    fn test_check_declaration_reserved() {
        let binder = NamespaceBinder::new(false, "ns");
        let current = Bindings::new();
        assert!(binder.check_declaration("xml", "urn:x", &current, None).is_err());
        assert_eq!(
            binder.check_declaration("xml", XML_NS_URI, &current, None).unwrap(),
            DeclarationOutcome::Skip
        );
        assert!(binder.check_declaration("xmlns", XMLNS_NS_URI, &current, None).is_err());
        assert!(binder.check_declaration("p", "", &current, None).is_err());
    }

    #[test]
    fn test_check_declaration_conflicts_with_element_name() {
        let repairing = NamespaceBinder::new(true, "ns");
        let current = Bindings::new();
        assert_eq!(
            repairing
                .check_declaration("", "urn:x", &current, Some(""))
                .unwrap(),
            DeclarationOutcome::Skip
        );
    }
}
