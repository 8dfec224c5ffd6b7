//! The seam between the writing engine and its output targets.
//!
//! The engine owns every decision that must come out the same regardless
//! of target: state checks, namespace resolution, validation, and the
//! ordering of events. A [`Backend`] only materializes what it is told:
//! the serial backend turns events into markup, the tree backend into
//! nodes. Each started element gets a backend `Handle` that later calls
//! refer back to.

use std::fmt;

use crate::error::Result;
use crate::namespace::{ExpandedName, NamespaceBinding};
use crate::serial::ContentOptions;

/// A content event that does not open a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    /// Character data. With `escape` unset the text is written as is
    /// (whitespace outside the root element, typed values).
    Text { text: &'a str, escape: bool },
    /// A CDATA section.
    CData(&'a str),
    /// A comment.
    Comment(&'a str),
    /// A processing instruction.
    ProcessingInstruction {
        target: &'a str,
        data: Option<&'a str>,
    },
    /// An unexpanded entity reference.
    EntityRef(&'a str),
}

/// The parts of a structured DOCTYPE declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocType<'a> {
    /// Declared root element name.
    pub root: &'a str,
    /// SYSTEM identifier.
    pub system_id: Option<&'a str>,
    /// PUBLIC identifier. Only meaningful together with a system identifier.
    pub public_id: Option<&'a str>,
    /// Internal subset, without the brackets.
    pub internal_subset: Option<&'a str>,
}

/// An existing element a backend starts inside of.
///
/// The engine treats it as an open element the caller cannot close, with
/// `bindings` as its namespace scope.
#[derive(Debug, Clone)]
pub struct AdoptedElement<H> {
    /// Backend handle of the element.
    pub handle: H,
    /// Element prefix, `""` if none.
    pub prefix: String,
    /// Local name.
    pub local_name: String,
    /// Namespace URI, `""` if none.
    pub namespace_uri: String,
    /// Every namespace binding in scope at the element.
    pub bindings: Vec<NamespaceBinding>,
}

/// An output target for [`XmlWriter`](super::XmlWriter).
///
/// `parent` arguments are `None` at the top level (outside the root
/// element). Calls for an element always arrive in the order
/// `start_element`, namespaces and attributes, `close_start_tag`, content,
/// `end_element`; an element closed as empty gets
/// `close_start_tag(_, true)` and no `end_element`.
pub trait Backend {
    /// Identifies a started element.
    type Handle: Copy + fmt::Debug;

    /// Name used in [`WriteError::UnsupportedOperation`](crate::WriteError::UnsupportedOperation).
    const NAME: &'static str;

    /// Applies content checking options. Called once, before any output.
    fn configure(&mut self, options: ContentOptions);

    /// An element the backend starts inside of, if any.
    fn adopted_element(&self) -> Option<AdoptedElement<Self::Handle>> {
        None
    }

    /// Whether more than one top-level element (and top-level character
    /// content) is allowed.
    fn allows_multiple_roots(&self) -> bool {
        false
    }

    /// Records the XML declaration.
    fn start_document(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()>;

    /// Writes a complete DOCTYPE declaration given as text.
    fn write_dtd(&mut self, text: &str) -> Result<()>;

    /// Writes a structured DOCTYPE declaration.
    fn write_doctype(&mut self, doctype: &DocType<'_>) -> Result<()>;

    /// Starts an element under `parent`.
    fn start_element(
        &mut self,
        parent: Option<Self::Handle>,
        name: &ExpandedName<'_>,
    ) -> Result<Self::Handle>;

    /// Declares `prefix` (`""` for the default namespace) on an element
    /// whose start tag is open.
    fn write_namespace(&mut self, element: Self::Handle, prefix: &str, uri: &str) -> Result<()>;

    /// Adds an attribute to an element whose start tag is open.
    fn write_attribute(
        &mut self,
        element: Self::Handle,
        name: &ExpandedName<'_>,
        value: &str,
    ) -> Result<()>;

    /// Ends the start tag; `empty` means the element has no content and no
    /// `end_element` call follows.
    fn close_start_tag(&mut self, element: Self::Handle, empty: bool) -> Result<()>;

    /// Ends an element whose start tag was closed with `empty` unset.
    fn end_element(&mut self, element: Self::Handle, name: &ExpandedName<'_>) -> Result<()>;

    /// Appends content. For CDATA, comments and processing instructions,
    /// returns the byte index of a terminator that makes the content
    /// inexpressible; nothing is appended in that case.
    fn append_leaf(&mut self, parent: Option<Self::Handle>, leaf: Leaf<'_>) -> Result<Option<usize>>;

    /// Writes text verbatim.
    fn write_raw(&mut self, text: &str) -> Result<()>;

    /// Flushes buffered output.
    fn flush(&mut self) -> Result<()>;

    /// Finishes the output.
    fn close(&mut self) -> Result<()>;
}
