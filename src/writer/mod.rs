//! The streaming write engine.
//!
//! [`XmlWriter`] is a cursor over the document being written. It tracks
//! where it is ([`OutputState`]), which element start tag is still open,
//! and the namespace bindings of every open element, and it refuses any
//! call that would make the output malformed. Output goes to a
//! [`Backend`]: text through [`SerialBackend`](crate::serial::SerialBackend)
//! or nodes through [`TreeBackend`](crate::tree::TreeBackend). Both see
//! exactly the same sequence of backend calls for the same writer calls.
//!
//! # Open elements
//!
//! After `start_element` the new element is both the *cursor* (the parent
//! of subsequent content) and *open* (its start tag still accepts
//! attributes and namespace declarations). `empty_element` makes the new
//! element open without moving the cursor: it never gets children, and
//! the next call that is not an attribute or declaration closes it with
//! `/>`.
//!
//! # Checks
//!
//! Every check runs before the backend sees the call, so an error leaves
//! the output as it was. Validators attached with
//! [`validate_against`](XmlWriter::validate_against) additionally gate
//! character content by the [`ContentClass`] of the current element.
//!
//! # Examples
//!
//! ```
//! use xmlcursor::{WriterOptions, XmlWriter};
//!
//! let mut writer = XmlWriter::to_writer(Vec::new(), WriterOptions::default().repairing(true));
//! writer.start_element_ns("urn:books", "library").unwrap();
//! writer.empty_element_ns("urn:books", "book").unwrap();
//! writer.write_attribute("title", "Dune").unwrap();
//! writer.end_document().unwrap();
//!
//! let xml = String::from_utf8(writer.into_inner()).unwrap();
//! assert_eq!(
//!     xml,
//!     "<ns1:library xmlns:ns1=\"urn:books\"><ns1:book title=\"Dune\"/></ns1:library>"
//! );
//! ```

mod backend;
mod frame;
mod options;
mod typed;

pub use backend::{AdoptedElement, Backend, DocType, Leaf};
pub use frame::OutputState;
pub use options::{Property, PropertyValue, UnknownProperty, WriterOptions};

use std::borrow::Cow;
use std::fmt;
use std::mem;

use log::{debug, trace, warn};

use crate::error::{ErrorSeverity, Result, ValidationProblem, WriteError};
use crate::namespace::{
    Bindings, DeclarationOutcome, ExpandedName, NamespaceBinder, Nested, PrefixResolution,
    ScopeChain, XMLNS_NS_URI,
};
use crate::serial::ContentOptions;
use crate::util::qname::{is_name, is_ncname, join_qname};
use crate::validation::{ContentClass, ProblemHandler, ProblemReport, Validator, ValidatorChain};
use frame::{AttributeKey, ElementFrame, FrameScope, OpenElementState, OpenFrame};

/// Returns `true` if `text` contains only XML whitespace.
fn is_xml_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

/// A streaming XML writer over a [`Backend`].
///
/// See the [module documentation](self) for the model.
pub struct XmlWriter<B: Backend> {
    backend: B,
    options: WriterOptions,
    /// Effective checks: the configured ones, forced on while validating.
    check_structure: bool,
    check_attributes: bool,
    binder: NamespaceBinder,
    state: OutputState,
    any_output: bool,
    document_ended: bool,
    closed: bool,
    frames: Vec<ElementFrame<B::Handle>>,
    /// Frames the caller cannot end (an adopted element).
    base_depth: usize,
    open: OpenElementState<B::Handle>,
    validators: ValidatorChain,
    problem_handler: Option<Box<dyn ProblemHandler>>,
    content_class: ContentClass,
    doctype_root: Option<String>,
    doctype_written: bool,
    xml_version: String,
    encoding: Option<String>,
}

impl<B: Backend> XmlWriter<B> {
    /// Creates a writer over `backend`.
    ///
    /// If the backend starts inside an existing element, that element is
    /// the initial cursor and its in-scope namespaces are visible.
    pub fn new(mut backend: B, options: WriterOptions) -> Self {
        backend.configure(ContentOptions {
            check_content: options.check_content,
            fix_content: options.fix_content,
        });
        let repairing = options.repairing && options.namespace_aware;
        let binder = NamespaceBinder::new(repairing, &options.automatic_ns_prefix);
        let adopted = backend.adopted_element();
        let mut writer = Self {
            backend,
            check_structure: options.check_structure,
            check_attributes: options.check_attributes,
            options,
            binder,
            state: OutputState::Prolog,
            any_output: false,
            document_ended: false,
            closed: false,
            frames: Vec::new(),
            base_depth: 0,
            open: OpenElementState::NoOpenElement,
            validators: ValidatorChain::new(),
            problem_handler: None,
            content_class: ContentClass::AnyText,
            doctype_root: None,
            doctype_written: false,
            xml_version: "1.0".to_string(),
            encoding: None,
        };
        if let Some(adopted) = adopted {
            debug!(
                "continuing inside existing element '{}'",
                join_qname(&adopted.prefix, &adopted.local_name)
            );
            let mut bindings = Bindings::new();
            for binding in &adopted.bindings {
                bindings.bind(&binding.prefix, &binding.uri);
            }
            writer.frames.push(ElementFrame {
                handle: adopted.handle,
                prefix: adopted.prefix,
                local_name: adopted.local_name,
                namespace_uri: adopted.namespace_uri,
                bindings,
                attributes: Vec::new(),
                is_root: false,
            });
            writer.base_depth = 1;
            writer.state = OutputState::Tree;
        }
        writer
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend, giving up the writer.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// The current options.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    // --- Lifecycle ---

    /// Writes the XML declaration. `version` defaults to `"1.0"`.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if anything was written before (with
    /// structure checks on), or if the version is not 1.0 or 1.1 (with
    /// content checks on).
    pub fn start_document(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()> {
        self.ensure_usable()?;
        trace!("start document");
        if self.any_output && self.check_structure {
            return Err(WriteError::structure(
                "the XML declaration must come before any other output",
            ));
        }
        let version = version.unwrap_or("1.0");
        if self.options.check_content && version != "1.0" && version != "1.1" {
            return Err(WriteError::structure(format!(
                "unsupported XML version '{version}'"
            )));
        }
        self.backend.start_document(version, encoding, standalone)?;
        self.xml_version = version.to_string();
        self.encoding = encoding.map(str::to_string);
        self.any_output = true;
        Ok(())
    }

    /// Closes every open element and notifies validators that the document
    /// is complete.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] if no root element was written (with
    ///   structure checks on). Fragment and element targets are exempt.
    /// - Any error from closing the elements.
    pub fn end_document(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.finish_document()
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// [`WriteError::Io`] from the backend.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.backend.flush()
    }

    /// Finishes the document and closes the backend. Every later write is
    /// a [`WriteError::Structure`] error; closing again does nothing.
    ///
    /// # Errors
    ///
    /// The first error from finishing the document or closing the backend.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let finished = self.finish_document();
        self.closed = true;
        let closed = self.backend.close();
        finished.and(closed)
    }

    fn finish_document(&mut self) -> Result<()> {
        trace!("end document");
        if matches!(self.open, OpenElementState::Open(OpenFrame::Empty(_))) {
            self.close_open_element()?;
        }
        while self.depth() > 0 {
            self.emit_end(false)?;
        }
        self.close_open_element()?;
        if self.check_structure
            && self.state == OutputState::Prolog
            && !self.document_ended
            && !self.backend.allows_multiple_roots()
        {
            return Err(WriteError::structure(
                "cannot end the document: no root element was written",
            ));
        }
        if !self.document_ended && !self.validators.is_empty() {
            let mut report = ProblemReport::new();
            self.validators.completed(&mut report);
            self.handle_report(report)?;
        }
        self.document_ended = true;
        self.backend.flush()
    }

    // --- Elements ---

    /// Starts an element with no namespace resolution: the name is written
    /// unprefixed and belongs to the default namespace in scope.
    ///
    /// # Errors
    ///
    /// See [`start_element_prefixed`](Self::start_element_prefixed).
    pub fn start_element(&mut self, local_name: &str) -> Result<()> {
        self.emit_start(None, None, local_name, false)
    }

    /// Starts an element in `namespace_uri` (`""` for none).
    ///
    /// # Errors
    ///
    /// See [`start_element_prefixed`](Self::start_element_prefixed).
    pub fn start_element_ns(&mut self, namespace_uri: &str, local_name: &str) -> Result<()> {
        self.emit_start(None, Some(namespace_uri), local_name, false)
    }

    /// Starts an element in `namespace_uri`, preferring `prefix`.
    ///
    /// In non-repairing mode the prefix is written as given; in repairing
    /// mode it is used if it can be bound to the URI on this element.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] for a second root element or an invalid
    ///   name (with name checks on).
    /// - [`WriteError::NamespaceConstraint`] if no prefix can be found
    ///   (non-repairing mode) or a reserved prefix is misused.
    /// - [`WriteError::Validation`] if an attached validator rejects it.
    pub fn start_element_prefixed(
        &mut self,
        prefix: &str,
        namespace_uri: &str,
        local_name: &str,
    ) -> Result<()> {
        self.emit_start(Some(prefix), Some(namespace_uri), local_name, false)
    }

    /// Writes an element that will have no content. It accepts attributes
    /// and namespace declarations until the next other call.
    ///
    /// # Errors
    ///
    /// As for [`start_element`](Self::start_element).
    pub fn empty_element(&mut self, local_name: &str) -> Result<()> {
        self.emit_start(None, None, local_name, true)
    }

    /// Writes an empty element in `namespace_uri`.
    ///
    /// # Errors
    ///
    /// As for [`start_element_ns`](Self::start_element_ns).
    pub fn empty_element_ns(&mut self, namespace_uri: &str, local_name: &str) -> Result<()> {
        self.emit_start(None, Some(namespace_uri), local_name, true)
    }

    /// Writes an empty element in `namespace_uri`, preferring `prefix`.
    ///
    /// # Errors
    ///
    /// As for [`start_element_prefixed`](Self::start_element_prefixed).
    pub fn empty_element_prefixed(
        &mut self,
        prefix: &str,
        namespace_uri: &str,
        local_name: &str,
    ) -> Result<()> {
        self.emit_start(Some(prefix), Some(namespace_uri), local_name, true)
    }

    /// Ends the current element. An element without content is written as
    /// `<a/>` when automatic empty elements are on.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if no element is open.
    pub fn end_element(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.emit_end(false)
    }

    /// Ends the current element, always with a separate end tag.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if no element is open.
    pub fn end_element_full(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.emit_end(true)
    }

    fn emit_start(
        &mut self,
        prefix: Option<&str>,
        namespace_uri: Option<&str>,
        local_name: &str,
        is_empty: bool,
    ) -> Result<()> {
        self.ensure_usable()?;
        trace!("start element '{local_name}' in {namespace_uri:?} (empty: {is_empty})");
        self.check_name("element", local_name)?;
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            self.check_name("prefix", prefix)?;
        }

        let root_done = self.state == OutputState::Epilog
            || (self.frames.is_empty() && self.open.empty_frame().is_some());
        if root_done && self.check_structure && !self.backend.allows_multiple_roots() {
            return Err(WriteError::structure(format!(
                "cannot start element '{local_name}': the root element is already closed"
            )));
        }

        let mark = self.binder.sequence().peek();
        let (resolution, namespace_uri) = self.resolve_element_name(prefix, namespace_uri)?;
        let starts_root = self.frames.is_empty();
        let name = ExpandedName::new(&resolution.prefix, local_name, &namespace_uri);
        if let Err(err) = self.admit_element(&name, starts_root) {
            // Nothing carrying a synthesized prefix reached the backend.
            self.binder.release_prefixes(mark);
            return Err(err);
        }

        let parent = self.frames.last().map(|f| f.handle);
        let handle = self.backend.start_element(parent, &name)?;
        let mut bindings = Bindings::new();
        if resolution.declare {
            self.backend
                .write_namespace(handle, &resolution.prefix, &namespace_uri)?;
            bindings.bind(&resolution.prefix, &namespace_uri);
        }

        let frame = ElementFrame {
            handle,
            prefix: resolution.prefix,
            local_name: local_name.to_string(),
            namespace_uri,
            bindings,
            attributes: Vec::new(),
            is_root: starts_root,
        };
        self.state = OutputState::Tree;
        self.any_output = true;
        if is_empty {
            self.open = OpenElementState::Open(OpenFrame::Empty(Box::new(frame)));
        } else {
            self.frames.push(frame);
            self.open = OpenElementState::Open(OpenFrame::Cursor);
        }
        Ok(())
    }

    /// Runs the checks between resolving an element name and writing it:
    /// the DOCTYPE root, completing the previous start tag, and the
    /// validators.
    fn admit_element(&mut self, name: &ExpandedName<'_>, starts_root: bool) -> Result<()> {
        if starts_root && self.state == OutputState::Prolog && !self.validators.is_empty() {
            if let Some(expected) = self.doctype_root.as_deref() {
                let actual = name.qualified();
                if actual != expected {
                    let problem = ValidationProblem::new(
                        ErrorSeverity::Error,
                        format!("root element '{actual}' does not match DOCTYPE root '{expected}'"),
                    )
                    .at_element(actual.into_owned());
                    self.report_problem(problem, true)?;
                }
            }
        }

        self.close_open_element()?;

        if !self.validators.is_empty() {
            let mut report = ProblemReport::new();
            self.validators.element_start(name, &mut report);
            let element = name.qualified().into_owned();
            self.handle_report_at(report, Some(element))?;
        }
        Ok(())
    }

    fn resolve_element_name(
        &mut self,
        prefix: Option<&str>,
        namespace_uri: Option<&str>,
    ) -> Result<(PrefixResolution, String)> {
        if !self.options.namespace_aware {
            if namespace_uri.is_some_and(|uri| !uri.is_empty()) {
                return Err(WriteError::namespace(
                    "namespace URI given to a writer that is not namespace aware",
                ));
            }
            let resolution = PrefixResolution {
                prefix: prefix.unwrap_or("").to_string(),
                declare: false,
            };
            return Ok((resolution, String::new()));
        }

        let fresh = Bindings::new();
        let outer = FrameScope {
            frames: &self.frames,
            extra: None,
        };
        let scope = Nested {
            inner: &fresh,
            outer: &outer,
        };
        match namespace_uri {
            None => {
                let resolution = PrefixResolution {
                    prefix: String::new(),
                    declare: false,
                };
                Ok((resolution, scope.default_namespace().to_string()))
            }
            Some(uri) => {
                let resolution = self.binder.resolve_element(prefix, uri, &scope)?;
                Ok((resolution, uri.to_string()))
            }
        }
    }

    fn emit_end(&mut self, full: bool) -> Result<()> {
        if matches!(self.open, OpenElementState::Open(OpenFrame::Empty(_))) {
            self.close_open_element()?;
        }
        if self.frames.len() <= self.base_depth {
            return Err(WriteError::structure("no open start element to end"));
        }
        let still_open = self.open.is_open();

        if !self.validators.is_empty() {
            let mut report = ProblemReport::new();
            if still_open {
                self.validators.element_and_attributes(&mut report);
            }
            if let Some(frame) = self.frames.last() {
                self.content_class = self.validators.element_end(&frame.name(), &mut report);
            }
            self.handle_report(report)?;
        }

        let Some(frame) = self.frames.pop() else {
            return Err(WriteError::structure("no open start element to end"));
        };
        self.open = OpenElementState::NoOpenElement;
        trace!("end element '{}'", frame.qualified_name());
        if still_open {
            let empty = self.options.automatic_empty_elements && !full;
            self.backend.close_start_tag(frame.handle, empty)?;
            if !empty {
                self.backend.end_element(frame.handle, &frame.name())?;
            }
        } else {
            self.backend.end_element(frame.handle, &frame.name())?;
        }
        if frame.is_root {
            self.state = OutputState::Epilog;
        }
        Ok(())
    }

    /// Completes the open start tag, if any.
    fn close_open_element(&mut self) -> Result<()> {
        if !self.open.is_open() {
            return Ok(());
        }
        if !self.validators.is_empty() {
            let mut report = ProblemReport::new();
            let mut class = self.validators.element_and_attributes(&mut report);
            if let Some(frame) = self.open.empty_frame() {
                class = self.validators.element_end(&frame.name(), &mut report);
            }
            self.content_class = class;
            self.handle_report(report)?;
        }
        match mem::replace(&mut self.open, OpenElementState::NoOpenElement) {
            OpenElementState::Open(OpenFrame::Cursor) => {
                if let Some(frame) = self.frames.last() {
                    self.backend.close_start_tag(frame.handle, false)?;
                }
            }
            OpenElementState::Open(OpenFrame::Empty(frame)) => {
                self.backend.close_start_tag(frame.handle, true)?;
                if frame.is_root {
                    self.state = OutputState::Epilog;
                }
            }
            OpenElementState::NoOpenElement => {}
        }
        Ok(())
    }

    // --- Attributes and namespace declarations ---

    /// Writes an attribute in no namespace on the open element.
    ///
    /// # Errors
    ///
    /// See [`write_attribute_prefixed`](Self::write_attribute_prefixed).
    pub fn write_attribute(&mut self, local_name: &str, value: &str) -> Result<()> {
        self.emit_attribute(None, None, local_name, value)
    }

    /// Writes an attribute in `namespace_uri` on the open element.
    ///
    /// # Errors
    ///
    /// See [`write_attribute_prefixed`](Self::write_attribute_prefixed).
    pub fn write_attribute_ns(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        value: &str,
    ) -> Result<()> {
        self.emit_attribute(None, Some(namespace_uri), local_name, value)
    }

    /// Writes an attribute in `namespace_uri` on the open element,
    /// preferring `prefix`. Attributes never use the default namespace.
    ///
    /// An attribute in the `xmlns` namespace is treated as a namespace
    /// declaration.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] if no start tag is open, for a duplicate
    ///   attribute (with attribute checks on), or an invalid name.
    /// - [`WriteError::NamespaceConstraint`] if no prefix can be found.
    /// - [`WriteError::Validation`] if an attached validator rejects it.
    pub fn write_attribute_prefixed(
        &mut self,
        prefix: &str,
        namespace_uri: &str,
        local_name: &str,
        value: &str,
    ) -> Result<()> {
        self.emit_attribute(Some(prefix), Some(namespace_uri), local_name, value)
    }

    fn emit_attribute(
        &mut self,
        prefix: Option<&str>,
        namespace_uri: Option<&str>,
        local_name: &str,
        value: &str,
    ) -> Result<()> {
        self.ensure_usable()?;
        trace!("attribute '{local_name}' in {namespace_uri:?}");
        if !self.open.is_open() {
            return Err(WriteError::structure(format!(
                "attribute '{local_name}' written with no open start element"
            )));
        }
        if self.options.namespace_aware && namespace_uri == Some(XMLNS_NS_URI) {
            let declared = if local_name == "xmlns" { "" } else { local_name };
            return self.declare_namespace(declared, value);
        }
        self.check_name("attribute", local_name)?;
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            self.check_name("prefix", prefix)?;
        }

        let (resolution, namespace_uri) = if self.options.namespace_aware {
            let uri = namespace_uri.unwrap_or("");
            let scope = FrameScope {
                frames: &self.frames,
                extra: self.open.empty_frame(),
            };
            let resolution = self.binder.resolve_attribute(prefix, uri, &scope)?;
            (resolution, uri.to_string())
        } else {
            if namespace_uri.is_some_and(|uri| !uri.is_empty()) {
                return Err(WriteError::namespace(
                    "namespace URI given to a writer that is not namespace aware",
                ));
            }
            let resolution = PrefixResolution {
                prefix: prefix.unwrap_or("").to_string(),
                declare: false,
            };
            (resolution, String::new())
        };

        let key = AttributeKey {
            local_name: if self.options.namespace_aware {
                local_name.to_string()
            } else {
                join_qname(&resolution.prefix, local_name).into_owned()
            },
            prefix: resolution.prefix,
            namespace_uri,
        };
        let Some(frame) = self.open_frame() else {
            return Err(WriteError::structure("attribute written with no open start element"));
        };
        if self.check_attributes && frame.has_attribute(&key.namespace_uri, &key.local_name) {
            return Err(WriteError::structure(format!(
                "duplicate attribute '{}' on element '{}'",
                join_qname(&key.prefix, &key.local_name),
                frame.qualified_name()
            )));
        }
        let handle = frame.handle;

        let name = ExpandedName::new(&key.prefix, local_name, &key.namespace_uri);
        if !self.validators.is_empty() {
            let mut report = ProblemReport::new();
            self.validators.attribute(&name, value, &mut report);
            self.handle_report(report)?;
        }
        if resolution.declare {
            self.backend
                .write_namespace(handle, &key.prefix, &key.namespace_uri)?;
            if let Some(frame) = self.open_frame_mut() {
                frame.bindings.bind(&key.prefix, &key.namespace_uri);
            }
        }
        self.backend.write_attribute(handle, &name, value)?;
        if let Some(frame) = self.open_frame_mut() {
            frame.attributes.push(key);
        }
        Ok(())
    }

    /// Declares `prefix` as `namespace_uri` on the open element. An empty
    /// prefix declares the default namespace.
    ///
    /// A declaration identical to one already made on the element is
    /// dropped. A conflicting one is an error, or dropped in repairing
    /// mode.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] if no start tag is open.
    /// - [`WriteError::NamespaceConstraint`] for reserved prefixes,
    ///   conflicts (non-repairing mode), or a writer that is not namespace
    ///   aware.
    pub fn write_namespace(&mut self, prefix: &str, namespace_uri: &str) -> Result<()> {
        self.ensure_usable()?;
        self.declare_namespace(prefix, namespace_uri)
    }

    /// Declares the default namespace on the open element.
    ///
    /// # Errors
    ///
    /// As for [`write_namespace`](Self::write_namespace).
    pub fn write_default_namespace(&mut self, namespace_uri: &str) -> Result<()> {
        self.ensure_usable()?;
        self.declare_namespace("", namespace_uri)
    }

    fn declare_namespace(&mut self, prefix: &str, namespace_uri: &str) -> Result<()> {
        trace!("namespace '{prefix}' = '{namespace_uri}'");
        if !self.options.namespace_aware {
            return Err(WriteError::namespace(
                "namespace declarations need a namespace-aware writer",
            ));
        }
        if !prefix.is_empty() {
            self.check_name("prefix", prefix)?;
        }
        let Some(frame) = self.open_frame() else {
            return Err(WriteError::structure(format!(
                "namespace '{prefix}' declared with no open start element"
            )));
        };
        let outcome = self.binder.check_declaration(
            prefix,
            namespace_uri,
            &frame.bindings,
            frame.prefix_in_use(prefix),
        )?;
        if outcome == DeclarationOutcome::Skip {
            return Ok(());
        }
        let handle = frame.handle;
        self.backend.write_namespace(handle, prefix, namespace_uri)?;
        if let Some(frame) = self.open_frame_mut() {
            frame.bindings.bind(prefix, namespace_uri);
        }
        Ok(())
    }

    fn open_frame(&self) -> Option<&ElementFrame<B::Handle>> {
        match &self.open {
            OpenElementState::Open(OpenFrame::Empty(frame)) => Some(frame),
            OpenElementState::Open(OpenFrame::Cursor) => self.frames.last(),
            OpenElementState::NoOpenElement => None,
        }
    }

    fn open_frame_mut(&mut self) -> Option<&mut ElementFrame<B::Handle>> {
        match &mut self.open {
            OpenElementState::Open(OpenFrame::Empty(frame)) => Some(frame),
            OpenElementState::Open(OpenFrame::Cursor) => self.frames.last_mut(),
            OpenElementState::NoOpenElement => None,
        }
    }

    // --- Content ---

    /// Writes escaped character data.
    ///
    /// Outside the root element only whitespace is allowed (with structure
    /// checks on), and it is written as is.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] for non-whitespace outside the root.
    /// - [`WriteError::Validation`] if the element's content model forbids
    ///   the text.
    /// - [`WriteError::Io`] for characters XML cannot represent.
    pub fn write_characters(&mut self, text: &str) -> Result<()> {
        self.emit_text(text, true, false)
    }

    /// Writes whitespace verbatim. On the tree backend this creates a text
    /// node.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if `text` is not all whitespace.
    pub fn write_space(&mut self, text: &str) -> Result<()> {
        self.ensure_usable()?;
        if !is_xml_whitespace(text) {
            return Err(WriteError::structure(
                "write_space requires whitespace-only text",
            ));
        }
        self.close_open_element()?;
        if !self.outside_root() && self.content_class == ContentClass::None {
            self.report_invalid_content("whitespace is not allowed in an element declared EMPTY")?;
        }
        if text.is_empty() {
            return Ok(());
        }
        let parent = self.cursor_handle();
        self.backend
            .append_leaf(parent, Leaf::Text { text, escape: false })?;
        self.any_output = true;
        Ok(())
    }

    pub(crate) fn emit_text(&mut self, text: &str, escape: bool, is_final: bool) -> Result<()> {
        self.ensure_usable()?;
        trace!("characters ({} bytes)", text.len());
        self.close_open_element()?;
        if self.outside_root() {
            if self.check_structure && !is_xml_whitespace(text) {
                return Err(WriteError::structure(
                    "non-whitespace character data outside the root element",
                ));
            }
            if !text.is_empty() {
                // Prolog and epilog whitespace cannot use character references.
                self.backend.append_leaf(
                    None,
                    Leaf::Text {
                        text,
                        escape: false,
                    },
                )?;
                self.any_output = true;
            }
            return Ok(());
        }
        if text.is_empty() {
            return Ok(());
        }
        match self.content_class {
            ContentClass::None => {
                self.report_invalid_content("character data is not allowed in an element declared EMPTY")?;
            }
            ContentClass::WhitespaceOnly if !is_xml_whitespace(text) => {
                self.report_invalid_content("non-whitespace character data in element-only content")?;
            }
            ContentClass::ValidatableText => {
                let mut report = ProblemReport::new();
                self.validators.text(text, is_final, &mut report);
                self.handle_report(report)?;
            }
            _ => {}
        }
        let parent = self.cursor_handle();
        self.backend.append_leaf(parent, Leaf::Text { text, escape })?;
        self.any_output = true;
        Ok(())
    }

    /// Writes a CDATA section, or escaped character data when
    /// `cdata_as_text` is set.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] outside the root element, or if `text`
    ///   contains `]]>` (with content checks on and fixing off).
    /// - [`WriteError::Validation`] if the content model forbids text.
    pub fn write_cdata(&mut self, text: &str) -> Result<()> {
        if self.options.cdata_as_text {
            return self.emit_text(text, true, false);
        }
        self.ensure_usable()?;
        trace!("CDATA ({} bytes)", text.len());
        self.close_open_element()?;
        if self.outside_root() {
            if self.check_structure {
                return Err(WriteError::structure(
                    "CDATA section outside the root element",
                ));
            }
        } else {
            match self.content_class {
                ContentClass::None | ContentClass::WhitespaceOnly => {
                    self.report_invalid_content("CDATA section is not allowed here")?;
                }
                ContentClass::ValidatableText => {
                    let mut report = ProblemReport::new();
                    self.validators.text(text, false, &mut report);
                    self.handle_report(report)?;
                }
                ContentClass::AnyText => {}
            }
        }
        let parent = self.cursor_handle();
        if let Some(index) = self.backend.append_leaf(parent, Leaf::CData(text))? {
            return Err(WriteError::structure(format!(
                "CDATA content contains ']]>' at byte {index}"
            )));
        }
        self.any_output = true;
        Ok(())
    }

    /// Writes a comment.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if `text` contains `--` or ends with `-`
    /// (with content checks on and fixing off).
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        self.ensure_usable()?;
        trace!("comment ({} bytes)", text.len());
        self.close_open_element()?;
        if !self.outside_root() && self.content_class == ContentClass::None {
            self.report_invalid_content("comment is not allowed in an element declared EMPTY")?;
        }
        let parent = self.cursor_handle();
        if let Some(index) = self.backend.append_leaf(parent, Leaf::Comment(text))? {
            return Err(WriteError::structure(format!(
                "comment content contains '--' or ends with '-' at byte {index}"
            )));
        }
        self.any_output = true;
        Ok(())
    }

    /// Writes a processing instruction.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] if the target is `xml` in any case (with
    /// content checks on), invalid (with name checks on), or the data
    /// contains `?>`.
    pub fn write_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()> {
        self.ensure_usable()?;
        trace!("processing instruction '{target}'");
        self.check_name("processing instruction target", target)?;
        if self.options.check_content && target.eq_ignore_ascii_case("xml") {
            return Err(WriteError::structure(format!(
                "processing instruction target '{target}' is reserved"
            )));
        }
        self.close_open_element()?;
        if !self.outside_root() && self.content_class == ContentClass::None {
            self.report_invalid_content(
                "processing instruction is not allowed in an element declared EMPTY",
            )?;
        }
        let parent = self.cursor_handle();
        let leaf = Leaf::ProcessingInstruction { target, data };
        if let Some(index) = self.backend.append_leaf(parent, leaf)? {
            return Err(WriteError::structure(format!(
                "processing instruction data contains '?>' at byte {index}"
            )));
        }
        self.any_output = true;
        Ok(())
    }

    /// Writes an entity reference `&name;`.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] outside the root element, or for an
    ///   invalid name (with name checks on).
    /// - [`WriteError::Validation`] if the content model forbids text or
    ///   the entity is undeclared.
    pub fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        self.ensure_usable()?;
        trace!("entity reference '{name}'");
        self.check_name("entity", name)?;
        self.close_open_element()?;
        if self.outside_root() {
            if self.check_structure {
                return Err(WriteError::structure(format!(
                    "entity reference '&{name};' outside the root element"
                )));
            }
        } else {
            if matches!(
                self.content_class,
                ContentClass::None | ContentClass::WhitespaceOnly
            ) {
                self.report_invalid_content("entity reference is not allowed here")?;
            }
            if !self.validators.is_empty() {
                let mut report = ProblemReport::new();
                self.validators.entity_ref(name, &mut report);
                self.handle_report(report)?;
            }
        }
        let parent = self.cursor_handle();
        self.backend.append_leaf(parent, Leaf::EntityRef(name))?;
        self.any_output = true;
        Ok(())
    }

    /// Writes text verbatim, bypassing every check.
    ///
    /// # Errors
    ///
    /// [`WriteError::UnsupportedOperation`] on the tree backend.
    pub fn write_raw(&mut self, text: &str) -> Result<()> {
        self.ensure_usable()?;
        self.close_open_element()?;
        self.backend.write_raw(text)?;
        self.any_output = true;
        Ok(())
    }

    /// Writes a complete DOCTYPE declaration given as text.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Structure`] after the root element has started or
    ///   for a second DOCTYPE (with structure checks on).
    /// - [`WriteError::UnsupportedOperation`] on the tree backend.
    pub fn write_dtd(&mut self, dtd: &str) -> Result<()> {
        self.ensure_usable()?;
        self.check_doctype_placement()?;
        self.backend.write_dtd(dtd)?;
        self.doctype_written = true;
        self.any_output = true;
        Ok(())
    }

    /// Writes a DOCTYPE declaration for `root`.
    ///
    /// The root name is remembered: while validating, a root element with
    /// another name is reported as an error.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] as for [`write_dtd`](Self::write_dtd), or
    /// for a public identifier without a system identifier.
    pub fn write_doctype(
        &mut self,
        root: &str,
        system_id: Option<&str>,
        public_id: Option<&str>,
        internal_subset: Option<&str>,
    ) -> Result<()> {
        self.ensure_usable()?;
        if self.options.check_names && !is_name(root) {
            return Err(WriteError::structure(format!(
                "invalid DOCTYPE root name '{root}'"
            )));
        }
        if public_id.is_some() && system_id.is_none() {
            return Err(WriteError::structure(
                "a DOCTYPE public identifier requires a system identifier",
            ));
        }
        self.check_doctype_placement()?;
        self.backend.write_doctype(&DocType {
            root,
            system_id,
            public_id,
            internal_subset,
        })?;
        self.doctype_root = Some(root.to_string());
        self.doctype_written = true;
        self.any_output = true;
        Ok(())
    }

    fn check_doctype_placement(&self) -> Result<()> {
        if !self.check_structure {
            return Ok(());
        }
        if self.state != OutputState::Prolog || self.open.is_open() {
            return Err(WriteError::structure(
                "a DOCTYPE declaration must come before the root element",
            ));
        }
        if self.doctype_written {
            return Err(WriteError::structure(
                "only one DOCTYPE declaration is allowed",
            ));
        }
        Ok(())
    }

    fn cursor_handle(&self) -> Option<B::Handle> {
        self.frames.last().map(|f| f.handle)
    }

    fn outside_root(&self) -> bool {
        self.frames.is_empty() && !self.backend.allows_multiple_roots()
    }

    // --- Context ---

    /// The URI `prefix` resolves to at the current position.
    #[must_use]
    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.resolve(prefix)
    }

    /// A prefix that resolves to `namespace_uri` at the current position
    /// (`""` if it is the default namespace).
    #[must_use]
    pub fn prefix(&self, namespace_uri: &str) -> Option<&str> {
        self.find_prefix(namespace_uri, true)
    }

    /// Qualified name of the innermost open element.
    #[must_use]
    pub fn current_element_name(&self) -> Option<Cow<'_, str>> {
        self.open
            .empty_frame()
            .or_else(|| self.frames.last())
            .map(ElementFrame::qualified_name)
    }

    /// Number of started elements not yet ended.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - self.base_depth
    }

    /// Where the writer is in the document.
    #[must_use]
    pub fn state(&self) -> OutputState {
        self.state
    }

    /// The XML version being written.
    #[must_use]
    pub fn xml_version(&self) -> &str {
        &self.xml_version
    }

    /// The encoding named in the XML declaration, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Suggests `prefix` for `namespace_uri` (an empty prefix suggests it
    /// as the default namespace). Nothing is declared until an element or
    /// attribute needs the URI.
    ///
    /// # Errors
    ///
    /// [`WriteError::NamespaceConstraint`] for reserved prefixes, or if the
    /// writer is not namespace aware.
    pub fn set_prefix(&mut self, prefix: &str, namespace_uri: &str) -> Result<()> {
        if !self.options.namespace_aware {
            return Err(WriteError::namespace(
                "prefix hints need a namespace-aware writer",
            ));
        }
        self.binder.suggested_mut().set_prefix(prefix, namespace_uri)
    }

    /// Suggests `namespace_uri` as the default namespace for elements.
    ///
    /// # Errors
    ///
    /// [`WriteError::NamespaceConstraint`] for the reserved URIs.
    pub fn set_default_namespace(&mut self, namespace_uri: &str) -> Result<()> {
        crate::namespace::check_reserved("", namespace_uri)?;
        self.binder.suggested_mut().set_default(namespace_uri);
        Ok(())
    }

    // --- Properties ---

    /// Reads an option.
    #[must_use]
    pub fn get_property(&self, property: Property) -> PropertyValue {
        self.options.get(property)
    }

    /// Changes an option. Returns `false` for options fixed at
    /// construction.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] for a value of the wrong type.
    pub fn set_property(&mut self, property: Property, value: PropertyValue) -> Result<bool> {
        if !self.options.set(property, value)? {
            return Ok(false);
        }
        self.backend.configure(ContentOptions {
            check_content: self.options.check_content,
            fix_content: self.options.fix_content,
        });
        self.binder.set_auto_prefix(&self.options.automatic_ns_prefix);
        self.sync_checks();
        Ok(true)
    }

    fn sync_checks(&mut self) {
        let validating = !self.validators.is_empty();
        self.check_structure = self.options.check_structure || validating;
        self.check_attributes = self.options.check_attributes || validating;
    }

    // --- Validation ---

    /// Attaches a validator. Structure and attribute checks stay on while
    /// any validator is attached.
    ///
    /// # Errors
    ///
    /// [`WriteError::Structure`] after [`close`](Self::close).
    pub fn validate_against(&mut self, validator: Box<dyn Validator>) -> Result<()> {
        self.ensure_usable()?;
        debug!("attaching validator '{}'", validator.name());
        self.validators.push(validator);
        self.sync_checks();
        Ok(())
    }

    /// Detaches the validator called `name` and returns it, after letting
    /// it report its final problems.
    ///
    /// # Errors
    ///
    /// [`WriteError::Validation`] for a final problem of error severity.
    pub fn stop_validating(&mut self, name: &str) -> Result<Option<Box<dyn Validator>>> {
        let Some(mut validator) = self.validators.remove(name) else {
            return Ok(None);
        };
        debug!("detaching validator '{name}'");
        let mut report = ProblemReport::new();
        validator.validation_completed(&mut report);
        if self.validators.is_empty() {
            self.content_class = ContentClass::AnyText;
        }
        self.sync_checks();
        let element = self.current_element_name().map(Cow::into_owned);
        for problem in report.take() {
            let problem = attach_context(problem, element.as_deref());
            self.report_problem(problem, true)?;
        }
        Ok(Some(validator))
    }

    /// Installs a handler that receives every validation problem instead
    /// of the default handling. Returns the previous handler.
    pub fn set_problem_handler(
        &mut self,
        handler: Option<Box<dyn ProblemHandler>>,
    ) -> Option<Box<dyn ProblemHandler>> {
        mem::replace(&mut self.problem_handler, handler)
    }

    fn handle_report(&mut self, report: ProblemReport) -> Result<()> {
        if report.is_empty() {
            return Ok(());
        }
        let element = self.current_element_name().map(Cow::into_owned);
        self.handle_report_at(report, element)
    }

    fn handle_report_at(&mut self, mut report: ProblemReport, element: Option<String>) -> Result<()> {
        let fail = !self.validators.is_empty();
        for problem in report.take() {
            let problem = attach_context(problem, element.as_deref());
            self.report_problem(problem, fail)?;
        }
        Ok(())
    }

    fn report_invalid_content(&mut self, message: &str) -> Result<()> {
        let mut problem = ValidationProblem::new(ErrorSeverity::Error, message);
        if let Some(element) = self.current_element_name() {
            problem = problem.at_element(element.into_owned());
        }
        let fail = !self.validators.is_empty();
        self.report_problem(problem, fail)
    }

    /// Routes one problem: to the handler if installed, else an error for
    /// `Error` and `Fatal` severity when `fail` is set, else a warning log.
    fn report_problem(&mut self, problem: ValidationProblem, fail: bool) -> Result<()> {
        if let Some(handler) = self.problem_handler.as_mut() {
            return handler.handle_problem(&problem);
        }
        if fail && problem.severity >= ErrorSeverity::Error {
            return Err(WriteError::Validation { problem });
        }
        warn!("{problem}");
        Ok(())
    }

    // --- Names and state ---

    fn check_name(&self, kind: &str, name: &str) -> Result<()> {
        if !self.options.check_names {
            return Ok(());
        }
        let valid = if self.options.namespace_aware {
            is_ncname(name)
        } else {
            is_name(name)
        };
        if valid {
            Ok(())
        } else {
            Err(WriteError::structure(format!("invalid {kind} name '{name}'")))
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(WriteError::structure("the writer is closed"));
        }
        Ok(())
    }
}

fn attach_context(problem: ValidationProblem, element: Option<&str>) -> ValidationProblem {
    match element {
        Some(element) if problem.element.is_none() => problem.at_element(element),
        _ => problem,
    }
}

/// The namespace scope at the writer's current position, including an open
/// empty element.
impl<B: Backend> ScopeChain for XmlWriter<B> {
    fn scope_count(&self) -> usize {
        self.frames.len() + usize::from(self.open.empty_frame().is_some())
    }

    fn scope(&self, depth: usize) -> Option<&Bindings> {
        let depth = match self.open.empty_frame() {
            Some(frame) if depth == 0 => return Some(&frame.bindings),
            Some(_) => depth - 1,
            None => depth,
        };
        self.frames
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.frames.get(index))
            .map(|frame| &frame.bindings)
    }
}

impl<B: Backend> fmt::Debug for XmlWriter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlWriter")
            .field("backend", &B::NAME)
            .field("state", &self.state)
            .field("depth", &self.depth())
            .field("open", &self.open.is_open())
            .field("validators", &self.validators)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
