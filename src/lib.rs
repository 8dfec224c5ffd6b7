//! # xmlcursor
//!
//! A streaming, StAX-style XML writer. Callers push events (start element,
//! attribute, text, end element, ...) through an [`XmlWriter`], which keeps
//! the output well-formed, manages namespace bindings (optionally repairing
//! them), and hands the result to a backend:
//!
//! - [`SerialBackend`](serial::SerialBackend) writes escaped, encoded text
//!   to any [`std::io::Write`];
//! - [`TreeBackend`](tree::TreeBackend) builds nodes in a
//!   [`TreeModel`](tree::TreeModel), such as the bundled [`Document`].
//!
//! The same sequence of calls produces the same document on either
//! backend.
//!
//! ## Quick Start
//!
//! ```
//! use xmlcursor::{WriterOptions, XmlWriter};
//!
//! let mut writer = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
//! writer.start_document(None, Some("UTF-8"), None).unwrap();
//! writer.start_element("greeting").unwrap();
//! writer.write_attribute("lang", "en").unwrap();
//! writer.write_characters("Hello & welcome").unwrap();
//! writer.end_document().unwrap();
//!
//! let xml = String::from_utf8(writer.into_inner()).unwrap();
//! assert_eq!(
//!     xml,
//!     "<?xml version=\"1.0\" encoding=\"UTF-8\"?><greeting lang=\"en\">Hello &amp; welcome</greeting>"
//! );
//! ```
//!
//! ## Modules
//!
//! - [`writer`]: the write engine, its options and the backend trait
//! - [`namespace`]: scoped bindings and the prefix repair algorithm
//! - [`serial`]: text output, escaping and encodings
//! - [`tree`]: the in-memory document and the tree backend
//! - [`typed`]: lexical forms of typed values
//! - [`validation`]: streaming validators, including DTD validation
//! - [`error`]: the error taxonomy

pub mod error;
pub mod namespace;
pub mod serial;
pub mod tree;
pub mod typed;
pub mod util;
pub mod validation;
pub mod writer;

pub use error::{ErrorSeverity, Result, ValidationProblem, WriteError};
pub use tree::{Attribute, Document, NodeId};
pub use typed::{QName, TypedValue};
pub use writer::{OutputState, Property, PropertyValue, WriterOptions, XmlWriter};
