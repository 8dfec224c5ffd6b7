//! Streaming XML text output.
//!
//! [`SerialBackend`] drives a [`Sink`]; [`TextSink`] is the sink that
//! escapes, encodes and writes to any [`std::io::Write`]. The
//! [`serialize`] function writes a [`Document`](crate::tree::Document)
//! using the same escaping rules, so trees built through the tree backend
//! print exactly as the serial backend would have written them.

mod backend;
mod sink;
pub mod xml;

pub use backend::SerialBackend;
pub use sink::{ContentOptions, Sink, TextSink};
pub use xml::{serialize, serialize_node};
