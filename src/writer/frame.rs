use std::borrow::Cow;

use crate::namespace::{Bindings, ExpandedName, ScopeChain};
use crate::util::qname::join_qname;

/// Where the writer is in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Before the root element.
    Prolog,
    /// Inside the root element.
    Tree,
    /// After the root element.
    Epilog,
}

/// An attribute already written on an open element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeKey {
    pub prefix: String,
    pub namespace_uri: String,
    pub local_name: String,
}

/// One open element.
///
/// Frames live in the writer's stack; the parent of a frame is the one
/// below it.
#[derive(Debug)]
pub(crate) struct ElementFrame<H> {
    pub handle: H,
    pub prefix: String,
    pub local_name: String,
    pub namespace_uri: String,
    pub bindings: Bindings,
    pub attributes: Vec<AttributeKey>,
    /// Ending this frame ends the root element.
    pub is_root: bool,
}

impl<H> ElementFrame<H> {
    pub fn name(&self) -> ExpandedName<'_> {
        ExpandedName::new(&self.prefix, &self.local_name, &self.namespace_uri)
    }

    pub fn qualified_name(&self) -> Cow<'_, str> {
        join_qname(&self.prefix, &self.local_name)
    }

    /// The URI `prefix` is already used for on this element, by its own
    /// name or an attribute.
    pub fn prefix_in_use(&self, prefix: &str) -> Option<&str> {
        if self.prefix == prefix && (!prefix.is_empty() || !self.namespace_uri.is_empty()) {
            return Some(&self.namespace_uri);
        }
        if prefix.is_empty() {
            return None;
        }
        self.attributes
            .iter()
            .find(|a| a.prefix == prefix)
            .map(|a| a.namespace_uri.as_str())
    }

    pub fn has_attribute(&self, namespace_uri: &str, local_name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.namespace_uri == namespace_uri && a.local_name == local_name)
    }
}

/// Which element, if any, still has its start tag open.
#[derive(Debug)]
pub(crate) enum OpenElementState<H> {
    NoOpenElement,
    Open(OpenFrame<H>),
}

/// The element whose start tag is open.
#[derive(Debug)]
pub(crate) enum OpenFrame<H> {
    /// The top of the frame stack, which is also the cursor.
    Cursor,
    /// An empty element. It never joins the stack; the cursor stays on its
    /// parent.
    Empty(Box<ElementFrame<H>>),
}

impl<H> OpenElementState<H> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn empty_frame(&self) -> Option<&ElementFrame<H>> {
        match self {
            Self::Open(OpenFrame::Empty(frame)) => Some(frame),
            _ => None,
        }
    }
}

/// The frame stack seen as a namespace scope chain, optionally extended by
/// an open empty element.
pub(crate) struct FrameScope<'a, H> {
    pub frames: &'a [ElementFrame<H>],
    pub extra: Option<&'a ElementFrame<H>>,
}

impl<H> ScopeChain for FrameScope<'_, H> {
    fn scope_count(&self) -> usize {
        self.frames.len() + usize::from(self.extra.is_some())
    }

    fn scope(&self, depth: usize) -> Option<&Bindings> {
        let depth = match self.extra {
            Some(extra) if depth == 0 => return Some(&extra.bindings),
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
