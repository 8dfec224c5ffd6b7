//! Arena-based XML document tree.
//!
//! All nodes live in a contiguous `Vec<NodeData>` owned by the `Document`
//! and are referenced by `NodeId`, a newtype over `NonZeroU32`. Navigation
//! links (parent, first\_child, last\_child, next\_sibling, prev\_sibling)
//! are arena indices, so the tree has no reference cycles and no per-node
//! heap allocation beyond the payload.
//!
//! Namespace declarations are stored as ordinary attributes in the
//! `http://www.w3.org/2000/xmlns/` namespace: `xmlns:p="..."` has prefix
//! `xmlns` and name `p`, a default declaration has no prefix and name
//! `xmlns`.
//!
//! The writer builds trees through the [`TreeModel`] trait, which
//! `Document` implements; see [`TreeBackend`].

mod backend;
mod model;
mod node;

pub use backend::TreeBackend;
pub use model::{NodeRole, TreeModel};
pub use node::NodeKind;

use std::num::NonZeroU32;

use crate::namespace::{NamespaceBinding, XMLNS_NS_URI};

/// A typed index into the document's node arena.
///
/// `NodeId` is a newtype over `NonZeroU32`, meaning it can never be zero
/// and `Option<NodeId>` has the same size as `NodeId` (niche optimization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Creates a `NodeId` from a raw index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 0.
    #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new(index as u32).expect("NodeId index must be non-zero"))
    }

    /// Returns the raw index as a `usize` for indexing into the arena.
    fn as_index(self) -> usize {
        self.0.get() as usize
    }
}

/// Storage for a single node in the document arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What kind of node this is and its payload.
    pub kind: NodeKind,
    /// Parent node, if any.
    pub parent: Option<NodeId>,
    /// First child node.
    pub first_child: Option<NodeId>,
    /// Last child node (for O(1) append).
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// An XML attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The local name (e.g., `"lang"` for `xml:lang`).
    pub name: String,
    /// The attribute value, unescaped.
    pub value: String,
    /// Namespace prefix, if any (e.g., `"xml"` for `xml:lang`).
    pub prefix: Option<String>,
    /// Namespace URI, if any.
    pub namespace: Option<String>,
}

impl Attribute {
    /// Returns the namespace declaration this attribute makes, as
    /// `(prefix, uri)` with `""` for the default namespace.
    #[must_use]
    pub fn as_namespace_declaration(&self) -> Option<(&str, &str)> {
        match self.prefix.as_deref() {
            Some("xmlns") => Some((self.name.as_str(), self.value.as_str())),
            None if self.name == "xmlns" => Some(("", self.value.as_str())),
            _ => None,
        }
    }

    /// Builds the attribute that declares `prefix` (`""` for the default
    /// namespace) as `uri`.
    #[must_use]
    pub fn namespace_declaration(prefix: &str, uri: &str) -> Self {
        let (name, prefix) = if prefix.is_empty() {
            ("xmlns".to_string(), None)
        } else {
            (prefix.to_string(), Some("xmlns".to_string()))
        };
        Self {
            name,
            value: uri.to_string(),
            prefix,
            namespace: Some(XMLNS_NS_URI.to_string()),
        }
    }
}

/// An XML document.
///
/// # Examples
///
/// ```
/// use xmlcursor::tree::{Document, NodeKind};
///
/// let mut doc = Document::new();
/// let root = doc.root();
/// let elem = doc.create_element("root", None, None);
/// doc.append_child(root, elem);
/// assert_eq!(doc.root_element(), Some(elem));
/// assert_eq!(doc.node_name(elem), Some("root"));
/// ```
#[derive(Debug)]
pub struct Document {
    /// The node arena. Index 0 is unused (placeholder for `NonZeroU32`).
    nodes: Vec<NodeData>,
    /// The document root node id (the Document node, not the root element).
    root: NodeId,
    /// XML version from the XML declaration (e.g., "1.0").
    pub version: Option<String>,
    /// Encoding from the XML declaration (e.g., "UTF-8").
    pub encoding: Option<String>,
    /// Standalone flag from the XML declaration.
    pub standalone: Option<bool>,
}

impl Document {
    /// Creates a new empty document.
    ///
    /// The document contains a single root Document node.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(64);
        // Index 0: placeholder (NodeId uses NonZeroU32)
        nodes.push(NodeData::new(NodeKind::Document));
        // Index 1: the document root node
        nodes.push(NodeData::new(NodeKind::Document));
        let root = NodeId::from_index(1);
        Self {
            nodes,
            root,
            version: None,
            encoding: None,
            standalone: None,
        }
    }

    /// Returns the document root node id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the first element child of the document node.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| self.node(id).kind.is_element())
    }

    /// Returns a reference to the `NodeData` for the given node.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a valid node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Returns the local name of an element, or the target of a PI.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::ProcessingInstruction { target: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the namespace URI of an element node, if any.
    #[must_use]
    pub fn node_namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    /// Returns the prefix of an element node, if any.
    #[must_use]
    pub fn node_prefix(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { prefix, .. } => prefix.as_deref(),
            _ => None,
        }
    }

    /// Returns the text of a text, comment, CDATA or PI node.
    #[must_use]
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content }
            | NodeKind::Comment { content }
            | NodeKind::CData { content } => Some(content),
            NodeKind::ProcessingInstruction { data, .. } => data.as_deref(),
            _ => None,
        }
    }

    /// Returns the concatenated text and CDATA content of a node and all its
    /// descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut result = String::new();
        self.collect_text(id, &mut result);
        result
    }

    fn collect_text(&self, id: NodeId, buf: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text { content } | NodeKind::CData { content } => {
                buf.push_str(content);
            }
            NodeKind::Comment { .. } | NodeKind::ProcessingInstruction { .. } => {}
            _ => {
                for child in self.children(id) {
                    self.collect_text(child, buf);
                }
            }
        }
    }

    /// Returns the attributes of an element node.
    ///
    /// Returns an empty slice for non-element nodes.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Returns the value of an un-namespaced attribute by name.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name && a.namespace.is_none())
            .map(|a| a.value.as_str())
    }

    /// Returns the value of an attribute by namespace URI and local name.
    #[must_use]
    pub fn attribute_ns(&self, id: NodeId, namespace: &str, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Appends an attribute to an element. Does nothing for other nodes.
    pub fn push_attribute(&mut self, id: NodeId, attribute: Attribute) {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            attributes.push(attribute);
        }
    }

    /// Returns the namespace declarations made on one element, as
    /// `(prefix, uri)` pairs.
    pub fn namespace_declarations(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.attributes(id)
            .iter()
            .filter_map(Attribute::as_namespace_declaration)
    }

    /// Collects the namespace bindings in scope at `id`: declarations on
    /// the node and its ancestors, plus the bindings implied by element
    /// prefixes, with inner declarations shadowing outer ones.
    #[must_use]
    pub fn in_scope_namespaces(&self, id: NodeId) -> Vec<NamespaceBinding> {
        let mut bindings: Vec<NamespaceBinding> = Vec::new();
        let mut add = |prefix: &str, uri: &str| {
            if !bindings.iter().any(|b| b.prefix == prefix) {
                bindings.push(NamespaceBinding {
                    prefix: prefix.to_string(),
                    uri: uri.to_string(),
                });
            }
        };
        for ancestor in self.ancestors(id) {
            for (prefix, uri) in self.namespace_declarations(ancestor) {
                add(prefix, uri);
            }
            if let NodeKind::Element {
                prefix, namespace, ..
            } = &self.node(ancestor).kind
            {
                if let Some(uri) = namespace.as_deref() {
                    add(prefix.as_deref().unwrap_or(""), uri);
                }
            }
        }
        bindings
    }

    // --- Navigation ---

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns the previous sibling of a node.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Returns an iterator over a node and its ancestors (walking up to root).
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// Returns an iterator over all descendants of a node (depth-first).
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.first_child(id),
        }
    }

    // --- Mutation ---

    /// Allocates a new node in the arena and returns its `NodeId`.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    /// Allocates a detached element without attributes.
    pub fn create_element(
        &mut self,
        name: &str,
        prefix: Option<&str>,
        namespace: Option<&str>,
    ) -> NodeId {
        self.create_node(NodeKind::Element {
            name: name.to_string(),
            prefix: prefix.map(str::to_string),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
        })
    }

    /// Allocates a detached document fragment.
    pub fn create_fragment(&mut self) -> NodeId {
        self.create_node(NodeKind::DocumentFragment)
    }

    /// Appends a child node to the end of a parent's child list.
    ///
    /// # Panics
    ///
    /// Panics (in debug builds) if `child` already has a parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(
            self.node(child).parent.is_none(),
            "child already has a parent"
        );

        self.node_mut(child).parent = Some(parent);

        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
            self.node_mut(parent).last_child = Some(child);
        } else {
            self.node_mut(parent).first_child = Some(child);
            self.node_mut(parent).last_child = Some(child);
        }
    }

    /// Returns the total number of nodes in the arena (including the
    /// document node).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1 // subtract placeholder at index 0
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over all descendants of a node.
pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        if let Some(child) = self.doc.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }

        if let Some(sibling) = self.doc.next_sibling(current) {
            self.next = Some(sibling);
            return Some(current);
        }

        let mut ancestor = self.doc.parent(current);
        while let Some(anc) = ancestor {
            if anc == self.root {
                self.next = None;
                return Some(current);
            }
            if let Some(sibling) = self.doc.next_sibling(anc) {
                self.next = Some(sibling);
                return Some(current);
            }
            ancestor = self.doc.parent(anc);
        }

        self.next = None;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(doc: &mut Document, content: &str) -> NodeId {
        doc.create_node(NodeKind::Text {
            content: content.to_string(),
        })
    }

    #[test]
    fn test_new_document_has_root() {
        let doc = Document::new();
        assert!(matches!(doc.node(doc.root()).kind, NodeKind::Document));
        assert_eq!(doc.node_count(), 1);
        assert_eq!(doc.root_element(), None);
    }

    #[test]
    fn test_create_and_append_element() {
        let mut doc = Document::new();
        let root = doc.root();
        let elem = doc.create_element("div", Some("h"), Some("urn:h"));
        doc.append_child(root, elem);

        assert_eq!(doc.first_child(root), Some(elem));
        assert_eq!(doc.last_child(root), Some(elem));
        assert_eq!(doc.parent(elem), Some(root));
        assert_eq!(doc.node_name(elem), Some("div"));
        assert_eq!(doc.node_prefix(elem), Some("h"));
        assert_eq!(doc.node_namespace(elem), Some("urn:h"));
    }

    #[test]
    fn test_sibling_links() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = text(&mut doc, "A");
        let b = text(&mut doc, "B");
        let c = text(&mut doc, "C");
        doc.append_child(root, a);
        doc.append_child(root, b);
        doc.append_child(root, c);

        assert_eq!(doc.children(root).collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.prev_sibling(c), Some(b));
        assert_eq!(doc.prev_sibling(a), None);
        assert_eq!(doc.next_sibling(c), None);
    }

    #[test]
    fn test_descendants_and_text_content() {
        let mut doc = Document::new();
        let root = doc.root();
        let outer = doc.create_element("outer", None, None);
        let inner = doc.create_element("inner", None, None);
        let t1 = text(&mut doc, "one ");
        let t2 = text(&mut doc, "two");
        let comment = doc.create_node(NodeKind::Comment {
            content: "skip".to_string(),
        });
        doc.append_child(root, outer);
        doc.append_child(outer, t1);
        doc.append_child(outer, inner);
        doc.append_child(inner, t2);
        doc.append_child(outer, comment);

        let all: Vec<NodeId> = doc.descendants(root).collect();
        assert_eq!(all, vec![outer, t1, inner, t2, comment]);
        assert_eq!(doc.text_content(outer), "one two");
    }

    #[test]
    fn test_namespace_declaration_attributes() {
        let default = Attribute::namespace_declaration("", "urn:d");
        assert_eq!(default.name, "xmlns");
        assert_eq!(default.prefix, None);
        assert_eq!(default.as_namespace_declaration(), Some(("", "urn:d")));

        let prefixed = Attribute::namespace_declaration("p", "urn:p");
        assert_eq!(prefixed.prefix.as_deref(), Some("xmlns"));
        assert_eq!(prefixed.as_namespace_declaration(), Some(("p", "urn:p")));
    }

    #[test]
    fn test_in_scope_namespaces_shadowing() {
        let mut doc = Document::new();
        let root = doc.root();
        let outer = doc.create_element("outer", None, None);
        doc.push_attribute(outer, Attribute::namespace_declaration("p", "urn:outer"));
        doc.push_attribute(outer, Attribute::namespace_declaration("", "urn:d"));
        let inner = doc.create_element("inner", Some("p"), Some("urn:inner"));
        doc.push_attribute(inner, Attribute::namespace_declaration("p", "urn:inner"));
        doc.append_child(root, outer);
        doc.append_child(outer, inner);

        let scope = doc.in_scope_namespaces(inner);
        let find = |prefix: &str| {
            scope
                .iter()
                .find(|b| b.prefix == prefix)
                .map(|b| b.uri.as_str())
        };
        assert_eq!(find("p"), Some("urn:inner"));
        assert_eq!(find(""), Some("urn:d"));
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn test_attribute_lookup() {
        let mut doc = Document::new();
        let elem = doc.create_element("e", None, None);
        doc.push_attribute(
            elem,
            Attribute {
                name: "id".to_string(),
                value: "1".to_string(),
                prefix: None,
                namespace: None,
            },
        );
        doc.push_attribute(
            elem,
            Attribute {
                name: "id".to_string(),
                value: "2".to_string(),
                prefix: Some("x".to_string()),
                namespace: Some("urn:x".to_string()),
            },
        );
        assert_eq!(doc.attribute(elem, "id"), Some("1"));
        assert_eq!(doc.attribute_ns(elem, "urn:x", "id"), Some("2"));
        assert_eq!(doc.attributes(elem).len(), 2);
    }
}
