use std::fmt;

use super::{Attribute, Document, NodeId, NodeKind};
use crate::namespace::{ExpandedName, NamespaceBinding};
use crate::writer::DocType;

/// What a target node can be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// A document node: holds at most one root element.
    Document,
    /// A document fragment: may hold any number of top-level elements.
    Fragment,
    /// An element.
    Element,
    /// Anything else (text, comments, ...).
    Other,
}

/// The operations the tree backend needs from a node tree.
///
/// Nodes are created detached and then appended; the backend never
/// modifies a node it did not create, except to append children to its
/// target and to add namespace declarations or attributes to elements it
/// created.
pub trait TreeModel {
    /// A node reference.
    type Node: Copy + Eq + fmt::Debug;

    /// The document node.
    fn document_node(&self) -> Self::Node;

    /// Classifies a node.
    fn role(&self, node: Self::Node) -> NodeRole;

    /// The name of an element node.
    fn element_name(&self, node: Self::Node) -> Option<ExpandedName<'_>>;

    /// Every namespace binding in scope at `node`.
    fn in_scope_namespaces(&self, node: Self::Node) -> Vec<NamespaceBinding>;

    /// Records the XML declaration on the document.
    fn set_xml_declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>);

    /// Creates a detached element.
    fn create_element(&mut self, name: &ExpandedName<'_>) -> Self::Node;

    /// Adds an attribute to an element.
    fn add_attribute(&mut self, element: Self::Node, name: &ExpandedName<'_>, value: &str);

    /// Adds a namespace declaration (`""` prefix for the default namespace)
    /// to an element.
    fn add_namespace_declaration(&mut self, element: Self::Node, prefix: &str, uri: &str);

    /// Creates a detached text node.
    fn create_text(&mut self, text: &str) -> Self::Node;

    /// Creates a detached CDATA section.
    fn create_cdata(&mut self, text: &str) -> Self::Node;

    /// Creates a detached comment.
    fn create_comment(&mut self, text: &str) -> Self::Node;

    /// Creates a detached processing instruction.
    fn create_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Self::Node;

    /// Creates a detached entity reference.
    fn create_entity_reference(&mut self, name: &str) -> Self::Node;

    /// Creates a detached document type node.
    fn create_document_type(&mut self, doctype: &DocType<'_>) -> Self::Node;

    /// Appends `child` as the last child of `parent`.
    fn append(&mut self, parent: Self::Node, child: Self::Node);
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl TreeModel for Document {
    type Node = NodeId;

    fn document_node(&self) -> NodeId {
        self.root()
    }

    fn role(&self, node: NodeId) -> NodeRole {
        match self.node(node).kind {
            NodeKind::Document => NodeRole::Document,
            NodeKind::DocumentFragment => NodeRole::Fragment,
            NodeKind::Element { .. } => NodeRole::Element,
            _ => NodeRole::Other,
        }
    }

    fn element_name(&self, node: NodeId) -> Option<ExpandedName<'_>> {
        match &self.node(node).kind {
            NodeKind::Element {
                name,
                prefix,
                namespace,
                ..
            } => Some(ExpandedName::new(
                prefix.as_deref().unwrap_or(""),
                name,
                namespace.as_deref().unwrap_or(""),
            )),
            _ => None,
        }
    }

    fn in_scope_namespaces(&self, node: NodeId) -> Vec<NamespaceBinding> {
        Document::in_scope_namespaces(self, node)
    }

    fn set_xml_declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        self.version = Some(version.to_string());
        self.encoding = encoding.map(str::to_string);
        self.standalone = standalone;
    }

    fn create_element(&mut self, name: &ExpandedName<'_>) -> NodeId {
        self.create_node(NodeKind::Element {
            name: name.local_name.to_string(),
            prefix: non_empty(name.prefix),
            namespace: non_empty(name.namespace_uri),
            attributes: Vec::new(),
        })
    }

    fn add_attribute(&mut self, element: NodeId, name: &ExpandedName<'_>, value: &str) {
        self.push_attribute(
            element,
            Attribute {
                name: name.local_name.to_string(),
                value: value.to_string(),
                prefix: non_empty(name.prefix),
                namespace: non_empty(name.namespace_uri),
            },
        );
    }

    fn add_namespace_declaration(&mut self, element: NodeId, prefix: &str, uri: &str) {
        self.push_attribute(element, Attribute::namespace_declaration(prefix, uri));
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.create_node(NodeKind::Text {
            content: text.to_string(),
        })
    }

    fn create_cdata(&mut self, text: &str) -> NodeId {
        self.create_node(NodeKind::CData {
            content: text.to_string(),
        })
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.create_node(NodeKind::Comment {
            content: text.to_string(),
        })
    }

    fn create_processing_instruction(&mut self, target: &str, data: Option<&str>) -> NodeId {
        self.create_node(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.filter(|d| !d.is_empty()).map(str::to_string),
        })
    }

    fn create_entity_reference(&mut self, name: &str) -> NodeId {
        self.create_node(NodeKind::EntityRef {
            name: name.to_string(),
        })
    }

    fn create_document_type(&mut self, doctype: &DocType<'_>) -> NodeId {
        self.create_node(NodeKind::DocumentType {
            name: doctype.root.to_string(),
            system_id: doctype.system_id.map(str::to_string),
            public_id: doctype.public_id.map(str::to_string),
            internal_subset: doctype.internal_subset.map(str::to_string),
        })
    }

    fn append(&mut self, parent: NodeId, child: NodeId) {
        self.append_child(parent, child);
    }
}

impl<T: TreeModel + ?Sized> TreeModel for &mut T {
    type Node = T::Node;

    fn document_node(&self) -> Self::Node {
        (**self).document_node()
    }

    fn role(&self, node: Self::Node) -> NodeRole {
        (**self).role(node)
    }

    fn element_name(&self, node: Self::Node) -> Option<ExpandedName<'_>> {
        (**self).element_name(node)
    }

    fn in_scope_namespaces(&self, node: Self::Node) -> Vec<NamespaceBinding> {
        (**self).in_scope_namespaces(node)
    }

    fn set_xml_declaration(&mut self, version: &str, encoding: Option<&str>, standalone: Option<bool>) {
        (**self).set_xml_declaration(version, encoding, standalone);
    }

    fn create_element(&mut self, name: &ExpandedName<'_>) -> Self::Node {
        (**self).create_element(name)
    }

    fn add_attribute(&mut self, element: Self::Node, name: &ExpandedName<'_>, value: &str) {
        (**self).add_attribute(element, name, value);
    }

    fn add_namespace_declaration(&mut self, element: Self::Node, prefix: &str, uri: &str) {
        (**self).add_namespace_declaration(element, prefix, uri);
    }

    fn create_text(&mut self, text: &str) -> Self::Node {
        (**self).create_text(text)
    }

    fn create_cdata(&mut self, text: &str) -> Self::Node {
        (**self).create_cdata(text)
    }

    fn create_comment(&mut self, text: &str) -> Self::Node {
        (**self).create_comment(text)
    }

    fn create_processing_instruction(&mut self, target: &str, data: Option<&str>) -> Self::Node {
        (**self).create_processing_instruction(target, data)
    }

    fn create_entity_reference(&mut self, name: &str) -> Self::Node {
        (**self).create_entity_reference(name)
    }

    fn create_document_type(&mut self, doctype: &DocType<'_>) -> Self::Node {
        (**self).create_document_type(doctype)
    }

    fn append(&mut self, parent: Self::Node, child: Self::Node) {
        (**self).append(parent, child);
    }
}
