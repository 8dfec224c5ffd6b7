//! Node type definitions.

use super::Attribute;

/// The kind of an XML node and its associated data.
///
/// Navigation links (parent, children, siblings) are stored in `NodeData`,
/// not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. There is exactly one per `Document`.
    Document,

    /// A document fragment: a detached container that may hold several
    /// top-level elements.
    DocumentFragment,

    /// An element node, e.g., `<p:div class="x">`.
    Element {
        /// The element's local name.
        name: String,
        /// Namespace prefix (e.g., `"svg"` in `svg:rect`), if any.
        prefix: Option<String>,
        /// Namespace URI, if any.
        namespace: Option<String>,
        /// Attributes on this element, namespace declarations included.
        attributes: Vec<Attribute>,
    },

    /// A text node containing character data.
    Text {
        /// The text content, unescaped.
        content: String,
    },

    /// A CDATA section, e.g., `<![CDATA[...]]>`.
    CData {
        /// The CDATA content.
        content: String,
    },

    /// A comment node, e.g., `<!-- ... -->`.
    Comment {
        /// The comment text (without the `<!--` and `-->` delimiters).
        content: String,
    },

    /// A processing instruction, e.g., `<?target data?>`.
    ProcessingInstruction {
        /// The PI target (e.g., `"xml-stylesheet"`).
        target: String,
        /// The PI data, if any.
        data: Option<String>,
    },

    /// An unexpanded entity reference, e.g., `&nbsp;`.
    EntityRef {
        /// The entity name (without `&` and `;`).
        name: String,
    },

    /// A document type declaration, e.g., `<!DOCTYPE html>`.
    DocumentType {
        /// The root element name declared in the DOCTYPE.
        name: String,
        /// The SYSTEM identifier (URI), if any.
        system_id: Option<String>,
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
        /// The internal subset text, without the brackets.
        internal_subset: Option<String>,
    },
}

impl NodeKind {
    /// Returns `true` for element nodes.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }

    /// Returns `true` for nodes that may hold children: documents,
    /// fragments, and elements.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Document | Self::DocumentFragment | Self::Element { .. }
        )
    }
}
