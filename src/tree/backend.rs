use log::{debug, trace};

use super::model::{NodeRole, TreeModel};
use crate::error::{Result, WriteError};
use crate::namespace::ExpandedName;
use crate::serial::xml::{
    cdata_segments, check_escapable, check_unescapable, find_cdata_terminator,
    find_comment_terminator, find_pi_terminator, fix_comment, CharPolicy,
};
use crate::serial::ContentOptions;
use crate::writer::{AdoptedElement, Backend, DocType, Leaf, WriterOptions, XmlWriter};

/// A [`Backend`] that builds nodes in a [`TreeModel`].
///
/// The target is a document, a document fragment, or an existing element.
/// Writing into an element continues inside it: namespaces in scope there
/// are visible to the writer, and the element itself cannot be ended.
/// A fragment target accepts any number of top-level elements.
///
/// Character checks match the serial backend, so a sequence of calls
/// fails in the same place whichever backend receives it.
#[derive(Debug)]
pub struct TreeBackend<M: TreeModel> {
    model: M,
    target: M::Node,
    role: NodeRole,
    policy: CharPolicy,
    options: ContentOptions,
}

impl<M: TreeModel> TreeBackend<M> {
    /// Builds into the model's document node.
    pub fn new(model: M) -> Self {
        let target = model.document_node();
        Self {
            model,
            target,
            role: NodeRole::Document,
            policy: CharPolicy::default(),
            options: ContentOptions::default(),
        }
    }

    /// Builds into `target`, which must be a document, fragment or element.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Structure`] for any other kind of node.
    pub fn with_target(model: M, target: M::Node) -> Result<Self> {
        let role = model.role(target);
        if role == NodeRole::Other {
            return Err(WriteError::structure(
                "tree output target must be a document, fragment or element",
            ));
        }
        Ok(Self {
            model,
            target,
            role,
            policy: CharPolicy::default(),
            options: ContentOptions::default(),
        })
    }

    /// Returns the model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Returns the model, giving up the backend.
    pub fn into_model(self) -> M {
        self.model
    }

    fn parent_or_target(&self, parent: Option<M::Node>) -> M::Node {
        parent.unwrap_or(self.target)
    }
}

impl<M: TreeModel> Backend for TreeBackend<M> {
    type Handle = M::Node;

    const NAME: &'static str = "tree";

    fn configure(&mut self, options: ContentOptions) {
        self.options = options;
    }

    fn adopted_element(&self) -> Option<AdoptedElement<M::Node>> {
        if self.role != NodeRole::Element {
            return None;
        }
        let name = self.model.element_name(self.target)?;
        Some(AdoptedElement {
            handle: self.target,
            prefix: name.prefix.to_string(),
            local_name: name.local_name.to_string(),
            namespace_uri: name.namespace_uri.to_string(),
            bindings: self.model.in_scope_namespaces(self.target),
        })
    }

    fn allows_multiple_roots(&self) -> bool {
        self.role == NodeRole::Fragment
    }

    fn start_document(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()> {
        self.policy.xml11 = version == "1.1";
        if self.role == NodeRole::Document {
            self.model.set_xml_declaration(version, encoding, standalone);
        } else {
            debug!("ignoring XML declaration for a non-document target");
        }
        Ok(())
    }

    fn write_dtd(&mut self, _text: &str) -> Result<()> {
        Err(WriteError::UnsupportedOperation {
            operation: "write_dtd",
            backend: Self::NAME,
        })
    }

    fn write_doctype(&mut self, doctype: &DocType<'_>) -> Result<()> {
        let node = self.model.create_document_type(doctype);
        self.model.append(self.target, node);
        Ok(())
    }

    fn start_element(
        &mut self,
        parent: Option<M::Node>,
        name: &ExpandedName<'_>,
    ) -> Result<M::Node> {
        let parent = self.parent_or_target(parent);
        let element = self.model.create_element(name);
        self.model.append(parent, element);
        Ok(element)
    }

    fn write_namespace(&mut self, element: M::Node, prefix: &str, uri: &str) -> Result<()> {
        check_escapable(uri, self.policy)?;
        self.model.add_namespace_declaration(element, prefix, uri);
        Ok(())
    }

    fn write_attribute(
        &mut self,
        element: M::Node,
        name: &ExpandedName<'_>,
        value: &str,
    ) -> Result<()> {
        check_escapable(value, self.policy)?;
        self.model.add_attribute(element, name, value);
        Ok(())
    }

    fn close_start_tag(&mut self, _element: M::Node, _empty: bool) -> Result<()> {
        Ok(())
    }

    fn end_element(&mut self, _element: M::Node, _name: &ExpandedName<'_>) -> Result<()> {
        Ok(())
    }

    fn append_leaf(&mut self, parent: Option<M::Node>, leaf: Leaf<'_>) -> Result<Option<usize>> {
        trace!("tree leaf {leaf:?}");
        let parent = self.parent_or_target(parent);
        let checking = self.options.check_content;
        let fixing = checking && self.options.fix_content;
        match leaf {
            Leaf::Text { text, .. } => {
                check_escapable(text, self.policy)?;
                let node = self.model.create_text(text);
                self.model.append(parent, node);
            }
            Leaf::CData(text) => {
                check_unescapable(text, self.policy)?;
                if let Some(index) = find_cdata_terminator(text) {
                    if checking && !fixing {
                        return Ok(Some(index));
                    }
                }
                for segment in cdata_segments(text) {
                    let node = self.model.create_cdata(segment);
                    self.model.append(parent, node);
                }
            }
            Leaf::Comment(text) => {
                check_unescapable(text, self.policy)?;
                let text = match find_comment_terminator(text) {
                    Some(index) if checking && !fixing => return Ok(Some(index)),
                    Some(_) if fixing => fix_comment(text),
                    _ => text.into(),
                };
                let node = self.model.create_comment(&text);
                self.model.append(parent, node);
            }
            Leaf::ProcessingInstruction { target, data } => {
                if let Some(data) = data {
                    check_unescapable(data, self.policy)?;
                    if let Some(index) = find_pi_terminator(data) {
                        return Ok(Some(index));
                    }
                }
                let node = self.model.create_processing_instruction(target, data);
                self.model.append(parent, node);
            }
            Leaf::EntityRef(name) => {
                let node = self.model.create_entity_reference(name);
                self.model.append(parent, node);
            }
        }
        Ok(None)
    }

    fn write_raw(&mut self, _text: &str) -> Result<()> {
        Err(WriteError::UnsupportedOperation {
            operation: "write_raw",
            backend: Self::NAME,
        })
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<M: TreeModel> XmlWriter<TreeBackend<M>> {
    /// Creates a writer that builds nodes under the model's document node.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlcursor::tree::Document;
    /// use xmlcursor::{WriterOptions, XmlWriter};
    ///
    /// let mut doc = Document::new();
    /// let mut writer = XmlWriter::to_tree(&mut doc, WriterOptions::default());
    /// writer.start_element("root").unwrap();
    /// writer.write_characters("text").unwrap();
    /// writer.close().unwrap();
    /// drop(writer);
    ///
    /// let root = doc.root_element().unwrap();
    /// assert_eq!(doc.text_content(root), "text");
    /// ```
    pub fn to_tree(model: M, options: WriterOptions) -> Self {
        Self::new(TreeBackend::new(model), options)
    }

    /// Creates a writer that builds nodes under `target`: a document, a
    /// document fragment, or an existing element.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Structure`] if `target` is another kind of
    /// node.
    pub fn to_tree_node(model: M, target: M::Node, options: WriterOptions) -> Result<Self> {
        Ok(Self::new(TreeBackend::with_target(model, target)?, options))
    }

    /// Returns the model, giving up the writer. Call
    /// [`close`](Self::close) first to finish the document.
    pub fn into_model(self) -> M {
        self.into_backend().into_model()
    }
}
