//! Typed content and attribute writes.

use super::frame::{FrameScope, OpenElementState, OpenFrame};
use super::{Backend, XmlWriter};
use crate::error::{Result, WriteError};
use crate::namespace::{PrefixStatus, ScopeChain};
use crate::typed::{lexicalize_array, scratch, QName, TypedValue};
use crate::util::qname::join_qname;

impl<B: Backend> XmlWriter<B> {
    /// Writes the lexical form of `value` as character data.
    ///
    /// # Errors
    ///
    /// As for [`write_characters`](Self::write_characters).
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlcursor::{WriterOptions, XmlWriter};
    ///
    /// let mut writer = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
    /// writer.start_element("n").unwrap();
    /// writer.write_typed(&-12i32).unwrap();
    /// writer.end_document().unwrap();
    /// assert_eq!(writer.into_inner(), b"<n>-12</n>");
    /// ```
    pub fn write_typed<T: TypedValue + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mut buf = scratch(32);
        value.lexicalize(&mut buf);
        let escape = !is_markup_safe(&buf);
        self.emit_text(&buf, escape, true)
    }

    /// Writes `values` as a space-separated list. Set `leading_separator`
    /// when continuing a list started by an earlier call.
    ///
    /// # Errors
    ///
    /// As for [`write_characters`](Self::write_characters).
    pub fn write_typed_array<T: TypedValue>(
        &mut self,
        values: &[T],
        leading_separator: bool,
    ) -> Result<()> {
        let mut buf = scratch(values.len() * 8);
        lexicalize_array(values, leading_separator, &mut buf);
        self.emit_text(&buf, true, true)
    }

    /// Writes a qualified-name value, using a prefix bound to its namespace
    /// at this point. In repairing mode a missing binding is declared on the
    /// current element while its start tag is still open.
    ///
    /// # Errors
    ///
    /// [`WriteError::NamespaceConstraint`] if no prefix is bound and none
    /// can be declared, or if a name in no namespace is written where a
    /// default namespace is in scope.
    pub fn write_qname(&mut self, qname: &QName) -> Result<()> {
        self.ensure_usable()?;
        if matches!(self.open, OpenElementState::Open(OpenFrame::Empty(_))) {
            self.close_open_element()?;
        }
        let can_declare = matches!(self.open, OpenElementState::Open(OpenFrame::Cursor));
        let lexical = self.qname_lexical(qname, can_declare)?;
        self.emit_text(&lexical, true, true)
    }

    /// Writes an attribute whose value is the lexical form of `value`.
    ///
    /// # Errors
    ///
    /// As for [`write_attribute_ns`](Self::write_attribute_ns).
    pub fn write_typed_attribute<T: TypedValue + ?Sized>(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        value: &T,
    ) -> Result<()> {
        let mut buf = scratch(32);
        value.lexicalize(&mut buf);
        self.emit_attribute(None, Some(namespace_uri), local_name, &buf)
    }

    /// Writes an attribute whose value is a space-separated list.
    ///
    /// # Errors
    ///
    /// As for [`write_attribute_ns`](Self::write_attribute_ns).
    pub fn write_typed_array_attribute<T: TypedValue>(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        values: &[T],
    ) -> Result<()> {
        let mut buf = scratch(values.len() * 8);
        lexicalize_array(values, false, &mut buf);
        self.emit_attribute(None, Some(namespace_uri), local_name, &buf)
    }

    /// Writes an attribute whose value is a qualified name.
    ///
    /// # Errors
    ///
    /// As for [`write_qname`](Self::write_qname) and
    /// [`write_attribute_ns`](Self::write_attribute_ns).
    pub fn write_qname_attribute(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        qname: &QName,
    ) -> Result<()> {
        self.ensure_usable()?;
        if !self.open.is_open() {
            return Err(WriteError::structure(format!(
                "attribute '{local_name}' written with no open start element"
            )));
        }
        let lexical = self.qname_lexical(qname, true)?;
        self.emit_attribute(None, Some(namespace_uri), local_name, &lexical)
    }

    fn qname_lexical(&mut self, qname: &QName, can_declare: bool) -> Result<String> {
        let uri = qname.namespace_uri.as_str();
        let local = qname.local_name.as_str();
        if !self.options.namespace_aware {
            if !uri.is_empty() {
                return Err(WriteError::namespace(
                    "namespace URI given to a writer that is not namespace aware",
                ));
            }
            let prefix = qname.prefix.as_deref().unwrap_or("");
            return Ok(join_qname(prefix, local).into_owned());
        }
        if uri.is_empty() {
            if !self.default_namespace().is_empty() {
                return Err(WriteError::namespace(format!(
                    "QName '{local}' in no namespace cannot be written under a default namespace"
                )));
            }
            return Ok(local.to_string());
        }
        if let Some(prefix) = qname.prefix.as_deref() {
            if self.prefix_status(prefix, uri) == PrefixStatus::Bound {
                return Ok(join_qname(prefix, local).into_owned());
            }
        }
        if let Some(prefix) = self.find_prefix(uri, true) {
            return Ok(join_qname(prefix, local).into_owned());
        }
        if !(can_declare && self.binder.is_repairing()) {
            return Err(WriteError::namespace(format!(
                "no prefix bound for URI '{uri}' in QName '{local}'"
            )));
        }

        let scope = FrameScope {
            frames: &self.frames,
            extra: self.open.empty_frame(),
        };
        let resolution = self
            .binder
            .resolve_attribute(qname.prefix.as_deref(), uri, &scope)?;
        if resolution.declare {
            let Some(handle) = self.open_frame().map(|f| f.handle) else {
                return Err(WriteError::structure("no open start element for a QName binding"));
            };
            self.backend.write_namespace(handle, &resolution.prefix, uri)?;
            if let Some(frame) = self.open_frame_mut() {
                frame.bindings.bind(&resolution.prefix, uri);
            }
        }
        Ok(join_qname(&resolution.prefix, local).into_owned())
    }
}

/// Numbers and booleans never need escaping.
fn is_markup_safe(lexical: &str) -> bool {
    lexical
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'.'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::typed::{BigDecimal, QName};
    use crate::{WriteError, WriterOptions, XmlWriter};

    fn output(writer: XmlWriter<crate::serial::SerialBackend<crate::serial::TextSink<Vec<u8>>>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_typed_scalars() {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("v").unwrap();
        w.empty_element("b").unwrap();
        w.write_typed_attribute("", "flag", &true).unwrap();
        w.start_element("f").unwrap();
        w.write_typed(&f64::NEG_INFINITY).unwrap();
        w.end_element().unwrap();
        w.start_element("d").unwrap();
        w.write_typed(&"-0.50".parse::<BigDecimal>().unwrap()).unwrap();
        w.end_document().unwrap();
        assert_eq!(
            output(w),
            "<v><b flag=\"true\"/><f>-INF</f><d>-0.5</d></v>"
        );
    }

    #[test]
    fn test_typed_array_continuation() {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("list").unwrap();
        w.write_typed_array(&[1u8, 2, 3], false).unwrap();
        w.write_typed_array(&[4u8], true).unwrap();
        w.end_document().unwrap();
        assert_eq!(output(w), "<list>1 2 3 4</list>");
    }

    #[test]
    fn test_qname_uses_bound_prefix() {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("root").unwrap();
        w.write_namespace("xs", "http://www.w3.org/2001/XMLSchema").unwrap();
        w.write_qname_attribute(
            "",
            "type",
            &QName::new("http://www.w3.org/2001/XMLSchema", "int"),
        )
        .unwrap();
        w.end_document().unwrap();
        assert_eq!(
            output(w),
            "<root xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" type=\"xs:int\"/>"
        );
    }

    #[test]
    fn test_qname_repairing_declares_binding() {
        let opts = WriterOptions::default().repairing(true);
        let mut w = XmlWriter::to_writer(Vec::new(), opts);
        w.start_element("root").unwrap();
        w.write_qname(&QName::new("urn:q", "x").with_prefix("q")).unwrap();
        w.end_document().unwrap();
        assert_eq!(output(w), "<root xmlns:q=\"urn:q\">q:x</root>");
    }

    #[test]
    fn test_xmlns_namespace_rejected_for_names_and_qnames() {
        let xmlns = crate::namespace::XMLNS_NS_URI;
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default().repairing(true));
        assert!(matches!(
            w.start_element_ns(xmlns, "a"),
            Err(WriteError::NamespaceConstraint { .. })
        ));
        w.start_element("root").unwrap();
        let err = w
            .write_qname_attribute("", "type", &QName::new(xmlns, "x"))
            .unwrap_err();
        assert!(matches!(err, WriteError::NamespaceConstraint { .. }));
        w.end_document().unwrap();
        assert_eq!(output(w), "<root/>");
    }

    #[test]
    fn test_qname_unbound_is_namespace_error() {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("root").unwrap();
        let err = w.write_qname(&QName::new("urn:q", "x")).unwrap_err();
        assert!(matches!(err, WriteError::NamespaceConstraint { .. }));
    }

    #[test]
    fn test_qname_no_namespace_under_default() {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("root").unwrap();
        w.write_default_namespace("urn:d").unwrap();
        let err = w.write_qname(&QName::local("x")).unwrap_err();
        assert!(matches!(err, WriteError::NamespaceConstraint { .. }));
    }
}
