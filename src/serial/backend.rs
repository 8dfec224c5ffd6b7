use std::io::Write;

use log::trace;

use super::sink::{ContentOptions, Sink, TextSink};
use super::xml::write_doctype;
use crate::error::Result;
use crate::namespace::ExpandedName;
use crate::writer::{Backend, DocType, Leaf, WriterOptions, XmlWriter};

/// A [`Backend`] that streams markup to a [`Sink`].
#[derive(Debug)]
pub struct SerialBackend<S: Sink> {
    sink: S,
}

impl<S: Sink> SerialBackend<S> {
    /// Wraps a sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Returns the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Returns a reference to the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: Sink> Backend for SerialBackend<S> {
    type Handle = ();

    const NAME: &'static str = "serial";

    fn configure(&mut self, options: ContentOptions) {
        self.sink.configure(options);
    }

    fn start_document(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<()> {
        if version == "1.1" {
            self.sink.enable_xml11();
        }
        self.sink
            .write_xml_declaration(version, encoding, standalone)?;
        Ok(())
    }

    fn write_dtd(&mut self, text: &str) -> Result<()> {
        self.sink.write_raw(text)?;
        Ok(())
    }

    fn write_doctype(&mut self, doctype: &DocType<'_>) -> Result<()> {
        let mut text = String::new();
        write_doctype(
            &mut text,
            doctype.root,
            doctype.system_id,
            doctype.public_id,
            doctype.internal_subset,
        );
        self.sink.write_raw(&text)?;
        Ok(())
    }

    fn start_element(&mut self, _parent: Option<()>, name: &ExpandedName<'_>) -> Result<()> {
        self.sink.write_start_tag_open(&name.qualified())?;
        Ok(())
    }

    fn write_namespace(&mut self, _element: (), prefix: &str, uri: &str) -> Result<()> {
        let qname = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        self.sink.write_attribute(&qname, uri)?;
        Ok(())
    }

    fn write_attribute(&mut self, _element: (), name: &ExpandedName<'_>, value: &str) -> Result<()> {
        self.sink.write_attribute(&name.qualified(), value)?;
        Ok(())
    }

    fn close_start_tag(&mut self, _element: (), empty: bool) -> Result<()> {
        self.sink.write_start_tag_close(empty)?;
        Ok(())
    }

    fn end_element(&mut self, _element: (), name: &ExpandedName<'_>) -> Result<()> {
        self.sink.write_end_tag(&name.qualified())?;
        Ok(())
    }

    fn append_leaf(&mut self, _parent: Option<()>, leaf: Leaf<'_>) -> Result<Option<usize>> {
        trace!("serial leaf {leaf:?}");
        let terminator = match leaf {
            Leaf::Text { text, escape: true } => {
                self.sink.write_characters(text)?;
                None
            }
            Leaf::Text { text, escape: false } => {
                self.sink.write_raw(text)?;
                None
            }
            Leaf::CData(text) => self.sink.write_cdata(text)?,
            Leaf::Comment(text) => self.sink.write_comment(text)?,
            Leaf::ProcessingInstruction { target, data } => self.sink.write_pi(target, data)?,
            Leaf::EntityRef(name) => {
                self.sink.write_entity_reference(name)?;
                None
            }
        };
        Ok(terminator)
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.sink.write_raw(text)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sink.close()?;
        Ok(())
    }
}

impl<W: Write> XmlWriter<SerialBackend<TextSink<W>>> {
    /// Creates a writer that streams XML text to `out`.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlcursor::{WriterOptions, XmlWriter};
    ///
    /// let mut writer = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
    /// writer.start_element("greeting").unwrap();
    /// writer.write_characters("hi & bye").unwrap();
    /// writer.close().unwrap();
    /// let xml = String::from_utf8(writer.into_inner()).unwrap();
    /// assert_eq!(xml, "<greeting>hi &amp; bye</greeting>");
    /// ```
    pub fn to_writer(out: W, options: WriterOptions) -> Self {
        Self::new(SerialBackend::new(TextSink::new(out)), options)
    }

    /// Returns the underlying writer. Call [`close`](Self::close) first to
    /// finish the document.
    pub fn into_inner(self) -> W {
        self.into_backend().into_sink().into_inner()
    }
}
