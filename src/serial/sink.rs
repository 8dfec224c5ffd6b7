//! Byte-level output for the serial backend.
//!
//! [`TextSink`] escapes each call into a reused `String` and then encodes
//! that buffer into the underlying writer in one go. A call that fails
//! validation (a forbidden character, say) therefore writes nothing.

use std::fmt;
use std::io::{self, Write};

use encoding_rs::{CoderResult, Encoder, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use log::{debug, warn};

use super::xml::{
    cdata_segments, check_unescapable, escape_attr, escape_text, find_cdata_terminator,
    find_comment_terminator, find_pi_terminator, fix_comment, write_declaration, CharPolicy,
};

/// How well-formedness problems in character content are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentOptions {
    /// Report CDATA, comment and PI terminators found inside their content.
    pub check_content: bool,
    /// Rewrite CDATA and comment content so it stays well-formed instead of
    /// reporting it.
    pub fix_content: bool,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            check_content: true,
            fix_content: false,
        }
    }
}

/// Markup-level output.
///
/// Names are passed already qualified (`prefix:local`). Methods that take
/// content with an in-band terminator return the byte index of an offending
/// terminator instead of writing, when content checking is on and the
/// content could not be fixed.
pub trait Sink {
    /// Applies content checking options.
    fn configure(&mut self, options: ContentOptions);

    /// Writes the XML declaration and selects the output encoding.
    fn write_xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> io::Result<()>;

    /// Switches character escaping to XML 1.1 rules.
    fn enable_xml11(&mut self);

    /// Writes `<name`.
    fn write_start_tag_open(&mut self, qname: &str) -> io::Result<()>;

    /// Writes ` name="value"` with the value escaped.
    fn write_attribute(&mut self, qname: &str, value: &str) -> io::Result<()>;

    /// Writes `>` or, for an empty element, `/>`.
    fn write_start_tag_close(&mut self, empty: bool) -> io::Result<()>;

    /// Writes `</name>`.
    fn write_end_tag(&mut self, qname: &str) -> io::Result<()>;

    /// Writes escaped character data.
    fn write_characters(&mut self, text: &str) -> io::Result<()>;

    /// Writes a CDATA section.
    fn write_cdata(&mut self, text: &str) -> io::Result<Option<usize>>;

    /// Writes a comment.
    fn write_comment(&mut self, text: &str) -> io::Result<Option<usize>>;

    /// Writes a processing instruction.
    fn write_pi(&mut self, target: &str, data: Option<&str>) -> io::Result<Option<usize>>;

    /// Writes `&name;`.
    fn write_entity_reference(&mut self, name: &str) -> io::Result<()>;

    /// Writes text without escaping.
    fn write_raw(&mut self, text: &str) -> io::Result<()>;

    /// Flushes buffered output.
    fn flush(&mut self) -> io::Result<()>;

    /// Flushes and finishes the output. Further calls are errors.
    fn close(&mut self) -> io::Result<()>;
}

enum OutputEncoding {
    Utf8,
    Utf16 { big_endian: bool },
    Legacy(Box<Encoder>),
}

impl OutputEncoding {
    fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 { big_endian: true } => "UTF-16BE",
            Self::Utf16 { big_endian: false } => "UTF-16LE",
            Self::Legacy(encoder) => encoder.encoding().name(),
        }
    }
}

/// A [`Sink`] that writes XML text to an [`io::Write`].
///
/// Output is UTF-8 until an XML declaration names another encoding. UTF-16
/// is written with a byte order mark when the label does not fix the byte
/// order. Characters a legacy encoding cannot represent are written as
/// numeric character references. An encoding label that is not recognized
/// keeps UTF-8 bytes but writes every non-ASCII character as a reference.
///
/// # Examples
///
/// ```
/// use xmlcursor::serial::{Sink, TextSink};
///
/// let mut sink = TextSink::new(Vec::new());
/// sink.write_start_tag_open("a").unwrap();
/// sink.write_attribute("x", "1 < 2").unwrap();
/// sink.write_start_tag_close(true).unwrap();
/// assert_eq!(sink.into_inner(), b"<a x=\"1 &lt; 2\"/>");
/// ```
pub struct TextSink<W: Write> {
    out: W,
    buf: String,
    encoded: Vec<u8>,
    policy: CharPolicy,
    encoding: OutputEncoding,
    options: ContentOptions,
    closed: bool,
}

impl<W: Write> TextSink<W> {
    /// Creates a sink writing UTF-8 to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: String::with_capacity(256),
            encoded: Vec::new(),
            policy: CharPolicy::default(),
            encoding: OutputEncoding::Utf8,
            options: ContentOptions::default(),
            closed: false,
        }
    }

    /// Name of the encoding being written.
    #[must_use]
    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn select_encoding(&mut self, label: &str) {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(enc) if enc == UTF_8 => {}
            Some(enc) if enc == UTF_16LE || enc == UTF_16BE => {
                let big_endian = enc == UTF_16BE;
                self.encoding = OutputEncoding::Utf16 { big_endian };
                // "UTF-16" without a byte order needs a BOM.
                if label.trim().eq_ignore_ascii_case("utf-16") {
                    self.buf.push('\u{FEFF}');
                }
            }
            Some(enc) => {
                debug!("encoding output as {}", enc.name());
                self.encoding = OutputEncoding::Legacy(Box::new(enc.new_encoder()));
            }
            None => {
                warn!("unknown output encoding '{label}'; writing non-ASCII characters as references");
                self.policy.ascii_only = true;
            }
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to a closed XML sink",
            ));
        }
        Ok(())
    }

    /// Encodes and writes the staged buffer.
    fn commit(&mut self) -> io::Result<()> {
        let result = self.encode_staged(false);
        self.buf.clear();
        result
    }

    fn encode_staged(&mut self, last: bool) -> io::Result<()> {
        match &mut self.encoding {
            OutputEncoding::Utf8 => self.out.write_all(self.buf.as_bytes()),
            OutputEncoding::Utf16 { big_endian } => {
                self.encoded.clear();
                for unit in self.buf.encode_utf16() {
                    let bytes = if *big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    self.encoded.extend_from_slice(&bytes);
                }
                self.out.write_all(&self.encoded)
            }
            OutputEncoding::Legacy(encoder) => {
                let mut input = self.buf.as_str();
                loop {
                    self.encoded.clear();
                    let needed = encoder
                        .max_buffer_length_from_utf8_if_no_unmappables(input.len())
                        .unwrap_or(input.len() * 4 + 16)
                        .max(64);
                    self.encoded.reserve(needed);
                    let (result, read, _) =
                        encoder.encode_from_utf8_to_vec(input, &mut self.encoded, last);
                    self.out.write_all(&self.encoded)?;
                    input = &input[read..];
                    if matches!(result, CoderResult::InputEmpty) {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    /// Drops staged output after a failed call.
    fn discard<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() {
            self.buf.clear();
        }
        result
    }
}

impl<W: Write> Sink for TextSink<W> {
    fn configure(&mut self, options: ContentOptions) {
        self.options = options;
    }

    fn write_xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> io::Result<()> {
        self.ensure_open()?;
        if let Some(label) = encoding {
            self.select_encoding(label);
        }
        write_declaration(&mut self.buf, version, encoding, standalone);
        self.commit()
    }

    fn enable_xml11(&mut self) {
        self.policy.xml11 = true;
    }

    fn write_start_tag_open(&mut self, qname: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push('<');
        self.buf.push_str(qname);
        self.commit()
    }

    fn write_attribute(&mut self, qname: &str, value: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push(' ');
        self.buf.push_str(qname);
        self.buf.push_str("=\"");
        let escaped = escape_attr(&mut self.buf, value, self.policy);
        self.discard(escaped)?;
        self.buf.push('"');
        self.commit()
    }

    fn write_start_tag_close(&mut self, empty: bool) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push_str(if empty { "/>" } else { ">" });
        self.commit()
    }

    fn write_end_tag(&mut self, qname: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push_str("</");
        self.buf.push_str(qname);
        self.buf.push('>');
        self.commit()
    }

    fn write_characters(&mut self, text: &str) -> io::Result<()> {
        self.ensure_open()?;
        let escaped = escape_text(&mut self.buf, text, self.policy);
        self.discard(escaped)?;
        self.commit()
    }

    fn write_cdata(&mut self, text: &str) -> io::Result<Option<usize>> {
        self.ensure_open()?;
        check_unescapable(text, self.policy)?;
        if self.options.check_content {
            if let Some(index) = find_cdata_terminator(text) {
                if !self.options.fix_content {
                    return Ok(Some(index));
                }
            }
        }
        self.buf.push_str("<![CDATA[");
        for (i, segment) in cdata_segments(text).into_iter().enumerate() {
            if i > 0 {
                self.buf.push_str("]]><![CDATA[");
            }
            self.buf.push_str(segment);
        }
        self.buf.push_str("]]>");
        self.commit().map(|()| None)
    }

    fn write_comment(&mut self, text: &str) -> io::Result<Option<usize>> {
        self.ensure_open()?;
        check_unescapable(text, self.policy)?;
        let text = if self.options.check_content {
            match find_comment_terminator(text) {
                Some(index) if !self.options.fix_content => return Ok(Some(index)),
                Some(_) => fix_comment(text),
                None => text.into(),
            }
        } else {
            text.into()
        };
        self.buf.push_str("<!--");
        self.buf.push_str(&text);
        self.buf.push_str("-->");
        self.commit().map(|()| None)
    }

    fn write_pi(&mut self, target: &str, data: Option<&str>) -> io::Result<Option<usize>> {
        self.ensure_open()?;
        if let Some(data) = data {
            check_unescapable(data, self.policy)?;
            if let Some(index) = find_pi_terminator(data) {
                return Ok(Some(index));
            }
        }
        self.buf.push_str("<?");
        self.buf.push_str(target);
        if let Some(data) = data.filter(|d| !d.is_empty()) {
            self.buf.push(' ');
            self.buf.push_str(data);
        }
        self.buf.push_str("?>");
        self.commit().map(|()| None)
    }

    fn write_entity_reference(&mut self, name: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push('&');
        self.buf.push_str(name);
        self.buf.push(';');
        self.commit()
    }

    fn write_raw(&mut self, text: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.buf.push_str(text);
        self.commit()
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if matches!(self.encoding, OutputEncoding::Legacy(_)) {
            self.buf.clear();
            self.encode_staged(true)?;
        }
        self.out.flush()
    }
}

impl<W: Write> fmt::Debug for TextSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSink")
            .field("encoding", &self.encoding.name())
            .field("xml11", &self.policy.xml11)
            .field("options", &self.options)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
