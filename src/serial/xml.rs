//! Escaping rules and the document serializer.
//!
//! The escaping functions here are shared by [`TextSink`](super::TextSink)
//! and by [`serialize`], so a document built through the tree backend
//! serializes to exactly what the serial backend would have written for the
//! same calls.
//!
//! Text content escapes `&`, `<`, `>` and `\r`; attribute values also escape
//! `"`, `\t` and `\n` so they survive attribute-value normalization.
//! Characters that XML 1.0 forbids outright are rejected with
//! [`io::ErrorKind::InvalidData`]; XML 1.1 output writes its restricted
//! characters as character references instead.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::io;

use crate::tree::{Document, NodeId, NodeKind};

/// How characters outside the plain printable range are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CharPolicy {
    /// XML 1.1 rules: restricted characters become character references.
    pub xml11: bool,
    /// Write every non-ASCII character as a character reference.
    pub ascii_only: bool,
    /// Write forbidden characters as references instead of failing.
    pub lenient: bool,
}

enum CharClass {
    Plain,
    Reference,
    Forbidden,
}

fn classify(ch: char, policy: CharPolicy) -> CharClass {
    let cp = u32::from(ch);
    let forbidden = cp == 0 || cp == 0xFFFE || cp == 0xFFFF;
    let control = cp < 0x20 && !matches!(ch, '\t' | '\n' | '\r');
    if forbidden || (control && !policy.xml11) {
        return if policy.lenient {
            CharClass::Reference
        } else {
            CharClass::Forbidden
        };
    }
    // C0 and C1 controls, plus the 1.1 line separators NEL and LSEP.
    let restricted11 = control || (0x7F..=0x9F).contains(&cp) || cp == 0x2028;
    if (policy.xml11 && restricted11) || (policy.ascii_only && cp >= 0x80) {
        CharClass::Reference
    } else {
        CharClass::Plain
    }
}

fn invalid_char(ch: char) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("character U+{:04X} cannot be represented in XML output", u32::from(ch)),
    )
}

/// Writes a hexadecimal character reference (`&#xHH;`) for a code point.
fn write_hex_char_ref(out: &mut String, ch: char) {
    let _ = write!(out, "&#x{:X};", u32::from(ch));
}

/// Escapes text content.
pub(crate) fn escape_text(out: &mut String, text: &str, policy: CharPolicy) -> io::Result<()> {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' => out.push(ch),
            _ => match classify(ch, policy) {
                CharClass::Plain => out.push(ch),
                CharClass::Reference => write_hex_char_ref(out, ch),
                CharClass::Forbidden => return Err(invalid_char(ch)),
            },
        }
    }
    Ok(())
}

/// Escapes an attribute value for a double-quoted attribute.
pub(crate) fn escape_attr(out: &mut String, value: &str, policy: CharPolicy) -> io::Result<()> {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => match classify(ch, policy) {
                CharClass::Plain => out.push(ch),
                CharClass::Reference => write_hex_char_ref(out, ch),
                CharClass::Forbidden => return Err(invalid_char(ch)),
            },
        }
    }
    Ok(())
}

/// Checks text or attribute content that will be escaped later: only the
/// characters no escaping can express are rejected.
pub(crate) fn check_escapable(text: &str, policy: CharPolicy) -> io::Result<()> {
    let strict = CharPolicy {
        lenient: false,
        ..policy
    };
    match text
        .chars()
        .find(|&ch| matches!(classify(ch, strict), CharClass::Forbidden))
    {
        Some(ch) => Err(invalid_char(ch)),
        None => Ok(()),
    }
}

/// Checks content that cannot contain references (CDATA, comments, PIs).
pub(crate) fn check_unescapable(text: &str, policy: CharPolicy) -> io::Result<()> {
    let strict = CharPolicy {
        ascii_only: false,
        lenient: false,
        ..policy
    };
    match text
        .chars()
        .find(|&ch| !matches!(classify(ch, strict), CharClass::Plain))
    {
        Some(ch) => Err(invalid_char(ch)),
        None => Ok(()),
    }
}

/// Byte index of the first `]]>` in CDATA content.
#[must_use]
pub fn find_cdata_terminator(text: &str) -> Option<usize> {
    text.find("]]>")
}

/// Byte index of the first `--` in comment content, or of a trailing `-`
/// that would run into the closing `-->`.
#[must_use]
pub fn find_comment_terminator(text: &str) -> Option<usize> {
    text.find("--")
        .or_else(|| text.ends_with('-').then(|| text.len() - 1))
}

/// Byte index of the first `?>` in processing instruction data.
#[must_use]
pub fn find_pi_terminator(data: &str) -> Option<usize> {
    data.find("?>")
}

/// Splits CDATA content into pieces that can each be written as a separate
/// CDATA section: every `]]>` is cut between `]]` and `>`.
#[must_use]
pub fn cdata_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(index) = rest.find("]]>") {
        segments.push(&rest[..index + 2]);
        rest = &rest[index + 2..];
    }
    segments.push(rest);
    segments
}

/// Separates every `--` in comment content with a space, and pads a
/// trailing `-`.
#[must_use]
pub fn fix_comment(text: &str) -> Cow<'_, str> {
    if find_comment_terminator(text).is_none() {
        return Cow::Borrowed(text);
    }
    let mut fixed = String::with_capacity(text.len() + 4);
    for ch in text.chars() {
        if ch == '-' && fixed.ends_with('-') {
            fixed.push(' ');
        }
        fixed.push(ch);
    }
    if fixed.ends_with('-') {
        fixed.push(' ');
    }
    Cow::Owned(fixed)
}

/// Appends an XML declaration.
pub(crate) fn write_declaration(
    out: &mut String,
    version: &str,
    encoding: Option<&str>,
    standalone: Option<bool>,
) {
    out.push_str("<?xml version=\"");
    out.push_str(version);
    out.push('"');
    if let Some(encoding) = encoding {
        out.push_str(" encoding=\"");
        out.push_str(encoding);
        out.push('"');
    }
    if let Some(standalone) = standalone {
        out.push_str(" standalone=\"");
        out.push_str(if standalone { "yes" } else { "no" });
        out.push('"');
    }
    out.push_str("?>");
}

/// Appends a DOCTYPE declaration.
pub(crate) fn write_doctype(
    out: &mut String,
    name: &str,
    system_id: Option<&str>,
    public_id: Option<&str>,
    internal_subset: Option<&str>,
) {
    out.push_str("<!DOCTYPE ");
    out.push_str(name);
    match (public_id, system_id) {
        (Some(pub_id), Some(sys_id)) => {
            out.push_str(" PUBLIC \"");
            out.push_str(pub_id);
            out.push_str("\" \"");
            out.push_str(sys_id);
            out.push('"');
        }
        (None, Some(sys_id)) => {
            out.push_str(" SYSTEM \"");
            out.push_str(sys_id);
            out.push('"');
        }
        _ => {}
    }
    if let Some(subset) = internal_subset {
        out.push_str(" [");
        out.push_str(subset);
        out.push(']');
    }
    out.push('>');
}

/// Returns `true` if the declared encoding label needs non-ASCII characters
/// written as references when serializing to a `String`.
fn needs_ascii(encoding: Option<&str>) -> bool {
    encoding.is_some_and(|label| {
        encoding_rs::Encoding::for_label(label.as_bytes())
            .map_or(true, |enc| enc.output_encoding() != encoding_rs::UTF_8)
    })
}

/// Serializes a document (or any subtree) to an XML string.
///
/// The XML declaration is written only if the document records a version.
/// Namespace declarations are ordinary attributes in the tree and come out
/// where they were recorded. Elements without children use the `<a/>`
/// form.
///
/// # Examples
///
/// ```
/// use xmlcursor::tree::{Document, NodeKind};
/// use xmlcursor::serial::serialize;
///
/// let mut doc = Document::new();
/// let root = doc.root();
/// let elem = doc.create_node(NodeKind::Element {
///     name: "root".to_string(),
///     prefix: None,
///     namespace: None,
///     attributes: vec![],
/// });
/// doc.append_child(root, elem);
/// assert_eq!(serialize(&doc), "<root/>");
/// ```
#[must_use]
pub fn serialize(doc: &Document) -> String {
    serialize_node(doc, doc.root())
}

/// Serializes one node and its descendants.
#[must_use]
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut output = String::new();
    let policy = CharPolicy {
        xml11: doc.version.as_deref() == Some("1.1"),
        ascii_only: needs_ascii(doc.encoding.as_deref()),
        lenient: true,
    };
    write_node(doc, id, &mut output, policy);
    output
}

fn write_node(doc: &Document, id: NodeId, out: &mut String, policy: CharPolicy) {
    // Lenient escaping never fails; the results are ignored for that reason.
    match &doc.node(id).kind {
        NodeKind::Document => {
            if let Some(version) = doc.version.as_deref() {
                write_declaration(out, version, doc.encoding.as_deref(), doc.standalone);
            }
            for child in doc.children(id) {
                write_node(doc, child, out, policy);
            }
        }
        NodeKind::DocumentFragment => {
            for child in doc.children(id) {
                write_node(doc, child, out, policy);
            }
        }
        NodeKind::Element {
            name,
            prefix,
            attributes,
            ..
        } => {
            out.push('<');
            if let Some(pfx) = prefix {
                out.push_str(pfx);
                out.push(':');
            }
            out.push_str(name);

            for attr in attributes {
                out.push(' ');
                if let Some(pfx) = &attr.prefix {
                    out.push_str(pfx);
                    out.push(':');
                }
                out.push_str(&attr.name);
                out.push_str("=\"");
                let _ = escape_attr(out, &attr.value, policy);
                out.push('"');
            }

            if doc.first_child(id).is_none() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in doc.children(id) {
                    write_node(doc, child, out, policy);
                }
                out.push_str("</");
                if let Some(pfx) = prefix {
                    out.push_str(pfx);
                    out.push(':');
                }
                out.push_str(name);
                out.push('>');
            }
        }
        NodeKind::Text { content } => {
            // Text outside the root element is whitespace and goes out as is.
            if doc.node(id).parent == Some(doc.root()) {
                out.push_str(content);
            } else {
                let _ = escape_text(out, content, policy);
            }
        }
        NodeKind::CData { content } => {
            out.push_str("<![CDATA[");
            out.push_str(content);
            out.push_str("]]>");
        }
        NodeKind::Comment { content } => {
            out.push_str("<!--");
            out.push_str(content);
            out.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if let Some(d) = data {
                out.push(' ');
                out.push_str(d);
            }
            out.push_str("?>");
        }
        NodeKind::EntityRef { name } => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
        NodeKind::DocumentType {
            name,
            system_id,
            public_id,
            internal_subset,
        } => write_doctype(
            out,
            name,
            system_id.as_deref(),
            public_id.as_deref(),
            internal_subset.as_deref(),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::Attribute;

    fn escaped_text(text: &str, policy: CharPolicy) -> io::Result<String> {
        let mut out = String::new();
        escape_text(&mut out, text, policy).map(|()| out)
    }

    #[test]
    fn test_escape_text() {
        let out = escaped_text("a < b & c > d\r\n", CharPolicy::default()).unwrap();
        assert_eq!(out, "a &lt; b &amp; c &gt; d&#13;\n");
    }

    #[test]
    fn test_escape_attr() {
        let mut out = String::new();
        escape_attr(&mut out, "say \"hi\"\tnow\n", CharPolicy::default()).unwrap();
        assert_eq!(out, "say &quot;hi&quot;&#9;now&#10;");
    }

    #[test]
    fn test_control_char_rejected_in_xml10() {
        let err = escaped_text("bell\u{7}", CharPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_control_char_referenced_in_xml11() {
        let policy = CharPolicy {
            xml11: true,
            ..CharPolicy::default()
        };
        assert_eq!(escaped_text("\u{7}\u{85}", policy).unwrap(), "&#x7;&#x85;");
        assert!(escaped_text("\u{0}", policy).is_err());
    }

    #[test]
    fn test_ascii_only() {
        let policy = CharPolicy {
            ascii_only: true,
            ..CharPolicy::default()
        };
        assert_eq!(escaped_text("café", policy).unwrap(), "caf&#xE9;");
    }

    #[test]
    fn test_terminators() {
        assert_eq!(find_cdata_terminator("a]]>b"), Some(1));
        assert_eq!(find_comment_terminator("a--b"), Some(1));
        assert_eq!(find_comment_terminator("ab-"), Some(2));
        assert_eq!(find_comment_terminator("a-b"), None);
        assert_eq!(find_pi_terminator("x?>"), Some(1));
    }

    #[test]
    fn test_cdata_segments() {
        assert_eq!(cdata_segments("plain"), vec!["plain"]);
        assert_eq!(cdata_segments("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(cdata_segments("]]>]]>"), vec!["]]", ">]]", ">"]);
    }

    #[test]
    fn test_fix_comment() {
        assert_eq!(fix_comment("fine"), "fine");
        assert_eq!(fix_comment("a--b"), "a- -b");
        assert_eq!(fix_comment("---"), "- - - ");
        assert_eq!(fix_comment("end-"), "end- ");
    }

    #[test]
    fn test_doctype_forms() {
        let mut out = String::new();
        write_doctype(&mut out, "html", Some("about:legacy-compat"), None, None);
        assert_eq!(out, "<!DOCTYPE html SYSTEM \"about:legacy-compat\">");

        out.clear();
        write_doctype(&mut out, "r", Some("r.dtd"), Some("-//X//EN"), Some("<!ELEMENT r ANY>"));
        assert_eq!(out, "<!DOCTYPE r PUBLIC \"-//X//EN\" \"r.dtd\" [<!ELEMENT r ANY>]>");
    }

    #[test]
    fn test_serialize_element_with_namespace_attributes() {
        let mut doc = Document::new();
        let root = doc.root();
        let elem = doc.create_node(NodeKind::Element {
            name: "item".to_string(),
            prefix: Some("p".to_string()),
            namespace: Some("urn:p".to_string()),
            attributes: vec![
                Attribute {
                    name: "p".to_string(),
                    value: "urn:p".to_string(),
                    prefix: Some("xmlns".to_string()),
                    namespace: Some(crate::namespace::XMLNS_NS_URI.to_string()),
                },
                Attribute {
                    name: "note".to_string(),
                    value: "a<b".to_string(),
                    prefix: None,
                    namespace: None,
                },
            ],
        });
        doc.append_child(root, elem);
        let text = doc.create_node(NodeKind::Text {
            content: "x & y".to_string(),
        });
        doc.append_child(elem, text);
        assert_eq!(
            serialize(&doc),
            "<p:item xmlns:p=\"urn:p\" note=\"a&lt;b\">x &amp; y</p:item>"
        );
    }

    #[test]
    fn test_serialize_declaration() {
        let mut doc = Document::new();
        doc.version = Some("1.0".to_string());
        doc.encoding = Some("UTF-8".to_string());
        doc.standalone = Some(true);
        assert_eq!(
            serialize(&doc),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"
        );
    }
}
