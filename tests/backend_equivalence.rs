//! The serial and tree backends must produce the same document for the
//! same calls, and fail in the same places.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use xmlcursor::serial::{serialize, serialize_node};
use xmlcursor::tree::NodeKind;
use xmlcursor::writer::Backend;
use xmlcursor::{Attribute, Document, Result, WriteError, WriterOptions, XmlWriter};

fn via_serial(
    options: WriterOptions,
    script: impl Fn(&mut dyn Script) -> Vec<String>,
) -> (String, Vec<String>) {
    let mut w = XmlWriter::to_writer(Vec::new(), options);
    let outcomes = script(&mut w);
    w.close().unwrap();
    (String::from_utf8(w.into_inner()).unwrap(), outcomes)
}

fn via_tree(
    options: WriterOptions,
    script: impl Fn(&mut dyn Script) -> Vec<String>,
) -> (String, Vec<String>) {
    let mut doc = Document::new();
    let outcomes = {
        let mut w = XmlWriter::to_tree(&mut doc, options);
        let outcomes = script(&mut w);
        w.close().unwrap();
        outcomes
    };
    (serialize(&doc), outcomes)
}

fn assert_same(options: WriterOptions, script: impl Fn(&mut dyn Script) -> Vec<String>) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    let serial = via_serial(options.clone(), &script);
    let tree = via_tree(options, &script);
    assert_eq!(serial, tree);
    serial.0
}

/// Object-safe view of the writer calls the scripts use, so one script
/// drives both backends.
trait Script {
    fn call(&mut self, op: Op<'_>) -> Result<()>;
}

enum Op<'a> {
    Declaration(Option<&'a str>),
    Prefix(&'a str, &'a str),
    Start(&'a str, &'a str),
    Empty(&'a str, &'a str),
    End,
    Attr(&'a str, &'a str, &'a str),
    Text(&'a str),
    Space(&'a str),
    CData(&'a str),
    Comment(&'a str),
    Pi(&'a str, Option<&'a str>),
    Entity(&'a str),
    Doctype(&'a str, &'a str),
    Float(f64),
    Ints(&'a [i64]),
}

impl<B: Backend> Script for XmlWriter<B> {
    fn call(&mut self, op: Op<'_>) -> Result<()> {
        match op {
            Op::Declaration(encoding) => self.start_document(None, encoding, None),
            Op::Prefix(prefix, uri) => self.set_prefix(prefix, uri),
            Op::Start(uri, local) => self.start_element_ns(uri, local),
            Op::Empty(uri, local) => self.empty_element_ns(uri, local),
            Op::End => self.end_element(),
            Op::Attr(uri, local, value) => self.write_attribute_ns(uri, local, value),
            Op::Text(text) => self.write_characters(text),
            Op::Space(text) => self.write_space(text),
            Op::CData(text) => self.write_cdata(text),
            Op::Comment(text) => self.write_comment(text),
            Op::Pi(target, data) => self.write_processing_instruction(target, data),
            Op::Entity(name) => self.write_entity_ref(name),
            Op::Doctype(root, system) => self.write_doctype(root, Some(system), None, None),
            Op::Float(value) => self.write_typed(&value),
            Op::Ints(values) => self.write_typed_array(values, false),
        }
    }
}

fn outcome(result: Result<()>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(WriteError::Structure { .. }) => "structure".to_string(),
        Err(WriteError::NamespaceConstraint { .. }) => "namespace".to_string(),
        Err(WriteError::Validation { .. }) => "validation".to_string(),
        Err(WriteError::Io(e)) => format!("io:{:?}", e.kind()),
        Err(WriteError::UnsupportedOperation { operation, .. }) => format!("unsupported:{operation}"),
    }
}

fn run(w: &mut dyn Script, ops: Vec<Op<'_>>) -> Vec<String> {
    ops.into_iter().map(|op| outcome(w.call(op))).collect()
}

#[test]
fn full_document_matches() {
    let xml = assert_same(WriterOptions::default().repairing(true), |w| {
        run(
            w,
            vec![
                Op::Declaration(Some("UTF-8")),
                Op::Comment(" generated "),
                Op::Space("\n"),
                Op::Doctype("c:catalog", "catalog.dtd"),
                Op::Prefix("c", "urn:catalog"),
                Op::Start("urn:catalog", "catalog"),
                Op::Attr("", "version", "2"),
                Op::Start("urn:catalog", "book"),
                Op::Attr("urn:meta", "id", "b<1> & \"2\""),
                Op::Text("Tom & Jerry <3"),
                Op::CData("raw <data>"),
                Op::End,
                Op::Empty("", "plain"),
                Op::Pi("render", Some("fast")),
                Op::Entity("copy"),
                Op::Float(3.5),
                Op::Start("urn:catalog", "sizes"),
                Op::Ints(&[1, -2, 30]),
                Op::End,
                Op::End,
                Op::Space("\n"),
            ],
        )
    });
    assert!(xml.starts_with(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><!-- generated -->\n\
         <!DOCTYPE c:catalog SYSTEM \"catalog.dtd\">\
         <c:catalog xmlns:c=\"urn:catalog\" version=\"2\">\
         <c:book xmlns:ns1=\"urn:meta\" ns1:id="
    ));
    assert!(xml.contains("Tom &amp; Jerry &lt;3<![CDATA[raw <data>]]></c:book>"));
    assert!(xml.ends_with(
        "<plain/><?render fast?>&copy;3.5<c:sizes>1 -2 30</c:sizes></c:catalog>\n"
    ));
}

#[test]
fn failures_match() {
    assert_same(WriterOptions::default(), |w| {
        let outcomes = run(
            w,
            vec![
                Op::Text("not allowed here"),
                Op::Start("urn:unbound", "root"),
                Op::Start("", "root"),
                Op::Text("bad \u{1} char"),
                Op::CData("a]]>b"),
                Op::Comment("a--b"),
                Op::Pi("xml", None),
                Op::Pi("target", Some("a?>b")),
                Op::Attr("", "late", "1"),
                Op::Text("fine"),
                Op::End,
                Op::End,
                Op::Start("", "second"),
            ],
        );
        assert_eq!(
            outcomes,
            vec![
                "structure",
                "namespace",
                "ok",
                "io:InvalidData",
                "structure",
                "structure",
                "structure",
                "structure",
                "structure",
                "ok",
                "ok",
                "structure",
                "structure",
            ]
        );
        outcomes
    });
}

#[test]
fn fixed_content_matches() {
    let xml = assert_same(WriterOptions::default().fix_content(true), |w| {
        run(
            w,
            vec![
                Op::Start("", "r"),
                Op::CData("x]]>y"),
                Op::Comment("a--b-"),
                Op::End,
            ],
        )
    });
    assert_eq!(
        xml,
        "<r><![CDATA[x]]]]><![CDATA[>y]]><!--a- -b- --></r>"
    );
}

#[test]
fn tree_rejects_raw_output() {
    let mut doc = Document::new();
    let mut w = XmlWriter::to_tree(&mut doc, WriterOptions::default());
    assert!(matches!(
        w.write_raw("<x/>"),
        Err(WriteError::UnsupportedOperation { operation: "write_raw", .. })
    ));
    assert!(matches!(
        w.write_dtd("<!DOCTYPE x>"),
        Err(WriteError::UnsupportedOperation { operation: "write_dtd", .. })
    ));
    w.empty_element("x").unwrap();
    w.close().unwrap();
    drop(w);
    assert_eq!(serialize(&doc), "<x/>");
}

#[test]
fn tree_writes_into_existing_element() {
    let mut doc = Document::new();
    let root = doc.create_element("root", Some("a"), Some("urn:a"));
    doc.append_child(doc.root(), root);
    doc.push_attribute(root, Attribute::namespace_declaration("a", "urn:a"));

    let mut w = XmlWriter::to_tree_node(&mut doc, root, WriterOptions::default()).unwrap();
    assert_eq!(w.namespace_uri("a"), Some("urn:a"));
    assert_eq!(w.current_element_name().as_deref(), Some("a:root"));
    w.empty_element_ns("urn:a", "child").unwrap();
    w.write_characters("tail").unwrap();
    assert_eq!(w.depth(), 0);
    assert!(matches!(w.end_element(), Err(WriteError::Structure { .. })));
    w.close().unwrap();
    drop(w);

    assert_eq!(
        serialize(&doc),
        "<a:root xmlns:a=\"urn:a\"><a:child/>tail</a:root>"
    );
}

#[test]
fn tree_fragment_accepts_several_top_level_elements() {
    let mut doc = Document::new();
    let fragment = doc.create_fragment();
    let mut w = XmlWriter::to_tree_node(&mut doc, fragment, WriterOptions::default()).unwrap();
    w.empty_element("a").unwrap();
    w.write_characters("between").unwrap();
    w.start_element("b").unwrap();
    w.write_characters("inside").unwrap();
    w.close().unwrap();
    drop(w);
    assert_eq!(serialize_node(&doc, fragment), "<a/>between<b>inside</b>");
}

#[test]
fn tree_rejects_text_node_target() {
    let mut doc = Document::new();
    let text = doc.create_node(NodeKind::Text {
        content: "x".to_string(),
    });
    let result = XmlWriter::to_tree_node(&mut doc, text, WriterOptions::default());
    assert!(matches!(result, Err(WriteError::Structure { .. })));
}

#[test]
fn tree_records_declaration() {
    let mut doc = Document::new();
    {
        let mut w = XmlWriter::to_tree(&mut doc, WriterOptions::default());
        w.start_document(Some("1.1"), Some("UTF-8"), Some(false)).unwrap();
        w.empty_element("r").unwrap();
        w.close().unwrap();
    }
    assert_eq!(doc.version.as_deref(), Some("1.1"));
    assert_eq!(doc.standalone, Some(false));
    assert_eq!(
        serialize(&doc),
        "<?xml version=\"1.1\" encoding=\"UTF-8\" standalone=\"no\"?><r/>"
    );
}
