//! Property tests: whatever text goes in comes back out of a conforming
//! parser unchanged, both backends agree on it, typed values survive their
//! lexical form, and the writer's depth tracks its open elements.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use xmlcursor::serial::serialize;
use xmlcursor::typed::{BigDecimal, BigInteger};
use xmlcursor::{Document, TypedValue, WriterOptions, XmlWriter};

/// Characters XML 1.0 allows in content.
const XML_CHARS: &str = "[\t\n\r\u{20}-\u{D7FF}\u{E000}-\u{FFFD}\u{10000}-\u{10FFFF}]{0,48}";

const URIS: [&str; 4] = ["", "urn:a", "urn:b", "http://example.com/c"];

fn write_serial(text: &str, attr: &str) -> String {
    let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
    w.start_element("r").unwrap();
    w.write_attribute("a", attr).unwrap();
    w.write_characters(text).unwrap();
    w.close().unwrap();
    String::from_utf8(w.into_inner()).unwrap()
}

/// Parses `xml` and returns the value of the root's `a` attribute and the
/// concatenated text content.
fn parse_back(xml: &str) -> (String, String) {
    let mut reader = NsReader::from_str(xml);
    let mut attr = String::new();
    let mut text = String::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) => {
                for a in e.attributes() {
                    let a = a.unwrap();
                    if a.key.as_ref() == b"a" {
                        attr = a.unescape_value().unwrap().into_owned();
                    }
                }
            }
            Event::Text(t) => text.push_str(&t.unescape().unwrap()),
            Event::Eof => break,
            _ => {}
        }
    }
    (attr, text)
}

fn resolved(result: ResolveResult<'_>) -> String {
    match result {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(p) => panic!("unbound prefix {}", String::from_utf8_lossy(&p)),
    }
}

/// Expanded names of every element start, in document order.
fn element_names(xml: &str) -> Vec<(String, String)> {
    let mut reader = NsReader::from_str(xml);
    let mut names = Vec::new();
    loop {
        let (ns, event) = reader.read_resolved_event().unwrap();
        match event {
            Event::Start(e) | Event::Empty(e) => names.push((
                resolved(ns),
                String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            )),
            Event::Eof => break,
            _ => {}
        }
    }
    names
}

proptest! {
    #[test]
    fn text_and_attribute_values_survive_reparsing(
        text in XML_CHARS,
        attr in XML_CHARS,
    ) {
        let xml = write_serial(&text, &attr);
        let (attr_back, text_back) = parse_back(&xml);
        prop_assert_eq!(attr_back, attr);
        prop_assert_eq!(text_back, text);
    }

    #[test]
    fn tree_backend_serializes_like_serial_backend(
        text in XML_CHARS,
        attr in XML_CHARS,
        comment in "[a-z ]{0,12}",
    ) {
        let serial = {
            let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
            w.start_element("r").unwrap();
            w.write_attribute("a", &attr).unwrap();
            w.write_comment(&comment).unwrap();
            w.write_characters(&text).unwrap();
            w.close().unwrap();
            String::from_utf8(w.into_inner()).unwrap()
        };
        let mut doc = Document::new();
        {
            let mut w = XmlWriter::to_tree(&mut doc, WriterOptions::default());
            w.start_element("r").unwrap();
            w.write_attribute("a", &attr).unwrap();
            w.write_comment(&comment).unwrap();
            w.write_characters(&text).unwrap();
            w.close().unwrap();
        }
        prop_assert_eq!(serialize(&doc), serial);
    }

    #[test]
    fn repaired_namespaces_resolve_to_requested_uris(
        path in prop::collection::vec((0..URIS.len(), "[a-w][a-z0-9]{0,6}"), 1..8),
    ) {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default().repairing(true));
        for (uri, local) in &path {
            w.start_element_ns(URIS[*uri], local).unwrap();
        }
        w.close().unwrap();
        let xml = String::from_utf8(w.into_inner()).unwrap();

        let expected: Vec<(String, String)> = path
            .iter()
            .map(|(uri, local)| (URIS[*uri].to_string(), local.clone()))
            .collect();
        prop_assert_eq!(element_names(&xml), expected);
    }
}

/// Finite floats of every magnitude, both signs, subnormals and zeros.
fn finite_f64() -> impl Strategy<Value = f64> {
    use prop::num::f64::{NEGATIVE, NORMAL, POSITIVE, SUBNORMAL, ZERO};
    POSITIVE | NEGATIVE | NORMAL | SUBNORMAL | ZERO
}

fn finite_f32() -> impl Strategy<Value = f32> {
    use prop::num::f32::{NEGATIVE, NORMAL, POSITIVE, SUBNORMAL, ZERO};
    POSITIVE | NEGATIVE | NORMAL | SUBNORMAL | ZERO
}

/// A decimal literal as a value scaled by 10^15, for comparing two
/// literals numerically.
fn scaled(literal: &str) -> i128 {
    let (negative, unsigned) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    };
    let (integral, fractional) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits = format!("0{integral}{fractional:0<15}");
    let value: i128 = digits.parse().unwrap();
    if negative {
        -value
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Start,
    Empty,
    End,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Start), Just(Step::Empty), Just(Step::End)]
}

proptest! {
    #[test]
    fn integers_survive_lexical_form(n in any::<i64>(), m in any::<i32>()) {
        prop_assert_eq!(n.to_lexical().parse::<i64>().unwrap(), n);
        prop_assert_eq!(m.to_lexical().parse::<i32>().unwrap(), m);
    }

    #[test]
    fn booleans_survive_lexical_form(b in any::<bool>()) {
        prop_assert_eq!(b.to_lexical().parse::<bool>().unwrap(), b);
    }

    #[test]
    fn doubles_survive_lexical_form(x in finite_f64()) {
        let back: f64 = x.to_lexical().parse().unwrap();
        prop_assert_eq!(back.to_bits(), x.to_bits());
    }

    #[test]
    fn floats_survive_lexical_form(x in finite_f32()) {
        let back: f32 = x.to_lexical().parse().unwrap();
        prop_assert_eq!(back.to_bits(), x.to_bits());
    }

    #[test]
    fn big_integers_are_canonical(literal in "[+-]?[0-9]{1,30}") {
        let n: BigInteger = literal.parse().unwrap();
        let expected = literal.parse::<i128>().unwrap().to_string();
        prop_assert_eq!(n.to_lexical(), expected);
    }

    #[test]
    fn big_decimals_keep_their_value(literal in "[+-]?[0-9]{1,15}(\\.[0-9]{0,15})?") {
        let d: BigDecimal = literal.parse().unwrap();
        let lexical = d.to_lexical();
        prop_assert_eq!(scaled(&lexical), scaled(&literal));
        prop_assert_eq!(lexical.parse::<BigDecimal>().unwrap().to_lexical(), lexical.clone());
        prop_assert!(!lexical.ends_with('.'));
        if lexical.contains('.') {
            prop_assert!(!lexical.ends_with('0'));
        }
    }

    #[test]
    fn depth_counts_unmatched_start_elements(steps in prop::collection::vec(step(), 0..40)) {
        let mut w = XmlWriter::to_writer(Vec::new(), WriterOptions::default());
        w.start_element("root").unwrap();
        let mut open = 1;
        for step in steps {
            match step {
                Step::Start => {
                    w.start_element("e").unwrap();
                    open += 1;
                }
                Step::Empty => w.empty_element("e").unwrap(),
                Step::End if open > 1 => {
                    w.end_element().unwrap();
                    open -= 1;
                }
                Step::End => {}
            }
            prop_assert_eq!(w.depth(), open);
        }
        w.end_document().unwrap();
        prop_assert_eq!(w.depth(), 0);
    }
}
