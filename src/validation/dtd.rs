//! DTD subset model and a streaming DTD validator.
//!
//! A [`DtdSubset`] holds the element, attribute-list and general entity
//! declarations of one DTD subset. [`DtdSubset::parse`] reads the text of an
//! internal subset (what goes between `[` and `]` in a DOCTYPE), and
//! [`DtdSubset::combine_with_external`] merges an internal subset with an
//! external one into a new immutable subset. Declaration maps are shared
//! through [`Arc`], so a merge with an empty side copies nothing.
//!
//! [`DtdValidator`] checks writer output against a subset as it is produced:
//!
//! - `EMPTY` elements accept no content, element-only models accept
//!   whitespace, `(#PCDATA)` accepts validatable text, mixed and `ANY` accept
//!   anything;
//! - child element sequences are matched against the declared content model
//!   when the element ends;
//! - required, fixed, enumerated, `ID` and `IDREF` attributes are checked;
//! - undeclared elements and references to undeclared entities are errors.
//!
//! DTDs predate namespaces, so declarations are matched against qualified
//! names (`prefix:local`) as written.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::namespace::ExpandedName;
use crate::util::qname::{is_name, is_name_char, is_name_start_char};

use super::{ContentClass, ProblemReport, Validator};

// ---------------------------------------------------------------------------
// DTD Data Model
// ---------------------------------------------------------------------------

/// An element declaration from `<!ELEMENT name content-model>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    /// The element name.
    pub name: String,
    /// The declared content model.
    pub content_model: ContentModel,
}

/// The content model for an element declaration.
///
/// See XML 1.0 section 3.2:
/// `contentspec ::= 'EMPTY' | 'ANY' | Mixed | children`
#[derive(Debug, Clone, PartialEq)]
pub enum ContentModel {
    /// No children at all (`EMPTY`).
    Empty,
    /// Any content (`ANY`).
    Any,
    /// Text and the listed elements in any order. An empty list is
    /// `(#PCDATA)`.
    Mixed(Vec<String>),
    /// Element-only content following a content spec pattern.
    Children(ContentSpec),
}

impl ContentModel {
    /// The character content this model allows inside the element.
    #[must_use]
    pub fn content_class(&self) -> ContentClass {
        match self {
            Self::Empty => ContentClass::None,
            Self::Children(_) => ContentClass::WhitespaceOnly,
            Self::Mixed(names) if names.is_empty() => ContentClass::ValidatableText,
            Self::Mixed(_) | Self::Any => ContentClass::AnyText,
        }
    }
}

/// A content specification particle for element-only content models.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSpec {
    /// The particle kind.
    pub kind: ContentSpecKind,
    /// How many times the particle may occur.
    pub occurrence: Occurrence,
}

/// The kind of a content specification particle.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSpecKind {
    /// A single named element, e.g. `a`.
    Name(String),
    /// A sequence, e.g. `(a, b, c)`.
    Seq(Vec<ContentSpec>),
    /// A choice, e.g. `(a | b | c)`.
    Choice(Vec<ContentSpec>),
}

/// Occurrence indicator for a content particle: none, `?`, `*` or `+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// Exactly once.
    Once,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

/// An attribute declaration from `<!ATTLIST element-name attr-name type default>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    /// The element this attribute belongs to.
    pub element_name: String,
    /// The attribute name.
    pub attribute_name: String,
    /// The attribute type.
    pub attribute_type: AttributeType,
    /// The default value specification.
    pub default: AttributeDefault,
}

/// The type of an attribute as declared in `<!ATTLIST>`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    /// `CDATA`
    CData,
    /// `ID`
    Id,
    /// `IDREF`
    IdRef,
    /// `IDREFS`
    IdRefs,
    /// `ENTITY`
    Entity,
    /// `ENTITIES`
    Entities,
    /// `NMTOKEN`
    NmToken,
    /// `NMTOKENS`
    NmTokens,
    /// `NOTATION (a|b|c)`
    Notation(Vec<String>),
    /// `(a|b|c)`
    Enumeration(Vec<String>),
}

/// The default value specification for an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeDefault {
    /// `#REQUIRED`
    Required,
    /// `#IMPLIED`
    Implied,
    /// `#FIXED "value"`
    Fixed(String),
    /// `"value"`
    Default(String),
}

/// A general entity declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    /// The entity name.
    pub name: String,
    /// Internal value or external identifier.
    pub kind: EntityKind,
}

/// Whether an entity has a literal value or refers to an external resource.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// Internal entity with literal replacement text.
    Internal(String),
    /// External entity.
    External {
        /// The SYSTEM identifier.
        system_id: String,
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
    },
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "EMPTY"),
            Self::Any => write!(f, "ANY"),
            Self::Mixed(names) if names.is_empty() => write!(f, "(#PCDATA)"),
            Self::Mixed(names) => write!(f, "(#PCDATA|{})*", names.join("|")),
            Self::Children(spec) => write!(f, "{spec}"),
        }
    }
}

impl fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (items, sep) = match &self.kind {
            ContentSpecKind::Name(name) => {
                write!(f, "{name}")?;
                (None, "")
            }
            ContentSpecKind::Seq(items) => (Some(items), ","),
            ContentSpecKind::Choice(items) => (Some(items), "|"),
        };
        if let Some(items) = items {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, "{sep}")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, ")")?;
        }
        match self.occurrence {
            Occurrence::Once => Ok(()),
            Occurrence::Optional => write!(f, "?"),
            Occurrence::ZeroOrMore => write!(f, "*"),
            Occurrence::OneOrMore => write!(f, "+"),
        }
    }
}

/// Errors from building or combining DTD subsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DtdError {
    /// The subset text is malformed.
    #[error("{line}:{column}: {message}")]
    Syntax {
        /// Description of the problem.
        message: String,
        /// 1-based line.
        line: u32,
        /// 1-based column.
        column: u32,
    },
    /// The same element is declared by both the internal and the external
    /// subset.
    #[error("element '{0}' is declared in both the internal and the external subset")]
    ConflictingElement(String),
}

/// The declarations of one DTD subset.
///
/// Cloning is cheap: the declaration maps are reference counted and never
/// mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct DtdSubset {
    elements: Arc<HashMap<String, ElementDecl>>,
    attributes: Arc<HashMap<String, Vec<AttributeDecl>>>,
    entities: Arc<HashMap<String, EntityDecl>>,
}

impl DtdSubset {
    /// Builds a subset from already-parsed declarations.
    #[must_use]
    pub fn from_declarations(
        elements: impl IntoIterator<Item = ElementDecl>,
        attributes: impl IntoIterator<Item = AttributeDecl>,
        entities: impl IntoIterator<Item = EntityDecl>,
    ) -> Self {
        let mut attr_map: HashMap<String, Vec<AttributeDecl>> = HashMap::new();
        for decl in attributes {
            attr_map
                .entry(decl.element_name.clone())
                .or_default()
                .push(decl);
        }
        let mut entity_map = HashMap::new();
        for decl in entities {
            entity_map.entry(decl.name.clone()).or_insert(decl);
        }
        Self {
            elements: Arc::new(
                elements
                    .into_iter()
                    .map(|decl| (decl.name.clone(), decl))
                    .collect(),
            ),
            attributes: Arc::new(attr_map),
            entities: Arc::new(entity_map),
        }
    }

    /// Parses the text of a DTD subset.
    ///
    /// Comments, processing instructions, notation declarations and
    /// parameter entity references are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DtdError::Syntax`] if the text is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlcursor::validation::dtd::DtdSubset;
    ///
    /// let subset = DtdSubset::parse("<!ELEMENT root (#PCDATA)>").unwrap();
    /// assert!(subset.element("root").is_some());
    /// ```
    pub fn parse(input: &str) -> Result<Self, DtdError> {
        DtdParser::new(input).parse()
    }

    /// Looks up an element declaration.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    /// The attribute declarations for an element.
    #[must_use]
    pub fn attributes(&self, element: &str) -> &[AttributeDecl] {
        self.attributes.get(element).map_or(&[], Vec::as_slice)
    }

    /// Looks up a general entity declaration.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    /// Returns `true` if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.attributes.is_empty() && self.entities.is_empty()
    }

    /// Combines this (internal) subset with an external subset.
    ///
    /// Neither input changes. An element declared by both subsets is an
    /// error; for entities and attribute defaults the internal declaration
    /// wins. Maps that one side leaves empty are shared, not copied.
    ///
    /// # Errors
    ///
    /// Returns [`DtdError::ConflictingElement`] for the first element
    /// declared on both sides.
    pub fn combine_with_external(&self, external: &Self) -> Result<Self, DtdError> {
        let elements = if self.elements.is_empty() {
            Arc::clone(&external.elements)
        } else if external.elements.is_empty() {
            Arc::clone(&self.elements)
        } else {
            if let Some(name) = self
                .elements
                .keys()
                .find(|name| external.elements.contains_key(*name))
            {
                return Err(DtdError::ConflictingElement(name.clone()));
            }
            let mut merged = (*external.elements).clone();
            merged.extend(
                self.elements
                    .iter()
                    .map(|(name, decl)| (name.clone(), decl.clone())),
            );
            Arc::new(merged)
        };

        let entities = if self.entities.is_empty() {
            Arc::clone(&external.entities)
        } else if external.entities.is_empty() {
            Arc::clone(&self.entities)
        } else {
            let mut merged = (*external.entities).clone();
            merged.extend(
                self.entities
                    .iter()
                    .map(|(name, decl)| (name.clone(), decl.clone())),
            );
            Arc::new(merged)
        };

        // The first declaration of an attribute binds, so internal
        // declarations go first.
        let attributes = if self.attributes.is_empty() {
            Arc::clone(&external.attributes)
        } else if external.attributes.is_empty() {
            Arc::clone(&self.attributes)
        } else {
            let mut merged = (*self.attributes).clone();
            for (element, decls) in external.attributes.iter() {
                merged
                    .entry(element.clone())
                    .or_default()
                    .extend(decls.iter().cloned());
            }
            Arc::new(merged)
        };

        Ok(Self {
            elements,
            attributes,
            entities,
        })
    }

    /// Returns `true` if both subsets share the same element map.
    #[must_use]
    pub fn shares_elements_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.elements, &other.elements)
    }

    /// Returns `true` if both subsets share the same entity map.
    #[must_use]
    pub fn shares_entities_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entities, &other.entities)
    }
}

// ---------------------------------------------------------------------------
// DTD Parser
// ---------------------------------------------------------------------------

struct DtdParser<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    elements: Vec<ElementDecl>,
    attributes: Vec<AttributeDecl>,
    entities: Vec<EntityDecl>,
}

impl<'a> DtdParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            elements: Vec::new(),
            attributes: Vec::new(),
            entities: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<DtdSubset, DtdError> {
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }

            if self.looking_at(b"<!--") {
                self.skip_until(b"-->")?;
            } else if self.looking_at(b"<!ELEMENT") {
                self.parse_element_decl()?;
            } else if self.looking_at(b"<!ATTLIST") {
                self.parse_attlist_decl()?;
            } else if self.looking_at(b"<!ENTITY") {
                self.parse_entity_decl()?;
            } else if self.looking_at(b"<!NOTATION") {
                self.skip_until(b">")?;
            } else if self.looking_at(b"<?") {
                self.skip_until(b"?>")?;
            } else if self.peek() == Some(b'%') {
                // Parameter entity references are not expanded.
                self.advance(1);
                self.parse_name()?;
                self.expect_byte(b';')?;
            } else {
                return Err(self.fatal(format!(
                    "unexpected character '{}' in DTD",
                    self.peek().map_or('?', char::from)
                )));
            }
        }

        if let Some(dup) = self.duplicate_element() {
            return Err(self.fatal(format!("element '{dup}' is declared more than once")));
        }

        Ok(DtdSubset::from_declarations(
            self.elements,
            self.attributes,
            self.entities,
        ))
    }

    fn duplicate_element(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.elements
            .iter()
            .map(|decl| decl.name.as_str())
            .find(|name| !seen.insert(*name))
    }

    // --- ELEMENT declaration (XML 1.0 §3.2) ---

    fn parse_element_decl(&mut self) -> Result<(), DtdError> {
        self.expect_str(b"<!ELEMENT")?;
        self.skip_whitespace_required()?;
        let name = self.parse_name()?;
        self.skip_whitespace_required()?;
        let content_model = self.parse_content_model()?;
        self.skip_whitespace();
        self.expect_byte(b'>')?;
        self.elements.push(ElementDecl {
            name,
            content_model,
        });
        Ok(())
    }

    fn parse_content_model(&mut self) -> Result<ContentModel, DtdError> {
        if self.looking_at(b"EMPTY") {
            self.advance(5);
            return Ok(ContentModel::Empty);
        }
        if self.looking_at(b"ANY") {
            self.advance(3);
            return Ok(ContentModel::Any);
        }

        self.expect_byte(b'(')?;
        self.skip_whitespace();

        if self.looking_at(b"#PCDATA") {
            self.advance(7);
            self.skip_whitespace();
            let mut names = Vec::new();

            if self.peek() == Some(b')') {
                self.advance(1);
                if self.peek() == Some(b'*') {
                    self.advance(1);
                }
                return Ok(ContentModel::Mixed(names));
            }

            while self.peek() == Some(b'|') {
                self.advance(1);
                self.skip_whitespace();
                names.push(self.parse_name()?);
                self.skip_whitespace();
            }
            self.expect_byte(b')')?;
            self.expect_byte(b'*')?;
            return Ok(ContentModel::Mixed(names));
        }

        Ok(ContentModel::Children(self.parse_content_spec_group()?))
    }

    /// Parses a group whose opening `(` has been consumed.
    fn parse_content_spec_group(&mut self) -> Result<ContentSpec, DtdError> {
        let first = self.parse_content_particle()?;
        self.skip_whitespace();

        let separator = match self.peek() {
            Some(sep @ (b',' | b'|')) => sep,
            _ => {
                self.expect_byte(b')')?;
                let occurrence = self.parse_occurrence();
                if occurrence == Occurrence::Once {
                    return Ok(first);
                }
                return Ok(ContentSpec {
                    kind: ContentSpecKind::Seq(vec![first]),
                    occurrence,
                });
            }
        };

        let mut items = vec![first];
        while self.peek() == Some(separator) {
            self.advance(1);
            self.skip_whitespace();
            items.push(self.parse_content_particle()?);
            self.skip_whitespace();
        }
        self.expect_byte(b')')?;
        let occurrence = self.parse_occurrence();
        let kind = if separator == b',' {
            ContentSpecKind::Seq(items)
        } else {
            ContentSpecKind::Choice(items)
        };
        Ok(ContentSpec { kind, occurrence })
    }

    fn parse_content_particle(&mut self) -> Result<ContentSpec, DtdError> {
        if self.peek() == Some(b'(') {
            self.advance(1);
            self.skip_whitespace();
            self.parse_content_spec_group()
        } else {
            let name = self.parse_name()?;
            let occurrence = self.parse_occurrence();
            Ok(ContentSpec {
                kind: ContentSpecKind::Name(name),
                occurrence,
            })
        }
    }

    fn parse_occurrence(&mut self) -> Occurrence {
        let occurrence = match self.peek() {
            Some(b'?') => Occurrence::Optional,
            Some(b'*') => Occurrence::ZeroOrMore,
            Some(b'+') => Occurrence::OneOrMore,
            _ => return Occurrence::Once,
        };
        self.advance(1);
        occurrence
    }

    // --- ATTLIST declaration (XML 1.0 §3.3) ---

    fn parse_attlist_decl(&mut self) -> Result<(), DtdError> {
        self.expect_str(b"<!ATTLIST")?;
        self.skip_whitespace_required()?;
        let element_name = self.parse_name()?;

        loop {
            self.skip_whitespace();
            if self.peek() == Some(b'>') {
                self.advance(1);
                return Ok(());
            }
            let attribute_name = self.parse_name()?;
            self.skip_whitespace_required()?;
            let attribute_type = self.parse_attribute_type()?;
            self.skip_whitespace_required()?;
            let default = self.parse_attribute_default()?;
            self.attributes.push(AttributeDecl {
                element_name: element_name.clone(),
                attribute_name,
                attribute_type,
                default,
            });
        }
    }

    fn parse_attribute_type(&mut self) -> Result<AttributeType, DtdError> {
        // Longer keywords first: IDREFS before IDREF before ID.
        const KEYWORDS: [(&[u8], AttributeType); 8] = [
            (b"CDATA", AttributeType::CData),
            (b"IDREFS", AttributeType::IdRefs),
            (b"IDREF", AttributeType::IdRef),
            (b"ID", AttributeType::Id),
            (b"ENTITIES", AttributeType::Entities),
            (b"ENTITY", AttributeType::Entity),
            (b"NMTOKENS", AttributeType::NmTokens),
            (b"NMTOKEN", AttributeType::NmToken),
        ];
        for (keyword, attribute_type) in KEYWORDS {
            if self.looking_at(keyword) {
                self.advance(keyword.len());
                return Ok(attribute_type);
            }
        }
        if self.looking_at(b"NOTATION") {
            self.advance(8);
            self.skip_whitespace_required()?;
            return Ok(AttributeType::Notation(self.parse_enumerated_values()?));
        }
        if self.peek() == Some(b'(') {
            return Ok(AttributeType::Enumeration(self.parse_enumerated_values()?));
        }
        Err(self.fatal("expected attribute type"))
    }

    fn parse_enumerated_values(&mut self) -> Result<Vec<String>, DtdError> {
        self.expect_byte(b'(')?;
        self.skip_whitespace();
        let mut values = vec![self.parse_nmtoken()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b')') {
                self.advance(1);
                return Ok(values);
            }
            self.expect_byte(b'|')?;
            self.skip_whitespace();
            values.push(self.parse_nmtoken()?);
        }
    }

    fn parse_attribute_default(&mut self) -> Result<AttributeDefault, DtdError> {
        if self.looking_at(b"#REQUIRED") {
            self.advance(9);
            Ok(AttributeDefault::Required)
        } else if self.looking_at(b"#IMPLIED") {
            self.advance(8);
            Ok(AttributeDefault::Implied)
        } else if self.looking_at(b"#FIXED") {
            self.advance(6);
            self.skip_whitespace_required()?;
            Ok(AttributeDefault::Fixed(self.parse_quoted_value()?))
        } else {
            Ok(AttributeDefault::Default(self.parse_quoted_value()?))
        }
    }

    // --- ENTITY declaration (XML 1.0 §4.2) ---

    fn parse_entity_decl(&mut self) -> Result<(), DtdError> {
        self.expect_str(b"<!ENTITY")?;
        self.skip_whitespace_required()?;

        let parameter = self.peek() == Some(b'%');
        if parameter {
            self.advance(1);
            self.skip_whitespace_required()?;
        }

        let name = self.parse_name()?;
        if name.contains(':') {
            return Err(self.fatal(format!("entity name '{name}' must not contain a colon")));
        }
        self.skip_whitespace_required()?;

        let kind = if matches!(self.peek(), Some(b'"' | b'\'')) {
            EntityKind::Internal(self.parse_quoted_value()?)
        } else if self.looking_at(b"SYSTEM") {
            self.advance(6);
            self.skip_whitespace_required()?;
            EntityKind::External {
                system_id: self.parse_quoted_value()?,
                public_id: None,
            }
        } else if self.looking_at(b"PUBLIC") {
            self.advance(6);
            self.skip_whitespace_required()?;
            let public_id = self.parse_quoted_value()?;
            self.skip_whitespace_required()?;
            EntityKind::External {
                system_id: self.parse_quoted_value()?,
                public_id: Some(public_id),
            }
        } else {
            return Err(self.fatal("expected entity value or external ID"));
        };

        let had_ws = self.skip_whitespace();
        if self.looking_at(b"NDATA") {
            if parameter || matches!(kind, EntityKind::Internal(_)) {
                return Err(self.fatal("NDATA annotation is only allowed on external general entities"));
            }
            if !had_ws {
                return Err(self.fatal("whitespace required before NDATA"));
            }
            self.advance(5);
            self.skip_whitespace_required()?;
            self.parse_name()?;
            self.skip_whitespace();
        }
        self.expect_byte(b'>')?;

        // Parameter entities only matter inside the DTD itself.
        if !parameter {
            self.entities.push(EntityDecl { name, kind });
        }
        Ok(())
    }

    // --- Low-level input helpers ---

    fn skip_until(&mut self, terminator: &[u8]) -> Result<(), DtdError> {
        while !self.at_end() {
            if self.looking_at(terminator) {
                self.advance(terminator.len());
                return Ok(());
            }
            self.advance(1);
        }
        Err(self.fatal(format!(
            "unexpected end of input, expected '{}'",
            String::from_utf8_lossy(terminator)
        )))
    }

    fn parse_name(&mut self) -> Result<String, DtdError> {
        self.parse_token(true)
    }

    fn parse_nmtoken(&mut self) -> Result<String, DtdError> {
        self.parse_token(false)
    }

    fn parse_token(&mut self, name: bool) -> Result<String, DtdError> {
        let start = self.pos;
        let first = self
            .peek_char()
            .ok_or_else(|| self.fatal("expected name, found end of input"))?;
        let valid_first = if name {
            is_name_start_char(first)
        } else {
            is_name_char(first)
        };
        if !valid_first {
            return Err(self.fatal(format!("invalid name character: '{first}'")));
        }
        self.advance_char(first);
        while let Some(ch) = self.peek_char().filter(|ch| is_name_char(*ch)) {
            self.advance_char(ch);
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .map(str::to_string)
            .map_err(|_| self.fatal("invalid UTF-8 in name"))
    }

    fn parse_quoted_value(&mut self) -> Result<String, DtdError> {
        let quote = self.next_byte()?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal("expected quoted value"));
        }
        let start = self.pos;
        while !self.at_end() && self.peek() != Some(quote) {
            self.advance(1);
        }
        if self.at_end() {
            return Err(self.fatal("unexpected end of input in quoted value"));
        }
        let value = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.fatal("invalid UTF-8 in quoted value"))?
            .to_string();
        self.advance(1);
        Ok(value)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        let remaining = self.input.get(self.pos..)?;
        let len = remaining.len().min(4);
        // A char is at most 4 bytes; trim a partial trailing sequence.
        (1..=len)
            .rev()
            .find_map(|n| std::str::from_utf8(&remaining[..n]).ok())
            .and_then(|s| s.chars().next())
    }

    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            let Some(&b) = self.input.get(self.pos) else {
                return;
            };
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_char(&mut self, ch: char) {
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += ch.len_utf8();
    }

    fn next_byte(&mut self) -> Result<u8, DtdError> {
        let b = self
            .peek()
            .ok_or_else(|| self.fatal("unexpected end of input"))?;
        self.advance(1);
        Ok(b)
    }

    fn expect_byte(&mut self, expected: u8) -> Result<(), DtdError> {
        let b = self.next_byte()?;
        if b == expected {
            Ok(())
        } else {
            Err(self.fatal(format!(
                "expected '{}', found '{}'",
                char::from(expected),
                char::from(b)
            )))
        }
    }

    fn expect_str(&mut self, expected: &[u8]) -> Result<(), DtdError> {
        expected.iter().try_for_each(|&b| self.expect_byte(b))
    }

    fn looking_at(&self, s: &[u8]) -> bool {
        self.input
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s))
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.advance(1);
        }
        self.pos > start
    }

    fn skip_whitespace_required(&mut self) -> Result<(), DtdError> {
        if self.skip_whitespace() {
            Ok(())
        } else {
            Err(self.fatal("whitespace required"))
        }
    }

    fn fatal(&self, message: impl Into<String>) -> DtdError {
        DtdError::Syntax {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }
}

// ---------------------------------------------------------------------------
// DTD Validator
// ---------------------------------------------------------------------------

/// An element the validator has seen start but not end.
#[derive(Debug)]
struct OpenElement {
    name: String,
    model: Option<ContentModel>,
    attributes: Vec<(String, String)>,
    children: Vec<String>,
}

/// Validates writer output against a [`DtdSubset`].
///
/// # Examples
///
/// ```
/// use xmlcursor::validation::dtd::{DtdSubset, DtdValidator};
/// use xmlcursor::validation::Validator;
///
/// let subset = DtdSubset::parse("<!ELEMENT root EMPTY>").unwrap();
/// let validator = DtdValidator::new(subset);
/// assert_eq!(validator.name(), "dtd");
/// ```
#[derive(Debug)]
pub struct DtdValidator {
    name: String,
    subset: DtdSubset,
    stack: Vec<OpenElement>,
    ids: HashSet<String>,
    idrefs: Vec<String>,
}

impl DtdValidator {
    /// Creates a validator named `"dtd"`.
    #[must_use]
    pub fn new(subset: DtdSubset) -> Self {
        Self::with_name("dtd", subset)
    }

    /// Creates a validator with a custom name, for attaching several.
    #[must_use]
    pub fn with_name(name: impl Into<String>, subset: DtdSubset) -> Self {
        Self {
            name: name.into(),
            subset,
            stack: Vec::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
        }
    }

    /// The subset being validated against.
    #[must_use]
    pub fn subset(&self) -> &DtdSubset {
        &self.subset
    }

    fn parent_class(&self) -> ContentClass {
        self.stack
            .last()
            .and_then(|open| open.model.as_ref())
            .map_or(ContentClass::AnyText, ContentModel::content_class)
    }

    fn check_attribute_type(
        &mut self,
        decl: &AttributeDecl,
        value: &str,
        element: &str,
        report: &mut ProblemReport,
    ) {
        let attr = &decl.attribute_name;
        match &decl.attribute_type {
            AttributeType::CData => {}
            AttributeType::Id => {
                if !is_name(value) {
                    report.error(format!("ID attribute '{attr}' on '{element}' has invalid value '{value}'"));
                } else if !self.ids.insert(value.to_string()) {
                    report.error(format!("duplicate ID value '{value}'"));
                }
            }
            AttributeType::IdRef => self.idrefs.push(value.to_string()),
            AttributeType::IdRefs => self
                .idrefs
                .extend(value.split_ascii_whitespace().map(str::to_string)),
            AttributeType::Entity | AttributeType::Entities => {
                for name in value.split_ascii_whitespace() {
                    if self.subset.entity(name).is_none() {
                        report.error(format!(
                            "attribute '{attr}' on '{element}' references undeclared entity '{name}'"
                        ));
                    }
                }
            }
            AttributeType::NmToken | AttributeType::NmTokens => {
                let tokens_ok = value
                    .split_ascii_whitespace()
                    .all(|token| token.chars().all(is_name_char));
                let single_ok = decl.attribute_type == AttributeType::NmTokens
                    || value.split_ascii_whitespace().count() == 1;
                if !tokens_ok || !single_ok || value.trim().is_empty() {
                    report.error(format!(
                        "attribute '{attr}' on '{element}' has invalid name token value '{value}'"
                    ));
                }
            }
            AttributeType::Notation(allowed) | AttributeType::Enumeration(allowed) => {
                if !allowed.iter().any(|a| a == value) {
                    report.error(format!(
                        "attribute '{attr}' on '{element}' has value '{value}', expected one of ({})",
                        allowed.join("|")
                    ));
                }
            }
        }
    }
}

impl Validator for DtdValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_element_start(&mut self, name: &ExpandedName<'_>, report: &mut ProblemReport) {
        let qname = name.qualified().into_owned();
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(qname.clone());
        }
        let model = self
            .subset
            .element(&qname)
            .map(|decl| decl.content_model.clone());
        if model.is_none() {
            report.error(format!("element '{qname}' is not declared in the DTD"));
        }
        self.stack.push(OpenElement {
            name: qname,
            model,
            attributes: Vec::new(),
            children: Vec::new(),
        });
    }

    fn validate_attribute(
        &mut self,
        name: &ExpandedName<'_>,
        value: &str,
        report: &mut ProblemReport,
    ) {
        let qname = name.qualified().into_owned();
        let Some(element) = self.stack.last().map(|open| open.name.clone()) else {
            return;
        };
        let decls = self.subset.attributes(&element);
        if !decls.is_empty() {
            match decls.iter().find(|d| d.attribute_name == qname).cloned() {
                Some(decl) => {
                    if let AttributeDefault::Fixed(fixed) = &decl.default {
                        if fixed != value {
                            report.error(format!(
                                "attribute '{qname}' on element '{element}' must have fixed value '{fixed}', found '{value}'"
                            ));
                        }
                    }
                    self.check_attribute_type(&decl, value, &element, report);
                }
                None => report.error(format!(
                    "attribute '{qname}' on element '{element}' is not declared in the DTD"
                )),
            }
        }
        if let Some(open) = self.stack.last_mut() {
            open.attributes.push((qname, value.to_string()));
        }
    }

    fn validate_element_and_attributes(&mut self, report: &mut ProblemReport) -> ContentClass {
        let Some(open) = self.stack.last() else {
            return ContentClass::AnyText;
        };
        for decl in self.subset.attributes(&open.name) {
            let present = open
                .attributes
                .iter()
                .any(|(name, _)| *name == decl.attribute_name);
            if decl.default == AttributeDefault::Required && !present {
                report.error(format!(
                    "required attribute '{}' missing on element '{}'",
                    decl.attribute_name, open.name
                ));
            }
        }
        self.parent_class()
    }

    fn validate_element_end(
        &mut self,
        _name: &ExpandedName<'_>,
        report: &mut ProblemReport,
    ) -> ContentClass {
        if let Some(open) = self.stack.pop() {
            match &open.model {
                Some(ContentModel::Empty) if !open.children.is_empty() => report.error(format!(
                    "element '{}' is declared EMPTY but has content",
                    open.name
                )),
                Some(ContentModel::Mixed(allowed)) => {
                    for child in open.children.iter().filter(|c| !allowed.contains(*c)) {
                        report.error(format!(
                            "element '{child}' is not allowed in mixed content of '{}'",
                            open.name
                        ));
                    }
                }
                Some(model @ ContentModel::Children(spec)) => {
                    if !match_content_spec(spec, &open.children, 0).contains(&open.children.len()) {
                        report.error(format!(
                            "element '{}' content does not match declared content model {model}; found children: [{}]",
                            open.name,
                            open.children.join(", ")
                        ));
                    }
                }
                _ => {}
            }
        }
        self.parent_class()
    }

    fn validate_text(&mut self, _text: &str, _is_final: bool, _report: &mut ProblemReport) {
        // (#PCDATA) places no constraint on the characters themselves.
    }

    fn validate_entity_ref(&mut self, name: &str, report: &mut ProblemReport) {
        let predefined = matches!(name, "amp" | "lt" | "gt" | "apos" | "quot");
        if !predefined && self.subset.entity(name).is_none() {
            report.error(format!("reference to undeclared entity '{name}'"));
        }
    }

    fn validation_completed(&mut self, report: &mut ProblemReport) {
        for idref in std::mem::take(&mut self.idrefs) {
            if !self.ids.contains(&idref) {
                report.error(format!("IDREF '{idref}' does not match any ID"));
            }
        }
        self.stack.clear();
    }
}

/// Matches `spec` against `names` starting at `pos` and returns every
/// position a match can end at.
///
/// Tracking all end positions rather than the longest one lets `(a*, a)`
/// accept `a a`.
fn match_content_spec(spec: &ContentSpec, names: &[String], pos: usize) -> BTreeSet<usize> {
    let once = |p: usize| -> BTreeSet<usize> {
        match &spec.kind {
            ContentSpecKind::Name(expected) => names
                .get(p)
                .filter(|n| *n == expected)
                .map(|_| p + 1)
                .into_iter()
                .collect(),
            ContentSpecKind::Seq(items) => items.iter().fold(BTreeSet::from([p]), |ends, item| {
                ends.into_iter()
                    .flat_map(|q| match_content_spec(item, names, q))
                    .collect()
            }),
            ContentSpecKind::Choice(items) => items
                .iter()
                .flat_map(|item| match_content_spec(item, names, p))
                .collect(),
        }
    };

    match spec.occurrence {
        Occurrence::Once => once(pos),
        Occurrence::Optional => {
            let mut ends = once(pos);
            ends.insert(pos);
            ends
        }
        Occurrence::ZeroOrMore | Occurrence::OneOrMore => {
            let mut ends = once(pos);
            let mut pending: Vec<usize> = ends.iter().copied().collect();
            while let Some(q) = pending.pop() {
                for next in once(q) {
                    if ends.insert(next) {
                        pending.push(next);
                    }
                }
            }
            if spec.occurrence == Occurrence::ZeroOrMore {
                ends.insert(pos);
            }
            ends
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> ExpandedName<'_> {
        ExpandedName::new("", local, "")
    }

    fn subset(text: &str) -> DtdSubset {
        let Ok(subset) = DtdSubset::parse(text) else {
            panic!("failed to parse DTD: {text}");
        };
        subset
    }

    #[test]
    fn test_parse_element_models() {
        let dtd = subset(
            "<!ELEMENT a EMPTY>\n<!ELEMENT b ANY>\n<!ELEMENT c (#PCDATA)>\n\
             <!ELEMENT d (#PCDATA|a)*>\n<!ELEMENT e (a,(b|c)*,d?)+>",
        );
        assert_eq!(dtd.element("a").map(|d| &d.content_model), Some(&ContentModel::Empty));
        assert_eq!(dtd.element("b").map(|d| &d.content_model), Some(&ContentModel::Any));
        let Some(e) = dtd.element("e") else {
            panic!("missing e");
        };
        assert_eq!(e.content_model.to_string(), "(a,(b|c)*,d?)+");
    }

    #[test]
    fn test_parse_skips_comments_and_pis() {
        let dtd = subset("<!-- x --><?pi data?><!NOTATION n SYSTEM 'x'>%pe;<!ELEMENT a EMPTY>");
        assert!(dtd.element("a").is_some());
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = DtdSubset::parse("<!ELEMENT a\n  (b,>").unwrap_err();
        let DtdError::Syntax { line, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 2);
    }

    #[test]
    fn test_parse_rejects_duplicate_element() {
        assert!(DtdSubset::parse("<!ELEMENT a EMPTY><!ELEMENT a ANY>").is_err());
    }

    #[test]
    fn test_content_classes() {
        let dtd = subset("<!ELEMENT a EMPTY><!ELEMENT b (a)><!ELEMENT c (#PCDATA)><!ELEMENT d ANY>");
        let class = |n: &str| dtd.element(n).map(|d| d.content_model.content_class());
        assert_eq!(class("a"), Some(ContentClass::None));
        assert_eq!(class("b"), Some(ContentClass::WhitespaceOnly));
        assert_eq!(class("c"), Some(ContentClass::ValidatableText));
        assert_eq!(class("d"), Some(ContentClass::AnyText));
    }

    #[test]
    fn test_combine_shares_unchanged_maps() {
        let internal = subset("<!ENTITY e 'int'>");
        let external = subset("<!ELEMENT root ANY><!ENTITY e 'ext'><!ENTITY f 'ext'>");
        let combined = internal.combine_with_external(&external).unwrap();
        assert!(combined.shares_elements_with(&external));
        assert!(!combined.shares_entities_with(&external));
        assert_eq!(
            combined.entity("e").map(|d| &d.kind),
            Some(&EntityKind::Internal("int".to_string()))
        );
        assert!(combined.entity("f").is_some());
        // inputs untouched
        assert!(internal.element("root").is_none());
        assert_eq!(
            external.entity("e").map(|d| &d.kind),
            Some(&EntityKind::Internal("ext".to_string()))
        );
    }

    #[test]
    fn test_combine_rejects_element_in_both() {
        let internal = subset("<!ELEMENT root ANY>");
        let external = subset("<!ELEMENT root EMPTY>");
        assert_eq!(
            internal.combine_with_external(&external).unwrap_err(),
            DtdError::ConflictingElement("root".to_string())
        );
    }

    #[test]
    fn test_validator_children_model() {
        let mut v = DtdValidator::new(subset(
            "<!ELEMENT list (item+)><!ELEMENT item (#PCDATA)>",
        ));
        let mut report = ProblemReport::new();
        v.validate_element_start(&name("list"), &mut report);
        assert_eq!(
            v.validate_element_and_attributes(&mut report),
            ContentClass::WhitespaceOnly
        );
        v.validate_element_start(&name("item"), &mut report);
        assert_eq!(
            v.validate_element_and_attributes(&mut report),
            ContentClass::ValidatableText
        );
        assert_eq!(
            v.validate_element_end(&name("item"), &mut report),
            ContentClass::WhitespaceOnly
        );
        assert_eq!(
            v.validate_element_end(&name("list"), &mut report),
            ContentClass::AnyText
        );
        assert!(report.is_empty(), "{:?}", report.problems());
    }

    fn children_problems(dtd: &str, children: &[&str]) -> usize {
        let mut v = DtdValidator::new(subset(dtd));
        let mut report = ProblemReport::new();
        v.validate_element_start(&name("r"), &mut report);
        v.validate_element_and_attributes(&mut report);
        for child in children {
            v.validate_element_start(&name(child), &mut report);
            v.validate_element_and_attributes(&mut report);
            v.validate_element_end(&name(child), &mut report);
        }
        v.validate_element_end(&name("r"), &mut report);
        report.problems().len()
    }

    #[test]
    fn test_content_model_backtracks() {
        let dtd = "<!ELEMENT r (a*, a)><!ELEMENT a EMPTY>";
        assert_eq!(children_problems(dtd, &["a"]), 0);
        assert_eq!(children_problems(dtd, &["a", "a", "a"]), 0);
        assert_eq!(children_problems(dtd, &[]), 1);

        let dtd = "<!ELEMENT r ((a | b)*, b, c?)><!ELEMENT a EMPTY><!ELEMENT b EMPTY><!ELEMENT c EMPTY>";
        assert_eq!(children_problems(dtd, &["b", "a", "b", "c"]), 0);
        assert_eq!(children_problems(dtd, &["a", "c"]), 1);
    }

    #[test]
    fn test_content_model_zero_width_repetition() {
        let dtd = "<!ELEMENT r (a?)+><!ELEMENT a EMPTY>";
        assert_eq!(children_problems(dtd, &[]), 0);
        assert_eq!(children_problems(dtd, &["a", "a"]), 0);

        let dtd = "<!ELEMENT r (a+)><!ELEMENT a EMPTY>";
        assert_eq!(children_problems(dtd, &[]), 1);
    }

    #[test]
    fn test_validator_reports_missing_child() {
        let mut v = DtdValidator::new(subset("<!ELEMENT list (item+)><!ELEMENT item EMPTY>"));
        let mut report = ProblemReport::new();
        v.validate_element_start(&name("list"), &mut report);
        v.validate_element_and_attributes(&mut report);
        v.validate_element_end(&name("list"), &mut report);
        assert_eq!(report.problems().len(), 1);
        assert!(report.problems()[0].message.contains("does not match"));
    }

    #[test]
    fn test_validator_undeclared_element() {
        let mut v = DtdValidator::new(subset("<!ELEMENT root ANY>"));
        let mut report = ProblemReport::new();
        v.validate_element_start(&name("other"), &mut report);
        assert_eq!(report.problems().len(), 1);
        assert_eq!(report.problems()[0].severity, crate::error::ErrorSeverity::Error);
    }

    #[test]
    fn test_validator_attributes() {
        let mut v = DtdValidator::new(subset(
            "<!ELEMENT a EMPTY><!ATTLIST a kind (x|y) #REQUIRED id ID #IMPLIED>",
        ));
        let mut report = ProblemReport::new();
        v.validate_element_start(&name("a"), &mut report);
        v.validate_attribute(&name("kind"), "z", &mut report);
        v.validate_attribute(&name("other"), "1", &mut report);
        v.validate_element_and_attributes(&mut report);
        let messages: Vec<_> = report.take().into_iter().map(|p| p.message).collect();
        assert_eq!(messages.len(), 2, "{messages:?}");
        assert!(messages[0].contains("expected one of (x|y)"));
        assert!(messages[1].contains("not declared"));

        v.validate_element_end(&name("a"), &mut report);
        v.validate_element_start(&name("a"), &mut report);
        v.validate_element_and_attributes(&mut report);
        assert!(report.problems()[0].message.contains("required attribute 'kind'"));
    }

    #[test]
    fn test_validator_entity_refs_and_idrefs() {
        let mut v = DtdValidator::new(subset(
            "<!ENTITY copy '(c)'><!ELEMENT a ANY><!ATTLIST a ref IDREF #IMPLIED>",
        ));
        let mut report = ProblemReport::new();
        v.validate_entity_ref("copy", &mut report);
        v.validate_entity_ref("amp", &mut report);
        assert!(report.is_empty());
        v.validate_entity_ref("nope", &mut report);
        assert_eq!(report.take().len(), 1);

        v.validate_element_start(&name("a"), &mut report);
        v.validate_attribute(&name("ref"), "missing", &mut report);
        v.validation_completed(&mut report);
        assert!(report.problems()[0].message.contains("IDREF 'missing'"));
    }
}
