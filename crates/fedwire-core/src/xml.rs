//! # XML Element Trees
//!
//! A small owned element tree over `quick-xml`, used by the XML codec, the
//! magic-envelope wire format, and XML canonicalization.
//!
//! ## Security Invariant
//!
//! Parsing is bounded: nesting depth and element count are capped by
//! [`XmlLimits`], and documents with a `DOCTYPE` are rejected outright so
//! no entity expansion can take place.
//!
//! ## Canonical Form
//!
//! [`XmlElement::to_canonical_string()`] writes attributes sorted by name,
//! escapes text and attribute values uniformly, drops whitespace-only text
//! between child elements, and always writes start/end tag pairs. Comments,
//! processing instructions, and the XML declaration are not part of the
//! tree. Two documents that differ only in attribute order, quoting style,
//! self-closing syntax, or inter-element whitespace therefore canonicalize
//! to the same bytes.

use std::collections::BTreeMap;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Error parsing an XML document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The document is not well-formed.
    #[error("syntax error near byte {position}: {reason}")]
    Syntax {
        /// Approximate byte offset of the error.
        position: u64,
        /// Parser description of the problem.
        reason: String,
    },

    /// Elements are nested deeper than the configured limit.
    #[error("nesting depth exceeds {0}")]
    DepthExceeded(usize),

    /// The document has more elements than the configured limit.
    #[error("document has more than {0} elements")]
    TooManyElements(usize),

    /// The document carries a document type declaration.
    #[error("document type declarations are not accepted")]
    DocTypeRejected,

    /// The document has no root element.
    #[error("document has no root element")]
    NoRootElement,

    /// Elements or text follow the root element.
    #[error("content after the root element")]
    TrailingContent,
}

/// Structural limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlLimits {
    /// Maximum element nesting depth (the root is depth 1).
    pub max_depth: usize,
    /// Maximum number of elements in the document.
    pub max_elements: usize,
}

impl Default for XmlLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_elements: 4096,
        }
    }
}

/// An owned XML element. Qualified names keep their namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Qualified element name, e.g. `me:env`.
    pub name: String,
    /// Attributes by qualified name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated, unescaped character data directly inside this element.
    pub text: String,
}

impl XmlElement {
    /// An empty element with the given qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: set the element text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder: set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder: append a child element.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child element.
    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// The element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// The first child with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    /// All children with the given local name, in document order.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, local: &str) -> Option<&str> {
        self.child(local).map(|c| c.text.as_str())
    }

    /// An attribute by qualified or local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| local_part(k) == name && !k.starts_with("xmlns"))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Serialize in canonical form.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v.as_str()));
            out.push('"');
        }
        out.push('>');
        if self.children.is_empty() {
            out.push_str(&escape(self.text.as_str()));
        } else {
            let trimmed = self.text.trim();
            if !trimmed.is_empty() {
                out.push_str(&escape(trimmed));
            }
            for child in &self.children {
                child.write_canonical(out);
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Parse a complete XML document into its root element.
///
/// # Errors
///
/// Returns [`XmlError`] for malformed input, a `DOCTYPE`, trailing content,
/// or a document exceeding `limits`.
pub fn parse_document(input: &[u8], limits: &XmlLimits) -> Result<XmlElement, XmlError> {
    let text = std::str::from_utf8(input).map_err(|e| XmlError::Syntax {
        position: e.valid_up_to() as u64,
        reason: "document is not valid UTF-8".into(),
    })?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut elements = 0usize;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position,
            reason: e.to_string(),
        })?;
        match event {
            Event::Start(start) => {
                open_element(&stack, &root, &mut elements, limits)?;
                stack.push(element_from_start(&start, position)?);
            }
            Event::Empty(start) => {
                open_element(&stack, &root, &mut elements, limits)?;
                let element = element_from_start(&start, position)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlError::Syntax {
                    position,
                    reason: "unbalanced end tag".into(),
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(|e| XmlError::Syntax {
                    position,
                    reason: e.to_string(),
                })?;
                append_text(&mut stack, &root, &unescaped, position)?;
            }
            Event::CData(c) => {
                let data = String::from_utf8(c.into_inner().into_owned()).map_err(|_| XmlError::Syntax {
                    position,
                    reason: "CDATA is not valid UTF-8".into(),
                })?;
                append_text(&mut stack, &root, &data, position)?;
            }
            Event::DocType(_) => return Err(XmlError::DocTypeRejected),
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax {
            position: text.len() as u64,
            reason: "unexpected end of document inside an element".into(),
        });
    }
    root.ok_or(XmlError::NoRootElement)
}

fn open_element(
    stack: &[XmlElement],
    root: &Option<XmlElement>,
    elements: &mut usize,
    limits: &XmlLimits,
) -> Result<(), XmlError> {
    if stack.is_empty() && root.is_some() {
        return Err(XmlError::TrailingContent);
    }
    *elements += 1;
    if *elements > limits.max_elements {
        return Err(XmlError::TooManyElements(limits.max_elements));
    }
    if stack.len() + 1 > limits.max_depth {
        return Err(XmlError::DepthExceeded(limits.max_depth));
    }
    Ok(())
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::TrailingContent);
    }
    *root = Some(element);
    Ok(())
}

fn append_text(
    stack: &mut [XmlElement],
    root: &Option<XmlElement>,
    text: &str,
    position: u64,
) -> Result<(), XmlError> {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(text);
        return Ok(());
    }
    if text.trim().is_empty() {
        return Ok(());
    }
    if root.is_some() {
        Err(XmlError::TrailingContent)
    } else {
        Err(XmlError::Syntax {
            position,
            reason: "text outside the root element".into(),
        })
    }
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, XmlError> {
    let syntax = |reason: String| XmlError::Syntax { position, reason };
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| syntax("element name is not valid UTF-8".into()))?
        .to_string();
    let mut element = XmlElement::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| syntax(e.to_string()))?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|_| syntax("attribute name is not valid UTF-8".into()))?
            .to_string();
        let value = attribute.unescape_value().map_err(|e| syntax(e.to_string()))?.into_owned();
        if element.attributes.insert(key.clone(), value).is_some() {
            return Err(syntax(format!("duplicate attribute {key:?}")));
        }
    }
    Ok(element)
}
