// Minimal XML tree for OWS/WPS documents
//
// WPS servers disagree on namespace prefixes, so every lookup here matches
// local names only. The tree is read-only; rendering goes through the
// templates in `render`.

use quick_xml::events::Event;
use quick_xml::Reader;
use tellus_core::{EngineError, Result};

/// One parsed XML element: local name, attributes (local names), children
/// and accumulated text
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

/// Strip a namespace prefix from a qualified name
fn local_name(qualified: &str) -> String {
    qualified
        .rsplit(':')
        .next()
        .unwrap_or(qualified)
        .to_string()
}

impl Element {
    /// Parse an XML document into a tree rooted at its document element
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut stack: Vec<Element> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let element = element_from_start(&start)?;
                    stack.push(element);
                }
                Ok(Event::Empty(start)) => {
                    let element = element_from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok(element),
                    }
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let decoded = text
                            .unescape()
                            .map_err(|e| EngineError::communication(format!("bad XML text: {e}")))?;
                        current.text.push_str(&decoded);
                    }
                }
                Ok(Event::CData(cdata)) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(cdata.as_ref()));
                    }
                }
                Ok(Event::End(_)) => {
                    let done = stack
                        .pop()
                        .ok_or_else(|| EngineError::communication("unbalanced XML document"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Ok(Event::Eof) => {
                    return Err(EngineError::communication("truncated XML document"))
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(EngineError::communication(format!("unreadable XML: {e}")))
                }
            }
        }
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for all descendants with the given local name
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    /// First descendant with the given local name
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Trimmed text of a direct child, when present and non-empty
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn trimmed_text(&self) -> String {
        self.text.trim().to_string()
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let name = local_name(&String::from_utf8_lossy(start.name().as_ref()));
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| EngineError::communication(format!("bad XML attribute: {e}")))?;
        let key = local_name(&String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr
            .unescape_value()
            .map_err(|e| EngineError::communication(format!("bad XML attribute: {e}")))?
            .to_string();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Escape a text value for embedding in rendered XML
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
