//! XML normalizer for the ADT service's responses.
//!
//! The service's XML has the usual single-vs-array ambiguity: an element that
//! repeats N times parses to a sequence, but the same element appearing once
//! parses to a single node and appearing zero times to nothing. This module
//! models that ambiguity explicitly as [`XmlChildren`] and resolves it at the
//! accessor boundary ([`xml_array`] / [`xml_node`]), so nothing downstream
//! ever branches on it.
//!
//! No transport semantics live here; every response parser in the crate is
//! built on these accessors.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{AdtError, Result};

/// A parsed XML element.
///
/// Children are keyed by their full qualified name (`tm:request`, not
/// `request`); attribute keys likewise keep their prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    attributes: Vec<(String, String)>,
    children: HashMap<String, XmlChildren>,
    text: String,
}

/// One-or-many child elements sharing a tag name.
///
/// Absence is a missing key in the parent's child map, so the full shape is
/// the {absent, one, many} triple the wire format implies.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlChildren {
    One(Box<XmlNode>),
    Many(Vec<XmlNode>),
}

impl XmlChildren {
    fn push(&mut self, node: XmlNode) {
        match self {
            XmlChildren::Many(nodes) => nodes.push(node),
            XmlChildren::One(_) => {
                let prev = std::mem::replace(self, XmlChildren::Many(Vec::new()));
                if let (XmlChildren::One(first), XmlChildren::Many(nodes)) = (prev, &mut *self) {
                    nodes.push(*first);
                    nodes.push(node);
                }
            }
        }
    }

    /// Canonicalize to an ordered sequence, preserving document order.
    pub fn nodes(&self) -> Vec<&XmlNode> {
        match self {
            XmlChildren::One(node) => vec![node],
            XmlChildren::Many(nodes) => nodes.iter().collect(),
        }
    }

    fn first(&self) -> &XmlNode {
        match self {
            XmlChildren::One(node) => node,
            XmlChildren::Many(nodes) => &nodes[0],
        }
    }
}

impl XmlNode {
    /// First child element with the given name, if any.
    pub fn first_child(&self, name: &str) -> Option<&XmlNode> {
        self.children.get(name).map(XmlChildren::first)
    }

    /// Text content of this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text of the first child with the given name, empty when absent.
    ///
    /// The ABAP serializer payloads carry leaf fields as text-only child
    /// elements, so this is the extraction primitive for them.
    pub fn child_text(&self, name: &str) -> &str {
        self.first_child(name).map(XmlNode::text).unwrap_or("")
    }
}

/// Parse an XML document into a tree of [`XmlNode`]s.
///
/// Returns a synthetic root whose children are the document's top-level
/// element(s), so path lookups can start at the document root name.
pub fn parse(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<(String, XmlNode)> = vec![(String::new(), XmlNode::default())];

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let mut node = XmlNode::default();
                for attr in start.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value()?.into_owned();
                    node.attributes.push((key, value));
                }
                stack.push((name, node));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let mut node = XmlNode::default();
                for attr in start.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value()?.into_owned();
                    node.attributes.push((key, value));
                }
                attach(&mut stack, name, node);
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::End(_) => {
                // The reader checks tag balance, so the stack cannot underflow.
                if let Some((name, node)) = stack.pop() {
                    attach(&mut stack, name, node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let (_, root) = stack.pop().unwrap_or_default();
    Ok(root)
}

fn attach(stack: &mut [(String, XmlNode)], name: String, node: XmlNode) {
    if let Some((_, parent)) = stack.last_mut() {
        match parent.children.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(XmlChildren::One(Box::new(node)));
            }
            Entry::Occupied(mut entry) => entry.get_mut().push(node),
        }
    }
}

/// Resolve `path` to a canonical ordered sequence of child elements.
///
/// Intermediate path steps take the first matching element; the final step
/// yields all matches. A path that resolves to nothing yields an empty
/// sequence rather than an error.
pub fn xml_array<'a>(node: &'a XmlNode, path: &[&str]) -> Vec<&'a XmlNode> {
    let Some((last, intermediate)) = path.split_last() else {
        return Vec::new();
    };
    let mut current = node;
    for name in intermediate {
        match current.first_child(name) {
            Some(child) => current = child,
            None => return Vec::new(),
        }
    }
    match current.children.get(*last) {
        Some(children) => children.nodes(),
        None => Vec::new(),
    }
}

/// Resolve `path` to exactly one element (first match at every step).
///
/// # Errors
/// [`AdtError::NotFound`] when any step of the path is absent.
pub fn xml_node<'a>(node: &'a XmlNode, path: &[&str]) -> Result<&'a XmlNode> {
    let mut current = node;
    for name in path {
        current = current
            .first_child(name)
            .ok_or_else(|| AdtError::NotFound(path.join("/")))?;
    }
    Ok(current)
}

/// Extract an element's attributes as a flat map.
///
/// Namespace declarations (`xmlns`, `xmlns:*`) are dropped; every other key
/// is kept verbatim, prefix included, because the domain structs are keyed by
/// exactly those strings (`tm:number`, `chkrun:status`, ...).
pub fn xml_attrs(node: &XmlNode) -> HashMap<String, String> {
    node.attributes
        .iter()
        .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRUIT: &str = r#"<basket>
        <fruit name="apple"/>
        <fruit name="pear"/>
        <fruit name="plum"/>
    </basket>"#;

    #[test]
    fn test_many_elements_preserve_document_order() {
        let doc = parse(FRUIT).unwrap();
        let fruit = xml_array(&doc, &["basket", "fruit"]);
        assert_eq!(fruit.len(), 3);
        let names: Vec<_> = fruit
            .iter()
            .map(|f| xml_attrs(f).remove("name").unwrap())
            .collect();
        assert_eq!(names, ["apple", "pear", "plum"]);
    }

    #[test]
    fn test_single_element_yields_one() {
        let doc = parse(r#"<basket><fruit name="apple"/></basket>"#).unwrap();
        assert_eq!(xml_array(&doc, &["basket", "fruit"]).len(), 1);
    }

    #[test]
    fn test_absent_element_yields_empty() {
        let doc = parse("<basket></basket>").unwrap();
        assert!(xml_array(&doc, &["basket", "fruit"]).is_empty());
        assert!(xml_array(&doc, &["orchard", "fruit"]).is_empty());
    }

    #[test]
    fn test_xml_node_first_match_and_not_found() {
        let doc = parse(FRUIT).unwrap();
        let first = xml_node(&doc, &["basket", "fruit"]).unwrap();
        assert_eq!(xml_attrs(first)["name"], "apple");

        let err = xml_node(&doc, &["basket", "vegetable"]).unwrap_err();
        assert!(matches!(err, AdtError::NotFound(ref p) if p == "basket/vegetable"));
    }

    #[test]
    fn test_attrs_drop_namespace_declarations_keep_prefixes() {
        let doc = parse(
            r#"<tm:root xmlns:tm="http://www.sap.com/cts/adt/tm" tm:number="NPLK900042" tm:targetuser="ANNA"/>"#,
        )
        .unwrap();
        let root = xml_node(&doc, &["tm:root"]).unwrap();
        let attrs = xml_attrs(root);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["tm:number"], "NPLK900042");
        assert_eq!(attrs["tm:targetuser"], "ANNA");
    }

    #[test]
    fn test_child_text_and_escapes() {
        let doc = parse("<DATA><DEVCLASS>ZAPI&amp;TEST</DEVCLASS></DATA>").unwrap();
        let data = xml_node(&doc, &["DATA"]).unwrap();
        assert_eq!(data.child_text("DEVCLASS"), "ZAPI&TEST");
        assert_eq!(data.child_text("MISSING"), "");
    }
}
