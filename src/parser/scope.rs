//! Namespace scopes and resolved start tags
//!
//! quick-xml hands out raw qualified names. [`NamespaceScope`] tracks the
//! `xmlns` declarations of open elements and turns every start tag into an
//! [`XmlElement`] whose element and attribute names carry namespace URIs.

use crate::error::{Error, Result};
use crate::namespaces::XML;
use quick_xml::events::{BytesRef, BytesStart, BytesText};
use std::borrow::Cow;

/// Attribute with a resolved namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlAttr {
    /// Namespace URI; `None` for unprefixed attributes
    pub ns: Option<String>,
    pub local: String,
    pub value: String,
}

/// Start tag with resolved names
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlElement {
    /// Namespace URI, empty when none is in scope
    pub ns: String,
    pub local: String,
    pub attrs: Vec<XmlAttr>,
}

impl XmlElement {
    /// Unprefixed attribute
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Attribute in a namespace
    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns.as_deref() == Some(ns) && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Unprefixed attribute that must be present
    pub fn require(&self, local: &str) -> Result<&str> {
        self.attr(local)
            .ok_or_else(|| Error::missing_attribute(&self.local, local))
    }

    /// Attributes in namespaces other than `own`, excluding `xml:*`
    pub fn foreign_attrs<'a>(&'a self, own: &'a str) -> impl Iterator<Item = &'a XmlAttr> + 'a {
        self.attrs.iter().filter(move |a| match a.ns.as_deref() {
            Some(ns) => ns != own && ns != XML,
            None => false,
        })
    }
}

#[derive(Debug, Clone)]
struct Binding {
    prefix: String,
    uri: String,
}

/// Stack of in-scope namespace bindings
#[derive(Debug, Default)]
pub(crate) struct NamespaceScope {
    bindings: Vec<Binding>,
    frames: Vec<usize>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an element: register its declarations and resolve its names
    ///
    /// Every call must be paired with [`NamespaceScope::pop`], including
    /// for empty elements.
    pub fn push(&mut self, start: &BytesStart<'_>) -> Result<XmlElement> {
        self.frames.push(self.bindings.len());

        let mut raw = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::InvalidXml(e.to_string()))?;
            let value = unescape_value(&attr.value)?;
            if key == "xmlns" {
                self.bindings.push(Binding {
                    prefix: String::new(),
                    uri: value,
                });
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.bindings.push(Binding {
                    prefix: prefix.to_string(),
                    uri: value,
                });
            } else {
                raw.push((key.to_string(), value));
            }
        }

        let qname = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::InvalidXml(e.to_string()))?
            .to_string();
        let (prefix, local) = split_qname(&qname);
        let ns = match prefix {
            Some(p) => self
                .lookup(p)
                .ok_or_else(|| Error::InvalidXml(format!("undeclared prefix '{}' on <{}>", p, qname)))?
                .to_string(),
            None => self.lookup("").unwrap_or_default().to_string(),
        };

        let mut attrs = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let (prefix, local) = split_qname(&key);
            let ns = match prefix {
                Some(p) => Some(
                    self.lookup(p)
                        .ok_or_else(|| {
                            Error::InvalidXml(format!("undeclared prefix '{}' on attribute {}", p, key))
                        })?
                        .to_string(),
                ),
                None => None,
            };
            attrs.push(XmlAttr {
                ns,
                local: local.to_string(),
                value,
            });
        }

        Ok(XmlElement {
            ns,
            local: local.to_string(),
            attrs,
        })
    }

    /// Close the innermost element
    pub fn pop(&mut self) {
        if let Some(mark) = self.frames.pop() {
            self.bindings.truncate(mark);
        }
    }

    /// URI bound to a prefix; `""` is the default namespace
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML);
        }
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
            .filter(|uri| !uri.is_empty() || prefix.is_empty())
    }

    /// Prefix currently bound to a URI
    pub fn prefix_of(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.uri == uri && self.lookup(&b.prefix) == Some(uri))
            .map(|b| b.prefix.as_str())
    }

    /// Bindings declared by the innermost open element
    pub fn declared_here(&self) -> impl Iterator<Item = (&str, &str)> {
        let start = self.frames.last().copied().unwrap_or(0);
        self.bindings[start..]
            .iter()
            .map(|b| (b.prefix.as_str(), b.uri.as_str()))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn unescape_value(raw: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(raw).map_err(|e| Error::InvalidXml(e.to_string()))?;
    quick_xml::escape::unescape(text)
        .map(Cow::into_owned)
        .map_err(|e| Error::XmlAttr(e.to_string()))
}

/// Character data of a text event
pub(crate) fn text_content(text: &BytesText<'_>) -> Result<String> {
    unescape_value(text.as_ref())
}

/// Expansion of an entity or character reference inside text
pub(crate) fn general_ref(reference: &BytesRef<'_>) -> Result<String> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|e| Error::InvalidXml(e.to_string()))?
    {
        return Ok(ch.to_string());
    }
    let name = std::str::from_utf8(reference.as_ref()).map_err(|e| Error::InvalidXml(e.to_string()))?;
    let expanded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        other => {
            return Err(Error::InvalidXml(format!("undefined entity '&{};'", other)));
        }
    };
    Ok(expanded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use quick_xml::events::Event;

    fn resolve_all(xml: &str) -> Vec<XmlElement> {
        let mut reader = Reader::from_str(xml);
        let mut scope = NamespaceScope::new();
        let mut out = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => out.push(scope.push(&e).unwrap()),
                Event::Empty(e) => {
                    out.push(scope.push(&e).unwrap());
                    scope.pop();
                }
                Event::End(_) => scope.pop(),
                Event::Eof => break,
                _ => {}
            }
        }
        out
    }

    #[test]
    fn test_default_and_prefixed_namespaces() {
        let els = resolve_all(
            r#"<model xmlns="urn:core" xmlns:p="urn:prod"><item p:UUID="u" id="1"/><p:x/></model>"#,
        );
        assert_eq!(els[0].ns, "urn:core");
        assert_eq!(els[1].ns, "urn:core");
        assert_eq!(els[1].attr("id"), Some("1"));
        assert_eq!(els[1].attr("UUID"), None);
        assert_eq!(els[1].attr_ns("urn:prod", "UUID"), Some("u"));
        assert_eq!(els[2].ns, "urn:prod");
        assert_eq!(els[2].local, "x");
    }

    #[test]
    fn test_scopes_unwind() {
        let els = resolve_all(r#"<a xmlns="urn:1"><b xmlns="urn:2"/><c/></a>"#);
        assert_eq!(els[1].ns, "urn:2");
        assert_eq!(els[2].ns, "urn:1");
    }

    #[test]
    fn test_undeclared_prefix_is_error() {
        let mut reader = Reader::from_str("<q:a/>");
        let mut scope = NamespaceScope::new();
        match reader.read_event().unwrap() {
            Event::Empty(e) => assert!(scope.push(&e).is_err()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_attribute_entities_unescaped() {
        let els = resolve_all(r#"<a name="x &amp; y &#65;"/>"#);
        assert_eq!(els[0].attr("name"), Some("x & y A"));
    }
}
