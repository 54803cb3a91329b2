//! `[Content_Types].xml`

use super::validation::part_key;
use crate::error::{Error, Result};
use crate::namespaces::{CONTENT_TYPES_NS, MODEL_CONTENT_TYPE, RELS_CONTENT_TYPE};
use crate::parser::scope::NamespaceScope;
use crate::writer::emit::XmlSink;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Content type map of a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a file extension; the first registration of an extension wins
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        let ext = extension.to_ascii_lowercase();
        if !self.defaults.iter().any(|(e, _)| *e == ext) {
            self.defaults.push((ext, content_type.to_string()));
        }
    }

    /// Map one part, replacing an earlier override of the same part
    pub fn add_override(&mut self, part: &str, content_type: &str) {
        let key = part_key(part);
        self.overrides.retain(|(p, _)| part_key(p) != key);
        self.overrides
            .push((format!("/{}", part.trim_start_matches('/')), content_type.to_string()));
    }

    /// Content type by extension default
    pub fn default_for(&self, extension: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(extension))
            .map(|(_, ct)| ct.as_str())
    }

    /// Content type of a part: override first, then extension default
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let key = part_key(part);
        if let Some((_, ct)) = self.overrides.iter().find(|(p, _)| part_key(p) == key) {
            return Some(ct.as_str());
        }
        let file = part.rsplit('/').next().unwrap_or(part);
        let ext = file.rsplit_once('.').map(|(_, e)| e)?;
        self.default_for(ext)
    }

    /// Register `content_type` for `part` with as little output as possible
    pub(crate) fn register(&mut self, part: &str, content_type: &str) {
        if self.content_type_of(part) == Some(content_type) {
            return;
        }
        let file = part.rsplit('/').next().unwrap_or(part);
        match file.rsplit_once('.').map(|(_, e)| e) {
            Some(ext) if self.default_for(ext).is_none() => self.add_default(ext, content_type),
            _ => self.add_override(part, content_type),
        }
    }

    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);
        let mut scope = NamespaceScope::new();
        let mut buf = Vec::new();
        let mut types = Self::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let el = scope.push(e)?;
                    match el.local.as_str() {
                        "Default" => {
                            let ext = el.require("Extension")?;
                            let ct = el.require("ContentType")?;
                            if ct == MODEL_CONTENT_TYPE && !ext.eq_ignore_ascii_case("model") {
                                return Err(Error::InvalidPackage(format!(
                                    "model content type mapped to extension '{}'",
                                    ext
                                )));
                            }
                            types.add_default(ext, ct);
                        }
                        "Override" => {
                            let part = el.require("PartName")?;
                            let ct = el.require("ContentType")?;
                            types.add_override(part, ct);
                        }
                        _ => {}
                    }
                    if matches!(event, Event::Empty(_)) {
                        scope.pop();
                    }
                }
                Event::End(_) => scope.pop(),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if types.default_for("rels") != Some(RELS_CONTENT_TYPE) {
            return Err(Error::InvalidPackage(
                "content types lack the relationships default".to_string(),
            ));
        }
        Ok(types)
    }

    pub(crate) fn to_xml(&self) -> Result<Vec<u8>> {
        let mut sink = XmlSink::new(Vec::new());
        sink.decl()?;
        let mut root = BytesStart::new("Types");
        root.push_attribute(("xmlns", CONTENT_TYPES_NS));
        sink.start(root)?;
        for (ext, ct) in &self.defaults {
            let mut e = BytesStart::new("Default");
            e.push_attribute(("Extension", ext.as_str()));
            e.push_attribute(("ContentType", ct.as_str()));
            sink.empty(e)?;
        }
        for (part, ct) in &self.overrides {
            let mut e = BytesStart::new("Override");
            e.push_attribute(("PartName", part.as_str()));
            e.push_attribute(("ContentType", ct.as_str()));
            sink.empty(e)?;
        }
        sink.end("Types")?;
        Ok(sink.into_inner())
    }
}
