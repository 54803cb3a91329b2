//! `.rels` parts

use super::validation::validate_part_name;
use crate::error::{Error, Result};
use crate::namespaces::RELATIONSHIPS_NS;
use crate::parser::scope::NamespaceScope;
use crate::writer::emit::XmlSink;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Typed link from a source part to a target part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Id unique within the `.rels` part
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Absolute target part name
    pub target: String,
}

/// `.rels` part holding the relationships of `source`; `None` is the package
pub(crate) fn rels_path_for(source: Option<&str>) -> String {
    match source {
        None => "/_rels/.rels".to_string(),
        Some(part) => {
            let part = part.strip_prefix('/').unwrap_or(part);
            match part.rsplit_once('/') {
                Some((dir, file)) => format!("/{}/_rels/{}.rels", dir, file),
                None => format!("/_rels/{}.rels", part),
            }
        }
    }
}

/// Absolute, percent-decoded part name of a relationship target
pub(crate) fn resolve_target(source: Option<&str>, target: &str) -> Result<String> {
    let decoded = urlencoding::decode(target)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| target.to_string());
    if decoded.starts_with('/') {
        return Ok(decoded);
    }
    let base = source
        .and_then(|s| s.rsplit_once('/').map(|(dir, _)| dir.to_string()))
        .unwrap_or_default();
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::InvalidPackage(format!(
                        "relationship target '{}' escapes the package",
                        target
                    )));
                }
            }
            s => segments.push(s),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Parse a `.rels` part whose source is `source`
pub(crate) fn parse_relationships(data: &[u8], source: Option<&str>) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut scope = NamespaceScope::new();
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let el = scope.push(e)?;
                let external = el.attr("TargetMode") == Some("External");
                if el.local == "Relationship" && !external {
                    let id = el.require("Id")?.to_string();
                    let rel_type = el.require("Type")?.to_string();
                    if rel_type.contains('#') || rel_type.contains('?') {
                        return Err(Error::InvalidPackage(format!(
                            "relationship type '{}' has a fragment or query",
                            rel_type
                        )));
                    }
                    let target = resolve_target(source, el.require("Target")?)?;
                    validate_part_name(&target)?;
                    if rels.iter().any(|r: &Relationship| r.id == id) {
                        return Err(Error::InvalidPackage(format!(
                            "duplicate relationship id '{}'",
                            id
                        )));
                    }
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
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
    Ok(rels)
}

/// Serialize relationships, assigning ids `rel0`, `rel1`, ... when empty
pub(crate) fn write_relationships(rels: &[Relationship]) -> Result<Vec<u8>> {
    let mut sink = XmlSink::new(Vec::new());
    sink.decl()?;
    let mut root = BytesStart::new("Relationships");
    root.push_attribute(("xmlns", RELATIONSHIPS_NS));
    sink.start(root)?;
    for (i, rel) in rels.iter().enumerate() {
        let id = if rel.id.is_empty() {
            format!("rel{}", i)
        } else {
            rel.id.clone()
        };
        let mut e = BytesStart::new("Relationship");
        e.push_attribute(("Target", rel.target.as_str()));
        e.push_attribute(("Id", id.as_str()));
        e.push_attribute(("Type", rel.rel_type.as_str()));
        sink.empty(e)?;
    }
    sink.end("Relationships")?;
    Ok(sink.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::MODEL_REL_TYPE;

    #[test]
    fn test_rels_path() {
        assert_eq!(rels_path_for(None), "/_rels/.rels");
        assert_eq!(
            rels_path_for(Some("/3D/3dmodel.model")),
            "/3D/_rels/3dmodel.model.rels"
        );
    }

    #[test]
    fn test_resolve_relative_and_encoded() {
        assert_eq!(
            resolve_target(Some("/3D/3dmodel.model"), "Texture/a.png").unwrap(),
            "/3D/Texture/a.png"
        );
        assert_eq!(
            resolve_target(Some("/3D/3dmodel.model"), "../Metadata/t.png").unwrap(),
            "/Metadata/t.png"
        );
        assert_eq!(resolve_target(None, "/2D/test%C3%86file.model").unwrap(), "/2D/testÆfile.model");
        assert!(resolve_target(None, "../x").is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let rels = vec![Relationship {
            id: String::new(),
            rel_type: MODEL_REL_TYPE.to_string(),
            target: "/3D/3dmodel.model".to_string(),
        }];
        let bytes = write_relationships(&rels).unwrap();
        let parsed = parse_relationships(&bytes, None).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "rel0");
        assert_eq!(parsed[0].target, "/3D/3dmodel.model");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/a.model" Id="r" Type="t"/>
  <Relationship Target="/b.model" Id="r" Type="t"/>
</Relationships>"#;
        assert!(parse_relationships(xml.as_bytes(), None).is_err());
    }
}
