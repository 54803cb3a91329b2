//! Writing an OPC container

use super::content_types::ContentTypes;
use super::relationships::{Relationship, rels_path_for, write_relationships};
use super::validation::{entry_name, part_key, validate_part_name};
use super::CONTENT_TYPES_PART;
use crate::error::{Error, Result};
use crate::namespaces::{RELS_CONTENT_TYPE, MODEL_CONTENT_TYPE};
use std::collections::{BTreeMap, HashSet};
use std::io::{Seek, Write};
use tracing::trace;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Builds a package; every part is written exactly once
///
/// Relationships and content types are collected while parts are added and
/// emitted by [`PackageWriter::finish`].
pub struct PackageWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    written: HashSet<String>,
    content_types: ContentTypes,
    relationships: BTreeMap<String, (Option<String>, Vec<Relationship>)>,
}

/// Byte sink of a part opened with [`PackageWriter::create_part`]
pub struct PartSink<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
}

impl<W: Write + Seek> Write for PartSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.zip.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.zip.flush()
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

impl<W: Write + Seek> PackageWriter<W> {
    /// Start a package on `out`
    pub fn new(out: W) -> Self {
        let mut content_types = ContentTypes::new();
        content_types.add_default("rels", RELS_CONTENT_TYPE);
        content_types.add_default("model", MODEL_CONTENT_TYPE);
        Self {
            zip: ZipWriter::new(out),
            written: HashSet::new(),
            content_types,
            relationships: BTreeMap::new(),
        }
    }

    fn claim(&mut self, part: &str, content_type: &str) -> Result<()> {
        validate_part_name(part)?;
        let key = part_key(part);
        if key.ends_with(".rels") || key == part_key(CONTENT_TYPES_PART) {
            return Err(Error::InvalidPackage(format!(
                "{} is managed by the package writer",
                part
            )));
        }
        if !self.written.insert(key) {
            return Err(Error::DuplicatePart(part.to_string()));
        }
        self.content_types.register(part, content_type);
        Ok(())
    }

    /// Write a part whose size is known
    pub fn add_part(&mut self, part: &str, content_type: &str, data: &[u8]) -> Result<()> {
        self.claim(part, content_type)?;
        let opts = options().large_file(data.len() as u64 > u32::MAX as u64);
        self.zip.start_file(entry_name(part), opts)?;
        self.zip.write_all(data)?;
        trace!(part, bytes = data.len(), "wrote part");
        Ok(())
    }

    /// Open a part for streaming; ZIP64 records are always emitted since the
    /// final size is not known yet
    pub fn create_part(&mut self, part: &str, content_type: &str) -> Result<PartSink<'_, W>> {
        self.claim(part, content_type)?;
        self.zip
            .start_file(entry_name(part), options().large_file(true))?;
        Ok(PartSink { zip: &mut self.zip })
    }

    /// Force the content type of a part through an override
    pub fn set_content_type_override(&mut self, part: &str, content_type: &str) {
        self.content_types.add_override(part, content_type);
    }

    /// Add a relationship from `source` (`None` for the package) to
    /// `target`, returning its id
    pub fn add_relationship(&mut self, source: Option<&str>, rel_type: &str, target: &str) -> String {
        let rels_part = rels_path_for(source);
        let entry = self
            .relationships
            .entry(rels_part)
            .or_insert_with(|| (source.map(str::to_string), Vec::new()));
        let id = format!("rel{}", entry.1.len());
        entry.1.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: format!("/{}", entry_name(target)),
        });
        id
    }

    /// Whether a part has been written
    pub fn contains(&self, part: &str) -> bool {
        self.written.contains(&part_key(part))
    }

    /// Emit relationship parts and content types, and close the archive
    pub fn finish(mut self) -> Result<W> {
        let rels = std::mem::take(&mut self.relationships);
        for (rels_part, (_, list)) in rels {
            let data = write_relationships(&list)?;
            self.zip.start_file(entry_name(&rels_part), options())?;
            self.zip.write_all(&data)?;
        }
        let types = self.content_types.to_xml()?;
        self.zip.start_file(CONTENT_TYPES_PART.trim_start_matches('/'), options())?;
        self.zip.write_all(&types)?;
        Ok(self.zip.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::MODEL_REL_TYPE;
    use crate::opc::Package;
    use std::io::Cursor;

    fn minimal(w: &mut PackageWriter<Cursor<Vec<u8>>>) {
        w.add_part("/3D/3dmodel.model", MODEL_CONTENT_TYPE, b"<model/>")
            .unwrap();
        w.add_relationship(None, MODEL_REL_TYPE, "/3D/3dmodel.model");
    }

    #[test]
    fn test_package_roundtrip() {
        let mut w = PackageWriter::new(Cursor::new(Vec::new()));
        minimal(&mut w);
        {
            let mut sink = w.create_part("/Metadata/big.bin", "application/octet-stream").unwrap();
            sink.write_all(&[7u8; 1000]).unwrap();
        }
        let bytes = w.finish().unwrap().into_inner();

        let mut p = Package::open(Cursor::new(bytes)).unwrap();
        assert_eq!(p.root_model_path(), "/3D/3dmodel.model");
        assert_eq!(p.read_part("/3d/3DMODEL.model").unwrap(), b"<model/>");
        assert_eq!(p.read_part("/Metadata/big.bin").unwrap().len(), 1000);
        assert_eq!(p.content_type("/Metadata/big.bin"), Some("application/octet-stream"));
    }

    #[test]
    fn test_part_written_once() {
        let mut w = PackageWriter::new(Cursor::new(Vec::new()));
        minimal(&mut w);
        let err = w
            .add_part("/3d/3DMODEL.model", MODEL_CONTENT_TYPE, b"")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatePart(_)));
        assert!(w.create_part("/_rels/.rels", RELS_CONTENT_TYPE).is_err());
    }

    #[test]
    fn test_output_is_deterministic() {
        let build = || {
            let mut w = PackageWriter::new(Cursor::new(Vec::new()));
            minimal(&mut w);
            w.finish().unwrap().into_inner()
        };
        assert_eq!(build(), build());
    }
}
