//! Host-facing readers and writers selected by format name
//!
//! [`query_reader`] and [`query_writer`] accept `"3mf"` and `"stl"`. A
//! reader keeps the warnings of its last read and only replaces the target
//! model once a read has fully succeeded.
//!
//! ```
//! use lib3mf_engine::format::{query_reader, query_writer};
//! use lib3mf_engine::model::{BuildItem, Mesh, Model, Object, Triangle, Vertex};
//!
//! # fn main() -> lib3mf_engine::Result<()> {
//! let mut mesh = Mesh::new();
//! mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
//! mesh.add_vertex(Vertex::new(1.0, 0.0, 0.0));
//! mesh.add_vertex(Vertex::new(0.0, 1.0, 0.0));
//! mesh.add_triangle(Triangle::new(0, 1, 2))?;
//! let mut model = Model::new();
//! let id = model.add_resource(Object::mesh(mesh))?;
//! model.add_build_item(BuildItem::new(id))?;
//!
//! let bytes = query_writer("3mf")?.write_to_buffer(&model)?;
//! let mut copy = Model::new();
//! let mut reader = query_reader("3mf")?;
//! reader.read_from_buffer(&mut copy, &bytes)?;
//! assert!(reader.warnings().is_empty());
//! assert_eq!(copy.resource_count(), 1);
//! assert!(query_reader("obj").is_err());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result, Warning};
use crate::keystore::{ContentCipher, KeyWrapper};
use crate::model::Model;
use crate::parser::{ParserConfig, read_3mf};
use crate::progress::ProgressCallback;
use crate::stl::{read_stl, write_stl};
use crate::writer::{WriterConfig, write_3mf};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;

/// File formats the engine can read and write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 3MF package
    ThreeMf,
    /// Stereolithography mesh
    Stl,
}

impl Format {
    /// Format registered under `name`, compared case-insensitively
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "3mf" => Ok(Format::ThreeMf),
            "stl" => Ok(Format::Stl),
            _ => Err(Error::UnknownFormat(name.to_string())),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Format::ThreeMf => "3mf",
            Format::Stl => "stl",
        }
    }
}

/// Reader for a format name
pub fn query_reader(name: &str) -> Result<ModelReader> {
    Ok(ModelReader::new(Format::from_name(name)?))
}

/// Writer for a format name
pub fn query_writer(name: &str) -> Result<ModelWriter> {
    Ok(ModelWriter::new(Format::from_name(name)?))
}

/// Reads files of one format into a [`Model`]
#[derive(Debug)]
pub struct ModelReader {
    format: Format,
    config: ParserConfig,
    warnings: Vec<Warning>,
}

impl ModelReader {
    /// Reader with the default configuration
    pub fn new(format: Format) -> Self {
        Self {
            format,
            config: ParserConfig::new(),
            warnings: Vec::new(),
        }
    }

    /// Format read by this reader
    pub fn format(&self) -> Format {
        self.format
    }

    /// Parser configuration, for extension and namespace settings
    pub fn config_mut(&mut self) -> &mut ParserConfig {
        &mut self.config
    }

    /// Promote warnings to errors
    pub fn set_strict_mode_active(&mut self, strict: bool) {
        self.config.set_strict_mode(strict);
    }

    /// Whether warnings are fatal
    pub fn strict_mode_active(&self) -> bool {
        self.config.strict()
    }

    /// Register the progress callback
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.config.progress = Some(callback);
    }

    /// Register the key wrapper for a consumer
    pub fn add_key_wrapper(&mut self, consumer_id: impl Into<String>, wrapper: Box<dyn KeyWrapper>) {
        self.config.secure.add_key_wrapper(consumer_id, wrapper);
    }

    /// Register the content cipher used to decrypt protected parts
    pub fn set_content_cipher(&mut self, cipher: Box<dyn ContentCipher>) {
        self.config.secure.set_content_cipher(cipher);
    }

    /// Warnings of the last read
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Read from a seekable stream into `model`
    ///
    /// On failure `model` is left untouched and the warnings gathered so far
    /// are discarded.
    pub fn read_from_stream<R: Read + Seek>(&mut self, model: &mut Model, reader: R) -> Result<()> {
        self.warnings.clear();
        match self.format {
            Format::ThreeMf => {
                let out = read_3mf(reader, &mut self.config)?;
                *model = out.model;
                self.warnings = out.warnings;
            }
            Format::Stl => *model = read_stl(reader)?,
        }
        debug!(
            format = self.format.name(),
            resources = model.resource_count(),
            warnings = self.warnings.len(),
            "model read"
        );
        Ok(())
    }

    /// Read from an in-memory buffer
    pub fn read_from_buffer(&mut self, model: &mut Model, data: &[u8]) -> Result<()> {
        self.read_from_stream(model, Cursor::new(data))
    }

    /// Read from a file
    pub fn read_from_file(&mut self, model: &mut Model, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        self.read_from_stream(model, BufReader::new(file))
    }
}

/// Writes a [`Model`] in one format
#[derive(Debug)]
pub struct ModelWriter {
    format: Format,
    config: WriterConfig,
}

impl ModelWriter {
    /// Writer with the default configuration
    pub fn new(format: Format) -> Self {
        Self {
            format,
            config: WriterConfig::new(),
        }
    }

    /// Format written by this writer
    pub fn format(&self) -> Format {
        self.format
    }

    /// Writer configuration
    pub fn config_mut(&mut self) -> &mut WriterConfig {
        &mut self.config
    }

    /// Decimal places of floating point output, in `1..=16`
    pub fn set_decimal_precision(&mut self, precision: usize) -> Result<()> {
        self.config.set_decimal_precision(precision)
    }

    /// Decimal places of floating point output
    pub fn decimal_precision(&self) -> usize {
        self.config.decimal_precision()
    }

    /// Register the progress callback
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.config.progress = Some(callback);
    }

    /// Register the key wrapper for a consumer
    pub fn add_key_wrapper(&mut self, consumer_id: impl Into<String>, wrapper: Box<dyn KeyWrapper>) {
        self.config.secure.add_key_wrapper(consumer_id, wrapper);
    }

    /// Register the content cipher used to encrypt protected parts
    pub fn set_content_cipher(&mut self, cipher: Box<dyn ContentCipher>) {
        self.config.secure.set_content_cipher(cipher);
    }

    /// Write to a seekable stream, handing it back
    pub fn write_to_stream<W: Write + Seek>(&mut self, model: &Model, out: W) -> Result<W> {
        match self.format {
            Format::ThreeMf => write_3mf(model, out, &mut self.config),
            Format::Stl => {
                let mut out = out;
                write_stl(model, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Write to a new buffer
    pub fn write_to_buffer(&mut self, model: &Model) -> Result<Vec<u8>> {
        Ok(self.write_to_stream(model, Cursor::new(Vec::new()))?.into_inner())
    }

    /// Write to a file, replacing it
    pub fn write_to_file(&mut self, model: &Model, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut out = self.write_to_stream(model, BufWriter::new(file))?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildItem, Mesh, Object, Triangle, Vertex};

    fn triangle_model() -> Model {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(2.0, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(0.0, 2.0, 0.0));
        mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();
        let mut model = Model::new();
        let id = model.add_resource(Object::mesh(mesh)).unwrap();
        model.add_build_item(BuildItem::new(id)).unwrap();
        model
    }

    #[test]
    fn test_format_names() {
        assert_eq!(Format::from_name("3MF").unwrap(), Format::ThreeMf);
        assert_eq!(Format::from_name("stl").unwrap().name(), "stl");
        let err = query_writer("amf").err().unwrap();
        assert_eq!(err.code(), 6002);
    }

    #[test]
    fn test_failed_read_keeps_the_model() {
        let mut model = triangle_model();
        let mut reader = query_reader("3mf").unwrap();
        assert!(reader.read_from_buffer(&mut model, b"not a zip").is_err());
        assert_eq!(model.resource_count(), 1);
    }

    #[test]
    fn test_stl_through_the_facade() {
        let bytes = query_writer("stl").unwrap().write_to_buffer(&triangle_model()).unwrap();
        let mut model = Model::new();
        query_reader("stl")
            .unwrap()
            .read_from_buffer(&mut model, &bytes)
            .unwrap();
        let id = model.build().items()[0].object;
        assert_eq!(model.mesh(id).unwrap().triangle_count(), 1);
    }

    #[test]
    fn test_writer_precision() {
        let mut writer = query_writer("3mf").unwrap();
        assert_eq!(writer.decimal_precision(), 6);
        writer.set_decimal_precision(3).unwrap();
        assert!(writer.set_decimal_precision(20).is_err());
        assert_eq!(writer.decimal_precision(), 3);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.3mf");
        query_writer("3mf")
            .unwrap()
            .write_to_file(&triangle_model(), &path)
            .unwrap();
        let mut model = Model::new();
        query_reader("3mf").unwrap().read_from_file(&mut model, &path).unwrap();
        assert_eq!(model.build().items().len(), 1);
    }
}
