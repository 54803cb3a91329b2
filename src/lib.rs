//! # lib3mf-engine
//!
//! Reading and writing 3MF (3D Manufacturing Format) packages.
//!
//! A 3MF file is a ZIP container following the Open Packaging Conventions
//! (OPC). It holds one root model part, optional further model parts
//! (Production extension), binary attachments such as textures and
//! thumbnails, and an optional keystore describing encrypted parts.
//!
//! ## Features
//!
//! - Pure Rust with no unsafe code
//! - Resource graph with checked references, acyclic components and stable ids
//! - Core, Materials, Production, Slice, Beam Lattice (with balls),
//!   Volumetric, Implicit and Secure Content extensions
//! - Namespace-dispatching streaming reader with warnings and strict mode
//! - Writer with per-part namespace declarations and configurable precision
//! - Key wrapping and content encryption through host callbacks
//! - STL import and export
//!
//! ## Example
//!
//! ```
//! use lib3mf_engine::{Model, ParserConfig, WriterConfig, read_3mf, write_3mf};
//! use lib3mf_engine::model::{BuildItem, Mesh, Object, Triangle, Vertex};
//! use std::io::Cursor;
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
//! let package = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())?;
//! let read = read_3mf(Cursor::new(package.into_inner()), &mut ParserConfig::new())?;
//! assert_eq!(read.model.build().items().len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod format;
pub mod keystore;
pub mod model;
pub mod namespaces;
pub mod opc;
pub mod parser;
pub mod progress;
pub mod stl;
pub mod writer;

pub use error::{Error, Result, Warning};
pub use format::{Format, ModelReader, ModelWriter, query_reader, query_writer};
pub use keystore::{ContentCipher, KeyStore, KeyWrapper};
pub use model::{Model, ResourceId, Unit};
pub use namespaces::Extension;
pub use parser::{ParserConfig, ReadOutput, read_3mf};
pub use progress::{ProgressCallback, ProgressPhase};
pub use writer::{WriterConfig, write_3mf};
