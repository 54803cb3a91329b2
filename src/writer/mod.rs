//! Serialization of a [`Model`] into a 3MF package
//!
//! Every model part is streamed into the container. Parts protected by the
//! keystore are rendered to memory first and run through the content cipher.
//! Relationships and content types follow the parts that need them.

mod beam_lattice;
mod config;
mod core;
pub(crate) mod emit;
mod material;
pub(crate) mod part;
mod slice;
mod volumetric;

pub use config::{DEFAULT_DECIMAL_PRECISION, MAX_DECIMAL_PRECISION, WriterConfig};

use crate::error::{Error, Result};
use crate::keystore::xml::write_keystore;
use crate::keystore::{KEYSTORE_PART, KeyStore};
use crate::model::{Attachment, Model, ObjectContent, ROOT_MODEL_PART, ResourceKind};
use crate::namespaces::{
    KEYSTORE_CONTENT_TYPE, KEYSTORE_REL_TYPE, MODEL_CONTENT_TYPE, MODEL_REL_TYPE,
    THUMBNAIL_REL_TYPE,
};
use crate::opc::PackageWriter;
use crate::progress::{ProgressMonitor, ProgressPhase};
use part::PartWriter;
use std::io::{BufWriter, Seek, Write};
use tracing::{debug, info};

/// Write `model` as a 3MF package to `out`
///
/// The model is checked before anything is written: dangling references,
/// component cycles, duplicate build item UUIDs and references crossing
/// part boundaries in ways the Production extension does not allow all fail
/// the call. The progress callback of `config` is handed back when the call
/// returns, whether it succeeded or not.
///
/// # Example
///
/// ```
/// use lib3mf_engine::model::{BuildItem, Mesh, Model, Object, Triangle, Vertex};
/// use lib3mf_engine::writer::{WriterConfig, write_3mf};
/// use std::io::Cursor;
///
/// # fn main() -> lib3mf_engine::Result<()> {
/// let mut mesh = Mesh::new();
/// mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
/// mesh.add_vertex(Vertex::new(1.0, 0.0, 0.0));
/// mesh.add_vertex(Vertex::new(0.0, 1.0, 0.0));
/// mesh.add_triangle(Triangle::new(0, 1, 2))?;
/// let mut model = Model::new();
/// let id = model.add_resource(Object::mesh(mesh))?;
/// model.add_build_item(BuildItem::new(id))?;
///
/// let bytes = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())?.into_inner();
/// assert!(bytes.starts_with(b"PK"));
/// # Ok(())
/// # }
/// ```
pub fn write_3mf<W: Write + Seek>(model: &Model, out: W, config: &mut WriterConfig) -> Result<W> {
    let mut progress = ProgressMonitor::new(config.progress.take());
    let result = write_package(model, out, config, &mut progress);
    config.progress = progress.into_callback();
    result
}

/// Root model part as XML, without any package around it
#[doc(hidden)]
pub fn write_model_xml(model: &Model, config: &WriterConfig) -> Result<Vec<u8>> {
    let mut progress = ProgressMonitor::default();
    part::write_part_xml(model, ROOT_MODEL_PART, config.decimal_precision(), &mut progress)
}

fn write_package<W: Write + Seek>(
    model: &Model,
    out: W,
    config: &mut WriterConfig,
    progress: &mut ProgressMonitor,
) -> Result<W> {
    check_model(model)?;
    let mut keystore = model.keystore.clone();
    if let Some(store) = keystore.as_mut() {
        config.secure.establish_keys(store)?;
    }

    let mut package = PackageWriter::new(out);
    let precision = config.decimal_precision();
    let parts = model.parts();
    let count = parts.len() as f64;
    for (i, part) in parts.iter().enumerate() {
        progress.set_range(0.8 * i as f64 / count, 0.8 * (i + 1) as f64 / count);
        progress.report(0.0, ProgressPhase::WriteModels)?;
        if is_protected(&keystore, part) {
            let xml = part::write_part_xml(model, part, precision, progress)?;
            let data = protect(config, &mut keystore, part, xml)?;
            package.add_part(part, MODEL_CONTENT_TYPE, &data)?;
        } else {
            let sink = BufWriter::new(package.create_part(part, MODEL_CONTENT_TYPE)?);
            PartWriter::new(model, part, sink, precision, progress)
                .write()?
                .flush()?;
        }
        debug!(part = %part, "wrote model part");
    }

    package.add_relationship(None, MODEL_REL_TYPE, ROOT_MODEL_PART);
    for part in parts.iter().filter(|p| p.as_str() != ROOT_MODEL_PART) {
        package.add_relationship(Some(ROOT_MODEL_PART), MODEL_REL_TYPE, part);
    }

    progress.set_range(0.8, 0.9);
    progress.report(0.0, ProgressPhase::WriteAttachments)?;
    if let Some(thumbnail) = &model.thumbnail {
        write_attachment(&mut package, config, &mut keystore, thumbnail)?;
        package.add_relationship(None, THUMBNAIL_REL_TYPE, &thumbnail.path);
    }
    for attachment in &model.attachments {
        write_attachment(&mut package, config, &mut keystore, attachment)?;
        package.add_relationship(
            Some(ROOT_MODEL_PART),
            &attachment.relationship_type,
            &attachment.path,
        );
        progress.tick(ProgressPhase::WriteAttachments)?;
    }

    progress.set_range(0.9, 0.95);
    if let Some(store) = keystore.as_ref().filter(|s| !s.is_empty()) {
        progress.report(0.0, ProgressPhase::WriteKeyStore)?;
        package.add_part(KEYSTORE_PART, KEYSTORE_CONTENT_TYPE, &write_keystore(store)?)?;
        package.add_relationship(None, KEYSTORE_REL_TYPE, KEYSTORE_PART);
    }

    progress.set_range(0.95, 1.0);
    progress.report(0.0, ProgressPhase::WritePackage)?;
    let out = package.finish()?;
    info!(
        parts = parts.len(),
        resources = model.resource_count(),
        attachments = model.attachments.len(),
        "wrote package"
    );
    progress.set_range(0.0, 1.0);
    progress.report(1.0, ProgressPhase::Done)?;
    Ok(out)
}

fn write_attachment<W: Write + Seek>(
    package: &mut PackageWriter<W>,
    config: &mut WriterConfig,
    keystore: &mut Option<KeyStore>,
    attachment: &Attachment,
) -> Result<()> {
    let data = if is_protected(keystore, &attachment.path) {
        protect(config, keystore, &attachment.path, attachment.data.clone())?
    } else {
        attachment.data.clone()
    };
    package.add_part(&attachment.path, &attachment.content_type, &data)
}

fn is_protected(keystore: &Option<KeyStore>, path: &str) -> bool {
    keystore.as_ref().is_some_and(|s| s.is_protected(path))
}

fn protect(
    config: &mut WriterConfig,
    keystore: &mut Option<KeyStore>,
    path: &str,
    data: Vec<u8>,
) -> Result<Vec<u8>> {
    match keystore {
        Some(store) if store.is_protected(path) => config.secure.encrypt_part(store, path, data),
        _ => Ok(data),
    }
}

/// Reject models that cannot be written as a valid package
///
/// Resources of a non-root part may only refer to their own part. Root
/// resources may reach into other parts through components and slice
/// references only; build items may refer to any part.
fn check_model(model: &Model) -> Result<()> {
    model.validate_references()?;
    for res in model.resources() {
        let crossing: Vec<_> = match &res.kind {
            ResourceKind::Object(obj) => match obj.content() {
                ObjectContent::Components(list) => list.iter().map(|c| c.object).collect(),
                _ => Vec::new(),
            },
            ResourceKind::SliceStack(stack) => stack.slice_refs().to_vec(),
            _ => Vec::new(),
        };
        let is_root = res.part() == ROOT_MODEL_PART;
        for dep in res.kind.references() {
            let target = model.resource(dep)?;
            if target.part() == res.part() || (is_root && crossing.contains(&dep)) {
                continue;
            }
            return Err(Error::InvalidModel(format!(
                "{} {} in {} refers to {} {} in {}",
                res.kind.type_name(),
                res.model_id(),
                res.part(),
                target.kind.type_name(),
                target.model_id(),
                target.part()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{Compression, Consumer, EncryptionAlgorithm, KekParams};
    use crate::model::{BuildItem, Component, Mesh, Object, Triangle, Vertex};
    use crate::namespaces::TEXTURE_REL_TYPE;
    use crate::parser::{ParserConfig, read_3mf};
    use std::io::Cursor;
    use std::ops::ControlFlow;
    use std::sync::{Arc, Mutex};

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        for [x, y, z] in [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]] {
            mesh.add_vertex(Vertex::new(x, y, z));
        }
        for [a, b, c] in [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]] {
            mesh.add_triangle(Triangle::new(a, b, c)).unwrap();
        }
        mesh
    }

    fn single_object() -> Model {
        let mut model = Model::new();
        let id = model.add_resource(Object::mesh(tetrahedron())).unwrap();
        model.add_build_item(BuildItem::new(id)).unwrap();
        model
    }

    fn write(model: &Model) -> Vec<u8> {
        write_3mf(model, Cursor::new(Vec::new()), &mut WriterConfig::new())
            .unwrap()
            .into_inner()
    }

    fn read(bytes: Vec<u8>) -> Model {
        read_3mf(Cursor::new(bytes), &mut ParserConfig::new()).unwrap().model
    }

    #[test]
    fn test_mesh_survives_a_round_trip() {
        let model = single_object();
        let back = read(write(&model));
        assert_eq!(back.resource_count(), 1);
        let id = back.build().items()[0].object;
        let mesh = back.mesh(id).unwrap();
        assert_eq!(mesh.vertices(), tetrahedron().vertices());
        assert_eq!(mesh.triangles(), tetrahedron().triangles());
    }

    #[test]
    fn test_output_is_deterministic() {
        let model = single_object();
        assert_eq!(write(&model), write(&model));
    }

    #[test]
    fn test_components_in_another_part() {
        let mut model = Model::new();
        let leaf = model
            .add_resource_in_part("/3D/parts/leaf.model", Object::mesh(tetrahedron()))
            .unwrap();
        let assembly = model.add_resource(Object::components()).unwrap();
        model.add_component(assembly, Component::new(leaf)).unwrap();
        model.add_build_item(BuildItem::new(assembly)).unwrap();

        let back = read(write(&model));
        assert_eq!(back.parts(), vec![ROOT_MODEL_PART.to_string(), "/3D/parts/leaf.model".to_string()]);
        let item = &back.build().items()[0];
        let components = back.object(item.object).unwrap().component_list();
        assert_eq!(components.len(), 1);
        assert_eq!(back.resource(components[0].object).unwrap().part(), "/3D/parts/leaf.model");
    }

    #[test]
    fn test_non_root_part_cannot_reach_other_parts() {
        let mut model = Model::new();
        let leaf = model.add_resource(Object::mesh(tetrahedron())).unwrap();
        let assembly = model
            .add_resource_in_part("/3D/parts/asm.model", Object::components())
            .unwrap();
        model.add_component(assembly, Component::new(leaf)).unwrap();
        let err = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())
            .err()
            .unwrap();
        assert_eq!(err.code(), 3001);
    }

    #[test]
    fn test_attachment_and_thumbnail_round_trip() {
        let mut model = single_object();
        model.thumbnail = Some(Attachment::new(
            "/Metadata/thumbnail.png",
            THUMBNAIL_REL_TYPE,
            vec![0x89, b'P', b'N', b'G'],
        ));
        model
            .add_attachment(Attachment::new("/3D/Textures/grain.png", TEXTURE_REL_TYPE, vec![1, 2, 3]))
            .unwrap();

        let back = read(write(&model));
        assert_eq!(back.thumbnail.as_ref().unwrap().data, vec![0x89, b'P', b'N', b'G']);
        let grain = back.attachment("/3D/Textures/grain.png").unwrap();
        assert_eq!(grain.data, vec![1, 2, 3]);
        assert_eq!(grain.content_type, "image/png");
    }

    #[test]
    fn test_progress_phases_and_abort() {
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        let mut config = WriterConfig::new().with_progress(Box::new(move |_, phase| {
            sink.lock().unwrap().push(phase);
            ControlFlow::Continue(())
        }));
        write_3mf(&single_object(), Cursor::new(Vec::new()), &mut config).unwrap();
        let seen = phases.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&ProgressPhase::WriteModels));
        assert_eq!(seen.last(), Some(&ProgressPhase::Done));
        assert!(config.progress.is_some());

        let mut config = WriterConfig::new().with_progress(Box::new(|_, _| ControlFlow::Break(())));
        let err = write_3mf(&single_object(), Cursor::new(Vec::new()), &mut config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::CalculationAborted));
        assert!(config.progress.is_some());
    }

    #[test]
    fn test_protected_part_needs_a_cipher() {
        let mut model = single_object();
        let mut store = KeyStore::new();
        store.add_consumer(Consumer::new("printer")).unwrap();
        let group = store.add_resource_data_group();
        store
            .add_access_right(&group, "printer", KekParams::default())
            .unwrap();
        store
            .add_resource_data(
                &group,
                ROOT_MODEL_PART,
                EncryptionAlgorithm::Aes256Gcm,
                Compression::Deflate,
                Vec::new(),
            )
            .unwrap();
        model.keystore = Some(store);
        let err = write_3mf(&model, Cursor::new(Vec::new()), &mut WriterConfig::new())
            .err()
            .unwrap();
        assert_eq!(err.code(), 5002);
    }

    #[test]
    fn test_model_xml_uses_precision() {
        let mut model = Model::new();
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(1.0 / 3.0, 0.0, 0.0));
        model.add_resource(Object::mesh(mesh)).unwrap();
        let config = WriterConfig::new().with_decimal_precision(2).unwrap();
        let xml = String::from_utf8(write_model_xml(&model, &config).unwrap()).unwrap();
        assert!(xml.contains(r#"<vertex x="0.33" y="0" z="0"/>"#));
    }
}
