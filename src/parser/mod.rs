//! Reading 3MF packages into a [`Model`]
//!
//! A read opens the OPC container, loads the keystore and thumbnail, then
//! parses every non-root model part followed by the root model part. Each
//! part is parsed by a [`part::PartParser`], which dispatches elements
//! through the handler table in [`registry`]. References to ids declared
//! later in a part are resolved in two phases, so the resulting model never
//! holds a dangling reference.

mod beam_lattice;
pub(crate) mod config;
pub(crate) mod context;
mod core;
mod material;
pub(crate) mod part;
mod registry;
pub(crate) mod scope;
mod slice;
mod volumetric;

pub use config::ParserConfig;

use crate::error::{Error, Result, Warning};
use crate::keystore::{KeyStore, SecureCallbacks, xml::read_keystore};
use crate::model::{
    Attachment, Model, ROOT_MODEL_PART, ResourceKind,
};
use crate::namespaces::{
    Extension, KEYSTORE_REL_TYPE, KEYSTORE_REL_TYPE_2019_04, MODEL_REL_TYPE, TEXTURE_REL_TYPE,
    THUMBNAIL_REL_TYPE,
};
use crate::opc::{Package, part_key};
use crate::progress::{ProgressMonitor, ProgressPhase};
use context::ReadState;
use part::PartParser;
use std::io::{Read, Seek};
use tracing::{debug, info};

/// A successfully read model and the non-fatal issues met on the way
#[derive(Debug)]
pub struct ReadOutput {
    /// The model
    pub model: Model,
    /// Warnings in document order
    pub warnings: Vec<Warning>,
}

/// Read a 3MF package
///
/// The progress callback and secure content callbacks registered on
/// `config` are used for this read and handed back afterwards, whether or
/// not the read succeeds.
pub fn read_3mf<R: Read + Seek>(reader: R, config: &mut ParserConfig) -> Result<ReadOutput> {
    run(config, |state, config| read_package(state, reader, config))
}

/// Read a bare model document as the root part `/3D/3dmodel.model`
///
/// Attachments and secure content are not available without a package.
#[doc(hidden)]
pub fn read_model_xml(xml: &[u8], config: &mut ParserConfig) -> Result<ReadOutput> {
    run(config, |state, config| {
        parse_part(state, config, ROOT_MODEL_PART, xml, true)?;
        finish(state, config)
    })
}

fn run(
    config: &mut ParserConfig,
    read: impl FnOnce(&mut ReadState, &mut ParserConfig) -> Result<()>,
) -> Result<ReadOutput> {
    let monitor = ProgressMonitor::new(config.progress.take());
    let mut state = ReadState::new(config.strict(), monitor);
    let result = read(&mut state, config);
    config.progress = std::mem::take(&mut state.progress).into_callback();
    result?;
    info!(
        resources = state.model.resource_count(),
        items = state.model.build().items().len(),
        warnings = state.warnings.len(),
        "read model"
    );
    Ok(ReadOutput {
        model: state.model,
        warnings: state.warnings,
    })
}

fn read_package<R: Read + Seek>(
    state: &mut ReadState,
    reader: R,
    config: &mut ParserConfig,
) -> Result<()> {
    state.progress.set_range(0.0, 0.1);
    state.progress.report(0.0, ProgressPhase::ExtractPackage)?;
    let mut package = Package::open(reader)?;
    let root = package.root_model_path().to_string();
    debug!(root = %root, parts = package.part_names().len(), "opened package");
    // Root resources always live under the canonical root part name in memory.
    if part_key(&root) != part_key(ROOT_MODEL_PART) && package.has_part(ROOT_MODEL_PART) {
        return Err(Error::InvalidPackage(format!(
            "{} is not the root model but {} is",
            ROOT_MODEL_PART, root
        )));
    }

    read_keystore_part(state, &mut package, config)?;
    read_thumbnail(state, &mut package, &mut config.secure)?;

    let mut model_parts: Vec<String> = Vec::new();
    for rel in package.relationships_of(&root)? {
        if rel.rel_type == MODEL_REL_TYPE {
            let key = part_key(&rel.target);
            if key != part_key(&root) && !model_parts.iter().any(|p| part_key(p) == key) {
                model_parts.push(rel.target);
            }
        } else if !package.has_part(&rel.target) {
            state.warn(
                1003,
                format!("relationship {} targets missing part {}", rel.id, rel.target),
            )?;
        } else if state.model.attachment(&rel.target).is_none() {
            let attachment = load_attachment(
                &mut package,
                &mut config.secure,
                &mut state.model.keystore,
                &rel.target,
                &rel.rel_type,
            )?;
            state.model.add_attachment(attachment)?;
        }
    }

    // Parts are decrypted up front; parsing only needs shared access to the config.
    let mut sources = Vec::with_capacity(model_parts.len());
    for part in model_parts {
        let data = load_part(&mut package, &mut config.secure, &mut state.model.keystore, &part)?;
        sources.push((part, data));
    }
    let root_data = load_part(&mut package, &mut config.secure, &mut state.model.keystore, &root)?;

    let count = sources.len().max(1) as f64;
    for (i, (part, data)) in sources.iter().enumerate() {
        let start = 0.1 + 0.3 * i as f64 / count;
        state.progress.set_range(start, start + 0.3 / count);
        state.progress.report(0.0, ProgressPhase::ReadNonRootModels)?;
        parse_part(state, config, part, data, false)?;
    }
    state.progress.set_range(0.4, 0.9);
    state.progress.report(0.0, ProgressPhase::ReadRootModel)?;
    parse_part(state, config, ROOT_MODEL_PART, &root_data, true)?;

    state.progress.set_range(0.9, 1.0);
    state.progress.report(0.0, ProgressPhase::ReadAttachments)?;
    load_images(state, &mut package, &mut config.secure)?;
    finish(state, config)
}

fn parse_part(
    state: &mut ReadState,
    config: &ParserConfig,
    part: &str,
    data: &[u8],
    is_root: bool,
) -> Result<()> {
    let declared = PartParser::new(state, config, part, is_root).parse(data)?;
    debug!(part, resources = declared.len(), is_root, "parsed model part");
    if let Some((path, id)) = state.ids.unresolved(Some(part)) {
        return Err(Error::DanglingReference(format!(
            "resource {} is referenced but never declared in {}",
            id, path
        )));
    }
    Ok(())
}

fn finish(state: &mut ReadState, config: &ParserConfig) -> Result<()> {
    if let Some((path, id)) = state.ids.unresolved(None) {
        return Err(Error::DanglingReference(format!(
            "resource {} is referenced but never declared in {}",
            id, path
        )));
    }
    state.model.validate_references()?;
    check_property_indices(state)?;
    state.model.custom_namespaces = config
        .custom_namespaces()
        .iter()
        .filter(|ns| state.used_custom.contains(&ns.uri))
        .cloned()
        .collect();
    state.progress.set_range(0.0, 1.0);
    state.progress.report(1.0, ProgressPhase::Done)
}

fn read_keystore_part<R: Read + Seek>(
    state: &mut ReadState,
    package: &mut Package<R>,
    config: &ParserConfig,
) -> Result<()> {
    let target = package
        .root_relationships()
        .iter()
        .find(|r| r.rel_type == KEYSTORE_REL_TYPE || r.rel_type == KEYSTORE_REL_TYPE_2019_04)
        .map(|r| r.target.clone());
    let Some(target) = target else {
        return Ok(());
    };
    if !config.supports(Extension::SecureContent) {
        return state.warn(
            4001,
            format!("keystore {} ignored, secure content is disabled", target),
        );
    }
    state.progress.report(0.5, ProgressPhase::ReadKeyStore)?;
    let store = read_keystore(&package.read_part(&target)?)?;
    debug!(
        part = %target,
        consumers = store.consumers().len(),
        groups = store.groups().len(),
        "read keystore"
    );
    state.model.keystore = Some(store);
    Ok(())
}

fn read_thumbnail<R: Read + Seek>(
    state: &mut ReadState,
    package: &mut Package<R>,
    secure: &mut SecureCallbacks,
) -> Result<()> {
    let target = package
        .root_relationships()
        .iter()
        .find(|r| r.rel_type == THUMBNAIL_REL_TYPE)
        .map(|r| r.target.clone());
    if let Some(target) = target {
        let thumbnail = load_attachment(
            package,
            secure,
            &mut state.model.keystore,
            &target,
            THUMBNAIL_REL_TYPE,
        )?;
        state.model.thumbnail = Some(thumbnail);
    }
    Ok(())
}

/// Bytes of a part, decrypted when the keystore protects it
fn load_part<R: Read + Seek>(
    package: &mut Package<R>,
    secure: &mut SecureCallbacks,
    keystore: &mut Option<KeyStore>,
    path: &str,
) -> Result<Vec<u8>> {
    let data = package.read_part(path)?;
    match keystore {
        Some(store) if store.is_protected(path) => secure.decrypt_part(store, path, &data),
        _ => Ok(data),
    }
}

fn load_attachment<R: Read + Seek>(
    package: &mut Package<R>,
    secure: &mut SecureCallbacks,
    keystore: &mut Option<KeyStore>,
    path: &str,
    rel_type: &str,
) -> Result<Attachment> {
    let data = load_part(package, secure, keystore, path)?;
    let mut attachment = Attachment::new(path, rel_type, data);
    if let Some(content_type) = package.content_type(path) {
        attachment.content_type = content_type.to_string();
    }
    Ok(attachment)
}

/// Attach texture and image stack sheets that no relationship pulled in
fn load_images<R: Read + Seek>(
    state: &mut ReadState,
    package: &mut Package<R>,
    secure: &mut SecureCallbacks,
) -> Result<()> {
    let mut paths: Vec<String> = Vec::new();
    for resource in state.model.resources() {
        match &resource.kind {
            ResourceKind::Texture2D(texture) => paths.push(texture.path.clone()),
            ResourceKind::Image3D(image) => paths.extend(image.sheets.iter().cloned()),
            _ => {}
        }
    }
    for path in paths {
        if state.model.attachment(&path).is_some() {
            continue;
        }
        if !package.has_part(&path) {
            state.warn(1003, format!("image part {} is missing from the package", path))?;
            continue;
        }
        let attachment = load_attachment(
            package,
            secure,
            &mut state.model.keystore,
            &path,
            TEXTURE_REL_TYPE,
        )?;
        state.model.add_attachment(attachment)?;
        state.progress.tick(ProgressPhase::ReadAttachments)?;
    }
    Ok(())
}

/// Warn about property indices beyond the size of their group
/// Warn about property indices past the end of their group
///
/// The offending references are dropped so the model read back can be
/// written again.
fn check_property_indices(state: &mut ReadState) -> Result<()> {
    let mut out_of_range = Vec::new();
    for (holder, pid, p) in state.model.property_uses() {
        if !matches!(state.model.resource(holder)?.kind, ResourceKind::Object(_)) {
            continue;
        }
        let kind = &state.model.resource(pid)?.kind;
        if let Some(count) = kind.property_count()
            && kind.property_index(p).is_none()
            && !out_of_range.contains(&(holder, pid, p))
        {
            out_of_range.push((holder, pid, p));
            state.warn(
                3010,
                format!(
                    "object {} uses property index {} of resource {} holding {} entries",
                    holder,
                    p.0.saturating_sub(1),
                    pid,
                    count
                ),
            )?;
        }
    }
    for (holder, pid, p) in out_of_range {
        state.model.clear_property_use(holder, pid, p);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::{MODEL_CONTENT_TYPE, PNG_CONTENT_TYPE};
    use crate::opc::PackageWriter;
    use std::io::Cursor;
    use std::ops::ControlFlow;
    use std::sync::{Arc, Mutex};

    const TRIANGLE: &str = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" unit="millimeter">
<resources><object id="1"><mesh>
<vertices><vertex x="0" y="0" z="0"/><vertex x="1" y="0" z="0"/><vertex x="0" y="1" z="0"/></vertices>
<triangles><triangle v1="0" v2="1" v3="2"/></triangles>
</mesh></object></resources>
<build><item objectid="1"/></build></model>"#;

    fn package(parts: &[(&str, &str, &[u8])], rels: &[(Option<&str>, &str, &str)]) -> Vec<u8> {
        let mut writer = PackageWriter::new(Cursor::new(Vec::new()));
        for (name, content_type, data) in parts {
            writer.add_part(name, content_type, data).unwrap();
        }
        for (source, rel_type, target) in rels {
            writer.add_relationship(*source, rel_type, target);
        }
        writer.finish().unwrap().into_inner()
    }

    fn single_part(xml: &str) -> Vec<u8> {
        package(
            &[("/3D/3dmodel.model", MODEL_CONTENT_TYPE, xml.as_bytes())],
            &[(None, MODEL_REL_TYPE, "/3D/3dmodel.model")],
        )
    }

    #[test]
    fn test_read_single_part() {
        let data = single_part(TRIANGLE);
        let out = read_3mf(Cursor::new(data), &mut ParserConfig::new()).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.model.resource_count(), 1);
        assert_eq!(out.model.build().items.len(), 1);
    }

    #[test]
    fn test_non_root_part_read_first() {
        let lib = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02"><resources><object id="5"><mesh>
<vertices><vertex x="0" y="0" z="0"/><vertex x="1" y="0" z="0"/><vertex x="0" y="1" z="0"/></vertices>
<triangles><triangle v1="0" v2="1" v3="2"/></triangles></mesh></object></resources><build/></model>"#;
        let root = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:p="http://schemas.microsoft.com/3dmanufacturing/production/2015/06" requiredextensions="p">
<resources><object id="1"><components><component objectid="5" p:path="/3D/lib.model"/></components></object></resources>
<build><item objectid="1"/></build></model>"#;
        let data = package(
            &[
                ("/3D/3dmodel.model", MODEL_CONTENT_TYPE, root.as_bytes()),
                ("/3D/lib.model", MODEL_CONTENT_TYPE, lib.as_bytes()),
            ],
            &[
                (None, MODEL_REL_TYPE, "/3D/3dmodel.model"),
                (Some("/3D/3dmodel.model"), MODEL_REL_TYPE, "/3D/lib.model"),
            ],
        );
        let out = read_3mf(Cursor::new(data), &mut ParserConfig::new()).unwrap();
        let model = &out.model;
        let child = model.find_by_model_id("/3D/lib.model", 5).unwrap();
        let parent = model
            .object(model.find_by_model_id("/3D/3dmodel.model", 1).unwrap())
            .unwrap();
        assert_eq!(parent.component_list()[0].object, child);
    }

    #[test]
    fn test_reference_to_unread_part_is_dangling() {
        let root = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:p="http://schemas.microsoft.com/3dmanufacturing/production/2015/06">
<resources><object id="1"><components><component objectid="5" p:path="/3D/missing.model"/></components></object></resources>
<build/></model>"#;
        let err = read_3mf(Cursor::new(single_part(root)), &mut ParserConfig::new())
            .err()
            .unwrap();
        assert_eq!(err.code(), 3005);
    }

    #[test]
    fn test_texture_attachment_loaded_by_path() {
        let xml = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:m="http://schemas.microsoft.com/3dmanufacturing/material/2015/02">
<resources><m:texture2d id="1" path="/3D/Textures/a.png" contenttype="image/png"/>
<m:texture2d id="2" path="/3D/Textures/gone.png" contenttype="image/png"/></resources><build/></model>"#;
        let data = package(
            &[
                ("/3D/3dmodel.model", MODEL_CONTENT_TYPE, xml.as_bytes()),
                ("/3D/Textures/a.png", PNG_CONTENT_TYPE, b"png"),
            ],
            &[(None, MODEL_REL_TYPE, "/3D/3dmodel.model")],
        );
        let out = read_3mf(Cursor::new(data), &mut ParserConfig::new()).unwrap();
        let attachment = out.model.attachment("/3D/Textures/a.png").unwrap();
        assert_eq!(attachment.data, b"png");
        assert_eq!(attachment.relationship_type, TEXTURE_REL_TYPE);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, 1003);
    }

    #[test]
    fn test_property_index_out_of_range_warns() {
        let xml = r##"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
<resources><basematerials id="2"><base name="A" displaycolor="#FF0000"/></basematerials>
<object id="1" pid="2" pindex="4"><mesh>
<vertices><vertex x="0" y="0" z="0"/><vertex x="1" y="0" z="0"/><vertex x="0" y="1" z="0"/></vertices>
<triangles><triangle v1="0" v2="1" v3="2" p1="0" p2="7"/></triangles></mesh></object></resources>
<build><item objectid="1"/></build></model>"##;
        let out = read_model_xml(xml.as_bytes(), &mut ParserConfig::new()).unwrap();
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings.iter().all(|w| w.code == 3010));

        // The bad indices are dropped, so the model can be written back.
        let id = out.model.build().items()[0].object;
        let object = out.model.object(id).unwrap();
        assert_eq!(object.pid.map(|_| ()), Some(()));
        assert_eq!(object.pindex, None);
        let t = out.model.mesh(id).unwrap().triangles()[0];
        assert_eq!((t.p1, t.p2), (None, None));
        let again = crate::writer::write_model_xml(&out.model, &crate::WriterConfig::new()).unwrap();
        read_model_xml(&again, &mut ParserConfig::new().with_strict_mode(true)).unwrap();

        let err = read_model_xml(xml.as_bytes(), &mut ParserConfig::new().with_strict_mode(true))
            .err()
            .unwrap();
        assert_eq!(err.code(), 3010);
    }

    #[test]
    fn test_progress_reaches_done_and_callback_returns() {
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        let mut config = ParserConfig::new().with_progress(Box::new(move |_, phase| {
            sink.lock().unwrap().push(phase);
            ControlFlow::Continue(())
        }));
        read_3mf(Cursor::new(single_part(TRIANGLE)), &mut config).unwrap();
        let seen = phases.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&ProgressPhase::ExtractPackage));
        assert_eq!(seen.last(), Some(&ProgressPhase::Done));
        assert!(seen.contains(&ProgressPhase::ReadRootModel));
        assert!(config.progress.is_some());
    }

    #[test]
    fn test_abort_from_progress_callback() {
        let mut config =
            ParserConfig::new().with_progress(Box::new(|_, _| ControlFlow::Break(())));
        let err = read_3mf(Cursor::new(single_part(TRIANGLE)), &mut config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::CalculationAborted));
        assert!(config.progress.is_some());
    }
}
