//! Core elements: model, resources, objects, meshes, components, build, metadata

use super::context::req_index;
use super::part::{Node, PartParser, PendingMetadata, PendingResource};
use super::scope::XmlElement;
use crate::error::{Error, Result};
use crate::model::{
    BuildItem, Component, DEFAULT_METADATA_TYPE, Mesh, MeshResolution, Metadata, Object,
    ObjectContent, ObjectType, Triangle, Unit, Vertex,
};
use crate::namespaces::{Extension, PRODUCTION, SLICE, VOLUMETRIC, XML};
use crate::progress::ProgressPhase;
use tracing::debug;

pub(crate) fn open_model(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    if p.is_root {
        if let Some(unit) = p.state.opt::<Unit>(el, "unit")? {
            p.state.model.unit = unit;
        }
        if let Some(lang) = el.attr_ns(XML, "lang") {
            p.state.model.language = lang.to_string();
        }
    }
    if let Some(list) = el.attr("requiredextensions") {
        check_required_extensions(p, list)?;
    }
    Ok(Node::Model)
}

/// Every prefix listed must be bound and its extension accepted by the host
fn check_required_extensions(p: &mut PartParser<'_>, list: &str) -> Result<()> {
    for prefix in list.split_ascii_whitespace() {
        let uri = p
            .scope
            .lookup(prefix)
            .ok_or_else(|| {
                Error::InvalidXml(format!(
                    "required extension prefix '{}' is not declared",
                    prefix
                ))
            })?
            .to_string();
        match Extension::from_namespace(&uri) {
            Some(ext) if p.config.supports(ext) => {}
            Some(ext) => {
                return Err(Error::UnsupportedExtension(format!(
                    "{} ({})",
                    ext.name(),
                    uri
                )));
            }
            None if p.config.custom_namespace(&uri).is_some() => {
                p.state.used_custom.insert(uri);
            }
            None => return Err(Error::UnsupportedExtension(uri)),
        }
        debug!(prefix, "required extension accepted");
    }
    Ok(())
}

pub(crate) fn open_resources(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Model), "model")?;
    Ok(Node::Resources)
}

pub(crate) fn open_object(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resources), "resources")?;
    let (id, model_id) = p.declare(el)?;

    let mut object = Object::components();
    object.name = el.attr("name").map(str::to_string);
    object.part_number = el.attr("partnumber").map(str::to_string);
    object.thumbnail = el.attr("thumbnail").map(str::to_string);
    object.object_type = p.state.or(el, "type", ObjectType::Model)?;
    object.pid = p.reference(el, "pid")?;
    object.pindex = p.state.prop(el, "pindex")?;
    if p.config.supports(Extension::Production) {
        object.uuid = el.attr_ns(PRODUCTION, "UUID").map(str::to_string);
    }
    if p.config.supports(Extension::Slice) {
        object.slice_stack = p.reference_ns(el, SLICE, "slicestackid")?;
        object.mesh_resolution = p
            .state
            .opt_ns(el, SLICE, "meshresolution")?
            .unwrap_or(MeshResolution::default());
    }

    let mut pending = PendingResource::new(id, model_id, object);
    pending.has_content = false;
    pending.custom = p.custom_attributes(el);
    Ok(Node::Resource(Box::new(pending)))
}

fn in_object(node: &Node) -> bool {
    matches!(node, Node::Resource(_))
}

pub(crate) fn open_mesh(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_object, "object")?;
    let mut mesh = Mesh::new();
    if p.config.supports(Extension::Volumetric) {
        mesh.volume_data = p.reference_ns(el, VOLUMETRIC, "volumeid")?;
    }
    p.set_object_content("mesh", ObjectContent::Mesh(mesh))?;
    Ok(Node::Mesh)
}

pub(crate) fn open_vertices(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Mesh), "mesh")?;
    Ok(Node::Vertices)
}

pub(crate) fn open_vertex(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Vertices), "vertices")?;
    let x = p.state.coord(el, "x")?;
    let y = p.state.coord(el, "y")?;
    let z = p.state.coord(el, "z")?;
    p.mesh_mut("vertex")?.add_vertex(Vertex::new(x, y, z));
    p.state.tick(ProgressPhase::ReadMesh)?;
    Ok(Node::Leaf)
}

pub(crate) fn open_triangles(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Mesh), "mesh")?;
    Ok(Node::Triangles)
}

pub(crate) fn open_triangle(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Triangles), "triangles")?;
    let mut triangle = Triangle::new(req_index(el, "v1")?, req_index(el, "v2")?, req_index(el, "v3")?);
    triangle.pid = p.reference(el, "pid")?;
    triangle.p1 = p.state.prop(el, "p1")?;
    triangle.p2 = p.state.prop(el, "p2")?;
    triangle.p3 = p.state.prop(el, "p3")?;
    p.mesh_mut("triangle")?.add_triangle(triangle)?;
    p.state.tick(ProgressPhase::ReadMesh)?;
    Ok(Node::Leaf)
}

pub(crate) fn open_components(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_object, "object")?;
    p.set_object_content("components", ObjectContent::Components(Vec::new()))?;
    Ok(Node::Components)
}

pub(crate) fn open_component(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Components), "components")?;
    let path = production_path(p, el);
    el.require("objectid")?;
    let object = p
        .reference_in(el, "objectid", path.as_deref())?
        .ok_or_else(|| Error::missing_attribute("component", "objectid"))?;
    let mut component = Component::new(object);
    component.transform = p.state.transform(el, "transform")?;
    if p.config.supports(Extension::Production) {
        component.uuid = el.attr_ns(PRODUCTION, "UUID").map(str::to_string);
    }
    p.object_mut("component")?.push_component(component)?;
    Ok(Node::Leaf)
}

fn production_path(p: &PartParser<'_>, el: &XmlElement) -> Option<String> {
    if !p.config.supports(Extension::Production) {
        return None;
    }
    el.attr_ns(PRODUCTION, "path").map(str::to_string)
}

pub(crate) fn open_build(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Model), "model")?;
    if p.is_root {
        p.state.progress.report(0.9, ProgressPhase::ReadBuild)?;
    }
    if p.is_root && p.config.supports(Extension::Production) {
        let uuid = el.attr_ns(PRODUCTION, "UUID").map(str::to_string);
        p.state.model.set_build_uuid(uuid);
    }
    Ok(Node::Build)
}

pub(crate) fn open_item(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Build), "build")?;
    if !p.is_root {
        p.state.warn(
            2003,
            format!("build item in non-root part {} ignored", p.part),
        )?;
        return Ok(Node::Skip);
    }
    let path = production_path(p, el);
    el.require("objectid")?;
    let object = p
        .reference_in(el, "objectid", path.as_deref())?
        .ok_or_else(|| Error::missing_attribute("item", "objectid"))?;
    let mut item = BuildItem::new(object);
    item.transform = p.state.transform(el, "transform")?;
    item.part_number = el.attr("partnumber").map(str::to_string);
    if p.config.supports(Extension::Production) {
        item.uuid = el.attr_ns(PRODUCTION, "UUID").map(str::to_string);
    }
    item.custom_attributes = p.custom_attributes(el);
    Ok(Node::Item(Box::new(item)))
}

pub(crate) fn open_metadata_group(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_) | Node::Item(_)), "object or item")?;
    Ok(Node::MetadataGroup)
}

pub(crate) fn open_metadata(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Model | Node::MetadataGroup), "model or metadatagroup")?;
    let raw = el.require("name")?.trim().to_string();
    let mut entry = match raw.split_once(':') {
        Some((prefix, local)) => match p.scope.lookup(prefix) {
            Some(uri) => Metadata::namespaced(uri, local, ""),
            None => {
                p.state.warn(
                    2003,
                    format!("metadata '{}' uses an undeclared prefix", raw),
                )?;
                Metadata::new(raw.as_str(), "")
            }
        },
        None => Metadata::new(raw.as_str(), ""),
    };
    entry.preserve = matches!(el.attr("preserve").map(str::trim), Some("1" | "true"));
    entry.value_type = el
        .attr("type")
        .unwrap_or(DEFAULT_METADATA_TYPE)
        .to_string();
    Ok(Node::Metadata(Box::new(PendingMetadata {
        entry,
        text: String::new(),
    })))
}
