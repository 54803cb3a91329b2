//! Core elements: objects, meshes, components and the build

use super::part::PartWriter;
use super::{beam_lattice, volumetric};
use crate::error::Result;
use crate::model::{Component, Mesh, MeshResolution, Object, ObjectContent, Resource};
use crate::namespaces::Extension;
use crate::progress::ProgressPhase;
use quick_xml::events::BytesStart;
use std::io::Write;

pub(super) fn write_object<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    object: &Object,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Core, "object", res);
    elem.push_attribute(("type", object.object_type.as_str()));
    if let Some(name) = &object.name {
        elem.push_attribute(("name", name.as_str()));
    }
    if let Some(part_number) = &object.part_number {
        elem.push_attribute(("partnumber", part_number.as_str()));
    }
    if let Some(thumbnail) = &object.thumbnail {
        elem.push_attribute(("thumbnail", thumbnail.as_str()));
    }
    if let Some(pid) = object.pid {
        elem.push_attribute(("pid", w.id_of(pid)?.as_str()));
    }
    if let Some(pindex) = object.pindex {
        elem.push_attribute(("pindex", w.property_index(object.pid, pindex)?.as_str()));
    }
    if let Some(uuid) = &object.uuid {
        elem.push_attribute(("p:UUID", uuid.as_str()));
    }
    if let Some(stack) = object.slice_stack {
        elem.push_attribute(("s:slicestackid", w.id_of(stack)?.as_str()));
    }
    if object.mesh_resolution != MeshResolution::FullRes {
        elem.push_attribute(("s:meshresolution", object.mesh_resolution.as_str()));
    }

    w.resource_element(elem, res, true, |w| {
        match object.content() {
            ObjectContent::Mesh(mesh) => write_mesh(w, object, mesh)?,
            ObjectContent::Components(list) => write_components(w, list)?,
            ObjectContent::LevelSet(level_set) => volumetric::write_level_set(w, level_set)?,
        }
        w.metadata_group(&object.metadata)
    })
}

fn write_mesh<W: Write>(w: &mut PartWriter<'_, W>, object: &Object, mesh: &Mesh) -> Result<()> {
    let mut elem = BytesStart::new("mesh");
    if let Some(volume) = mesh.volume_data {
        elem.push_attribute(("v:volumeid", w.id_of(volume)?.as_str()));
    }
    w.sink.start(elem)?;

    w.sink.start(BytesStart::new("vertices"))?;
    for v in mesh.vertices() {
        let mut vertex = BytesStart::new("vertex");
        vertex.push_attribute(("x", w.num(v.x).as_str()));
        vertex.push_attribute(("y", w.num(v.y).as_str()));
        vertex.push_attribute(("z", w.num(v.z).as_str()));
        w.sink.empty(vertex)?;
        w.progress.tick(ProgressPhase::WriteMesh)?;
    }
    w.sink.end("vertices")?;

    w.sink.start(BytesStart::new("triangles"))?;
    for t in mesh.triangles() {
        let mut triangle = BytesStart::new("triangle");
        triangle.push_attribute(("v1", t.v1.to_string().as_str()));
        triangle.push_attribute(("v2", t.v2.to_string().as_str()));
        triangle.push_attribute(("v3", t.v3.to_string().as_str()));
        if let Some(pid) = t.pid {
            triangle.push_attribute(("pid", w.id_of(pid)?.as_str()));
        }
        // Indices without a triangle pid belong to the object's group.
        let group = t.pid.or(object.pid);
        for (name, p) in [("p1", t.p1), ("p2", t.p2), ("p3", t.p3)] {
            if let Some(p) = p {
                triangle.push_attribute((name, w.property_index(group, p)?.as_str()));
            }
        }
        w.sink.empty(triangle)?;
        w.progress.tick(ProgressPhase::WriteMesh)?;
    }
    w.sink.end("triangles")?;

    if let Some(lattice) = &mesh.beam_lattice {
        beam_lattice::write_lattice(w, object, lattice)?;
    }
    w.sink.end("mesh")
}

fn write_components<W: Write>(w: &mut PartWriter<'_, W>, list: &[Component]) -> Result<()> {
    if list.is_empty() {
        return w.sink.empty(BytesStart::new("components"));
    }
    w.sink.start(BytesStart::new("components"))?;
    for c in list {
        let mut elem = BytesStart::new("component");
        elem.push_attribute(("objectid", w.id_of(c.object)?.as_str()));
        if let Some(path) = w.path_of(c.object)? {
            elem.push_attribute(("p:path", path));
        }
        if let Some(transform) = &c.transform {
            elem.push_attribute(("transform", w.transform(transform).as_str()));
        }
        if let Some(uuid) = &c.uuid {
            elem.push_attribute(("p:UUID", uuid.as_str()));
        }
        w.sink.empty(elem)?;
    }
    w.sink.end("components")
}

/// `<build>` of the root part
pub(super) fn write_build<W: Write>(w: &mut PartWriter<'_, W>) -> Result<()> {
    let model = w.model;
    let build = model.build();
    let mut elem = BytesStart::new("build");
    if let Some(uuid) = &build.uuid {
        elem.push_attribute(("p:UUID", uuid.as_str()));
    }
    if build.items().is_empty() {
        return w.sink.empty(elem);
    }
    w.sink.start(elem)?;
    for item in build.items() {
        let mut elem = BytesStart::new("item");
        elem.push_attribute(("objectid", w.id_of(item.object)?.as_str()));
        if let Some(path) = w.path_of(item.object)? {
            elem.push_attribute(("p:path", path));
        }
        if let Some(transform) = &item.transform {
            elem.push_attribute(("transform", w.transform(transform).as_str()));
        }
        if let Some(part_number) = &item.part_number {
            elem.push_attribute(("partnumber", part_number.as_str()));
        }
        if let Some(uuid) = &item.uuid {
            elem.push_attribute(("p:UUID", uuid.as_str()));
        }
        w.push_custom(&mut elem, &item.custom_attributes);
        if item.metadata.is_empty() {
            w.sink.empty(elem)?;
        } else {
            w.sink.start(elem)?;
            w.metadata_group(&item.metadata)?;
            w.sink.end("item")?;
        }
    }
    w.sink.end("build")
}

#[cfg(test)]
mod tests {
    use crate::model::{
        BuildItem, ColorGroup, Color, Mesh, Metadata, Model, Object, PropertyId, ROOT_MODEL_PART,
        Transform, Triangle, Vertex,
    };
    use crate::progress::ProgressMonitor;
    use crate::writer::part::write_part_xml;

    fn xml(model: &Model) -> String {
        let mut progress = ProgressMonitor::default();
        String::from_utf8(write_part_xml(model, ROOT_MODEL_PART, 3, &mut progress).unwrap()).unwrap()
    }

    #[test]
    fn test_object_and_build_item() {
        let mut model = Model::new();
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(1.5, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(0.0, 1.0 / 3.0, 0.0));
        mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();
        let mut object = Object::mesh(mesh).with_name("part");
        object.part_number = Some("PN-7".to_string());
        object.metadata.add(Metadata::new("Color", "red")).unwrap();
        let id = model.add_resource(object).unwrap();
        let mut item = BuildItem::with_transform(
            id,
            Transform([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 10.0, 0.0, 0.0]),
        );
        item.uuid = Some("5b2b9b32-8d7b-4c3e-9b0e-1a2b3c4d5e6f".to_string());
        model.add_build_item(item).unwrap();

        let out = xml(&model);
        assert!(out.contains(r#"<object id="1" type="model" name="part" partnumber="PN-7">"#));
        assert!(out.contains(r#"<vertex x="1.5" y="0" z="0"/>"#));
        assert!(out.contains(r#"y="0.333""#));
        assert!(out.contains(r#"<metadata name="Color">red</metadata>"#));
        assert!(out.contains(r#"transform="1 0 0 0 1 0 0 0 1 10 0 0""#));
        assert!(out.contains(r#"p:UUID="5b2b9b32-8d7b-4c3e-9b0e-1a2b3c4d5e6f""#));
    }

    #[test]
    fn test_triangle_property_indices_are_positions() {
        let mut model = Model::new();
        let mut colors = ColorGroup::new();
        let red = colors.add_color(Color::rgb(255, 0, 0));
        let green = colors.add_color(Color::rgb(0, 255, 0));
        colors.colors.remove(red).unwrap();
        let group = model.add_resource(colors).unwrap();

        let mut mesh = Mesh::new();
        for i in 0..3 {
            mesh.add_vertex(Vertex::new(i as f64, (i % 2) as f64, 0.0));
        }
        mesh.add_triangle(Triangle::with_property(0, 1, 2, group, green)).unwrap();
        model.add_resource(Object::mesh(mesh)).unwrap();

        let out = xml(&model);
        assert!(out.contains(r#"<triangle v1="0" v2="1" v3="2" pid="1" p1="0"/>"#));
        assert_eq!(green, PropertyId(2));
    }
}
