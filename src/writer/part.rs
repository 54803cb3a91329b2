//! Serialization of one model part
//!
//! A part is written in three steps: its resources are put in dependency
//! order, the namespaces they use are collected and bound to prefixes, and
//! the document is streamed out through the per-kind writers.

use super::emit::{XmlSink, format_number};
use super::{beam_lattice, core, material, slice, volumetric};
use crate::error::{Error, Result};
use crate::model::{
    AnyAttribute, BallMode, DEFAULT_METADATA_TYPE, ForeignElement, MeshResolution, Metadata,
    MetadataGroup, Model, ObjectContent, PropertyId, ROOT_MODEL_PART, Resource, ResourceId,
    ResourceKind, Transform,
};
use crate::namespaces::{CORE, Extension, XML, is_core};
use crate::progress::ProgressMonitor;
use quick_xml::events::BytesStart;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use tracing::trace;

/// Namespaces referenced by one part
#[derive(Debug, Default)]
struct NamespaceUse {
    extensions: BTreeSet<Extension>,
    required: BTreeSet<Extension>,
    custom: Vec<String>,
}

impl NamespaceUse {
    fn extension(&mut self, ext: Extension) {
        if ext != Extension::Core {
            self.extensions.insert(ext);
        }
    }

    fn uri(&mut self, uri: &str) {
        if uri.is_empty() || is_core(uri) || uri == XML {
            return;
        }
        match Extension::from_namespace(uri) {
            Some(ext) if ext.namespace() == uri => self.extension(ext),
            _ => {
                if !self.custom.iter().any(|u| u == uri) {
                    self.custom.push(uri.to_string());
                }
            }
        }
    }

    fn attributes(&mut self, attrs: &[AnyAttribute]) {
        for attr in attrs {
            self.uri(&attr.namespace);
        }
    }

    fn foreign(&mut self, elements: &[ForeignElement]) {
        for el in elements {
            el.walk(&mut |e| {
                self.uri(&e.namespace);
                self.attributes(&e.attributes);
            });
        }
    }

    fn metadata(&mut self, group: &MetadataGroup) {
        for entry in group.iter() {
            self.uri(&entry.namespace);
        }
    }
}

/// Streams one model part
pub(crate) struct PartWriter<'a, W: Write> {
    pub model: &'a Model,
    pub part: &'a str,
    pub is_root: bool,
    pub sink: XmlSink<W>,
    pub progress: &'a mut ProgressMonitor,
    precision: usize,
    /// (uri, prefix), in declaration order
    prefixes: Vec<(String, String)>,
    required: Vec<Extension>,
}

impl<'a, W: Write> PartWriter<'a, W> {
    pub fn new(
        model: &'a Model,
        part: &'a str,
        out: W,
        precision: usize,
        progress: &'a mut ProgressMonitor,
    ) -> Self {
        Self {
            model,
            part,
            is_root: part == ROOT_MODEL_PART,
            sink: XmlSink::new(out),
            progress,
            precision,
            prefixes: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Write the whole part and hand back the output
    pub fn write(mut self) -> Result<W> {
        let resources = self.ordered_resources()?;
        let used = self.namespace_use(&resources)?;
        self.bind_prefixes(used);
        trace!(part = self.part, resources = resources.len(), "writing model part");

        self.sink.decl()?;
        let mut root = BytesStart::new("model");
        root.push_attribute(("unit", self.model.unit.as_str()));
        root.push_attribute(("xml:lang", self.model.language.as_str()));
        root.push_attribute(("xmlns", CORE));
        for (uri, prefix) in &self.prefixes {
            root.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
        }
        if !self.required.is_empty() {
            let list = self
                .required
                .iter()
                .map(|ext| ext.prefix())
                .collect::<Vec<_>>()
                .join(" ");
            root.push_attribute(("requiredextensions", list.as_str()));
        }
        self.sink.start(root)?;

        if self.is_root {
            let model = self.model;
            for entry in model.metadata.iter() {
                self.metadata(entry)?;
            }
        }

        self.sink.start(BytesStart::new("resources"))?;
        for res in resources {
            self.resource(res)?;
        }
        if self.is_root {
            let model = self.model;
            for el in &model.foreign_elements {
                self.foreign(el)?;
            }
        }
        self.sink.end("resources")?;

        if self.is_root {
            core::write_build(&mut self)?;
        } else {
            self.sink.empty(BytesStart::new("build"))?;
        }
        self.sink.end("model")?;
        Ok(self.sink.into_inner())
    }

    fn resource(&mut self, res: &'a Resource) -> Result<()> {
        match &res.kind {
            ResourceKind::Object(obj) => core::write_object(self, res, obj),
            ResourceKind::BaseMaterials(g) => material::write_base_materials(self, res, g),
            ResourceKind::Colors(g) => material::write_color_group(self, res, g),
            ResourceKind::Texture2D(t) => material::write_texture(self, res, t),
            ResourceKind::Texture2DGroup(g) => material::write_texture_group(self, res, g),
            ResourceKind::Composite(g) => material::write_composite(self, res, g),
            ResourceKind::MultiProperties(g) => material::write_multi_properties(self, res, g),
            ResourceKind::SliceStack(s) => slice::write_slice_stack(self, res, s),
            ResourceKind::Image3D(i) => volumetric::write_image3d(self, res, i),
            ResourceKind::ScalarField(f) => volumetric::write_scalar_field(self, res, f),
            ResourceKind::Vector3DField(f) => volumetric::write_vector_field(self, res, f),
            ResourceKind::FunctionFromImage3D(f) => volumetric::write_function_from_image(self, res, f),
            ResourceKind::ImplicitFunction(f) => volumetric::write_implicit_function(self, res, f),
            ResourceKind::VolumeData(v) => volumetric::write_volume_data(self, res, v),
            ResourceKind::VolumetricStack(s) => volumetric::write_volumetric_stack(self, res, s),
        }
    }

    /// Resources of this part, each after everything it references in the part
    fn ordered_resources(&self) -> Result<Vec<&'a Resource>> {
        let model: &'a Model = self.model;
        let mut done: HashMap<ResourceId, bool> = HashMap::new();
        let mut order = Vec::new();
        for res in model.resources().filter(|r| r.part() == self.part) {
            self.visit(res, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        res: &'a Resource,
        done: &mut HashMap<ResourceId, bool>,
        order: &mut Vec<&'a Resource>,
    ) -> Result<()> {
        match done.get(&res.id()) {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(Error::CyclicReference(format!(
                    "{} {} in {} depends on itself",
                    res.kind.type_name(),
                    res.model_id(),
                    self.part
                )));
            }
            None => {}
        }
        done.insert(res.id(), false);
        let model: &'a Model = self.model;
        for dep in res.kind.references() {
            let target = model.resource(dep)?;
            if target.part() == self.part {
                self.visit(target, done, order)?;
            }
        }
        done.insert(res.id(), true);
        order.push(res);
        Ok(())
    }

    fn namespace_use(&self, resources: &[&Resource]) -> Result<NamespaceUse> {
        let mut used = NamespaceUse::default();
        for res in resources {
            used.attributes(&res.custom_attributes);
            used.foreign(&res.foreign_children);
            match &res.kind {
                ResourceKind::Object(obj) => {
                    if obj.uuid.is_some() {
                        used.extension(Extension::Production);
                    }
                    if obj.slice_stack.is_some() || obj.mesh_resolution != MeshResolution::FullRes {
                        used.extension(Extension::Slice);
                    }
                    used.metadata(&obj.metadata);
                    match obj.content() {
                        ObjectContent::Mesh(mesh) => {
                            if mesh.volume_data.is_some() {
                                used.extension(Extension::Volumetric);
                                used.required.insert(Extension::Volumetric);
                            }
                            if let Some(lattice) = &mesh.beam_lattice {
                                used.extension(Extension::BeamLattice);
                                let balls = lattice.ball_mode != BallMode::None
                                    || lattice.ball_radius.is_some()
                                    || !lattice.balls.is_empty()
                                    || lattice.beam_sets.iter().any(|s| !s.ball_refs.is_empty());
                                if balls {
                                    used.extension(Extension::BeamLatticeBalls);
                                }
                            }
                        }
                        ObjectContent::Components(list) => {
                            for c in list {
                                if c.uuid.is_some() {
                                    used.extension(Extension::Production);
                                }
                                if self.path_of(c.object)?.is_some() {
                                    used.extension(Extension::Production);
                                    used.required.insert(Extension::Production);
                                }
                            }
                        }
                        ObjectContent::LevelSet(_) => {
                            used.extension(Extension::Volumetric);
                            used.required.insert(Extension::Volumetric);
                        }
                    }
                }
                ResourceKind::BaseMaterials(_) => {}
                ResourceKind::Colors(_)
                | ResourceKind::Texture2D(_)
                | ResourceKind::Texture2DGroup(_)
                | ResourceKind::Composite(_)
                | ResourceKind::MultiProperties(_) => used.extension(Extension::Material),
                ResourceKind::SliceStack(_) => used.extension(Extension::Slice),
                ResourceKind::Image3D(_)
                | ResourceKind::ScalarField(_)
                | ResourceKind::Vector3DField(_)
                | ResourceKind::FunctionFromImage3D(_)
                | ResourceKind::VolumeData(_) => used.extension(Extension::Volumetric),
                ResourceKind::ImplicitFunction(_) => {
                    used.extension(Extension::Implicit);
                    used.required.insert(Extension::Implicit);
                }
                ResourceKind::VolumetricStack(_) => used.extension(Extension::Volumetric1907),
            }
        }

        if self.is_root {
            let model = self.model;
            used.metadata(&model.metadata);
            used.foreign(&model.foreign_elements);
            let build = model.build();
            if build.uuid.is_some() {
                used.extension(Extension::Production);
            }
            for item in build.items() {
                used.attributes(&item.custom_attributes);
                used.metadata(&item.metadata);
                if item.uuid.is_some() {
                    used.extension(Extension::Production);
                }
                if self.path_of(item.object)?.is_some() {
                    used.extension(Extension::Production);
                    used.required.insert(Extension::Production);
                }
            }
        }
        Ok(used)
    }

    fn bind_prefixes(&mut self, used: NamespaceUse) {
        for ext in &used.extensions {
            self.prefixes
                .push((ext.namespace().to_string(), ext.prefix().to_string()));
        }
        // Generated prefixes stay clear of every registered one.
        let model = self.model;
        let reserved: Vec<&str> = model
            .custom_namespaces
            .iter()
            .map(|ns| ns.prefix.as_str())
            .collect();
        let mut generated = 0;
        for uri in used.custom {
            let registered = model
                .custom_namespaces
                .iter()
                .find(|ns| ns.uri == uri)
                .map(|ns| ns.prefix.clone())
                .filter(|prefix| !self.prefixes.iter().any(|(_, p)| p == prefix));
            let prefix = match registered {
                Some(prefix) => prefix,
                None => loop {
                    generated += 1;
                    let candidate = format!("ns{}", generated);
                    if !self.prefixes.iter().any(|(_, p)| *p == candidate)
                        && !reserved.contains(&candidate.as_str())
                    {
                        break candidate;
                    }
                },
            };
            self.prefixes.push((uri, prefix));
        }
        self.required = used.required.into_iter().collect();
    }

    // ----- helpers for the per-kind writers -------------------------------

    /// Number with the configured precision
    pub fn num(&self, value: f64) -> String {
        format_number(value, self.precision)
    }

    pub fn transform(&self, transform: &Transform) -> String {
        transform
            .0
            .iter()
            .map(|v| self.num(*v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Element name in the namespace of `ext`
    pub fn name(&self, ext: Extension, local: &str) -> String {
        match ext {
            Extension::Core => local.to_string(),
            _ => format!("{}:{}", ext.prefix(), local),
        }
    }

    fn qualified(&self, uri: &str, local: &str) -> String {
        if uri.is_empty() || is_core(uri) {
            return local.to_string();
        }
        if uri == XML {
            return format!("xml:{}", local);
        }
        match self.prefixes.iter().find(|(u, _)| u == uri) {
            Some((_, prefix)) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    /// XML id of a resource
    pub fn id_of(&self, id: ResourceId) -> Result<String> {
        Ok(self.model.resource(id)?.model_id().to_string())
    }

    /// Part of `id` when it lives outside the part being written
    pub fn path_of(&self, id: ResourceId) -> Result<Option<&'a str>> {
        let model: &'a Model = self.model;
        let part = model.resource(id)?.part();
        Ok((part != self.part).then_some(part))
    }

    /// XML index of property `p`, looked up in `group` when there is one
    pub fn property_index(&self, group: Option<ResourceId>, p: PropertyId) -> Result<String> {
        let Some(group) = group else {
            return Ok(p.0.saturating_sub(1).to_string());
        };
        let res = self.model.resource(group)?;
        res.kind
            .property_index(p)
            .map(|i| i.to_string())
            .ok_or_else(|| {
                Error::PropertyNotFound(format!(
                    "property {} is not in {} {}",
                    p,
                    res.kind.type_name(),
                    res.model_id()
                ))
            })
    }

    /// Start tag of a resource carrying its id
    pub fn resource_start(&self, ext: Extension, local: &str, res: &Resource) -> BytesStart<'static> {
        let mut elem = BytesStart::new(self.name(ext, local));
        elem.push_attribute(("id", res.model_id().to_string().as_str()));
        elem
    }

    pub fn push_custom(&self, elem: &mut BytesStart<'_>, attrs: &[AnyAttribute]) {
        for attr in attrs {
            let name = self.qualified(&attr.namespace, &attr.name);
            elem.push_attribute((name.as_str(), attr.value.as_str()));
        }
    }

    /// Write a resource element: custom attributes, `body`, then foreign children
    pub fn resource_element<F>(
        &mut self,
        mut elem: BytesStart<'static>,
        res: &Resource,
        has_body: bool,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.push_custom(&mut elem, &res.custom_attributes);
        if !has_body && res.foreign_children.is_empty() {
            return self.sink.empty(elem);
        }
        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        self.sink.start(elem)?;
        body(self)?;
        for el in &res.foreign_children {
            self.foreign(el)?;
        }
        self.sink.end(&name)
    }

    pub fn foreign(&mut self, el: &ForeignElement) -> Result<()> {
        let name = self.qualified(&el.namespace, &el.name);
        let mut elem = BytesStart::new(name.clone());
        self.push_custom(&mut elem, &el.attributes);
        if el.children.is_empty() && el.text.is_empty() {
            return self.sink.empty(elem);
        }
        if el.children.is_empty() {
            return self.sink.text_element(elem, &el.text);
        }
        self.sink.start(elem)?;
        for child in &el.children {
            self.foreign(child)?;
        }
        self.sink.end(&name)
    }

    pub fn metadata(&mut self, entry: &Metadata) -> Result<()> {
        let name = self.qualified(&entry.namespace, &entry.name);
        let mut elem = BytesStart::new("metadata");
        elem.push_attribute(("name", name.as_str()));
        if entry.preserve {
            elem.push_attribute(("preserve", "1"));
        }
        if entry.value_type != DEFAULT_METADATA_TYPE {
            elem.push_attribute(("type", entry.value_type.as_str()));
        }
        if entry.value.is_empty() {
            return self.sink.empty(elem);
        }
        self.sink.text_element(elem, &entry.value)
    }

    pub fn metadata_group(&mut self, group: &MetadataGroup) -> Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        self.sink.start(BytesStart::new("metadatagroup"))?;
        for entry in group.iter() {
            self.metadata(entry)?;
        }
        self.sink.end("metadatagroup")
    }
}

/// Write one part of `model` as a standalone XML document
pub(crate) fn write_part_xml(
    model: &Model,
    part: &str,
    precision: usize,
    progress: &mut ProgressMonitor,
) -> Result<Vec<u8>> {
    PartWriter::new(model, part, Vec::new(), precision, progress).write()
}
