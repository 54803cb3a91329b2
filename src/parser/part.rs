//! Streaming read of one model part
//!
//! Every start tag is resolved against the namespace scope and dispatched
//! through the registry to an open handler, which returns the [`Node`]
//! pushed for the element. Leaf handlers write straight into the nearest
//! container; containers that own data (resources, build items, metadata,
//! foreign subtrees) are finalized when their end tag is reached.

use super::config::ParserConfig;
use super::context::{ReadState, parse_model_id};
use super::registry;
use super::scope::{NamespaceScope, XmlElement, general_ref, text_content};
use crate::error::{Error, Result};
use crate::model::{
    AnyAttribute, BeamLattice, BeamSet, BuildItem, ForeignElement, ImplicitNode, Mesh, Metadata,
    Object, ObjectContent, Resource, ResourceId, ResourceKind, SliceStack, VolumetricLayer,
    normalize_part_name,
};
use crate::namespaces::Extension;
use crate::opc::part_key;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, trace};

/// A resource whose element is still open
#[derive(Debug)]
pub(crate) struct PendingResource {
    pub id: ResourceId,
    pub model_id: u32,
    pub kind: ResourceKind,
    pub custom: Vec<AnyAttribute>,
    pub foreign: Vec<ForeignElement>,
    /// Objects get their content from the first mesh, components or levelset child
    pub has_content: bool,
}

impl PendingResource {
    pub fn new(id: ResourceId, model_id: u32, kind: impl Into<ResourceKind>) -> Self {
        Self {
            id,
            model_id,
            kind: kind.into(),
            custom: Vec::new(),
            foreign: Vec::new(),
            has_content: true,
        }
    }
}

/// A `<metadata>` element whose text is being collected
#[derive(Debug)]
pub(crate) struct PendingMetadata {
    pub entry: Metadata,
    pub text: String,
}

/// Parser state of one open element
#[derive(Debug)]
pub(crate) enum Node {
    Model,
    Resources,
    Build,
    Item(Box<BuildItem>),
    MetadataGroup,
    Metadata(Box<PendingMetadata>),
    Resource(Box<PendingResource>),
    Mesh,
    Vertices,
    Triangles,
    Components,
    BeamLattice,
    Beams,
    Balls,
    BeamSets,
    BeamSet(Box<BeamSet>),
    /// Slice at this index of the enclosing stack
    Slice(usize),
    SliceVertices(usize),
    /// Slice index and polygon index
    Polygon(usize, usize),
    ImageStack,
    /// `<in>` or `<out>` of a function or node
    Ports { output: bool },
    ImplicitNode(Box<ImplicitNode>),
    VolumetricLayer(Box<VolumetricLayer>),
    Foreign(ForeignElement),
    /// Unknown or unsupported subtree
    Skip,
    /// Element whose data was consumed when it was opened
    Leaf,
}

/// Reads one model part into the shared [`ReadState`]
pub(crate) struct PartParser<'a> {
    pub state: &'a mut ReadState,
    pub config: &'a ParserConfig,
    pub part: String,
    pub is_root: bool,
    pub scope: NamespaceScope,
    pub(super) stack: Vec<Node>,
    root_seen: bool,
    declared: Vec<ResourceId>,
}

impl<'a> PartParser<'a> {
    pub fn new(state: &'a mut ReadState, config: &'a ParserConfig, part: &str, is_root: bool) -> Self {
        Self {
            state,
            config,
            part: part.to_string(),
            is_root,
            scope: NamespaceScope::new(),
            stack: Vec::new(),
            root_seen: false,
            declared: Vec::new(),
        }
    }

    /// Parse the part; returns the resources it declared in document order
    pub fn parse(mut self, data: &[u8]) -> Result<Vec<ResourceId>> {
        debug!(part = %self.part, bytes = data.len(), "parsing model part");
        let mut reader = Reader::from_reader(data);
        let mut buf = Vec::with_capacity(4096);

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let el = self.scope.push(e)?;
                    let node = self.open(&el)?;
                    self.stack.push(node);
                    if matches!(event, Event::Empty(_)) {
                        self.close()?;
                    }
                }
                Event::End(_) => self.close()?,
                Event::Text(ref t) => {
                    let text = text_content(t)?;
                    self.text(&text);
                }
                Event::CData(ref c) => {
                    let text = String::from_utf8_lossy(&c[..]).into_owned();
                    self.text(&text);
                }
                Event::GeneralRef(ref r) => {
                    let text = general_ref(r)?;
                    self.text(&text);
                }
                Event::DocType(_) => {
                    return Err(Error::InvalidXml(format!(
                        "{}: DTD declarations are not allowed",
                        self.part
                    )));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !self.root_seen {
            return Err(Error::InvalidXml(format!(
                "{} has no <model> root element",
                self.part
            )));
        }
        if !self.stack.is_empty() {
            return Err(Error::InvalidXml(format!(
                "{} ends inside an open element",
                self.part
            )));
        }
        Ok(self.declared)
    }

    fn open(&mut self, el: &XmlElement) -> Result<Node> {
        if self.stack.is_empty() {
            let is_core = Extension::from_namespace(&el.ns) == Some(Extension::Core);
            if self.root_seen || !is_core || el.local != "model" {
                return Err(Error::InvalidXml(format!(
                    "{}: expected a single <model> root in the core namespace, found <{}> in '{}'",
                    self.part, el.local, el.ns
                )));
            }
            self.root_seen = true;
            return registry::open_model(self, el);
        }

        match self.stack.last() {
            Some(Node::Skip) => return Ok(Node::Skip),
            Some(Node::Foreign(_)) => return Ok(Node::Foreign(self.foreign(el))),
            _ => {}
        }

        match Extension::from_namespace(&el.ns) {
            Some(ext) if !self.config.supports(ext) => {
                self.state.warn(
                    4001,
                    format!("<{}> skipped: {} extension is disabled", el.local, ext.name()),
                )?;
                Ok(Node::Skip)
            }
            Some(ext) => match registry::lookup(ext, &el.local) {
                Some(open) => {
                    trace!(element = %el.local, extension = ext.name(), "dispatch");
                    open(self, el)
                }
                None => {
                    self.state.warn(
                        4001,
                        format!("unknown element <{}> in the {} namespace skipped", el.local, ext.name()),
                    )?;
                    Ok(Node::Skip)
                }
            },
            None if self.config.custom_namespace(&el.ns).is_some() => {
                self.state.used_custom.insert(el.ns.clone());
                Ok(Node::Foreign(self.foreign(el)))
            }
            None => {
                debug!(element = %el.local, ns = %el.ns, "skipping element in unknown namespace");
                self.state.warn(
                    4001,
                    format!("element <{}> in unknown namespace '{}' skipped", el.local, el.ns),
                )?;
                Ok(Node::Skip)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let node = self
            .stack
            .pop()
            .ok_or_else(|| Error::InvalidXml(format!("{}: unbalanced end tag", self.part)))?;
        self.scope.pop();
        match node {
            Node::Resource(pending) => self.finish_resource(*pending),
            Node::Item(item) => self.finish_item(*item),
            Node::Metadata(pending) => self.finish_metadata(*pending),
            Node::BeamSet(set) => {
                self.lattice_mut()?.beam_sets.push(*set);
                Ok(())
            }
            Node::ImplicitNode(node) => match self.kind_mut("implicit node")? {
                ResourceKind::ImplicitFunction(f) => {
                    f.nodes.push(*node);
                    Ok(())
                }
                _ => Err(Error::InvalidXml("implicit node outside a function".to_string())),
            },
            Node::VolumetricLayer(layer) => match self.kind_mut("volumetriclayer")? {
                ResourceKind::VolumetricStack(s) => {
                    s.layers.push(*layer);
                    Ok(())
                }
                _ => Err(Error::InvalidXml(
                    "volumetriclayer outside a volumetricstack".to_string(),
                )),
            },
            Node::Foreign(mut el) => {
                el.text = el.text.trim().to_string();
                self.attach_foreign(el);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn text(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(Node::Metadata(m)) => m.text.push_str(text),
            Some(Node::Foreign(f)) => f.text.push_str(text),
            _ => {}
        }
    }

    fn foreign(&mut self, el: &XmlElement) -> ForeignElement {
        let mut out = ForeignElement::new(el.ns.clone(), el.local.clone());
        out.attributes = el
            .attrs
            .iter()
            .map(|a| AnyAttribute::new(a.ns.clone().unwrap_or_default(), a.local.clone(), a.value.clone()))
            .collect();
        out
    }

    fn attach_foreign(&mut self, el: ForeignElement) {
        match self.stack.last_mut() {
            Some(Node::Foreign(parent)) => return parent.children.push(el),
            Some(Node::Resource(r)) => return r.foreign.push(el),
            _ => {}
        }
        if let Some(r) = self.pending_mut() {
            r.foreign.push(el);
        } else {
            self.state.model.foreign_elements.push(el);
        }
    }

    fn finish_resource(&mut self, pending: PendingResource) -> Result<()> {
        if !pending.has_content {
            let what = match pending.kind {
                ResourceKind::Object(_) => "has no mesh, components or levelset",
                _ => "is missing its definition",
            };
            return Err(Error::InvalidXml(format!(
                "{} {} in {} {}",
                pending.kind.type_name(),
                pending.model_id,
                self.part,
                what
            )));
        }
        let mut resource = Resource::new(pending.id, pending.model_id, self.part.clone(), pending.kind);
        resource.custom_attributes = pending.custom;
        resource.foreign_children = pending.foreign;
        trace!(id = pending.model_id, kind = resource.kind.type_name(), "resource read");
        self.state.model.insert_resource(resource)?;
        self.declared.push(pending.id);
        Ok(())
    }

    fn finish_item(&mut self, item: BuildItem) -> Result<()> {
        if let Some(uuid) = &item.uuid
            && self.state.model.build().has_uuid(uuid)
        {
            return Err(Error::DuplicateUuid(format!("build item UUID {}", uuid)));
        }
        self.state.model.push_build_item_unchecked(item);
        Ok(())
    }

    fn finish_metadata(&mut self, pending: PendingMetadata) -> Result<()> {
        let PendingMetadata { mut entry, text } = pending;
        entry.value = text;
        let len = self.stack.len();
        match self.stack.last() {
            Some(Node::Model) => return self.state.model.metadata.add(entry),
            Some(Node::MetadataGroup) => {}
            _ => {
                return Err(Error::invalid_xml_element(
                    "metadata",
                    "must be inside <model> or <metadatagroup>",
                ));
            }
        }
        match len.checked_sub(2).and_then(|i| self.stack.get_mut(i)) {
            Some(Node::Item(item)) => item.metadata.add(entry),
            Some(Node::Resource(r)) => match &mut r.kind {
                ResourceKind::Object(obj) => obj.metadata.add(entry),
                _ => Err(Error::invalid_xml_element("metadatagroup", "must be inside an object")),
            },
            _ => Err(Error::invalid_xml_element(
                "metadatagroup",
                "must be inside an object or a build item",
            )),
        }
    }

    // ----- helpers for open handlers --------------------------------------

    /// Innermost open element
    pub fn parent(&self) -> Option<&Node> {
        self.stack.last()
    }

    /// Fail unless the innermost open element satisfies `ok`
    pub fn expect_parent(&self, el: &XmlElement, ok: fn(&Node) -> bool, inside: &str) -> Result<()> {
        match self.stack.last() {
            Some(node) if ok(node) => Ok(()),
            _ => Err(Error::invalid_xml_element(
                &el.local,
                &format!("must be inside <{}>", inside),
            )),
        }
    }

    /// Nearest enclosing resource
    pub fn pending_mut(&mut self) -> Option<&mut PendingResource> {
        self.stack.iter_mut().rev().find_map(|n| match n {
            Node::Resource(r) => Some(r.as_mut()),
            _ => None,
        })
    }

    /// Kind of the nearest enclosing resource
    pub fn kind_mut(&mut self, what: &str) -> Result<&mut ResourceKind> {
        self.pending_mut()
            .map(|r| &mut r.kind)
            .ok_or_else(|| Error::invalid_xml_element(what, "must be inside a resource"))
    }

    pub fn object_mut(&mut self, what: &str) -> Result<&mut Object> {
        match self.kind_mut(what)? {
            ResourceKind::Object(obj) => Ok(obj),
            _ => Err(Error::invalid_xml_element(what, "must be inside an object")),
        }
    }

    /// Give the enclosing object its content; an object has exactly one
    pub fn set_object_content(&mut self, what: &str, content: ObjectContent) -> Result<()> {
        let pending = self
            .pending_mut()
            .ok_or_else(|| Error::invalid_xml_element(what, "must be inside an object"))?;
        if pending.has_content {
            return Err(Error::invalid_xml_element(
                what,
                "an object holds exactly one of mesh, components or levelset",
            ));
        }
        match &mut pending.kind {
            ResourceKind::Object(obj) => *obj.content_mut() = content,
            _ => return Err(Error::invalid_xml_element(what, "must be inside an object")),
        }
        pending.has_content = true;
        Ok(())
    }

    pub fn mesh_mut(&mut self, what: &str) -> Result<&mut Mesh> {
        self.object_mut(what)?
            .as_mesh_mut()
            .ok_or_else(|| Error::invalid_xml_element(what, "must be inside a mesh"))
    }

    pub fn lattice_mut(&mut self) -> Result<&mut BeamLattice> {
        self.mesh_mut("beamlattice")?
            .beam_lattice
            .as_mut()
            .ok_or_else(|| Error::invalid_xml_element("beamlattice", "lattice element outside <beamlattice>"))
    }

    pub fn slice_stack_mut(&mut self, what: &str) -> Result<&mut SliceStack> {
        match self.kind_mut(what)? {
            ResourceKind::SliceStack(s) => Ok(s),
            _ => Err(Error::invalid_xml_element(what, "must be inside a slicestack")),
        }
    }

    /// Declare the resource id carried in the `id` attribute
    pub fn declare(&mut self, el: &XmlElement) -> Result<(ResourceId, u32)> {
        let model_id = parse_model_id(el, "id", el.require("id")?)?;
        let id = self.state.declare(&self.part, model_id)?;
        Ok((id, model_id))
    }

    /// Resolve a resource reference attribute within this part
    pub fn reference(&mut self, el: &XmlElement, name: &str) -> Result<Option<ResourceId>> {
        self.reference_in(el, name, None)
    }

    /// Resolve a reference attribute, in `path` when given (production `p:path`)
    pub fn reference_in(&mut self, el: &XmlElement, name: &str, path: Option<&str>) -> Result<Option<ResourceId>> {
        self.reference_value(el, name, el.attr(name), path)
    }

    /// Resolve a reference carried by a namespaced attribute
    pub fn reference_ns(&mut self, el: &XmlElement, ns: &str, name: &str) -> Result<Option<ResourceId>> {
        self.reference_value(el, name, el.attr_ns(ns, name), None)
    }

    fn reference_value(
        &mut self,
        el: &XmlElement,
        name: &str,
        raw: Option<&str>,
        path: Option<&str>,
    ) -> Result<Option<ResourceId>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let model_id = parse_model_id(el, name, raw)?;
        let part = match path {
            Some(p) if !p.trim().is_empty() => normalize_part_name(p.trim()),
            _ => self.part.clone(),
        };
        if part_key(&part) != part_key(&self.part) && !self.is_root {
            self.state.warn(
                2003,
                format!(
                    "<{}> in non-root part {} references {}; only the root part may do so",
                    el.local, self.part, part
                ),
            )?;
        }
        Ok(Some(self.state.resolve(&part, model_id)))
    }

    /// Mandatory reference
    pub fn require_reference(&mut self, el: &XmlElement, name: &str) -> Result<ResourceId> {
        el.require(name)?;
        self.reference(el, name)?
            .ok_or_else(|| Error::missing_attribute(&el.local, name))
    }

    /// Attributes in registered custom namespaces
    pub fn custom_attributes(&mut self, el: &XmlElement) -> Vec<AnyAttribute> {
        let mut out = Vec::new();
        for attr in &el.attrs {
            let Some(ns) = attr.ns.as_deref() else {
                continue;
            };
            if self.config.custom_namespace(ns).is_some() {
                self.state.used_custom.insert(ns.to_string());
                out.push(AnyAttribute::new(ns, attr.local.clone(), attr.value.clone()));
            }
        }
        out
    }
}
