//! In-memory 3MF model and its resource graph
//!
//! [`Model`] owns every resource in an arena keyed by [`ResourceId`]. Ids
//! are handed out from a counter that never goes backwards, so an id is
//! never reused within one model, even after removal. Each resource also
//! carries the id it has in XML (its *model id*), which is only unique
//! within the package part that owns it.
//!
//! All graph invariants are checked when the graph is mutated:
//! - references must resolve to existing resources of a suitable kind
//! - component graphs stay acyclic
//! - build item UUIDs are unique
//! - a resource or property entry that is still referenced cannot be removed
//!
//! # Examples
//!
//! ```
//! use lib3mf_engine::model::{BuildItem, Mesh, Model, Object, Triangle, Vertex};
//!
//! let mut model = Model::new();
//! let mut mesh = Mesh::new();
//! mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
//! mesh.add_vertex(Vertex::new(1.0, 0.0, 0.0));
//! mesh.add_vertex(Vertex::new(0.0, 1.0, 0.0));
//! mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();
//! let id = model.add_resource(Object::mesh(mesh)).unwrap();
//! model.add_build_item(BuildItem::new(id)).unwrap();
//! assert_eq!(model.build().items().len(), 1);
//! ```

mod attachment;
mod beam_lattice;
mod build;
mod custom;
mod material;
mod metadata;
mod object;
mod resource;
mod slice;
mod transform;
mod volumetric;

pub use attachment::{Attachment, content_type_for};
pub use beam_lattice::{Ball, BallMode, Beam, BeamCapMode, BeamLattice, BeamSet, ClippingMode};
pub use build::{Build, BuildItem};
pub use custom::{AnyAttribute, CustomNamespace, ForeignElement};
pub use material::{
    BaseMaterial, BaseMaterialGroup, BlendMethod, Color, ColorGroup, Composite,
    CompositeMaterials, Multi, MultiPropertyGroup, MultiPropertyLayer, PropertyGroup, PropertyId,
    Tex2Coord, Texture2D, Texture2DGroup, TextureFilter, TileStyle,
};
pub use metadata::{DEFAULT_METADATA_TYPE, Metadata, MetadataGroup};
pub use object::{
    Component, LevelSet, Mesh, MeshResolution, Object, ObjectContent, ObjectType, Triangle, Vertex,
};
pub use resource::{Resource, ResourceKind};
pub use slice::{Slice, SlicePolygon, SliceStack, Vertex2D};
pub use transform::{BoundingBox, TRANSFORM_MATRIX_SIZE, Transform};
pub use volumetric::{
    ChannelSelector, ComposedField, CompositionMethod, DestinationChannel, FieldReference,
    FunctionFromImage3D, Image3D, ImageSampler, ImplicitFunction, ImplicitNode, NodeConstant,
    NodeKind, Port, PortType, ScalarField, ScalarFieldKind, Vector3DField, Vector3DFieldKind,
    VolumeData, VolumeProperty, VolumetricLayer, VolumetricStack,
};

pub(crate) use attachment::normalize_part_name;
pub(crate) use transform::extend_box;

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::namespaces::Extension;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Part name of the root model
pub const ROOT_MODEL_PART: &str = "/3D/3dmodel.model";

/// Default `xml:lang` of a model
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Process-unique handle of a resource inside one [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    /// Raw value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit of all coordinates in the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    /// Micrometers
    Micron,
    /// Millimeters
    #[default]
    Millimeter,
    /// Centimeters
    Centimeter,
    /// Inches
    Inch,
    /// Feet
    Foot,
    /// Meters
    Meter,
}

impl Unit {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Micron => "micron",
            Unit::Millimeter => "millimeter",
            Unit::Centimeter => "centimeter",
            Unit::Inch => "inch",
            Unit::Foot => "foot",
            Unit::Meter => "meter",
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "micron" => Ok(Unit::Micron),
            "millimeter" => Ok(Unit::Millimeter),
            "centimeter" => Ok(Unit::Centimeter),
            "inch" => Ok(Unit::Inch),
            "foot" => Ok(Unit::Foot),
            "meter" => Ok(Unit::Meter),
            _ => Err(Error::parse_error_with_context(
                "unit",
                s,
                "micron, millimeter, centimeter, inch, foot or meter",
            )),
        }
    }
}

/// A complete 3MF model
#[derive(Debug, Clone)]
pub struct Model {
    /// Unit of measure
    pub unit: Unit,
    /// `xml:lang` of the root model
    pub language: String,
    /// Model-level metadata
    pub metadata: MetadataGroup,
    /// Non-model package parts (textures, image sheets, custom payloads)
    pub attachments: Vec<Attachment>,
    /// Package thumbnail
    pub thumbnail: Option<Attachment>,
    /// Secure content metadata
    pub keystore: Option<KeyStore>,
    /// Host-registered namespaces preserved on read and declared on write
    pub custom_namespaces: Vec<CustomNamespace>,
    /// Elements in custom namespaces found directly under `<resources>` of the root part
    pub foreign_elements: Vec<ForeignElement>,
    resources: BTreeMap<ResourceId, Resource>,
    model_ids: HashMap<(String, u32), ResourceId>,
    next_id: u32,
    build: Build,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! typed_access {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty), $label:literal;)*) => {
        impl Model {
            $(
                #[doc = concat!("The ", $label, " resource `id`")]
                pub fn $get(&self, id: ResourceId) -> Result<&$ty> {
                    match &self.resource(id)?.kind {
                        ResourceKind::$variant(value) => Ok(value),
                        other => Err(Error::ResourceNotFound(format!(
                            "resource {} is a {}, not a {}",
                            id,
                            other.type_name(),
                            $label
                        ))),
                    }
                }

                #[doc = concat!("Mutable access to the ", $label, " resource `id`")]
                pub fn $get_mut(&mut self, id: ResourceId) -> Result<&mut $ty> {
                    match &mut self.resource_mut(id)?.kind {
                        ResourceKind::$variant(value) => Ok(value),
                        other => Err(Error::ResourceNotFound(format!(
                            "resource {} is a {}, not a {}",
                            id,
                            other.type_name(),
                            $label
                        ))),
                    }
                }
            )*
        }
    };
}

typed_access! {
    object, object_mut => Object(Object), "object";
    base_materials, base_materials_mut => BaseMaterials(BaseMaterialGroup), "basematerials";
    color_group, color_group_mut => Colors(ColorGroup), "colorgroup";
    texture2d, texture2d_mut => Texture2D(Texture2D), "texture2d";
    texture2d_group, texture2d_group_mut => Texture2DGroup(Texture2DGroup), "texture2dgroup";
    composite_materials, composite_materials_mut => Composite(CompositeMaterials), "compositematerials";
    multi_properties, multi_properties_mut => MultiProperties(MultiPropertyGroup), "multiproperties";
    slice_stack, slice_stack_mut => SliceStack(SliceStack), "slicestack";
    image3d, image3d_mut => Image3D(Image3D), "image3d";
    scalar_field, scalar_field_mut => ScalarField(ScalarField), "scalarfield";
    vector3d_field, vector3d_field_mut => Vector3DField(Vector3DField), "vector3dfield";
    function_from_image3d, function_from_image3d_mut => FunctionFromImage3D(FunctionFromImage3D), "functionfromimage3d";
    implicit_function, implicit_function_mut => ImplicitFunction(ImplicitFunction), "implicitfunction";
    volume_data, volume_data_mut => VolumeData(VolumeData), "volumedata";
    volumetric_stack, volumetric_stack_mut => VolumetricStack(VolumetricStack), "volumetricstack";
}

impl Model {
    /// Empty model in millimeters
    pub fn new() -> Self {
        Self {
            unit: Unit::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            metadata: MetadataGroup::new(),
            attachments: Vec::new(),
            thumbnail: None,
            keystore: None,
            custom_namespaces: Vec::new(),
            foreign_elements: Vec::new(),
            resources: BTreeMap::new(),
            model_ids: HashMap::new(),
            next_id: 1,
            build: Build::default(),
        }
    }

    // ----- resource arena -------------------------------------------------

    /// Add a resource to the root model part
    pub fn add_resource(&mut self, kind: impl Into<ResourceKind>) -> Result<ResourceId> {
        self.add_resource_in_part(ROOT_MODEL_PART, kind)
    }

    /// Add a resource owned by `part` (Production extension)
    ///
    /// The resource gets the next free model id of that part. All
    /// references it carries must already resolve.
    pub fn add_resource_in_part(
        &mut self,
        part: &str,
        kind: impl Into<ResourceKind>,
    ) -> Result<ResourceId> {
        let kind = kind.into();
        let part = normalize_part_name(part);
        self.check_references(&kind)?;
        let model_id = self.next_model_id(&part);
        let id = self.allocate_id();
        self.insert_resource(Resource::new(id, model_id, part, kind))?;
        tracing::trace!(%id, model_id, "resource added");
        Ok(id)
    }

    /// Resource by id
    pub fn resource(&self, id: ResourceId) -> Result<&Resource> {
        self.resources
            .get(&id)
            .ok_or_else(|| Error::ResourceNotFound(format!("resource {}", id)))
    }

    /// Mutable resource by id
    ///
    /// References edited through this handle are checked again when the
    /// model is written.
    pub fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource> {
        self.resources
            .get_mut(&id)
            .ok_or_else(|| Error::ResourceNotFound(format!("resource {}", id)))
    }

    /// All resources in id order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// All resource ids in ascending order
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.resources.keys().copied().collect()
    }

    /// Number of resources
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Resource declared as `model_id` inside `part`
    pub fn find_by_model_id(&self, part: &str, model_id: u32) -> Option<ResourceId> {
        self.model_ids
            .get(&(normalize_part_name(part), model_id))
            .copied()
    }

    /// Mesh of a mesh object
    pub fn mesh(&self, id: ResourceId) -> Result<&Mesh> {
        self.object(id)?
            .as_mesh()
            .ok_or_else(|| Error::ResourceNotFound(format!("object {} has no mesh", id)))
    }

    /// Mutable mesh of a mesh object
    pub fn mesh_mut(&mut self, id: ResourceId) -> Result<&mut Mesh> {
        self.object_mut(id)?
            .as_mesh_mut()
            .ok_or_else(|| Error::ResourceNotFound(format!("object {} has no mesh", id)))
    }

    /// Ids of all mesh objects
    pub fn mesh_object_ids(&self) -> Vec<ResourceId> {
        self.resources
            .values()
            .filter(|r| matches!(&r.kind, ResourceKind::Object(o) if o.as_mesh().is_some()))
            .map(|r| r.id)
            .collect()
    }

    /// Ids of all objects
    pub fn object_ids(&self) -> Vec<ResourceId> {
        self.resources
            .values()
            .filter(|r| matches!(r.kind, ResourceKind::Object(_)))
            .map(|r| r.id)
            .collect()
    }

    /// Remove a resource
    ///
    /// Fails with [`Error::ResourceInUse`] while another resource or a build
    /// item references it; nothing is removed in that case.
    pub fn remove_resource(&mut self, id: ResourceId) -> Result<Resource> {
        if !self.resources.contains_key(&id) {
            return Err(Error::ResourceNotFound(format!("resource {}", id)));
        }
        if let Some(user) = self
            .resources
            .values()
            .find(|r| r.id != id && r.kind.references().contains(&id))
        {
            return Err(Error::ResourceInUse(format!(
                "resource {} is referenced by {} {}",
                id,
                user.kind.type_name(),
                user.id
            )));
        }
        if self.build.items.iter().any(|item| item.object == id) {
            return Err(Error::ResourceInUse(format!(
                "resource {} is referenced by a build item",
                id
            )));
        }
        let resource = self
            .resources
            .remove(&id)
            .ok_or_else(|| Error::ResourceNotFound(format!("resource {}", id)))?;
        self.model_ids
            .remove(&(resource.part.clone(), resource.model_id));
        tracing::trace!(%id, "resource removed");
        Ok(resource)
    }

    /// Every property reference as `(holder, group, property)`
    ///
    /// Holders are objects (object defaults, triangles, beams and balls),
    /// composite groups through their base materials and multi-property
    /// groups through their layers.
    pub fn property_uses(&self) -> Vec<(ResourceId, ResourceId, PropertyId)> {
        let mut uses = Vec::new();
        for resource in self.resources.values() {
            let holder = resource.id;
            match &resource.kind {
                ResourceKind::Object(object) => object_property_uses(holder, object, &mut uses),
                ResourceKind::Composite(group) => uses.extend(
                    group
                        .material_ids
                        .iter()
                        .map(|p| (holder, group.base_materials, *p)),
                ),
                ResourceKind::MultiProperties(group) => {
                    for multi in group.multis.values() {
                        for (layer, p) in group.layers.iter().zip(&multi.property_ids) {
                            uses.push((holder, layer.resource, *p));
                        }
                    }
                }
                _ => {}
            }
        }
        uses
    }

    /// Remove entry `property` of property group `group`
    ///
    /// Fails with [`Error::ResourceInUse`] while an object, composite or
    /// multi still refers to the entry; the group is left untouched then.
    pub fn remove_property(&mut self, group: ResourceId, property: PropertyId) -> Result<()> {
        if let Some((holder, _, _)) = self
            .property_uses()
            .into_iter()
            .find(|(_, g, p)| *g == group && *p == property)
        {
            let user = self.resource(holder)?;
            return Err(Error::ResourceInUse(format!(
                "property {} of resource {} is referenced by {} {}",
                property,
                group,
                user.kind.type_name(),
                holder
            )));
        }
        match &mut self.resource_mut(group)?.kind {
            ResourceKind::BaseMaterials(g) => g.remove_material(property)?,
            ResourceKind::Colors(g) => g.colors.remove(property).map(|_| ())?,
            ResourceKind::Texture2DGroup(g) => g.coords.remove(property).map(|_| ())?,
            ResourceKind::Composite(g) => g.remove_composite(property)?,
            ResourceKind::MultiProperties(g) => g.multis.remove(property).map(|_| ())?,
            other => {
                return Err(Error::ResourceNotFound(format!(
                    "resource {} is a {}, not a property group",
                    group,
                    other.type_name()
                )));
            }
        }
        tracing::trace!(%group, %property, "property removed");
        Ok(())
    }

    /// Drop the references `holder` makes to `property` of `group`
    ///
    /// A triangle or beam that refers to it loses all of its properties,
    /// since the remaining indices would pair with the wrong entries.
    pub(crate) fn clear_property_use(
        &mut self,
        holder: ResourceId,
        group: ResourceId,
        property: PropertyId,
    ) {
        let Some(ResourceKind::Object(object)) =
            self.resources.get_mut(&holder).map(|r| &mut r.kind)
        else {
            return;
        };
        let hits = |pid: Option<ResourceId>, ps: &[Option<PropertyId>]| {
            pid == Some(group) && ps.contains(&Some(property))
        };
        if hits(object.pid, &[object.pindex]) {
            object.pindex = None;
        }
        let object_pid = object.pid;
        let ObjectContent::Mesh(mesh) = object.content_mut() else {
            return;
        };
        for t in mesh.triangles_mut() {
            if hits(t.pid.or(object_pid), &[t.p1, t.p2, t.p3]) {
                t.pid = None;
                t.p1 = None;
                t.p2 = None;
                t.p3 = None;
            }
        }
        if let Some(lattice) = &mut mesh.beam_lattice {
            if hits(lattice.pid, &[lattice.pindex]) {
                lattice.pindex = None;
            }
            let lattice_pid = lattice.pid;
            for beam in &mut lattice.beams {
                if hits(beam.pid.or(lattice_pid), &[beam.p1, beam.p2]) {
                    beam.pid = None;
                    beam.p1 = None;
                    beam.p2 = None;
                }
            }
            for ball in &mut lattice.balls {
                if hits(ball.pid.or(lattice_pid), &[ball.p]) {
                    ball.pid = None;
                    ball.p = None;
                }
            }
        }
    }

    pub(crate) fn allocate_id(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn next_model_id(&self, part: &str) -> u32 {
        self.model_ids
            .keys()
            .filter(|(p, _)| p == part)
            .map(|(_, m)| *m)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Insert a fully built resource under a pre-allocated id
    pub(crate) fn insert_resource(&mut self, resource: Resource) -> Result<()> {
        let key = (resource.part.clone(), resource.model_id);
        if self.model_ids.contains_key(&key) {
            return Err(Error::DuplicateResourceId(format!(
                "id {} in part {}",
                resource.model_id, resource.part
            )));
        }
        if self.resources.contains_key(&resource.id) {
            return Err(Error::DuplicateResourceId(format!("resource {}", resource.id)));
        }
        self.model_ids.insert(key, resource.id);
        self.resources.insert(resource.id, resource);
        Ok(())
    }

    fn kind_of(&self, id: ResourceId) -> Result<&ResourceKind> {
        self.resources
            .get(&id)
            .map(|r| &r.kind)
            .ok_or_else(|| Error::DanglingReference(format!("resource {} does not exist", id)))
    }

    /// Check that every reference of `kind` resolves to a resource of a suitable kind
    pub(crate) fn check_references(&self, kind: &ResourceKind) -> Result<()> {
        for id in kind.references() {
            self.kind_of(id)?;
        }
        let expect = |id: ResourceId, ok: fn(&ResourceKind) -> bool, what: &str| -> Result<()> {
            let target = self.kind_of(id)?;
            if ok(target) {
                Ok(())
            } else {
                Err(Error::InvalidModel(format!(
                    "resource {} is a {}, expected {}",
                    id,
                    target.type_name(),
                    what
                )))
            }
        };
        let is_object = |k: &ResourceKind| matches!(k, ResourceKind::Object(_));
        let is_group = |k: &ResourceKind| k.is_property_group();
        match kind {
            ResourceKind::Object(obj) => {
                if let Some(pid) = obj.pid {
                    expect(pid, is_group, "a property group")?;
                }
                if let Some(stack) = obj.slice_stack {
                    expect(stack, |k| matches!(k, ResourceKind::SliceStack(_)), "a slicestack")?;
                }
                match obj.content() {
                    ObjectContent::Mesh(mesh) => {
                        for pid in mesh.triangles().iter().filter_map(|t| t.pid) {
                            expect(pid, is_group, "a property group")?;
                        }
                        if let Some(lattice) = &mesh.beam_lattice {
                            lattice.validate(mesh.vertex_count())?;
                        }
                    }
                    ObjectContent::Components(list) => {
                        for c in list {
                            expect(c.object, is_object, "an object")?;
                        }
                    }
                    ObjectContent::LevelSet(ls) => {
                        expect(ls.mesh, is_object, "an object")?;
                    }
                }
            }
            ResourceKind::Texture2DGroup(g) => {
                expect(g.texture, |k| matches!(k, ResourceKind::Texture2D(_)), "a texture2d")?;
            }
            ResourceKind::Composite(g) => {
                let base = match self.kind_of(g.base_materials)? {
                    ResourceKind::BaseMaterials(base) => base,
                    other => {
                        return Err(Error::InvalidModel(format!(
                            "composite materials reference a {}, expected basematerials",
                            other.type_name()
                        )));
                    }
                };
                for id in &g.material_ids {
                    base.materials.get(*id)?;
                }
            }
            ResourceKind::MultiProperties(g) => {
                let mut staged: Vec<MultiPropertyLayer> = Vec::new();
                for layer in &g.layers {
                    self.check_layer(&staged, layer)?;
                    staged.push(*layer);
                }
            }
            ResourceKind::SliceStack(s) => {
                for target in &s.slice_refs {
                    expect(
                        *target,
                        |k| matches!(k, ResourceKind::SliceStack(_)),
                        "a slicestack",
                    )?;
                }
            }
            ResourceKind::ImplicitFunction(f) => f.validate()?,
            _ => {}
        }
        Ok(())
    }

    // ----- graph mutations with invariants --------------------------------

    /// Append a component to a components object
    ///
    /// Fails with [`Error::CyclicReference`] if the child already contains
    /// the parent, directly or transitively.
    pub fn add_component(&mut self, parent: ResourceId, component: Component) -> Result<()> {
        self.object(component.object)?;
        if component.object == parent || self.reaches(component.object, parent) {
            return Err(Error::CyclicReference(format!(
                "object {} would contain itself through object {}",
                parent, component.object
            )));
        }
        self.object_mut(parent)?.push_component(component)
    }

    /// Whether `target` is reachable from `from` through components
    fn reaches(&self, from: ResourceId, target: ResourceId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Ok(obj) = self.object(id) {
                stack.extend(obj.component_list().iter().map(|c| c.object));
            }
        }
        false
    }

    /// Verify that no components object contains itself
    pub fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        let mut marks: HashMap<ResourceId, Mark> = HashMap::new();
        for root in self.object_ids() {
            if marks.contains_key(&root) {
                continue;
            }
            // (object, next child index)
            let mut stack: Vec<(ResourceId, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::Active);
            while let Some((id, child)) = stack.pop() {
                let children = self.object(id)?.component_list();
                if let Some(component) = children.get(child) {
                    stack.push((id, child + 1));
                    match marks.get(&component.object) {
                        Some(Mark::Active) => {
                            return Err(Error::CyclicReference(format!(
                                "object {} contains itself",
                                component.object
                            )));
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(component.object, Mark::Active);
                            stack.push((component.object, 0));
                        }
                    }
                } else {
                    marks.insert(id, Mark::Done);
                }
            }
        }
        Ok(())
    }

    fn check_layer(&self, existing: &[MultiPropertyLayer], layer: &MultiPropertyLayer) -> Result<()> {
        let tag = self.resource(layer.resource)?.kind.layer_tag();
        match tag {
            LayerTag::MultiProperties => {
                return Err(Error::InvalidPropertyLayer(
                    "multiproperties cannot contain multiproperties".to_string(),
                ));
            }
            LayerTag::Other => {
                return Err(Error::InvalidPropertyLayer(format!(
                    "resource {} cannot be a property layer",
                    layer.resource
                )));
            }
            LayerTag::Material | LayerTag::Color | LayerTag::Texture => {}
        }
        let clash = existing
            .iter()
            .filter_map(|l| self.resources.get(&l.resource))
            .any(|r| r.kind.layer_tag() == tag);
        match tag {
            LayerTag::Material if clash => Err(Error::InvalidPropertyLayer(
                "multiproperties can contain only one material layer".to_string(),
            )),
            LayerTag::Color if clash => Err(Error::InvalidPropertyLayer(
                "multiproperties can contain only one color layer".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Append a layer to a multi-property group
    ///
    /// The layer must reference base materials, a color group, a texture
    /// group or composite materials. At most one material layer (base or
    /// composite) and one color layer are allowed.
    pub fn add_multi_property_layer(
        &mut self,
        group: ResourceId,
        layer: MultiPropertyLayer,
    ) -> Result<usize> {
        let existing = self.multi_properties(group)?.layers.clone();
        self.check_layer(&existing, &layer)?;
        let target = self.multi_properties_mut(group)?;
        target.layers.push(layer);
        Ok(target.layers.len() - 1)
    }

    /// Make `stack` reference the slices of `target`
    ///
    /// A stack holds either slices or references; referenced stacks must
    /// hold slices themselves.
    pub fn add_slice_ref(&mut self, stack: ResourceId, target: ResourceId) -> Result<()> {
        if stack == target {
            return Err(Error::CyclicReference(format!(
                "slice stack {} cannot reference itself",
                stack
            )));
        }
        if !self.slice_stack(target)?.slice_refs.is_empty() {
            return Err(Error::InvalidModel(format!(
                "slice stack {} holds references and cannot be referenced",
                target
            )));
        }
        let own = self.slice_stack_mut(stack)?;
        if !own.slices().is_empty() {
            return Err(Error::InvalidModel(format!(
                "slice stack {} already holds slices",
                stack
            )));
        }
        own.slice_refs.push(target);
        Ok(())
    }

    // ----- build ----------------------------------------------------------

    /// The build section
    pub fn build(&self) -> &Build {
        &self.build
    }

    /// Set the UUID of the build element
    pub fn set_build_uuid(&mut self, uuid: Option<String>) {
        self.build.uuid = uuid;
    }

    /// Append a build item
    ///
    /// The object must exist; a UUID, if set, must be unique in the build.
    pub fn add_build_item(&mut self, item: BuildItem) -> Result<()> {
        self.object(item.object)?;
        if let Some(uuid) = &item.uuid
            && self.build.has_uuid(uuid)
        {
            return Err(Error::DuplicateUuid(format!("build item UUID {}", uuid)));
        }
        self.build.items.push(item);
        Ok(())
    }

    /// Remove the build item at `index`
    pub fn remove_build_item(&mut self, index: usize) -> Result<BuildItem> {
        if index >= self.build.items.len() {
            return Err(Error::IndexOutOfRange(format!(
                "build item {} of {}",
                index,
                self.build.items.len()
            )));
        }
        Ok(self.build.items.remove(index))
    }

    pub(crate) fn push_build_item_unchecked(&mut self, item: BuildItem) {
        self.build.items.push(item);
    }

    // ----- attachments and namespaces -------------------------------------

    /// Add an attachment; part names are unique ignoring ASCII case
    pub fn add_attachment(&mut self, attachment: Attachment) -> Result<()> {
        if self.attachment(&attachment.path).is_some() {
            return Err(Error::DuplicatePart(attachment.path));
        }
        self.attachments.push(attachment);
        Ok(())
    }

    /// Attachment by part name
    pub fn attachment(&self, path: &str) -> Option<&Attachment> {
        let path = normalize_part_name(path);
        self.attachments
            .iter()
            .find(|a| a.path.eq_ignore_ascii_case(&path))
    }

    /// Remove an attachment by part name
    pub fn remove_attachment(&mut self, path: &str) -> Option<Attachment> {
        let path = normalize_part_name(path);
        let pos = self
            .attachments
            .iter()
            .position(|a| a.path.eq_ignore_ascii_case(&path))?;
        Some(self.attachments.remove(pos))
    }

    /// Register a custom namespace so its elements and attributes are preserved
    pub fn register_custom_namespace(
        &mut self,
        prefix: impl Into<String>,
        uri: impl Into<String>,
    ) -> Result<()> {
        let prefix = prefix.into();
        let uri = uri.into();
        if Extension::from_namespace(&uri).is_some() {
            return Err(Error::InvalidModel(format!(
                "{} is a built-in namespace",
                uri
            )));
        }
        let builtin_prefix = Extension::all().iter().any(|e| e.prefix() == prefix);
        if prefix.is_empty()
            || builtin_prefix
            || self.custom_namespaces.iter().any(|n| n.prefix == prefix && n.uri != uri)
        {
            return Err(Error::InvalidModel(format!(
                "prefix '{}' is already bound",
                prefix
            )));
        }
        if !self.custom_namespaces.iter().any(|n| n.uri == uri) {
            self.custom_namespaces.push(CustomNamespace { prefix, uri });
        }
        Ok(())
    }

    // ----- queries --------------------------------------------------------

    /// Visit every mesh reachable from `object`, with its accumulated transform
    pub fn for_each_mesh_instance(
        &self,
        object: ResourceId,
        transform: &Transform,
        f: &mut dyn FnMut(ResourceId, &Object, &Mesh, &Transform),
    ) -> Result<()> {
        let obj = self.object(object)?;
        match obj.content() {
            ObjectContent::Mesh(mesh) => f(object, obj, mesh, transform),
            ObjectContent::Components(list) => {
                for component in list {
                    let local = component.transform.unwrap_or(Transform::IDENTITY);
                    self.for_each_mesh_instance(component.object, &local.then(transform), f)?;
                }
            }
            ObjectContent::LevelSet(ls) => {
                let local = ls.transform.unwrap_or(Transform::IDENTITY);
                if let Ok(bounds) = self.mesh(ls.mesh) {
                    let inner = self.object(ls.mesh)?;
                    f(ls.mesh, inner, bounds, &local.then(transform));
                }
            }
        }
        Ok(())
    }

    /// Axis-aligned bounding box of an object in its own coordinates
    ///
    /// Computed from the current geometry on every call. `None` when the
    /// object has no vertices.
    pub fn outbox(&self, object: ResourceId) -> Result<Option<BoundingBox>> {
        let mut bbox = None;
        self.for_each_mesh_instance(object, &Transform::IDENTITY, &mut |_, _, mesh, t| {
            if let Some(b) = mesh.bounding_box(t) {
                extend_box(&mut bbox, b.min);
                extend_box(&mut bbox, b.max);
            }
        })?;
        Ok(bbox)
    }

    /// Bounding box of all build items in build coordinates
    pub fn build_outbox(&self) -> Result<Option<BoundingBox>> {
        let mut bbox = None;
        for item in &self.build.items {
            self.for_each_mesh_instance(
                item.object,
                &item.effective_transform(),
                &mut |_, _, mesh, t| {
                    if let Some(b) = mesh.bounding_box(t) {
                        extend_box(&mut bbox, b.min);
                        extend_box(&mut bbox, b.max);
                    }
                },
            )?;
        }
        Ok(bbox)
    }

    /// Package parts owning at least one resource, root first
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = vec![ROOT_MODEL_PART.to_string()];
        for r in self.resources.values() {
            if !parts.contains(&r.part) {
                parts.push(r.part.clone());
            }
        }
        parts
    }

    // ----- merging --------------------------------------------------------

    /// Copy every resource, build item and attachment of `other` into this model
    ///
    /// Resource ids are remapped and all internal references rewritten.
    /// Returns the mapping from `other`'s ids to the new ids. The merge is
    /// all-or-nothing: conflicting build item UUIDs or attachment paths
    /// abort it before anything is copied.
    pub fn merge_from(&mut self, other: &Model) -> Result<HashMap<ResourceId, ResourceId>> {
        for item in &other.build.items {
            if let Some(uuid) = &item.uuid
                && self.build.has_uuid(uuid)
            {
                return Err(Error::DuplicateUuid(format!("build item UUID {}", uuid)));
            }
        }
        for a in &other.attachments {
            if let Some(mine) = self.attachment(&a.path)
                && mine.data != a.data
            {
                return Err(Error::DuplicatePart(a.path.clone()));
            }
        }

        let mut remap: HashMap<ResourceId, ResourceId> = HashMap::new();
        for id in other.resources.keys() {
            let new_id = self.allocate_id();
            remap.insert(*id, new_id);
        }
        let mut part_next: HashMap<String, u32> = HashMap::new();
        for resource in other.resources.values() {
            let mut kind = resource.kind.clone();
            kind.remap_references(&mut |id| remap.get(&id).copied().unwrap_or(id));
            let next = part_next
                .entry(resource.part.clone())
                .or_insert_with(|| self.next_model_id(&resource.part));
            let model_id = *next;
            *next += 1;
            let mut copy = Resource::new(remap[&resource.id], model_id, resource.part.clone(), kind);
            copy.custom_attributes = resource.custom_attributes.clone();
            copy.foreign_children = resource.foreign_children.clone();
            self.insert_resource(copy)?;
        }
        for item in &other.build.items {
            let mut item = item.clone();
            item.object = remap.get(&item.object).copied().unwrap_or(item.object);
            self.build.items.push(item);
        }
        for a in &other.attachments {
            if self.attachment(&a.path).is_none() {
                self.attachments.push(a.clone());
            }
        }
        tracing::debug!(resources = remap.len(), "merged model");
        Ok(remap)
    }

    /// Flatten the build into a new model holding a single mesh object
    ///
    /// Property groups, textures, attachments, metadata, unit and language
    /// are carried over; triangles keep their properties, with the object's
    /// default property applied to triangles that have none.
    pub fn merge_to_model(&self) -> Result<Model> {
        let mut out = Model::new();
        out.unit = self.unit;
        out.language = self.language.clone();
        out.metadata = self.metadata.clone();
        out.attachments = self.attachments.clone();

        let carried = |k: &ResourceKind| k.is_property_group() || matches!(k, ResourceKind::Texture2D(_));
        let mut remap: HashMap<ResourceId, ResourceId> = HashMap::new();
        // Dependencies (texture before texture group, base before composite) come first
        let mut pending: Vec<&Resource> = self.resources.values().filter(|r| carried(&r.kind)).collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut rest = Vec::new();
            for r in pending {
                if r.kind.references().iter().all(|id| remap.contains_key(id)) {
                    let mut kind = r.kind.clone();
                    kind.remap_references(&mut |id| remap.get(&id).copied().unwrap_or(id));
                    let new_id = out.add_resource(kind)?;
                    remap.insert(r.id, new_id);
                } else {
                    rest.push(r);
                }
            }
            if rest.len() == before {
                return Err(Error::DanglingReference(
                    "property group references an unknown resource".to_string(),
                ));
            }
            pending = rest;
        }

        let mut merged = Mesh::new();
        for item in &self.build.items {
            self.for_each_mesh_instance(
                item.object,
                &item.effective_transform(),
                &mut |_, obj, mesh, t| {
                    let base = merged.vertex_count() as u32;
                    for v in mesh.vertices() {
                        let [x, y, z] = t.apply(v.to_array());
                        merged.add_vertex(Vertex::new(x, y, z));
                    }
                    for tri in mesh.triangles() {
                        let mut copy = *tri;
                        copy.v1 += base;
                        copy.v2 += base;
                        copy.v3 += base;
                        if copy.pid.is_none() {
                            copy.pid = obj.pid;
                            copy.p1 = obj.pindex;
                            copy.p2 = None;
                            copy.p3 = None;
                        }
                        copy.pid = copy.pid.and_then(|p| remap.get(&p).copied());
                        if copy.pid.is_none() {
                            copy.p1 = None;
                            copy.p2 = None;
                            copy.p3 = None;
                        }
                        merged.push_triangle_unchecked(copy);
                    }
                },
            )?;
        }
        let id = out.add_resource(Object::mesh(merged))?;
        out.add_build_item(BuildItem::new(id))?;
        Ok(out)
    }

    /// Check every reference in the model, used before writing
    pub(crate) fn validate_references(&self) -> Result<()> {
        for resource in self.resources.values() {
            self.check_references(&resource.kind).map_err(|e| match e {
                Error::DanglingReference(msg) => Error::DanglingReference(format!(
                    "{} {}: {}",
                    resource.kind.type_name(),
                    resource.id,
                    msg
                )),
                other => other,
            })?;
        }
        let mut uuids = HashSet::new();
        for item in &self.build.items {
            self.object(item.object)?;
            if let Some(uuid) = &item.uuid
                && !uuids.insert(uuid.as_str())
            {
                return Err(Error::DuplicateUuid(format!("build item UUID {}", uuid)));
            }
        }
        self.check_acyclic()
    }
}

/// Role a resource can play as a multi-property layer
#[derive(Clone, Copy, PartialEq, Eq)]
enum LayerTag {
    Material,
    Color,
    Texture,
    MultiProperties,
    Other,
}

impl ResourceKind {
    fn layer_tag(&self) -> LayerTag {
        match self {
            ResourceKind::BaseMaterials(_) | ResourceKind::Composite(_) => LayerTag::Material,
            ResourceKind::Colors(_) => LayerTag::Color,
            ResourceKind::Texture2DGroup(_) => LayerTag::Texture,
            ResourceKind::MultiProperties(_) => LayerTag::MultiProperties,
            _ => LayerTag::Other,
        }
    }
}

fn object_property_uses(
    holder: ResourceId,
    object: &Object,
    uses: &mut Vec<(ResourceId, ResourceId, PropertyId)>,
) {
    if let (Some(pid), Some(p)) = (object.pid, object.pindex) {
        uses.push((holder, pid, p));
    }
    let ObjectContent::Mesh(mesh) = object.content() else {
        return;
    };
    for triangle in mesh.triangles() {
        if let Some(pid) = triangle.pid.or(object.pid) {
            for p in [triangle.p1, triangle.p2, triangle.p3].into_iter().flatten() {
                uses.push((holder, pid, p));
            }
        }
    }
    let Some(lattice) = &mesh.beam_lattice else {
        return;
    };
    if let (Some(pid), Some(p)) = (lattice.pid, lattice.pindex) {
        uses.push((holder, pid, p));
    }
    for beam in &lattice.beams {
        if let Some(pid) = beam.pid.or(lattice.pid) {
            for p in [beam.p1, beam.p2].into_iter().flatten() {
                uses.push((holder, pid, p));
            }
        }
    }
    for ball in &lattice.balls {
        if let (Some(pid), Some(p)) = (ball.pid.or(lattice.pid), ball.p) {
            uses.push((holder, pid, p));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(2.0, 0.0, 0.0));
        mesh.add_vertex(Vertex::new(0.0, 3.0, 1.0));
        mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();
        mesh
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut model = Model::new();
        let a = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        model.remove_resource(a).unwrap();
        let b = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        assert_ne!(a, b);
        assert_eq!(model.resource(b).unwrap().model_id(), 1);
    }

    #[test]
    fn test_remove_rejects_referenced_resource() {
        let mut model = Model::new();
        let mesh = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        let asm = model.add_resource(Object::components()).unwrap();
        model.add_component(asm, Component::new(mesh)).unwrap();
        let err = model.remove_resource(mesh).unwrap_err();
        assert!(matches!(err, Error::ResourceInUse(_)));
        assert!(model.resource(mesh).is_ok());

        model.add_build_item(BuildItem::new(asm)).unwrap();
        assert!(matches!(
            model.remove_resource(asm),
            Err(Error::ResourceInUse(_))
        ));
    }

    #[test]
    fn test_clearing_a_property_use_drops_the_triangle_properties() {
        let mut model = Model::new();
        let mut group = BaseMaterialGroup::new();
        let red = group.add_material("red", Color::rgb(255, 0, 0));
        let blue = group.add_material("blue", Color::rgb(0, 0, 255));
        let gid = model.add_resource(group).unwrap();
        let mut mesh = triangle_mesh();
        mesh.set_triangle_properties(0, Some(gid), [Some(red), Some(blue), None])
            .unwrap();
        let mesh_id = model.add_resource(Object::mesh(mesh)).unwrap();
        assert_eq!(model.property_uses().len(), 2);

        model.clear_property_use(mesh_id, gid, blue);
        assert!(model.property_uses().is_empty());
        let t = model.mesh(mesh_id).unwrap().triangles()[0];
        assert_eq!((t.pid, t.p1), (None, None));
        model.remove_property(gid, red).unwrap();
    }

    #[test]
    fn test_component_cycle_rejected() {
        let mut model = Model::new();
        let a = model.add_resource(Object::components()).unwrap();
        let b = model.add_resource(Object::components()).unwrap();
        model.add_component(a, Component::new(b)).unwrap();
        assert!(matches!(
            model.add_component(b, Component::new(a)),
            Err(Error::CyclicReference(_))
        ));
        assert!(model.add_component(a, Component::new(a)).is_err());
        assert!(model.check_acyclic().is_ok());
    }

    #[test]
    fn test_duplicate_build_uuid_rejected() {
        let mut model = Model::new();
        let id = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        let mut item = BuildItem::new(id);
        item.uuid = Some("b0d4a5ab-3c1c-4e0f-9d6e-2f6a3e4b5c6d".into());
        model.add_build_item(item.clone()).unwrap();
        assert!(matches!(
            model.add_build_item(item),
            Err(Error::DuplicateUuid(_))
        ));
    }

    #[test]
    fn test_multi_property_layer_rules() {
        let mut model = Model::new();
        let base = model.add_resource(BaseMaterialGroup::new()).unwrap();
        let base2 = model.add_resource(BaseMaterialGroup::new()).unwrap();
        let colors = model.add_resource(ColorGroup::new()).unwrap();
        let colors2 = model.add_resource(ColorGroup::new()).unwrap();
        let mesh = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        let multi = model.add_resource(MultiPropertyGroup::new()).unwrap();
        let layer = |resource| MultiPropertyLayer {
            resource,
            blend: BlendMethod::Mix,
        };
        assert_eq!(model.add_multi_property_layer(multi, layer(base)).unwrap(), 0);
        assert_eq!(model.add_multi_property_layer(multi, layer(colors)).unwrap(), 1);
        for bad in [base2, colors2, mesh, multi] {
            assert!(matches!(
                model.add_multi_property_layer(multi, layer(bad)),
                Err(Error::InvalidPropertyLayer(_))
            ));
        }
        assert_eq!(model.multi_properties(multi).unwrap().layers().len(), 2);
    }

    #[test]
    fn test_dangling_reference_rejected_on_add() {
        let mut model = Model::new();
        let mut asm = Object::components();
        asm.push_component(Component::new(ResourceId(42))).unwrap();
        assert!(matches!(
            model.add_resource(asm),
            Err(Error::DanglingReference(_))
        ));
        assert_eq!(model.resource_count(), 0);
    }

    #[test]
    fn test_outbox_recomputed_after_mutation() {
        let mut model = Model::new();
        let mesh = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        let asm = model.add_resource(Object::components()).unwrap();
        model
            .add_component(
                asm,
                Component::with_transform(mesh, Transform::translation(10.0, 0.0, 0.0)),
            )
            .unwrap();
        let bbox = model.outbox(asm).unwrap().unwrap();
        assert_eq!(bbox.min, [10.0, 0.0, 0.0]);
        assert_eq!(bbox.max, [12.0, 3.0, 1.0]);

        model.mesh_mut(mesh).unwrap().vertices_mut()[1].x = 5.0;
        let bbox = model.outbox(asm).unwrap().unwrap();
        assert_eq!(bbox.max[0], 15.0);
    }

    #[test]
    fn test_merge_remaps_references() {
        let mut source = Model::new();
        let mut group = BaseMaterialGroup::new();
        let red = group.add_material("red", Color::rgb(255, 0, 0));
        let gid = source.add_resource(group).unwrap();
        let mut mesh = triangle_mesh();
        mesh.set_triangle_properties(0, Some(gid), [Some(red), None, None])
            .unwrap();
        let obj = source.add_resource(Object::mesh(mesh)).unwrap();
        source.add_build_item(BuildItem::new(obj)).unwrap();

        let mut target = Model::new();
        target.add_resource(Object::mesh(triangle_mesh())).unwrap();
        let map = target.merge_from(&source).unwrap();
        let new_obj = map[&obj];
        let new_gid = map[&gid];
        assert_eq!(target.mesh(new_obj).unwrap().triangles()[0].pid, Some(new_gid));
        assert_eq!(target.build().items()[0].object, new_obj);
        let models: HashSet<u32> = target.resources().map(|r| r.model_id()).collect();
        assert_eq!(models.len(), 3);
    }

    #[test]
    fn test_merge_to_model_flattens_build() {
        let mut model = Model::new();
        let mesh = model.add_resource(Object::mesh(triangle_mesh())).unwrap();
        model
            .add_build_item(BuildItem::with_transform(mesh, Transform::translation(0.0, 0.0, 5.0)))
            .unwrap();
        model.add_build_item(BuildItem::new(mesh)).unwrap();
        let merged = model.merge_to_model().unwrap();
        let ids = merged.mesh_object_ids();
        assert_eq!(ids.len(), 1);
        let flat = merged.mesh(ids[0]).unwrap();
        assert_eq!(flat.vertex_count(), 6);
        assert_eq!(flat.triangle_count(), 2);
        assert_eq!(flat.vertices()[2].z, 6.0);
    }

    #[test]
    fn test_custom_namespace_registration() {
        let mut model = Model::new();
        model
            .register_custom_namespace("ex", "http://example.com/ext")
            .unwrap();
        assert!(model
            .register_custom_namespace("ex", "http://example.com/other")
            .is_err());
        assert!(model
            .register_custom_namespace("q", crate::namespaces::MATERIAL)
            .is_err());
    }
}
