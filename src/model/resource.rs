//! The resource arena entry and its variants

use super::ResourceId;
use super::custom::{AnyAttribute, ForeignElement};
use super::material::{
    BaseMaterialGroup, ColorGroup, CompositeMaterials, MultiPropertyGroup, PropertyId, Texture2D,
    Texture2DGroup,
};
use super::object::{Object, ObjectContent};
use super::slice::SliceStack;
use super::volumetric::{
    FunctionFromImage3D, Image3D, ImplicitFunction, NodeConstant, ScalarField, ScalarFieldKind,
    Vector3DField, Vector3DFieldKind, VolumeData, VolumetricStack,
};

/// Payload of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    /// `<object>`
    Object(Object),
    /// `<basematerials>`
    BaseMaterials(BaseMaterialGroup),
    /// `<m:colorgroup>`
    Colors(ColorGroup),
    /// `<m:texture2d>`
    Texture2D(Texture2D),
    /// `<m:texture2dgroup>`
    Texture2DGroup(Texture2DGroup),
    /// `<m:compositematerials>`
    Composite(CompositeMaterials),
    /// `<m:multiproperties>`
    MultiProperties(MultiPropertyGroup),
    /// `<s:slicestack>`
    SliceStack(SliceStack),
    /// `<v:image3d>`
    Image3D(Image3D),
    /// `<v:scalarfield>`
    ScalarField(ScalarField),
    /// `<v:vector3dfield>`
    Vector3DField(Vector3DField),
    /// `<v:functionfromimage3d>`
    FunctionFromImage3D(FunctionFromImage3D),
    /// `<i:implicitfunction>`
    ImplicitFunction(ImplicitFunction),
    /// `<v:volumedata>`
    VolumeData(VolumeData),
    /// `<vs:volumetricstack>`
    VolumetricStack(VolumetricStack),
}

macro_rules! impl_from_kind {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for ResourceKind {
                fn from(value: $ty) -> Self {
                    ResourceKind::$variant(value)
                }
            }
        )*
    };
}

impl_from_kind!(
    Object(Object),
    BaseMaterials(BaseMaterialGroup),
    Colors(ColorGroup),
    Texture2D(Texture2D),
    Texture2DGroup(Texture2DGroup),
    Composite(CompositeMaterials),
    MultiProperties(MultiPropertyGroup),
    SliceStack(SliceStack),
    Image3D(Image3D),
    ScalarField(ScalarField),
    Vector3DField(Vector3DField),
    FunctionFromImage3D(FunctionFromImage3D),
    ImplicitFunction(ImplicitFunction),
    VolumeData(VolumeData),
    VolumetricStack(VolumetricStack),
);

impl ResourceKind {
    /// Element name used for this kind in messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Object(_) => "object",
            ResourceKind::BaseMaterials(_) => "basematerials",
            ResourceKind::Colors(_) => "colorgroup",
            ResourceKind::Texture2D(_) => "texture2d",
            ResourceKind::Texture2DGroup(_) => "texture2dgroup",
            ResourceKind::Composite(_) => "compositematerials",
            ResourceKind::MultiProperties(_) => "multiproperties",
            ResourceKind::SliceStack(_) => "slicestack",
            ResourceKind::Image3D(_) => "image3d",
            ResourceKind::ScalarField(_) => "scalarfield",
            ResourceKind::Vector3DField(_) => "vector3dfield",
            ResourceKind::FunctionFromImage3D(_) => "functionfromimage3d",
            ResourceKind::ImplicitFunction(_) => "implicitfunction",
            ResourceKind::VolumeData(_) => "volumedata",
            ResourceKind::VolumetricStack(_) => "volumetricstack",
        }
    }

    /// Whether triangles may use this resource as their `pid`
    pub fn is_property_group(&self) -> bool {
        matches!(
            self,
            ResourceKind::BaseMaterials(_)
                | ResourceKind::Colors(_)
                | ResourceKind::Texture2DGroup(_)
                | ResourceKind::Composite(_)
                | ResourceKind::MultiProperties(_)
        )
    }

    /// Number of entries when this is a property group
    pub fn property_count(&self) -> Option<usize> {
        match self {
            ResourceKind::BaseMaterials(g) => Some(g.materials.len()),
            ResourceKind::Colors(g) => Some(g.colors.len()),
            ResourceKind::Texture2DGroup(g) => Some(g.coords.len()),
            ResourceKind::Composite(g) => Some(g.composites().len()),
            ResourceKind::MultiProperties(g) => Some(g.multis.len()),
            _ => None,
        }
    }

    /// XML index of a property id when this is a property group
    pub fn property_index(&self, id: PropertyId) -> Option<usize> {
        match self {
            ResourceKind::BaseMaterials(g) => g.materials.index_of(id),
            ResourceKind::Colors(g) => g.colors.index_of(id),
            ResourceKind::Texture2DGroup(g) => g.coords.index_of(id),
            ResourceKind::Composite(g) => g.composites().index_of(id),
            ResourceKind::MultiProperties(g) => g.multis.index_of(id),
            _ => None,
        }
    }

    /// Every resource id this kind refers to, in a stable order
    pub fn references(&self) -> Vec<ResourceId> {
        let mut out = Vec::new();
        match self {
            ResourceKind::Object(obj) => {
                out.extend(obj.pid);
                out.extend(obj.slice_stack);
                match obj.content() {
                    ObjectContent::Mesh(mesh) => {
                        out.extend(mesh.triangles().iter().filter_map(|t| t.pid));
                        out.extend(mesh.volume_data);
                        if let Some(lattice) = &mesh.beam_lattice {
                            out.extend(lattice.clipping_mesh);
                            out.extend(lattice.representation_mesh);
                            out.extend(lattice.pid);
                            out.extend(lattice.beams.iter().filter_map(|b| b.pid));
                            out.extend(lattice.balls.iter().filter_map(|b| b.pid));
                        }
                    }
                    ObjectContent::Components(list) => {
                        out.extend(list.iter().map(|c| c.object));
                    }
                    ObjectContent::LevelSet(ls) => {
                        out.push(ls.function);
                        out.push(ls.mesh);
                        out.extend(ls.volume_data);
                    }
                }
            }
            ResourceKind::Texture2DGroup(g) => out.push(g.texture),
            ResourceKind::Composite(g) => out.push(g.base_materials),
            ResourceKind::MultiProperties(g) => out.extend(g.layers.iter().map(|l| l.resource)),
            ResourceKind::SliceStack(s) => out.extend_from_slice(&s.slice_refs),
            ResourceKind::ScalarField(f) => match &f.kind {
                ScalarFieldKind::Constant(_) => {}
                ScalarFieldKind::FromImage3D(s) => out.push(s.image),
                ScalarFieldKind::Composed(c) => {
                    out.push(c.field1);
                    out.push(c.field2);
                    out.extend(c.mask);
                }
            },
            ResourceKind::Vector3DField(f) => match &f.kind {
                Vector3DFieldKind::Constant(_) => {}
                Vector3DFieldKind::FromImage3D(s) => out.push(s.image),
                Vector3DFieldKind::Composed(c) => {
                    out.push(c.field1);
                    out.push(c.field2);
                    out.extend(c.mask);
                }
            },
            ResourceKind::FunctionFromImage3D(f) => out.push(f.sampler.image),
            ResourceKind::ImplicitFunction(f) => {
                for node in &f.nodes {
                    if let Some(NodeConstant::Resource(id)) = &node.constant {
                        out.push(*id);
                    }
                }
            }
            ResourceKind::VolumeData(v) => {
                out.extend(v.color.as_ref().map(|c| c.function));
                out.extend(v.properties.iter().map(|p| p.field.function));
            }
            ResourceKind::VolumetricStack(s) => {
                for layer in &s.layers {
                    out.extend(layer.mask.as_ref().map(|m| m.image));
                    out.extend(layer.sources.iter().map(|m| m.image));
                }
            }
            ResourceKind::BaseMaterials(_)
            | ResourceKind::Colors(_)
            | ResourceKind::Texture2D(_)
            | ResourceKind::Image3D(_) => {}
        }
        out
    }

    /// Rewrite every resource id this kind refers to
    pub(crate) fn remap_references(&mut self, f: &mut dyn FnMut(ResourceId) -> ResourceId) {
        let mut map = |id: &mut ResourceId| *id = f(*id);
        match self {
            ResourceKind::Object(obj) => {
                obj.pid.iter_mut().for_each(&mut map);
                obj.slice_stack.iter_mut().for_each(&mut map);
                match obj.content_mut() {
                    ObjectContent::Mesh(mesh) => {
                        for t in mesh.triangles_mut() {
                            t.pid.iter_mut().for_each(&mut map);
                        }
                        mesh.volume_data.iter_mut().for_each(&mut map);
                        if let Some(lattice) = &mut mesh.beam_lattice {
                            lattice.clipping_mesh.iter_mut().for_each(&mut map);
                            lattice.representation_mesh.iter_mut().for_each(&mut map);
                            lattice.pid.iter_mut().for_each(&mut map);
                            for b in &mut lattice.beams {
                                b.pid.iter_mut().for_each(&mut map);
                            }
                            for b in &mut lattice.balls {
                                b.pid.iter_mut().for_each(&mut map);
                            }
                        }
                    }
                    ObjectContent::Components(list) => {
                        for c in list {
                            map(&mut c.object);
                        }
                    }
                    ObjectContent::LevelSet(ls) => {
                        map(&mut ls.function);
                        map(&mut ls.mesh);
                        ls.volume_data.iter_mut().for_each(&mut map);
                    }
                }
            }
            ResourceKind::Texture2DGroup(g) => map(&mut g.texture),
            ResourceKind::Composite(g) => map(&mut g.base_materials),
            ResourceKind::MultiProperties(g) => {
                for layer in &mut g.layers {
                    map(&mut layer.resource);
                }
            }
            ResourceKind::SliceStack(s) => {
                for id in &mut s.slice_refs {
                    map(id);
                }
            }
            ResourceKind::ScalarField(field) => match &mut field.kind {
                ScalarFieldKind::Constant(_) => {}
                ScalarFieldKind::FromImage3D(s) => map(&mut s.image),
                ScalarFieldKind::Composed(c) => {
                    map(&mut c.field1);
                    map(&mut c.field2);
                    c.mask.iter_mut().for_each(&mut map);
                }
            },
            ResourceKind::Vector3DField(field) => match &mut field.kind {
                Vector3DFieldKind::Constant(_) => {}
                Vector3DFieldKind::FromImage3D(s) => map(&mut s.image),
                Vector3DFieldKind::Composed(c) => {
                    map(&mut c.field1);
                    map(&mut c.field2);
                    c.mask.iter_mut().for_each(&mut map);
                }
            },
            ResourceKind::FunctionFromImage3D(func) => map(&mut func.sampler.image),
            ResourceKind::ImplicitFunction(func) => {
                for node in &mut func.nodes {
                    if let Some(NodeConstant::Resource(id)) = &mut node.constant {
                        map(id);
                    }
                }
            }
            ResourceKind::VolumeData(v) => {
                if let Some(color) = &mut v.color {
                    map(&mut color.function);
                }
                for p in &mut v.properties {
                    map(&mut p.field.function);
                }
            }
            ResourceKind::VolumetricStack(s) => {
                for layer in &mut s.layers {
                    if let Some(mask) = &mut layer.mask {
                        map(&mut mask.image);
                    }
                    for src in &mut layer.sources {
                        map(&mut src.image);
                    }
                }
            }
            ResourceKind::BaseMaterials(_)
            | ResourceKind::Colors(_)
            | ResourceKind::Texture2D(_)
            | ResourceKind::Image3D(_) => {}
        }
    }
}

/// One entry of the model's resource arena
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) model_id: u32,
    pub(crate) part: String,
    /// Payload
    pub kind: ResourceKind,
    /// Attributes in preserved custom namespaces
    pub custom_attributes: Vec<AnyAttribute>,
    /// Child elements in preserved custom namespaces
    pub foreign_children: Vec<ForeignElement>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, model_id: u32, part: String, kind: ResourceKind) -> Self {
        Self {
            id,
            model_id,
            part,
            kind,
            custom_attributes: Vec::new(),
            foreign_children: Vec::new(),
        }
    }

    /// Process-unique id
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Id written to XML, unique within the owning part
    pub fn model_id(&self) -> u32 {
        self.model_id
    }

    /// Owning package part
    pub fn part(&self) -> &str {
        &self.part
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::object::{Component, Mesh, Triangle, Vertex};

    #[test]
    fn test_references_and_remap() {
        let mut asm = Object::components();
        asm.push_component(Component::new(ResourceId(4))).unwrap();
        asm.push_component(Component::new(ResourceId(5))).unwrap();
        asm.pid = Some(ResourceId(9));
        let mut kind = ResourceKind::from(asm);
        assert_eq!(
            kind.references(),
            vec![ResourceId(9), ResourceId(4), ResourceId(5)]
        );
        kind.remap_references(&mut |id| ResourceId(id.0 + 100));
        assert_eq!(
            kind.references(),
            vec![ResourceId(109), ResourceId(104), ResourceId(105)]
        );
    }

    #[test]
    fn test_mesh_triangle_pids_are_references() {
        let mut mesh = Mesh::new();
        for i in 0..3 {
            mesh.add_vertex(Vertex::new(i as f64, (i * i) as f64, 0.0));
        }
        mesh.add_triangle(Triangle::with_property(
            0,
            1,
            2,
            ResourceId(2),
            crate::model::PropertyId(1),
        ))
        .unwrap();
        let kind = ResourceKind::from(Object::mesh(mesh));
        assert_eq!(kind.references(), vec![ResourceId(2)]);
        assert_eq!(kind.type_name(), "object");
    }
}
