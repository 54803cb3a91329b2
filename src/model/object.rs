//! Objects: meshes, component assemblies and level sets

use super::ResourceId;
use super::beam_lattice::BeamLattice;
use super::material::PropertyId;
use super::metadata::MetadataGroup;
use super::transform::{BoundingBox, Transform, extend_box};
use crate::error::{Error, Result};
use std::str::FromStr;

/// A vertex in 3D space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Coordinates as an array
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A triangle referencing three vertices by index
///
/// `pid` selects a property group; `p1..p3` select entries of that group
/// per corner. `p2` and `p3` default to `p1` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    /// Index of the first vertex
    pub v1: u32,
    /// Index of the second vertex
    pub v2: u32,
    /// Index of the third vertex
    pub v3: u32,
    /// Property group
    pub pid: Option<ResourceId>,
    /// Property at `v1`
    pub p1: Option<PropertyId>,
    /// Property at `v2`
    pub p2: Option<PropertyId>,
    /// Property at `v3`
    pub p3: Option<PropertyId>,
}

impl Triangle {
    /// Create a triangle without properties
    pub fn new(v1: u32, v2: u32, v3: u32) -> Self {
        Self {
            v1,
            v2,
            v3,
            pid: None,
            p1: None,
            p2: None,
            p3: None,
        }
    }

    /// Create a triangle with one property for all corners
    pub fn with_property(v1: u32, v2: u32, v3: u32, pid: ResourceId, p: PropertyId) -> Self {
        Self {
            pid: Some(pid),
            p1: Some(p),
            ..Self::new(v1, v2, v3)
        }
    }

    /// Vertex indices
    pub fn indices(&self) -> [u32; 3] {
        [self.v1, self.v2, self.v3]
    }
}

/// Triangle mesh geometry
///
/// Vertices and triangles are append-only through the API so that every
/// stored triangle keeps valid indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    /// Beam lattice attached to this mesh
    pub beam_lattice: Option<BeamLattice>,
    /// `<volumedata>` resource applied to the mesh interior
    pub volume_data: Option<ResourceId>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
            ..Self::default()
        }
    }

    /// Append a vertex and return its index
    pub fn add_vertex(&mut self, vertex: Vertex) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    /// Append a triangle and return its index
    ///
    /// Fails when an index is out of range or two indices coincide.
    pub fn add_triangle(&mut self, triangle: Triangle) -> Result<u32> {
        let count = self.vertices.len();
        if let Some(bad) = triangle.indices().iter().find(|i| **i as usize >= count) {
            return Err(Error::IndexOutOfRange(format!(
                "triangle vertex {} of {}",
                bad, count
            )));
        }
        if triangle.v1 == triangle.v2 || triangle.v2 == triangle.v3 || triangle.v1 == triangle.v3 {
            return Err(Error::InvalidModel(format!(
                "degenerate triangle ({}, {}, {})",
                triangle.v1, triangle.v2, triangle.v3
            )));
        }
        self.triangles.push(triangle);
        Ok((self.triangles.len() - 1) as u32)
    }

    /// Vertices in order
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Mutable vertex coordinates; the count cannot change
    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    /// Triangles in order
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub(crate) fn push_triangle_unchecked(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub(crate) fn triangles_mut(&mut self) -> &mut [Triangle] {
        &mut self.triangles
    }

    /// Set the property group and per-corner properties of one triangle
    pub fn set_triangle_properties(
        &mut self,
        index: usize,
        pid: Option<ResourceId>,
        properties: [Option<PropertyId>; 3],
    ) -> Result<()> {
        let count = self.triangles.len();
        let triangle = self
            .triangles
            .get_mut(index)
            .ok_or_else(|| Error::IndexOutOfRange(format!("triangle {} of {}", index, count)))?;
        triangle.pid = pid;
        [triangle.p1, triangle.p2, triangle.p3] = properties;
        Ok(())
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Axis-aligned box of all vertices under `transform`
    pub fn bounding_box(&self, transform: &Transform) -> Option<BoundingBox> {
        let mut bbox = None;
        for v in &self.vertices {
            extend_box(&mut bbox, transform.apply(v.to_array()));
        }
        bbox
    }
}

/// Reference to a child object with a placement
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Referenced object
    pub object: ResourceId,
    /// Placement relative to the parent
    pub transform: Option<Transform>,
    /// Production extension UUID
    pub uuid: Option<String>,
}

impl Component {
    /// Component without a transform
    pub fn new(object: ResourceId) -> Self {
        Self {
            object,
            transform: None,
            uuid: None,
        }
    }

    /// Component with a transform
    pub fn with_transform(object: ResourceId, transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            ..Self::new(object)
        }
    }
}

/// Level-set shape defined by a function evaluated inside a bounding mesh
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    /// Implicit function or field supplying the distance values
    pub function: ResourceId,
    /// Output channel of the function
    pub channel: String,
    /// Transform from object to function space
    pub transform: Option<Transform>,
    /// Minimum feature size
    pub min_feature_size: f64,
    /// Evaluate only inside the mesh bounding box
    pub mesh_bbox_only: bool,
    /// Value used where the function is undefined
    pub fallback_value: f64,
    /// Mesh object bounding the evaluation domain
    pub mesh: ResourceId,
    /// `<volumedata>` applied to the level set
    pub volume_data: Option<ResourceId>,
}

impl LevelSet {
    /// Level set bounded by `mesh`
    pub fn new(function: ResourceId, channel: impl Into<String>, mesh: ResourceId) -> Self {
        Self {
            function,
            channel: channel.into(),
            transform: None,
            min_feature_size: 0.0,
            mesh_bbox_only: false,
            fallback_value: 0.0,
            mesh,
            volume_data: None,
        }
    }
}

/// Geometry of an object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectContent {
    /// Triangle mesh
    Mesh(Mesh),
    /// Assembly of other objects; grow it through [`crate::Model::add_component`]
    Components(Vec<Component>),
    /// Level set
    LevelSet(LevelSet),
}

/// Object classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectType {
    /// Printable part
    #[default]
    Model,
    /// Support structure
    Support,
    /// Solid support
    SolidSupport,
    /// Surface
    Surface,
    /// Anything else
    Other,
}

impl ObjectType {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Model => "model",
            ObjectType::Support => "support",
            ObjectType::SolidSupport => "solidsupport",
            ObjectType::Surface => "surface",
            ObjectType::Other => "other",
        }
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "model" => Ok(ObjectType::Model),
            "support" => Ok(ObjectType::Support),
            "solidsupport" => Ok(ObjectType::SolidSupport),
            "surface" => Ok(ObjectType::Surface),
            "other" => Ok(ObjectType::Other),
            _ => Err(Error::parse_error_with_context(
                "type",
                s,
                "model, support, solidsupport, surface or other",
            )),
        }
    }
}

/// Resolution a slice stack stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshResolution {
    /// Full resolution
    #[default]
    FullRes,
    /// Low resolution
    LowRes,
}

impl MeshResolution {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshResolution::FullRes => "fullres",
            MeshResolution::LowRes => "lowres",
        }
    }
}

impl FromStr for MeshResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fullres" => Ok(MeshResolution::FullRes),
            "lowres" => Ok(MeshResolution::LowRes),
            _ => Err(Error::parse_error_with_context(
                "meshresolution",
                s,
                "fullres or lowres",
            )),
        }
    }
}

/// `<object>` resource
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Display name
    pub name: Option<String>,
    /// Part number
    pub part_number: Option<String>,
    /// Classification
    pub object_type: ObjectType,
    /// Production extension UUID
    pub uuid: Option<String>,
    /// Part name of a thumbnail image
    pub thumbnail: Option<String>,
    /// Default property group
    pub pid: Option<ResourceId>,
    /// Default property
    pub pindex: Option<PropertyId>,
    /// Slice stack describing the object
    pub slice_stack: Option<ResourceId>,
    /// Resolution the slice stack stands in for
    pub mesh_resolution: MeshResolution,
    /// Object metadata
    pub metadata: MetadataGroup,
    content: ObjectContent,
}

impl Object {
    fn with_content(content: ObjectContent) -> Self {
        Self {
            name: None,
            part_number: None,
            object_type: ObjectType::default(),
            uuid: None,
            thumbnail: None,
            pid: None,
            pindex: None,
            slice_stack: None,
            mesh_resolution: MeshResolution::default(),
            metadata: MetadataGroup::new(),
            content,
        }
    }

    /// Mesh object
    pub fn mesh(mesh: Mesh) -> Self {
        Self::with_content(ObjectContent::Mesh(mesh))
    }

    /// Empty components object
    pub fn components() -> Self {
        Self::with_content(ObjectContent::Components(Vec::new()))
    }

    /// Level-set object
    pub fn level_set(level_set: LevelSet) -> Self {
        Self::with_content(ObjectContent::LevelSet(level_set))
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Geometry
    pub fn content(&self) -> &ObjectContent {
        &self.content
    }

    /// Mesh, if this is a mesh object
    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.content {
            ObjectContent::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Mutable mesh, if this is a mesh object
    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.content {
            ObjectContent::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Components, empty unless this is a components object
    pub fn component_list(&self) -> &[Component] {
        match &self.content {
            ObjectContent::Components(list) => list,
            _ => &[],
        }
    }

    /// Level set, if this is a level-set object
    pub fn as_level_set(&self) -> Option<&LevelSet> {
        match &self.content {
            ObjectContent::LevelSet(level_set) => Some(level_set),
            _ => None,
        }
    }

    /// Mutable level set
    pub fn as_level_set_mut(&mut self) -> Option<&mut LevelSet> {
        match &mut self.content {
            ObjectContent::LevelSet(level_set) => Some(level_set),
            _ => None,
        }
    }

    pub(crate) fn content_mut(&mut self) -> &mut ObjectContent {
        &mut self.content
    }

    pub(crate) fn push_component(&mut self, component: Component) -> Result<()> {
        match &mut self.content {
            ObjectContent::Components(list) => {
                list.push(component);
                Ok(())
            }
            _ => Err(Error::InvalidModel(
                "components can only be added to a components object".to_string(),
            )),
        }
    }
}
