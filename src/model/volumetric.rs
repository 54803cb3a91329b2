//! Volumetric and implicit-function extension types
//!
//! Covers the 2022/01 volumetric revision (image stacks, scalar and vector
//! fields, volume data), implicit function graphs, and the 2019/07
//! volumetric stacks.

use super::ResourceId;
use super::material::{TextureFilter, TileStyle};
use super::transform::Transform;
use crate::error::{Error, Result};
use std::str::FromStr;

/// 3D image assembled from a stack of 2D sheets
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Image3D {
    /// Display name
    pub name: String,
    /// Pixel rows per sheet
    pub row_count: u32,
    /// Pixel columns per sheet
    pub column_count: u32,
    /// Part names of the sheet images, bottom to top
    pub sheets: Vec<String>,
}

/// Sampling parameters shared by every field or function read from an [`Image3D`]
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSampler {
    /// Source image
    pub image: ResourceId,
    /// Channel name (`R`, `G`, `B`, `A`); empty for vector sampling
    pub channel: String,
    /// Filter
    pub filter: TextureFilter,
    /// Value offset
    pub offset: f64,
    /// Value scale
    pub scale: f64,
    /// Tiling along u
    pub tile_style_u: TileStyle,
    /// Tiling along v
    pub tile_style_v: TileStyle,
    /// Tiling along w
    pub tile_style_w: TileStyle,
}

impl ImageSampler {
    /// Sampler with identity scale and wrapping tiles
    pub fn new(image: ResourceId) -> Self {
        Self {
            image,
            channel: String::new(),
            filter: TextureFilter::Linear,
            offset: 0.0,
            scale: 1.0,
            tile_style_u: TileStyle::Wrap,
            tile_style_v: TileStyle::Wrap,
            tile_style_w: TileStyle::Wrap,
        }
    }
}

/// How two fields are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositionMethod {
    /// `factor1 * a + factor2 * b`
    #[default]
    WeightedSum,
    /// `a * b`
    Multiply,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `mask * a + (1 - mask) * b`
    Mask,
}

impl CompositionMethod {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositionMethod::WeightedSum => "weightedsum",
            CompositionMethod::Multiply => "multiply",
            CompositionMethod::Min => "min",
            CompositionMethod::Max => "max",
            CompositionMethod::Mask => "mask",
        }
    }
}

impl FromStr for CompositionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weightedsum" => Ok(CompositionMethod::WeightedSum),
            "multiply" => Ok(CompositionMethod::Multiply),
            "min" => Ok(CompositionMethod::Min),
            "max" => Ok(CompositionMethod::Max),
            "mask" => Ok(CompositionMethod::Mask),
            _ => Err(Error::parse_error_with_context(
                "method",
                s,
                "weightedsum, multiply, min, max or mask",
            )),
        }
    }
}

/// Composition of two fields of the same kind
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedField {
    /// Combination rule
    pub method: CompositionMethod,
    /// Weight of the first field
    pub factor1: f64,
    /// Weight of the second field
    pub factor2: f64,
    /// First field
    pub field1: ResourceId,
    /// Second field
    pub field2: ResourceId,
    /// Scalar mask, required for [`CompositionMethod::Mask`]
    pub mask: Option<ResourceId>,
    /// Transform applied to the first field
    pub transform1: Option<Transform>,
    /// Transform applied to the second field
    pub transform2: Option<Transform>,
    /// Transform applied to the mask
    pub transform_mask: Option<Transform>,
}

impl ComposedField {
    /// Weighted sum of two fields
    pub fn new(method: CompositionMethod, field1: ResourceId, field2: ResourceId) -> Self {
        Self {
            method,
            factor1: 1.0,
            factor2: 1.0,
            field1,
            field2,
            mask: None,
            transform1: None,
            transform2: None,
            transform_mask: None,
        }
    }
}

/// Variants of a scalar field
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarFieldKind {
    /// Same value everywhere
    Constant(f64),
    /// Sampled from one channel of an image
    FromImage3D(ImageSampler),
    /// Combination of two scalar fields
    Composed(ComposedField),
}

/// `<scalarfield>` resource
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    /// Display name
    pub name: String,
    /// Field definition
    pub kind: ScalarFieldKind,
}

/// Variants of a vector field
#[derive(Debug, Clone, PartialEq)]
pub enum Vector3DFieldKind {
    /// Same vector everywhere
    Constant([f64; 3]),
    /// Sampled from the RGB channels of an image
    FromImage3D(ImageSampler),
    /// Combination of two vector fields
    Composed(ComposedField),
}

/// `<vector3dfield>` resource
#[derive(Debug, Clone, PartialEq)]
pub struct Vector3DField {
    /// Display name
    pub name: String,
    /// Field definition
    pub kind: Vector3DFieldKind,
}

/// Function defined by sampling an image
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionFromImage3D {
    /// Display name
    pub display_name: String,
    /// Sampling parameters
    pub sampler: ImageSampler,
}

/// Value type flowing through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Scalar
    Scalar,
    /// 3-vector
    Vector,
    /// 4x4 matrix
    Matrix,
    /// Resource id
    ResourceId,
}

impl PortType {
    /// Element name of a port declaration
    pub fn element(&self) -> &'static str {
        match self {
            PortType::Scalar => "scalar",
            PortType::Vector => "vector",
            PortType::Matrix => "matrix",
            PortType::ResourceId => "resourceid",
        }
    }

    /// Element name of a port reference
    pub fn ref_element(&self) -> &'static str {
        match self {
            PortType::Scalar => "scalarref",
            PortType::Vector => "vectorref",
            PortType::Matrix => "matrixref",
            PortType::ResourceId => "resourceref",
        }
    }

    /// Port type and whether the element is a reference
    pub fn from_element(name: &str) -> Option<(PortType, bool)> {
        Some(match name {
            "scalar" => (PortType::Scalar, false),
            "vector" => (PortType::Vector, false),
            "matrix" => (PortType::Matrix, false),
            "resourceid" => (PortType::ResourceId, false),
            "scalarref" => (PortType::Scalar, true),
            "vectorref" => (PortType::Vector, true),
            "matrixref" => (PortType::Matrix, true),
            "resourceref" => (PortType::ResourceId, true),
            _ => return None,
        })
    }
}

/// Input or output of a function or node
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    /// Identifier, unique within its list
    pub identifier: String,
    /// Display name
    pub display_name: String,
    /// Value type
    pub port_type: PortType,
    /// Source `node.port` (or `inputs.name`) for inputs that reference another port
    pub reference: Option<String>,
}

impl Port {
    /// Unconnected port
    pub fn new(identifier: impl Into<String>, port_type: PortType) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: String::new(),
            port_type,
            reference: None,
        }
    }

    /// Port connected to `reference`
    pub fn linked(
        identifier: impl Into<String>,
        port_type: PortType,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::new(identifier, port_type)
        }
    }
}

macro_rules! node_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Operation performed by an implicit node
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NodeKind {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        impl NodeKind {
            /// Element name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(NodeKind::$variant => $name,)*
                }
            }

            /// Node kind for an element name
            pub fn from_element(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(NodeKind::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

node_kinds! {
    Addition => "addition",
    Subtraction => "subtraction",
    Multiplication => "multiplication",
    Division => "division",
    Constant => "constant",
    ConstVec => "constvec",
    ConstMat => "constmat",
    ConstResourceId => "constresourceid",
    ComposeVector => "composevector",
    DecomposeVector => "decomposevector",
    ComposeMatrix => "composematrix",
    ComposeMatrixFromColumnVectors => "matrixfromcolumns",
    DotProduct => "dot",
    CrossProduct => "cross",
    MatVecMultiplication => "matvecmultiplication",
    Transpose => "transpose",
    Sine => "sin",
    Cosine => "cos",
    Tan => "tan",
    ArcSin => "arcsin",
    ArcCos => "arccos",
    ArcTan => "arctan",
    Min => "min",
    Max => "max",
    Abs => "abs",
    Fmod => "fmod",
    Pow => "pow",
    Sqrt => "sqrt",
    Length => "length",
    FunctionCall => "functioncall",
    Mesh => "mesh",
}

/// Literal value of a constant node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConstant {
    /// `constant`
    Scalar(f64),
    /// `constvec`
    Vector([f64; 3]),
    /// `constmat`, row-major
    Matrix([f64; 16]),
    /// `constresourceid`
    Resource(ResourceId),
}

/// One node of an implicit function graph
#[derive(Debug, Clone, PartialEq)]
pub struct ImplicitNode {
    /// Operation
    pub kind: NodeKind,
    /// Identifier, unique within the function
    pub identifier: String,
    /// Display name
    pub display_name: String,
    /// Inputs
    pub inputs: Vec<Port>,
    /// Outputs
    pub outputs: Vec<Port>,
    /// Literal for constant nodes
    pub constant: Option<NodeConstant>,
}

impl ImplicitNode {
    /// Node without ports
    pub fn new(kind: NodeKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            display_name: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            constant: None,
        }
    }
}

/// `<implicitfunction>` resource
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImplicitFunction {
    /// Display name
    pub display_name: String,
    /// Function arguments
    pub inputs: Vec<Port>,
    /// Function results, referencing node outputs
    pub outputs: Vec<Port>,
    /// Nodes in evaluation order
    pub nodes: Vec<ImplicitNode>,
}

impl ImplicitFunction {
    /// Check identifier uniqueness and that every reference names a declared port
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.identifier == "inputs" || !seen.insert(node.identifier.as_str()) {
                return Err(Error::InvalidModel(format!(
                    "Implicit function '{}' has duplicate node identifier '{}'",
                    self.display_name, node.identifier
                )));
            }
        }
        let resolves = |reference: &str| -> bool {
            let Some((node, port)) = reference.split_once('.') else {
                return false;
            };
            if node == "inputs" {
                return self.inputs.iter().any(|p| p.identifier == port);
            }
            self.nodes
                .iter()
                .find(|n| n.identifier == node)
                .is_some_and(|n| n.outputs.iter().any(|p| p.identifier == port))
        };
        let references = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .chain(self.outputs.iter())
            .filter_map(|p| p.reference.as_deref());
        for reference in references {
            if !resolves(reference) {
                return Err(Error::DanglingReference(format!(
                    "Implicit function '{}' references unknown port '{}'",
                    self.display_name, reference
                )));
            }
        }
        Ok(())
    }
}

/// A function or field reference used by volume data
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReference {
    /// Function or field resource
    pub function: ResourceId,
    /// Output channel of the function
    pub channel: String,
    /// Transform from object to field space
    pub transform: Option<Transform>,
    /// Minimum feature size
    pub min_feature_size: f64,
    /// Value used where the function is undefined
    pub fallback_value: f64,
}

impl FieldReference {
    /// Reference with default sampling parameters
    pub fn new(function: ResourceId, channel: impl Into<String>) -> Self {
        Self {
            function,
            channel: channel.into(),
            transform: None,
            min_feature_size: 0.0,
            fallback_value: 0.0,
        }
    }
}

/// Named property carried by volume data
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProperty {
    /// Property name
    pub name: String,
    /// Source
    pub field: FieldReference,
    /// Consumers must understand the property
    pub required: bool,
}

/// `<volumedata>` resource referenced by meshes and level sets
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeData {
    /// Color source
    pub color: Option<FieldReference>,
    /// Additional properties, names unique
    pub properties: Vec<VolumeProperty>,
}

/// Background value of a destination channel in a volumetric stack
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationChannel {
    /// Channel name
    pub name: String,
    /// Background value
    pub background: f64,
}

/// Maps one image channel onto a destination channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSelector {
    /// Source image
    pub image: ResourceId,
    /// Channel read from the image
    pub src_channel: String,
    /// Channel written in the stack
    pub dst_channel: String,
    /// Value mapped from 0
    pub min_value: f64,
    /// Value mapped from 1
    pub max_value: f64,
    /// Filter
    pub filter: TextureFilter,
    /// Tiling along u
    pub tile_style_u: TileStyle,
    /// Tiling along v
    pub tile_style_v: TileStyle,
    /// Tiling along w
    pub tile_style_w: TileStyle,
}

impl ChannelSelector {
    /// Selector with unit range
    pub fn new(
        image: ResourceId,
        src_channel: impl Into<String>,
        dst_channel: impl Into<String>,
    ) -> Self {
        Self {
            image,
            src_channel: src_channel.into(),
            dst_channel: dst_channel.into(),
            min_value: 0.0,
            max_value: 1.0,
            filter: TextureFilter::Linear,
            tile_style_u: TileStyle::Wrap,
            tile_style_v: TileStyle::Wrap,
            tile_style_w: TileStyle::Wrap,
        }
    }
}

/// Layer of a volumetric stack
#[derive(Debug, Clone, PartialEq)]
pub struct VolumetricLayer {
    /// Transform from object to image space
    pub transform: Transform,
    /// Blend method name
    pub blend_method: String,
    /// Source alpha
    pub src_alpha: f64,
    /// Destination alpha
    pub dst_alpha: f64,
    /// Optional mask
    pub mask: Option<ChannelSelector>,
    /// Source selectors
    pub sources: Vec<ChannelSelector>,
}

/// `<volumetricstack>` resource (2019/07 revision)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumetricStack {
    /// Declared destination channels
    pub channels: Vec<DestinationChannel>,
    /// Layers, bottom first
    pub layers: Vec<VolumetricLayer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_function() -> ImplicitFunction {
        let mut add = ImplicitNode::new(NodeKind::Addition, "add");
        add.inputs.push(Port::linked("A", PortType::Scalar, "inputs.a"));
        add.inputs.push(Port::linked("B", PortType::Scalar, "one.value"));
        add.outputs.push(Port::new("result", PortType::Scalar));
        let mut one = ImplicitNode::new(NodeKind::Constant, "one");
        one.outputs.push(Port::new("value", PortType::Scalar));
        one.constant = Some(NodeConstant::Scalar(1.0));
        ImplicitFunction {
            display_name: "f".into(),
            inputs: vec![Port::new("a", PortType::Scalar)],
            outputs: vec![Port::linked("shape", PortType::Scalar, "add.result")],
            nodes: vec![one, add],
        }
    }

    #[test]
    fn test_function_references_resolve() {
        assert!(sample_function().validate().is_ok());
    }

    #[test]
    fn test_function_dangling_reference() {
        let mut f = sample_function();
        f.outputs[0].reference = Some("add.missing".into());
        assert!(matches!(f.validate(), Err(Error::DanglingReference(_))));
    }

    #[test]
    fn test_function_duplicate_identifier() {
        let mut f = sample_function();
        f.nodes[1].identifier = "one".into();
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_node_kind_names() {
        assert_eq!(NodeKind::from_element("addition"), Some(NodeKind::Addition));
        assert_eq!(NodeKind::DotProduct.as_str(), "dot");
        assert_eq!(NodeKind::from_element("bogus"), None);
        assert_eq!(PortType::from_element("vectorref"), Some((PortType::Vector, true)));
    }
}
