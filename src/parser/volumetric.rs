//! Volumetric data, implicit functions and volumetric stacks

use super::context::parse_list;
use super::part::{Node, PartParser, PendingResource};
use super::scope::XmlElement;
use crate::error::{Error, Result};
use crate::model::{
    ChannelSelector, ComposedField, CompositionMethod, DestinationChannel, FieldReference,
    FunctionFromImage3D, Image3D, ImageSampler, ImplicitFunction, ImplicitNode, LevelSet,
    NodeConstant, NodeKind, ObjectContent, Port, PortType, ResourceId, ResourceKind, ScalarField,
    ScalarFieldKind, TextureFilter, TileStyle, Transform, Vector3DField, Vector3DFieldKind,
    VolumeData, VolumeProperty, VolumetricLayer, VolumetricStack, normalize_part_name,
};

fn resource(
    p: &mut PartParser<'_>,
    el: &XmlElement,
    kind: impl Into<ResourceKind>,
    has_content: bool,
) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resources), "resources")?;
    let (id, model_id) = p.declare(el)?;
    let mut pending = PendingResource::new(id, model_id, kind);
    pending.has_content = has_content;
    pending.custom = p.custom_attributes(el);
    Ok(Node::Resource(Box::new(pending)))
}

/// Replace the definition of the enclosing field; a field has exactly one
fn define(p: &mut PartParser<'_>, el: &XmlElement, set: impl FnOnce(&mut ResourceKind) -> bool) -> Result<Node> {
    let pending = p
        .pending_mut()
        .ok_or_else(|| Error::invalid_xml_element(&el.local, "must be inside a field resource"))?;
    if pending.has_content {
        return Err(Error::invalid_xml_element(&el.local, "field is already defined"));
    }
    if !set(&mut pending.kind) {
        return Err(Error::invalid_xml_element(&el.local, "does not belong to this resource"));
    }
    pending.has_content = true;
    Ok(Node::Leaf)
}

fn sampler(p: &mut PartParser<'_>, el: &XmlElement) -> Result<ImageSampler> {
    let mut sampler = ImageSampler::new(p.require_reference(el, "image3did")?);
    sampler.channel = el.attr("channel").unwrap_or_default().to_string();
    sampler.filter = p.state.or(el, "filter", TextureFilter::Linear)?;
    sampler.offset = p.state.float(el, "offset")?.unwrap_or(0.0);
    sampler.scale = p.state.float(el, "scale")?.unwrap_or(1.0);
    sampler.tile_style_u = p.state.or(el, "tilestyleu", TileStyle::Wrap)?;
    sampler.tile_style_v = p.state.or(el, "tilestylev", TileStyle::Wrap)?;
    sampler.tile_style_w = p.state.or(el, "tilestylew", TileStyle::Wrap)?;
    Ok(sampler)
}

fn composed(p: &mut PartParser<'_>, el: &XmlElement, field1: &str, field2: &str) -> Result<ComposedField> {
    let method = p.state.or(el, "method", CompositionMethod::default())?;
    let mut composed = ComposedField::new(
        method,
        p.require_reference(el, field1)?,
        p.require_reference(el, field2)?,
    );
    composed.factor1 = p.state.float(el, "factor1")?.unwrap_or(1.0);
    composed.factor2 = p.state.float(el, "factor2")?.unwrap_or(1.0);
    composed.mask = p.reference(el, "scalarfieldmaskid")?;
    composed.transform1 = p.state.transform(el, "transform1")?;
    composed.transform2 = p.state.transform(el, "transform2")?;
    composed.transform_mask = p.state.transform(el, "transformmask")?;
    if composed.method == CompositionMethod::Mask && composed.mask.is_none() {
        return Err(Error::missing_attribute(&el.local, "scalarfieldmaskid"));
    }
    Ok(composed)
}

fn field_reference(p: &mut PartParser<'_>, el: &XmlElement) -> Result<FieldReference> {
    let mut field = FieldReference::new(
        p.require_reference(el, "functionid")?,
        el.attr("channel").unwrap_or_default(),
    );
    field.transform = p.state.transform(el, "transform")?;
    field.min_feature_size = p.state.float(el, "minfeaturesize")?.unwrap_or(0.0);
    field.fallback_value = p.state.float(el, "fallbackvalue")?.unwrap_or(0.0);
    Ok(field)
}

// ----- image stacks ---------------------------------------------------------

pub(crate) fn open_image3d(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let image = Image3D {
        name: el.attr("name").unwrap_or_default().to_string(),
        ..Default::default()
    };
    resource(p, el, image, false)
}

pub(crate) fn open_image_stack(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "image3d")?;
    let rows = p.state.or(el, "rowcount", 0u32)?;
    let columns = p.state.or(el, "columncount", 0u32)?;
    define(p, el, |kind| match kind {
        ResourceKind::Image3D(image) => {
            image.row_count = rows;
            image.column_count = columns;
            true
        }
        _ => false,
    })?;
    Ok(Node::ImageStack)
}

pub(crate) fn open_image_sheet(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::ImageStack), "imagestack")?;
    let path = normalize_part_name(el.require("path")?.trim());
    match p.kind_mut("imagesheet")? {
        ResourceKind::Image3D(image) => image.sheets.push(path),
        _ => return Err(Error::invalid_xml_element("imagesheet", "must be inside <image3d>")),
    }
    Ok(Node::Leaf)
}

// ----- fields ---------------------------------------------------------------

pub(crate) fn open_scalar_field(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let field = ScalarField {
        name: el.attr("name").unwrap_or_default().to_string(),
        kind: ScalarFieldKind::Constant(0.0),
    };
    resource(p, el, field, false)
}

fn set_scalar(p: &mut PartParser<'_>, el: &XmlElement, value: ScalarFieldKind) -> Result<Node> {
    define(p, el, move |kind| match kind {
        ResourceKind::ScalarField(field) => {
            field.kind = value;
            true
        }
        _ => false,
    })
}

pub(crate) fn open_scalar_constant(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let value = p.state.req_float(el, "value")?;
    set_scalar(p, el, ScalarFieldKind::Constant(value))
}

pub(crate) fn open_scalar_from_image(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let sampler = sampler(p, el)?;
    set_scalar(p, el, ScalarFieldKind::FromImage3D(sampler))
}

pub(crate) fn open_scalar_composed(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let composed = composed(p, el, "scalarfieldid1", "scalarfieldid2")?;
    set_scalar(p, el, ScalarFieldKind::Composed(composed))
}

pub(crate) fn open_vector_field(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let field = Vector3DField {
        name: el.attr("name").unwrap_or_default().to_string(),
        kind: Vector3DFieldKind::Constant([0.0; 3]),
    };
    resource(p, el, field, false)
}

fn set_vector(p: &mut PartParser<'_>, el: &XmlElement, value: Vector3DFieldKind) -> Result<Node> {
    define(p, el, move |kind| match kind {
        ResourceKind::Vector3DField(field) => {
            field.kind = value;
            true
        }
        _ => false,
    })
}

pub(crate) fn open_vector_constant(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let value = [
        p.state.req_float(el, "valuex")?,
        p.state.req_float(el, "valuey")?,
        p.state.req_float(el, "valuez")?,
    ];
    set_vector(p, el, Vector3DFieldKind::Constant(value))
}

pub(crate) fn open_vector_from_image(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let sampler = sampler(p, el)?;
    set_vector(p, el, Vector3DFieldKind::FromImage3D(sampler))
}

pub(crate) fn open_vector_composed(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let composed = composed(p, el, "vector3dfieldid1", "vector3dfieldid2")?;
    set_vector(p, el, Vector3DFieldKind::Composed(composed))
}

pub(crate) fn open_function_from_image(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let function = FunctionFromImage3D {
        display_name: el.attr("displayname").unwrap_or_default().to_string(),
        sampler: sampler(p, el)?,
    };
    resource(p, el, function, true)
}

// ----- volume data and level sets -------------------------------------------

pub(crate) fn open_volume_data(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    resource(p, el, VolumeData::default(), true)
}

fn volume_data_mut<'p>(p: &'p mut PartParser<'_>, what: &str) -> Result<&'p mut VolumeData> {
    match p.kind_mut(what)? {
        ResourceKind::VolumeData(data) => Ok(data),
        _ => Err(Error::invalid_xml_element(what, "must be inside <volumedata>")),
    }
}

pub(crate) fn open_volume_color(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "volumedata")?;
    let field = field_reference(p, el)?;
    let data = volume_data_mut(p, "color")?;
    if data.color.is_some() {
        return Err(Error::invalid_xml_element("color", "volume data has one color"));
    }
    data.color = Some(field);
    Ok(Node::Leaf)
}

pub(crate) fn open_volume_property(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "volumedata")?;
    let name = el.require("name")?.to_string();
    let required = matches!(el.attr("required").map(str::trim), Some("1" | "true"));
    let field = field_reference(p, el)?;
    let data = volume_data_mut(p, "property")?;
    if data.properties.iter().any(|prop| prop.name == name) {
        return Err(Error::invalid_xml_element(
            "property",
            &format!("duplicate volume property '{}'", name),
        ));
    }
    data.properties.push(VolumeProperty { name, field, required });
    Ok(Node::Leaf)
}

pub(crate) fn open_level_set(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "object")?;
    let function = p.require_reference(el, "functionid")?;
    let mesh = p.require_reference(el, "meshid")?;
    let mut level_set = LevelSet::new(function, el.attr("channel").unwrap_or_default(), mesh);
    level_set.transform = p.state.transform(el, "transform")?;
    level_set.min_feature_size = p.state.float(el, "minfeaturesize")?.unwrap_or(0.0);
    level_set.fallback_value = p.state.float(el, "fallbackvalue")?.unwrap_or(0.0);
    level_set.mesh_bbox_only = matches!(el.attr("meshbboxonly").map(str::trim), Some("1" | "true"));
    level_set.volume_data = p.reference(el, "volumeid")?;
    p.set_object_content("levelset", ObjectContent::LevelSet(level_set))?;
    Ok(Node::Leaf)
}

// ----- implicit functions ---------------------------------------------------

pub(crate) fn open_implicit_function(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let function = ImplicitFunction {
        display_name: el.attr("displayname").unwrap_or_default().to_string(),
        ..Default::default()
    };
    resource(p, el, function, true)
}

fn open_ports(p: &mut PartParser<'_>, el: &XmlElement, output: bool) -> Result<Node> {
    p.expect_parent(
        el,
        |n| matches!(n, Node::Resource(_) | Node::ImplicitNode(_)),
        "implicitfunction or a node",
    )?;
    Ok(Node::Ports { output })
}

pub(crate) fn open_inputs(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    open_ports(p, el, false)
}

pub(crate) fn open_outputs(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    open_ports(p, el, true)
}

pub(crate) fn open_port(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let Some((port_type, is_ref)) = PortType::from_element(&el.local) else {
        return Err(Error::invalid_xml_element(&el.local, "is not a port"));
    };
    let output = match p.parent() {
        Some(Node::Ports { output }) => *output,
        _ => return Err(Error::invalid_xml_element(&el.local, "must be inside <in> or <out>")),
    };
    let mut port = Port::new(el.require("identifier")?, port_type);
    port.display_name = el.attr("displayname").unwrap_or_default().to_string();
    if is_ref {
        port.reference = Some(el.require("ref")?.to_string());
    }

    let owner = p.stack.len().checked_sub(2).and_then(|i| p.stack.get_mut(i));
    let list = match owner {
        Some(Node::ImplicitNode(node)) if output => &mut node.outputs,
        Some(Node::ImplicitNode(node)) => &mut node.inputs,
        Some(Node::Resource(pending)) => match &mut pending.kind {
            ResourceKind::ImplicitFunction(f) if output => &mut f.outputs,
            ResourceKind::ImplicitFunction(f) => &mut f.inputs,
            _ => return Err(Error::invalid_xml_element(&el.local, "must be inside an implicit function")),
        },
        _ => return Err(Error::invalid_xml_element(&el.local, "must be inside a function or node")),
    };
    if list.iter().any(|existing| existing.identifier == port.identifier) {
        return Err(Error::InvalidModel(format!(
            "duplicate port identifier '{}'",
            port.identifier
        )));
    }
    list.push(port);
    Ok(Node::Leaf)
}

pub(crate) fn open_node(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let Some(kind) = NodeKind::from_element(&el.local) else {
        return Err(Error::invalid_xml_element(&el.local, "is not an implicit node"));
    };
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "implicitfunction")?;
    let mut node = ImplicitNode::new(kind, el.require("identifier")?);
    node.display_name = el.attr("displayname").unwrap_or_default().to_string();
    node.constant = match kind {
        NodeKind::Constant => Some(NodeConstant::Scalar(p.state.req_float(el, "value")?)),
        NodeKind::ConstVec => Some(NodeConstant::Vector([
            p.state.req_float(el, "x")?,
            p.state.req_float(el, "y")?,
            p.state.req_float(el, "z")?,
        ])),
        NodeKind::ConstMat => {
            let values: Vec<f64> = parse_list(el, "matrix", el.require("matrix")?)?;
            let matrix: [f64; 16] = values.try_into().map_err(|_| {
                Error::invalid_xml_element("constmat", "matrix needs 16 values")
            })?;
            Some(NodeConstant::Matrix(matrix))
        }
        NodeKind::ConstResourceId => {
            let id: ResourceId = p.require_reference(el, "value")?;
            Some(NodeConstant::Resource(id))
        }
        _ => None,
    };
    Ok(Node::ImplicitNode(Box::new(node)))
}

// ----- volumetric stacks ----------------------------------------------------

pub(crate) fn open_volumetric_stack(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    resource(p, el, VolumetricStack::default(), true)
}

pub(crate) fn open_dst_channel(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "volumetricstack")?;
    let channel = DestinationChannel {
        name: el.require("name")?.to_string(),
        background: p.state.float(el, "background")?.unwrap_or(0.0),
    };
    match p.kind_mut("dstchannel")? {
        ResourceKind::VolumetricStack(stack) => {
            if stack.channels.iter().any(|c| c.name == channel.name) {
                return Err(Error::InvalidModel(format!(
                    "duplicate destination channel '{}'",
                    channel.name
                )));
            }
            stack.channels.push(channel);
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("dstchannel", "must be inside <volumetricstack>")),
    }
}

pub(crate) fn open_volumetric_layer(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "volumetricstack")?;
    let layer = VolumetricLayer {
        transform: p.state.transform(el, "transform")?.unwrap_or(Transform::default()),
        blend_method: el.attr("blendmethod").unwrap_or("mix").to_string(),
        src_alpha: p.state.float(el, "srcalpha")?.unwrap_or(1.0),
        dst_alpha: p.state.float(el, "dstalpha")?.unwrap_or(1.0),
        mask: None,
        sources: Vec::new(),
    };
    Ok(Node::VolumetricLayer(Box::new(layer)))
}

fn selector(p: &mut PartParser<'_>, el: &XmlElement) -> Result<ChannelSelector> {
    let mut selector = ChannelSelector::new(
        p.require_reference(el, "image3did")?,
        el.require("srcchannel")?,
        el.attr("dstchannel").unwrap_or_default(),
    );
    selector.min_value = p.state.float(el, "minvalue")?.unwrap_or(0.0);
    selector.max_value = p.state.float(el, "maxvalue")?.unwrap_or(1.0);
    selector.filter = p.state.or(el, "filter", TextureFilter::Linear)?;
    selector.tile_style_u = p.state.or(el, "tilestyleu", TileStyle::Wrap)?;
    selector.tile_style_v = p.state.or(el, "tilestylev", TileStyle::Wrap)?;
    selector.tile_style_w = p.state.or(el, "tilestylew", TileStyle::Wrap)?;
    Ok(selector)
}

pub(crate) fn open_mask_channel(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let mask = selector(p, el)?;
    match p.stack.last_mut() {
        Some(Node::VolumetricLayer(layer)) if layer.mask.is_none() => layer.mask = Some(mask),
        Some(Node::VolumetricLayer(_)) => {
            return Err(Error::invalid_xml_element("maskchannel", "a layer has one mask"));
        }
        _ => return Err(Error::invalid_xml_element("maskchannel", "must be inside <volumetriclayer>")),
    }
    Ok(Node::Leaf)
}

pub(crate) fn open_channel_selector(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let source = selector(p, el)?;
    match p.stack.last_mut() {
        Some(Node::VolumetricLayer(layer)) => layer.sources.push(source),
        _ => {
            return Err(Error::invalid_xml_element(
                "channelselector",
                "must be inside <volumetriclayer>",
            ));
        }
    }
    Ok(Node::Leaf)
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::model::{
        CompositionMethod, NodeConstant, NodeKind, ObjectContent, PortType, ScalarFieldKind,
        Vector3DFieldKind,
    };
    use crate::parser::config::ParserConfig;
    use crate::parser::context::ReadState;
    use crate::parser::part::PartParser;
    use crate::progress::ProgressMonitor;

    const PART: &str = "/3D/3dmodel.model";

    fn read(resources: &str) -> Result<ReadState> {
        let xml = format!(
            r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:v="http://schemas.3mf.io/3dmanufacturing/volumetric/2022/01" xmlns:i="http://schemas.3mf.io/3dmanufacturing/implicit/2023/12" xmlns:vs="http://schemas.microsoft.com/3dmanufacturing/volumetric/2019/07"><resources>{}</resources></model>"#,
            resources
        );
        let config = ParserConfig::new();
        let mut state = ReadState::new(false, ProgressMonitor::default());
        PartParser::new(&mut state, &config, PART, true).parse(xml.as_bytes())?;
        Ok(state)
    }

    const IMAGE: &str = r#"<v:image3d id="1" name="scan"><v:imagestack rowcount="4" columncount="8" sheetcount="2"><v:imagesheet path="/Volume/s0.png"/><v:imagesheet path="Volume/s1.png"/></v:imagestack></v:image3d>"#;

    #[test]
    fn test_image_stack_and_fields() {
        let state = read(&format!(
            r#"{}
<v:scalarfield id="2"><v:scalarfieldfromimage3d image3did="1" channel="R" offset="0.5" tilestylew="clamp"/></v:scalarfield>
<v:scalarfield id="3"><v:scalarfieldconstant value="2"/></v:scalarfield>
<v:scalarfield id="4"><v:scalarfieldcomposed method="min" scalarfieldid1="2" scalarfieldid2="3"/></v:scalarfield>
<v:vector3dfield id="5"><v:vector3dfieldconstant valuex="1" valuey="2" valuez="3"/></v:vector3dfield>"#,
            IMAGE
        ))
        .unwrap();
        let model = &state.model;
        let id = |n| model.find_by_model_id(PART, n).unwrap();
        let image = model.image3d(id(1)).unwrap();
        assert_eq!(image.row_count, 4);
        assert_eq!(image.sheets, vec!["/Volume/s0.png", "/Volume/s1.png"]);
        let ScalarFieldKind::FromImage3D(sampler) = &model.scalar_field(id(2)).unwrap().kind else {
            panic!("expected image sampler");
        };
        assert_eq!(sampler.image, id(1));
        assert_eq!(sampler.offset, 0.5);
        assert_eq!(model.scalar_field(id(3)).unwrap().kind, ScalarFieldKind::Constant(2.0));
        let ScalarFieldKind::Composed(c) = &model.scalar_field(id(4)).unwrap().kind else {
            panic!("expected composition");
        };
        assert_eq!(c.method, CompositionMethod::Min);
        assert_eq!(
            model.vector3d_field(id(5)).unwrap().kind,
            Vector3DFieldKind::Constant([1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_field_defined_twice_is_fatal() {
        let xml = r#"<v:scalarfield id="3"><v:scalarfieldconstant value="2"/><v:scalarfieldconstant value="3"/></v:scalarfield>"#;
        assert!(read(xml).is_err());
        assert!(read(r#"<v:scalarfield id="3"/>"#).is_err());
    }

    #[test]
    fn test_implicit_function_graph() {
        let state = read(
            r#"<i:implicitfunction id="7" displayname="sphere">
  <i:in><i:vector identifier="pos"/></i:in>
  <i:constant identifier="r" value="10"><i:out><i:scalar identifier="value"/></i:out></i:constant>
  <i:length identifier="len"><i:in><i:vectorref identifier="A" ref="inputs.pos"/></i:in><i:out><i:scalar identifier="result"/></i:out></i:length>
  <i:subtraction identifier="sub"><i:in><i:scalarref identifier="A" ref="len.result"/><i:scalarref identifier="B" ref="r.value"/></i:in><i:out><i:scalar identifier="result"/></i:out></i:subtraction>
  <i:out><i:scalarref identifier="shape" ref="sub.result"/></i:out>
</i:implicitfunction>"#,
        )
        .unwrap();
        let model = &state.model;
        let f = model
            .implicit_function(model.find_by_model_id(PART, 7).unwrap())
            .unwrap();
        assert_eq!(f.inputs[0].port_type, PortType::Vector);
        assert_eq!(f.nodes.len(), 3);
        assert_eq!(f.nodes[0].constant, Some(NodeConstant::Scalar(10.0)));
        assert_eq!(f.nodes[1].kind, NodeKind::Length);
        assert_eq!(f.outputs[0].reference.as_deref(), Some("sub.result"));
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_level_set_object() {
        let state = read(
            r#"<i:implicitfunction id="1"><i:in><i:vector identifier="pos"/></i:in><i:out><i:scalarref identifier="d" ref="inputs.pos"/></i:out></i:implicitfunction>
<object id="2"><mesh><vertices/><triangles/></mesh></object>
<object id="3"><v:levelset functionid="1" channel="d" meshid="2" minfeaturesize="0.1" meshbboxonly="true"/></object>"#,
        )
        .unwrap();
        let model = &state.model;
        let obj = model.object(model.find_by_model_id(PART, 3).unwrap()).unwrap();
        let ObjectContent::LevelSet(ls) = obj.content() else {
            panic!("expected level set");
        };
        assert_eq!(ls.channel, "d");
        assert!(ls.mesh_bbox_only);
        assert_eq!(ls.min_feature_size, 0.1);
    }

    #[test]
    fn test_volumetric_stack_layers() {
        let state = read(&format!(
            r#"{}
<vs:volumetricstack id="9"><vs:dstchannel name="density" background="0"/>
  <vs:volumetriclayer blendmethod="mix" srcalpha="0.5">
    <vs:maskchannel image3did="1" srcchannel="A"/>
    <vs:channelselector image3did="1" srcchannel="R" dstchannel="density" maxvalue="2"/>
  </vs:volumetriclayer>
</vs:volumetricstack>"#,
            IMAGE
        ))
        .unwrap();
        let model = &state.model;
        let stack = model
            .volumetric_stack(model.find_by_model_id(PART, 9).unwrap())
            .unwrap();
        assert_eq!(stack.channels[0].name, "density");
        let layer = &stack.layers[0];
        assert_eq!(layer.src_alpha, 0.5);
        assert!(layer.mask.is_some());
        assert_eq!(layer.sources[0].max_value, 2.0);
    }
}
