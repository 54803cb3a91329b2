//! Property groups: base materials and the materials extension

use super::context::{index_to_property, parse_list};
use super::part::{Node, PartParser, PendingResource};
use super::scope::XmlElement;
use crate::error::{Error, Result};
use crate::model::{
    BaseMaterialGroup, BlendMethod, Color, ColorGroup, CompositeMaterials, MultiPropertyGroup,
    MultiPropertyLayer, ResourceKind, Tex2Coord, Texture2D, Texture2DGroup, TextureFilter,
    TileStyle, content_type_for, normalize_part_name,
};

fn resource(p: &mut PartParser<'_>, el: &XmlElement, kind: impl Into<ResourceKind>) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resources), "resources")?;
    let (id, model_id) = p.declare(el)?;
    let mut pending = PendingResource::new(id, model_id, kind);
    pending.custom = p.custom_attributes(el);
    Ok(Node::Resource(Box::new(pending)))
}

fn in_resource(node: &Node) -> bool {
    matches!(node, Node::Resource(_))
}

pub(crate) fn open_base_materials(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    resource(p, el, BaseMaterialGroup::new())
}

pub(crate) fn open_base(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_resource, "basematerials")?;
    let name = el.require("name")?.to_string();
    let color = p.state.required_or(el, "displaycolor", Color::rgb(0, 0, 0))?;
    match p.kind_mut("base")? {
        ResourceKind::BaseMaterials(group) => {
            group.add_material(name, color);
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("base", "must be inside <basematerials>")),
    }
}

pub(crate) fn open_color_group(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    resource(p, el, ColorGroup::new())
}

pub(crate) fn open_color(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_resource, "colorgroup")?;
    let color = p.state.required_or(el, "color", Color::rgb(0, 0, 0))?;
    match p.kind_mut("color")? {
        ResourceKind::Colors(group) => {
            group.add_color(color);
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("color", "must be inside <colorgroup>")),
    }
}

pub(crate) fn open_texture(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let path = normalize_part_name(el.require("path")?.trim());
    let content_type = el
        .attr("contenttype")
        .map(str::to_string)
        .unwrap_or_else(|| content_type_for(&path).to_string());
    let mut texture = Texture2D::new(path, content_type);
    texture.tile_style_u = p.state.or(el, "tilestyleu", TileStyle::default())?;
    texture.tile_style_v = p.state.or(el, "tilestylev", TileStyle::default())?;
    texture.filter = p.state.or(el, "filter", TextureFilter::default())?;
    resource(p, el, texture)
}

pub(crate) fn open_texture_group(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let texture = p.require_reference(el, "texid")?;
    resource(p, el, Texture2DGroup::new(texture))
}

pub(crate) fn open_tex_coord(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_resource, "texture2dgroup")?;
    let u = p.state.coord(el, "u")?;
    let v = p.state.coord(el, "v")?;
    match p.kind_mut("tex2coord")? {
        ResourceKind::Texture2DGroup(group) => {
            group.coords.add(Tex2Coord { u, v });
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("tex2coord", "must be inside <texture2dgroup>")),
    }
}

pub(crate) fn open_composite_materials(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let base = p.require_reference(el, "matid")?;
    let indices: Vec<u32> = parse_list(el, "matindices", el.require("matindices")?)?;
    let ids = indices.into_iter().map(index_to_property).collect();
    resource(p, el, CompositeMaterials::new(base, ids))
}

pub(crate) fn open_composite(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_resource, "compositematerials")?;
    let mut values: Vec<f64> = parse_list(el, "values", el.require("values")?)?;
    if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
        p.state.warn(
            3001,
            "composite mixing ratio outside [0, 1] clamped".to_string(),
        )?;
        for v in &mut values {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }
    }
    match p.kind_mut("composite")? {
        ResourceKind::Composite(group) => {
            group.add_composite(values)?;
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("composite", "must be inside <compositematerials>")),
    }
}

pub(crate) fn open_multi_properties(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let raw: Vec<u32> = parse_list(el, "pids", el.require("pids")?)?;
    if raw.is_empty() {
        return Err(Error::invalid_xml_element("multiproperties", "pids must not be empty"));
    }
    let mut blends: Vec<BlendMethod> = Vec::new();
    if let Some(list) = el.attr("blendmethods") {
        for token in list.split_ascii_whitespace() {
            blends.push(token.parse()?);
        }
    }
    if blends.len() > raw.len().saturating_sub(1) {
        p.state.warn(
            2005,
            "multiproperties lists more blend methods than layers".to_string(),
        )?;
    }
    let mut group = MultiPropertyGroup::new();
    for (i, model_id) in raw.into_iter().enumerate() {
        if model_id == 0 {
            return Err(Error::invalid_xml_element("multiproperties", "resource ids start at 1"));
        }
        let layer = p.state.resolve(&p.part, model_id);
        // The first layer has no blend partner below it.
        let blend = i
            .checked_sub(1)
            .and_then(|j| blends.get(j).copied())
            .unwrap_or_default();
        group.layers.push(MultiPropertyLayer { resource: layer, blend });
    }
    resource(p, el, group)
}

pub(crate) fn open_multi(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, in_resource, "multiproperties")?;
    let indices: Vec<u32> = parse_list(el, "pindices", el.attr("pindices").unwrap_or(""))?;
    let ids = indices.into_iter().map(index_to_property).collect();
    match p.kind_mut("multi")? {
        ResourceKind::MultiProperties(group) => {
            group.add_multi(ids)?;
            Ok(Node::Leaf)
        }
        _ => Err(Error::invalid_xml_element("multi", "must be inside <multiproperties>")),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::model::{BlendMethod, Color, PropertyId, TileStyle};
    use crate::parser::config::ParserConfig;
    use crate::parser::context::ReadState;
    use crate::parser::part::PartParser;
    use crate::progress::ProgressMonitor;

    const PART: &str = "/3D/3dmodel.model";

    fn read(resources: &str) -> Result<ReadState> {
        let xml = format!(
            r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02" xmlns:m="http://schemas.microsoft.com/3dmanufacturing/material/2015/02"><resources>{}</resources></model>"#,
            resources
        );
        let config = ParserConfig::new();
        let mut state = ReadState::new(false, ProgressMonitor::default());
        PartParser::new(&mut state, &config, PART, true).parse(xml.as_bytes())?;
        Ok(state)
    }

    #[test]
    fn test_base_materials_and_colors() {
        let state = read(
            r##"<basematerials id="1"><base name="Red" displaycolor="#FF0000"/><base name="Clear" displaycolor="#FFFFFF80"/></basematerials>
<m:colorgroup id="2"><m:color color="#00FF00"/></m:colorgroup>"##,
        )
        .unwrap();
        let model = &state.model;
        let base = model
            .base_materials(model.find_by_model_id(PART, 1).unwrap())
            .unwrap();
        assert_eq!(base.materials.len(), 2);
        assert_eq!(base.name(PropertyId(1)).unwrap(), "Red");
        assert_eq!(base.display_color(PropertyId(2)).unwrap(), Color::rgba(255, 255, 255, 128));
        let colors = model.color_group(model.find_by_model_id(PART, 2).unwrap()).unwrap();
        assert_eq!(*colors.colors.get(PropertyId(1)).unwrap(), Color::rgb(0, 255, 0));
    }

    #[test]
    fn test_texture_group_references_texture() {
        let state = read(
            r#"<m:texture2dgroup id="3" texid="2"><m:tex2coord u="0.5" v="1"/></m:texture2dgroup>
<m:texture2d id="2" path="3D/Textures/wood.png" contenttype="image/png" tilestyleu="mirror"/>"#,
        )
        .unwrap();
        let model = &state.model;
        let tex = model.find_by_model_id(PART, 2).unwrap();
        let group = model.texture2d_group(model.find_by_model_id(PART, 3).unwrap()).unwrap();
        assert_eq!(group.texture, tex);
        assert_eq!(group.coords.len(), 1);
        let texture = model.texture2d(tex).unwrap();
        assert_eq!(texture.path, "/3D/Textures/wood.png");
        assert_eq!(texture.tile_style_u, TileStyle::Mirror);
    }

    #[test]
    fn test_composite_ratio_is_clamped_with_warning() {
        let state = read(
            r##"<basematerials id="1"><base name="A" displaycolor="#000000"/><base name="B" displaycolor="#FFFFFF"/></basematerials>
<m:compositematerials id="2" matid="1" matindices="0 1"><m:composite values="0.25 1.5"/></m:compositematerials>"##,
        )
        .unwrap();
        assert_eq!(state.warnings.len(), 1);
        let model = &state.model;
        let group = model
            .composite_materials(model.find_by_model_id(PART, 2).unwrap())
            .unwrap();
        assert_eq!(group.material_ids, vec![PropertyId(1), PropertyId(2)]);
        assert_eq!(group.composites().get(PropertyId(1)).unwrap().values, vec![0.25, 1.0]);
    }

    #[test]
    fn test_multi_properties_layers() {
        let state = read(
            r##"<basematerials id="1"><base name="A" displaycolor="#000000"/></basematerials>
<m:colorgroup id="2"><m:color color="#FF0000"/></m:colorgroup>
<m:multiproperties id="3" pids="1 2" blendmethods="multiply"><m:multi pindices="0 0"/></m:multiproperties>"##,
        )
        .unwrap();
        let model = &state.model;
        let group = model
            .multi_properties(model.find_by_model_id(PART, 3).unwrap())
            .unwrap();
        assert_eq!(group.layers().len(), 2);
        assert_eq!(group.layers()[1].blend, BlendMethod::Multiply);
        assert_eq!(group.multis.len(), 1);
    }
}
