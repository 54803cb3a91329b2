//! Property group resources: base materials and the materials extension

use super::part::PartWriter;
use crate::error::{Error, Result};
use crate::model::{
    BaseMaterialGroup, ColorGroup, CompositeMaterials, MultiPropertyGroup, Resource, Texture2D,
    Texture2DGroup,
};
use crate::namespaces::Extension;
use quick_xml::events::BytesStart;
use std::io::Write;

pub(super) fn write_base_materials<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    group: &BaseMaterialGroup,
) -> Result<()> {
    let elem = w.resource_start(Extension::Core, "basematerials", res);
    w.resource_element(elem, res, !group.materials.is_empty(), |w| {
        for material in group.materials.values() {
            let mut base = BytesStart::new("base");
            base.push_attribute(("name", material.name.as_str()));
            base.push_attribute(("displaycolor", material.display_color.to_string().as_str()));
            w.sink.empty(base)?;
        }
        Ok(())
    })
}

pub(super) fn write_color_group<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    group: &ColorGroup,
) -> Result<()> {
    let elem = w.resource_start(Extension::Material, "colorgroup", res);
    let tag = w.name(Extension::Material, "color");
    w.resource_element(elem, res, !group.colors.is_empty(), |w| {
        for color in group.colors.values() {
            let mut entry = BytesStart::new(tag.as_str());
            entry.push_attribute(("color", color.to_string().as_str()));
            w.sink.empty(entry)?;
        }
        Ok(())
    })
}

pub(super) fn write_texture<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    texture: &Texture2D,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Material, "texture2d", res);
    elem.push_attribute(("path", texture.path.as_str()));
    elem.push_attribute(("contenttype", texture.content_type.as_str()));
    elem.push_attribute(("tilestyleu", texture.tile_style_u.as_str()));
    elem.push_attribute(("tilestylev", texture.tile_style_v.as_str()));
    elem.push_attribute(("filter", texture.filter.as_str()));
    w.resource_element(elem, res, false, |_| Ok(()))
}

pub(super) fn write_texture_group<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    group: &Texture2DGroup,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Material, "texture2dgroup", res);
    elem.push_attribute(("texid", w.id_of(group.texture)?.as_str()));
    let tag = w.name(Extension::Material, "tex2coord");
    w.resource_element(elem, res, !group.coords.is_empty(), |w| {
        for coord in group.coords.values() {
            let mut entry = BytesStart::new(tag.as_str());
            entry.push_attribute(("u", w.num(coord.u).as_str()));
            entry.push_attribute(("v", w.num(coord.v).as_str()));
            w.sink.empty(entry)?;
        }
        Ok(())
    })
}

pub(super) fn write_composite<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    group: &CompositeMaterials,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Material, "compositematerials", res);
    elem.push_attribute(("matid", w.id_of(group.base_materials)?.as_str()));
    let indices = group
        .material_ids
        .iter()
        .map(|id| w.property_index(Some(group.base_materials), *id))
        .collect::<Result<Vec<_>>>()?;
    elem.push_attribute(("matindices", indices.join(" ").as_str()));
    let tag = w.name(Extension::Material, "composite");
    w.resource_element(elem, res, !group.composites().is_empty(), |w| {
        for composite in group.composites().values() {
            let values = composite
                .values
                .iter()
                .map(|v| w.num(*v))
                .collect::<Vec<_>>()
                .join(" ");
            let mut entry = BytesStart::new(tag.as_str());
            entry.push_attribute(("values", values.as_str()));
            w.sink.empty(entry)?;
        }
        Ok(())
    })
}

pub(super) fn write_multi_properties<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    group: &MultiPropertyGroup,
) -> Result<()> {
    let layers = group.layers();
    if layers.is_empty() {
        return Err(Error::InvalidPropertyLayer(format!(
            "multiproperties {} has no layers",
            res.model_id()
        )));
    }
    let mut elem = w.resource_start(Extension::Material, "multiproperties", res);
    let pids = layers
        .iter()
        .map(|l| w.id_of(l.resource))
        .collect::<Result<Vec<_>>>()?;
    elem.push_attribute(("pids", pids.join(" ").as_str()));
    if layers.len() > 1 {
        let blends = layers[1..]
            .iter()
            .map(|l| l.blend.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        elem.push_attribute(("blendmethods", blends.as_str()));
    }
    let tag = w.name(Extension::Material, "multi");
    w.resource_element(elem, res, !group.multis.is_empty(), |w| {
        for multi in group.multis.values() {
            let indices = multi
                .property_ids
                .iter()
                .zip(layers)
                .map(|(p, layer)| w.property_index(Some(layer.resource), *p))
                .collect::<Result<Vec<_>>>()?;
            let mut entry = BytesStart::new(tag.as_str());
            entry.push_attribute(("pindices", indices.join(" ").as_str()));
            w.sink.empty(entry)?;
        }
        Ok(())
    })
}
