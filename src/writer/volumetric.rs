//! Volumetric data, implicit functions and volumetric stacks

use super::part::PartWriter;
use crate::error::Result;
use crate::model::{
    ChannelSelector, ComposedField, FieldReference, FunctionFromImage3D, Image3D, ImageSampler,
    ImplicitFunction, ImplicitNode, LevelSet, NodeConstant, Port, Resource, ScalarField,
    ScalarFieldKind, Vector3DField, Vector3DFieldKind, VolumeData, VolumetricStack,
};
use crate::namespaces::Extension;
use quick_xml::events::BytesStart;
use std::io::Write;

fn push_sampler<W: Write>(
    w: &PartWriter<'_, W>,
    elem: &mut BytesStart<'_>,
    sampler: &ImageSampler,
) -> Result<()> {
    elem.push_attribute(("image3did", w.id_of(sampler.image)?.as_str()));
    elem.push_attribute(("channel", sampler.channel.as_str()));
    elem.push_attribute(("filter", sampler.filter.as_str()));
    elem.push_attribute(("offset", w.num(sampler.offset).as_str()));
    elem.push_attribute(("scale", w.num(sampler.scale).as_str()));
    elem.push_attribute(("tilestyleu", sampler.tile_style_u.as_str()));
    elem.push_attribute(("tilestylev", sampler.tile_style_v.as_str()));
    elem.push_attribute(("tilestylew", sampler.tile_style_w.as_str()));
    Ok(())
}

fn push_composed<W: Write>(
    w: &PartWriter<'_, W>,
    elem: &mut BytesStart<'_>,
    composed: &ComposedField,
    ids: (&str, &str),
) -> Result<()> {
    elem.push_attribute(("method", composed.method.as_str()));
    elem.push_attribute(("factor1", w.num(composed.factor1).as_str()));
    elem.push_attribute(("factor2", w.num(composed.factor2).as_str()));
    elem.push_attribute((ids.0, w.id_of(composed.field1)?.as_str()));
    elem.push_attribute((ids.1, w.id_of(composed.field2)?.as_str()));
    if let Some(mask) = composed.mask {
        elem.push_attribute(("scalarfieldmaskid", w.id_of(mask)?.as_str()));
    }
    for (name, transform) in [
        ("transform1", &composed.transform1),
        ("transform2", &composed.transform2),
        ("transformmask", &composed.transform_mask),
    ] {
        if let Some(t) = transform {
            elem.push_attribute((name, w.transform(t).as_str()));
        }
    }
    Ok(())
}

fn push_field_reference<W: Write>(
    w: &PartWriter<'_, W>,
    elem: &mut BytesStart<'_>,
    field: &FieldReference,
) -> Result<()> {
    elem.push_attribute(("functionid", w.id_of(field.function)?.as_str()));
    elem.push_attribute(("channel", field.channel.as_str()));
    if let Some(t) = &field.transform {
        elem.push_attribute(("transform", w.transform(t).as_str()));
    }
    if field.min_feature_size != 0.0 {
        elem.push_attribute(("minfeaturesize", w.num(field.min_feature_size).as_str()));
    }
    if field.fallback_value != 0.0 {
        elem.push_attribute(("fallbackvalue", w.num(field.fallback_value).as_str()));
    }
    Ok(())
}

// ----- image stacks and fields ----------------------------------------------

pub(super) fn write_image3d<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    image: &Image3D,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Volumetric, "image3d", res);
    if !image.name.is_empty() {
        elem.push_attribute(("name", image.name.as_str()));
    }
    w.resource_element(elem, res, true, |w| {
        let stack = w.name(Extension::Volumetric, "imagestack");
        let mut entry = BytesStart::new(stack.as_str());
        entry.push_attribute(("rowcount", image.row_count.to_string().as_str()));
        entry.push_attribute(("columncount", image.column_count.to_string().as_str()));
        entry.push_attribute(("sheetcount", image.sheets.len().to_string().as_str()));
        if image.sheets.is_empty() {
            return w.sink.empty(entry);
        }
        w.sink.start(entry)?;
        let sheet = w.name(Extension::Volumetric, "imagesheet");
        for path in &image.sheets {
            let mut entry = BytesStart::new(sheet.as_str());
            entry.push_attribute(("path", path.as_str()));
            w.sink.empty(entry)?;
        }
        w.sink.end(&stack)
    })
}

pub(super) fn write_scalar_field<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    field: &ScalarField,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Volumetric, "scalarfield", res);
    if !field.name.is_empty() {
        elem.push_attribute(("name", field.name.as_str()));
    }
    w.resource_element(elem, res, true, |w| {
        let definition = match &field.kind {
            ScalarFieldKind::Constant(value) => {
                let mut e = BytesStart::new(w.name(Extension::Volumetric, "scalarfieldconstant"));
                e.push_attribute(("value", w.num(*value).as_str()));
                e
            }
            ScalarFieldKind::FromImage3D(sampler) => {
                let mut e = BytesStart::new(w.name(Extension::Volumetric, "scalarfieldfromimage3d"));
                push_sampler(w, &mut e, sampler)?;
                e
            }
            ScalarFieldKind::Composed(composed) => {
                let mut e = BytesStart::new(w.name(Extension::Volumetric, "scalarfieldcomposed"));
                push_composed(w, &mut e, composed, ("scalarfieldid1", "scalarfieldid2"))?;
                e
            }
        };
        w.sink.empty(definition)
    })
}

pub(super) fn write_vector_field<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    field: &Vector3DField,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Volumetric, "vector3dfield", res);
    if !field.name.is_empty() {
        elem.push_attribute(("name", field.name.as_str()));
    }
    w.resource_element(elem, res, true, |w| {
        let definition = match &field.kind {
            Vector3DFieldKind::Constant([x, y, z]) => {
                let mut e = BytesStart::new(w.name(Extension::Volumetric, "vector3dfieldconstant"));
                e.push_attribute(("valuex", w.num(*x).as_str()));
                e.push_attribute(("valuey", w.num(*y).as_str()));
                e.push_attribute(("valuez", w.num(*z).as_str()));
                e
            }
            Vector3DFieldKind::FromImage3D(sampler) => {
                let mut e =
                    BytesStart::new(w.name(Extension::Volumetric, "vector3dfieldfromimage3d"));
                push_sampler(w, &mut e, sampler)?;
                e
            }
            Vector3DFieldKind::Composed(composed) => {
                let mut e = BytesStart::new(w.name(Extension::Volumetric, "vector3dfieldcomposed"));
                push_composed(w, &mut e, composed, ("vector3dfieldid1", "vector3dfieldid2"))?;
                e
            }
        };
        w.sink.empty(definition)
    })
}

pub(super) fn write_function_from_image<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    function: &FunctionFromImage3D,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Volumetric, "functionfromimage3d", res);
    if !function.display_name.is_empty() {
        elem.push_attribute(("displayname", function.display_name.as_str()));
    }
    push_sampler(w, &mut elem, &function.sampler)?;
    w.resource_element(elem, res, false, |_| Ok(()))
}

// ----- volume data and level sets -------------------------------------------

pub(super) fn write_volume_data<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    data: &VolumeData,
) -> Result<()> {
    let elem = w.resource_start(Extension::Volumetric, "volumedata", res);
    let has_body = data.color.is_some() || !data.properties.is_empty();
    w.resource_element(elem, res, has_body, |w| {
        if let Some(color) = &data.color {
            let mut e = BytesStart::new(w.name(Extension::Volumetric, "color"));
            push_field_reference(w, &mut e, color)?;
            w.sink.empty(e)?;
        }
        for property in &data.properties {
            let mut e = BytesStart::new(w.name(Extension::Volumetric, "property"));
            e.push_attribute(("name", property.name.as_str()));
            if property.required {
                e.push_attribute(("required", "1"));
            }
            push_field_reference(w, &mut e, &property.field)?;
            w.sink.empty(e)?;
        }
        Ok(())
    })
}

pub(super) fn write_level_set<W: Write>(w: &mut PartWriter<'_, W>, level_set: &LevelSet) -> Result<()> {
    let mut elem = BytesStart::new(w.name(Extension::Volumetric, "levelset"));
    elem.push_attribute(("functionid", w.id_of(level_set.function)?.as_str()));
    elem.push_attribute(("channel", level_set.channel.as_str()));
    elem.push_attribute(("meshid", w.id_of(level_set.mesh)?.as_str()));
    if let Some(t) = &level_set.transform {
        elem.push_attribute(("transform", w.transform(t).as_str()));
    }
    if level_set.min_feature_size != 0.0 {
        elem.push_attribute(("minfeaturesize", w.num(level_set.min_feature_size).as_str()));
    }
    if level_set.fallback_value != 0.0 {
        elem.push_attribute(("fallbackvalue", w.num(level_set.fallback_value).as_str()));
    }
    if level_set.mesh_bbox_only {
        elem.push_attribute(("meshbboxonly", "1"));
    }
    if let Some(volume) = level_set.volume_data {
        elem.push_attribute(("volumeid", w.id_of(volume)?.as_str()));
    }
    w.sink.empty(elem)
}

// ----- implicit functions ---------------------------------------------------

fn write_ports<W: Write>(w: &mut PartWriter<'_, W>, local: &str, ports: &[Port]) -> Result<()> {
    if ports.is_empty() {
        return Ok(());
    }
    let tag = w.name(Extension::Implicit, local);
    w.sink.start(BytesStart::new(tag.as_str()))?;
    for port in ports {
        let element = match port.reference {
            Some(_) => port.port_type.ref_element(),
            None => port.port_type.element(),
        };
        let mut e = BytesStart::new(w.name(Extension::Implicit, element));
        e.push_attribute(("identifier", port.identifier.as_str()));
        if !port.display_name.is_empty() {
            e.push_attribute(("displayname", port.display_name.as_str()));
        }
        if let Some(reference) = &port.reference {
            e.push_attribute(("ref", reference.as_str()));
        }
        w.sink.empty(e)?;
    }
    w.sink.end(&tag)
}

fn write_node<W: Write>(w: &mut PartWriter<'_, W>, node: &ImplicitNode) -> Result<()> {
    let tag = w.name(Extension::Implicit, node.kind.as_str());
    let mut elem = BytesStart::new(tag.as_str());
    elem.push_attribute(("identifier", node.identifier.as_str()));
    if !node.display_name.is_empty() {
        elem.push_attribute(("displayname", node.display_name.as_str()));
    }
    match &node.constant {
        Some(NodeConstant::Scalar(value)) => elem.push_attribute(("value", w.num(*value).as_str())),
        Some(NodeConstant::Vector([x, y, z])) => {
            elem.push_attribute(("x", w.num(*x).as_str()));
            elem.push_attribute(("y", w.num(*y).as_str()));
            elem.push_attribute(("z", w.num(*z).as_str()));
        }
        Some(NodeConstant::Matrix(m)) => {
            let values = m.iter().map(|v| w.num(*v)).collect::<Vec<_>>().join(" ");
            elem.push_attribute(("matrix", values.as_str()));
        }
        Some(NodeConstant::Resource(id)) => elem.push_attribute(("value", w.id_of(*id)?.as_str())),
        None => {}
    }
    if node.inputs.is_empty() && node.outputs.is_empty() {
        return w.sink.empty(elem);
    }
    w.sink.start(elem)?;
    write_ports(w, "in", &node.inputs)?;
    write_ports(w, "out", &node.outputs)?;
    w.sink.end(&tag)
}

pub(super) fn write_implicit_function<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    function: &ImplicitFunction,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Implicit, "implicitfunction", res);
    if !function.display_name.is_empty() {
        elem.push_attribute(("displayname", function.display_name.as_str()));
    }
    let has_body =
        !function.inputs.is_empty() || !function.outputs.is_empty() || !function.nodes.is_empty();
    w.resource_element(elem, res, has_body, |w| {
        write_ports(w, "in", &function.inputs)?;
        for node in &function.nodes {
            write_node(w, node)?;
        }
        write_ports(w, "out", &function.outputs)
    })
}

// ----- volumetric stacks ----------------------------------------------------

fn write_selector<W: Write>(
    w: &mut PartWriter<'_, W>,
    local: &str,
    selector: &ChannelSelector,
) -> Result<()> {
    let mut e = BytesStart::new(w.name(Extension::Volumetric1907, local));
    e.push_attribute(("image3did", w.id_of(selector.image)?.as_str()));
    e.push_attribute(("srcchannel", selector.src_channel.as_str()));
    if !selector.dst_channel.is_empty() {
        e.push_attribute(("dstchannel", selector.dst_channel.as_str()));
    }
    e.push_attribute(("minvalue", w.num(selector.min_value).as_str()));
    e.push_attribute(("maxvalue", w.num(selector.max_value).as_str()));
    e.push_attribute(("filter", selector.filter.as_str()));
    e.push_attribute(("tilestyleu", selector.tile_style_u.as_str()));
    e.push_attribute(("tilestylev", selector.tile_style_v.as_str()));
    e.push_attribute(("tilestylew", selector.tile_style_w.as_str()));
    w.sink.empty(e)
}

pub(super) fn write_volumetric_stack<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    stack: &VolumetricStack,
) -> Result<()> {
    let elem = w.resource_start(Extension::Volumetric1907, "volumetricstack", res);
    let has_body = !stack.channels.is_empty() || !stack.layers.is_empty();
    w.resource_element(elem, res, has_body, |w| {
        for channel in &stack.channels {
            let mut e = BytesStart::new(w.name(Extension::Volumetric1907, "dstchannel"));
            e.push_attribute(("name", channel.name.as_str()));
            e.push_attribute(("background", w.num(channel.background).as_str()));
            w.sink.empty(e)?;
        }
        let layer_tag = w.name(Extension::Volumetric1907, "volumetriclayer");
        for layer in &stack.layers {
            let mut e = BytesStart::new(layer_tag.as_str());
            e.push_attribute(("transform", w.transform(&layer.transform).as_str()));
            e.push_attribute(("blendmethod", layer.blend_method.as_str()));
            e.push_attribute(("srcalpha", w.num(layer.src_alpha).as_str()));
            e.push_attribute(("dstalpha", w.num(layer.dst_alpha).as_str()));
            if layer.mask.is_none() && layer.sources.is_empty() {
                w.sink.empty(e)?;
                continue;
            }
            w.sink.start(e)?;
            if let Some(mask) = &layer.mask {
                write_selector(w, "maskchannel", mask)?;
            }
            for source in &layer.sources {
                write_selector(w, "channelselector", source)?;
            }
            w.sink.end(&layer_tag)?;
        }
        Ok(())
    })
}
