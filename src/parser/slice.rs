//! Slice extension: slice stacks, slices and slice references

use super::context::req_index;
use super::part::{Node, PartParser, PendingResource};
use super::scope::XmlElement;
use crate::error::{Error, Result};
use crate::model::{SliceStack, Vertex2D};
use crate::progress::ProgressPhase;

pub(crate) fn open_slice_stack(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resources), "resources")?;
    let bottom = p.state.float(el, "zbottom")?.unwrap_or(0.0);
    let (id, model_id) = p.declare(el)?;
    let mut pending = PendingResource::new(id, model_id, SliceStack::new(bottom));
    pending.custom = p.custom_attributes(el);
    Ok(Node::Resource(Box::new(pending)))
}

pub(crate) fn open_slice(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "slicestack")?;
    let ztop = p.state.req_float(el, "ztop")?;
    let stack = p.slice_stack_mut("slice")?;
    stack.add_slice(ztop)?;
    let index = stack.slices().len() - 1;
    p.state.tick(ProgressPhase::ReadSlices)?;
    Ok(Node::Slice(index))
}

pub(crate) fn open_vertices(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    match p.parent() {
        Some(Node::Slice(index)) => Ok(Node::SliceVertices(*index)),
        _ => Err(Error::invalid_xml_element(&el.local, "must be inside <slice>")),
    }
}

pub(crate) fn open_vertex(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let Some(Node::SliceVertices(index)) = p.parent() else {
        return Err(Error::invalid_xml_element("vertex", "must be inside slice <vertices>"));
    };
    let index = *index;
    let x = p.state.coord(el, "x")?;
    let y = p.state.coord(el, "y")?;
    slice_at(p, index)?.add_vertex(Vertex2D::new(x, y));
    Ok(Node::Leaf)
}

pub(crate) fn open_polygon(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let Some(Node::Slice(index)) = p.parent() else {
        return Err(Error::invalid_xml_element("polygon", "must be inside <slice>"));
    };
    let index = *index;
    let start = req_index(el, "startv")?;
    let polygon = slice_at(p, index)?.begin_polygon(start)?;
    Ok(Node::Polygon(index, polygon))
}

pub(crate) fn open_segment(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let Some(Node::Polygon(index, polygon)) = p.parent() else {
        return Err(Error::invalid_xml_element("segment", "must be inside <polygon>"));
    };
    let (index, polygon) = (*index, *polygon);
    let v2 = req_index(el, "v2")?;
    slice_at(p, index)?.add_polygon_index(polygon, v2)?;
    Ok(Node::Leaf)
}

pub(crate) fn open_slice_ref(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Resource(_)), "slicestack")?;
    let path = el.attr("slicepath").map(str::to_string);
    el.require("slicestackid")?;
    let target = p
        .reference_in(el, "slicestackid", path.as_deref())?
        .ok_or_else(|| Error::missing_attribute("sliceref", "slicestackid"))?;
    let stack = p.slice_stack_mut("sliceref")?;
    if !stack.slices().is_empty() {
        return Err(Error::InvalidModel(
            "slice stack mixes slices and slice references".to_string(),
        ));
    }
    stack.slice_refs.push(target);
    Ok(Node::Leaf)
}

fn slice_at<'p>(p: &'p mut PartParser<'_>, index: usize) -> Result<&'p mut crate::model::Slice> {
    p.slice_stack_mut("slice")?
        .slice_mut(index)
        .ok_or_else(|| Error::IndexOutOfRange(format!("slice {}", index)))
}
