//! Slice stacks

use super::part::PartWriter;
use crate::error::Result;
use crate::model::{Resource, Slice, SliceStack};
use crate::namespaces::Extension;
use crate::progress::ProgressPhase;
use quick_xml::events::BytesStart;
use std::io::Write;

pub(super) fn write_slice_stack<W: Write>(
    w: &mut PartWriter<'_, W>,
    res: &Resource,
    stack: &SliceStack,
) -> Result<()> {
    let mut elem = w.resource_start(Extension::Slice, "slicestack", res);
    elem.push_attribute(("zbottom", w.num(stack.bottom_z).as_str()));
    let has_body = !stack.slices().is_empty() || !stack.slice_refs().is_empty();
    w.resource_element(elem, res, has_body, |w| {
        for slice in stack.slices() {
            write_slice(w, slice)?;
        }
        let tag = w.name(Extension::Slice, "sliceref");
        for target in stack.slice_refs() {
            let mut entry = BytesStart::new(tag.as_str());
            entry.push_attribute(("slicestackid", w.id_of(*target)?.as_str()));
            if let Some(path) = w.path_of(*target)? {
                entry.push_attribute(("slicepath", path));
            }
            w.sink.empty(entry)?;
        }
        Ok(())
    })
}

fn write_slice<W: Write>(w: &mut PartWriter<'_, W>, slice: &Slice) -> Result<()> {
    let tag = w.name(Extension::Slice, "slice");
    let mut elem = BytesStart::new(tag.as_str());
    elem.push_attribute(("ztop", w.num(slice.ztop()).as_str()));
    if slice.vertices().is_empty() && slice.polygons().is_empty() {
        return w.sink.empty(elem);
    }
    w.sink.start(elem)?;

    let vertices = w.name(Extension::Slice, "vertices");
    let vertex = w.name(Extension::Slice, "vertex");
    w.sink.start(BytesStart::new(vertices.as_str()))?;
    for v in slice.vertices() {
        let mut entry = BytesStart::new(vertex.as_str());
        entry.push_attribute(("x", w.num(v.x).as_str()));
        entry.push_attribute(("y", w.num(v.y).as_str()));
        w.sink.empty(entry)?;
        w.progress.tick(ProgressPhase::WriteMesh)?;
    }
    w.sink.end(&vertices)?;

    let polygon = w.name(Extension::Slice, "polygon");
    let segment = w.name(Extension::Slice, "segment");
    for p in slice.polygons() {
        let Some((start, rest)) = p.indices().split_first() else {
            continue;
        };
        let mut entry = BytesStart::new(polygon.as_str());
        entry.push_attribute(("startv", start.to_string().as_str()));
        w.sink.start(entry)?;
        for v2 in rest {
            let mut seg = BytesStart::new(segment.as_str());
            seg.push_attribute(("v2", v2.to_string().as_str()));
            w.sink.empty(seg)?;
        }
        w.sink.end(&polygon)?;
    }
    w.sink.end(&tag)
}
