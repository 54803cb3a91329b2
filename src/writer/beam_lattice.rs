//! Beam lattices and the balls sub-extension

use super::part::PartWriter;
use crate::error::Result;
use crate::model::{BallMode, BeamLattice, ClippingMode, Object};
use crate::namespaces::Extension;
use crate::progress::ProgressPhase;
use quick_xml::events::BytesStart;
use std::io::Write;

pub(super) fn write_lattice<W: Write>(
    w: &mut PartWriter<'_, W>,
    object: &Object,
    lattice: &BeamLattice,
) -> Result<()> {
    let tag = w.name(Extension::BeamLattice, "beamlattice");
    let mut elem = BytesStart::new(tag.as_str());
    elem.push_attribute(("radius", w.num(lattice.radius).as_str()));
    elem.push_attribute(("minlength", w.num(lattice.min_length).as_str()));
    elem.push_attribute(("cap", lattice.cap_mode.as_str()));
    if lattice.clipping_mode != ClippingMode::None || lattice.clipping_mesh.is_some() {
        elem.push_attribute(("clippingmode", lattice.clipping_mode.as_str()));
    }
    if let Some(mesh) = lattice.clipping_mesh {
        elem.push_attribute(("clippingmesh", w.id_of(mesh)?.as_str()));
    }
    if let Some(mesh) = lattice.representation_mesh {
        elem.push_attribute(("representationmesh", w.id_of(mesh)?.as_str()));
    }
    if let Some(pid) = lattice.pid {
        elem.push_attribute(("pid", w.id_of(pid)?.as_str()));
    }
    if let Some(pindex) = lattice.pindex {
        let group = lattice.pid.or(object.pid);
        elem.push_attribute(("pindex", w.property_index(group, pindex)?.as_str()));
    }
    if lattice.ball_mode != BallMode::None {
        elem.push_attribute(("b2:ballmode", lattice.ball_mode.as_str()));
    }
    if let Some(radius) = lattice.ball_radius {
        elem.push_attribute(("b2:ballradius", w.num(radius).as_str()));
    }
    w.sink.start(elem)?;

    // Beam and ball properties fall back to the lattice group, then the object's.
    let default_group = lattice.pid.or(object.pid);

    let beams = w.name(Extension::BeamLattice, "beams");
    let beam_tag = w.name(Extension::BeamLattice, "beam");
    w.sink.start(BytesStart::new(beams.as_str()))?;
    for beam in &lattice.beams {
        let mut entry = BytesStart::new(beam_tag.as_str());
        entry.push_attribute(("v1", beam.v1.to_string().as_str()));
        entry.push_attribute(("v2", beam.v2.to_string().as_str()));
        if let Some(r1) = beam.r1 {
            entry.push_attribute(("r1", w.num(r1).as_str()));
        }
        if let Some(r2) = beam.r2 {
            entry.push_attribute(("r2", w.num(r2).as_str()));
        }
        if let Some(cap) = beam.cap1 {
            entry.push_attribute(("cap1", cap.as_str()));
        }
        if let Some(cap) = beam.cap2 {
            entry.push_attribute(("cap2", cap.as_str()));
        }
        if let Some(pid) = beam.pid {
            entry.push_attribute(("pid", w.id_of(pid)?.as_str()));
        }
        let group = beam.pid.or(default_group);
        for (name, p) in [("p1", beam.p1), ("p2", beam.p2)] {
            if let Some(p) = p {
                entry.push_attribute((name, w.property_index(group, p)?.as_str()));
            }
        }
        w.sink.empty(entry)?;
        w.progress.tick(ProgressPhase::WriteMesh)?;
    }
    w.sink.end(&beams)?;

    if !lattice.balls.is_empty() {
        let balls = w.name(Extension::BeamLatticeBalls, "balls");
        let ball_tag = w.name(Extension::BeamLatticeBalls, "ball");
        w.sink.start(BytesStart::new(balls.as_str()))?;
        for ball in &lattice.balls {
            let mut entry = BytesStart::new(ball_tag.as_str());
            entry.push_attribute(("vindex", ball.vindex.to_string().as_str()));
            if let Some(r) = ball.radius {
                entry.push_attribute(("r", w.num(r).as_str()));
            }
            if let Some(pid) = ball.pid {
                entry.push_attribute(("pid", w.id_of(pid)?.as_str()));
            }
            if let Some(p) = ball.p {
                let group = ball.pid.or(default_group);
                entry.push_attribute(("p", w.property_index(group, p)?.as_str()));
            }
            w.sink.empty(entry)?;
        }
        w.sink.end(&balls)?;
    }

    if !lattice.beam_sets.is_empty() {
        let sets = w.name(Extension::BeamLattice, "beamsets");
        let set_tag = w.name(Extension::BeamLattice, "beamset");
        let ref_tag = w.name(Extension::BeamLattice, "ref");
        let ball_ref_tag = w.name(Extension::BeamLatticeBalls, "ballref");
        w.sink.start(BytesStart::new(sets.as_str()))?;
        for set in &lattice.beam_sets {
            let mut entry = BytesStart::new(set_tag.as_str());
            if !set.name.is_empty() {
                entry.push_attribute(("name", set.name.as_str()));
            }
            if !set.identifier.is_empty() {
                entry.push_attribute(("identifier", set.identifier.as_str()));
            }
            if set.refs.is_empty() && set.ball_refs.is_empty() {
                w.sink.empty(entry)?;
                continue;
            }
            w.sink.start(entry)?;
            for (tag, list) in [(&ref_tag, &set.refs), (&ball_ref_tag, &set.ball_refs)] {
                for index in list {
                    let mut r = BytesStart::new(tag.as_str());
                    r.push_attribute(("index", index.to_string().as_str()));
                    w.sink.empty(r)?;
                }
            }
            w.sink.end(&set_tag)?;
        }
        w.sink.end(&sets)?;
    }
    w.sink.end(&tag)
}
