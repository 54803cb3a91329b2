//! Beam lattice extension, including the balls sub-extension

use super::context::req_index;
use super::part::{Node, PartParser};
use super::scope::XmlElement;
use crate::error::{Error, Result};
use crate::model::{Ball, BallMode, Beam, BeamCapMode, BeamLattice, BeamSet, ClippingMode};
use crate::namespaces::{BEAM_LATTICE_BALLS, Extension};
use crate::progress::ProgressPhase;

pub(crate) fn open_lattice(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Mesh), "mesh")?;
    let mut lattice = BeamLattice::new(p.state.req_float(el, "radius")?, p.state.req_float(el, "minlength")?);
    lattice.cap_mode = p.state.or(el, "cap", BeamCapMode::default())?;
    lattice.clipping_mode = p.state.or(el, "clippingmode", ClippingMode::default())?;
    lattice.clipping_mesh = p.reference(el, "clippingmesh")?;
    lattice.representation_mesh = p.reference(el, "representationmesh")?;
    lattice.pid = p.reference(el, "pid")?;
    lattice.pindex = p.state.prop(el, "pindex")?;
    if p.config.supports(Extension::BeamLatticeBalls) {
        lattice.ball_mode = p
            .state
            .opt_ns(el, BEAM_LATTICE_BALLS, "ballmode")?
            .unwrap_or(BallMode::default());
        lattice.ball_radius = match el.attr_ns(BEAM_LATTICE_BALLS, "ballradius") {
            Some(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                Error::parse_error_with_context("ballradius", raw, "a number")
            })?),
            None => None,
        };
    }
    if lattice.ball_mode != BallMode::None && lattice.ball_radius.is_none() {
        return Err(Error::invalid_xml_element(
            "beamlattice",
            "ballradius is required when ballmode is not none",
        ));
    }

    let mesh = p.mesh_mut("beamlattice")?;
    if mesh.beam_lattice.is_some() {
        return Err(Error::invalid_xml_element("beamlattice", "a mesh holds at most one lattice"));
    }
    mesh.beam_lattice = Some(lattice);
    Ok(Node::BeamLattice)
}

pub(crate) fn open_beams(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::BeamLattice), "beamlattice")?;
    Ok(Node::Beams)
}

pub(crate) fn open_beam(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Beams), "beams")?;
    let mut beam = Beam::new(req_index(el, "v1")?, req_index(el, "v2")?);
    beam.r1 = p.state.float(el, "r1")?;
    beam.r2 = p.state.float(el, "r2")?;
    beam.cap1 = p.state.opt(el, "cap1")?;
    beam.cap2 = p.state.opt(el, "cap2")?;
    beam.pid = p.reference(el, "pid")?;
    beam.p1 = p.state.prop(el, "p1")?;
    beam.p2 = p.state.prop(el, "p2")?;
    p.lattice_mut()?.beams.push(beam);
    p.state.tick(ProgressPhase::ReadMesh)?;
    Ok(Node::Leaf)
}

pub(crate) fn open_balls(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::BeamLattice), "beamlattice")?;
    Ok(Node::Balls)
}

pub(crate) fn open_ball(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::Balls), "balls")?;
    let ball = Ball {
        vindex: req_index(el, "vindex")?,
        radius: p.state.float(el, "r")?,
        pid: p.reference(el, "pid")?,
        p: p.state.prop(el, "p")?,
    };
    p.lattice_mut()?.balls.push(ball);
    Ok(Node::Leaf)
}

pub(crate) fn open_beam_sets(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::BeamLattice), "beamlattice")?;
    Ok(Node::BeamSets)
}

pub(crate) fn open_beam_set(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    p.expect_parent(el, |n| matches!(n, Node::BeamSets), "beamsets")?;
    Ok(Node::BeamSet(Box::new(BeamSet {
        name: el.attr("name").unwrap_or_default().to_string(),
        identifier: el.attr("identifier").unwrap_or_default().to_string(),
        ..Default::default()
    })))
}

pub(crate) fn open_beam_ref(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let index = req_index(el, "index")?;
    match p.stack.last_mut() {
        Some(Node::BeamSet(set)) => set.refs.push(index),
        _ => return Err(Error::invalid_xml_element("ref", "must be inside <beamset>")),
    }
    Ok(Node::Leaf)
}

pub(crate) fn open_ball_ref(p: &mut PartParser<'_>, el: &XmlElement) -> Result<Node> {
    let index = req_index(el, "index")?;
    match p.stack.last_mut() {
        Some(Node::BeamSet(set)) => set.ball_refs.push(index),
        _ => return Err(Error::invalid_xml_element("ballref", "must be inside <beamset>")),
    }
    Ok(Node::Leaf)
}
