//! Beam Lattice extension types

use super::ResourceId;
use super::material::PropertyId;
use crate::error::{Error, Result};
use std::str::FromStr;

/// Cap mode for beam ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeamCapMode {
    /// Sphere cap (rounded ends)
    #[default]
    Sphere,
    /// Butt cap (flat ends)
    Butt,
    /// Hemisphere cap (half sphere at end)
    Hemisphere,
}

impl BeamCapMode {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            BeamCapMode::Sphere => "sphere",
            BeamCapMode::Butt => "butt",
            BeamCapMode::Hemisphere => "hemisphere",
        }
    }
}

impl FromStr for BeamCapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sphere" => Ok(BeamCapMode::Sphere),
            "butt" => Ok(BeamCapMode::Butt),
            "hemisphere" => Ok(BeamCapMode::Hemisphere),
            _ => Err(Error::parse_error_with_context(
                "capmode",
                s,
                "sphere, butt or hemisphere",
            )),
        }
    }
}

/// How the lattice is clipped by its clipping mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClippingMode {
    /// No clipping
    #[default]
    None,
    /// Keep the inside of the clipping mesh
    Inside,
    /// Keep the outside of the clipping mesh
    Outside,
}

impl ClippingMode {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            ClippingMode::None => "none",
            ClippingMode::Inside => "inside",
            ClippingMode::Outside => "outside",
        }
    }
}

impl FromStr for ClippingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ClippingMode::None),
            "inside" => Ok(ClippingMode::Inside),
            "outside" => Ok(ClippingMode::Outside),
            _ => Err(Error::parse_error_with_context(
                "clippingmode",
                s,
                "none, inside or outside",
            )),
        }
    }
}

/// Which beam ends receive balls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BallMode {
    /// No balls
    #[default]
    None,
    /// Balls at mixed (listed) vertices
    Mixed,
    /// Balls at every beam vertex
    All,
}

impl BallMode {
    /// XML attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            BallMode::None => "none",
            BallMode::Mixed => "mixed",
            BallMode::All => "all",
        }
    }
}

impl FromStr for BallMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(BallMode::None),
            "mixed" => Ok(BallMode::Mixed),
            "all" => Ok(BallMode::All),
            _ => Err(Error::parse_error_with_context(
                "ballmode",
                s,
                "none, mixed or all",
            )),
        }
    }
}

/// A beam between two mesh vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    /// First vertex index
    pub v1: u32,
    /// Second vertex index
    pub v2: u32,
    /// Radius at `v1`, lattice default when absent
    pub r1: Option<f64>,
    /// Radius at `v2`, `r1` when absent
    pub r2: Option<f64>,
    /// Cap at `v1`
    pub cap1: Option<BeamCapMode>,
    /// Cap at `v2`
    pub cap2: Option<BeamCapMode>,
    /// Property group
    pub pid: Option<ResourceId>,
    /// Property at `v1`
    pub p1: Option<PropertyId>,
    /// Property at `v2`
    pub p2: Option<PropertyId>,
}

impl Beam {
    /// Beam with lattice defaults
    pub fn new(v1: u32, v2: u32) -> Self {
        Self {
            v1,
            v2,
            r1: None,
            r2: None,
            cap1: None,
            cap2: None,
            pid: None,
            p1: None,
            p2: None,
        }
    }

    /// Beam with explicit end radii
    pub fn with_radii(v1: u32, v2: u32, r1: f64, r2: f64) -> Self {
        Self {
            r1: Some(r1),
            r2: Some(r2),
            ..Self::new(v1, v2)
        }
    }
}

/// A ball at a beam vertex
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    /// Vertex index
    pub vindex: u32,
    /// Radius, lattice ball radius when absent
    pub radius: Option<f64>,
    /// Property group
    pub pid: Option<ResourceId>,
    /// Property
    pub p: Option<PropertyId>,
}

/// Named subset of beams and balls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamSet {
    /// Display name
    pub name: String,
    /// Identifier
    pub identifier: String,
    /// Indices into the lattice's beams
    pub refs: Vec<u32>,
    /// Indices into the lattice's balls
    pub ball_refs: Vec<u32>,
}

/// `<beamlattice>` attached to a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct BeamLattice {
    /// Default beam radius
    pub radius: f64,
    /// Minimum beam length
    pub min_length: f64,
    /// Default cap mode
    pub cap_mode: BeamCapMode,
    /// Clipping mode
    pub clipping_mode: ClippingMode,
    /// Mesh object used for clipping
    pub clipping_mesh: Option<ResourceId>,
    /// Mesh object used as representation
    pub representation_mesh: Option<ResourceId>,
    /// Ball mode (balls sub-extension)
    pub ball_mode: BallMode,
    /// Default ball radius
    pub ball_radius: Option<f64>,
    /// Lattice-level property group
    pub pid: Option<ResourceId>,
    /// Lattice-level property
    pub pindex: Option<PropertyId>,
    /// Beams
    pub beams: Vec<Beam>,
    /// Balls
    pub balls: Vec<Ball>,
    /// Beam sets
    pub beam_sets: Vec<BeamSet>,
}

impl BeamLattice {
    /// Lattice with a default radius and minimum length
    pub fn new(radius: f64, min_length: f64) -> Self {
        Self {
            radius,
            min_length,
            cap_mode: BeamCapMode::default(),
            clipping_mode: ClippingMode::default(),
            clipping_mesh: None,
            representation_mesh: None,
            ball_mode: BallMode::default(),
            ball_radius: None,
            pid: None,
            pindex: None,
            beams: Vec::new(),
            balls: Vec::new(),
            beam_sets: Vec::new(),
        }
    }

    /// Check beam, ball and set indices against the mesh vertex count
    pub fn validate(&self, vertex_count: usize) -> Result<()> {
        for (i, beam) in self.beams.iter().enumerate() {
            if beam.v1 as usize >= vertex_count || beam.v2 as usize >= vertex_count {
                return Err(Error::IndexOutOfRange(format!(
                    "beam {} references vertex beyond {}",
                    i, vertex_count
                )));
            }
            if beam.v1 == beam.v2 {
                return Err(Error::InvalidModel(format!(
                    "beam {} connects vertex {} to itself",
                    i, beam.v1
                )));
            }
        }
        if let Some(ball) = self
            .balls
            .iter()
            .find(|b| b.vindex as usize >= vertex_count)
        {
            return Err(Error::IndexOutOfRange(format!(
                "ball at vertex {} beyond {}",
                ball.vindex, vertex_count
            )));
        }
        for set in &self.beam_sets {
            if set.refs.iter().any(|r| *r as usize >= self.beams.len())
                || set.ball_refs.iter().any(|r| *r as usize >= self.balls.len())
            {
                return Err(Error::IndexOutOfRange(format!(
                    "beam set '{}' references a missing beam or ball",
                    set.name
                )));
            }
        }
        Ok(())
    }
}
