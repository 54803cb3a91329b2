//! Slice extension types

use super::ResourceId;
use crate::error::{Error, Result};

/// 2D vertex within a slice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex2D {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Vertex2D {
    /// Create a vertex
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Polygon given as indices into the slice's vertex list
///
/// A polygon is closed when its last index equals its first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlicePolygon {
    indices: Vec<u32>,
}

impl SlicePolygon {
    /// Vertex indices in order
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// First index equals last index
    pub fn is_closed(&self) -> bool {
        self.indices.len() > 2 && self.indices.first() == self.indices.last()
    }
}

/// One slice at height `ztop`
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    ztop: f64,
    vertices: Vec<Vertex2D>,
    polygons: Vec<SlicePolygon>,
}

impl Slice {
    fn new(ztop: f64) -> Self {
        Self {
            ztop,
            vertices: Vec::new(),
            polygons: Vec::new(),
        }
    }

    /// Top Z of the slice
    pub fn ztop(&self) -> f64 {
        self.ztop
    }

    /// Vertices referenced by the polygons
    pub fn vertices(&self) -> &[Vertex2D] {
        &self.vertices
    }

    /// Mutable vertices; the count is fixed so polygon indices stay valid
    pub fn vertices_mut(&mut self) -> &mut [Vertex2D] {
        &mut self.vertices
    }

    /// Append a vertex, returning its index
    pub fn add_vertex(&mut self, vertex: Vertex2D) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    /// Start a polygon at `start`, returning the polygon index
    pub fn begin_polygon(&mut self, start: u32) -> Result<usize> {
        self.check_vertex(start)?;
        self.polygons.push(SlicePolygon {
            indices: vec![start],
        });
        Ok(self.polygons.len() - 1)
    }

    /// Append an index to a polygon
    ///
    /// The index must address an existing vertex and differ from the previous one.
    pub fn add_polygon_index(&mut self, polygon: usize, index: u32) -> Result<()> {
        self.check_vertex(index)?;
        let count = self.polygons.len();
        let poly = self.polygons.get_mut(polygon).ok_or_else(|| {
            Error::IndexOutOfRange(format!("polygon {} of {}", polygon, count))
        })?;
        if poly.indices.last() == Some(&index) {
            return Err(Error::InvalidModel(format!(
                "Slice polygon repeats vertex index {} consecutively",
                index
            )));
        }
        poly.indices.push(index);
        Ok(())
    }

    /// Polygons in order
    pub fn polygons(&self) -> &[SlicePolygon] {
        &self.polygons
    }

    fn check_vertex(&self, index: u32) -> Result<()> {
        if index as usize >= self.vertices.len() {
            return Err(Error::IndexOutOfRange(format!(
                "slice vertex {} of {}",
                index,
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// `<slicestack>` resource
///
/// Holds either its own slices or references to other stacks, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceStack {
    /// Bottom Z of the stack
    pub bottom_z: f64,
    slices: Vec<Slice>,
    pub(crate) slice_refs: Vec<ResourceId>,
}

impl SliceStack {
    /// Empty stack starting at `bottom_z`
    pub fn new(bottom_z: f64) -> Self {
        Self {
            bottom_z,
            slices: Vec::new(),
            slice_refs: Vec::new(),
        }
    }

    /// Append a slice
    ///
    /// `ztop` must not be below `bottom_z` and must be strictly greater than
    /// the previous slice's `ztop`.
    pub fn add_slice(&mut self, ztop: f64) -> Result<&mut Slice> {
        if !self.slice_refs.is_empty() {
            return Err(Error::InvalidModel(
                "Slice stack with slice references cannot hold slices".to_string(),
            ));
        }
        if !ztop.is_finite() || ztop < self.bottom_z {
            return Err(Error::SliceOrder(format!(
                "ztop {} is below the stack bottom {}",
                ztop, self.bottom_z
            )));
        }
        if let Some(last) = self.slices.last()
            && ztop <= last.ztop
        {
            return Err(Error::SliceOrder(format!(
                "ztop {} is not above the previous slice at {}",
                ztop, last.ztop
            )));
        }
        self.slices.push(Slice::new(ztop));
        let index = self.slices.len() - 1;
        Ok(&mut self.slices[index])
    }

    /// Slices in order
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Mutable access to one slice
    pub fn slice_mut(&mut self, index: usize) -> Option<&mut Slice> {
        self.slices.get_mut(index)
    }

    /// Referenced stacks in order
    pub fn slice_refs(&self) -> &[ResourceId] {
        &self.slice_refs
    }
}
