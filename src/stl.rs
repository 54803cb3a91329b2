//! STL import and export
//!
//! Reading accepts binary and ASCII files and produces one mesh object with
//! one build item. Coincident vertices are merged on a 0.001 unit grid;
//! facets that collapse to fewer than three distinct vertices or carry
//! coordinates outside the representable range are skipped.
//!
//! Writing produces binary STL holding every mesh reachable from the build,
//! with build item and component transforms applied.

use crate::error::{Error, Result};
use crate::model::{BuildItem, Mesh, Model, Object, Transform, Triangle, Vertex};
use std::collections::HashMap;
use std::io::{Read, Write};
use tracing::{debug, trace};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;
/// Grid on which vertices are considered identical
const MERGE_UNITS: f64 = 0.001;
/// Larger coordinates mark a facet as invalid
const MAX_COORDINATE: f64 = 1.0e9;

/// Read an STL stream into a fresh model
pub fn read_stl<R: Read>(mut reader: R) -> Result<Model> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let facets = if is_ascii(&data) {
        parse_ascii(&data)?
    } else {
        parse_binary(&data)?
    };

    let mut builder = MeshBuilder::default();
    for facet in &facets {
        builder.add_facet(facet)?;
    }
    debug!(
        facets = facets.len(),
        vertices = builder.mesh.vertex_count(),
        triangles = builder.mesh.triangle_count(),
        skipped = builder.skipped,
        "read STL"
    );

    let mut model = Model::new();
    let id = model.add_resource(Object::mesh(builder.mesh))?;
    model.add_build_item(BuildItem::new(id))?;
    Ok(model)
}

/// Write every mesh instance of the build as binary STL
pub fn write_stl<W: Write>(model: &Model, mut out: W) -> Result<()> {
    let mut facets: Vec<[[f64; 3]; 3]> = Vec::new();
    for item in model.build().items() {
        model.for_each_mesh_instance(
            item.object,
            &item.effective_transform(),
            &mut |_, _, mesh, t| collect_facets(mesh, t, &mut facets),
        )?;
    }
    let count = u32::try_from(facets.len()).map_err(|_| {
        Error::InvalidModel(format!("{} triangles do not fit in an STL file", facets.len()))
    })?;

    let mut header = [0u8; HEADER_LEN];
    let label = b"binary STL written by lib3mf-engine";
    header[..label.len()].copy_from_slice(label);
    out.write_all(&header)?;
    out.write_all(&count.to_le_bytes())?;
    for facet in &facets {
        let mut record = [0u8; FACET_LEN];
        let normal = normal_of(facet);
        let values = normal.iter().chain(facet.iter().flatten());
        for (slot, v) in record.chunks_exact_mut(4).zip(values) {
            slot.copy_from_slice(&(*v as f32).to_le_bytes());
        }
        out.write_all(&record)?;
    }
    out.flush()?;
    debug!(triangles = count, "wrote STL");
    Ok(())
}

fn collect_facets(mesh: &Mesh, transform: &Transform, facets: &mut Vec<[[f64; 3]; 3]>) {
    let vertices = mesh.vertices();
    for t in mesh.triangles() {
        let corner = |i: u32| transform.apply(vertices[i as usize].to_array());
        facets.push([corner(t.v1), corner(t.v2), corner(t.v3)]);
    }
}

fn normal_of(facet: &[[f64; 3]; 3]) -> [f64; 3] {
    let [a, b, c] = facet;
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 0.0, 0.0]
    }
}

/// ASCII files start with `solid` and are not sized like a binary file
fn is_ascii(data: &[u8]) -> bool {
    let trimmed = data.trim_ascii_start();
    if !trimmed.starts_with(b"solid") {
        return false;
    }
    if data.len() >= HEADER_LEN + 4 {
        let count = binary_count(data) as usize;
        if data.len() == HEADER_LEN + 4 + count * FACET_LEN {
            return false;
        }
    }
    true
}

fn binary_count(data: &[u8]) -> u32 {
    let mut count = [0u8; 4];
    count.copy_from_slice(&data[HEADER_LEN..HEADER_LEN + 4]);
    u32::from_le_bytes(count)
}

fn parse_binary(data: &[u8]) -> Result<Vec<[[f64; 3]; 3]>> {
    if data.len() < HEADER_LEN + 4 {
        return Err(Error::ParseError(format!(
            "STL file of {} bytes is shorter than its header",
            data.len()
        )));
    }
    let count = binary_count(data) as usize;
    let body = &data[HEADER_LEN + 4..];
    let needed = count.checked_mul(FACET_LEN).unwrap_or(usize::MAX);
    if body.len() < needed {
        return Err(Error::ParseError(format!(
            "STL declares {} facets but holds {} bytes of facet data",
            count,
            body.len()
        )));
    }
    let facets = body
        .chunks_exact(FACET_LEN)
        .take(count)
        .map(|record| {
            // Skip the 12 byte normal; the attribute word is ignored.
            let mut values = record[12..48].chunks_exact(4).map(|b| {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(b);
                f32::from_le_bytes(raw) as f64
            });
            let mut facet = [[0.0; 3]; 3];
            for corner in facet.iter_mut() {
                for axis in corner.iter_mut() {
                    *axis = values.next().unwrap_or(f64::NAN);
                }
            }
            facet
        })
        .collect();
    Ok(facets)
}

fn parse_ascii(data: &[u8]) -> Result<Vec<[[f64; 3]; 3]>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::ParseError(format!("ASCII STL is not valid UTF-8: {}", e)))?;
    let mut facets = Vec::new();
    let mut corners: Vec<[f64; 3]> = Vec::with_capacity(3);
    for (line_no, line) in text.lines().enumerate() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("vertex") => {
                let mut p = [0.0; 3];
                for axis in p.iter_mut() {
                    let word = words.next().ok_or_else(|| {
                        Error::ParseError(format!("line {}: vertex needs three coordinates", line_no + 1))
                    })?;
                    *axis = word
                        .parse()
                        .map_err(|_| Error::parse_error_with_context("vertex", word, "number"))?;
                }
                corners.push(p);
            }
            Some("endloop") => {
                if corners.len() != 3 {
                    return Err(Error::ParseError(format!(
                        "line {}: facet with {} vertices",
                        line_no + 1,
                        corners.len()
                    )));
                }
                facets.push([corners[0], corners[1], corners[2]]);
                corners.clear();
            }
            _ => {}
        }
    }
    trace!(facets = facets.len(), "parsed ASCII STL");
    Ok(facets)
}

#[derive(Default)]
struct MeshBuilder {
    mesh: Mesh,
    nodes: HashMap<[i64; 3], u32>,
    skipped: usize,
}

impl MeshBuilder {
    fn add_facet(&mut self, facet: &[[f64; 3]; 3]) -> Result<()> {
        let valid = facet
            .iter()
            .flatten()
            .all(|v| v.is_finite() && v.abs() < MAX_COORDINATE);
        if !valid {
            self.skipped += 1;
            return Ok(());
        }
        let [a, b, c] = (*facet).map(|p| self.node(p));
        if a == b || a == c || b == c {
            self.skipped += 1;
            return Ok(());
        }
        self.mesh.add_triangle(Triangle::new(a, b, c))?;
        Ok(())
    }

    fn node(&mut self, p: [f64; 3]) -> u32 {
        let key = p.map(|v| (v / MERGE_UNITS).round() as i64);
        let mesh = &mut self.mesh;
        *self
            .nodes
            .entry(key)
            .or_insert_with(|| mesh.add_vertex(Vertex::new(p[0], p[1], p[2])))
    }
}
