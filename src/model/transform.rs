//! Affine transforms and axis-aligned bounding boxes

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Number of values in a 3MF transform attribute
pub const TRANSFORM_MATRIX_SIZE: usize = 12;

/// 3MF affine transform
///
/// Stored in the attribute order `m00 m01 m02 m10 m11 m12 m20 m21 m22 m30 m31 m32`.
/// Points are row vectors: `p' = p * M`, with the last row as translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub [f64; TRANSFORM_MATRIX_SIZE]);

impl Transform {
    /// The identity transform
    pub const IDENTITY: Transform = Transform([
        1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
    ]);

    /// Pure translation
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY.0;
        m[9] = x;
        m[10] = y;
        m[11] = z;
        Transform(m)
    }

    /// Whether this is exactly the identity
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Transform a point
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            p[0] * m[0] + p[1] * m[3] + p[2] * m[6] + m[9],
            p[0] * m[1] + p[1] * m[4] + p[2] * m[7] + m[10],
            p[0] * m[2] + p[1] * m[5] + p[2] * m[8] + m[11],
        ]
    }

    /// Transform that applies `self` first and `next` afterwards
    pub fn then(&self, next: &Transform) -> Transform {
        let a = &self.0;
        let b = &next.0;
        let mut out = [0.0; TRANSFORM_MATRIX_SIZE];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        let t = next.apply([a[9], a[10], a[11]]);
        out[9] = t[0];
        out[10] = t[1];
        out[11] = t[2];
        Transform(out)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut values = [0.0; TRANSFORM_MATRIX_SIZE];
        let mut count = 0;
        for token in s.split_whitespace() {
            if count == TRANSFORM_MATRIX_SIZE {
                count += 1;
                break;
            }
            let v = token.parse::<f64>().map_err(|_| {
                Error::parse_error_with_context("transform", token, "floating-point number")
            })?;
            if !v.is_finite() {
                return Err(Error::parse_error_with_context(
                    "transform",
                    token,
                    "finite number",
                ));
            }
            values[count] = v;
            count += 1;
        }
        if count != TRANSFORM_MATRIX_SIZE {
            return Err(Error::ParseError(format!(
                "Transform '{}' must contain exactly {} values",
                s, TRANSFORM_MATRIX_SIZE
            )));
        }
        Ok(Transform(values))
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: [f64; 3],
    /// Maximum corner
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Box containing a single point
    pub fn from_point(p: [f64; 3]) -> Self {
        Self { min: p, max: p }
    }

    /// Grow to contain `p`
    pub fn extend(&mut self, p: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut out = *self;
        out.extend(other.min);
        out.extend(other.max);
        out
    }

    /// The eight corners
    pub fn corners(&self) -> [[f64; 3]; 8] {
        let (a, b) = (self.min, self.max);
        [
            [a[0], a[1], a[2]],
            [b[0], a[1], a[2]],
            [a[0], b[1], a[2]],
            [b[0], b[1], a[2]],
            [a[0], a[1], b[2]],
            [b[0], a[1], b[2]],
            [a[0], b[1], b[2]],
            [b[0], b[1], b[2]],
        ]
    }

    /// Box enclosing this box after transformation
    pub fn transformed(&self, transform: &Transform) -> BoundingBox {
        let corners = self.corners();
        let mut out = BoundingBox::from_point(transform.apply(corners[0]));
        for c in &corners[1..] {
            out.extend(transform.apply(*c));
        }
        out
    }
}

/// Accumulate points into an optional box
pub(crate) fn extend_box(target: &mut Option<BoundingBox>, p: [f64; 3]) {
    match target {
        Some(b) => b.extend(p),
        None => *target = Some(BoundingBox::from_point(p)),
    }
}
