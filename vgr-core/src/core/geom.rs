//! Affine transforms and axis-aligned rectangles.
//!
//! Matrices use the 6-element `[a b c d e f]` layout:
//! ```text
//! | a c e |
//! | b d f |
//! | 0 0 1 |
//! ```
//! so a point maps to `(a*x + c*y + e, b*x + d*y + f)`.

use serde::{Deserialize, Serialize};

/// A 2D affine transformation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f64; 6]);

impl Default for Affine {
    fn default() -> Self {
        Affine::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Affine([a, b, c, d, e, f])
    }

    pub fn identity() -> Self {
        Affine::IDENTITY
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Affine([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    pub fn rotate_degrees(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Affine([cos, sin, -sin, cos, 0.0, 0.0])
    }

    /// Compose so that `other` is applied first, then `self`.
    ///
    /// This is the CTM update performed by a `cm`-style concatenation:
    /// `ctm.concat(&m)` is the new CTM after transforming by `m`.
    pub fn concat(&self, other: &Affine) -> Affine {
        let [a, b, c, d, e, f] = other.0;
        let [ca, cb, cc, cd, ce, cf] = self.0;
        Affine([
            ca * a + cc * b,
            cb * a + cd * b,
            ca * c + cc * d,
            cb * c + cd * d,
            ca * e + cc * f + ce,
            cb * e + cd * f + cf,
        ])
    }

    /// Compose so that `self` is applied first, then `other`.
    pub fn then(&self, other: &Affine) -> Affine {
        other.concat(self)
    }

    pub fn determinant(&self) -> f64 {
        let [a, b, c, d, _, _] = self.0;
        a * d - b * c
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON * 16.0 || !det.is_finite() {
            return None;
        }
        let [a, b, c, d, e, f] = self.0;
        let inv = 1.0 / det;
        Some(Affine([
            d * inv,
            -b * inv,
            -c * inv,
            a * inv,
            (c * f - d * e) * inv,
            (b * e - a * f) * inv,
        ]))
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Apply the linear part only.
    pub fn apply_vector(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, _, _] = self.0;
        (a * x + c * y, b * x + d * y)
    }

    pub fn translation(&self) -> (f64, f64) {
        (self.0[4], self.0[5])
    }

    pub fn with_translation(&self, tx: f64, ty: f64) -> Affine {
        let mut m = *self;
        m.0[4] = tx;
        m.0[5] = ty;
        m
    }

    pub fn is_identity(&self) -> bool {
        *self == Affine::IDENTITY
    }

    /// Average scale factor of the linear part.
    pub fn expansion(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// An axis-aligned rectangle given by its two corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RectSpec", into = "RectSpec")]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[derive(Serialize, Deserialize)]
struct RectSpec {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    width: f64,
    height: f64,
}

impl From<RectSpec> for Rect {
    fn from(spec: RectSpec) -> Self {
        Rect::from_xywh(spec.x, spec.y, spec.width, spec.height)
    }
}

impl From<Rect> for RectSpec {
    fn from(rect: Rect) -> Self {
        RectSpec {
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Rect {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect::new(x, y, x + width, y + height)
    }

    pub fn left(&self) -> f64 {
        self.x0
    }

    pub fn top(&self) -> f64 {
        self.y0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x0, self.y0),
            (self.x1, self.y0),
            (self.x1, self.y1),
            (self.x0, self.y1),
        ]
    }

    /// Bounding box of this rectangle after transformation.
    pub fn transform(&self, m: &Affine) -> Rect {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for (x, y) in self.corners() {
            let (tx, ty) = m.apply(x, y);
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }
        Rect::new(min_x, min_y, max_x, max_y)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x1 > x0 && y1 > y0 {
            Some(Rect { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Smallest rectangle with integer corners containing this one.
    pub fn round_outwards(&self) -> Rect {
        Rect {
            x0: self.x0.floor(),
            y0: self.y0.floor(),
            x1: self.x1.ceil(),
            y1: self.y1.ceil(),
        }
    }

    /// Affine mapping the unit square onto this rectangle.
    pub fn unit_transform(&self) -> Affine {
        Affine::new(self.width(), 0.0, 0.0, self.height(), self.x0, self.y0)
    }
}
