//! Path construction and management.
//!
//! Paths are built incrementally using move, line, curve, and rectangle
//! operations, or parsed from SVG-style path data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::RenderError;
use crate::core::geom::{Affine, Rect};

/// Bézier approximation constant for quarter ellipse arcs.
const KAPPA: f64 = 0.552_284_749_830_793_4;

/// A path element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElement {
    /// Move to a new point (starts a new subpath)
    MoveTo(f64, f64),
    /// Line to a point
    LineTo(f64, f64),
    /// Quadratic Bézier curve (cpx, cpy, x, y)
    QuadTo(f64, f64, f64, f64),
    /// Cubic Bézier curve (cp1x, cp1y, cp2x, cp2y, x, y)
    CurveTo(f64, f64, f64, f64, f64, f64),
    /// Close the current subpath
    ClosePath,
}

impl PathElement {
    /// End point of the segment, if it has one.
    pub fn end_point(&self) -> Option<(f64, f64)> {
        match *self {
            PathElement::MoveTo(x, y)
            | PathElement::LineTo(x, y)
            | PathElement::QuadTo(_, _, x, y)
            | PathElement::CurveTo(_, _, _, _, x, y) => Some((x, y)),
            PathElement::ClosePath => None,
        }
    }

    fn transform(&self, m: &Affine) -> PathElement {
        match *self {
            PathElement::MoveTo(x, y) => {
                let (x, y) = m.apply(x, y);
                PathElement::MoveTo(x, y)
            }
            PathElement::LineTo(x, y) => {
                let (x, y) = m.apply(x, y);
                PathElement::LineTo(x, y)
            }
            PathElement::QuadTo(cx, cy, x, y) => {
                let (cx, cy) = m.apply(cx, cy);
                let (x, y) = m.apply(x, y);
                PathElement::QuadTo(cx, cy, x, y)
            }
            PathElement::CurveTo(c1x, c1y, c2x, c2y, x, y) => {
                let (c1x, c1y) = m.apply(c1x, c1y);
                let (c2x, c2y) = m.apply(c2x, c2y);
                let (x, y) = m.apply(x, y);
                PathElement::CurveTo(c1x, c1y, c2x, c2y, x, y)
            }
            PathElement::ClosePath => PathElement::ClosePath,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::MoveTo(x, y) => write!(f, "M {} {}", x, y),
            PathElement::LineTo(x, y) => write!(f, "L {} {}", x, y),
            PathElement::QuadTo(cx, cy, x, y) => write!(f, "Q {} {} {} {}", cx, cy, x, y),
            PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y) => {
                write!(f, "C {} {} {} {} {} {}", cp1x, cp1y, cp2x, cp2y, x, y)
            }
            PathElement::ClosePath => write!(f, "Z"),
        }
    }
}

/// A geometric path.
///
/// Scene files carry paths as SVG-style path data strings; the string form
/// round-trips through `Display` and `FromStr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    /// The path elements
    elements: Vec<PathElement>,

    /// Current point (if any)
    current_point: Option<(f64, f64)>,

    /// Start of the current subpath (for close operations)
    subpath_start: Option<(f64, f64)>,

    /// Whether we have an open subpath
    has_open_subpath: bool,
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

impl Path {
    /// Create a new empty path.
    pub fn new() -> Self {
        Path {
            elements: Vec::new(),
            current_point: None,
            subpath_start: None,
            has_open_subpath: false,
        }
    }

    /// Rectangle path.
    pub fn from_rect(rect: &Rect) -> Self {
        let mut path = Path::new();
        path.rect(rect.x0, rect.y0, rect.width(), rect.height());
        path
    }

    /// Ellipse path centered on (cx, cy).
    pub fn from_ellipse(cx: f64, cy: f64, rx: f64, ry: f64) -> Self {
        let mut path = Path::new();
        path.ellipse(cx, cy, rx, ry);
        path
    }

    /// Move to a new point, starting a new subpath.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.elements.push(PathElement::MoveTo(x, y));
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
        self.has_open_subpath = false;
    }

    /// Add a line segment from the current point to (x, y).
    pub fn line_to(&mut self, x: f64, y: f64) {
        // Implicit move
        if self.current_point.is_none() {
            self.move_to(x, y);
            return;
        }

        self.elements.push(PathElement::LineTo(x, y));
        self.current_point = Some((x, y));
        self.has_open_subpath = true;
    }

    /// Add a quadratic Bézier curve.
    pub fn quad_to(&mut self, cpx: f64, cpy: f64, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(cpx, cpy);
        }

        self.elements.push(PathElement::QuadTo(cpx, cpy, x, y));
        self.current_point = Some((x, y));
        self.has_open_subpath = true;
    }

    /// Add a cubic Bézier curve.
    ///
    /// # Arguments
    /// * `cp1x, cp1y` - First control point
    /// * `cp2x, cp2y` - Second control point
    /// * `x, y` - End point
    pub fn curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(cp1x, cp1y);
        }

        self.elements
            .push(PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y));
        self.current_point = Some((x, y));
        self.has_open_subpath = true;
    }

    /// Add a rectangle to the path.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close_path();
    }

    /// Add a closed ellipse made of four cubic arcs.
    pub fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64) {
        let kx = rx * KAPPA;
        let ky = ry * KAPPA;
        self.move_to(cx + rx, cy);
        self.curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
        self.curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
        self.curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
        self.curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
        self.close_path();
    }

    /// Close the current subpath.
    pub fn close_path(&mut self) {
        if self.has_open_subpath {
            self.elements.push(PathElement::ClosePath);
            if let Some(start) = self.subpath_start {
                self.current_point = Some(start);
            }
            self.has_open_subpath = false;
        }
    }

    /// Append all elements of another path.
    pub fn extend(&mut self, other: &Path) {
        for el in other.elements() {
            self.push(*el);
        }
    }

    fn push(&mut self, el: PathElement) {
        match el {
            PathElement::MoveTo(x, y) => self.move_to(x, y),
            PathElement::LineTo(x, y) => self.line_to(x, y),
            PathElement::QuadTo(cx, cy, x, y) => self.quad_to(cx, cy, x, y),
            PathElement::CurveTo(a, b, c, d, x, y) => self.curve_to(a, b, c, d, x, y),
            PathElement::ClosePath => self.close_path(),
        }
    }

    /// A copy of this path with every point mapped through `m`.
    pub fn transform(&self, m: &Affine) -> Path {
        if m.is_identity() {
            return self.clone();
        }
        let mut out = Path::new();
        for el in &self.elements {
            out.push(el.transform(m));
        }
        out
    }

    /// Get the current point.
    pub fn current_point(&self) -> Option<(f64, f64)> {
        self.current_point
    }

    /// Get the path elements.
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Get the number of elements in the path.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Get the bounding box of the path.
    ///
    /// Control points are included, so curves may report a slightly larger
    /// box than their exact extent.
    pub fn bounding_box(&self) -> Option<Rect> {
        if self.elements.is_empty() {
            return None;
        }

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut add = |x: f64, y: f64| {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        };

        for el in &self.elements {
            match *el {
                PathElement::MoveTo(x, y) | PathElement::LineTo(x, y) => add(x, y),
                PathElement::QuadTo(cx, cy, x, y) => {
                    add(cx, cy);
                    add(x, y);
                }
                PathElement::CurveTo(cp1x, cp1y, cp2x, cp2y, x, y) => {
                    add(cp1x, cp1y);
                    add(cp2x, cp2y);
                    add(x, y);
                }
                PathElement::ClosePath => {}
            }
        }

        Some(Rect::new(min_x, min_y, max_x, max_y))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, el) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", el)?;
        }
        Ok(())
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for Path {
    type Error = RenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Path {
    type Err = RenderError;

    /// Parse SVG path data.
    ///
    /// Supports the `M L H V C S Q T Z` commands in both absolute and
    /// relative form. Elliptical arcs are not supported.
    fn from_str(d: &str) -> Result<Self, Self::Err> {
        PathDataParser::new(d).parse()
    }
}

struct PathDataParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PathDataParser<'a> {
    fn new(d: &'a str) -> Self {
        PathDataParser {
            bytes: d.as_bytes(),
            pos: 0,
        }
    }

    fn skip_separators(&mut self) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_whitespace() || self.bytes[self.pos] == b',')
        {
            self.pos += 1;
        }
    }

    fn peek_command(&mut self) -> Option<u8> {
        self.skip_separators();
        self.bytes
            .get(self.pos)
            .copied()
            .filter(|b| b.is_ascii_alphabetic() && *b != b'e' && *b != b'E')
    }

    fn at_number(&mut self) -> bool {
        self.skip_separators();
        matches!(self.bytes.get(self.pos), Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.'))
    }

    fn number(&mut self) -> Result<f64, RenderError> {
        self.skip_separators();
        let start = self.pos;
        if matches!(self.bytes.get(self.pos), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut seen_dot = false;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else if (b == b'e' || b == b'E') && self.pos > start {
                self.pos += 1;
                if matches!(self.bytes.get(self.pos), Some(b'-' | b'+')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|e| RenderError::InvalidDocument(e.to_string()))?;
        text.parse::<f64>().map_err(|_| {
            RenderError::InvalidDocument(format!("bad number in path data at offset {}", start))
        })
    }

    fn pair(&mut self, rel: bool, cur: (f64, f64)) -> Result<(f64, f64), RenderError> {
        let x = self.number()?;
        let y = self.number()?;
        Ok(if rel { (cur.0 + x, cur.1 + y) } else { (x, y) })
    }

    fn parse(mut self) -> Result<Path, RenderError> {
        let mut path = Path::new();
        let mut cur = (0.0, 0.0);
        let mut start = (0.0, 0.0);
        // Last control point, for smooth curve reflection
        let mut last_cubic: Option<(f64, f64)> = None;
        let mut last_quad: Option<(f64, f64)> = None;

        while let Some(cmd) = self.peek_command() {
            self.pos += 1;
            let rel = cmd.is_ascii_lowercase();
            let upper = cmd.to_ascii_uppercase();
            let mut first = true;

            loop {
                if upper != b'Z' && !first && !self.at_number() {
                    break;
                }
                match upper {
                    b'M' => {
                        let p = self.pair(rel, cur)?;
                        if first {
                            path.move_to(p.0, p.1);
                            start = p;
                        } else {
                            path.line_to(p.0, p.1);
                        }
                        cur = p;
                        last_cubic = None;
                        last_quad = None;
                    }
                    b'L' => {
                        let p = self.pair(rel, cur)?;
                        path.line_to(p.0, p.1);
                        cur = p;
                        last_cubic = None;
                        last_quad = None;
                    }
                    b'H' => {
                        let x = self.number()?;
                        cur.0 = if rel { cur.0 + x } else { x };
                        path.line_to(cur.0, cur.1);
                        last_cubic = None;
                        last_quad = None;
                    }
                    b'V' => {
                        let y = self.number()?;
                        cur.1 = if rel { cur.1 + y } else { y };
                        path.line_to(cur.0, cur.1);
                        last_cubic = None;
                        last_quad = None;
                    }
                    b'C' | b'S' => {
                        let c1 = if upper == b'C' {
                            self.pair(rel, cur)?
                        } else {
                            match last_cubic {
                                Some((lx, ly)) => (2.0 * cur.0 - lx, 2.0 * cur.1 - ly),
                                None => cur,
                            }
                        };
                        let c2 = self.pair(rel, cur)?;
                        let p = self.pair(rel, cur)?;
                        path.curve_to(c1.0, c1.1, c2.0, c2.1, p.0, p.1);
                        last_cubic = Some(c2);
                        last_quad = None;
                        cur = p;
                    }
                    b'Q' | b'T' => {
                        let c = if upper == b'Q' {
                            self.pair(rel, cur)?
                        } else {
                            match last_quad {
                                Some((lx, ly)) => (2.0 * cur.0 - lx, 2.0 * cur.1 - ly),
                                None => cur,
                            }
                        };
                        let p = self.pair(rel, cur)?;
                        path.quad_to(c.0, c.1, p.0, p.1);
                        last_quad = Some(c);
                        last_cubic = None;
                        cur = p;
                    }
                    b'Z' => {
                        path.close_path();
                        cur = start;
                        last_cubic = None;
                        last_quad = None;
                        break;
                    }
                    other => {
                        return Err(RenderError::InvalidDocument(format!(
                            "unsupported path command '{}'",
                            other as char
                        )));
                    }
                }
                first = false;
            }
        }

        self.skip_separators();
        if self.pos < self.bytes.len() {
            return Err(RenderError::InvalidDocument(format!(
                "unexpected data in path at offset {}",
                self.pos
            )));
        }
        Ok(path)
    }
}

/// Builder for constructing paths.
pub struct PathBuilder {
    path: Path,
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathBuilder {
    /// Create a new path builder.
    pub fn new() -> Self {
        PathBuilder { path: Path::new() }
    }

    /// Move to a point.
    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.path.move_to(x, y);
        self
    }

    /// Add a line segment.
    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.path.line_to(x, y);
        self
    }

    /// Add a quadratic Bézier curve.
    pub fn quad_to(&mut self, cpx: f64, cpy: f64, x: f64, y: f64) -> &mut Self {
        self.path.quad_to(cpx, cpy, x, y);
        self
    }

    /// Add a cubic Bézier curve.
    pub fn curve_to(
        &mut self,
        cp1x: f64,
        cp1y: f64,
        cp2x: f64,
        cp2y: f64,
        x: f64,
        y: f64,
    ) -> &mut Self {
        self.path.curve_to(cp1x, cp1y, cp2x, cp2y, x, y);
        self
    }

    /// Add a rectangle.
    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.path.rect(x, y, width, height);
        self
    }

    /// Close the current subpath.
    pub fn close(&mut self) -> &mut Self {
        self.path.close_path();
        self
    }

    /// Build and return the path.
    pub fn build(&self) -> Path {
        self.path.clone()
    }
}
