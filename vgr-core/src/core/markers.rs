//! Marker placement along paths.

use crate::core::document::{MarkerDef, MarkerUnits, Orient};
use crate::core::geom::{Affine, Rect};
use crate::core::path::{Path, PathElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPosition {
    Start,
    Mid,
    End,
}

/// A vertex that receives a marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerVertex {
    pub position: MarkerPosition,
    pub x: f64,
    pub y: f64,
    /// Auto orientation in degrees
    pub angle: f64,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    x: f64,
    y: f64,
    incoming: Option<(f64, f64)>,
    outgoing: Option<(f64, f64)>,
}

fn direction(from: (f64, f64), to: (f64, f64)) -> Option<(f64, f64)> {
    let d = (to.0 - from.0, to.1 - from.1);
    if d.0.abs() < 1e-12 && d.1.abs() < 1e-12 {
        None
    } else {
        Some(d)
    }
}

fn first_some(dirs: &[Option<(f64, f64)>]) -> Option<(f64, f64)> {
    dirs.iter().copied().flatten().next()
}

fn angle_of(d: (f64, f64)) -> f64 {
    d.1.atan2(d.0).to_degrees()
}

fn bisect(incoming: f64, outgoing: f64) -> f64 {
    let mut diff = outgoing - incoming;
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff < -180.0 {
        diff += 360.0;
    }
    incoming + diff / 2.0
}

/// Start, mid and end vertices of a path with their auto angles.
pub fn marker_vertices(path: &Path) -> Vec<MarkerVertex> {
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut current = (0.0, 0.0);
    let mut subpath_start_idx = 0usize;

    for el in path.elements() {
        match *el {
            PathElement::MoveTo(x, y) => {
                vertices.push(Vertex {
                    x,
                    y,
                    incoming: None,
                    outgoing: None,
                });
                subpath_start_idx = vertices.len() - 1;
                current = (x, y);
            }
            PathElement::ClosePath => {
                let Some(start) = vertices.get(subpath_start_idx).copied() else {
                    continue;
                };
                let closing = direction(current, (start.x, start.y));
                if let Some(last) = vertices.last_mut() {
                    if last.outgoing.is_none() {
                        last.outgoing = closing;
                    }
                }
                let incoming = closing.or_else(|| vertices.last().and_then(|v| v.incoming));
                vertices.push(Vertex {
                    x: start.x,
                    y: start.y,
                    incoming,
                    outgoing: start.outgoing,
                });
                current = (start.x, start.y);
            }
            segment => {
                let Some(end) = segment.end_point() else {
                    continue;
                };
                let (out_dir, in_dir) = match segment {
                    PathElement::QuadTo(cx, cy, _, _) => (
                        first_some(&[direction(current, (cx, cy)), direction(current, end)]),
                        first_some(&[direction((cx, cy), end), direction(current, end)]),
                    ),
                    PathElement::CurveTo(c1x, c1y, c2x, c2y, _, _) => (
                        first_some(&[
                            direction(current, (c1x, c1y)),
                            direction(current, (c2x, c2y)),
                            direction(current, end),
                        ]),
                        first_some(&[
                            direction((c2x, c2y), end),
                            direction((c1x, c1y), end),
                            direction(current, end),
                        ]),
                    ),
                    _ => (direction(current, end), direction(current, end)),
                };
                if vertices.is_empty() {
                    vertices.push(Vertex {
                        x: current.0,
                        y: current.1,
                        incoming: None,
                        outgoing: None,
                    });
                }
                if let Some(last) = vertices.last_mut() {
                    if last.outgoing.is_none() {
                        last.outgoing = out_dir;
                    }
                }
                vertices.push(Vertex {
                    x: end.0,
                    y: end.1,
                    incoming: in_dir,
                    outgoing: None,
                });
                current = end;
            }
        }
    }

    let count = vertices.len();
    vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let position = if i == 0 {
                MarkerPosition::Start
            } else if i + 1 == count {
                MarkerPosition::End
            } else {
                MarkerPosition::Mid
            };
            let angle = match (v.incoming, v.outgoing) {
                (Some(a), Some(b)) => bisect(angle_of(a), angle_of(b)),
                (Some(a), None) => angle_of(a),
                (None, Some(b)) => angle_of(b),
                (None, None) => 0.0,
            };
            MarkerVertex {
                position,
                x: v.x,
                y: v.y,
                angle,
            }
        })
        .collect()
}

/// Transform placing the marker viewport at `vertex`.
///
/// The viewport occupies `(0, 0, marker_width, marker_height)` in the
/// returned space; see [`marker_viewport`] and [`marker_content_transform`].
pub fn marker_placement(marker: &MarkerDef, vertex: &MarkerVertex, stroke_width: f64) -> Affine {
    let angle = match marker.orient {
        Orient::Auto => vertex.angle,
        Orient::AutoStartReverse if vertex.position == MarkerPosition::Start => {
            vertex.angle + 180.0
        }
        Orient::AutoStartReverse => vertex.angle,
        Orient::Angle(a) => a,
    };
    let units_scale = match marker.units {
        MarkerUnits::StrokeWidth => stroke_width,
        MarkerUnits::UserSpaceOnUse => 1.0,
    };
    let (ref_x, ref_y) = marker_content_transform(marker).apply(marker.ref_x, marker.ref_y);
    Affine::translate(vertex.x, vertex.y)
        .concat(&Affine::rotate_degrees(angle))
        .concat(&Affine::scale(units_scale, units_scale))
        .concat(&Affine::translate(-ref_x, -ref_y))
}

pub fn marker_viewport(marker: &MarkerDef) -> Rect {
    Rect::from_xywh(0.0, 0.0, marker.marker_width, marker.marker_height)
}

/// Maps marker content coordinates into its viewport.
pub fn marker_content_transform(marker: &MarkerDef) -> Affine {
    match &marker.view_box {
        Some(vb) => marker
            .preserve_aspect_ratio
            .view_box_transform(vb, &marker_viewport(marker)),
        None => Affine::IDENTITY,
    }
}
