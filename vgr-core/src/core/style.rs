//! Presentation properties attached to scene items.
//!
//! These are the computed style values the renderer consults: paints,
//! opacities, stroke geometry, blending, paint order and a few layout flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::RenderError;

/// Line cap style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Butt cap (default) - stroke is squared off at the endpoint
    #[default]
    Butt,
    /// Round cap - semicircular arc with center at endpoint
    Round,
    /// Square cap - stroke continues half a width beyond the endpoint
    Square,
}

/// Line join style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    /// Miter join (default) - outer edges meet at a sharp point
    #[default]
    Miter,
    /// Round join - circular arc between the edges
    Round,
    /// Bevel join - outer edges meet at a beveled edge
    Bevel,
}

/// Fill rule for determining inside/outside of paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    /// Non-zero winding number rule (default)
    #[default]
    NonZero,
    /// Even-odd rule
    EvenOdd,
}

/// Stroke properties for path rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeProps {
    /// Line width in user space units (default: 1.0)
    pub width: f64,

    /// Line cap style (default: Butt)
    pub line_cap: LineCap,

    /// Line join style (default: Miter)
    pub line_join: LineJoin,

    /// Miter limit (default: 4.0)
    pub miter_limit: f64,

    /// Dash pattern - array of dash lengths alternating on/off
    pub dash_array: Vec<f64>,

    /// Dash phase - offset into the dash pattern (default: 0)
    pub dash_offset: f64,

    /// Draw one device pixel wide regardless of transform
    pub hairline: bool,
}

impl Default for StrokeProps {
    fn default() -> Self {
        StrokeProps {
            width: 1.0,
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
            miter_limit: 4.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
            hairline: false,
        }
    }
}

/// An sRGB color with components in 0.0-1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Color { r, g, b }
    }

    pub fn black() -> Self {
        Color::new(0.0, 0.0, 0.0)
    }

    pub fn white() -> Self {
        Color::new(1.0, 1.0, 1.0)
    }

    pub fn red() -> Self {
        Color::new(1.0, 0.0, 0.0)
    }

    pub fn green() -> Self {
        Color::new(0.0, 1.0, 0.0)
    }

    pub fn blue() -> Self {
        Color::new(0.0, 0.0, 1.0)
    }

    /// Create a color from byte values (0-255).
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }

    /// Components as bytes.
    pub fn to_u8(&self) -> (u8, u8, u8) {
        let conv = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        (conv(self.r), conv(self.g), conv(self.b))
    }

    /// Parse `#rgb`, `#rrggbb` or one of a handful of keywords.
    pub fn parse(text: &str) -> Option<Color> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            let digits: Vec<u8> = hex
                .chars()
                .map(|c| c.to_digit(16).map(|d| d as u8))
                .collect::<Option<Vec<_>>>()?;
            return match digits.len() {
                3 => Some(Color::rgb(digits[0] * 17, digits[1] * 17, digits[2] * 17)),
                6 => Some(Color::rgb(
                    digits[0] * 16 + digits[1],
                    digits[2] * 16 + digits[3],
                    digits[4] * 16 + digits[5],
                )),
                _ => None,
            };
        }
        match text.to_ascii_lowercase().as_str() {
            "black" => Some(Color::black()),
            "white" => Some(Color::white()),
            "red" => Some(Color::red()),
            "lime" => Some(Color::green()),
            "green" => Some(Color::rgb(0, 128, 0)),
            "blue" => Some(Color::blue()),
            "gray" | "grey" => Some(Color::rgb(128, 128, 128)),
            "yellow" => Some(Color::rgb(255, 255, 0)),
            _ => None,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::black()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (r, g, b) = self.to_u8();
        write!(f, "#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl TryFrom<String> for Color {
    type Error = RenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value)
            .ok_or_else(|| RenderError::InvalidDocument(format!("invalid color '{}'", value)))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// A fill or stroke paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PaintSpec", into = "PaintSpec")]
pub enum Paint {
    None,
    Color(Color),
    /// Reference to a gradient, pattern or hatch by id
    Server { id: String, fallback: Option<Color> },
}

impl Paint {
    pub fn is_none(&self) -> bool {
        matches!(self, Paint::None)
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Paint::Color(_))
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Paint::Server { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PaintSpec {
    Text(String),
    Server {
        server: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<Color>,
    },
}

impl TryFrom<PaintSpec> for Paint {
    type Error = RenderError;

    fn try_from(spec: PaintSpec) -> Result<Self, Self::Error> {
        match spec {
            PaintSpec::Text(text) => {
                let text = text.trim();
                if text == "none" {
                    Ok(Paint::None)
                } else if let Some(id) = text
                    .strip_prefix("url(#")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    Ok(Paint::Server {
                        id: id.to_string(),
                        fallback: None,
                    })
                } else {
                    Color::try_from(text.to_string()).map(Paint::Color)
                }
            }
            PaintSpec::Server { server, fallback } => Ok(Paint::Server {
                id: server,
                fallback,
            }),
        }
    }
}

impl From<Paint> for PaintSpec {
    fn from(paint: Paint) -> Self {
        match paint {
            Paint::None => PaintSpec::Text("none".to_string()),
            Paint::Color(c) => PaintSpec::Text(c.to_string()),
            Paint::Server { id, fallback } => PaintSpec::Server {
                server: id,
                fallback,
            },
        }
    }
}

/// Compositing operator for items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Name used by the PDF `/BM` entry.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "ColorDodge",
            BlendMode::ColorBurn => "ColorBurn",
            BlendMode::HardLight => "HardLight",
            BlendMode::SoftLight => "SoftLight",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }
}

/// One layer of the paint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaintLayer {
    Fill,
    Stroke,
    Markers,
}

/// Order in which fill, stroke and markers are painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaintOrder(pub [PaintLayer; 3]);

impl Default for PaintOrder {
    fn default() -> Self {
        PaintOrder([PaintLayer::Fill, PaintLayer::Stroke, PaintLayer::Markers])
    }
}

impl PaintOrder {
    /// Position of `layer` in the order.
    pub fn position(&self, layer: PaintLayer) -> usize {
        self.0.iter().position(|l| *l == layer).unwrap_or(0)
    }

    pub fn is_normal(&self) -> bool {
        *self == PaintOrder::default()
    }
}

impl TryFrom<String> for PaintOrder {
    type Error = RenderError;

    /// Listed layers come first; missing ones follow in default order.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        let text = value.trim();
        if text.is_empty() || text == "normal" {
            return Ok(PaintOrder::default());
        }
        let mut layers: Vec<PaintLayer> = Vec::with_capacity(3);
        for word in text.split_whitespace() {
            let layer = match word {
                "fill" => PaintLayer::Fill,
                "stroke" => PaintLayer::Stroke,
                "markers" => PaintLayer::Markers,
                other => {
                    return Err(RenderError::InvalidDocument(format!(
                        "invalid paint-order keyword '{}'",
                        other
                    )));
                }
            };
            if !layers.contains(&layer) {
                layers.push(layer);
            }
        }
        for layer in PaintOrder::default().0 {
            if !layers.contains(&layer) {
                layers.push(layer);
            }
        }
        Ok(PaintOrder([layers[0], layers[1], layers[2]]))
    }
}

impl From<PaintOrder> for String {
    fn from(order: PaintOrder) -> Self {
        if order.is_normal() {
            return "normal".to_string();
        }
        order
            .0
            .iter()
            .map(|l| match l {
                PaintLayer::Fill => "fill",
                PaintLayer::Stroke => "stroke",
                PaintLayer::Markers => "markers",
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Image sampling hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageRendering {
    #[default]
    Auto,
    OptimizeQuality,
    OptimizeSpeed,
    Pixelated,
    CrispEdges,
}

impl ImageRendering {
    /// Whether nearest-neighbour sampling is requested.
    pub fn wants_nearest(&self) -> bool {
        matches!(
            self,
            ImageRendering::OptimizeSpeed | ImageRendering::Pixelated | ImageRendering::CrispEdges
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
}

/// Computed style of a scene item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub fill: Paint,
    pub fill_opacity: f64,
    pub fill_rule: FillRule,
    pub stroke: Paint,
    pub stroke_opacity: f64,
    #[serde(rename = "stroke_style")]
    pub stroke_props: StrokeProps,
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub paint_order: PaintOrder,
    pub image_rendering: ImageRendering,
    pub overflow: Overflow,
    /// The item has a filter effect
    pub filter: bool,
    pub marker_start: Option<String>,
    pub marker_mid: Option<String>,
    pub marker_end: Option<String>,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            fill: Paint::Color(Color::black()),
            fill_opacity: 1.0,
            fill_rule: FillRule::NonZero,
            stroke: Paint::None,
            stroke_opacity: 1.0,
            stroke_props: StrokeProps::default(),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            paint_order: PaintOrder::default(),
            image_rendering: ImageRendering::Auto,
            overflow: Overflow::Visible,
            filter: false,
            marker_start: None,
            marker_mid: None,
            marker_end: None,
        }
    }
}

impl Style {
    pub fn has_markers(&self) -> bool {
        self.marker_start.is_some() || self.marker_mid.is_some() || self.marker_end.is_some()
    }
}
