//! Headless rendering host: HTML tree, layout, display list and rasterizer

pub mod dom;
pub mod layout;
pub mod paint;
pub mod raster;

pub use dom::{Document, ElementInfo, NodeId};
pub use paint::{DisplayList, PaintCommand};
pub use raster::SoftwareRasterizer;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in CSS pixels (page coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Overlapping region of two rectangles, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

/// Opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a handful of named colours.
    /// `transparent` and anything unrecognised yield `None`.
    pub fn parse(value: &str) -> Option<Color> {
        let v = value.trim().to_ascii_lowercase();
        if let Some(hex) = v.strip_prefix('#') {
            return match hex.len() {
                3 => {
                    let mut it = hex.chars().map(|c| c.to_digit(16));
                    let (r, g, b) = (it.next()??, it.next()??, it.next()??);
                    Some(Color::rgb((r * 17) as u8, (g * 17) as u8, (b * 17) as u8))
                }
                6 => {
                    let n = u32::from_str_radix(hex, 16).ok()?;
                    Some(Color::rgb((n >> 16) as u8, (n >> 8) as u8, n as u8))
                }
                _ => None,
            };
        }
        if let Some(args) = v.strip_prefix("rgb(").and_then(|s| s.strip_suffix(')')) {
            let parts: Vec<u8> = args
                .split(',')
                .map(|p| p.trim().parse::<u8>())
                .collect::<std::result::Result<_, _>>()
                .ok()?;
            return match parts.as_slice() {
                [r, g, b] => Some(Color::rgb(*r, *g, *b)),
                _ => None,
            };
        }
        match v.as_str() {
            "black" => Some(Color::BLACK),
            "white" => Some(Color::WHITE),
            "red" => Some(Color::rgb(255, 0, 0)),
            "green" => Some(Color::rgb(0, 128, 0)),
            "blue" => Some(Color::rgb(0, 0, 255)),
            _ => None,
        }
    }

    pub fn to_unit_rgb(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Color::parse(&value).ok_or_else(|| format!("unrecognised colour '{}'", value))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

/// PNG bitmap produced from a capture target.
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// Width in device pixels
    pub width: u32,
    /// Height in device pixels
    pub height: u32,
    /// Device pixels per CSS pixel used for the capture
    pub pixel_ratio: f32,
    pub png_data: Vec<u8>,
}

impl RasterImage {
    /// `data:image/png;base64,...` view of the encoded bitmap.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png_data)
        )
    }
}
