//! Software rasterizer: display list → RGBA canvas → PNG

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use super::layout::{CHAR_ADVANCE, LINE_HEIGHT};
use super::paint::{DisplayList, PaintCommand};
use super::{Color, RasterImage, Rect};
use crate::{Error, Result};

/// Everything a rasterizer needs to turn a display list into a bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Top-left of the capture root in page coordinates
    pub origin: (f32, f32),
    /// Capture size in CSS px, padding included
    pub width: u32,
    pub height: u32,
    /// Offset of the content from the capture's top-left corner
    pub padding: f32,
    /// Device pixels per CSS px, already capped
    pub pixel_ratio: f32,
    pub background: Color,
    /// Largest canvas edge, in device pixels, the rasterizer will allocate
    pub max_dimension: u32,
}

impl CaptureRequest {
    /// Canvas size in device pixels.
    pub fn canvas_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.pixel_ratio).ceil() as u32,
            (self.height as f32 * self.pixel_ratio).ceil() as u32,
        )
    }
}

/// Lowest pixel ratio a capture is reduced to before it is rejected.
pub const MIN_PIXEL_RATIO: f32 = 0.5;

/// Largest pixel ratio, at most `requested`, for which a `width`×`height` CSS px
/// capture fits within `max_dimension` device pixels on both edges.
///
/// `None` when even [`MIN_PIXEL_RATIO`] does not fit.
pub fn fit_pixel_ratio(width: u32, height: u32, requested: f32, max_dimension: u32) -> Option<f32> {
    let longest = width.max(height).max(1) as f32;
    let limit = max_dimension as f32;
    let fits = |ratio: f32| (longest * ratio).ceil() <= limit;
    if fits(requested) {
        return Some(requested);
    }
    let mut ratio = ((limit / longest) * 10_000.0).floor() / 10_000.0;
    while ratio >= MIN_PIXEL_RATIO && !fits(ratio) {
        ratio -= 0.0001;
    }
    (ratio >= MIN_PIXEL_RATIO).then_some(ratio)
}

/// Turns a display list into an encoded bitmap.
///
/// Implementations run on the blocking thread pool and must not touch the
/// surface; everything they need is in the display list and the request.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, list: DisplayList, request: &CaptureRequest) -> Result<RasterImage>;
}

/// Pure-Rust rasterizer for [`DisplayList`]s.
///
/// Text is drawn as one bar per non-space character, which keeps output
/// deterministic without font dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRasterizer;

impl SoftwareRasterizer {
    pub fn new() -> Self {
        SoftwareRasterizer
    }

    /// Paint without encoding; used by `rasterize` and by pixel-level tests.
    pub fn paint(&self, list: &DisplayList, request: &CaptureRequest) -> Result<RgbaImage> {
        let (w, h) = request.canvas_size();
        if w == 0 || h == 0 {
            return Err(Error::Capture(format!("empty canvas {}x{}", w, h)));
        }
        if w > request.max_dimension || h > request.max_dimension {
            return Err(Error::Capture(format!(
                "canvas {}x{} exceeds the {}px limit",
                w, h, request.max_dimension
            )));
        }

        let bg = request.background;
        let mut canvas = RgbaImage::from_pixel(w, h, Rgba([bg.r, bg.g, bg.b, 255]));
        let painter = Painter {
            dx: request.padding - request.origin.0,
            dy: request.padding - request.origin.1,
            ratio: request.pixel_ratio,
        };

        for cmd in &list.commands {
            match cmd {
                PaintCommand::SolidRect { rect, color, clip } => {
                    painter.fill(&mut canvas, *rect, *color, *clip);
                }
                PaintCommand::TextRun { x, y, lines, color, clip } => {
                    for (row, line) in lines.iter().enumerate() {
                        let ly = y + row as f32 * LINE_HEIGHT + 3.0;
                        for (col, ch) in line.chars().enumerate() {
                            if ch.is_whitespace() {
                                continue;
                            }
                            let glyph = Rect::new(x + col as f32 * CHAR_ADVANCE + 1.0, ly, CHAR_ADVANCE - 2.0, LINE_HEIGHT - 6.0);
                            painter.fill(&mut canvas, glyph, *color, *clip);
                        }
                    }
                }
            }
        }
        Ok(canvas)
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn rasterize(&self, list: DisplayList, request: &CaptureRequest) -> Result<RasterImage> {
        let canvas = self.paint(&list, request)?;
        let (width, height) = canvas.dimensions();
        let mut png_data = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)
            .map_err(|e| Error::Capture(format!("PNG encoding failed: {}", e)))?;
        Ok(RasterImage {
            width,
            height,
            pixel_ratio: request.pixel_ratio,
            png_data,
        })
    }
}

/// Maps page coordinates onto canvas pixels.
struct Painter {
    dx: f32,
    dy: f32,
    ratio: f32,
}

impl Painter {
    fn fill(&self, canvas: &mut RgbaImage, rect: Rect, color: Color, clip: Option<Rect>) {
        let visible = match clip {
            Some(c) => match rect.intersect(&c) {
                Some(r) => r,
                None => return,
            },
            None => rect,
        };
        let to_px = |v: f32, d: f32, max: u32| (((v + d) * self.ratio).round().max(0.0) as u32).min(max);
        let (w, h) = canvas.dimensions();
        let x0 = to_px(visible.x, self.dx, w);
        let x1 = to_px(visible.right(), self.dx, w);
        let y0 = to_px(visible.y, self.dy, h);
        let y1 = to_px(visible.bottom(), self.dy, h);
        let px = Rgba([color.r, color.g, color.b, 255]);
        for y in y0..y1 {
            for x in x0..x1 {
                canvas.put_pixel(x, y, px);
            }
        }
    }
}
