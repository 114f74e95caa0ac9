//! Chatlytics report export
//!
//! Captures a rendered analytics dashboard at a fixed desktop width, however
//! narrow the viewport it is displayed in, and turns it into a paginated PDF
//! report.
//!
//! # Features
//!
//! - **Headless host**: [`rendering::Document`] parses dashboard HTML, lays it
//!   out and paints it without a browser
//! - **Surface seam**: any host implementing [`Surface`] can be exported
//! - **Restoration guarantee**: layout mutations made for the capture are
//!   reverted on success, failure, abort and drop
//! - **Analysis client** (`api`, default): uploads chat exports to the
//!   Chatlytics analysis service
//!
//! # Example
//!
//! ```no_run
//! use chatlytics_export::rendering::Document;
//! use chatlytics_export::{ExportConfig, Viewport};
//!
//! # async fn run() -> chatlytics_export::Result<()> {
//! let html = std::fs::read_to_string("dashboard.html")?;
//! let doc = Document::parse(&html, Viewport { width: 390, height: 844 })?;
//! let target = doc.query("#dashboard")?.expect("dashboard element");
//!
//! let report = chatlytics_export::generate_report(&doc, target, "Team A", ExportConfig::default()).await?;
//! println!("saved {}", report.filename);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod export;
pub mod rendering;
pub mod surface;

// Analysis service client (multipart upload over reqwest)
#[cfg(feature = "api")]
pub mod api;

pub use export::{AbortHandle, ExportReport, ExportState, Exporter};
pub use rendering::{Color, NodeId};
pub use surface::Surface;

use export::{PageFormat, PageLayout, SeamOptions, SettleStrategy};

/// Configuration for report exports
///
/// The defaults reproduce the dashboard's own export: a 1280 px desktop
/// layout, 2x device pixels, A4 portrait pages on the dark theme background.
///
/// # Examples
///
/// ```
/// let cfg = chatlytics_export::ExportConfig::default();
/// assert_eq!(cfg.desktop_width, 1280);
/// assert_eq!(cfg.background.to_string(), "#09090b");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Product name used as the filename prefix
    pub product_label: String,
    /// Width in CSS px the target is forced to while it is captured
    pub desktop_width: u32,
    /// Padding around the content in the capture, CSS px
    pub padding: f32,
    /// Extra height below the content so nothing at the bottom edge is clipped
    pub safety_buffer: f32,
    /// Requested device pixel ratio
    pub pixel_ratio: f32,
    /// Upper bound on the pixel ratio, to keep canvases allocatable
    pub max_pixel_ratio: f32,
    /// Opaque fill behind the content and on every page
    pub background: Color,
    /// Elements with this class (and their subtrees) are left out of the capture
    pub exclude_class: String,
    pub settle: SettleStrategy,
    /// Delay used when the host offers no frame signal, milliseconds
    pub settle_fallback_ms: u64,
    pub page_format: PageFormat,
    pub page_layout: PageLayout,
    pub seams: SeamOptions,
    /// Largest canvas edge in device pixels
    pub max_canvas_dimension: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            product_label: "Chatlytics".to_string(),
            desktop_width: 1280,
            padding: 32.0,
            safety_buffer: 40.0,
            pixel_ratio: 2.0,
            max_pixel_ratio: 2.0,
            background: Color::rgb(0x09, 0x09, 0x0b),
            exclude_class: "export-exclude".to_string(),
            settle: SettleStrategy::default(),
            settle_fallback_ms: 150,
            page_format: PageFormat::A4,
            page_layout: PageLayout::Paginated,
            seams: SeamOptions::default(),
            max_canvas_dimension: 16_384,
        }
    }
}

impl ExportConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.product_label.is_empty() {
            return Err(Error::ConfigError("product_label must not be empty".into()));
        }
        if self.desktop_width == 0 {
            return Err(Error::ConfigError("desktop_width must be positive".into()));
        }
        for (name, value) in [("padding", self.padding), ("safety_buffer", self.safety_buffer)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!("{} must be a non-negative number", name)));
            }
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(Error::ConfigError("pixel_ratio must be positive".into()));
        }
        if !(self.max_pixel_ratio.is_finite() && self.max_pixel_ratio > 0.0) {
            return Err(Error::ConfigError("max_pixel_ratio must be positive".into()));
        }
        if self.max_canvas_dimension == 0 {
            return Err(Error::ConfigError("max_canvas_dimension must be positive".into()));
        }
        let (pw, ph) = self.page_format.size_pt();
        if !(pw > 0.0 && ph > 0.0) {
            return Err(Error::ConfigError("page size must be positive".into()));
        }
        if !(self.seams.pixel_bleed >= 0.0 && self.seams.pixel_bleed < ph) {
            return Err(Error::ConfigError("pixel_bleed must be in [0, page height)".into()));
        }
        Ok(())
    }

    /// Requested pixel ratio, capped at `max_pixel_ratio`.
    pub fn effective_pixel_ratio(&self) -> f32 {
        self.pixel_ratio.min(self.max_pixel_ratio)
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl std::str::FromStr for Viewport {
    type Err = Error;

    /// Parses `WIDTHxHEIGHT`, e.g. `390x844`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::ConfigError(format!("invalid viewport '{}', expected WIDTHxHEIGHT", s));
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(bad)?;
        let width: u32 = w.trim().parse().map_err(|_| bad())?;
        let height: u32 = h.trim().parse().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Self { width, height })
    }
}

/// Export `target` with `config`, saving into the current directory.
pub async fn generate_report<S: Surface>(
    surface: &S,
    target: NodeId,
    label: &str,
    config: ExportConfig,
) -> Result<ExportReport> {
    config.validate()?;
    Exporter::new(config).generate_report(surface, target, label).await
}
