//! Capture-and-export pipeline.
//!
//! An export claims its target, forces the desktop layout, measures the true
//! extents, rasterizes, restores the layout, slices the image into PDF pages
//! and hands the named file to a sink:
//!
//! ```text
//! Idle → LayoutForced → Measured → Rasterized → LayoutRestored → Paginated → Saved
//! ```
//!
//! Any failure moves to `Failed`, and the layout is always restored first.
//!
//! ```no_run
//! use chatlytics_export::export::{DirectorySink, Exporter};
//! use chatlytics_export::rendering::Document;
//! use chatlytics_export::{ExportConfig, Viewport};
//!
//! # async fn run() -> chatlytics_export::Result<()> {
//! let html = std::fs::read_to_string("dashboard.html")?;
//! let doc = Document::parse(&html, Viewport { width: 390, height: 844 })?;
//! let target = doc.query("#dashboard")?.expect("dashboard element");
//!
//! let exporter = Exporter::new(ExportConfig::default()).with_sink(DirectorySink::new("downloads"));
//! let report = exporter.generate_report(&doc, target, "Team A").await?;
//! println!("{} ({} pages)", report.filename, report.pages);
//! # Ok(())
//! # }
//! ```

pub mod extents;
pub mod layout_guard;
pub mod naming;
pub mod paginate;
pub mod settle;
pub mod sink;

pub use extents::{capture_size, scan_extents, BoundingExtents, CaptureSize};
pub use layout_guard::{LayoutGuard, StyleSnapshot, NORMALIZED_PROPERTIES};
pub use naming::{report_filename, sanitize_label};
pub use paginate::{
    assemble_pdf, decode_raster, plan_pages, plan_single_page, DecodedImage, PageFormat, PageLayout, PagePlan,
    SeamOptions,
};
pub use settle::SettleStrategy;
pub use sink::{ArtifactSink, DirectorySink, MemorySink, ReportArtifact};

pub use crate::rendering::raster::{fit_pixel_ratio, CaptureRequest, Rasterizer, MIN_PIXEL_RATIO};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::rendering::{NodeId, RasterImage, SoftwareRasterizer};
use crate::surface::Surface;
use crate::{Error, ExportConfig, Result};

/// Stages of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    LayoutForced,
    Measured,
    Rasterized,
    LayoutRestored,
    Paginated,
    Saved,
    Failed,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub filename: String,
    pub pages: usize,
    pub capture: CaptureSize,
    /// Raster size in device pixels
    pub raster_size: (u32, u32),
    pub bytes: usize,
    pub states: Vec<ExportState>,
}

/// Cancels an in-flight export. Cloning shares the same flag.
///
/// The export notices the abort at its next stage boundary, restores the
/// target's layout and fails with [`Error::Aborted`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    aborted: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { aborted: Arc::new(tx) }
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    /// Resolve once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        let mut rx = self.aborted.subscribe();
        // The sender lives as long as `self`, so this only returns on abort.
        let _ = rx.wait_for(|aborted| *aborted).await;
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::Aborted(stage));
        }
        Ok(())
    }
}

/// Exclusive claim on a target for the duration of one export.
struct TargetLease<'a, S: Surface> {
    surface: &'a S,
    node: NodeId,
}

impl<'a, S: Surface> TargetLease<'a, S> {
    fn acquire(surface: &'a S, node: NodeId) -> Result<Self> {
        if !surface.try_claim(node) {
            return Err(Error::ExportInProgress(surface.describe(node)));
        }
        Ok(Self { surface, node })
    }
}

impl<S: Surface> Drop for TargetLease<'_, S> {
    fn drop(&mut self) {
        self.surface.release_claim(self.node);
    }
}

struct StateLog {
    states: Vec<ExportState>,
}

impl StateLog {
    fn new() -> Self {
        Self { states: vec![ExportState::Idle] }
    }

    fn enter(&mut self, state: ExportState) {
        log::debug!("export state: {} -> {}", self.current(), state);
        self.states.push(state);
    }

    fn current(&self) -> ExportState {
        self.states.last().copied().unwrap_or(ExportState::Idle)
    }
}

/// Runs exports with one configuration, rasterizer and sink.
pub struct Exporter {
    config: ExportConfig,
    rasterizer: Arc<dyn Rasterizer>,
    sink: Arc<dyn ArtifactSink>,
}

impl Exporter {
    /// Software rasterizer, saving into the current directory.
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            rasterizer: Arc::new(SoftwareRasterizer::new()),
            sink: Arc::new(DirectorySink::new(".")),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.rasterizer = Arc::new(rasterizer);
        self
    }

    pub fn with_sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Share a sink with the caller, e.g. to inspect a [`MemorySink`].
    pub fn with_shared_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export `target` as a PDF named after `label` and today's date.
    pub async fn generate_report<S: Surface>(&self, surface: &S, target: NodeId, label: &str) -> Result<ExportReport> {
        self.run(surface, target, label, naming::today(), &AbortHandle::new()).await
    }

    /// Like [`generate_report`](Self::generate_report), cancellable through `abort`.
    pub async fn generate_report_with_abort<S: Surface>(
        &self,
        surface: &S,
        target: NodeId,
        label: &str,
        abort: &AbortHandle,
    ) -> Result<ExportReport> {
        self.run(surface, target, label, naming::today(), abort).await
    }

    /// Export with an explicit date for the filename.
    pub async fn generate_report_on<S: Surface>(
        &self,
        surface: &S,
        target: NodeId,
        label: &str,
        date: NaiveDate,
    ) -> Result<ExportReport> {
        self.run(surface, target, label, date, &AbortHandle::new()).await
    }

    async fn run<S: Surface>(
        &self,
        surface: &S,
        target: NodeId,
        label: &str,
        date: NaiveDate,
        abort: &AbortHandle,
    ) -> Result<ExportReport> {
        let mut log = StateLog::new();
        let result = self.pipeline(surface, target, label, date, abort, &mut log).await;
        match result {
            Ok(mut report) => {
                report.states = log.states;
                Ok(report)
            }
            Err(e) => {
                // The layout guard has already been dropped at this point.
                if log.states.contains(&ExportState::LayoutForced) && !log.states.contains(&ExportState::LayoutRestored) {
                    log.enter(ExportState::LayoutRestored);
                }
                log.enter(ExportState::Failed);
                log::error!("PDF generation failed for {}: {}", surface.describe(target), e);
                Err(e)
            }
        }
    }

    async fn pipeline<S: Surface>(
        &self,
        surface: &S,
        target: NodeId,
        label: &str,
        date: NaiveDate,
        abort: &AbortHandle,
        log: &mut StateLog,
    ) -> Result<ExportReport> {
        let cfg = &self.config;
        if !surface.contains(target) {
            return Err(Error::MissingTarget(surface.describe(target)));
        }
        let _lease = TargetLease::acquire(surface, target)?;
        abort.check("start")?;

        let (raster, capture) = {
            let guard = LayoutGuard::acquire(surface, target, cfg.desktop_width)?;
            log.enter(ExportState::LayoutForced);

            let fallback = Duration::from_millis(cfg.settle_fallback_ms);
            tokio::select! {
                _ = settle::settle(surface, cfg.settle, fallback) => {}
                _ = abort.aborted() => {}
            }
            abort.check("layout settle")?;

            let extents = scan_extents(surface, target)?;
            let capture = capture_size(extents, cfg.padding, cfg.safety_buffer);
            log.enter(ExportState::Measured);
            log::debug!("extents {:?} -> capture {}x{}", extents, capture.width, capture.height);
            abort.check("measurement")?;

            let raster = self.rasterize(surface, target, capture).await?;
            log.enter(ExportState::Rasterized);

            guard.restore()?;
            log.enter(ExportState::LayoutRestored);
            (raster, capture)
        };
        abort.check("rasterization")?;

        let raster_size = (raster.width, raster.height);
        let decoded = tokio::task::spawn_blocking(move || decode_raster(&raster))
            .await
            .map_err(|e| Error::ImageDecode(format!("decode task failed: {}", e)))??;

        let plan = match cfg.page_layout {
            PageLayout::Paginated => plan_pages(decoded.width, decoded.height, cfg.page_format, &cfg.seams),
            PageLayout::SinglePage => plan_single_page(decoded.width, decoded.height, decoded.pixel_ratio),
        };
        let filename = report_filename(&cfg.product_label, label, date);
        let title = format!("{} report: {}", cfg.product_label, label);
        let bytes = assemble_pdf(&decoded, &plan, cfg.background, &title)?;
        log.enter(ExportState::Paginated);
        abort.check("pagination")?;

        let artifact = ReportArtifact { filename, bytes };
        self.sink.save(&artifact)?;
        log.enter(ExportState::Saved);

        Ok(ExportReport {
            filename: artifact.filename,
            pages: plan.page_count(),
            capture,
            raster_size,
            bytes: artifact.bytes.len(),
            states: Vec::new(),
        })
    }

    async fn rasterize<S: Surface>(&self, surface: &S, target: NodeId, capture: CaptureSize) -> Result<RasterImage> {
        let cfg = &self.config;
        let origin = surface
            .bounding_rect(target)
            .ok_or_else(|| Error::Capture(format!("{} is no longer rendered", surface.describe(target))))?;
        let exclude_class = cfg.exclude_class.as_str();
        let list = surface.display_list(target, &|info| info.has_class(exclude_class))?;

        let requested = cfg.effective_pixel_ratio();
        let pixel_ratio = fit_pixel_ratio(capture.width, capture.height, requested, cfg.max_canvas_dimension)
            .ok_or_else(|| {
                Error::Capture(format!(
                    "{}x{} px capture does not fit a {}px canvas even at {}x",
                    capture.width, capture.height, cfg.max_canvas_dimension, MIN_PIXEL_RATIO
                ))
            })?;
        if pixel_ratio < requested {
            log::warn!(
                "{}x{} px capture exceeds the {}px canvas limit at {}x, rasterizing at {}x",
                capture.width,
                capture.height,
                cfg.max_canvas_dimension,
                requested,
                pixel_ratio
            );
        }

        let request = CaptureRequest {
            origin: (origin.x, origin.y),
            width: capture.width,
            height: capture.height,
            padding: cfg.padding,
            pixel_ratio,
            background: cfg.background,
            max_dimension: cfg.max_canvas_dimension,
        };
        let rasterizer = Arc::clone(&self.rasterizer);
        tokio::task::spawn_blocking(move || rasterizer.rasterize(list, &request))
            .await
            .map_err(|e| Error::Capture(format!("raster task failed: {}", e)))?
    }
}
