//! End-to-end export tests against the headless document

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatlytics_export::export::{
    plan_pages, ArtifactSink, CaptureRequest, MemorySink, PageFormat, PageLayout, Rasterizer, SeamOptions,
    SettleStrategy,
};
use chatlytics_export::rendering::{DisplayList, Document, RasterImage, SoftwareRasterizer};
use chatlytics_export::{AbortHandle, Error, ExportConfig, ExportState, Exporter, NodeId, Surface, Viewport};
use chrono::NaiveDate;

const DASHBOARD: &str = r#"<!doctype html>
<html><head><style>body { color: red }</style><script>var x = 1;</script></head>
<body>
  <div id="dashboard" style="padding: 16px; max-width: 100%; overflow: hidden; background: #18181b">
    <h1 style="color: #fafafa">Overall</h1>
    <div style="display: flex; gap: 12px">
      <div style="height: 140px; background: #27272a">Messages 1204</div>
      <div style="height: 140px; background: #27272a">Words 8803</div>
    </div>
    <div class="export-exclude" style="height: 48px; background: #ff00ff">Download PDF</div>
    <div style="position: relative">
      <div style="position: absolute; left: 40px; top: 200px; width: 300px; height: 60px; background: #3f3f46">legend</div>
    </div>
  </div>
</body></html>"#;

const MARKER: [u8; 3] = [0xff, 0x00, 0xff];

fn phone() -> Viewport {
    Viewport { width: 390, height: 844 }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
}

fn config() -> ExportConfig {
    ExportConfig {
        pixel_ratio: 1.0,
        ..ExportConfig::default()
    }
}

fn load() -> (Document, NodeId) {
    let doc = Document::parse(DASHBOARD, phone()).expect("parse dashboard");
    let target = doc.query("#dashboard").unwrap().expect("dashboard");
    (doc, target)
}

fn styles(doc: &Document, node: NodeId) -> BTreeMap<String, String> {
    doc.inline_declarations(node)
}

/// Keeps every raster it produces.
#[derive(Default, Clone)]
struct Recording {
    inner: SoftwareRasterizer,
    rasters: Arc<Mutex<Vec<RasterImage>>>,
}

impl Rasterizer for Recording {
    fn rasterize(&self, list: DisplayList, request: &CaptureRequest) -> chatlytics_export::Result<RasterImage> {
        let raster = self.inner.rasterize(list, request)?;
        self.rasters.lock().unwrap().push(raster.clone());
        Ok(raster)
    }
}

struct Failing;

impl Rasterizer for Failing {
    fn rasterize(&self, _list: DisplayList, _request: &CaptureRequest) -> chatlytics_export::Result<RasterImage> {
        Err(Error::Capture("canvas allocation failed".into()))
    }
}

/// Triggers the abort handle while the raster is being produced.
struct AbortingRasterizer(AbortHandle);

impl Rasterizer for AbortingRasterizer {
    fn rasterize(&self, list: DisplayList, request: &CaptureRequest) -> chatlytics_export::Result<RasterImage> {
        self.0.abort();
        SoftwareRasterizer::new().rasterize(list, request)
    }
}

#[tokio::test]
async fn export_restores_layout_and_saves_one_file() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config()).with_shared_sink(sink.clone());

    let report = exporter.generate_report_on(&doc, target, "Team A", day()).await.unwrap();

    assert_eq!(report.filename, "Chatlytics_Team_A_2024-03-09.pdf");
    assert_eq!(report.states.last(), Some(&ExportState::Saved));
    assert_eq!(styles(&doc, target), before);
    assert_eq!(doc.inline_style(target, "width"), None);
    assert_eq!(doc.inline_style(target, "overflow").as_deref(), Some("hidden"));

    let saved = sink.artifacts();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].filename, report.filename);

    // the target can be exported again once released
    assert!(exporter.generate_report_on(&doc, target, "Team A", day()).await.is_ok());
    assert_eq!(sink.artifacts()[0].filename, sink.artifacts()[1].filename);
}

#[tokio::test]
async fn capture_uses_desktop_width_and_escaping_descendants() {
    let (doc, target) = load();
    let exporter = Exporter::new(config()).with_sink(MemorySink::new());
    let report = exporter.generate_report_on(&doc, target, "Overall", day()).await.unwrap();

    // 1280 px desktop layout plus 32 px padding on both sides
    assert_eq!(report.capture.width, 1280 + 64);
    // the absolutely positioned legend ends 260 px below its container
    let rect = doc.bounding_rect(target).unwrap();
    assert!(report.capture.height as f32 > rect.height + 32.0 + 40.0);
    assert_eq!(report.raster_size, (report.capture.width, report.capture.height));
}

#[tokio::test]
async fn excluded_elements_are_not_painted() {
    let (doc, target) = load();
    let recording = Recording::default();
    let exporter = Exporter::new(config())
        .with_rasterizer(recording.clone())
        .with_sink(MemorySink::new());
    exporter.generate_report_on(&doc, target, "Overall", day()).await.unwrap();

    let rasters = recording.rasters.lock().unwrap();
    let img = image::load_from_memory(&rasters[0].png_data).unwrap().to_rgb8();
    assert!(img.pixels().all(|p| p.0 != MARKER));
    assert!(img.pixels().any(|p| p.0 == [0x27, 0x27, 0x2a]));
    assert_eq!(img.get_pixel(0, 0).0, [0x09, 0x09, 0x0b]);
}

#[tokio::test]
async fn failed_capture_restores_layout_and_saves_nothing() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config())
        .with_rasterizer(Failing)
        .with_shared_sink(sink.clone());

    let err = exporter.generate_report(&doc, target, "Overall").await.unwrap_err();
    assert!(matches!(err, Error::Capture(_)));
    assert_eq!(styles(&doc, target), before);
    assert!(sink.artifacts().is_empty());
    assert!(doc.try_claim(target), "claim released after failure");
}

#[tokio::test]
async fn missing_target_fails_without_output() {
    let (doc, target) = load();
    doc.detach(target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config()).with_shared_sink(sink.clone());
    let err = exporter.generate_report(&doc, target, "Overall").await.unwrap_err();
    assert!(matches!(err, Error::MissingTarget(_)));
    assert!(sink.artifacts().is_empty());
}

#[tokio::test]
async fn unrendered_target_fails_capture_and_restores_layout() {
    let html = r#"<body><div id="d" style="display: none; width: 50%"><p>hidden</p></div></body>"#;
    let doc = Document::parse(html, phone()).unwrap();
    let target = doc.find_by_id("d").unwrap();
    let before = styles(&doc, target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config()).with_shared_sink(sink.clone());

    let err = exporter.generate_report_on(&doc, target, "x", day()).await.unwrap_err();

    assert!(matches!(err, Error::Capture(_)), "unexpected error: {err}");
    assert_eq!(styles(&doc, target), before);
    assert!(sink.artifacts().is_empty());
}

#[tokio::test]
async fn concurrent_export_of_same_target_is_rejected() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(ExportConfig {
        settle: SettleStrategy::FixedDelay,
        settle_fallback_ms: 20,
        ..config()
    })
    .with_shared_sink(sink.clone());

    let (first, second) = tokio::join!(
        exporter.generate_report_on(&doc, target, "Team A", day()),
        exporter.generate_report_on(&doc, target, "Team A", day()),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::ExportInProgress(_))));
    assert_eq!(styles(&doc, target), before);
    assert_eq!(sink.artifacts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abort_while_settling_restores_layout() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(ExportConfig {
        settle: SettleStrategy::FixedDelay,
        settle_fallback_ms: 10_000,
        ..config()
    })
    .with_shared_sink(sink.clone());
    let abort = AbortHandle::new();

    let (result, _) = tokio::join!(
        exporter.generate_report_with_abort(&doc, target, "Overall", &abort),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(doc.inline_style(target, "min-width").is_some(), "layout forced while settling");
            abort.abort();
        }
    );

    assert!(matches!(result, Err(Error::Aborted("layout settle"))));
    assert_eq!(styles(&doc, target), before);
    assert!(sink.artifacts().is_empty());
}

#[tokio::test]
async fn abort_during_rasterization_discards_the_report() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let abort = AbortHandle::new();
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config())
        .with_rasterizer(AbortingRasterizer(abort.clone()))
        .with_shared_sink(sink.clone());

    let err = exporter
        .generate_report_with_abort(&doc, target, "Overall", &abort)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Aborted("rasterization")));
    assert_eq!(styles(&doc, target), before);
    assert!(sink.artifacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_export_restores_layout() {
    let (doc, target) = load();
    let before = styles(&doc, target);
    let exporter = Exporter::new(ExportConfig {
        settle: SettleStrategy::FixedDelay,
        settle_fallback_ms: 10_000,
        ..config()
    })
    .with_sink(MemorySink::new());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(100),
        exporter.generate_report(&doc, target, "Overall"),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(styles(&doc, target), before);
    assert!(doc.try_claim(target));
}

#[tokio::test]
async fn tall_dashboard_is_split_across_a4_pages() {
    let html = r#"<body><div id="d" style="padding: 8px">
        <div style="height: 2600px; background: #27272a"></div>
        <div style="height: 2600px; background: #3f3f46"></div>
    </div></body>"#;
    let doc = Document::parse(html, phone()).unwrap();
    let target = doc.find_by_id("d").unwrap();
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(config()).with_shared_sink(sink.clone());

    let report = exporter.generate_report_on(&doc, target, "Overall", day()).await.unwrap();

    let (w, h) = report.raster_size;
    let plan = plan_pages(w, h, PageFormat::A4, &SeamOptions::default());
    let expected = (plan.scaled_height / plan.page_height).ceil() as usize;
    assert!(expected > 1);
    assert_eq!(report.pages, expected);

    let pdf = String::from_utf8_lossy(&sink.artifacts()[0].bytes).into_owned();
    let pages = pdf.matches("/Type /Page").count() - pdf.matches("/Type /Pages").count();
    assert_eq!(pages, expected);
}

#[tokio::test]
async fn very_tall_dashboard_exports_at_reduced_pixel_ratio() {
    // 9000 px at the default 2x would need an 18000 px canvas
    let html = r#"<body><div id="d" style="height: 9000px; background: #27272a"></div></body>"#;
    let doc = Document::parse(html, phone()).unwrap();
    let target = doc.find_by_id("d").unwrap();
    let sink = Arc::new(MemorySink::new());
    // default pixel ratio and canvas limit; a narrow desktop width keeps the canvas small
    let config = ExportConfig {
        desktop_width: 320,
        ..ExportConfig::default()
    };
    let limit = config.max_canvas_dimension;
    let exporter = Exporter::new(config).with_shared_sink(sink.clone());

    let report = exporter.generate_report_on(&doc, target, "Overall", day()).await.unwrap();

    let (w, h) = report.raster_size;
    assert!(w <= limit && h <= limit);
    assert!(h > 9000);
    assert!(report.pages > 1);
    assert_eq!(sink.artifacts().len(), 1);
    assert!(styles(&doc, target).get("min-width").is_none());
}

#[tokio::test]
async fn single_page_layout_yields_one_page() {
    let (doc, target) = load();
    let exporter = Exporter::new(ExportConfig {
        page_layout: PageLayout::SinglePage,
        ..config()
    })
    .with_sink(MemorySink::new());
    let report = exporter.generate_report_on(&doc, target, "Overall", day()).await.unwrap();
    assert_eq!(report.pages, 1);
}

#[tokio::test]
async fn narrow_viewport_does_not_change_the_capture() {
    let (phone_doc, phone_target) = load();
    let desktop_doc = Document::parse(DASHBOARD, Viewport { width: 1920, height: 1080 }).unwrap();
    let desktop_target = desktop_doc.query("#dashboard").unwrap().unwrap();

    let exporter = Exporter::new(config()).with_sink(MemorySink::new());
    let a = exporter.generate_report_on(&phone_doc, phone_target, "x", day()).await.unwrap();
    let b = exporter.generate_report_on(&desktop_doc, desktop_target, "x", day()).await.unwrap();
    assert_eq!(a.capture, b.capture);
}

#[test]
fn sinks_are_object_safe() {
    let sinks: Vec<Box<dyn ArtifactSink>> = vec![Box::new(MemorySink::new())];
    assert_eq!(sinks.len(), 1);
}
