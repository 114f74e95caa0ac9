//! Slicing one tall raster across fixed-size PDF pages.

use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect as PdfRect, Ref, TextStr};
use serde::{Deserialize, Serialize};

use crate::rendering::{Color, RasterImage};
use crate::{Error, Result};

/// CSS px → PDF points.
pub const PX_TO_PT: f32 = 0.75;
/// Largest page edge PDF viewers accept, in points.
pub const MAX_PAGE_EDGE_PT: f32 = 14_400.0;

/// Output page format.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
    Custom { width_pt: f32, height_pt: f32 },
}

impl PageFormat {
    /// `(width, height)` in points, portrait.
    pub fn size_pt(self) -> (f32, f32) {
        match self {
            PageFormat::A4 => (595.28, 841.89),
            PageFormat::Letter => (612.0, 792.0),
            PageFormat::Custom { width_pt, height_pt } => (width_pt, height_pt),
        }
    }
}

/// Fixed-format pages, or one page sized to the whole image for viewers
/// that handle tall pages better than many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageLayout {
    #[default]
    Paginated,
    SinglePage,
}

/// Seam avoidance between consecutive slices.
///
/// Flooring the scale keeps the scaled image from rounding past the page
/// edge; a non-zero bleed overlaps consecutive slices so sub-pixel rounding
/// duplicates a sliver of content instead of exposing a background hairline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeamOptions {
    /// Overlap between consecutive slices, in points
    pub pixel_bleed: f32,
    /// Decimal places the scale factor is floored to
    pub scale_precision: u32,
}

impl Default for SeamOptions {
    fn default() -> Self {
        Self {
            pixel_bleed: 0.0,
            scale_precision: 3,
        }
    }
}

/// Where each page's slice starts within the scaled image.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub page_width: f32,
    pub page_height: f32,
    /// Points per image pixel
    pub scale: f32,
    pub scaled_width: f32,
    pub scaled_height: f32,
    /// Vertical offset of each page's slice, top-down, in points
    pub offsets: Vec<f32>,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.offsets.len()
    }
}

/// Decoded RGB pixels, ready to embed.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub rgb: Vec<u8>,
}

/// Decode the raster so it can be measured and embedded.
pub fn decode_raster(raster: &RasterImage) -> Result<DecodedImage> {
    let img = image::load_from_memory_with_format(&raster.png_data, image::ImageFormat::Png)
        .map_err(|e| Error::ImageDecode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::ImageDecode("image has no pixels".into()));
    }
    Ok(DecodedImage {
        width,
        height,
        pixel_ratio: raster.pixel_ratio,
        rgb: rgb.into_raw(),
    })
}

fn floor_to(value: f32, precision: u32) -> f32 {
    let factor = 10f64.powi(precision as i32);
    let floored = ((value as f64 * factor).floor() / factor) as f32;
    // A scale that floors to zero would blank every page.
    if floored > 0.0 {
        floored
    } else {
        value
    }
}

/// Absorbs float noise (in points) so an image exactly N pages tall yields N pages.
const PAGE_EPSILON: f32 = 1e-3;

/// Fit the image to the page width and cut it into page-height slices.
pub fn plan_pages(image_width: u32, image_height: u32, format: PageFormat, seams: &SeamOptions) -> PagePlan {
    let (page_width, page_height) = format.size_pt();
    let scale = floor_to(page_width / image_width.max(1) as f32, seams.scale_precision);
    let scaled_height = image_height as f32 * scale;

    let stride = (page_height - seams.pixel_bleed.max(0.0)).max(1.0);
    let pages = if scaled_height <= page_height + PAGE_EPSILON {
        1
    } else {
        1 + ((scaled_height - page_height - PAGE_EPSILON) / stride).ceil().max(1.0) as usize
    };

    PagePlan {
        page_width,
        page_height,
        scale,
        scaled_width: image_width as f32 * scale,
        scaled_height,
        offsets: (0..pages).map(|i| i as f32 * stride).collect(),
    }
}

/// One page the size of the whole image (CSS px at 0.75 pt), uniformly
/// reduced if either edge would exceed the PDF page-size limit.
pub fn plan_single_page(image_width: u32, image_height: u32, pixel_ratio: f32) -> PagePlan {
    let mut scale = PX_TO_PT / pixel_ratio.max(f32::EPSILON);
    let longest = image_width.max(image_height).max(1) as f32 * scale;
    if longest > MAX_PAGE_EDGE_PT {
        log::warn!(
            "single page of {:.0}pt exceeds {}pt, scaling down",
            longest,
            MAX_PAGE_EDGE_PT
        );
        scale *= MAX_PAGE_EDGE_PT / longest;
    }
    let (w, h) = (image_width as f32 * scale, image_height as f32 * scale);
    PagePlan {
        page_width: w,
        page_height: h,
        scale,
        scaled_width: w,
        scaled_height: h,
        offsets: vec![0.0],
    }
}

/// Write the PDF: the image is embedded once, and every page paints an
/// opaque background followed by the whole image shifted up by its offset.
pub fn assemble_pdf(image: &DecodedImage, plan: &PagePlan, background: Color, title: &str) -> Result<Vec<u8>> {
    let expected = image.width as usize * image.height as usize * 3;
    if image.rgb.len() != expected {
        return Err(Error::Pdf(format!(
            "pixel buffer holds {} bytes, expected {}",
            image.rgb.len(),
            expected
        )));
    }
    if plan.offsets.is_empty() {
        return Err(Error::Pdf("page plan has no pages".into()));
    }

    let mut pdf = Pdf::new();
    let mut next_id = 1i32;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };

    let catalog_id = alloc();
    let pages_id = alloc();
    let info_id = alloc();
    let image_id = alloc();
    let image_name = Name(b"Im1");

    let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&image.rgb, 6);
    let mut xobj = pdf.image_xobject(image_id, &compressed);
    xobj.filter(Filter::FlateDecode);
    xobj.width(image.width as i32);
    xobj.height(image.height as i32);
    xobj.color_space().device_rgb();
    xobj.bits_per_component(8);
    xobj.finish();

    let (r, g, b) = background.to_unit_rgb();
    let mut page_ids = Vec::with_capacity(plan.offsets.len());
    for offset in &plan.offsets {
        let page_id = alloc();
        let content_id = alloc();
        page_ids.push(page_id);

        let mut content = Content::new();
        content.set_fill_rgb(r, g, b);
        content.rect(0.0, 0.0, plan.page_width, plan.page_height);
        content.fill_nonzero();
        // PDF origin is bottom-left: place the image top at page top + offset.
        content.save_state();
        content.transform([
            plan.scaled_width,
            0.0,
            0.0,
            plan.scaled_height,
            0.0,
            plan.page_height + offset - plan.scaled_height,
        ]);
        content.x_object(image_name);
        content.restore_state();

        let raw = content.finish();
        let stream = miniz_oxide::deflate::compress_to_vec_zlib(&raw, 6);
        pdf.stream(content_id, &stream).filter(Filter::FlateDecode);

        let mut page = pdf.page(page_id);
        page.media_box(PdfRect::new(0.0, 0.0, plan.page_width, plan.page_height))
            .parent(pages_id)
            .contents(content_id);
        page.resources().x_objects().pair(image_name, image_id);
        page.finish();
    }

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);
    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr(concat!("chatlytics-export ", env!("CARGO_PKG_VERSION"))));

    log::debug!(
        "assembled {} page(s) from {}x{} image, scale {}",
        plan.offsets.len(),
        image.width,
        image.height,
        plan.scale
    );
    Ok(pdf.finish())
}
