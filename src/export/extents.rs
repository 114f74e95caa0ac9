//! True rendered extents of a capture target.
//!
//! Scroll dimensions under-report content that escapes normal flow (absolute
//! or transformed descendants, chart legends drawn outside their box), so
//! the extents are taken from the bounding rect of every descendant.

use crate::rendering::NodeId;
use crate::surface::Surface;
use crate::{Error, Result};

/// Furthest right and bottom edges of a subtree, relative to the root's
/// top-left corner, in CSS px.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingExtents {
    pub max_right: f32,
    pub max_bottom: f32,
}

/// Capture region in CSS px, padding and safety buffer included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

/// Walk `root` and all of its descendants and take the maximum edges.
/// Unrendered descendants (`display: none`) are skipped. A root that is not
/// rendered fails the capture.
pub fn scan_extents<S: Surface>(surface: &S, root: NodeId) -> Result<BoundingExtents> {
    let root_rect = surface
        .bounding_rect(root)
        .ok_or_else(|| Error::Capture(format!("{} is not rendered", surface.describe(root))))?;

    let mut extents = BoundingExtents {
        max_right: root_rect.width.max(0.0),
        max_bottom: root_rect.height.max(0.0),
    };
    let mut stack = surface.children(root);
    while let Some(node) = stack.pop() {
        let Some(rect) = surface.bounding_rect(node) else { continue };
        extents.max_right = extents.max_right.max(rect.right() - root_rect.x);
        extents.max_bottom = extents.max_bottom.max(rect.bottom() - root_rect.y);
        stack.extend(surface.children(node));
    }
    Ok(extents)
}

/// Add `padding` on both sides horizontally, and `padding` plus the safety
/// `buffer` vertically. Both edges are at least 1 px.
pub fn capture_size(extents: BoundingExtents, padding: f32, buffer: f32) -> CaptureSize {
    let width = (extents.max_right + padding * 2.0).ceil().max(1.0);
    let height = (extents.max_bottom + padding + buffer).ceil().max(1.0);
    CaptureSize {
        width: width as u32,
        height: height as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::Document;
    use crate::Viewport;

    fn doc(html: &str) -> Document {
        Document::parse(html, Viewport { width: 1200, height: 800 }).unwrap()
    }

    #[test]
    fn capture_size_adds_padding_and_buffer() {
        let size = capture_size(BoundingExtents { max_right: 1200.0, max_bottom: 900.0 }, 24.0, 20.0);
        assert_eq!(size, CaptureSize { width: 1248, height: 944 });
    }

    #[test]
    fn capture_size_rounds_sub_pixel_edges_up() {
        let size = capture_size(BoundingExtents { max_right: 100.2, max_bottom: 10.01 }, 0.0, 0.0);
        assert_eq!(size, CaptureSize { width: 101, height: 11 });
    }

    #[test]
    fn escaping_descendants_extend_the_extents() {
        let d = doc(
            r#"<body><div id="r" style="height: 100px"><div style="height: 10px; transform: translate(0px, 250px)"></div><div style="position: absolute; left: 1300px; top: 5px; width: 40px; height: 5px"></div></div></body>"#,
        );
        let r = d.find_by_id("r").unwrap();
        let ext = scan_extents(&d, r).unwrap();
        assert_eq!(ext.max_bottom, 260.0);
        assert_eq!(ext.max_right, 1340.0);
    }

    #[test]
    fn hidden_descendants_are_ignored() {
        let d = doc(r#"<body><div id="r" style="height: 50px"><div style="display: none; height: 900px"></div></div></body>"#);
        let r = d.find_by_id("r").unwrap();
        let ext = scan_extents(&d, r).unwrap();
        assert_eq!(ext, BoundingExtents { max_right: 1200.0, max_bottom: 50.0 });
    }

    #[test]
    fn childless_root_has_positive_capture() {
        let d = doc(r#"<body><div id="r" style="width: 0px; height: 0px"></div></body>"#);
        let r = d.find_by_id("r").unwrap();
        let ext = scan_extents(&d, r).unwrap();
        assert_eq!(ext, BoundingExtents::default());
        let size = capture_size(ext, 0.0, 0.0);
        assert_eq!(size, CaptureSize { width: 1, height: 1 });
        let padded = capture_size(ext, 24.0, 20.0);
        assert!(padded.width > 0 && padded.height > 0);
    }

    #[test]
    fn unrendered_root_is_a_capture_error() {
        let d = doc(r#"<body><div id="r" style="height: 10px"><p>x</p></div></body>"#);
        let r = d.find_by_id("r").unwrap();
        d.detach(r);
        assert!(matches!(scan_extents(&d, r), Err(Error::Capture(_))));

        let d = doc(r#"<body><div id="r" style="display: none"></div></body>"#);
        let r = d.find_by_id("r").unwrap();
        assert!(matches!(scan_extents(&d, r), Err(Error::Capture(_))));
    }
}
