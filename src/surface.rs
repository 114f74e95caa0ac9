//! The seam between the export pipeline and whatever hosts the display tree.

use std::future::Future;

use crate::rendering::{DisplayList, ElementInfo, NodeId, Rect};
use crate::Result;

/// A host that lays out and paints a tree of elements.
///
/// [`Document`](crate::rendering::Document) is the built-in headless host;
/// other hosts (a real browser bridge, a test double) implement this trait to
/// reuse the export pipeline.
pub trait Surface: Send + Sync {
    /// Whether `node` is currently attached to the rendered tree
    fn contains(&self, node: NodeId) -> bool;

    fn element(&self, node: NodeId) -> Option<ElementInfo>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Inline value of a style property, `None` if it is not set
    fn inline_style(&self, node: NodeId, property: &str) -> Option<String>;

    /// Set (`Some`) or remove (`None`) an inline style property
    fn set_inline_style(&self, node: NodeId, property: &str, value: Option<&str>) -> Result<()>;

    /// On-screen border box after layout and transforms, `None` when the
    /// node is not rendered
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;

    /// Paint commands for the subtree at `node`, skipping every element for
    /// which `exclude` returns true along with its descendants
    fn display_list(&self, node: NodeId, exclude: &dyn Fn(&ElementInfo) -> bool) -> Result<DisplayList>;

    /// Resolve once pending style changes have been laid out and painted.
    /// Resolves to `false` when the host has no such signal.
    fn next_frame(&self) -> impl Future<Output = bool> + Send {
        async { false }
    }

    /// Mark `node` as being exported; false if it already is
    fn try_claim(&self, node: NodeId) -> bool;

    fn release_claim(&self, node: NodeId);

    /// Human-readable name of `node` for errors and logs
    fn describe(&self, node: NodeId) -> String {
        match self.element(node) {
            Some(info) => format!("{} {}", node, info),
            None => node.to_string(),
        }
    }
}
