//! Forces a capture target into the desktop layout and puts it back.

use crate::rendering::NodeId;
use crate::surface::Surface;
use crate::Result;

/// Inline properties the normalizer overwrites, in the order they are set.
pub const NORMALIZED_PROPERTIES: [&str; 5] = ["width", "min-width", "max-width", "max-height", "overflow"];

/// Original inline values of the normalized properties; `None` means the
/// property was not set and must be removed again on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSnapshot {
    values: Vec<(&'static str, Option<String>)>,
}

impl StyleSnapshot {
    pub fn capture<S: Surface>(surface: &S, node: NodeId) -> Self {
        Self {
            values: NORMALIZED_PROPERTIES
                .iter()
                .map(|p| (*p, surface.inline_style(node, p)))
                .collect(),
        }
    }

    pub fn get(&self, property: &str) -> Option<&Option<String>> {
        self.values.iter().find(|(p, _)| *p == property).map(|(_, v)| v)
    }

    /// Write every value back. All properties are attempted; the first error
    /// is returned.
    fn apply<S: Surface>(&self, surface: &S, node: NodeId) -> Result<()> {
        let mut first_err = None;
        for (property, value) in &self.values {
            if let Err(e) = surface.set_inline_style(node, property, value.as_deref()) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Holds a target in the forced desktop layout.
///
/// The original inline styles are restored by [`LayoutGuard::restore`] or,
/// if that is never reached (error, early return, cancelled future), when the
/// guard is dropped.
pub struct LayoutGuard<'a, S: Surface> {
    surface: &'a S,
    node: NodeId,
    snapshot: Option<StyleSnapshot>,
}

impl<'a, S: Surface> LayoutGuard<'a, S> {
    /// Snapshot the target's inline layout properties, then pin its width to
    /// `width` px with unbounded height and visible overflow.
    pub fn acquire(surface: &'a S, node: NodeId, width: u32) -> Result<Self> {
        let snapshot = StyleSnapshot::capture(surface, node);
        // Guard exists before the first mutation so a failing write still restores.
        let guard = Self { surface, node, snapshot: Some(snapshot) };

        let px = format!("{}px", width);
        for (property, value) in [
            ("width", px.as_str()),
            ("min-width", px.as_str()),
            ("max-width", px.as_str()),
            ("max-height", "none"),
            ("overflow", "visible"),
        ] {
            surface.set_inline_style(node, property, Some(value))?;
        }
        log::debug!("forced {} to {}px desktop layout", surface.describe(node), width);
        Ok(guard)
    }

    pub fn snapshot(&self) -> Option<&StyleSnapshot> {
        self.snapshot.as_ref()
    }

    /// Restore the original styles now and report failures.
    pub fn restore(mut self) -> Result<()> {
        match self.snapshot.take() {
            Some(snapshot) => snapshot.apply(self.surface, self.node),
            None => Ok(()),
        }
    }
}

impl<S: Surface> Drop for LayoutGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(e) = snapshot.apply(self.surface, self.node) {
                log::warn!("failed to restore layout of {}: {}", self.node, e);
            }
        }
    }
}
