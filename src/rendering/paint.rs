//! Display list built from a laid-out subtree

use super::dom::{Element, ElementInfo, NodeId};
use super::layout::LayoutResult;
use super::{Color, Rect};

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        rect: Rect,
        color: Color,
        clip: Option<Rect>,
    },
    /// Wrapped text starting at `(x, y)`, one entry per line
    TextRun {
        x: f32,
        y: f32,
        lines: Vec<String>,
        color: Color,
        clip: Option<Rect>,
    },
}

/// Paint commands in page coordinates, in painting order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub commands: Vec<PaintCommand>,
}

impl DisplayList {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

/// Walk the subtree at `root` in paint order. Elements for which `exclude`
/// returns true are skipped together with their descendants.
pub(crate) fn build_display_list(
    elements: &[Element],
    layout: &LayoutResult,
    root: NodeId,
    exclude: &dyn Fn(&ElementInfo) -> bool,
) -> DisplayList {
    let mut list = DisplayList::default();
    let mut stack: Vec<(NodeId, Option<Rect>)> = vec![(root, None)];
    while let Some((id, clip)) = stack.pop() {
        let element = &elements[id.index()];
        if exclude(&element.info) {
            continue;
        }
        let Some(b) = layout.get(id) else { continue };

        if let Some(color) = b.background {
            list.commands.push(PaintCommand::SolidRect { rect: b.rect, color, clip });
        }
        if !b.lines.is_empty() {
            list.commands.push(PaintCommand::TextRun {
                x: b.text_origin.0,
                y: b.text_origin.1,
                lines: b.lines.clone(),
                color: b.color,
                clip,
            });
        }

        let child_clip = if b.clips_children {
            match clip {
                Some(c) => Some(c.intersect(&b.rect).unwrap_or(Rect::new(b.rect.x, b.rect.y, 0.0, 0.0))),
                None => Some(b.rect),
            }
        } else {
            clip
        };
        for child in element.children.iter().rev() {
            stack.push((*child, child_clip));
        }
    }
    list
}
