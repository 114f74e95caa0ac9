//! Block/flex layout for the headless host

use std::collections::BTreeMap;

use super::dom::{Element, NodeId};
use super::{Color, Rect};
use crate::Viewport;

/// Horizontal advance of one character, in CSS px.
pub const CHAR_ADVANCE: f32 = 8.0;
/// Height of one wrapped text line, in CSS px.
pub const LINE_HEIGHT: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    #[default]
    Block,
    Flex,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f32),
    Percent(f32),
}

impl Length {
    fn parse(value: &str) -> Option<Length> {
        let v = value.trim();
        if let Some(pct) = v.strip_suffix('%') {
            return pct.trim().parse().ok().map(Length::Percent);
        }
        parse_px(v).map(Length::Px)
    }

    fn resolve(self, containing: f32) -> f32 {
        match self {
            Length::Px(px) => px,
            Length::Percent(pct) => containing * pct / 100.0,
        }
    }
}

/// `12px` or a bare number; `auto`, `none` and other keywords yield `None`.
fn parse_px(value: &str) -> Option<f32> {
    let v = value.trim();
    let n = v.strip_suffix("px").unwrap_or(v);
    n.trim().parse().ok()
}

/// `translate(x, y)`, `translateX(x)` or `translateY(y)`; other transforms are ignored.
fn parse_translate(value: &str) -> (f32, f32) {
    let v = value.trim();
    let args = |prefix: &str| {
        v.strip_prefix(prefix)
            .and_then(|s| s.strip_suffix(')'))
            .map(|s| s.split(',').map(|p| parse_px(p).unwrap_or(0.0)).collect::<Vec<_>>())
    };
    if let Some(a) = args("translate(") {
        return (a.first().copied().unwrap_or(0.0), a.get(1).copied().unwrap_or(0.0));
    }
    if let Some(a) = args("translateX(") {
        return (a.first().copied().unwrap_or(0.0), 0.0);
    }
    if let Some(a) = args("translateY(") {
        return (0.0, a.first().copied().unwrap_or(0.0));
    }
    (0.0, 0.0)
}

/// The subset of CSS the host understands, resolved from inline declarations.
#[derive(Debug, Clone, Default)]
pub struct ComputedStyle {
    pub display: Display,
    pub absolute: bool,
    pub width: Option<Length>,
    pub min_width: Option<Length>,
    pub max_width: Option<Length>,
    pub height: Option<f32>,
    pub max_height: Option<f32>,
    pub margin: f32,
    pub padding: f32,
    pub gap: f32,
    pub left: f32,
    pub top: f32,
    pub translate: (f32, f32),
    pub clips: bool,
    pub background: Option<Color>,
    pub color: Option<Color>,
}

impl ComputedStyle {
    pub fn from_declarations(decls: &BTreeMap<String, String>) -> Self {
        let get = |k: &str| decls.get(k).map(String::as_str);
        let px = |k: &str| get(k).and_then(parse_px);
        Self {
            display: match get("display") {
                Some("none") => Display::None,
                Some("flex") => Display::Flex,
                _ => Display::Block,
            },
            absolute: matches!(get("position"), Some("absolute") | Some("fixed")),
            width: get("width").and_then(Length::parse),
            min_width: get("min-width").and_then(Length::parse),
            max_width: get("max-width").and_then(Length::parse),
            height: px("height"),
            max_height: px("max-height"),
            margin: px("margin").unwrap_or(0.0),
            padding: px("padding").unwrap_or(0.0),
            gap: px("gap").unwrap_or(0.0),
            left: px("left").unwrap_or(0.0),
            top: px("top").unwrap_or(0.0),
            translate: get("transform").map(parse_translate).unwrap_or((0.0, 0.0)),
            clips: matches!(get("overflow"), Some("hidden") | Some("clip") | Some("auto") | Some("scroll")),
            background: get("background")
                .or_else(|| get("background-color"))
                .and_then(Color::parse),
            color: get("color").and_then(Color::parse),
        }
    }
}

/// Geometry and paint data of one laid-out element.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    /// Border box, including accumulated transforms
    pub rect: Rect,
    /// Top-left of the first text line
    pub text_origin: (f32, f32),
    pub lines: Vec<String>,
    pub background: Option<Color>,
    pub color: Color,
    /// `overflow` other than `visible`: descendants are clipped to `rect`
    pub clips_children: bool,
}

/// Layout boxes indexed by node; `None` for elements that are not rendered.
#[derive(Debug, Clone, Default)]
pub struct LayoutResult {
    boxes: Vec<Option<LayoutBox>>,
}

impl LayoutResult {
    pub fn get(&self, node: NodeId) -> Option<&LayoutBox> {
        self.boxes.get(node.index()).and_then(Option::as_ref)
    }
}

/// Wrap text at `width` using the fixed character advance.
pub fn wrap_text(text: &str, width: f32) -> Vec<String> {
    let chars_per_line = ((width / CHAR_ADVANCE) as usize).max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if cur.chars().count() + word.chars().count() + 1 > chars_per_line && !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

struct LayoutCtx<'a> {
    elements: &'a [Element],
    styles: Vec<ComputedStyle>,
    boxes: Vec<Option<LayoutBox>>,
}

/// Lay out the subtree rooted at `root` into `viewport`.
/// - Blocks stack vertically, flex containers share their width equally
/// - Absolute children are placed at `left`/`top` from their parent and leave the flow
/// - Transforms shift painting and bounding rects but never the flow
pub(crate) fn layout_document(elements: &[Element], root: NodeId, viewport: Viewport) -> LayoutResult {
    let mut ctx = LayoutCtx {
        elements,
        styles: elements
            .iter()
            .map(|e| ComputedStyle::from_declarations(&e.style))
            .collect(),
        boxes: vec![None; elements.len()],
    };
    ctx.layout_node(root, 0.0, 0.0, viewport.width as f32, (0.0, 0.0), Color::BLACK);
    LayoutResult { boxes: ctx.boxes }
}

impl LayoutCtx<'_> {
    /// Returns the vertical space the node consumes in its parent's flow.
    fn layout_node(
        &mut self,
        id: NodeId,
        x: f32,
        y: f32,
        avail: f32,
        translate: (f32, f32),
        inherited_color: Color,
    ) -> f32 {
        let style = self.styles[id.index()].clone();
        if style.display == Display::None {
            return 0.0;
        }

        let m = style.margin;
        let mut width = match style.width {
            Some(w) => w.resolve(avail),
            None => (avail - 2.0 * m).max(0.0),
        };
        if let Some(max) = style.max_width {
            width = width.min(max.resolve(avail));
        }
        // min-width wins over max-width, as in CSS
        if let Some(min) = style.min_width {
            width = width.max(min.resolve(avail));
        }

        let (bx, by) = (x + m, y + m);
        let p = style.padding;
        let content_w = (width - 2.0 * p).max(0.0);
        let acc = (translate.0 + style.translate.0, translate.1 + style.translate.1);
        let color = style.color.unwrap_or(inherited_color);

        let lines = wrap_text(&self.elements[id.index()].text, content_w);
        let mut cursor = by + p + lines.len() as f32 * LINE_HEIGHT;

        let children = self.elements[id.index()].children.clone();
        let (flow, absolute): (Vec<NodeId>, Vec<NodeId>) = children
            .into_iter()
            .partition(|c| !self.styles[c.index()].absolute);

        if style.display == Display::Flex && !flow.is_empty() {
            let n = flow.len() as f32;
            let share = ((content_w - style.gap * (n - 1.0)) / n).max(0.0);
            let mut row_height = 0.0f32;
            for (i, child) in flow.iter().enumerate() {
                let cx = bx + p + i as f32 * (share + style.gap);
                let h = self.layout_node(*child, cx, cursor, share, acc, color);
                row_height = row_height.max(h);
            }
            cursor += row_height;
        } else {
            for child in &flow {
                cursor += self.layout_node(*child, bx + p, cursor, content_w, acc, color);
            }
        }

        for child in &absolute {
            let cs = &self.styles[child.index()];
            let (cx, cy) = (bx + cs.left, by + cs.top);
            self.layout_node(*child, cx, cy, content_w, acc, color);
        }

        let mut height = style.height.unwrap_or(cursor + p - by);
        if let Some(max) = style.max_height {
            height = height.min(max);
        }

        self.boxes[id.index()] = Some(LayoutBox {
            rect: Rect::new(bx + acc.0, by + acc.1, width, height),
            text_origin: (bx + p + acc.0, by + p + acc.1),
            lines,
            background: style.background,
            color,
            clips_children: style.clips,
        });

        if style.absolute {
            0.0
        } else {
            height + 2.0 * m
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::Document;

    fn laid_out(html: &str, width: u32) -> (Document, LayoutResult) {
        let doc = Document::parse(html, Viewport { width, height: 800 }).expect("parse");
        let layout = doc.layout_snapshot();
        (doc, layout)
    }

    #[test]
    fn blocks_stack_vertically() {
        let (doc, layout) = laid_out(
            r#"<body><div id="a" style="height: 40px"></div><div id="b" style="height: 10px; margin: 5px"></div></body>"#,
            300,
        );
        let a = layout.get(doc.find_by_id("a").unwrap()).unwrap();
        let b = layout.get(doc.find_by_id("b").unwrap()).unwrap();
        assert_eq!(a.rect, Rect::new(0.0, 0.0, 300.0, 40.0));
        assert_eq!(b.rect, Rect::new(5.0, 45.0, 290.0, 10.0));
    }

    #[test]
    fn min_width_overrides_max_width() {
        let (doc, layout) = laid_out(
            r#"<body><div id="a" style="width: 50%; max-width: 100px; min-width: 400px"></div></body>"#,
            300,
        );
        let a = layout.get(doc.find_by_id("a").unwrap()).unwrap();
        assert_eq!(a.rect.width, 400.0);
    }

    #[test]
    fn narrower_viewport_wraps_into_taller_text() {
        let html = r#"<body><p id="p">one two three four five six seven eight nine ten</p></body>"#;
        let (doc_wide, wide) = laid_out(html, 1280);
        let (doc_narrow, narrow) = laid_out(html, 80);
        let w = wide.get(doc_wide.find_by_id("p").unwrap()).unwrap();
        let n = narrow.get(doc_narrow.find_by_id("p").unwrap()).unwrap();
        assert_eq!(w.lines.len(), 1);
        assert!(n.rect.height > w.rect.height);
    }

    #[test]
    fn flex_children_share_the_row() {
        let (doc, layout) = laid_out(
            r#"<body><div style="display: flex; gap: 20px"><div id="l" style="height: 30px"></div><div id="r" style="height: 50px"></div></div><div id="after" style="height: 1px"></div></body>"#,
            220,
        );
        let l = layout.get(doc.find_by_id("l").unwrap()).unwrap();
        let r = layout.get(doc.find_by_id("r").unwrap()).unwrap();
        let after = layout.get(doc.find_by_id("after").unwrap()).unwrap();
        assert_eq!(l.rect.width, 100.0);
        assert_eq!(r.rect.x, 120.0);
        assert_eq!(after.rect.y, 50.0);
    }

    #[test]
    fn transforms_and_absolute_leave_the_flow() {
        let (doc, layout) = laid_out(
            r#"<body><div id="t" style="height: 10px; transform: translate(5px, 300px)"><span id="c" style="height: 4px"></span></div><div id="abs" style="position: absolute; left: 10px; top: 500px; height: 20px; width: 20px"></div><div id="n" style="height: 1px"></div></body>"#,
            100,
        );
        let t = layout.get(doc.find_by_id("t").unwrap()).unwrap();
        let c = layout.get(doc.find_by_id("c").unwrap()).unwrap();
        let abs = layout.get(doc.find_by_id("abs").unwrap()).unwrap();
        let n = layout.get(doc.find_by_id("n").unwrap()).unwrap();
        assert_eq!(t.rect.y, 300.0);
        assert_eq!(c.rect.y, 300.0);
        assert_eq!(abs.rect, Rect::new(10.0, 500.0, 20.0, 20.0));
        assert_eq!(n.rect.y, 10.0);
    }

    #[test]
    fn translate_parsing() {
        assert_eq!(parse_translate("translate(3px, -4px)"), (3.0, -4.0));
        assert_eq!(parse_translate("translateY(12px)"), (0.0, 12.0));
        assert_eq!(parse_translate("translateZ(0)"), (0.0, 0.0));
    }
}
