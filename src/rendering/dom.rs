//! In-memory display tree backed by `scraper`, implementing [`Surface`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use scraper::{ElementRef, Html, Node, Selector};

use super::layout::{layout_document, LayoutResult};
use super::paint::{build_display_list, DisplayList};
use super::Rect;
use crate::surface::Surface;
use crate::{Error, Result, Viewport};

/// Handle to an element of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identity of an element as seen by exclusion predicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl ElementInfo {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

impl fmt::Display for ElementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if let Some(id) = &self.id {
            write!(f, " id=\"{}\"", id)?;
        }
        if !self.classes.is_empty() {
            write!(f, " class=\"{}\"", self.classes.join(" "))?;
        }
        write!(f, ">")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) info: ElementInfo,
    /// Inline declarations, property name → value
    pub(crate) style: BTreeMap<String, String>,
    /// Direct text content
    pub(crate) text: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

struct DomState {
    elements: Vec<Element>,
    root: NodeId,
    viewport: Viewport,
    /// `None` while inline style changes are pending a reflow
    layout: Option<LayoutResult>,
    frame: u64,
    claimed: HashSet<NodeId>,
}

impl DomState {
    fn layout(&mut self) -> &LayoutResult {
        if self.layout.is_none() {
            self.layout = Some(layout_document(&self.elements, self.root, self.viewport));
            self.frame += 1;
        }
        self.layout.get_or_insert_with(LayoutResult::default)
    }

    /// Levels below the root, or `None` once detached.
    fn depth(&self, node: NodeId) -> Option<usize> {
        let mut depth = 0;
        let mut cur = node;
        while cur != self.root {
            cur = self.elements.get(cur.index()).and_then(|e| e.parent)?;
            depth += 1;
        }
        Some(depth)
    }

    fn attached(&self, node: NodeId) -> bool {
        self.depth(node).is_some()
    }
}

/// A parsed HTML document laid out into a fixed viewport.
///
/// Only the `<body>` subtree is kept; `<head>`, `<script>` and `<style>`
/// elements are skipped. Inline `style` attributes are the only source of
/// style, see [`ComputedStyle`](super::layout::ComputedStyle) for the
/// supported properties.
pub struct Document {
    source: String,
    /// Element position in the source's document order → node
    by_source: HashMap<usize, NodeId>,
    state: Mutex<DomState>,
}

fn parse_declarations(style: &str) -> BTreeMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let (k, v) = (k.trim().to_ascii_lowercase(), v.trim().to_string());
            (!k.is_empty()).then_some((k, v))
        })
        .collect()
}

/// Element id → position in document order, for mapping selector matches
/// back onto the body tree.
macro_rules! source_order {
    ($parsed:expr) => {
        $parsed
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .enumerate()
            .map(|(i, el)| (el.id(), i))
            .collect()
    };
}

const SKIPPED_TAGS: [&str; 4] = ["head", "script", "style", "template"];

/// Deepest element nesting below `<body>` that a document may hold.
///
/// Layout recurses once per level.
pub const MAX_DEPTH: usize = 512;

fn too_deep() -> Error {
    Error::Html(format!("element nesting exceeds {} levels", MAX_DEPTH))
}

impl Document {
    pub fn parse(html: &str, viewport: Viewport) -> Result<Self> {
        let parsed = Html::parse_document(html);
        let body_sel = Selector::parse("body").map_err(|e| Error::Html(format!("{:?}", e)))?;
        let body = parsed
            .select(&body_sel)
            .next()
            .ok_or_else(|| Error::Html("document has no <body>".into()))?;

        let order: HashMap<_, usize> = source_order!(parsed);
        let mut elements = Vec::new();
        let mut by_source = HashMap::new();

        // Depth-first, pushing children in reverse so document order is preserved.
        let mut stack: Vec<(ElementRef, Option<NodeId>, usize)> = vec![(body, None, 0)];
        while let Some((el, parent, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                return Err(too_deep());
            }
            let v = el.value();
            let id = NodeId(elements.len());
            let text = el
                .children()
                .filter_map(|c| match c.value() {
                    Node::Text(t) => Some(String::from(&**t)),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            elements.push(Element {
                info: ElementInfo {
                    tag: v.name().to_string(),
                    id: v.attr("id").map(str::to_string),
                    classes: v.classes().map(str::to_string).collect(),
                },
                style: v.attr("style").map(parse_declarations).unwrap_or_default(),
                text,
                parent,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                elements[p.index()].children.push(id);
            }
            if let Some(idx) = order.get(&el.id()) {
                by_source.insert(*idx, id);
            }

            let kids: Vec<_> = el
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|k| !SKIPPED_TAGS.contains(&k.value().name()))
                .collect();
            for kid in kids.into_iter().rev() {
                stack.push((kid, Some(id), depth + 1));
            }
        }

        Ok(Self {
            source: html.to_string(),
            by_source,
            state: Mutex::new(DomState {
                elements,
                root: NodeId(0),
                viewport,
                layout: None,
                frame: 0,
                claimed: HashSet::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, DomState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The `<body>` element.
    pub fn root(&self) -> NodeId {
        self.state().root
    }

    /// First element matching a CSS selector, if it is part of the body tree.
    pub fn query(&self, selector: &str) -> Result<Option<NodeId>> {
        let sel = Selector::parse(selector)
            .map_err(|e| Error::Html(format!("invalid selector '{}': {:?}", selector, e)))?;
        let parsed = Html::parse_document(&self.source);
        let order: HashMap<_, usize> = source_order!(parsed);
        let state = self.state();
        Ok(parsed
            .select(&sel)
            .filter_map(|el| order.get(&el.id()))
            .filter_map(|idx| self.by_source.get(idx).copied())
            .find(|node| state.attached(*node)))
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.state();
        state
            .elements
            .iter()
            .position(|e| e.info.id.as_deref() == Some(id))
            .map(NodeId)
            .filter(|n| state.attached(*n))
    }

    /// Resize the viewport, as a viewer resizing their window would.
    pub fn set_viewport(&self, viewport: Viewport) {
        let mut state = self.state();
        state.viewport = viewport;
        state.layout = None;
    }

    /// Append a new element under `parent`; `style` uses inline declaration syntax.
    pub fn append_element(&self, parent: NodeId, tag: &str, classes: &[&str], style: &str) -> Result<NodeId> {
        let mut state = self.state();
        match state.depth(parent) {
            None => return Err(Error::MissingTarget(parent.to_string())),
            Some(depth) if depth >= MAX_DEPTH => return Err(too_deep()),
            Some(_) => {}
        }
        let id = NodeId(state.elements.len());
        state.elements.push(Element {
            info: ElementInfo {
                tag: tag.to_string(),
                id: None,
                classes: classes.iter().map(|c| c.to_string()).collect(),
            },
            style: parse_declarations(style),
            text: String::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        state.elements[parent.index()].children.push(id);
        state.layout = None;
        Ok(id)
    }

    /// Remove `node` (and its subtree) from the tree.
    pub fn detach(&self, node: NodeId) {
        let mut state = self.state();
        let parent = state.elements.get_mut(node.index()).and_then(|e| e.parent.take());
        if let Some(p) = parent {
            state.elements[p.index()].children.retain(|c| *c != node);
            state.layout = None;
        }
    }

    /// Inline declarations of `node`, for inspection.
    pub fn inline_declarations(&self, node: NodeId) -> BTreeMap<String, String> {
        self.state()
            .elements
            .get(node.index())
            .map(|e| e.style.clone())
            .unwrap_or_default()
    }

    /// Number of layout passes performed so far.
    pub fn frame_count(&self) -> u64 {
        self.state().frame
    }

    /// Current layout, reflowing first if styles changed.
    pub fn layout_snapshot(&self) -> LayoutResult {
        self.state().layout().clone()
    }
}

impl Surface for Document {
    fn contains(&self, node: NodeId) -> bool {
        self.state().attached(node)
    }

    fn element(&self, node: NodeId) -> Option<ElementInfo> {
        self.state().elements.get(node.index()).map(|e| e.info.clone())
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state()
            .elements
            .get(node.index())
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
        self.state()
            .elements
            .get(node.index())
            .and_then(|e| e.style.get(property).cloned())
    }

    fn set_inline_style(&self, node: NodeId, property: &str, value: Option<&str>) -> Result<()> {
        let mut state = self.state();
        let el = state
            .elements
            .get_mut(node.index())
            .ok_or_else(|| Error::MissingTarget(node.to_string()))?;
        match value {
            Some(v) => el.style.insert(property.to_string(), v.to_string()),
            None => el.style.remove(property),
        };
        state.layout = None;
        Ok(())
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        let mut state = self.state();
        if !state.attached(node) {
            return None;
        }
        state.layout().get(node).map(|b| b.rect)
    }

    fn display_list(&self, node: NodeId, exclude: &dyn Fn(&ElementInfo) -> bool) -> Result<DisplayList> {
        let mut state = self.state();
        if !state.attached(node) {
            return Err(Error::Capture(format!("{} is no longer attached", node)));
        }
        state.layout();
        let DomState { elements, layout, .. } = &*state;
        let layout = layout
            .as_ref()
            .ok_or_else(|| Error::Capture("layout unavailable".into()))?;
        Ok(build_display_list(elements, layout, node, exclude))
    }

    fn next_frame(&self) -> impl Future<Output = bool> + Send {
        async move {
            self.state().layout();
            tokio::task::yield_now().await;
            true
        }
    }

    fn try_claim(&self, node: NodeId) -> bool {
        self.state().claimed.insert(node)
    }

    fn release_claim(&self, node: NodeId) {
        self.state().claimed.remove(&node);
    }
}
