//! Table-of-contents generation from page headings.
//!
//! Three steps, run once per page load:
//!
//! 1. [`collect_headings`] walks the content root and yields `h2`–`h6`
//!    elements in document order.
//! 2. [`build_toc`] nests them with an explicit level stack.
//! 3. [`install_toc`] renders the forest as nested `<ul>` markup and replaces
//!    the container's content, or hides the container when the page has no
//!    headings.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PageConfig;
use crate::dom::{escape_attr, Document, NodeId};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A heading element read from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    /// Heading level (2–6).
    pub level: u8,
    /// Value of the element's `id` attribute; empty when absent.
    pub id: String,
    /// The element's inner HTML, passed through verbatim.
    pub label: String,
}

/// One entry of the generated table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub level: u8,
    /// Link target, `#` followed by the heading id.
    pub anchor: String,
    pub label: String,
    /// Deeper headings that follow this one, up to the next heading at or
    /// above this level. Never contains an empty list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocNode>,
}

impl From<HeadingEntry> for TocNode {
    fn from(heading: HeadingEntry) -> Self {
        TocNode {
            level: heading.level,
            anchor: format!("#{}", heading.id),
            label: heading.label,
            children: Vec::new(),
        }
    }
}

/// What [`install_toc`] did to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocOutcome {
    /// The page has no TOC container; nothing was touched.
    NoContainer,
    /// The page has no headings; the container was hidden.
    Hidden,
    /// The container now holds a TOC with this many entries.
    Installed { items: usize },
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Heading level for a tag name, restricted to `h2`..=`h6`.
pub fn heading_level(tag: &str) -> Option<u8> {
    match tag.as_bytes() {
        [b'h' | b'H', d @ b'2'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

/// Lazily yield the `h2`–`h6` elements below `content_root` in document order.
pub fn collect_headings(
    doc: &Document,
    content_root: NodeId,
) -> impl Iterator<Item = HeadingEntry> + '_ {
    doc.descendants(content_root).filter_map(move |id| {
        let level = heading_level(doc.tag_name(id)?)?;
        Some(HeadingEntry {
            level,
            id: doc.attr(id, "id").unwrap_or_default().to_owned(),
            label: doc.inner_html(id),
        })
    })
}

// ---------------------------------------------------------------------------
// Hierarchy builder
// ---------------------------------------------------------------------------

/// Nest a document-order heading sequence into a TOC forest.
///
/// The stack holds the chain of open entries, outermost first. A heading
/// closes every open entry at its own level or deeper, then becomes the child
/// of whatever remains on top (or a new top-level entry). A heading deeper
/// than the top opens exactly one new level regardless of how many levels it
/// skips, so `h2` followed by `h5` nests the `h5` directly under the `h2`.
pub fn build_toc<I>(headings: I) -> Vec<TocNode>
where
    I: IntoIterator<Item = HeadingEntry>,
{
    let mut forest = Vec::new();
    let mut stack: Vec<TocNode> = Vec::new();

    for heading in headings {
        while stack.last().is_some_and(|top| top.level >= heading.level) {
            close_top(&mut stack, &mut forest);
        }
        stack.push(TocNode::from(heading));
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut forest);
    }

    forest
}

fn close_top(stack: &mut Vec<TocNode>, forest: &mut Vec<TocNode>) {
    let Some(node) = stack.pop() else {
        return;
    };
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => forest.push(node),
    }
}

/// Total number of entries in a forest.
pub fn count_items(forest: &[TocNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_items(&node.children))
        .sum()
}

/// Number of nested list levels in a forest (0 for an empty forest).
pub fn depth(forest: &[TocNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + depth(&node.children))
        .max()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Serialize a forest as nested `<ul>` markup.
///
/// Nested lists sit inside their parent's `<li>`. Labels are inserted as-is;
/// they are the page's own heading markup.
pub fn render_toc_html(forest: &[TocNode]) -> String {
    let mut out = String::new();
    if !forest.is_empty() {
        write_list(forest, &mut out);
    }
    out
}

fn write_list(nodes: &[TocNode], out: &mut String) {
    out.push_str("<ul>");
    for node in nodes {
        out.push_str("<li><a href=\"");
        out.push_str(&escape_attr(&node.anchor));
        out.push_str("\">");
        out.push_str(&node.label);
        out.push_str("</a>");
        if !node.children.is_empty() {
            write_list(&node.children, out);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

/// Plain-text outline of a forest, two spaces of indent per level.
pub fn render_outline(forest: &[TocNode]) -> String {
    fn walk(nodes: &[TocNode], indent: usize, out: &mut String) {
        for node in nodes {
            out.push_str(&"  ".repeat(indent));
            out.push_str(&format!("- {} ({})\n", node.label, node.anchor));
            walk(&node.children, indent + 1, out);
        }
    }
    let mut out = String::new();
    walk(forest, 0, &mut out);
    out
}

/// Build the TOC for a parsed page without modifying it.
pub fn page_toc(doc: &Document, config: &PageConfig) -> Vec<TocNode> {
    match doc.get_element_by_id(&config.content_root_id) {
        Some(root) => build_toc(collect_headings(doc, root)),
        None => Vec::new(),
    }
}

/// Generate the TOC and install it into the page's container.
pub fn install_toc(doc: &mut Document, config: &PageConfig) -> TocOutcome {
    let Some(container) = doc.get_element_by_id(&config.toc_container_id) else {
        debug!(id = %config.toc_container_id, "no toc container");
        return TocOutcome::NoContainer;
    };

    let forest = page_toc(doc, config);
    if forest.is_empty() {
        doc.set_style_property(container, "display", "none");
        info!("no headings, toc container hidden");
        return TocOutcome::Hidden;
    }

    let items = count_items(&forest);
    doc.set_inner_html(container, &render_toc_html(&forest));
    info!(items, depth = depth(&forest), "toc installed");
    TocOutcome::Installed { items }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
