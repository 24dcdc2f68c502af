//! Menu behaviour: closing the overlay menu on content clicks and bringing
//! the current page's menu item into view.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::PageConfig;
use crate::dom::{Document, NodeId};

// ---------------------------------------------------------------------------
// Click-to-close
// ---------------------------------------------------------------------------

/// A click dispatched to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub target: NodeId,
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Closes the open menu when the content area is clicked, swallowing the
/// click so a link under the overlay is not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuCloser {
    control: NodeId,
    content_root: NodeId,
}

impl MenuCloser {
    /// Bind to the menu toggle and content root. `None` if either is missing.
    pub fn arm(doc: &Document, config: &PageConfig) -> Option<Self> {
        let control = doc.get_element_by_id(&config.menu_control_id)?;
        let content_root = doc.get_element_by_id(&config.content_root_id)?;
        Some(Self {
            control,
            content_root,
        })
    }

    /// Handle a click. Returns `true` when the menu was open and got closed.
    pub fn on_content_click(&self, doc: &mut Document, event: &mut ClickEvent) -> bool {
        if !doc.contains(self.content_root, event.target) {
            return false;
        }
        if !doc.has_attr(self.control, "checked") {
            return false;
        }
        event.prevent_default();
        doc.remove_attr(self.control, "checked");
        debug!("menu closed by content click");
        true
    }
}

// ---------------------------------------------------------------------------
// Current item
// ---------------------------------------------------------------------------

/// The menu item for the current page.
///
/// An item already marked `active` wins. Otherwise the item whose link
/// `href` is the longest prefix of `location` is chosen, so an exact match
/// always beats a shorter prefix such as `/`.
pub fn find_current_menu_item(
    doc: &Document,
    config: &PageConfig,
    location: &str,
) -> Option<NodeId> {
    let menu = doc.get_element_by_id(&config.menu_id)?;
    let items: Vec<NodeId> = doc
        .descendants(menu)
        .filter(|&id| doc.tag_name(id) == Some("li"))
        .collect();

    if let Some(&active) = items.iter().find(|&&li| doc.has_class(li, "active")) {
        return Some(active);
    }

    let mut best: Option<(NodeId, usize)> = None;
    for &li in &items {
        let Some(href) = item_href(doc, li) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') || !location.starts_with(href) {
            continue;
        }
        if best.map_or(true, |(_, len)| href.len() > len) {
            best = Some((li, href.len()));
        }
    }
    best.map(|(li, _)| li)
}

/// `href` of the first link inside a menu item.
fn item_href(doc: &Document, li: NodeId) -> Option<&str> {
    doc.descendants(li)
        .find(|&id| doc.tag_name(id) == Some("a"))
        .and_then(|a| doc.attr(a, "href"))
}

// ---------------------------------------------------------------------------
// Scrolling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScrollError {
    #[error("centered scroll-into-view is not supported")]
    Unsupported,
}

/// How an element ended up being scrolled into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMethod {
    Centered,
    Basic,
}

/// The viewport capability of the host the page is shown in.
pub trait Viewport {
    /// Scroll `target` to the vertical centre of the viewport.
    fn scroll_into_view_centered(&mut self, doc: &Document, target: NodeId)
        -> Result<(), ScrollError>;

    /// Scroll `target` into view with the host's default alignment.
    fn scroll_into_view(&mut self, doc: &Document, target: NodeId);
}

/// Scroll `target` into view, centred when the viewport supports it.
pub fn scroll_into_view<V: Viewport + ?Sized>(
    viewport: &mut V,
    doc: &Document,
    target: NodeId,
) -> ScrollMethod {
    match viewport.scroll_into_view_centered(doc, target) {
        Ok(()) => ScrollMethod::Centered,
        Err(ScrollError::Unsupported) => {
            viewport.scroll_into_view(doc, target);
            ScrollMethod::Basic
        }
    }
}

/// Bring the current page's menu item into view. Silent no-op when the menu
/// or a matching item is missing.
pub fn scroll_active_into_view<V: Viewport + ?Sized>(
    doc: &Document,
    config: &PageConfig,
    location: &str,
    viewport: &mut V,
) -> Option<(NodeId, ScrollMethod)> {
    let item = find_current_menu_item(doc, config, location)?;
    let method = scroll_into_view(viewport, doc, item);
    let label = doc.text_content(item);
    info!(location, item = label.trim(), ?method, "menu item scrolled into view");
    Some((item, method))
}

/// Viewport of a page that is not displayed anywhere. Scroll requests are
/// recorded so callers can report or inspect them.
#[derive(Debug, Clone, Default)]
pub struct HeadlessViewport {
    supports_centered: bool,
    scrolled: Vec<(NodeId, ScrollMethod)>,
}

impl HeadlessViewport {
    pub fn new(supports_centered: bool) -> Self {
        Self {
            supports_centered,
            scrolled: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn scrolled(&self) -> &[(NodeId, ScrollMethod)] {
        &self.scrolled
    }
}

impl Viewport for HeadlessViewport {
    fn scroll_into_view_centered(
        &mut self,
        _doc: &Document,
        target: NodeId,
    ) -> Result<(), ScrollError> {
        if !self.supports_centered {
            return Err(ScrollError::Unsupported);
        }
        self.scrolled.push((target, ScrollMethod::Centered));
        Ok(())
    }

    fn scroll_into_view(&mut self, _doc: &Document, target: NodeId) {
        self.scrolled.push((target, ScrollMethod::Basic));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<html><body>\
<input type=\"checkbox\" id=\"main-menu-control\" checked>\
<nav id=\"main-menu\"><ul>\
<li id=\"home\"><a href=\"/\">Home</a></li>\
<li id=\"docs\"><a href=\"/docs/\">Docs</a><ul>\
<li id=\"formats\"><a href=\"/docs/formats/\">Formats</a></li>\
</ul></li>\
<li id=\"blog\"><a href=\"/blog/\">Blog</a></li>\
<li id=\"top\"><a href=\"#top\">Top</a></li>\
</ul></nav>\
<main id=\"main-page\"><p><a id=\"link\" href=\"/x\">x</a></p></main>\
<footer id=\"footer\">f</footer>\
</body></html>";

    fn id(doc: &Document, name: &str) -> NodeId {
        doc.get_element_by_id(name).unwrap()
    }

    // --- MenuCloser ---

    #[test]
    fn click_in_content_closes_open_menu() {
        let mut doc = Document::parse(PAGE);
        let closer = MenuCloser::arm(&doc, &PageConfig::default()).unwrap();
        let mut event = ClickEvent::new(id(&doc, "link"));

        assert!(closer.on_content_click(&mut doc, &mut event));
        assert!(event.default_prevented());
        assert!(!doc.has_attr(id(&doc, "main-menu-control"), "checked"));
    }

    #[test]
    fn click_with_closed_menu_is_untouched() {
        let mut doc = Document::parse(PAGE);
        let control = id(&doc, "main-menu-control");
        doc.remove_attr(control, "checked");
        let closer = MenuCloser::arm(&doc, &PageConfig::default()).unwrap();
        let mut event = ClickEvent::new(id(&doc, "link"));

        assert!(!closer.on_content_click(&mut doc, &mut event));
        assert!(!event.default_prevented());
    }

    #[test]
    fn click_outside_content_is_ignored() {
        let mut doc = Document::parse(PAGE);
        let closer = MenuCloser::arm(&doc, &PageConfig::default()).unwrap();
        let mut event = ClickEvent::new(id(&doc, "footer"));

        assert!(!closer.on_content_click(&mut doc, &mut event));
        assert!(doc.has_attr(id(&doc, "main-menu-control"), "checked"));
    }

    #[test]
    fn closer_is_not_armed_without_control() {
        let doc = Document::parse("<main id=\"main-page\"></main>");
        assert!(MenuCloser::arm(&doc, &PageConfig::default()).is_none());
    }

    // --- find_current_menu_item ---

    #[test]
    fn longest_href_prefix_wins() {
        let doc = Document::parse(PAGE);
        let config = PageConfig::default();
        assert_eq!(
            find_current_menu_item(&doc, &config, "/docs/formats/"),
            Some(id(&doc, "formats"))
        );
        assert_eq!(
            find_current_menu_item(&doc, &config, "/docs/intro/"),
            Some(id(&doc, "docs"))
        );
        assert_eq!(
            find_current_menu_item(&doc, &config, "/blog/"),
            Some(id(&doc, "blog"))
        );
        assert_eq!(find_current_menu_item(&doc, &config, "/about"), Some(id(&doc, "home")));
    }

    #[test]
    fn active_marker_beats_location() {
        let doc = Document::parse(&PAGE.replace("<li id=\"blog\">", "<li id=\"blog\" class=\"active\">"));
        assert_eq!(
            find_current_menu_item(&doc, &PageConfig::default(), "/docs/formats/"),
            Some(id(&doc, "blog"))
        );
    }

    #[test]
    fn fragment_links_never_match() {
        let doc = Document::parse(PAGE);
        assert_eq!(
            find_current_menu_item(&doc, &PageConfig::default(), "#top"),
            None
        );
    }

    #[test]
    fn missing_menu_is_noop() {
        let doc = Document::parse("<main id=\"main-page\"></main>");
        let mut viewport = HeadlessViewport::new(true);
        assert!(scroll_active_into_view(&doc, &PageConfig::default(), "/", &mut viewport).is_none());
        assert!(viewport.scrolled().is_empty());
    }

    // --- scrolling ---

    #[test]
    fn centered_scroll_is_used_when_supported() {
        let doc = Document::parse(PAGE);
        let mut viewport = HeadlessViewport::new(true);
        let (item, method) =
            scroll_active_into_view(&doc, &PageConfig::default(), "/blog/", &mut viewport).unwrap();
        assert_eq!(method, ScrollMethod::Centered);
        assert_eq!(viewport.scrolled(), &[(item, ScrollMethod::Centered)]);
    }

    #[test]
    fn unsupported_centered_scroll_falls_back_to_basic() {
        let doc = Document::parse(PAGE);
        let mut viewport = HeadlessViewport::new(false);
        let (item, method) =
            scroll_active_into_view(&doc, &PageConfig::default(), "/blog/", &mut viewport).unwrap();
        assert_eq!(method, ScrollMethod::Basic);
        assert_eq!(item, id(&doc, "blog"));
        assert_eq!(viewport.scrolled(), &[(item, ScrollMethod::Basic)]);
    }
}
