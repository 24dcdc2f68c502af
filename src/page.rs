//! Page view lifecycle.
//!
//! A [`PageView`] owns one parsed document and drives the enhancements the
//! way a browser would for a single page load:
//!
//! - *content ready*: install the TOC, drop shortcut icons, arm the menu closer
//! - *fully loaded*: scroll the current menu item into view
//! - clicks are dispatched to the menu closer
//! - the favicon blinker runs between [`PageView::start_blinking`] and
//!   [`PageView::stop_blinking`], or until the view is dropped

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::config::PageConfig;
use crate::dom::{Document, NodeId};
use crate::favicon::{self, BlinkHandle, FaviconBlinker};
use crate::menu::{self, ClickEvent, MenuCloser, ScrollMethod, Viewport};
use crate::toc::{self, TocOutcome};

/// What the content-ready phase did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentReady {
    pub toc: TocOutcome,
    pub shortcut_icons_removed: usize,
    pub menu_armed: bool,
}

pub struct PageView {
    doc: Arc<Mutex<Document>>,
    config: PageConfig,
    location: String,
    menu_closer: Option<MenuCloser>,
    blink: Option<BlinkHandle>,
}

impl PageView {
    /// Parse `html` as the page shown at `location` (a URL path).
    pub fn new(html: &str, location: &str, config: PageConfig) -> Self {
        Self {
            doc: Arc::new(Mutex::new(Document::parse(html))),
            config,
            location: location.to_owned(),
            menu_closer: None,
            blink: None,
        }
    }

    /// Lock the document. A poisoned lock is recovered; every writer leaves
    /// the tree consistent between statements.
    pub fn document(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize the current state of the page.
    pub fn to_html(&self) -> String {
        self.document().to_html()
    }

    /// Run the content-ready phase.
    pub fn content_ready(&mut self) -> ContentReady {
        let mut doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        let toc = toc::install_toc(&mut doc, &self.config);
        let shortcut_icons_removed = favicon::remove_shortcut_icons(&mut doc);
        self.menu_closer = MenuCloser::arm(&doc, &self.config);
        let ready = ContentReady {
            toc,
            shortcut_icons_removed,
            menu_armed: self.menu_closer.is_some(),
        };
        info!(
            location = %self.location,
            toc = ?ready.toc,
            shortcut_icons_removed = ready.shortcut_icons_removed,
            menu_armed = ready.menu_armed,
            "content ready"
        );
        ready
    }

    /// Run the fully-loaded phase against the given viewport.
    pub fn fully_loaded<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
    ) -> Option<(NodeId, ScrollMethod)> {
        let doc = self.document();
        menu::scroll_active_into_view(&doc, &self.config, &self.location, viewport)
    }

    /// Dispatch a click on `target` and return the event after handling.
    pub fn click(&mut self, target: NodeId) -> ClickEvent {
        let mut event = ClickEvent::new(target);
        if let Some(closer) = self.menu_closer {
            let mut doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
            closer.on_content_click(&mut doc, &mut event);
        }
        event
    }

    /// Start the favicon animation. Restarting replaces the running timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_blinking<R>(&mut self, rng: R)
    where
        R: Rng + Send + 'static,
    {
        let blinker = FaviconBlinker::from_config(&self.config);
        let handle = blinker.start(Arc::clone(&self.doc), self.config.blink_period(), rng);
        self.blink = Some(handle);
    }

    /// Stop the favicon animation, returning its final state.
    pub async fn stop_blinking(&mut self) -> Option<FaviconBlinker> {
        self.blink.take()?.stop().await
    }
}

/// Parse, run both load phases headlessly and serialize the result.
pub fn enhance_html(html: &str, location: &str, config: &PageConfig) -> (String, ContentReady) {
    let mut view = PageView::new(html, location, config.clone());
    let ready = load(&mut view);
    (view.to_html(), ready)
}

/// Like [`enhance_html`], then let the favicon blink for `duration` before
/// serializing, so the output carries whatever frame was showing at the end.
pub async fn enhance_html_blinking<R>(
    html: &str,
    location: &str,
    config: &PageConfig,
    duration: Duration,
    rng: R,
) -> (String, ContentReady)
where
    R: Rng + Send + 'static,
{
    let mut view = PageView::new(html, location, config.clone());
    let ready = load(&mut view);
    view.start_blinking(rng);
    tokio::time::sleep(duration).await;
    if let Some(blinker) = view.stop_blinking().await {
        info!(
            ticks = blinker.ticks(),
            swaps = blinker.swaps(),
            shut = blinker.is_shut(),
            "favicon blink stopped"
        );
    }
    (view.to_html(), ready)
}

fn load(view: &mut PageView) -> ContentReady {
    let ready = view.content_ready();
    let mut viewport = menu::HeadlessViewport::new(true);
    view.fully_loaded(&mut viewport);
    ready
}
