//! Blinking favicon.
//!
//! Every `link[rel="icon"]` with a known `sizes` value is switched between two
//! embedded PNG frames, "open" and "shut". On each timer tick the eyes are
//! shut with a small probability; the DOM is only written when the state
//! actually changes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::PageConfig;
use crate::dom::{Document, NodeId};

/// Both frames of the icon at one pixel size, base64-encoded PNG.
pub struct EyeFrames {
    pub size: &'static str,
    pub open: &'static str,
    pub shut: &'static str,
}

// `base64 -w0 eye-<size>-<state>.png`
pub const EYES: &[EyeFrames] = &[
    EyeFrames {
        size: "16x16",
        open: "iVBORw0KGgoAAAANSUhEUgAAABAAAAAQCAYAAAAf8/9hAAAAwElEQVQ4y52T0Y3EMAhEH1EKmaZIkaYpdzL3k3id6HbPe0hIwc5gHtghiRXrvXuOJQXAvipuQDrHWkRZUuzfiiMKADuJKG8r4k+2hDCbJwyAbVVYZ+nP+KsK5iTHOYl9lf947F9jXELI9E3k9LgX21+nZ5qoQFL8NpXt3U27df48sT0SjgS9d89lSYqLuSo+851vwQ3stIHhbVq/9ub/JL3GeACtAueLpCpGAwHa1NAbYnu402/j63tUeyH8xyXxA4AspdtjLcmZAAAAAElFTkSuQmCC",
        shut: "iVBORw0KGgoAAAANSUhEUgAAABAAAAAQCAYAAAAf8/9hAAAArklEQVQ4y6VTQQ7DIAxzEA/xp+gj4VP8xLs0NNuKlG6WIpFC4oBdI4kM5pyKOUkDgJIt7gA81LQa1mxxxBgGNcGGqWaLW9PtmYokxrC33BsW/In6tMCZbRhIWs0+3rHuYs9ldFYvijKWzOv7uHeSlp3TIpyxfzRcDeacimORtGMj3xfOf0EdkJoEYEUP330vniN5yXgA6KdFo3miA/vGkYspMu5yX69p/Qq/BEm8APHmqWnfboHWAAAAAElFTkSuQmCC",
    },
    EyeFrames {
        size: "32x32",
        open: "iVBORw0KGgoAAAANSUhEUgAAACAAAAAgCAYAAABzenr0AAAACXBIWXMAAA9hAAAPYQGoP6dpAAAA5ElEQVRYw91XQQ6EIAxsN/sQPoWPpJ/iJ90L3dWJ3RpDItCLwaphpp2pcEqJekatVf/lU0q8X7/o4Xj3Rl7aOms+fY5ZdM/E/AxEyJnlsNaWNybmZQCR3411VOCFOmpYlwFpXe/5gIAq1u0BRGqxwUyYj4FI/1vw/rrTMGe14h+QGmPa8iw86TT0ap9/yE6RR7NiPAZs59itoedDjUvA0HgMRN1q1w1qKw3ZVwXT/w8YImTiRi8QEVFxvjeuD5iX4849przaowqG7QEmokuOZUgM+dU83kdfeJ4BOx1Hp9reMYwKPqH0gpA8/2htAAAAAElFTkSuQmCC",
        shut: "iVBORw0KGgoAAAANSUhEUgAAACAAAAAgCAYAAABzenr0AAAACXBIWXMAAA9hAAAPYQGoP6dpAAAA2klEQVRYw+1XwQ3DMAg8qgzCUsmQ9lLexH2kVBEVxYlcGbflE8VICdzBgYmZ0dNKKfWdn5np+H7DYFt6Z54M/7ruwFCmekRifgS8zMVy3qmvCol5EbAyF65b7Xu6QHMNpxvCIPAPYPn0DzTn9KiReZXQU77tpS3oR6bhk2vFsSBWp5+GnvaTkXmaTgckcl2tnmmOk4NQPAS8apXnpriV6Xd2D4hbA9budqEWAADJ+F5cHRAt15FbSFncp8YdcTgCBKBJsSQTa+ez/Ppc68J4BOR27N1qe1uYLrgDZpiA49gEBboAAAAASUVORK5CYII=",
    },
];

/// Frames for a `sizes` value such as `16x16`.
pub fn frames_for(size: &str) -> Option<&'static EyeFrames> {
    EYES.iter().find(|f| f.size == size)
}

/// The data URL written to an icon link of `size` in the given state.
pub fn icon_href(size: &str, shut: bool) -> Option<String> {
    let frames = frames_for(size)?;
    let png = if shut { frames.shut } else { frames.open };
    Some(format!("data:image/png;base64,{png}"))
}

/// Attached `<link rel="icon">` elements in document order.
pub fn icon_links(doc: &Document) -> Vec<NodeId> {
    doc.elements_by_tag("link")
        .filter(|&id| doc.attr(id, "rel") == Some("icon"))
        .collect()
}

/// Point every icon link at the open or shut frame. Returns the number of
/// links written; links with an unknown `sizes` value are left alone.
pub fn apply_icon_state(doc: &mut Document, shut: bool) -> usize {
    let mut written = 0;
    for id in icon_links(doc) {
        let Some(size) = doc.attr(id, "sizes").map(str::to_owned) else {
            continue;
        };
        if let Some(href) = icon_href(&size, shut) {
            doc.set_attr(id, "href", &href);
            written += 1;
        }
    }
    written
}

/// Remove `link[rel^="shortcut"]` elements, which browsers prefer over
/// `rel="icon"` and would keep the animation from showing.
pub fn remove_shortcut_icons(doc: &mut Document) -> usize {
    let shortcuts: Vec<NodeId> = doc
        .elements_by_tag("link")
        .filter(|&id| {
            doc.attr(id, "rel")
                .map(|rel| rel.starts_with("shortcut"))
                .unwrap_or(false)
        })
        .collect();
    for &id in &shortcuts {
        doc.remove(id);
    }
    shortcuts.len()
}

// ---------------------------------------------------------------------------
// Blinker
// ---------------------------------------------------------------------------

/// Favicon animation state: the last written eye state and the blink chance.
#[derive(Debug, Clone)]
pub struct FaviconBlinker {
    probability_percent: f64,
    shut_prev: bool,
    ticks: u64,
    swaps: u64,
}

impl FaviconBlinker {
    pub fn new(probability_percent: f64) -> Self {
        Self {
            probability_percent,
            shut_prev: false,
            ticks: 0,
            swaps: 0,
        }
    }

    pub fn from_config(config: &PageConfig) -> Self {
        Self::new(config.blink_probability_percent)
    }

    pub fn is_shut(&self) -> bool {
        self.shut_prev
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of ticks that changed the icon state.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    /// Run one tick with a sample drawn from `rng`.
    pub fn tick<R: Rng>(&mut self, doc: &mut Document, rng: &mut R) -> bool {
        let sample: f64 = rng.random();
        self.tick_with_sample(doc, sample)
    }

    /// Run one tick with an explicit sample in `[0, 1)`.
    ///
    /// Returns `true` when the state changed and the icons were rewritten.
    pub fn tick_with_sample(&mut self, doc: &mut Document, sample: f64) -> bool {
        self.ticks += 1;
        let shut = sample * 100.0 < self.probability_percent;
        if shut == self.shut_prev {
            return false;
        }
        let written = apply_icon_state(doc, shut);
        debug!(shut, links = written, "favicon swapped");
        self.shut_prev = shut;
        self.swaps += 1;
        true
    }

    /// Start ticking every `period` on the tokio runtime.
    ///
    /// The first tick fires one period after the call. The task runs until
    /// [`BlinkHandle::stop`] is called or the handle is dropped.
    pub fn start<R>(self, doc: Arc<Mutex<Document>>, period: Duration, rng: R) -> BlinkHandle
    where
        R: Rng + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let mut blinker = self;
        let mut rng = rng;

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let Ok(mut page) = doc.lock() else {
                            warn!("document lock poisoned, favicon blinking stopped");
                            break;
                        };
                        blinker.tick(&mut page, &mut rng);
                    }
                }
            }
            debug!(ticks = blinker.ticks, swaps = blinker.swaps, "favicon blinker stopped");
            blinker
        });

        BlinkHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Running favicon animation. Dropping the handle cancels the timer.
pub struct BlinkHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<FaviconBlinker>>,
}

impl BlinkHandle {
    /// Stop the timer and hand back the blinker with its final state.
    ///
    /// Returns `None` if the task already ended abnormally.
    pub async fn stop(mut self) -> Option<FaviconBlinker> {
        if let Some(tx) = self.stop_tx.take() {
            // The receiver is gone only if the task already finished.
            let _ = tx.send(());
        }
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for BlinkHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const HEAD: &str = "<html><head>\
<link rel=\"icon\" sizes=\"16x16\" href=\"/favicon-16.png\">\
<link rel=\"icon\" sizes=\"32x32\" href=\"/favicon-32.png\">\
<link rel=\"icon\" sizes=\"48x48\" href=\"/favicon-48.png\">\
<link rel=\"shortcut icon\" href=\"/favicon.ico\">\
<link rel=\"stylesheet\" href=\"/site.css\">\
</head><body></body></html>";

    fn hrefs(doc: &Document) -> Vec<String> {
        icon_links(doc)
            .into_iter()
            .filter_map(|id| doc.attr(id, "href").map(str::to_owned))
            .collect()
    }

    #[test]
    fn every_frame_is_a_png() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for frames in EYES {
            assert!(frames.open.starts_with("iVBORw0KGgo"));
            assert!(frames.shut.starts_with("iVBORw0KGgo"));
            assert!(seen.insert(frames.open) && seen.insert(frames.shut));
        }
    }

    #[test]
    fn icon_href_for_unknown_size_is_none() {
        assert!(icon_href("48x48", true).is_none());
        assert_eq!(
            icon_href("16x16", false).unwrap(),
            format!("data:image/png;base64,{}", EYES[0].open)
        );
    }

    #[test]
    fn shut_sample_swaps_known_sizes_only() {
        let mut doc = Document::parse(HEAD);
        let mut blinker = FaviconBlinker::new(1.0);

        assert!(blinker.tick_with_sample(&mut doc, 0.001));
        assert!(blinker.is_shut());
        assert_eq!(
            hrefs(&doc),
            vec![
                icon_href("16x16", true).unwrap(),
                icon_href("32x32", true).unwrap(),
                "/favicon-48.png".to_owned(),
            ]
        );
    }

    #[test]
    fn unchanged_state_writes_nothing() {
        let mut doc = Document::parse(HEAD);
        let mut blinker = FaviconBlinker::new(1.0);

        // Starts open; an open sample is not a change.
        assert!(!blinker.tick_with_sample(&mut doc, 0.5));
        assert_eq!(hrefs(&doc)[0], "/favicon-16.png");

        assert!(blinker.tick_with_sample(&mut doc, 0.0));
        assert!(!blinker.tick_with_sample(&mut doc, 0.005));
        assert!(blinker.tick_with_sample(&mut doc, 0.9));
        assert_eq!(hrefs(&doc)[0], icon_href("16x16", false).unwrap());
        assert_eq!(blinker.ticks(), 4);
        assert_eq!(blinker.swaps(), 2);
    }

    #[test]
    fn swaps_match_state_changes_over_many_ticks() {
        let mut doc = Document::parse(HEAD);
        let mut blinker = FaviconBlinker::new(25.0);
        let mut rng = StdRng::seed_from_u64(7);
        let allowed: Vec<String> = ["16x16", "32x32"]
            .iter()
            .flat_map(|s| [icon_href(s, false).unwrap(), icon_href(s, true).unwrap()])
            .chain(["/favicon-16.png".to_owned(), "/favicon-32.png".to_owned()])
            .collect();

        let mut expected_swaps = 0;
        let mut prev = blinker.is_shut();
        for _ in 0..500 {
            let changed = blinker.tick(&mut doc, &mut rng);
            assert_eq!(changed, blinker.is_shut() != prev);
            if changed {
                expected_swaps += 1;
            }
            prev = blinker.is_shut();
            for href in hrefs(&doc).iter().take(2) {
                assert!(allowed.contains(href), "unexpected href {href}");
            }
        }
        assert_eq!(blinker.swaps(), expected_swaps);
        assert!(expected_swaps > 0);
    }

    #[test]
    fn shortcut_icons_are_removed() {
        let mut doc = Document::parse(HEAD);
        assert_eq!(remove_shortcut_icons(&mut doc), 1);
        let html = doc.to_html();
        assert!(!html.contains("favicon.ico"));
        assert!(html.contains("site.css"));
        assert_eq!(icon_links(&doc).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_until_stopped() {
        let doc = Arc::new(Mutex::new(Document::parse(HEAD)));
        let period = Duration::from_millis(205);
        let handle = FaviconBlinker::new(100.0).start(
            Arc::clone(&doc),
            period,
            StdRng::seed_from_u64(1),
        );

        time::sleep(period * 10 + Duration::from_millis(10)).await;
        let blinker = handle.stop().await.unwrap();

        assert_eq!(blinker.ticks(), 10);
        // Always shut: one swap on the first tick, none after.
        assert_eq!(blinker.swaps(), 1);
        assert!(blinker.is_shut());
        let doc = doc.lock().unwrap();
        assert_eq!(hrefs(&doc)[1], icon_href("32x32", true).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_before_first_period() {
        let doc = Arc::new(Mutex::new(Document::parse(HEAD)));
        let handle = FaviconBlinker::new(100.0).start(
            Arc::clone(&doc),
            Duration::from_millis(200),
            StdRng::seed_from_u64(1),
        );
        time::sleep(Duration::from_millis(150)).await;
        let blinker = handle.stop().await.unwrap();
        assert_eq!(blinker.ticks(), 0);
        assert_eq!(hrefs(&doc.lock().unwrap())[0], "/favicon-16.png");
    }
}
