//! Page layout configuration.
//!
//! The enhancement passes locate their elements by id. The defaults match the
//! site's page layout; a JSON file passed with `--config` may override any
//! subset of fields.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Element ids and timer settings used by the page enhancements.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Element that receives the generated table of contents.
    pub toc_container_id: String,
    /// Element whose headings feed the TOC and whose clicks close the menu.
    pub content_root_id: String,
    /// Navigation menu containing `li > a` items.
    pub menu_id: String,
    /// Checkbox that toggles the menu overlay.
    pub menu_control_id: String,
    /// Favicon blink timer period.
    pub blink_period_ms: u64,
    /// Per-tick chance (0..=100) that the favicon eyes are shut.
    pub blink_probability_percent: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        // The two script versions disagree: 200 ms / 2.5 % vs 205 ms / 1 %.
        // The newer one is used here.
        Self {
            toc_container_id: "toc-container".to_owned(),
            content_root_id: "main-page".to_owned(),
            menu_id: "main-menu".to_owned(),
            menu_control_id: "main-menu-control".to_owned(),
            blink_period_ms: 205,
            blink_probability_percent: 1.0,
        }
    }
}

impl PageConfig {
    /// Load a config file; fields absent from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when given, otherwise return the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn blink_period(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.blink_period_ms.max(1))
    }
}
