//! Scanner configuration

use crate::errors::{LegalEaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Window geometry defaults for the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Bar height while minimized
    pub minimized_height: f64,
    pub button_width: f64,
    pub button_height: f64,
    pub always_on_top: bool,
    /// Screen bounds used to center the expanded panel when the window
    /// backend cannot report them
    pub screen_width: f64,
    pub screen_height: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            x: 100.0,
            y: 100.0,
            width: 400.0,
            height: 500.0,
            minimized_height: 40.0,
            button_width: 160.0,
            button_height: 48.0,
            always_on_top: true,
            screen_width: 1920.0,
            screen_height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Walker depth bound, root is depth 0
    pub max_depth: usize,
    /// Minimum gap between two accepted detections
    pub cooldown_ms: u64,
    pub clipboard_poll_ms: u64,
    pub clipboard_enabled: bool,
    /// Characters of detected text shown in the overlay preview
    pub preview_chars: usize,
    pub url_scheme: String,
    pub handoff_key: String,
    pub handoff_dir: Option<PathBuf>,
    pub overlay: OverlayConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_depth: crate::walker::DEFAULT_MAX_DEPTH,
            cooldown_ms: 5000,
            clipboard_poll_ms: 500,
            clipboard_enabled: true,
            preview_chars: 150,
            url_scheme: "legalease".to_string(),
            handoff_key: "overlay_shared_data".to_string(),
            handoff_dir: None,
            overlay: OverlayConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Defaults with `LEGALEASE_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            LegalEaseError::Storage(format!("invalid config {}: {e}", path.display()))
        })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(depth) = parse_var::<usize>(&lookup, "LEGALEASE_MAX_DEPTH") {
            self.max_depth = depth.min(crate::walker::MAX_DEPTH_CEILING);
        }
        if let Some(cooldown) = parse_var(&lookup, "LEGALEASE_COOLDOWN_MS") {
            self.cooldown_ms = cooldown;
        }
        if let Some(poll) = parse_var(&lookup, "LEGALEASE_CLIPBOARD_POLL_MS") {
            self.clipboard_poll_ms = poll;
        }
        if let Some(scheme) = lookup("LEGALEASE_URL_SCHEME").filter(|s| !s.trim().is_empty()) {
            self.url_scheme = scheme.trim().to_string();
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn clipboard_poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic
        Duration::from_millis(self.clipboard_poll_ms.max(1))
    }

    /// Directory holding the handoff payload
    pub fn resolved_handoff_dir(&self) -> PathBuf {
        self.handoff_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("legalease")
        })
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}
