//! Clipboard as a second text source next to the accessibility tree

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const CLIPBOARD_SOURCE_LABEL: &str = "clipboard";

pub trait ClipboardSource: Send + Debug {
    /// Current text content, `None` when empty or not text
    fn read_text(&mut self) -> Option<String>;
}

/// System clipboard through `arboard`
#[cfg(feature = "clipboard")]
pub struct SystemClipboard {
    clipboard: arboard::Clipboard,
}

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    pub fn new() -> crate::errors::Result<Self> {
        let clipboard = arboard::Clipboard::new().map_err(|e| {
            crate::errors::LegalEaseError::PlatformError(format!(
                "failed to initialize clipboard: {e}"
            ))
        })?;
        Ok(Self { clipboard })
    }
}

#[cfg(feature = "clipboard")]
impl Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SystemClipboard")
    }
}

#[cfg(feature = "clipboard")]
impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Option<String> {
        match self.clipboard.get_text() {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!("Clipboard read failed: {}", e);
                None
            }
        }
    }
}

/// In-process clipboard. Clones share the same content.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    content: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.into());
    }

    pub fn clear(&self) {
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl ClipboardSource for MemoryClipboard {
    fn read_text(&mut self) -> Option<String> {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|text| !text.is_empty())
    }
}

/// Change detector over successive clipboard reads
#[derive(Debug, Default)]
pub struct ClipboardWatcher {
    last_seen: Option<String>,
}

impl ClipboardWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current content without reporting it, so text copied
    /// before monitoring started is not treated as new.
    pub fn prime(&mut self, source: &mut dyn ClipboardSource) {
        self.last_seen = source.read_text();
        debug!(
            has_content = self.last_seen.is_some(),
            "Clipboard monitoring initialised"
        );
    }

    /// Read the clipboard, returning the text only if it differs from the
    /// previous read.
    pub fn poll(&mut self, source: &mut dyn ClipboardSource) -> Option<String> {
        let current = source.read_text()?;
        if self.last_seen.as_deref() == Some(current.as_str()) {
            return None;
        }
        self.last_seen = Some(current.clone());
        Some(current)
    }
}
