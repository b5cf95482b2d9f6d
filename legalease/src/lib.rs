//! Detection of legal text in on-screen content
//!
//! This crate walks the accessibility tree of whatever the user is looking
//! at, matches it against a corpus of terms-of-service and privacy phrases,
//! rate-limits the results and drives a floating overlay that offers to
//! hand the text over to the LegalEase application.

pub mod clipboard;
pub mod config;
pub mod debouncer;
pub mod dispatcher;
pub mod element;
pub mod errors;
pub mod events;
pub mod handoff;
pub mod keywords;
pub mod overlay;
pub mod platforms;
pub mod session;
#[cfg(test)]
mod tests;
pub mod ui;
pub mod utils;
pub mod walker;

pub use clipboard::{ClipboardSource, MemoryClipboard};
#[cfg(feature = "clipboard")]
pub use clipboard::SystemClipboard;
pub use config::{OverlayConfig, ScannerConfig};
pub use debouncer::{Decision, DetectionDebouncer, DetectionState};
pub use dispatcher::{NotificationDispatcher, Subscription};
pub use element::{UIElement, UIElementAttributes, UIElementImpl, UINode};
pub use errors::{ErrorKind, LegalEaseError, Result};
pub use events::{DetectionEvent, ErrorEvent, Notification, OverlayExpandedEvent};
pub use handoff::{
    AppLauncher, FileHandoffStore, HandoffCoordinator, HandoffOutcome, HandoffPayload,
    HandoffStore, SystemLauncher,
};
pub use keywords::{KeywordCategory, KeywordCorpus, KeywordMatcher, MatchOutcome};
pub use overlay::{
    HandoffRequest, HeadlessSurface, OverlayAction, OverlayMode, OverlayState, OverlaySurface,
    OverlayWindowController, Position, Size,
};
pub use platforms::{AccessibilityEngine, ContentChange, SnapshotEngine};
pub use session::ScanSession;
pub use ui::{spawn_ui_context, OverlayHandle};
pub use walker::{ScanResult, TextFragment, TextTreeWalker, WalkConfig, WalkStats};
