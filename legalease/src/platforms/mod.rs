use crate::element::{UIElement, UIElementAttributes};
use crate::errors::Result;
use tokio::sync::mpsc;

pub mod snapshot;

pub use snapshot::SnapshotEngine;

/// Signal that the focused content may have changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub source_label: String,
}

pub type ContentChanges = mpsc::UnboundedReceiver<ContentChange>;

/// The common trait that every host accessibility backend implements
pub trait AccessibilityEngine: Send + Sync {
    fn is_permission_granted(&self) -> bool;

    /// Ask the host to grant scanning permission. The result is observed
    /// later through `is_permission_granted`.
    fn request_permission(&self) -> Result<()>;

    /// Root of the currently focused window or application.
    ///
    /// Fails with `ExtractionFailed` when nothing is focused.
    fn focused_root(&self) -> Result<UIElement>;

    /// Attributes of the element holding input focus inside the focused
    /// window. Same failure modes as `focused_root`.
    fn focused_element(&self) -> Result<UIElementAttributes>;

    /// App or package name of the focused content
    fn source_label(&self) -> String;

    /// Title of the focused window, when the host exposes one
    fn window_title(&self) -> Option<String> {
        None
    }

    /// Register for content-change signals. Dropping the receiver
    /// unregisters.
    fn content_changes(&self) -> Result<ContentChanges>;

    fn as_any(&self) -> &dyn std::any::Any;
}
