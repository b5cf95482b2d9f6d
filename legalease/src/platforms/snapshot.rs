//! In-memory engine serving a `UINode` snapshot as the focused window

use super::{AccessibilityEngine, ContentChange, ContentChanges};
use crate::element::{UIElement, UIElementAttributes, UINode};
use crate::errors::{LegalEaseError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Default)]
struct SnapshotInner {
    snapshot: Option<(String, Arc<UINode>)>,
    /// Focused element inside the snapshot; the root when unset
    focused: Option<UIElementAttributes>,
    permission: bool,
    permission_requests: usize,
    watchers: Vec<mpsc::UnboundedSender<ContentChange>>,
}

pub struct SnapshotEngine {
    inner: Mutex<SnapshotInner>,
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SnapshotEngine")
            .field("label", &inner.snapshot.as_ref().map(|(label, _)| label))
            .field("permission", &inner.permission)
            .field("watchers", &inner.watchers.len())
            .finish()
    }
}

impl SnapshotEngine {
    /// Engine with permission granted and nothing focused
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SnapshotInner {
                permission: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_snapshot(label: impl Into<String>, root: UINode) -> Self {
        let engine = Self::new();
        engine.set_snapshot(label, root);
        engine
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the focused tree and signal every live watcher
    pub fn set_snapshot(&self, label: impl Into<String>, root: UINode) {
        let label = label.into();
        let mut inner = self.lock();
        inner.snapshot = Some((label.clone(), Arc::new(root)));
        inner.focused = None;
        inner.watchers.retain(|tx| {
            tx.send(ContentChange {
                source_label: label.clone(),
            })
            .is_ok()
        });
        debug!(%label, watchers = inner.watchers.len(), "Snapshot replaced");
    }

    /// Nothing focused
    pub fn clear_snapshot(&self) {
        let mut inner = self.lock();
        inner.snapshot = None;
        inner.focused = None;
    }

    /// Move input focus to an element of the current snapshot
    pub fn set_focused(&self, attributes: UIElementAttributes) {
        self.lock().focused = Some(attributes);
    }

    fn check_permission(inner: &SnapshotInner) -> Result<()> {
        if inner.permission {
            Ok(())
        } else {
            Err(LegalEaseError::PermissionDenied(
                "accessibility permission is not granted".to_string(),
            ))
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.lock().permission = granted;
    }

    pub fn permission_requests(&self) -> usize {
        self.lock().permission_requests
    }
}

impl AccessibilityEngine for SnapshotEngine {
    fn is_permission_granted(&self) -> bool {
        self.lock().permission
    }

    fn request_permission(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.permission_requests += 1;
        info!(
            requests = inner.permission_requests,
            "Scanning permission requested"
        );
        Ok(())
    }

    fn focused_root(&self) -> Result<UIElement> {
        let inner = self.lock();
        Self::check_permission(&inner)?;
        match &inner.snapshot {
            Some((_, root)) => Ok(UINode::shared_element(root)),
            None => Err(LegalEaseError::ExtractionFailed(
                "no focused window".to_string(),
            )),
        }
    }

    fn focused_element(&self) -> Result<UIElementAttributes> {
        let inner = self.lock();
        Self::check_permission(&inner)?;
        match (&inner.focused, &inner.snapshot) {
            (Some(focused), Some(_)) => Ok(focused.clone()),
            (None, Some((_, root))) => Ok(root.attributes.clone()),
            (_, None) => Err(LegalEaseError::ExtractionFailed(
                "no focused element".to_string(),
            )),
        }
    }

    fn source_label(&self) -> String {
        self.lock()
            .snapshot
            .as_ref()
            .map(|(label, _)| label.clone())
            .unwrap_or_default()
    }

    fn window_title(&self) -> Option<String> {
        self.lock()
            .snapshot
            .as_ref()
            .and_then(|(_, root)| root.attributes.title.clone())
            .filter(|title| !title.is_empty())
    }

    fn content_changes(&self) -> Result<ContentChanges> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().watchers.push(tx);
        Ok(rx)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
