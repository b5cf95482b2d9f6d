//! Scanning session: walker, matcher and debouncer wired to a host engine,
//! plus the control surface exposed to the host UI layer.

use crate::clipboard::{ClipboardSource, ClipboardWatcher, CLIPBOARD_SOURCE_LABEL};
use crate::config::ScannerConfig;
use crate::debouncer::{DetectionDebouncer, DetectionState};
use crate::dispatcher::{NotificationDispatcher, Subscription};
use crate::element::UIElementAttributes;
use crate::errors::{ErrorKind, LegalEaseError, Result};
use crate::events::{DetectionEvent, Notification};
use crate::keywords::{KeywordCorpus, KeywordMatcher};
use crate::platforms::AccessibilityEngine;
use crate::ui::OverlayHandle;
use crate::walker::{ScanResult, TextTreeWalker, WalkConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedClipboard = Arc<Mutex<Box<dyn ClipboardSource>>>;

/// Everything a scan needs, shared between the session and its monitoring
/// tasks.
struct Pipeline {
    engine: Arc<dyn AccessibilityEngine>,
    walker: TextTreeWalker,
    matcher: KeywordMatcher,
    debouncer: DetectionDebouncer,
    state: Mutex<DetectionState>,
    dispatcher: NotificationDispatcher,
}

impl Pipeline {
    fn scan_focused(&self, label_hint: Option<&str>) -> Result<ScanResult> {
        let root = self.engine.focused_root()?;
        let label = match label_hint {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => self.engine.source_label(),
        };
        Ok(self
            .walker
            .scan(root, &self.matcher, label)
            .with_window_title(self.engine.window_title()))
    }

    /// Gate `result` and publish it if accepted.
    ///
    /// The detection state lock is held across publish so events reach the
    /// subscriber in the order the debouncer accepted them, whichever source
    /// produced them.
    fn process(
        &self,
        result: &ScanResult,
        now: Instant,
        cancel: Option<&CancellationToken>,
    ) -> Option<DetectionEvent> {
        if !result.has_match() {
            debug!(source = %result.source_label, "No legal keywords in scan");
            return None;
        }

        let mut state = lock(&self.state);
        let decision = self.debouncer.should_emit(&result.full_text, now, &state);
        if !decision.is_emit() {
            debug!(source = %result.source_label, ?decision, "Detection suppressed");
            return None;
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!("Monitoring stopped, discarding in-flight scan");
            return None;
        }

        state.commit(result.full_text.clone(), now);
        let event = DetectionEvent {
            text: result.full_text.clone(),
            source_label: result.source_label.clone(),
            timestamp: result.captured_at,
            matched_keywords: result.matched_keywords.clone(),
        };
        info!(
            source = %event.source_label,
            keywords = ?event.matched_keywords,
            len = event.text.len(),
            "Legal text detected"
        );
        self.dispatcher.publish_detection(event.clone());
        Some(event)
    }
}

struct Monitor {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// One scanning session. Owns the detection state and the dispatcher; the
/// overlay lives in the UI context and is reached through an
/// [`OverlayHandle`].
pub struct ScanSession {
    config: ScannerConfig,
    pipeline: Arc<Pipeline>,
    clipboard: Option<SharedClipboard>,
    monitor: Mutex<Option<Monitor>>,
    overlay: Mutex<Option<OverlayHandle>>,
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("monitoring", &self.is_monitoring())
            .field("clipboard", &self.clipboard.is_some())
            .field("dispatcher", &self.pipeline.dispatcher)
            .finish()
    }
}

impl ScanSession {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, config: ScannerConfig) -> Result<Self> {
        Self::with_parts(engine, config, KeywordCorpus::default(), None)
    }

    fn with_parts(
        engine: Arc<dyn AccessibilityEngine>,
        config: ScannerConfig,
        corpus: KeywordCorpus,
        clipboard: Option<SharedClipboard>,
    ) -> Result<Self> {
        let pipeline = Pipeline {
            engine,
            walker: TextTreeWalker::new(WalkConfig {
                max_depth: config.max_depth,
            }),
            matcher: KeywordMatcher::new(corpus)?,
            debouncer: DetectionDebouncer,
            state: Mutex::new(DetectionState::new(config.cooldown())),
            dispatcher: NotificationDispatcher::new(),
        };
        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            clipboard,
            monitor: Mutex::new(None),
            overlay: Mutex::new(None),
        })
    }

    /// Replace the keyword corpus. Must be called before monitoring starts.
    pub fn with_corpus(self, corpus: KeywordCorpus) -> Result<Self> {
        let engine = Arc::clone(&self.pipeline.engine);
        Self::with_parts(engine, self.config.clone(), corpus, self.clipboard.clone())
    }

    pub fn with_clipboard(mut self, source: impl ClipboardSource + 'static) -> Self {
        self.clipboard = Some(Arc::new(Mutex::new(Box::new(source))));
        self
    }

    #[cfg(feature = "clipboard")]
    pub fn with_system_clipboard(self) -> Result<Self> {
        let clipboard = crate::clipboard::SystemClipboard::new()?;
        Ok(self.with_clipboard(clipboard))
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.pipeline.dispatcher
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.pipeline.matcher
    }

    pub fn detection_state(&self) -> DetectionState {
        lock(&self.pipeline.state).clone()
    }

    pub fn last_detection(&self) -> Option<DetectionEvent> {
        self.pipeline.dispatcher.last_detection()
    }

    pub fn is_scanning_permission_granted(&self) -> bool {
        self.pipeline.engine.is_permission_granted()
    }

    pub fn request_scanning_permission(&self) -> Result<()> {
        self.pipeline.engine.request_permission()
    }

    pub fn get_current_source_label(&self) -> String {
        self.pipeline.engine.source_label()
    }

    pub fn get_current_window_title(&self) -> Option<String> {
        self.pipeline.engine.window_title()
    }

    /// Role, title, value and description of the element holding focus
    pub fn get_focused_element(&self) -> Result<UIElementAttributes> {
        if !self.is_scanning_permission_granted() {
            return Err(LegalEaseError::PermissionDenied(
                "scanning permission is not granted".to_string(),
            ));
        }
        self.pipeline.engine.focused_element()
    }

    /// On-demand scan of the focused content, outside the debounced path
    #[instrument(level = "debug", skip(self))]
    pub fn extract_current_content(&self) -> Result<ScanResult> {
        if !self.is_scanning_permission_granted() {
            return Err(LegalEaseError::PermissionDenied(
                "scanning permission is not granted".to_string(),
            ));
        }
        self.pipeline.scan_focused(None)
    }

    pub fn extract_current_text(&self) -> Result<String> {
        Ok(self.extract_current_content()?.full_text)
    }

    /// Run `result` through matching and the debouncer, publishing a
    /// detection if it is accepted.
    pub fn process_scan(&self, result: &ScanResult, now: Instant) -> Option<DetectionEvent> {
        self.pipeline.process(result, now, None)
    }

    #[cfg(test)]
    pub(crate) fn process_scan_until(
        &self,
        result: &ScanResult,
        now: Instant,
        cancel: &CancellationToken,
    ) -> Option<DetectionEvent> {
        self.pipeline.process(result, now, Some(cancel))
    }

    /// Subscribe the UI context to this session's notifications.
    ///
    /// Detections are forwarded to the overlay; every notification is also
    /// forwarded to the returned receiver for the host UI layer.
    pub fn attach_overlay(
        &self,
        handle: OverlayHandle,
    ) -> (Subscription, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let overlay = handle.clone();
        let subscription = self.pipeline.dispatcher.subscribe(move |notification| {
            if let Notification::Detection(event) = notification {
                if !overlay.try_deliver(event.clone()) {
                    debug!("UI context gone, detection not shown");
                }
            }
            let _ = tx.send(notification.clone());
        });
        *lock(&self.overlay) = Some(handle);
        (subscription, rx)
    }

    /// Start watching content changes (and the clipboard, when configured).
    ///
    /// Returns false, after publishing `PERMISSION_DENIED`, when scanning
    /// permission is missing, or `INTERNAL` when called outside a tokio
    /// runtime. An attached overlay is hidden on start.
    #[instrument(skip(self))]
    pub fn start_monitoring(&self) -> bool {
        let mut monitor = lock(&self.monitor);
        if monitor.is_some() {
            debug!("Monitoring already running");
            return true;
        }

        self.pipeline.dispatcher.reopen();
        if !self.is_scanning_permission_granted() {
            self.pipeline.dispatcher.publish_error(
                ErrorKind::PermissionDenied,
                "scanning permission is not granted",
            );
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot start monitoring: {}", e);
                self.pipeline.dispatcher.publish_error(
                    ErrorKind::Internal,
                    format!("monitoring needs a tokio runtime: {e}"),
                );
                return false;
            }
        };

        let changes = match self.pipeline.engine.content_changes() {
            Ok(changes) => changes,
            Err(e) => {
                self.pipeline.dispatcher.publish_error(e.kind(), e.to_string());
                return false;
            }
        };

        lock(&self.pipeline.state).reset();
        if let Some(overlay) = lock(&self.overlay).as_ref() {
            overlay.try_hide();
        }
        let cancel = CancellationToken::new();
        let mut tasks = vec![runtime.spawn(watch_content(
            Arc::clone(&self.pipeline),
            changes,
            cancel.child_token(),
        ))];

        if self.config.clipboard_enabled {
            if let Some(clipboard) = &self.clipboard {
                tasks.push(runtime.spawn(poll_clipboard(
                    Arc::clone(&self.pipeline),
                    Arc::clone(clipboard),
                    self.config.clipboard_poll_interval(),
                    cancel.child_token(),
                )));
            }
        }

        info!(
            clipboard = tasks.len() > 1,
            cooldown_ms = self.config.cooldown_ms,
            "Monitoring started"
        );
        *monitor = Some(Monitor { cancel, tasks });
        true
    }

    /// Stop monitoring. No subscriber is invoked after this returns and any
    /// scan still in flight is discarded.
    pub fn stop_monitoring(&self) {
        let monitor = lock(&self.monitor).take();
        let Some(monitor) = monitor else {
            return;
        };
        monitor.cancel.cancel();
        self.pipeline.dispatcher.close();
        if let Some(overlay) = lock(&self.overlay).take() {
            overlay.try_hide();
        }
        lock(&self.pipeline.state).reset();
        info!(tasks = monitor.tasks.len(), "Monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.monitor)
            .as_ref()
            .is_some_and(|m| !m.cancel.is_cancelled())
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(monitor) = lock(&self.monitor).take() {
            monitor.cancel.cancel();
        }
    }
}

async fn watch_content(
    pipeline: Arc<Pipeline>,
    mut changes: crate::platforms::ContentChanges,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            change = changes.recv() => {
                let Some(change) = change else {
                    warn!("Content change source closed");
                    break;
                };
                match pipeline.scan_focused(Some(&change.source_label)) {
                    Ok(result) => {
                        pipeline.process(&result, Instant::now(), Some(&cancel));
                    }
                    // Nothing focused or permission revoked: no detection this cycle
                    Err(e) => debug!("Skipping scan: {}", e),
                }
            }
        }
    }
    debug!("Content watcher stopped");
}

async fn poll_clipboard(
    pipeline: Arc<Pipeline>,
    clipboard: SharedClipboard,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut watcher = ClipboardWatcher::new();
    watcher.prime(lock(&clipboard).as_mut());

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let changed = watcher.poll(lock(&clipboard).as_mut());
                if let Some(text) = changed {
                    let now = Instant::now();
                    let result = ScanResult::from_text(
                        &text,
                        &pipeline.matcher,
                        CLIPBOARD_SOURCE_LABEL,
                        now,
                    );
                    pipeline.process(&result, now, Some(&cancel));
                }
            }
        }
    }
    debug!("Clipboard poll stopped");
}
