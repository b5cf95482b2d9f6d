//! Two-phase handoff of captured text to the host application.
//!
//! Phase one durably writes a versioned [`HandoffPayload`]; phase two asks
//! the OS to open a `<scheme>://<action>` URL. The payload is the source of
//! truth: a failed wake-up only means the host picks the data up the next
//! time it comes to the foreground.

use crate::config::ScannerConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::errors::{ErrorKind, LegalEaseError, Result};
use crate::events::ErrorEvent;
use crate::overlay::{HandoffRequest, OverlayAction};
use crate::utils::epoch_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const HANDOFF_PAYLOAD_VERSION: u32 = 1;

pub const FALLBACK_MESSAGE: &str =
    "Please open LegalEase manually to continue. The text has been saved.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub version: u32,
    pub text: String,
    pub action: OverlayAction,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl HandoffPayload {
    pub fn new(text: impl Into<String>, action: OverlayAction, timestamp: i64) -> Self {
        Self {
            version: HANDOFF_PAYLOAD_VERSION,
            text: text.into(),
            action,
            timestamp,
        }
    }
}

/// Durable storage shared with the host application
pub trait HandoffStore: Send + Sync + Debug {
    fn write(&self, payload: &HandoffPayload) -> Result<()>;
    fn read(&self) -> Result<Option<HandoffPayload>>;
    fn clear(&self) -> Result<()>;
}

/// Stores the payload as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileHandoffStore {
    dir: PathBuf,
    key: String,
}

impl FileHandoffStore {
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }
}

impl HandoffStore for FileHandoffStore {
    fn write(&self, payload: &HandoffPayload) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(payload)
            .map_err(|e| LegalEaseError::Storage(format!("failed to encode payload: {e}")))?;

        // Write next to the target and rename so readers never see a torn file
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        let path = self.path();
        file.persist(&path)
            .map_err(|e| LegalEaseError::Storage(format!("{}: {}", path.display(), e.error)))?;

        debug!(path = %path.display(), "Handoff payload written");
        Ok(())
    }

    fn read(&self) -> Result<Option<HandoffPayload>> {
        let path = self.path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let payload: HandoffPayload = serde_json::from_slice(&bytes).map_err(|e| {
            LegalEaseError::Storage(format!("corrupt handoff payload {}: {e}", path.display()))
        })?;
        if payload.version != HANDOFF_PAYLOAD_VERSION {
            return Err(LegalEaseError::Storage(format!(
                "unsupported handoff payload version {}",
                payload.version
            )));
        }
        Ok(Some(payload))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Wakes the host application through a URL
#[async_trait]
pub trait AppLauncher: Send + Sync + Debug {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Hands URLs to the OS opener
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

#[async_trait]
impl AppLauncher for SystemLauncher {
    async fn open(&self, url: &str) -> Result<()> {
        use tokio::process::Command;

        let mut command = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(url);
            c
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", url]);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(url);
            c
        };

        let status = command
            .status()
            .await
            .map_err(|e| LegalEaseError::HandoffFailed(format!("failed to launch opener: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(LegalEaseError::HandoffFailed(format!(
                "opener exited with {status}"
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    Opened { url: String },
    /// Payload is stored but the host could not be woken
    SavedOnly { url: String, message: String },
}

impl HandoffOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, HandoffOutcome::Opened { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HandoffCoordinator {
    store: Arc<dyn HandoffStore>,
    launcher: Arc<dyn AppLauncher>,
    dispatcher: NotificationDispatcher,
    scheme: String,
}

impl HandoffCoordinator {
    pub fn new(
        store: Arc<dyn HandoffStore>,
        launcher: Arc<dyn AppLauncher>,
        dispatcher: NotificationDispatcher,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            store,
            launcher,
            dispatcher,
            scheme: scheme.into(),
        }
    }

    /// File store under the configured handoff dir plus the OS opener
    pub fn from_config(config: &ScannerConfig, dispatcher: NotificationDispatcher) -> Self {
        Self::new(
            Arc::new(FileHandoffStore::new(
                config.resolved_handoff_dir(),
                config.handoff_key.clone(),
            )),
            Arc::new(SystemLauncher),
            dispatcher,
            config.url_scheme.clone(),
        )
    }

    pub fn wake_url(&self, action: OverlayAction, timestamp: i64) -> String {
        format!(
            "{}://{}?from=overlay&timestamp={}",
            self.scheme,
            action.as_str(),
            timestamp
        )
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn hand_off(&self, text: &str, action: OverlayAction) -> Result<HandoffOutcome> {
        let timestamp = epoch_millis();
        let payload = HandoffPayload::new(text, action, timestamp);
        if let Err(e) = self.store.write(&payload) {
            let err =
                LegalEaseError::HandoffFailed(format!("failed to persist handoff payload: {e}"));
            self.dispatcher
                .publish_error(ErrorKind::HandoffFailed, err.to_string());
            return Err(err);
        }

        let url = self.wake_url(action, timestamp);
        match self.launcher.open(&url).await {
            Ok(()) => {
                info!(%url, "Host application opened");
                Ok(HandoffOutcome::Opened { url })
            }
            Err(e) => {
                warn!(%url, "Failed to open host application: {}", e);
                self.dispatcher.publish_error_event(
                    ErrorEvent::new(ErrorKind::HandoffFailed, FALLBACK_MESSAGE).with_details(
                        serde_json::json!({ "url": url, "reason": e.to_string() }),
                    ),
                );
                Ok(HandoffOutcome::SavedOnly {
                    url,
                    message: FALLBACK_MESSAGE.to_string(),
                })
            }
        }
    }

    pub async fn hand_off_request(&self, request: &HandoffRequest) -> Result<HandoffOutcome> {
        self.hand_off(&request.text, request.action).await
    }

    /// Reader side: return the pending payload and remove it
    pub fn take_pending(&self) -> Result<Option<HandoffPayload>> {
        let payload = self.store.read()?;
        if payload.is_some() {
            self.store.clear()?;
        }
        Ok(payload)
    }
}
