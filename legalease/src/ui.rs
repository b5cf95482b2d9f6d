//! UI context: one task owns the overlay controller and applies commands in
//! arrival order.

use crate::errors::{LegalEaseError, Result};
use crate::events::DetectionEvent;
use crate::handoff::{HandoffCoordinator, HandoffOutcome};
use crate::overlay::{
    OverlayAction, OverlayMode, OverlayState, OverlayWindowController, Position, Size,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum UiCommand {
    Deliver {
        event: DetectionEvent,
        reply: Option<Reply<Result<OverlayMode>>>,
    },
    Show {
        text: String,
        reply: Reply<Result<OverlayMode>>,
    },
    Hide {
        reply: Option<Reply<OverlayMode>>,
    },
    Tap(Reply<Result<OverlayMode>>),
    Close(Reply<Result<OverlayMode>>),
    OutsideTouch(Reply<OverlayMode>),
    DragBy {
        dx: f64,
        dy: f64,
        reply: Reply<Result<Position>>,
    },
    Minimize(Reply<Result<OverlayMode>>),
    Expand(Reply<Result<OverlayMode>>),
    SetPosition {
        x: f64,
        y: f64,
        reply: Reply<()>,
    },
    SetSize {
        width: f64,
        height: f64,
        reply: Reply<()>,
    },
    SetAlwaysOnTop {
        on_top: bool,
        reply: Reply<()>,
    },
    SelectAction {
        action: OverlayAction,
        reply: Reply<Result<HandoffOutcome>>,
    },
    State(Reply<OverlayState>),
    Shutdown,
}

/// Cloneable handle to the UI context
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    tx: mpsc::UnboundedSender<UiCommand>,
}

fn ui_closed() -> LegalEaseError {
    LegalEaseError::Internal("UI context has shut down".to_string())
}

impl OverlayHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> UiCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(make(tx)).map_err(|_| ui_closed())?;
        rx.await.map_err(|_| ui_closed())
    }

    /// Queue a detection without waiting. Safe to call from a dispatcher
    /// handler on any thread.
    pub fn try_deliver(&self, event: DetectionEvent) -> bool {
        self.tx
            .send(UiCommand::Deliver { event, reply: None })
            .is_ok()
    }

    pub fn try_hide(&self) -> bool {
        self.tx.send(UiCommand::Hide { reply: None }).is_ok()
    }

    pub async fn deliver(&self, event: DetectionEvent) -> Result<OverlayMode> {
        self.request(|reply| UiCommand::Deliver {
            event,
            reply: Some(reply),
        })
        .await?
    }

    pub async fn show(&self, text: impl Into<String>) -> Result<OverlayMode> {
        let text = text.into();
        self.request(|reply| UiCommand::Show { text, reply }).await?
    }

    pub async fn hide(&self) -> Result<OverlayMode> {
        self.request(|reply| UiCommand::Hide { reply: Some(reply) })
            .await
    }

    pub async fn tap(&self) -> Result<OverlayMode> {
        self.request(UiCommand::Tap).await?
    }

    pub async fn close(&self) -> Result<OverlayMode> {
        self.request(UiCommand::Close).await?
    }

    pub async fn outside_touch(&self) -> Result<OverlayMode> {
        self.request(UiCommand::OutsideTouch).await
    }

    pub async fn drag_by(&self, dx: f64, dy: f64) -> Result<Position> {
        self.request(|reply| UiCommand::DragBy { dx, dy, reply })
            .await?
    }

    pub async fn minimize(&self) -> Result<OverlayMode> {
        self.request(UiCommand::Minimize).await?
    }

    pub async fn expand(&self) -> Result<OverlayMode> {
        self.request(UiCommand::Expand).await?
    }

    pub async fn set_position(&self, x: f64, y: f64) -> Result<()> {
        self.request(|reply| UiCommand::SetPosition { x, y, reply })
            .await
    }

    pub async fn set_size(&self, width: f64, height: f64) -> Result<()> {
        self.request(|reply| UiCommand::SetSize {
            width,
            height,
            reply,
        })
        .await
    }

    pub async fn set_always_on_top(&self, on_top: bool) -> Result<()> {
        self.request(|reply| UiCommand::SetAlwaysOnTop { on_top, reply })
            .await
    }

    /// Run the selected action through the handoff coordinator
    pub async fn select_action(&self, action: OverlayAction) -> Result<HandoffOutcome> {
        self.request(|reply| UiCommand::SelectAction { action, reply })
            .await?
    }

    pub async fn state(&self) -> Result<OverlayState> {
        self.request(UiCommand::State).await
    }

    pub async fn is_visible(&self) -> Result<bool> {
        Ok(self.state().await?.mode != OverlayMode::Hidden)
    }

    pub async fn get_position(&self) -> Result<Position> {
        Ok(self.state().await?.position)
    }

    pub async fn get_size(&self) -> Result<Size> {
        Ok(self.state().await?.size)
    }

    pub async fn mode(&self) -> Result<OverlayMode> {
        Ok(self.state().await?.mode)
    }

    /// Hide the overlay and stop the UI task
    pub fn shutdown(&self) {
        let _ = self.tx.send(UiCommand::Shutdown);
    }
}

/// Start the UI context task. It runs until `shutdown` or until every
/// handle is dropped.
pub fn spawn_ui_context(
    controller: OverlayWindowController,
    handoff: Option<HandoffCoordinator>,
) -> (OverlayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_ui_context(controller, handoff, rx));
    (OverlayHandle { tx }, task)
}

async fn run_ui_context(
    mut controller: OverlayWindowController,
    handoff: Option<HandoffCoordinator>,
    mut rx: mpsc::UnboundedReceiver<UiCommand>,
) {
    info!("UI context started");
    while let Some(command) = rx.recv().await {
        match command {
            UiCommand::Deliver { event, reply } => {
                debug!(source = %event.source_label, "Detection delivered to overlay");
                let result = controller.show(&event.text);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            debug!("Overlay did not show detection: {}", e);
                        }
                    }
                }
            }
            UiCommand::Show { text, reply } => {
                let _ = reply.send(controller.show(&text));
            }
            UiCommand::Hide { reply } => {
                let mode = controller.hide();
                if let Some(reply) = reply {
                    let _ = reply.send(mode);
                }
            }
            UiCommand::Tap(reply) => {
                let _ = reply.send(controller.tap());
            }
            UiCommand::Close(reply) => {
                let _ = reply.send(controller.close());
            }
            UiCommand::OutsideTouch(reply) => {
                let _ = reply.send(controller.outside_touch());
            }
            UiCommand::DragBy { dx, dy, reply } => {
                let _ = reply.send(controller.drag_by(dx, dy));
            }
            UiCommand::Minimize(reply) => {
                let _ = reply.send(controller.minimize());
            }
            UiCommand::Expand(reply) => {
                let _ = reply.send(controller.expand());
            }
            UiCommand::SetPosition { x, y, reply } => {
                controller.set_position(x, y);
                let _ = reply.send(());
            }
            UiCommand::SetSize {
                width,
                height,
                reply,
            } => {
                controller.set_size(width, height);
                let _ = reply.send(());
            }
            UiCommand::SetAlwaysOnTop { on_top, reply } => {
                controller.set_always_on_top(on_top);
                let _ = reply.send(());
            }
            UiCommand::SelectAction { action, reply } => match controller.select_action(action) {
                Ok(request) => match handoff.clone() {
                    // Waking the host may block on the OS opener; the reply
                    // comes from its own task so overlay commands keep flowing
                    Some(handoff) => {
                        tokio::spawn(async move {
                            let _ = reply.send(handoff.hand_off_request(&request).await);
                        });
                    }
                    None => {
                        warn!("No handoff coordinator configured, dropping action");
                        let _ = reply.send(Err(LegalEaseError::HandoffFailed(
                            "no handoff target configured".to_string(),
                        )));
                    }
                },
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            UiCommand::State(reply) => {
                let _ = reply.send(controller.state().clone());
            }
            UiCommand::Shutdown => {
                controller.hide();
                break;
            }
        }
    }
    info!("UI context stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::dispatcher::NotificationDispatcher;
    use crate::overlay::HeadlessSurface;
    use std::sync::Arc;

    fn spawn() -> (OverlayHandle, JoinHandle<()>, HeadlessSurface) {
        let surface = HeadlessSurface::new();
        let controller = OverlayWindowController::new(
            Box::new(surface.clone()),
            NotificationDispatcher::new(),
            &OverlayConfig::default(),
            150,
        );
        let (handle, task) = spawn_ui_context(controller, None);
        (handle, task, surface)
    }

    fn detection(text: &str) -> DetectionEvent {
        DetectionEvent {
            text: text.to_string(),
            source_label: "com.example".to_string(),
            timestamp: 1,
            matched_keywords: Default::default(),
        }
    }

    #[tokio::test]
    async fn commands_apply_in_order() {
        let (handle, _task, _) = spawn();

        assert!(handle.try_deliver(detection("Privacy Policy")));
        assert_eq!(handle.tap().await.unwrap(), OverlayMode::Expanded);
        assert_eq!(handle.outside_touch().await.unwrap(), OverlayMode::Floating);
        assert!(handle.is_visible().await.unwrap());
    }

    #[tokio::test]
    async fn overlay_commands_round_trip_geometry() {
        let (handle, _task, _) = spawn();
        handle.deliver(detection("EULA")).await.unwrap();

        handle.set_position(20.0, 30.0).await.unwrap();
        handle.set_size(200.0, 60.0).await.unwrap();
        assert_eq!(handle.get_position().await.unwrap(), Position::new(20.0, 30.0));
        assert_eq!(handle.get_size().await.unwrap(), Size::new(200.0, 60.0));

        handle.minimize().await.unwrap();
        assert_eq!(handle.get_size().await.unwrap(), Size::new(200.0, 40.0));
        assert_eq!(handle.expand().await.unwrap(), OverlayMode::Floating);
    }

    #[tokio::test]
    async fn select_action_without_coordinator_still_hides() {
        let (handle, _task, _) = spawn();
        handle.show("Terms of Service").await.unwrap();
        handle.tap().await.unwrap();

        let err = handle.select_action(OverlayAction::Analyze).await.unwrap_err();
        assert!(matches!(err, LegalEaseError::HandoffFailed(_)));
        assert_eq!(handle.mode().await.unwrap(), OverlayMode::Hidden);
    }

    #[tokio::test]
    async fn shutdown_hides_and_stops_task() {
        let (handle, task, surface) = spawn();
        handle.show("Privacy Policy").await.unwrap();
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(
            surface.calls().last(),
            Some(&crate::overlay::SurfaceCall::Destroy)
        );
        assert!(handle.mode().await.is_err());
        assert!(!handle.try_deliver(detection("late")));
    }

    #[derive(Debug)]
    struct GatedLauncher {
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl crate::handoff::AppLauncher for GatedLauncher {
        async fn open(&self, _url: &str) -> Result<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_handoff_does_not_block_overlay_commands() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let dispatcher = NotificationDispatcher::new();
        let coordinator = HandoffCoordinator::new(
            Arc::new(crate::handoff::FileHandoffStore::new(dir.path(), "pending")),
            Arc::new(GatedLauncher { gate: gate.clone() }),
            dispatcher.clone(),
            "legalease",
        );
        let controller = OverlayWindowController::new(
            Box::new(HeadlessSurface::new()),
            dispatcher,
            &OverlayConfig::default(),
            150,
        );
        let (handle, _task) = spawn_ui_context(controller, Some(coordinator));

        handle.deliver(detection("Privacy Policy")).await.unwrap();
        handle.tap().await.unwrap();
        let selecting = tokio::spawn({
            let handle = handle.clone();
            async move { handle.select_action(OverlayAction::Translate).await }
        });

        // The launcher is still waiting, yet the next detection is shown
        assert_eq!(
            handle.deliver(detection("Terms of Use")).await.unwrap(),
            OverlayMode::Floating
        );

        gate.notify_one();
        assert!(selecting.await.unwrap().unwrap().is_opened());
    }
}
