//! Floating overlay window state machine.
//!
//! The controller owns [`OverlayState`] and a window backend implementing
//! [`OverlaySurface`]. Every mode change goes through one of its transition
//! methods; invalid triggers fail with [`LegalEaseError::InvalidTransition`]
//! and leave the state untouched.
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | Hidden | `show` | Floating |
//! | Floating | `tap` | Expanded |
//! | Expanded | `close`, `outside_touch` | Floating |
//! | Expanded | `select_action` | Hidden |
//! | Floating, Expanded, Minimized | `hide` | Hidden |
//! | Floating, Expanded | `minimize` | Minimized |
//! | Minimized | `expand` | mode before `minimize` |

use crate::config::OverlayConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::errors::{LegalEaseError, Result};
use crate::events::{Notification, OverlayExpandedEvent};
use crate::utils::truncate_preview;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    Hidden,
    Floating,
    Expanded,
    Minimized,
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayMode::Hidden => "hidden",
            OverlayMode::Floating => "floating",
            OverlayMode::Expanded => "expanded",
            OverlayMode::Minimized => "minimized",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayState {
    pub mode: OverlayMode,
    pub position: Position,
    pub size: Size,
    /// Always-on-top
    pub pinned: bool,
    pub preview_text: String,
}

/// Quick actions offered by the expanded panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayAction {
    Analyze,
    Summarize,
    Translate,
    Ask,
}

impl OverlayAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayAction::Analyze => "analyze",
            OverlayAction::Summarize => "summarize",
            OverlayAction::Translate => "translate",
            OverlayAction::Ask => "ask",
        }
    }
}

impl fmt::Display for OverlayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayAction {
    type Err = LegalEaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "analyze" => Ok(OverlayAction::Analyze),
            "summarize" => Ok(OverlayAction::Summarize),
            "translate" => Ok(OverlayAction::Translate),
            "ask" => Ok(OverlayAction::Ask),
            other => Err(LegalEaseError::InvalidEvent(format!(
                "unknown overlay action '{other}'"
            ))),
        }
    }
}

/// Text and action the user picked, to be handed to the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub text: String,
    pub action: OverlayAction,
}

/// Window backend driven by the controller.
///
/// Implementations run on the UI context only.
pub trait OverlaySurface: Send + fmt::Debug {
    fn has_overlay_permission(&self) -> bool;
    fn create(&mut self, position: Position, size: Size) -> Result<()>;
    fn destroy(&mut self);
    fn set_frame(&mut self, position: Position, size: Size);
    fn set_always_on_top(&mut self, on_top: bool);
    fn capture_outside_touch(&mut self, enabled: bool);
    fn show_content(&mut self, mode: OverlayMode, preview: &str);

    /// Bounds of the screen the window lives on, when the backend knows them
    fn screen_size(&self) -> Option<Size> {
        None
    }
}

/// Calls recorded by [`HeadlessSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Create(Position, Size),
    Destroy,
    SetFrame(Position, Size),
    SetAlwaysOnTop(bool),
    CaptureOutsideTouch(bool),
    ShowContent(OverlayMode, String),
}

#[derive(Debug, Default)]
struct HeadlessInner {
    permission: bool,
    fail_create: bool,
    screen: Option<Size>,
    calls: Vec<SurfaceCall>,
}

/// Window backend with no real window. Clones share the same call log, so
/// a test can keep one clone while the controller owns another.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    inner: Arc<Mutex<HeadlessInner>>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HeadlessInner {
                permission: true,
                ..Default::default()
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut HeadlessInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    pub fn set_permission(&self, granted: bool) {
        self.with(|inner| inner.permission = granted);
    }

    /// Make the next `create` calls fail
    pub fn set_fail_create(&self, fail: bool) {
        self.with(|inner| inner.fail_create = fail);
    }

    pub fn set_screen_size(&self, size: Size) {
        self.with(|inner| inner.screen = Some(size));
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.with(|inner| inner.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|inner| inner.calls.clear());
    }

    fn record(&self, call: SurfaceCall) {
        self.with(|inner| inner.calls.push(call));
    }
}

impl OverlaySurface for HeadlessSurface {
    fn has_overlay_permission(&self) -> bool {
        self.with(|inner| inner.permission)
    }

    fn create(&mut self, position: Position, size: Size) -> Result<()> {
        if self.with(|inner| inner.fail_create) {
            return Err(LegalEaseError::PlatformError(
                "headless surface refused to create a window".to_string(),
            ));
        }
        self.record(SurfaceCall::Create(position, size));
        Ok(())
    }

    fn destroy(&mut self) {
        self.record(SurfaceCall::Destroy);
    }

    fn set_frame(&mut self, position: Position, size: Size) {
        self.record(SurfaceCall::SetFrame(position, size));
    }

    fn set_always_on_top(&mut self, on_top: bool) {
        self.record(SurfaceCall::SetAlwaysOnTop(on_top));
    }

    fn capture_outside_touch(&mut self, enabled: bool) {
        self.record(SurfaceCall::CaptureOutsideTouch(enabled));
    }

    fn show_content(&mut self, mode: OverlayMode, preview: &str) {
        self.record(SurfaceCall::ShowContent(mode, preview.to_string()));
    }

    fn screen_size(&self) -> Option<Size> {
        self.with(|inner| inner.screen)
    }
}

pub struct OverlayWindowController {
    surface: Box<dyn OverlaySurface>,
    dispatcher: NotificationDispatcher,
    preview_chars: usize,
    minimized_height: f64,
    state: OverlayState,
    /// Untruncated text of the latest detection
    text: String,
    button_size: Size,
    panel_size: Size,
    /// Fallback when the surface does not report its screen
    screen_size: Size,
    /// Floating position to restore when the panel closes
    floating_position: Position,
    /// Mode to return to from `Minimized`
    previous_mode: OverlayMode,
    drag_anchor: Option<Position>,
}

impl fmt::Debug for OverlayWindowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayWindowController")
            .field("state", &self.state)
            .field("previous_mode", &self.previous_mode)
            .field("dragging", &self.drag_anchor.is_some())
            .finish()
    }
}

impl OverlayWindowController {
    pub fn new(
        surface: Box<dyn OverlaySurface>,
        dispatcher: NotificationDispatcher,
        config: &OverlayConfig,
        preview_chars: usize,
    ) -> Self {
        let position = Position::new(config.x, config.y);
        let button_size = Size::new(config.button_width, config.button_height);
        Self {
            surface,
            dispatcher,
            preview_chars,
            minimized_height: config.minimized_height,
            state: OverlayState {
                mode: OverlayMode::Hidden,
                position,
                size: button_size,
                pinned: config.always_on_top,
                preview_text: String::new(),
            },
            text: String::new(),
            button_size,
            panel_size: Size::new(config.width, config.height),
            screen_size: Size::new(config.screen_width, config.screen_height),
            floating_position: position,
            previous_mode: OverlayMode::Floating,
            drag_anchor: None,
        }
    }

    pub fn mode(&self) -> OverlayMode {
        self.state.mode
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.mode != OverlayMode::Hidden
    }

    pub fn position(&self) -> Position {
        self.state.position
    }

    pub fn size(&self) -> Size {
        self.state.size
    }

    /// Full text behind the preview
    pub fn text(&self) -> &str {
        &self.text
    }

    fn invalid(&self, trigger: &str) -> LegalEaseError {
        LegalEaseError::InvalidTransition {
            from: self.state.mode.to_string(),
            trigger: trigger.to_string(),
        }
    }

    fn enter(&mut self, mode: OverlayMode) {
        debug!(from = %self.state.mode, to = %mode, "Overlay transition");
        self.state.mode = mode;
    }

    fn apply_frame(&mut self) {
        self.surface.set_frame(self.state.position, self.state.size);
    }

    fn refresh_content(&mut self) {
        self.surface
            .show_content(self.state.mode, &self.state.preview_text);
    }

    /// Show (or update) the overlay with new detected text.
    ///
    /// From `Hidden` this creates the floating button at the last known
    /// position. In any other mode only the preview changes.
    #[instrument(level = "debug", skip(self, text), fields(len = text.len()))]
    pub fn show(&mut self, text: &str) -> Result<OverlayMode> {
        if self.state.mode == OverlayMode::Hidden {
            if !self.surface.has_overlay_permission() {
                let err = LegalEaseError::PermissionDenied(
                    "overlay permission is not granted".to_string(),
                );
                self.dispatcher.publish_error(err.kind(), err.to_string());
                return Err(err);
            }

            let size = self.button_size;
            if let Err(err) = self.surface.create(self.state.position, size) {
                warn!("Failed to create overlay window: {}", err);
                self.dispatcher.publish_error(err.kind(), err.to_string());
                return Err(err);
            }

            self.state.size = size;
            self.floating_position = self.state.position;
            self.surface.set_always_on_top(self.state.pinned);
            self.enter(OverlayMode::Floating);
            info!(x = self.state.position.x, y = self.state.position.y, "Overlay shown");
        }

        self.text = text.to_string();
        self.state.preview_text = truncate_preview(text, self.preview_chars);
        self.refresh_content();
        Ok(self.state.mode)
    }

    /// Release the window. A no-op when already hidden.
    pub fn hide(&mut self) -> OverlayMode {
        if self.state.mode == OverlayMode::Hidden {
            return OverlayMode::Hidden;
        }
        if self.state.mode == OverlayMode::Expanded {
            self.surface.capture_outside_touch(false);
        }
        self.surface.destroy();
        self.drag_anchor = None;
        self.enter(OverlayMode::Hidden);
        OverlayMode::Hidden
    }

    /// Tap on the floating button
    pub fn tap(&mut self) -> Result<OverlayMode> {
        if self.state.mode != OverlayMode::Floating {
            return Err(self.invalid("tap"));
        }
        self.floating_position = self.state.position;
        self.drag_anchor = None;
        self.open_panel();
        Ok(OverlayMode::Expanded)
    }

    // The panel is centered on screen and shrinks to fit it; the button
    // position is kept in `floating_position` for `close_panel`.
    fn open_panel(&mut self) {
        let screen = self.surface.screen_size().unwrap_or(self.screen_size);
        let size = Size::new(
            self.panel_size.width.min(screen.width),
            self.panel_size.height.min(screen.height),
        );
        self.state.size = size;
        self.state.position = Position::new(
            (screen.width - size.width) / 2.0,
            (screen.height - size.height) / 2.0,
        );
        self.enter(OverlayMode::Expanded);
        self.apply_frame();
        self.surface.capture_outside_touch(true);
        self.refresh_content();
        self.dispatcher
            .publish(Notification::OverlayExpanded(OverlayExpandedEvent {
                text: self.text.clone(),
            }));
    }

    fn close_panel(&mut self) {
        self.surface.capture_outside_touch(false);
        self.state.position = self.floating_position;
        self.state.size = self.button_size;
        self.enter(OverlayMode::Floating);
        self.apply_frame();
        self.refresh_content();
    }

    /// Close button on the expanded panel
    pub fn close(&mut self) -> Result<OverlayMode> {
        if self.state.mode != OverlayMode::Expanded {
            return Err(self.invalid("close"));
        }
        self.close_panel();
        Ok(OverlayMode::Floating)
    }

    /// Touch outside the window. Only dismisses the expanded panel; ignored
    /// in every other mode.
    pub fn outside_touch(&mut self) -> OverlayMode {
        if self.state.mode == OverlayMode::Expanded {
            self.close_panel();
        }
        self.state.mode
    }

    pub fn drag_start(&mut self, x: f64, y: f64) -> Result<()> {
        if self.state.mode != OverlayMode::Floating {
            return Err(self.invalid("drag"));
        }
        self.drag_anchor = Some(Position::new(x, y));
        Ok(())
    }

    /// Move by the pointer delta since the last drag event. Ignored without
    /// an active drag.
    pub fn drag_move(&mut self, x: f64, y: f64) -> Position {
        if let Some(anchor) = self.drag_anchor {
            if self.state.mode == OverlayMode::Floating {
                self.move_by(x - anchor.x, y - anchor.y);
                self.drag_anchor = Some(Position::new(x, y));
            }
        }
        self.state.position
    }

    pub fn drag_end(&mut self) {
        self.drag_anchor = None;
    }

    pub fn drag_by(&mut self, dx: f64, dy: f64) -> Result<Position> {
        if self.state.mode != OverlayMode::Floating {
            return Err(self.invalid("drag"));
        }
        self.move_by(dx, dy);
        Ok(self.state.position)
    }

    // No clamping: the button may be dragged off screen.
    fn move_by(&mut self, dx: f64, dy: f64) {
        self.state.position.x += dx;
        self.state.position.y += dy;
        self.floating_position = self.state.position;
        self.apply_frame();
    }

    /// User picked an action in the expanded panel. Hides the overlay and
    /// returns what must be handed to the host application.
    pub fn select_action(&mut self, action: OverlayAction) -> Result<HandoffRequest> {
        if self.state.mode != OverlayMode::Expanded {
            return Err(self.invalid(&format!("select action '{action}'")));
        }
        let request = HandoffRequest {
            text: self.text.clone(),
            action,
        };
        info!(%action, len = request.text.len(), "Overlay action selected");
        self.hide();
        Ok(request)
    }

    /// Shrink to a bar, keeping position and width
    pub fn minimize(&mut self) -> Result<OverlayMode> {
        match self.state.mode {
            OverlayMode::Hidden => Err(self.invalid("minimize")),
            OverlayMode::Minimized => Ok(OverlayMode::Minimized),
            mode => {
                if mode == OverlayMode::Expanded {
                    self.surface.capture_outside_touch(false);
                }
                self.previous_mode = mode;
                self.drag_anchor = None;
                self.state.size.height = self.minimized_height;
                self.enter(OverlayMode::Minimized);
                self.apply_frame();
                self.refresh_content();
                Ok(OverlayMode::Minimized)
            }
        }
    }

    /// Restore the mode that was active before `minimize`
    pub fn expand(&mut self) -> Result<OverlayMode> {
        if self.state.mode != OverlayMode::Minimized {
            return Err(self.invalid("expand"));
        }
        match self.previous_mode {
            OverlayMode::Expanded => self.open_panel(),
            _ => {
                self.state.size = self.button_size;
                self.enter(OverlayMode::Floating);
                self.apply_frame();
                self.refresh_content();
            }
        }
        Ok(self.state.mode)
    }

    /// Move the window. While hidden, the position is kept for the next
    /// show.
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.state.position = Position::new(x, y);
        if self.state.mode != OverlayMode::Expanded {
            self.floating_position = self.state.position;
        }
        if self.is_visible() {
            self.apply_frame();
        }
    }

    /// Resize the window for the current mode. While hidden this sets the
    /// panel size; while minimized only the width applies.
    pub fn set_size(&mut self, width: f64, height: f64) {
        let size = Size::new(width, height);
        match self.state.mode {
            OverlayMode::Hidden => self.panel_size = size,
            OverlayMode::Floating => {
                self.button_size = size;
                self.state.size = size;
            }
            OverlayMode::Expanded => {
                self.panel_size = size;
                self.state.size = size;
            }
            OverlayMode::Minimized => {
                self.button_size.width = width;
                self.panel_size.width = width;
                self.state.size.width = width;
            }
        }
        if self.is_visible() {
            self.apply_frame();
        }
    }

    pub fn set_always_on_top(&mut self, on_top: bool) {
        self.state.pinned = on_top;
        if self.is_visible() {
            self.surface.set_always_on_top(on_top);
        }
    }
}
