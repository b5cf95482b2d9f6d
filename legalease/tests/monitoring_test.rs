use legalease::{
    spawn_ui_context, ErrorKind, HeadlessSurface, MemoryClipboard, Notification, OverlayMode,
    OverlayWindowController, ScanSession, ScannerConfig, SnapshotEngine, UIElementAttributes,
    UINode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

fn terms_screen() -> UINode {
    UINode::new(UIElementAttributes::new("window").with_title("Create account")).with_child(
        UINode::new(UIElementAttributes::new("link").with_value("Terms and Conditions")),
    )
}

async fn next(rx: &mut UnboundedReceiver<Notification>) -> Option<Notification> {
    timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn content_change_produces_detection() {
    let engine = Arc::new(SnapshotEngine::new());
    let session = ScanSession::new(engine.clone(), ScannerConfig::default()).unwrap();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(session.start_monitoring());
    assert!(session.is_monitoring());
    engine.set_snapshot("com.example.signup", terms_screen());

    match next(&mut rx).await {
        Some(Notification::Detection(event)) => {
            assert_eq!(event.source_label, "com.example.signup");
            assert!(event.matched_keywords.contains("terms and conditions"));
        }
        other => panic!("unexpected {other:?}"),
    }
    session.stop_monitoring();
}

#[tokio::test]
async fn missing_permission_fails_start_with_error_event() {
    let engine = Arc::new(SnapshotEngine::new());
    engine.set_permission(false);
    let session = ScanSession::new(engine, ScannerConfig::default()).unwrap();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(!session.start_monitoring());
    assert!(!session.is_monitoring());
    match rx.try_recv() {
        Ok(Notification::Error(e)) => assert_eq!(e.kind(), Some(ErrorKind::PermissionDenied)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn nothing_is_delivered_after_stop() {
    let engine = Arc::new(SnapshotEngine::new());
    let session = ScanSession::new(engine.clone(), ScannerConfig::default()).unwrap();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(session.start_monitoring());
    session.stop_monitoring();
    assert!(!session.is_monitoring());

    engine.set_snapshot("com.example.signup", terms_screen());
    // The subscriber was dropped by stop, so the channel closes empty
    assert!(next(&mut rx).await.is_none());
    assert!(session.last_detection().is_none());
}

#[tokio::test]
async fn restart_resets_detection_state() {
    let engine = Arc::new(SnapshotEngine::new());
    let session = ScanSession::new(engine.clone(), ScannerConfig::default()).unwrap();

    let (_sub, mut rx) = session.dispatcher().subscribe_channel();
    assert!(session.start_monitoring());
    engine.set_snapshot("app", terms_screen());
    assert!(matches!(next(&mut rx).await, Some(Notification::Detection(_))));
    session.stop_monitoring();

    // Same text right away: suppressed within a session, fresh after restart
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();
    assert!(session.start_monitoring());
    engine.set_snapshot("app", terms_screen());
    assert!(matches!(next(&mut rx).await, Some(Notification::Detection(_))));
    session.stop_monitoring();
}

#[tokio::test]
async fn clipboard_changes_feed_the_same_pipeline() {
    let engine = Arc::new(SnapshotEngine::new());
    let clipboard = MemoryClipboard::new();
    clipboard.set_text("Terms of Service copied earlier");

    let config = ScannerConfig {
        clipboard_poll_ms: 10,
        ..Default::default()
    };
    let session = ScanSession::new(engine, config)
        .unwrap()
        .with_clipboard(clipboard.clone());
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(session.start_monitoring());
    // Let the poller record the existing content
    tokio::time::sleep(Duration::from_millis(50)).await;
    clipboard.set_text("Our Privacy Policy explains how we use your information");

    match next(&mut rx).await {
        Some(Notification::Detection(event)) => {
            assert_eq!(event.source_label, "clipboard");
            assert!(event.text.starts_with("Our Privacy Policy"));
        }
        other => panic!("unexpected {other:?}"),
    }
    session.stop_monitoring();
}

#[tokio::test]
async fn disabled_clipboard_is_not_polled() {
    let clipboard = MemoryClipboard::new();
    let config = ScannerConfig {
        clipboard_poll_ms: 10,
        clipboard_enabled: false,
        ..Default::default()
    };
    let session = ScanSession::new(Arc::new(SnapshotEngine::new()), config)
        .unwrap()
        .with_clipboard(clipboard.clone());
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(session.start_monitoring());
    tokio::time::sleep(Duration::from_millis(30)).await;
    clipboard.set_text("Privacy Policy");
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "clipboard text must not be scanned when polling is disabled"
    );
    session.stop_monitoring();
}

#[tokio::test]
async fn start_hides_an_overlay_left_visible() {
    let session = ScanSession::new(Arc::new(SnapshotEngine::new()), ScannerConfig::default()).unwrap();
    let controller = OverlayWindowController::new(
        Box::new(HeadlessSurface::new()),
        session.dispatcher().clone(),
        &session.config().overlay,
        session.config().preview_chars,
    );
    let (overlay, _task) = spawn_ui_context(controller, None);
    let (_sub, _events) = session.attach_overlay(overlay.clone());

    assert_eq!(overlay.show("Privacy Policy").await.unwrap(), OverlayMode::Floating);
    assert!(session.start_monitoring());
    assert_eq!(overlay.mode().await.unwrap(), OverlayMode::Hidden);
    session.stop_monitoring();
}

#[test]
fn start_outside_runtime_reports_internal_error() {
    let session = ScanSession::new(Arc::new(SnapshotEngine::new()), ScannerConfig::default()).unwrap();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();

    assert!(!session.start_monitoring());
    assert!(!session.is_monitoring());
    match rx.try_recv() {
        Ok(Notification::Error(e)) => assert_eq!(e.kind(), Some(ErrorKind::Internal)),
        other => panic!("unexpected {other:?}"),
    }
}
