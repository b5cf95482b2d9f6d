//! End-to-end detection scenarios: tree -> walker -> matcher -> debouncer
//! -> dispatcher -> overlay.

use legalease::{
    spawn_ui_context, DetectionDebouncer, HeadlessSurface, KeywordCorpus, Notification,
    OverlayMode, OverlayWindowController, ScanSession, ScannerConfig, SnapshotEngine,
    TextTreeWalker, UIElementAttributes, UINode,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn screen(text: &str) -> UINode {
    UINode::new(UIElementAttributes::new("window").with_title("Sign in")).with_child(
        UINode::new(UIElementAttributes::new("text").with_value(text)),
    )
}

fn privacy_session() -> ScanSession {
    ScanSession::new(Arc::new(SnapshotEngine::new()), ScannerConfig::default())
        .unwrap()
        .with_corpus(KeywordCorpus::new(["privacy policy"]).unwrap())
        .unwrap()
}

fn scan_at(session: &ScanSession, text: &str, at: Instant) -> legalease::ScanResult {
    let (fragments, _) = TextTreeWalker::default().walk(screen(text).into_element());
    legalease::ScanResult::build(fragments, session.matcher(), "com.example.app", at)
}

#[tokio::test]
async fn first_matching_scan_emits_detection() {
    let session = privacy_session();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();
    let t0 = Instant::now();

    let result = scan_at(&session, "Please read our Privacy Policy before continuing.", t0);
    assert!(result.has_match());
    assert_eq!(
        result.matched_keywords.iter().collect::<Vec<_>>(),
        vec!["privacy policy"]
    );

    let event = session.process_scan(&result, t0).expect("first scan emits");
    assert_eq!(
        event.text,
        "Sign in Please read our Privacy Policy before continuing."
    );
    assert!(matches!(rx.try_recv(), Ok(Notification::Detection(_))));
}

#[tokio::test]
async fn repeat_within_cooldown_is_suppressed() {
    let session = privacy_session();
    let (_sub, mut rx) = session.dispatcher().subscribe_channel();
    let t0 = Instant::now();
    let text = "Please read our Privacy Policy before continuing.";

    assert!(session.process_scan(&scan_at(&session, text, t0), t0).is_some());
    let t1 = t0 + Duration::from_millis(1000);
    assert!(session.process_scan(&scan_at(&session, text, t1), t1).is_none());

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn identical_text_never_emits_twice() {
    let session = privacy_session();
    let t0 = Instant::now();
    let text = "Our Privacy Policy has changed";

    assert!(session.process_scan(&scan_at(&session, text, t0), t0).is_some());
    let much_later = t0 + Duration::from_secs(3600);
    assert!(session
        .process_scan(&scan_at(&session, text, much_later), much_later)
        .is_none());
}

#[tokio::test]
async fn non_matching_text_does_not_touch_overlay() {
    let session = privacy_session();
    let surface = HeadlessSurface::new();
    let controller = OverlayWindowController::new(
        Box::new(surface.clone()),
        session.dispatcher().clone(),
        &session.config().overlay,
        session.config().preview_chars,
    );
    let (overlay, _task) = spawn_ui_context(controller, None);
    let (_sub, _events) = session.attach_overlay(overlay.clone());
    let t0 = Instant::now();

    let first = scan_at(&session, "Please read our Privacy Policy before continuing.", t0);
    session.process_scan(&first, t0).unwrap();
    assert_eq!(overlay.mode().await.unwrap(), OverlayMode::Floating);
    overlay.hide().await.unwrap();
    surface.clear_calls();

    let t2 = t0 + Duration::from_millis(6000);
    let welcome = scan_at(&session, "Welcome back!", t2);
    // Cooldown expired and text changed, so the debouncer alone would allow it
    assert!(DetectionDebouncer
        .should_emit(&welcome.full_text, t2, &session.detection_state())
        .is_emit());
    assert!(session.process_scan(&welcome, t2).is_none());

    assert_eq!(overlay.mode().await.unwrap(), OverlayMode::Hidden);
    assert!(surface.calls().is_empty());
}

#[tokio::test]
async fn detection_drives_overlay_through_tap_and_outside_touch() {
    let session = privacy_session();
    let controller = OverlayWindowController::new(
        Box::new(HeadlessSurface::new()),
        session.dispatcher().clone(),
        &session.config().overlay,
        session.config().preview_chars,
    );
    let (overlay, _task) = spawn_ui_context(controller, None);
    let (_sub, mut events) = session.attach_overlay(overlay.clone());
    assert_eq!(overlay.mode().await.unwrap(), OverlayMode::Hidden);

    let t0 = Instant::now();
    session
        .process_scan(&scan_at(&session, "Privacy Policy", t0), t0)
        .unwrap();
    assert_eq!(overlay.mode().await.unwrap(), OverlayMode::Floating);

    assert_eq!(overlay.tap().await.unwrap(), OverlayMode::Expanded);
    assert_eq!(overlay.outside_touch().await.unwrap(), OverlayMode::Floating);

    // The host UI saw the detection and the expansion, in that order
    assert!(matches!(events.recv().await, Some(Notification::Detection(_))));
    match events.recv().await {
        Some(Notification::OverlayExpanded(e)) => assert_eq!(e.text, "Sign in Privacy Policy"),
        other => panic!("unexpected {other:?}"),
    }
}
