use crate::config::ScannerConfig;
use crate::element::{UIElementAttributes, UINode};
use crate::events::Notification;
use crate::keywords::KeywordCorpus;
use crate::platforms::SnapshotEngine;
use crate::session::ScanSession;
use crate::walker::ScanResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn session() -> ScanSession {
    ScanSession::new(Arc::new(SnapshotEngine::new()), ScannerConfig::default()).unwrap()
}

fn scan(session: &ScanSession, text: &str, label: &str, at: Instant) -> ScanResult {
    ScanResult::from_text(text, session.matcher(), label, at)
}

#[test]
fn non_matching_text_never_commits_state() {
    let session = session();
    let start = Instant::now();

    let result = scan(&session, "Welcome back!", "app", start);
    assert!(session.process_scan(&result, start).is_none());

    let state = session.detection_state();
    assert_eq!(state.last_timestamp, None);
    assert!(state.last_text.is_empty());
}

#[test]
fn cooldown_is_shared_across_sources() {
    let session = session();
    let start = Instant::now();

    let first = scan(&session, "Privacy Policy", "com.example", start);
    assert!(session.process_scan(&first, start).is_some());

    let at = start + Duration::from_millis(2000);
    let clipboard = scan(&session, "Terms of Use apply", "clipboard", at);
    assert!(session.process_scan(&clipboard, at).is_none());

    let later = start + Duration::from_millis(5000);
    let clipboard = scan(&session, "Terms of Use apply", "clipboard", later);
    let event = session.process_scan(&clipboard, later).unwrap();
    assert_eq!(event.source_label, "clipboard");
}

#[test]
fn accepted_detection_is_published_and_cached() {
    let session = session();
    let (_subscription, mut rx) = session.dispatcher().subscribe_channel();
    let start = Instant::now();

    let result = scan(&session, "Read the End User License Agreement", "installer", start);
    let event = session.process_scan(&result, start).unwrap();
    assert!(event.matched_keywords.contains("end user license agreement"));
    assert!(event.matched_keywords.contains("license agreement"));

    match rx.try_recv() {
        Ok(Notification::Detection(delivered)) => assert_eq!(delivered, event),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.last_detection(), Some(event));
}

#[test]
fn custom_corpus_replaces_default() {
    let session = session()
        .with_corpus(KeywordCorpus::new(["house rules"]).unwrap())
        .unwrap();
    let start = Instant::now();

    let ignored = scan(&session, "Privacy Policy", "app", start);
    assert!(session.process_scan(&ignored, start).is_none());

    let matched = scan(&session, "Please follow the House Rules", "app", start);
    assert!(session.process_scan(&matched, start).is_some());
}

#[test]
fn cooldown_comes_from_config() {
    let config = ScannerConfig {
        cooldown_ms: 100,
        ..Default::default()
    };
    let session = ScanSession::new(Arc::new(SnapshotEngine::new()), config).unwrap();
    let start = Instant::now();

    let first = scan(&session, "Privacy Policy", "app", start);
    assert!(session.process_scan(&first, start).is_some());

    let at = start + Duration::from_millis(150);
    let second = scan(&session, "Privacy Notice", "app", at);
    assert!(session.process_scan(&second, at).is_some());
}

#[test]
fn extract_current_text_reports_missing_focus_and_permission() {
    let engine = Arc::new(SnapshotEngine::new());
    let session = ScanSession::new(engine.clone(), ScannerConfig::default()).unwrap();

    let err = session.extract_current_text().unwrap_err();
    assert_eq!(err.kind(), crate::errors::ErrorKind::ExtractionFailed);

    engine.set_snapshot(
        "com.example.shop",
        UINode::new(UIElementAttributes::new("window").with_title("Checkout")),
    );
    assert_eq!(session.extract_current_text().unwrap(), "Checkout");
    assert_eq!(session.get_current_source_label(), "com.example.shop");

    engine.set_permission(false);
    let err = session.extract_current_text().unwrap_err();
    assert_eq!(err.kind(), crate::errors::ErrorKind::PermissionDenied);

    session.request_scanning_permission().unwrap();
    assert_eq!(engine.permission_requests(), 1);
}

#[test]
fn scan_finishing_after_stop_is_discarded() {
    let session = session();
    let (_subscription, mut rx) = session.dispatcher().subscribe_channel();
    let token = CancellationToken::new();
    token.cancel();
    let start = Instant::now();

    let result = scan(&session, "Privacy Policy", "app", start);
    assert!(session.process_scan_until(&result, start, &token).is_none());

    let state = session.detection_state();
    assert_eq!(state.last_timestamp, None);
    assert!(state.last_text.is_empty());
    assert!(rx.try_recv().is_err());
    assert!(session.last_detection().is_none());

    // The same scan on a live token goes through
    let live = CancellationToken::new();
    assert!(session.process_scan_until(&result, start, &live).is_some());
}

#[test]
fn focused_element_and_window_title_are_reported_apart_from_label() {
    let engine = Arc::new(SnapshotEngine::new());
    let session = ScanSession::new(engine.clone(), ScannerConfig::default()).unwrap();

    engine.set_snapshot(
        "com.example.browser",
        UINode::new(UIElementAttributes::new("window").with_title("Sign up"))
            .with_child(UINode::new(UIElementAttributes::new("link").with_value("Privacy Policy"))),
    );
    engine.set_focused(UIElementAttributes::new("link").with_value("Privacy Policy"));

    let focused = session.get_focused_element().unwrap();
    assert_eq!(focused.role, "link");
    assert_eq!(session.get_current_window_title().as_deref(), Some("Sign up"));

    let result = session.extract_current_content().unwrap();
    assert_eq!(result.source_label, "com.example.browser");
    assert_eq!(result.window_title.as_deref(), Some("Sign up"));

    engine.set_permission(false);
    let err = session.get_focused_element().unwrap_err();
    assert_eq!(err.kind(), crate::errors::ErrorKind::PermissionDenied);
}
