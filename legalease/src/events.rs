//! Event schema published to the UI layer

use crate::errors::{ErrorKind, LegalEaseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Payload of a `tc_detected` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub text: String,
    pub source_label: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub matched_keywords: BTreeSet<String>,
}

/// Payload of an `overlay_expanded` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayExpandedEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_code: kind.code().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(&self.error_code)
    }
}

/// Everything the dispatcher can deliver, one variant per event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    #[serde(rename = "tc_detected")]
    Detection(DetectionEvent),
    #[serde(rename = "overlay_expanded")]
    OverlayExpanded(OverlayExpandedEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

impl Notification {
    pub fn event_type(&self) -> &'static str {
        match self {
            Notification::Detection(_) => "tc_detected",
            Notification::OverlayExpanded(_) => "overlay_expanded",
            Notification::Error(_) => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, LegalEaseError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate an event arriving from across a process or
    /// language boundary.
    pub fn from_json(json: &str) -> Result<Self, LegalEaseError> {
        let notification: Notification = serde_json::from_str(json)?;
        notification.validate()?;
        Ok(notification)
    }

    pub fn validate(&self) -> Result<(), LegalEaseError> {
        match self {
            Notification::Detection(event) => {
                if event.text.trim().is_empty() {
                    return Err(LegalEaseError::InvalidEvent(
                        "tc_detected event carries no text".to_string(),
                    ));
                }
                if event.timestamp < 0 {
                    return Err(LegalEaseError::InvalidEvent(format!(
                        "tc_detected timestamp {} is negative",
                        event.timestamp
                    )));
                }
            }
            Notification::OverlayExpanded(_) => {}
            Notification::Error(event) => {
                if event.error_code.is_empty() {
                    return Err(LegalEaseError::InvalidEvent(
                        "error event without errorCode".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detection_uses_tagged_wire_shape() {
        let event = Notification::Detection(DetectionEvent {
            text: "Privacy Policy".to_string(),
            source_label: "com.example.app".to_string(),
            timestamp: 1_700_000_000_000,
            matched_keywords: BTreeSet::new(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tc_detected",
                "data": {
                    "text": "Privacy Policy",
                    "sourceLabel": "com.example.app",
                    "timestamp": 1_700_000_000_000i64
                }
            })
        );
    }

    #[test]
    fn error_event_wire_shape() {
        let event = Notification::Error(ErrorEvent::new(
            ErrorKind::PermissionDenied,
            "overlay permission missing",
        ));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["errorCode"], "PERMISSION_DENIED");
        assert!(value["data"].get("details").is_none());
    }

    #[test]
    fn from_json_rejects_unknown_type() {
        let err = Notification::from_json(r#"{"type":"contentChanged","data":{}}"#).unwrap_err();
        assert!(matches!(err, LegalEaseError::InvalidEvent(_)));
    }

    #[test]
    fn from_json_rejects_empty_detection_text() {
        let err = Notification::from_json(
            r#"{"type":"tc_detected","data":{"text":"  ","sourceLabel":"x","timestamp":1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LegalEaseError::InvalidEvent(_)));
    }

    #[test]
    fn from_json_accepts_valid_error_event() {
        let parsed = Notification::from_json(
            r#"{"type":"error","data":{"errorCode":"HANDOFF_FAILED","message":"saved","details":{"url":"legalease://analyze"}}}"#,
        )
        .unwrap();
        match parsed {
            Notification::Error(e) => {
                assert_eq!(e.kind(), Some(ErrorKind::HandoffFailed));
                assert!(e.details.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
