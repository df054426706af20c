//! Payloads handed to the external notification sender.

use serde::{Deserialize, Serialize};

/// Activity category, serialized as the payload's `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Export,
    ExportStart,
    Import,
    Sample,
    Visit,
    Feedback,
    Error,
}

/// One notification payload. Absent fields are omitted from the JSON form.
///
/// # Example
/// ```
/// use engine::activity::{ActivityEvent, ActivityKind};
///
/// let event = ActivityEvent::new(ActivityKind::ExportStart)
///     .with_filename("cut.mp4")
///     .with_duration(12.5);
/// let json = serde_json::to_string(&event).unwrap();
/// assert_eq!(json, r#"{"type":"export_start","filename":"cut.mp4","duration":12.5}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            filename: None,
            file_count: None,
            duration: None,
            contact: None,
            message: None,
            error_message: None,
            stack: None,
        }
    }

    /// Error report carrying the rendered error chain.
    pub fn error(error: &dyn std::error::Error) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            error_message: Some(error.to_string()),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
            ..Self::new(ActivityKind::Error)
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_file_count(mut self, file_count: usize) -> Self {
        self.file_count = Some(file_count);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivityEvent, ActivityKind};
    use crate::error::EngineError;

    #[test]
    fn import_payload_uses_camel_case_fields() {
        let event = ActivityEvent::new(ActivityKind::Import)
            .with_filename("a.mp4")
            .with_file_count(1);

        let json = serde_json::to_value(&event).expect("serialize");

        assert_eq!(
            json,
            serde_json::json!({"type": "import", "filename": "a.mp4", "fileCount": 1})
        );
    }

    #[test]
    fn error_payload_renders_the_source_chain() {
        let error = EngineError::Storage {
            context: "write project record",
            key: "auto_save_v1".to_string(),
            source: std::io::Error::other("disk full"),
        };

        let event = ActivityEvent::error(&error);

        assert_eq!(event.kind, ActivityKind::Error);
        assert_eq!(
            event.error_message.as_deref(),
            Some("write project record: auto_save_v1 (disk full)")
        );
        assert_eq!(event.stack.as_deref(), Some("disk full"));
    }

    #[test]
    fn payload_parses_with_optional_fields_missing() {
        let event: ActivityEvent =
            serde_json::from_str(r#"{"type":"feedback","contact":"me@example.com","message":"hi"}"#)
                .expect("deserialize");

        assert_eq!(event.kind, ActivityKind::Feedback);
        assert_eq!(event.contact.as_deref(), Some("me@example.com"));
        assert_eq!(event.filename, None);
    }
}
