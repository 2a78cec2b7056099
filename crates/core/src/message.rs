//! Transport wire message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Timestamp;

/// Recognized message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    VisitorUpdate,
    PerformanceAlert,
    GoalCompletion,
    ErrorReport,
    SystemStatus,
    FormSubmission,
    ResumeDownload,
    SocialMediaClick,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::VisitorUpdate,
        MessageType::PerformanceAlert,
        MessageType::GoalCompletion,
        MessageType::ErrorReport,
        MessageType::SystemStatus,
        MessageType::FormSubmission,
        MessageType::ResumeDownload,
        MessageType::SocialMediaClick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VisitorUpdate => "visitor_update",
            Self::PerformanceAlert => "performance_alert",
            Self::GoalCompletion => "goal_completion",
            Self::ErrorReport => "error_report",
            Self::SystemStatus => "system_status",
            Self::FormSubmission => "form_submission",
            Self::ResumeDownload => "resume_download",
            Self::SocialMediaClick => "social_media_click",
        }
    }
}

/// The unit exchanged over any transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
    pub id: String,
}

impl TransportMessage {
    /// Creates a message with a fresh ID.
    pub fn new(message_type: MessageType, data: serde_json::Value, timestamp: Timestamp) -> Self {
        Self {
            message_type,
            data,
            timestamp,
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Serializes `payload` into the message data.
    pub fn from_payload<T: Serialize>(
        message_type: MessageType,
        payload: &T,
        timestamp: Timestamp,
    ) -> crate::Result<Self> {
        Ok(Self::new(message_type, serde_json::to_value(payload)?, timestamp))
    }

    /// Parses a wire frame. Returns `Ok(None)` for frames with an
    /// unrecognized type (heartbeats and future message kinds).
    pub fn parse(raw: &str) -> crate::Result<Option<Self>> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let known = value
            .get("type")
            .cloned()
            .map(serde_json::from_value::<MessageType>)
            .is_some_and(|t| t.is_ok());
        if !known {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}
