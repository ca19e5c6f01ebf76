use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    /// Wall time the hook ran for, when the event closes an invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Create an entry stamped with a fresh UUID v4 and the current UTC time.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionStarted,
    SessionStopped,
    ScriptLoaded,
    RequestHookCompleted,
    RequestHookFailed,
    /// The request was never sent upstream.
    ExchangeAborted,
    ResponseHookCompleted,
    ResponseHookFailed,
    /// The client received the unmodified upstream response.
    ResponseFallback,
}

/// Where it happened: the component and, for hook events, the exchange and
/// hook involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<uuid::Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

impl AuditSource {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            session_id: None,
            exchange_id: None,
            hook: None,
        }
    }

    pub fn exchange(mut self, session_id: uuid::Uuid, exchange_id: u64) -> Self {
        self.session_id = Some(session_id);
        self.exchange_id = Some(exchange_id);
        self
    }

    pub fn hook(mut self, name: impl Into<String>) -> Self {
        self.hook = Some(name.into());
        self
    }
}
