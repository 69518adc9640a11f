//! Session lifecycle events for operator and UI layers.
//!
//! These events are the sole channel through which the core surfaces
//! session state; no notification transport is assumed. Subscribers
//! should respect `timestamp` ordering to handle out-of-order delivery.

use serde::{Deserialize, Serialize};

/// Whether the session routes device traffic through a tunnel or only
/// runs the engine's local SOCKS5 endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Virtual interface plus native tunnel driver.
    Tunneled,
    /// Engine subprocess only, no interface.
    EngineOnly,
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Session event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    /// Session is up: engine spawned and, in tunneled mode, the
    /// interface established.
    Started {
        mode: SessionMode,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// The watchdog replaced a silently failed engine or interface;
    /// the session is up again without an intervening `Stopped`.
    Resumed {
        mode: SessionMode,
        timestamp: u64,
    },

    /// Session has been torn down.
    Stopped { timestamp: u64 },

    /// A start attempt failed before the session came up.
    Failed { reason: String, timestamp: u64 },

    /// A coalesced batch of engine output lines.
    LogBatch { lines: Vec<String>, timestamp: u64 },
}

impl SessionEvent {
    pub fn started(mode: SessionMode) -> Self {
        Self::Started {
            mode,
            timestamp: now_ms(),
        }
    }

    pub fn resumed(mode: SessionMode) -> Self {
        Self::Resumed {
            mode,
            timestamp: now_ms(),
        }
    }

    pub fn stopped() -> Self {
        Self::Stopped {
            timestamp: now_ms(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            timestamp: now_ms(),
        }
    }

    pub fn log_batch(lines: Vec<String>) -> Self {
        Self::LogBatch {
            lines,
            timestamp: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_event_serialization() {
        let event = SessionEvent::started(SessionMode::Tunneled);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"started\""));
        assert!(json.contains("\"mode\":\"tunneled\""));
    }

    #[test]
    fn log_batch_carries_lines() {
        let event = SessionEvent::log_batch(vec!["a".into(), "b".into()]);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"logbatch\""));
        assert!(json.contains("\"lines\":[\"a\",\"b\"]"));
    }

    #[test]
    fn resumed_event_serialization() {
        let event = SessionEvent::resumed(SessionMode::EngineOnly);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"resumed\""));
        assert!(json.contains("\"mode\":\"engineonly\""));
    }

    #[test]
    fn failed_event_roundtrip() {
        let event = SessionEvent::failed("spawn refused");
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        match back {
            SessionEvent::Failed { reason, .. } => assert_eq!(reason, "spawn refused"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
