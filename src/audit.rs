//! Audit trail for configuration changes.
//!
//! Every call to a configuration operation produces one [`AuditEvent`], accepted or not.
//! Format: JSON with timestamp, actor, action, resource, outcome.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::BookError;
use crate::types::AccountId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SetTokenPolicy,
    SetMaxOrdersPerPrice,
}

/// Single audit record: one line of JSON per event.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    /// Unix timestamp (seconds since epoch).
    pub timestamp_secs: u64,
    pub actor: AccountId,
    pub action: AuditAction,
    /// Parameters of the change (item, tick, limits).
    pub resource: serde_json::Value,
    /// "success" or "rejected: <reason>".
    pub outcome: String,
}

impl AuditEvent {
    pub fn now(
        actor: AccountId,
        action: AuditAction,
        resource: serde_json::Value,
        result: &Result<(), BookError>,
    ) -> Self {
        let timestamp_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let outcome = match result {
            Ok(()) => "success".to_string(),
            Err(e) => format!("rejected: {}", e),
        };
        Self {
            timestamp_secs,
            actor,
            action,
            resource,
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == "success"
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Logs one JSON line per event.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            info!("audit {}", line);
        }
    }
}

/// In-memory sink that stores events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemId;

    #[test]
    fn rejected_outcome_carries_reason() {
        let result = Err(BookError::InvalidTick { item_id: ItemId(4) });
        let event = AuditEvent::now(
            AccountId(1),
            AuditAction::SetTokenPolicy,
            serde_json::json!({ "item_id": 4, "tick": 0 }),
            &result,
        );
        assert!(!event.succeeded());
        assert!(event.outcome.contains("tick must be non-zero"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "set_token_policy");
        assert_eq!(json["actor"], 1);
    }

    #[test]
    fn in_memory_sink_shares_buffer() {
        let sink = InMemoryAuditSink::new();
        let clone = sink.clone();
        clone.emit(&AuditEvent::now(
            AccountId(1),
            AuditAction::SetMaxOrdersPerPrice,
            serde_json::json!({ "max_orders_per_price": 5 }),
            &Ok(()),
        ));
        assert_eq!(sink.events().len(), 1);
        assert!(sink.events()[0].succeeded());
    }
}
