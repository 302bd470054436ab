//! Outbox publisher contract. The engine hands finished decisions to an
//! `EventPublisher` after commit; delivery mechanics live elsewhere.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadpath_core::domain::lead::{LeadId, TenantId};

pub mod event_names {
    pub const ASSIGNED: &str = "lead-routing.assigned";
    pub const SLA_BREACHED: &str = "lead-routing.sla.breached";
    pub const SLA_SATISFIED: &str = "lead-routing.sla.satisfied";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    pub name: String,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Fire-and-forget enqueue. Implementations must not block the
/// decision path; a failed publish is the publisher's problem, never
/// the engine's.
pub trait EventPublisher: Send + Sync {
    fn enqueue(&self, event: DomainEvent);
}

#[derive(Default)]
pub struct InMemoryPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn drain(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventPublisher for InMemoryPublisher {
    fn enqueue(&self, event: DomainEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Emits every event as a structured log line. Suits deployments with
/// no outbox consumer yet: breaches and assignments still land in the
/// log stream instead of vanishing.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingPublisher;

impl TracingPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl EventPublisher for TracingPublisher {
    fn enqueue(&self, event: DomainEvent) {
        tracing::info!(
            event_name = "outbox.published",
            name = %event.name,
            event_id = %event.id,
            tenant_id = %event.tenant_id.0,
            lead_id = %event.lead_id.0,
            occurred_at = %event.occurred_at.to_rfc3339(),
            payload = %event.payload,
            "domain event published",
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadpath_core::domain::lead::{LeadId, TenantId};

    use super::{event_names, DomainEvent, EventPublisher, InMemoryPublisher, TracingPublisher};

    #[test]
    fn in_memory_publisher_records_and_drains() {
        let publisher = InMemoryPublisher::new();
        publisher.enqueue(DomainEvent {
            id: "evt-1".to_string(),
            name: event_names::ASSIGNED.to_string(),
            tenant_id: TenantId("t-1".to_string()),
            lead_id: LeadId("lead-1".to_string()),
            occurred_at: Utc::now(),
            payload: serde_json::json!({"agent_id": "a1"}),
        });

        assert_eq!(publisher.events().len(), 1);
        assert_eq!(publisher.drain().len(), 1);
        assert!(publisher.events().is_empty());
    }

    #[test]
    fn tracing_publisher_never_blocks_the_caller() {
        let publisher = TracingPublisher::new();
        // No subscriber installed: the enqueue must still be a no-op
        // rather than an error.
        publisher.enqueue(DomainEvent {
            id: "evt-1".to_string(),
            name: event_names::SLA_BREACHED.to_string(),
            tenant_id: TenantId("t-1".to_string()),
            lead_id: LeadId("lead-1".to_string()),
            occurred_at: Utc::now(),
            payload: serde_json::json!({"timer_type": "first_touch"}),
        });
    }
}
