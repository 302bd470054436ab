use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadpath_core::domain::assignment::{Assignment, LeadRouteEvent};
use leadpath_core::domain::lead::{LeadId, TenantId};
use leadpath_core::domain::rule::{RoutingRule, RuleId};
use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerType};

pub mod decision;
pub mod memory;
pub mod rule;
pub mod timer;

pub use decision::SqlDecisionRepository;
pub use memory::{InMemoryDecisionRepository, InMemoryRuleRepository, InMemorySlaTimerRepository};
pub use rule::SqlRuleRepository;
pub use timer::SqlSlaTimerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One routing decision as an atomic unit: optional assignment,
/// implied SLA timers, and the route event. All rows commit together
/// or not at all.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDecision {
    pub assignment: Option<Assignment>,
    pub timers: Vec<SlaTimer>,
    pub event: LeadRouteEvent,
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Rules ordered by `(priority ASC, created_at ASC)` — the
    /// evaluation tie-break contract lives in this query.
    async fn list_for_tenant(&self, tenant_id: &TenantId)
        -> Result<Vec<RoutingRule>, RepositoryError>;

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<Option<RoutingRule>, RepositoryError>;

    async fn create(&self, rule: RoutingRule) -> Result<(), RepositoryError>;

    /// Returns false when the rule does not exist for the tenant.
    async fn update(&self, rule: RoutingRule) -> Result<bool, RepositoryError>;

    async fn delete(&self, tenant_id: &TenantId, rule_id: &RuleId)
        -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn record_decision(&self, decision: NewDecision) -> Result<(), RepositoryError>;

    /// Standalone insert for breach-path pond escalation; deliberately
    /// outside the `record_decision` transaction boundary.
    async fn insert_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError>;

    /// Stamps `sla_satisfied_at` on the lead's most recent route event
    /// that matched `rule_id`, so a re-route under a different rule
    /// never steals the stamp from the timer's originating event. With
    /// `None` the lead's most recent event is stamped.
    async fn mark_event_satisfied(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        satisfied_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Stamps `sla_breached_at` and appends the breach reason code to
    /// the lead's most recent route event matching `rule_id` (or the
    /// most recent event overall when `rule_id` is `None`).
    async fn mark_event_breached(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        reason_code: &str,
        breached_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn list_events_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError>;

    async fn list_events_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError>;

    async fn list_assignments_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<Assignment>, RepositoryError>;
}

#[async_trait]
pub trait SlaTimerRepository: Send + Sync {
    /// Pending timers with `due_at <= now`, oldest due first,
    /// optionally scoped to one tenant.
    async fn due_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SlaTimer>, RepositoryError>;

    async fn has_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
    ) -> Result<bool, RepositoryError>;

    /// Conditional transition: only flips timers still `pending`.
    /// Returns false when the timer was already terminal (or missing),
    /// which makes overlapping sweeps update each timer at most once.
    async fn mark_breached(
        &self,
        timer_id: &SlaTimerId,
        breached_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Bulk conditional satisfy for `(tenant, lead, type)`. Returns the
    /// timers that transitioned so the caller can find each one's
    /// originating rule; an empty list is the idempotent no-op.
    async fn satisfy_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
        satisfied_at: DateTime<Utc>,
    ) -> Result<Vec<SlaTimer>, RepositoryError>;

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<SlaTimer>, RepositoryError>;
}
