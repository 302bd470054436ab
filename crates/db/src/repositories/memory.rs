//! In-memory repository implementations for engine tests. Behavior
//! mirrors the SQL repositories, including the conditional timer
//! transitions and event ordering.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadpath_core::domain::assignment::{Assignment, LeadRouteEvent};
use leadpath_core::domain::lead::{LeadId, TenantId};
use leadpath_core::domain::rule::{RoutingRule, RuleId};
use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerStatus, SlaTimerType};

use super::{
    DecisionRepository, NewDecision, RepositoryError, RuleRepository, SlaTimerRepository,
};

#[derive(Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<HashMap<String, RoutingRule>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut listed: Vec<RoutingRule> =
            rules.values().filter(|rule| &rule.tenant_id == tenant_id).cloned().collect();
        listed.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(listed)
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<Option<RoutingRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&rule_id.0).filter(|rule| &rule.tenant_id == tenant_id).cloned())
    }

    async fn create(&self, rule: RoutingRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn update(&self, rule: RoutingRule) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        match rules.get(&rule.id.0) {
            Some(existing) if existing.tenant_id == rule.tenant_id => {
                rules.insert(rule.id.0.clone(), rule);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        match rules.get(&rule_id.0) {
            Some(existing) if &existing.tenant_id == tenant_id => {
                rules.remove(&rule_id.0);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct DecisionState {
    assignments: Vec<Assignment>,
    events: Vec<LeadRouteEvent>,
}

#[derive(Clone, Default)]
pub struct InMemoryDecisionRepository {
    state: Arc<RwLock<DecisionState>>,
    timers: InMemorySlaTimerRepository,
}

impl InMemoryDecisionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares timer storage so a `record_decision` makes its timers
    /// visible through the paired timer repository, as the SQL
    /// transaction does.
    pub fn with_timers(timers: InMemorySlaTimerRepository) -> Self {
        Self { state: Arc::new(RwLock::new(DecisionState::default())), timers }
    }

    pub fn timer_repository(&self) -> InMemorySlaTimerRepository {
        self.timers.clone()
    }
}

#[async_trait::async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn record_decision(&self, decision: NewDecision) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(assignment) = decision.assignment {
            state.assignments.push(assignment);
        }
        state.events.push(decision.event);
        drop(state);

        let mut timers = self.timers.timers.write().await;
        for timer in decision.timers {
            timers.insert(timer.id.0.clone(), timer);
        }
        Ok(())
    }

    async fn insert_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.assignments.push(assignment);
        Ok(())
    }

    async fn mark_event_satisfied(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        satisfied_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(event) = state
            .events
            .iter_mut()
            .filter(|event| {
                &event.tenant_id == tenant_id
                    && &event.lead_id == lead_id
                    && rule_id.map_or(true, |rule| event.matched_rule_id.as_ref() == Some(rule))
            })
            .max_by_key(|event| event.created_at)
        {
            if event.sla_satisfied_at.is_none() {
                event.sla_satisfied_at = Some(satisfied_at);
            }
        }
        Ok(())
    }

    async fn mark_event_breached(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        reason_code: &str,
        breached_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(event) = state
            .events
            .iter_mut()
            .filter(|event| {
                &event.tenant_id == tenant_id
                    && &event.lead_id == lead_id
                    && rule_id.map_or(true, |rule| event.matched_rule_id.as_ref() == Some(rule))
            })
            .max_by_key(|event| event.created_at)
        {
            if event.sla_breached_at.is_none() {
                event.sla_breached_at = Some(breached_at);
            }
            if !event.reason_codes.iter().any(|code| code == reason_code) {
                event.reason_codes.push(reason_code.to_string());
            }
        }
        Ok(())
    }

    async fn list_events_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| &event.tenant_id == tenant_id && &event.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn list_events_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.events.iter().filter(|event| &event.tenant_id == tenant_id).cloned().collect())
    }

    async fn list_assignments_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| {
                &assignment.tenant_id == tenant_id && &assignment.person_id == lead_id
            })
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySlaTimerRepository {
    timers: Arc<RwLock<HashMap<String, SlaTimer>>>,
}

impl InMemorySlaTimerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, timer: SlaTimer) {
        let mut timers = self.timers.write().await;
        timers.insert(timer.id.0.clone(), timer);
    }

    pub async fn get(&self, timer_id: &SlaTimerId) -> Option<SlaTimer> {
        let timers = self.timers.read().await;
        timers.get(&timer_id.0).cloned()
    }
}

#[async_trait::async_trait]
impl SlaTimerRepository for InMemorySlaTimerRepository {
    async fn due_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let timers = self.timers.read().await;
        let mut due: Vec<SlaTimer> = timers
            .values()
            .filter(|timer| {
                timer.status == SlaTimerStatus::Pending
                    && timer.due_at <= now
                    && tenant_id.map_or(true, |tenant| &timer.tenant_id == tenant)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn has_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
    ) -> Result<bool, RepositoryError> {
        let timers = self.timers.read().await;
        Ok(timers.values().any(|timer| {
            &timer.tenant_id == tenant_id
                && &timer.lead_id == lead_id
                && timer.timer_type == timer_type
                && timer.status == SlaTimerStatus::Pending
        }))
    }

    async fn mark_breached(
        &self,
        timer_id: &SlaTimerId,
        breached_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut timers = self.timers.write().await;
        match timers.get_mut(&timer_id.0) {
            Some(timer) if timer.status == SlaTimerStatus::Pending => {
                timer.status = SlaTimerStatus::Breached;
                timer.breached_at = Some(breached_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn satisfy_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
        satisfied_at: DateTime<Utc>,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let mut timers = self.timers.write().await;
        let mut flipped = Vec::new();
        for timer in timers.values_mut() {
            if &timer.tenant_id == tenant_id
                && &timer.lead_id == lead_id
                && timer.timer_type == timer_type
                && timer.status == SlaTimerStatus::Pending
            {
                timer.status = SlaTimerStatus::Satisfied;
                timer.satisfied_at = Some(satisfied_at);
                flipped.push(timer.clone());
            }
        }
        Ok(flipped)
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let timers = self.timers.read().await;
        let mut listed: Vec<SlaTimer> =
            timers.values().filter(|timer| &timer.tenant_id == tenant_id).cloned().collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listed)
    }
}
