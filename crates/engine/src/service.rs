use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use leadpath_core::clock::Clock;
use leadpath_core::domain::assignment::{
    reason_codes, Assignment, AssignmentId, AssignmentReason, LeadRouteEvent, LeadRouteEventId,
    RouteCandidate,
};
use leadpath_core::domain::candidate::{AgentId, CandidateSnapshot, CandidateStatus, TeamId};
use leadpath_core::domain::lead::{Lead, LeadId, ListingContext, RoutingContext, TenantId};
use leadpath_core::domain::rule::{ParsedRule, RoutingRule, RuleId, RuleMode};
use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerStatus, SlaTimerType};
use leadpath_core::errors::{ApplicationError, DomainError};
use leadpath_core::metrics::{aggregate, RoutingMetrics, TimerStats};
use leadpath_core::rules::evaluate;
use leadpath_core::scorer::{score, ScoringWeights};
use leadpath_core::snapshot::build_candidate_snapshots;
use leadpath_core::strategy::{self, SelectionOutcome};

use leadpath_db::repositories::{
    DecisionRepository, NewDecision, RepositoryError, RuleRepository, SlaTimerRepository,
};

use crate::outbox::{event_names, DomainEvent, EventPublisher};
use crate::providers::{ConsentProvider, RosterProvider, TenantContextProvider};

/// Everything `assign` decided, already committed when returned.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteAssignmentResult {
    pub event: LeadRouteEvent,
    pub assignment: Option<Assignment>,
    pub timers: Vec<SlaTimer>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SatisfyReport {
    pub updated: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapacityRow {
    pub agent_id: AgentId,
    pub full_name: String,
    pub team_id: Option<TeamId>,
    pub active_pipeline: u32,
    pub capacity_remaining: u32,
    pub gating_reasons: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlaDashboard {
    pub first_touch: TimerStats,
    pub kept_appointment: TimerStats,
    /// Pending timers, soonest due first.
    pub pending: Vec<SlaTimer>,
}

pub struct RoutingEngine {
    clock: Arc<dyn Clock>,
    rules: Arc<dyn RuleRepository>,
    decisions: Arc<dyn DecisionRepository>,
    timers: Arc<dyn SlaTimerRepository>,
    tenants: Arc<dyn TenantContextProvider>,
    consent: Arc<dyn ConsentProvider>,
    roster: Arc<dyn RosterProvider>,
    publisher: Arc<dyn EventPublisher>,
    weights: ScoringWeights,
    sweep_batch_limit: u32,
}

impl RoutingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        rules: Arc<dyn RuleRepository>,
        decisions: Arc<dyn DecisionRepository>,
        timers: Arc<dyn SlaTimerRepository>,
        tenants: Arc<dyn TenantContextProvider>,
        consent: Arc<dyn ConsentProvider>,
        roster: Arc<dyn RosterProvider>,
        publisher: Arc<dyn EventPublisher>,
        weights: ScoringWeights,
        sweep_batch_limit: u32,
    ) -> Self {
        Self {
            clock,
            rules,
            decisions,
            timers,
            tenants,
            consent,
            roster,
            publisher,
            weights,
            sweep_batch_limit,
        }
    }

    /// Routes one lead. Exactly one `LeadRouteEvent` is recorded per
    /// call, including no-match outcomes; an unknown tenant fails the
    /// call before anything is written. A single `now` from the clock
    /// feeds the context, timer due dates, and every timestamp.
    pub async fn assign(
        &self,
        tenant_id: &TenantId,
        lead: Lead,
        listing: Option<ListingContext>,
    ) -> Result<RouteAssignmentResult, ApplicationError> {
        let now = self.clock.now();
        let tenant = self.tenants.tenant_context(tenant_id).await?;
        let consent = self.consent.consent_state(tenant_id, &lead.id).await?;
        let quiet_hours = tenant.in_quiet_hours(now);

        let context = RoutingContext {
            tenant_id: tenant_id.clone(),
            lead,
            listing,
            consent,
            quiet_hours,
            now,
        };

        let roster = self.roster.roster(tenant_id).await?;
        let tours = self.roster.tour_history(tenant_id).await?;
        let candidates = build_candidate_snapshots(
            &roster,
            &tours,
            context.listing.as_ref(),
            consent.any_granted(),
            tenant.messaging_ready,
        );

        let tenant_rules = self.rules.list_for_tenant(tenant_id).await.map_err(persistence)?;
        let outcome = evaluate(&tenant_rules, &context);
        let mut event_reasons = outcome.parse_failure_codes();
        let audit = candidate_audit(&candidates, &self.weights);
        let payload_json = encode_payload(&context)?;

        // A matched first_match rule whose target walk fills nothing
        // and names no pond or fallback team does not end routing:
        // the walk cascades to the next matching rule. Only when every
        // match is exhausted does the first one carry the forced
        // fallback event. A score_and_assign rule is always terminal,
        // even with an empty pool.
        let mut chosen: Option<(ParsedRule, SelectionOutcome)> = None;
        let mut first_exhausted: Option<(ParsedRule, SelectionOutcome)> = None;
        for parsed in outcome.matches {
            let selection = strategy::select(&parsed, &candidates, &self.weights, &context);
            let unfillable = parsed.rule.mode == RuleMode::FirstMatch
                && selection.agent_id.is_none()
                && selection.fallback_team_id.is_none();
            if unfillable {
                if first_exhausted.is_none() {
                    first_exhausted = Some((parsed, selection));
                }
                continue;
            }
            chosen = Some((parsed, selection));
            break;
        }

        let result = match chosen.or(first_exhausted) {
            None => {
                event_reasons.push(reason_codes::NO_RULE_MATCH.to_string());
                let event = LeadRouteEvent {
                    id: LeadRouteEventId(Uuid::new_v4().to_string()),
                    tenant_id: tenant_id.clone(),
                    lead_id: context.lead.id.clone(),
                    matched_rule_id: None,
                    mode: RuleMode::FirstMatch,
                    payload_json,
                    candidates: audit,
                    assigned_agent_id: None,
                    fallback_used: true,
                    reason_codes: event_reasons,
                    sla_due_at: None,
                    sla_satisfied_at: None,
                    sla_breached_at: None,
                    actor_user_id: None,
                    created_at: now,
                };
                RouteAssignmentResult { event, assignment: None, timers: Vec::new() }
            }
            Some((parsed, selection)) => {
                event_reasons.extend(selection.reason_codes.iter().cloned());

                let assignment = if selection.agent_id.is_some()
                    || selection.fallback_team_id.is_some()
                {
                    let (score_value, reasons) = match &selection.selected_score {
                        Some(agent_score) => (
                            agent_score.score,
                            agent_score
                                .reasons
                                .iter()
                                .map(|reason| AssignmentReason {
                                    reason_type: reason.reason_type.as_str().to_string(),
                                    description: reason.description.clone(),
                                    weight: reason.weight,
                                })
                                .collect(),
                        ),
                        None => (
                            0.0,
                            selection
                                .reason_codes
                                .iter()
                                .map(|code| AssignmentReason {
                                    reason_type: code.clone(),
                                    description: "routed to pond fallback".to_string(),
                                    weight: 0.0,
                                })
                                .collect(),
                        ),
                    };
                    Some(Assignment {
                        id: AssignmentId(Uuid::new_v4().to_string()),
                        tenant_id: tenant_id.clone(),
                        person_id: context.lead.id.clone(),
                        agent_id: selection.agent_id.clone(),
                        team_id: selection.fallback_team_id.clone(),
                        score: score_value,
                        reasons,
                        created_at: now,
                    })
                } else {
                    None
                };

                let mut timers = Vec::new();
                for (timer_type, minutes) in [
                    (SlaTimerType::FirstTouch, parsed.rule.sla_first_touch_minutes),
                    (SlaTimerType::KeptAppointment, parsed.rule.sla_kept_appointment_minutes),
                ] {
                    let Some(minutes) = minutes else { continue };
                    if minutes <= 0 {
                        continue;
                    }
                    let already_pending = self
                        .timers
                        .has_pending(tenant_id, &context.lead.id, timer_type)
                        .await
                        .map_err(persistence)?;
                    if already_pending {
                        continue;
                    }
                    timers.push(SlaTimer {
                        id: SlaTimerId(Uuid::new_v4().to_string()),
                        tenant_id: tenant_id.clone(),
                        lead_id: context.lead.id.clone(),
                        rule_id: Some(parsed.rule.id.clone()),
                        assigned_agent_id: selection.agent_id.clone(),
                        timer_type,
                        status: SlaTimerStatus::Pending,
                        due_at: now + Duration::minutes(minutes),
                        satisfied_at: None,
                        breached_at: None,
                        created_at: now,
                    });
                }

                let event = LeadRouteEvent {
                    id: LeadRouteEventId(Uuid::new_v4().to_string()),
                    tenant_id: tenant_id.clone(),
                    lead_id: context.lead.id.clone(),
                    matched_rule_id: Some(parsed.rule.id.clone()),
                    mode: parsed.rule.mode,
                    payload_json,
                    candidates: audit,
                    assigned_agent_id: selection.agent_id.clone(),
                    fallback_used: selection.used_fallback,
                    reason_codes: event_reasons,
                    sla_due_at: timers.iter().map(|timer| timer.due_at).min(),
                    sla_satisfied_at: None,
                    sla_breached_at: None,
                    actor_user_id: None,
                    created_at: now,
                };
                RouteAssignmentResult { event, assignment, timers }
            }
        };

        self.decisions
            .record_decision(NewDecision {
                assignment: result.assignment.clone(),
                timers: result.timers.clone(),
                event: result.event.clone(),
            })
            .await
            .map_err(persistence)?;

        match &result.assignment {
            Some(assignment) => {
                self.publisher.enqueue(DomainEvent {
                    id: Uuid::new_v4().to_string(),
                    name: event_names::ASSIGNED.to_string(),
                    tenant_id: tenant_id.clone(),
                    lead_id: result.event.lead_id.clone(),
                    occurred_at: now,
                    payload: serde_json::json!({
                        "assignment_id": assignment.id.0,
                        "agent_id": assignment.agent_id.as_ref().map(|agent| agent.0.clone()),
                        "team_id": assignment.team_id.as_ref().map(|team| team.0.clone()),
                        "reason_codes": result.event.reason_codes,
                    }),
                });
                info!(
                    event_name = "routing.assigned",
                    tenant_id = %tenant_id.0,
                    lead_id = %result.event.lead_id.0,
                    agent_id = assignment.agent_id.as_ref().map(|agent| agent.0.as_str()),
                    team_id = assignment.team_id.as_ref().map(|team| team.0.as_str()),
                    fallback_used = result.event.fallback_used,
                    "lead routed",
                );
            }
            None => {
                warn!(
                    event_name = "routing.no_match",
                    tenant_id = %tenant_id.0,
                    lead_id = %result.event.lead_id.0,
                    reason_codes = ?result.event.reason_codes,
                    "no assignment produced",
                );
            }
        }

        Ok(result)
    }

    /// One sweep pass over due pending timers. Per-timer failures are
    /// logged and skipped; the timer stays pending for the next pass.
    pub async fn process_sla_timers(
        &self,
        tenant_id: Option<&TenantId>,
    ) -> Result<SweepReport, ApplicationError> {
        let now = self.clock.now();
        let due = self
            .timers
            .due_pending(tenant_id, now, self.sweep_batch_limit)
            .await
            .map_err(persistence)?;

        let mut processed = 0;
        for timer in due {
            match self.breach_timer(&timer, now).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(error) => {
                    error!(
                        event_name = "sla.sweep_failed",
                        tenant_id = %timer.tenant_id.0,
                        timer_id = %timer.id.0,
                        %error,
                        "timer left pending for next sweep",
                    );
                }
            }
        }

        Ok(SweepReport { processed })
    }

    async fn breach_timer(
        &self,
        timer: &SlaTimer,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        // Lost the race against another sweep or a satisfy signal.
        if !self.timers.mark_breached(&timer.id, now).await.map_err(persistence)? {
            return Ok(false);
        }

        // The stamp belongs on the route event that started this
        // timer, not on whatever event a later re-route appended.
        let reason_code = timer.timer_type.breach_reason_code();
        self.decisions
            .mark_event_breached(
                &timer.tenant_id,
                &timer.lead_id,
                timer.rule_id.as_ref(),
                reason_code,
                now,
            )
            .await
            .map_err(persistence)?;

        if let Some(team_id) = self.breach_fallback_team(timer).await? {
            let assignment = Assignment {
                id: AssignmentId(Uuid::new_v4().to_string()),
                tenant_id: timer.tenant_id.clone(),
                person_id: timer.lead_id.clone(),
                agent_id: None,
                team_id: Some(team_id),
                score: 0.0,
                reasons: vec![AssignmentReason {
                    reason_type: reason_codes::TEAM_POND.to_string(),
                    description: format!(
                        "escalated to pond after {} breach",
                        timer.timer_type.as_str()
                    ),
                    weight: 0.0,
                }],
                created_at: now,
            };
            self.decisions.insert_assignment(assignment).await.map_err(persistence)?;
        }

        self.publisher.enqueue(DomainEvent {
            id: Uuid::new_v4().to_string(),
            name: event_names::SLA_BREACHED.to_string(),
            tenant_id: timer.tenant_id.clone(),
            lead_id: timer.lead_id.clone(),
            occurred_at: now,
            payload: serde_json::json!({
                "timer_id": timer.id.0,
                "timer_type": timer.timer_type.as_str(),
                "reason_code": reason_code,
            }),
        });
        info!(
            event_name = "sla.breached",
            tenant_id = %timer.tenant_id.0,
            lead_id = %timer.lead_id.0,
            timer_id = %timer.id.0,
            timer_type = timer.timer_type.as_str(),
            "SLA timer breached",
        );

        Ok(true)
    }

    /// Pond escalation target from the originating rule, if it still
    /// exists and still parses. A missing or malformed rule drops the
    /// escalation but never the breach itself.
    async fn breach_fallback_team(
        &self,
        timer: &SlaTimer,
    ) -> Result<Option<TeamId>, ApplicationError> {
        let Some(rule_id) = &timer.rule_id else {
            return Ok(None);
        };
        let Some(rule) =
            self.rules.find_by_id(&timer.tenant_id, rule_id).await.map_err(persistence)?
        else {
            return Ok(None);
        };
        match rule.parse() {
            Ok(parsed) => Ok(parsed.fallback.team_id),
            Err(_) => Ok(None),
        }
    }

    pub async fn record_first_touch(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<SatisfyReport, ApplicationError> {
        self.satisfy(tenant_id, lead_id, SlaTimerType::FirstTouch, occurred_at).await
    }

    pub async fn record_kept_appointment(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<SatisfyReport, ApplicationError> {
        self.satisfy(tenant_id, lead_id, SlaTimerType::KeptAppointment, occurred_at).await
    }

    /// Idempotent: only pending timers flip, so a second signal for the
    /// same lead reports zero updates and publishes nothing.
    async fn satisfy(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<SatisfyReport, ApplicationError> {
        let at = occurred_at.unwrap_or_else(|| self.clock.now());
        let flipped = self
            .timers
            .satisfy_pending(tenant_id, lead_id, timer_type, at)
            .await
            .map_err(persistence)?;
        let updated = flipped.len() as u64;

        if updated > 0 {
            // Stamp the route event each flipped timer came from, once
            // per originating rule.
            let mut stamped: Vec<Option<RuleId>> = Vec::new();
            for timer in &flipped {
                if stamped.contains(&timer.rule_id) {
                    continue;
                }
                stamped.push(timer.rule_id.clone());
                self.decisions
                    .mark_event_satisfied(tenant_id, lead_id, timer.rule_id.as_ref(), at)
                    .await
                    .map_err(persistence)?;
            }
            self.publisher.enqueue(DomainEvent {
                id: Uuid::new_v4().to_string(),
                name: event_names::SLA_SATISFIED.to_string(),
                tenant_id: tenant_id.clone(),
                lead_id: lead_id.clone(),
                occurred_at: at,
                payload: serde_json::json!({
                    "timer_type": timer_type.as_str(),
                    "updated": updated,
                }),
            });
            info!(
                event_name = "sla.satisfied",
                tenant_id = %tenant_id.0,
                lead_id = %lead_id.0,
                timer_type = timer_type.as_str(),
                updated,
                "SLA timer satisfied",
            );
        }

        Ok(SatisfyReport { updated })
    }

    pub async fn list_rules(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, ApplicationError> {
        self.rules.list_for_tenant(tenant_id).await.map_err(persistence)
    }

    /// Validates the rule's JSON columns before it is stored so a
    /// malformed rule never reaches the evaluation path.
    pub async fn create_rule(&self, rule: RoutingRule) -> Result<(), ApplicationError> {
        rule.parse().map_err(DomainError::from)?;
        self.rules.create(rule).await.map_err(persistence)
    }

    /// Updates apply from the next `assign` onward; past route events
    /// are immutable.
    pub async fn update_rule(&self, rule: RoutingRule) -> Result<bool, ApplicationError> {
        rule.parse().map_err(DomainError::from)?;
        self.rules.update(rule).await.map_err(persistence)
    }

    pub async fn delete_rule(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<bool, ApplicationError> {
        self.rules.delete(tenant_id, rule_id).await.map_err(persistence)
    }

    /// Live roster capacity with gating visibility. Consent is per-lead
    /// and therefore not reflected here; only tenant-level readiness is.
    pub async fn capacity_view(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<CapacityRow>, ApplicationError> {
        let tenant = self.tenants.tenant_context(tenant_id).await?;
        let roster = self.roster.roster(tenant_id).await?;
        let tours = self.roster.tour_history(tenant_id).await?;
        let candidates =
            build_candidate_snapshots(&roster, &tours, None, true, tenant.messaging_ready);

        Ok(candidates
            .values()
            .map(|candidate| CapacityRow {
                agent_id: candidate.snapshot.agent_id.clone(),
                full_name: candidate.snapshot.full_name.clone(),
                team_id: candidate.snapshot.team_id.clone(),
                active_pipeline: candidate.snapshot.active_pipeline,
                capacity_remaining: candidate.capacity_remaining,
                gating_reasons: candidate.gating_reasons.clone(),
            })
            .collect())
    }

    pub async fn sla_dashboard(
        &self,
        tenant_id: &TenantId,
    ) -> Result<SlaDashboard, ApplicationError> {
        let timers = self.timers.list_for_tenant(tenant_id).await.map_err(persistence)?;
        let rollup = aggregate(&[], &timers);

        let mut pending: Vec<SlaTimer> = timers
            .into_iter()
            .filter(|timer| timer.status == SlaTimerStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.due_at.cmp(&b.due_at));

        Ok(SlaDashboard {
            first_touch: rollup.first_touch,
            kept_appointment: rollup.kept_appointment,
            pending,
        })
    }

    pub async fn metrics(&self, tenant_id: &TenantId) -> Result<RoutingMetrics, ApplicationError> {
        let events = self.decisions.list_events_for_tenant(tenant_id).await.map_err(persistence)?;
        let timers = self.timers.list_for_tenant(tenant_id).await.map_err(persistence)?;
        Ok(aggregate(&events, &timers))
    }
}

fn candidate_audit(
    candidates: &BTreeMap<AgentId, CandidateSnapshot>,
    weights: &ScoringWeights,
) -> Vec<RouteCandidate> {
    candidates
        .values()
        .map(|candidate| {
            if candidate.is_gated() {
                RouteCandidate {
                    agent_id: candidate.snapshot.agent_id.clone(),
                    status: CandidateStatus::Disqualified,
                    score: None,
                    gating_reasons: candidate.gating_reasons.clone(),
                }
            } else {
                RouteCandidate {
                    agent_id: candidate.snapshot.agent_id.clone(),
                    status: CandidateStatus::Qualified,
                    score: Some(score(candidate, weights)),
                    gating_reasons: Vec::new(),
                }
            }
        })
        .collect()
}

fn encode_payload(context: &RoutingContext) -> Result<String, ApplicationError> {
    serde_json::to_string(context)
        .map_err(|error| ApplicationError::Integration(error.to_string()))
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
