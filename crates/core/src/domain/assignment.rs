use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candidate::{AgentId, AgentScore, CandidateStatus, TeamId};
use crate::domain::lead::{LeadId, TenantId};
use crate::domain::rule::{RuleId, RuleMode};

/// Reason codes recorded on route events and assignment reasons.
pub mod reason_codes {
    pub const NO_RULE_MATCH: &str = "NO_RULE_MATCH";
    pub const RULE_PARSE_FAILED: &str = "RULE_PARSE_FAILED";
    pub const NO_CANDIDATES: &str = "NO_CANDIDATES";
    pub const AGENT_TARGET: &str = "AGENT_TARGET";
    pub const TEAM_ROUND_ROBIN: &str = "TEAM_ROUND_ROBIN";
    pub const TEAM_BEST_FIT: &str = "TEAM_BEST_FIT";
    pub const TEAM_POND: &str = "TEAM_POND";
    pub const SCORE_AND_ASSIGN: &str = "SCORE_AND_ASSIGN";
    pub const QUIET_HOURS_POND: &str = "QUIET_HOURS_POND";
    pub const FIRST_TOUCH_BREACHED: &str = "FIRST_TOUCH_BREACHED";
    pub const KEPT_APPOINTMENT_BREACHED: &str = "KEPT_APPOINTMENT_BREACHED";
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReason {
    pub reason_type: String,
    pub description: String,
    pub weight: f64,
}

/// Durable assignment record. Either `agent_id` (direct selection) or
/// `team_id` (pond fallback) is set; re-routing and escalation may add
/// further rows for the same lead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub tenant_id: TenantId,
    pub person_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub team_id: Option<TeamId>,
    pub score: f64,
    pub reasons: Vec<AssignmentReason>,
    pub created_at: DateTime<Utc>,
}

/// One entry of the scored candidate audit embedded in a route event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub agent_id: AgentId,
    pub status: CandidateStatus,
    pub score: Option<AgentScore>,
    pub gating_reasons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadRouteEventId(pub String);

/// Immutable audit record; exactly one per `assign` call, including
/// "no rule matched" outcomes. The sweeper may later stamp
/// `sla_breached_at` / append breach reason codes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadRouteEvent {
    pub id: LeadRouteEventId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub matched_rule_id: Option<RuleId>,
    pub mode: RuleMode,
    pub payload_json: String,
    pub candidates: Vec<RouteCandidate>,
    pub assigned_agent_id: Option<AgentId>,
    pub fallback_used: bool,
    pub reason_codes: Vec<String>,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub sla_satisfied_at: Option<DateTime<Utc>>,
    pub sla_breached_at: Option<DateTime<Utc>>,
    pub actor_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
