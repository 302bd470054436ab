pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod quiet_hours;
pub mod rules;
pub mod scorer;
pub mod snapshot;
pub mod strategy;

pub use chrono;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::assignment::{
    Assignment, AssignmentReason, LeadRouteEvent, RouteCandidate, reason_codes,
};
pub use domain::candidate::{
    AgentId, AgentScore, AgentSnapshot, CandidateSnapshot, CandidateStatus, ScoreReason,
    ScoreReasonType, TeamId,
};
pub use domain::lead::{
    ConsentChannel, ConsentState, ConsentStatus, Lead, LeadId, ListingContext, RoutingContext,
    TenantId,
};
pub use domain::rule::{
    ConditionNode, ParsedRule, RoutingRule, RuleFallback, RuleId, RuleMode, RuleParseError,
    RuleTarget, TeamStrategy,
};
pub use domain::timer::{SlaTimer, SlaTimerStatus, SlaTimerType};
pub use errors::{ApplicationError, DomainError};
pub use metrics::{RoutingMetrics, TimerStats};
pub use scorer::ScoringWeights;
pub use snapshot::{build_candidate_snapshots, RosterMember, TourOutcome, TourRecord};
pub use strategy::{rank_candidates, SelectionOutcome};
