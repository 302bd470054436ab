use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub String);

/// Scoring-ready view of one agent. Derived on every `assign` call so
/// the pipeline count reflects live state; never cached across calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub full_name: String,
    pub capacity_target: u32,
    pub active_pipeline: u32,
    pub geography_fit: f64,
    pub price_band_fit: f64,
    pub kept_appt_rate: f64,
    pub consent_ready: bool,
    pub ten_dlc_ready: bool,
    pub team_id: Option<TeamId>,
    pub round_robin_order: i64,
}

/// An `AgentSnapshot` plus eligibility. A non-empty `gating_reasons`
/// list disqualifies the agent from direct selection but keeps them
/// visible in the decision audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub snapshot: AgentSnapshot,
    pub capacity_remaining: u32,
    pub gating_reasons: Vec<String>,
}

impl CandidateSnapshot {
    pub fn is_gated(&self) -> bool {
        !self.gating_reasons.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Qualified,
    Disqualified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReasonType {
    CapacityHeadroom,
    GeographyFit,
    PriceBandFit,
    KeptApptRate,
    TeamPond,
}

impl ScoreReasonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityHeadroom => "capacity_headroom",
            Self::GeographyFit => "geography_fit",
            Self::PriceBandFit => "price_band_fit",
            Self::KeptApptRate => "kept_appt_rate",
            Self::TeamPond => "team_pond",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreReason {
    pub reason_type: ScoreReasonType,
    pub description: String,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: AgentId,
    pub score: f64,
    pub reasons: Vec<ScoreReason>,
}
