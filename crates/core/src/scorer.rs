use serde::{Deserialize, Serialize};

use crate::domain::candidate::{AgentScore, CandidateSnapshot, ScoreReason, ScoreReasonType};

/// Tenant-wide default weighting over the four scoring factors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub capacity: f64,
    pub geography: f64,
    pub price_band: f64,
    pub performance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { capacity: 0.35, geography: 0.25, price_band: 0.2, performance: 0.2 }
    }
}

/// Deterministic: identical snapshot and weights always produce the
/// same score and the same reason ordering (capacity, geography,
/// price band, performance), so audit logs diff cleanly across runs.
pub fn score(candidate: &CandidateSnapshot, weights: &ScoringWeights) -> AgentScore {
    let snapshot = &candidate.snapshot;

    let headroom = if snapshot.capacity_target == 0 {
        0.0
    } else {
        candidate.capacity_remaining as f64 / snapshot.capacity_target as f64
    };

    let capacity = weights.capacity * headroom;
    let geography = weights.geography * snapshot.geography_fit;
    let price_band = weights.price_band * snapshot.price_band_fit;
    let performance = weights.performance * snapshot.kept_appt_rate;

    let reasons = vec![
        ScoreReason {
            reason_type: ScoreReasonType::CapacityHeadroom,
            description: format!(
                "{} of {} slots open",
                candidate.capacity_remaining, snapshot.capacity_target
            ),
            weight: capacity,
        },
        ScoreReason {
            reason_type: ScoreReasonType::GeographyFit,
            description: format!("geography fit {:.2}", snapshot.geography_fit),
            weight: geography,
        },
        ScoreReason {
            reason_type: ScoreReasonType::PriceBandFit,
            description: format!("price band fit {:.2}", snapshot.price_band_fit),
            weight: price_band,
        },
        ScoreReason {
            reason_type: ScoreReasonType::KeptApptRate,
            description: format!("kept-appointment rate {:.2}", snapshot.kept_appt_rate),
            weight: performance,
        },
    ];

    AgentScore {
        agent_id: snapshot.agent_id.clone(),
        score: capacity + geography + price_band + performance,
        reasons,
    }
}
