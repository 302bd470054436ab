use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::candidate::{AgentId, AgentSnapshot, CandidateSnapshot, TeamId};
use crate::domain::lead::ListingContext;

/// Fixed per-agent capacity in this version; callers needing per-agent
/// targets override the snapshot externally.
pub const CAPACITY_TARGET: u32 = 8;

/// Neutral prior for agents with no tour history, so new agents are
/// not starved out of team selection.
pub const NEUTRAL_KEPT_RATE: f64 = 0.5;

const GEOGRAPHY_MATCH: f64 = 1.0;
const GEOGRAPHY_ELSEWHERE: f64 = 0.6;
const GEOGRAPHY_NEUTRAL: f64 = 0.7;

const PRICE_BAND_FLOOR: f64 = 0.4;
const PRICE_BAND_NEUTRAL_NO_LISTING: f64 = 0.75;
const PRICE_BAND_NEUTRAL_NO_HISTORY: f64 = 0.7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RosterMember {
    pub agent_id: AgentId,
    pub full_name: String,
    pub team_id: Option<TeamId>,
    pub round_robin_order: i64,
    pub active_tour_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourOutcome {
    Kept,
    Confirmed,
    NoShow,
}

/// One historical tour in the lookback window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TourRecord {
    pub agent_id: AgentId,
    pub outcome: TourOutcome,
    pub city: Option<String>,
    pub price: Option<Decimal>,
}

/// Builds scoring-ready candidate snapshots for a tenant's roster.
/// Gated candidates stay in the map so the decision audit can list
/// them as disqualified. The `BTreeMap` ordering is the tie-break
/// order for team selection.
pub fn build_candidate_snapshots(
    roster: &[RosterMember],
    tours: &[TourRecord],
    listing: Option<&ListingContext>,
    consent_ready: bool,
    ten_dlc_ready: bool,
) -> BTreeMap<AgentId, CandidateSnapshot> {
    let mut candidates = BTreeMap::new();

    for member in roster {
        let history: Vec<&TourRecord> =
            tours.iter().filter(|tour| tour.agent_id == member.agent_id).collect();

        let snapshot = AgentSnapshot {
            agent_id: member.agent_id.clone(),
            full_name: member.full_name.clone(),
            capacity_target: CAPACITY_TARGET,
            active_pipeline: member.active_tour_count,
            geography_fit: geography_fit(&history, listing),
            price_band_fit: price_band_fit(&history, listing),
            kept_appt_rate: kept_appt_rate(&history),
            consent_ready,
            ten_dlc_ready,
            team_id: member.team_id.clone(),
            round_robin_order: member.round_robin_order,
        };

        let mut gating_reasons = Vec::new();
        if !consent_ready {
            gating_reasons.push("lead has no granted consent channel".to_string());
        }
        if !ten_dlc_ready {
            gating_reasons.push("tenant messaging (10DLC) not approved".to_string());
        }

        let capacity_remaining = snapshot.capacity_target.saturating_sub(snapshot.active_pipeline);

        candidates.insert(
            member.agent_id.clone(),
            CandidateSnapshot { snapshot, capacity_remaining, gating_reasons },
        );
    }

    candidates
}

fn kept_appt_rate(history: &[&TourRecord]) -> f64 {
    if history.is_empty() {
        return NEUTRAL_KEPT_RATE;
    }
    let kept = history.iter().filter(|tour| tour.outcome == TourOutcome::Kept).count();
    kept as f64 / history.len() as f64
}

fn geography_fit(history: &[&TourRecord], listing: Option<&ListingContext>) -> f64 {
    let listing_city = match listing.and_then(|listing| listing.city.as_deref()) {
        Some(city) => city,
        None => return GEOGRAPHY_NEUTRAL,
    };
    if history.is_empty() {
        return GEOGRAPHY_NEUTRAL;
    }
    let toured_city = history.iter().any(|tour| {
        tour.city.as_deref().is_some_and(|city| city.eq_ignore_ascii_case(listing_city))
    });
    if toured_city {
        GEOGRAPHY_MATCH
    } else {
        GEOGRAPHY_ELSEWHERE
    }
}

fn price_band_fit(history: &[&TourRecord], listing: Option<&ListingContext>) -> f64 {
    let listing_price = match listing.and_then(|listing| listing.price) {
        Some(price) if price > Decimal::ZERO => price,
        _ => return PRICE_BAND_NEUTRAL_NO_LISTING,
    };

    let priced: Vec<Decimal> = history.iter().filter_map(|tour| tour.price).collect();
    if priced.is_empty() {
        return PRICE_BAND_NEUTRAL_NO_HISTORY;
    }
    let total: Decimal = priced.iter().copied().sum();
    let avg = total / Decimal::from(priced.len() as u64);

    let (avg, listing_price) = match (avg.to_f64(), listing_price.to_f64()) {
        (Some(avg), Some(listing_price)) => (avg, listing_price),
        _ => return PRICE_BAND_NEUTRAL_NO_HISTORY,
    };

    let fit = 1.0 - (avg - listing_price).abs() / listing_price.max(avg);
    fit.max(PRICE_BAND_FLOOR)
}
