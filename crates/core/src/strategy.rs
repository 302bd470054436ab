use std::collections::BTreeMap;

use crate::domain::assignment::reason_codes;
use crate::domain::candidate::{AgentId, AgentScore, CandidateSnapshot, TeamId};
use crate::domain::lead::RoutingContext;
use crate::domain::rule::{ParsedRule, RuleMode, RuleTarget, TeamStrategy};
use crate::scorer::{score, ScoringWeights};

/// What a strategy decided for one matched rule: zero or one agent,
/// or a pond fallback. `used_fallback` is forced on whenever no agent
/// could be selected so a lead is never silently left unassigned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionOutcome {
    pub agent_id: Option<AgentId>,
    pub selected_score: Option<AgentScore>,
    pub fallback_team_id: Option<TeamId>,
    pub used_fallback: bool,
    pub reason_codes: Vec<String>,
}

impl SelectionOutcome {
    fn selected(agent_score: AgentScore, reason_code: &str) -> Self {
        Self {
            agent_id: Some(agent_score.agent_id.clone()),
            selected_score: Some(agent_score),
            fallback_team_id: None,
            used_fallback: false,
            reason_codes: vec![reason_code.to_string()],
        }
    }

    fn pond(team_id: TeamId, reason_code: &str) -> Self {
        Self {
            agent_id: None,
            selected_score: None,
            fallback_team_id: Some(team_id),
            used_fallback: true,
            reason_codes: vec![reason_code.to_string()],
        }
    }
}

/// Runs the strategy configured on the matched rule.
pub fn select(
    parsed: &ParsedRule,
    candidates: &BTreeMap<AgentId, CandidateSnapshot>,
    weights: &ScoringWeights,
    context: &RoutingContext,
) -> SelectionOutcome {
    match parsed.rule.mode {
        RuleMode::FirstMatch => first_match(parsed, candidates, weights),
        RuleMode::ScoreAndAssign => score_and_assign(parsed, candidates, weights, context),
    }
}

/// Walks the rule's targets in declared order. Agent targets soft-fail
/// (walk continues); a pond target stops the walk; exhausting every
/// target forces the fallback path.
fn first_match(
    parsed: &ParsedRule,
    candidates: &BTreeMap<AgentId, CandidateSnapshot>,
    weights: &ScoringWeights,
) -> SelectionOutcome {
    for target in &parsed.targets {
        match target {
            RuleTarget::Agent { agent_id } => {
                if let Some(candidate) = candidates.get(agent_id) {
                    if !candidate.is_gated() {
                        return SelectionOutcome::selected(
                            score(candidate, weights),
                            reason_codes::AGENT_TARGET,
                        );
                    }
                }
            }
            RuleTarget::Team { team_id, strategy } => {
                if let Some(best) = best_team_member(team_id, candidates, weights) {
                    let reason_code = match strategy {
                        TeamStrategy::RoundRobin => reason_codes::TEAM_ROUND_ROBIN,
                        TeamStrategy::BestFit => reason_codes::TEAM_BEST_FIT,
                    };
                    return SelectionOutcome::selected(best, reason_code);
                }
            }
            RuleTarget::Pond { team_id } => {
                return SelectionOutcome::pond(team_id.clone(), reason_codes::TEAM_POND);
            }
        }
    }

    SelectionOutcome {
        agent_id: None,
        selected_score: None,
        fallback_team_id: parsed.fallback.team_id.clone(),
        used_fallback: true,
        reason_codes: vec![reason_codes::NO_CANDIDATES.to_string()],
    }
}

/// Highest-scoring ungated member of the team; ties keep the first
/// candidate encountered in snapshot map order.
fn best_team_member(
    team_id: &TeamId,
    candidates: &BTreeMap<AgentId, CandidateSnapshot>,
    weights: &ScoringWeights,
) -> Option<AgentScore> {
    let mut best: Option<AgentScore> = None;
    for candidate in candidates.values() {
        if candidate.is_gated() || candidate.snapshot.team_id.as_ref() != Some(team_id) {
            continue;
        }
        let scored = score(candidate, weights);
        match &best {
            Some(current) if scored.score <= current.score => {}
            _ => best = Some(scored),
        }
    }
    best
}

/// Pools every candidate reachable via the rule's agent/team targets,
/// scores the ungated ones with the tenant-wide weighting, and hands
/// final selection to `rank_candidates`. An empty pool is terminal for
/// the call: the caller records it, it does not cascade to later rules.
fn score_and_assign(
    parsed: &ParsedRule,
    candidates: &BTreeMap<AgentId, CandidateSnapshot>,
    weights: &ScoringWeights,
    context: &RoutingContext,
) -> SelectionOutcome {
    let mut pool: BTreeMap<AgentId, &CandidateSnapshot> = BTreeMap::new();

    for target in &parsed.targets {
        match target {
            RuleTarget::Agent { agent_id } => {
                if let Some(candidate) = candidates.get(agent_id) {
                    if !candidate.is_gated() {
                        pool.insert(agent_id.clone(), candidate);
                    }
                }
            }
            RuleTarget::Team { team_id, .. } => {
                for candidate in candidates.values() {
                    if !candidate.is_gated()
                        && candidate.snapshot.team_id.as_ref() == Some(team_id)
                    {
                        pool.insert(candidate.snapshot.agent_id.clone(), candidate);
                    }
                }
            }
            RuleTarget::Pond { .. } => {}
        }
    }

    let listing = context.listing.as_ref();
    let geography_importance = if listing.and_then(|l| l.city.as_ref()).is_some() { 1.0 } else { 0.5 };
    let price_band_importance = if listing.and_then(|l| l.price).is_some() { 1.0 } else { 0.5 };

    let scored: Vec<(AgentScore, f64, f64)> = pool
        .values()
        .map(|&candidate| {
            (
                score(candidate, weights),
                candidate.snapshot.geography_fit,
                candidate.snapshot.price_band_fit,
            )
        })
        .collect();

    rank_candidates(
        &scored,
        geography_importance,
        price_band_importance,
        context.quiet_hours,
        parsed.fallback.team_id.as_ref(),
    )
}

/// Pure ranking over `(base score, geography fit, price band fit)`
/// triples. During quiet hours a configured fallback team takes the
/// lead instead of an agent, since nobody can reach out until the
/// window ends. Ties keep the earlier entry.
pub fn rank_candidates(
    scored: &[(AgentScore, f64, f64)],
    geography_importance: f64,
    price_band_importance: f64,
    quiet_hours: bool,
    fallback_team: Option<&TeamId>,
) -> SelectionOutcome {
    if scored.is_empty() {
        return SelectionOutcome {
            agent_id: None,
            selected_score: None,
            fallback_team_id: fallback_team.cloned(),
            used_fallback: true,
            reason_codes: vec![reason_codes::NO_CANDIDATES.to_string()],
        };
    }

    if quiet_hours {
        if let Some(team_id) = fallback_team {
            let mut outcome =
                SelectionOutcome::pond(team_id.clone(), reason_codes::QUIET_HOURS_POND);
            outcome.reason_codes.push(reason_codes::SCORE_AND_ASSIGN.to_string());
            return outcome;
        }
    }

    let mut best: Option<(&AgentScore, f64)> = None;
    for (agent_score, geography_fit, price_band_fit) in scored {
        let adjusted = agent_score.score
            + geography_importance * geography_fit
            + price_band_importance * price_band_fit;
        match best {
            Some((_, current)) if adjusted <= current => {}
            _ => best = Some((agent_score, adjusted)),
        }
    }

    match best {
        Some((agent_score, _)) => {
            SelectionOutcome::selected(agent_score.clone(), reason_codes::SCORE_AND_ASSIGN)
        }
        None => SelectionOutcome {
            agent_id: None,
            selected_score: None,
            fallback_team_id: fallback_team.cloned(),
            used_fallback: true,
            reason_codes: vec![reason_codes::NO_CANDIDATES.to_string()],
        },
    }
}
