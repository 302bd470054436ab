use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::assignment::LeadRouteEvent;
use crate::domain::timer::{SlaTimer, SlaTimerStatus, SlaTimerType};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerStats {
    pub pending: usize,
    pub satisfied: usize,
    pub breached: usize,
    /// breached / (satisfied + breached); 0 when nothing resolved yet.
    pub breach_rate: f64,
    pub avg_satisfy_minutes: Option<f64>,
    pub p50_satisfy_minutes: Option<f64>,
}

/// Read-only rollup over timer and route-event history. Derived on
/// demand for dashboards; never consulted on the assignment hot path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetrics {
    pub events_total: usize,
    pub assigned_total: usize,
    pub no_match_total: usize,
    pub fallback_total: usize,
    pub first_touch: TimerStats,
    pub kept_appointment: TimerStats,
    pub kept_rate_by_rule: BTreeMap<String, f64>,
    pub kept_rate_by_agent: BTreeMap<String, f64>,
}

pub fn aggregate(events: &[LeadRouteEvent], timers: &[SlaTimer]) -> RoutingMetrics {
    let mut metrics = RoutingMetrics {
        events_total: events.len(),
        ..RoutingMetrics::default()
    };

    for event in events {
        if event.assigned_agent_id.is_some() {
            metrics.assigned_total += 1;
        }
        if event.matched_rule_id.is_none() {
            metrics.no_match_total += 1;
        }
        if event.fallback_used {
            metrics.fallback_total += 1;
        }
    }

    metrics.first_touch = timer_stats(timers, SlaTimerType::FirstTouch);
    metrics.kept_appointment = timer_stats(timers, SlaTimerType::KeptAppointment);
    metrics.kept_rate_by_rule = kept_rates(timers, |timer| {
        timer.rule_id.as_ref().map(|rule_id| rule_id.0.clone())
    });
    metrics.kept_rate_by_agent = kept_rates(timers, |timer| {
        timer.assigned_agent_id.as_ref().map(|agent_id| agent_id.0.clone())
    });

    metrics
}

fn timer_stats(timers: &[SlaTimer], timer_type: SlaTimerType) -> TimerStats {
    let mut stats = TimerStats::default();
    let mut satisfy_minutes = Vec::new();

    for timer in timers.iter().filter(|timer| timer.timer_type == timer_type) {
        match timer.status {
            SlaTimerStatus::Pending => stats.pending += 1,
            SlaTimerStatus::Satisfied => {
                stats.satisfied += 1;
                if let Some(satisfied_at) = timer.satisfied_at {
                    let elapsed = satisfied_at - timer.created_at;
                    satisfy_minutes.push(elapsed.num_seconds() as f64 / 60.0);
                }
            }
            SlaTimerStatus::Breached => stats.breached += 1,
        }
    }

    let resolved = stats.satisfied + stats.breached;
    if resolved > 0 {
        stats.breach_rate = stats.breached as f64 / resolved as f64;
    }
    if !satisfy_minutes.is_empty() {
        stats.avg_satisfy_minutes =
            Some(satisfy_minutes.iter().sum::<f64>() / satisfy_minutes.len() as f64);
        stats.p50_satisfy_minutes = Some(median(&mut satisfy_minutes));
    }

    stats
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn kept_rates<F>(timers: &[SlaTimer], key: F) -> BTreeMap<String, f64>
where
    F: Fn(&SlaTimer) -> Option<String>,
{
    let mut resolved: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for timer in timers {
        if timer.timer_type != SlaTimerType::KeptAppointment || !timer.status.is_terminal() {
            continue;
        }
        let Some(group) = key(timer) else { continue };
        let entry = resolved.entry(group).or_insert((0, 0));
        entry.1 += 1;
        if timer.status == SlaTimerStatus::Satisfied {
            entry.0 += 1;
        }
    }

    resolved
        .into_iter()
        .map(|(group, (kept, total))| (group, kept as f64 / total as f64))
        .collect()
}
