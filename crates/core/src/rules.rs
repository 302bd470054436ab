use crate::domain::lead::RoutingContext;
use crate::domain::rule::{ParsedRule, RoutingRule, RuleId, RuleParseError};

/// Result of walking a tenant's rule list for one routing context.
/// `matches` keeps every matching rule in priority order so the caller
/// can cascade past a rule whose targets turn out to be unfillable.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationOutcome {
    pub matches: Vec<ParsedRule>,
    pub parse_failures: Vec<(RuleId, RuleParseError)>,
}

impl EvaluationOutcome {
    /// `RULE_PARSE_FAILED:<id>` codes for the decision audit.
    pub fn parse_failure_codes(&self) -> Vec<String> {
        self.parse_failures
            .iter()
            .map(|(rule_id, _)| {
                format!("{}:{}", crate::domain::assignment::reason_codes::RULE_PARSE_FAILED, rule_id.0)
            })
            .collect()
    }
}

/// Walks rules in the order given and collects every rule whose
/// conditions match. Callers fetch rules pre-sorted by
/// `(priority ASC, created_at ASC)`; that ordering is the tie-break
/// contract and is not re-derived here. Disabled rules are skipped
/// silently; rules with malformed JSON are skipped and recorded so a
/// single bad rule never aborts the whole assignment.
pub fn evaluate(rules: &[RoutingRule], context: &RoutingContext) -> EvaluationOutcome {
    let mut matches = Vec::new();
    let mut parse_failures = Vec::new();

    for rule in rules {
        if !rule.enabled {
            continue;
        }
        let parsed = match rule.parse() {
            Ok(parsed) => parsed,
            Err(error) => {
                parse_failures.push((rule.id.clone(), error));
                continue;
            }
        };
        if parsed.matches(context) {
            matches.push(parsed);
        }
    }

    EvaluationOutcome { matches, parse_failures }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::domain::lead::{ConsentState, Lead, LeadId, RoutingContext, TenantId};
    use crate::domain::rule::{RoutingRule, RuleId, RuleMode};

    use super::evaluate;

    fn context() -> RoutingContext {
        RoutingContext {
            tenant_id: TenantId("t-1".to_string()),
            lead: Lead {
                id: LeadId("lead-1".to_string()),
                source: Some("zillow".to_string()),
                buyer_rep: None,
            },
            listing: None,
            consent: ConsentState::default(),
            quiet_hours: false,
            now: Utc::now(),
        }
    }

    fn rule(id: &str, priority: i64, created_at: DateTime<Utc>, conditions: &str) -> RoutingRule {
        RoutingRule {
            id: RuleId(id.to_string()),
            tenant_id: TenantId("t-1".to_string()),
            name: id.to_string(),
            priority,
            mode: RuleMode::FirstMatch,
            enabled: true,
            conditions_json: conditions.to_string(),
            targets_json: r#"[{"kind":"agent","agent_id":"a1"}]"#.to_string(),
            fallback_json: None,
            sla_first_touch_minutes: None,
            sla_kept_appointment_minutes: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn matching_rules_are_kept_in_list_order() {
        let base = Utc::now();
        let rules = vec![
            rule("r1", 1, base, r#"{"op":"source_in","sources":["realtor"]}"#),
            rule("r2", 2, base, ""),
            rule("r3", 3, base, ""),
        ];

        let outcome = evaluate(&rules, &context());
        let ids: Vec<&str> = outcome.matches.iter().map(|parsed| parsed.rule.id.0.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let base = Utc::now();
        let mut disabled = rule("r1", 1, base, "");
        disabled.enabled = false;
        let rules = vec![disabled, rule("r2", 2, base + Duration::seconds(1), "")];

        let outcome = evaluate(&rules, &context());
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].rule.id, RuleId("r2".to_string()));
    }

    #[test]
    fn malformed_rule_is_recorded_and_evaluation_continues() {
        let base = Utc::now();
        let mut broken = rule("r1", 1, base, "");
        broken.targets_json = "not json".to_string();
        let rules = vec![broken, rule("r2", 2, base, "")];

        let outcome = evaluate(&rules, &context());
        assert_eq!(outcome.matches[0].rule.id, RuleId("r2".to_string()));
        assert_eq!(outcome.parse_failure_codes(), vec!["RULE_PARSE_FAILED:r1".to_string()]);
    }

    #[test]
    fn no_match_returns_empty_with_failures_preserved() {
        let base = Utc::now();
        let mut broken = rule("r1", 1, base, "");
        broken.conditions_json = "{".to_string();

        let outcome = evaluate(&[broken], &context());
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.parse_failures.len(), 1);
    }
}
