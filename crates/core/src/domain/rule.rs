use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::candidate::{AgentId, TeamId};
use crate::domain::lead::{ConsentChannel, ConsentStatus, RoutingContext, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    FirstMatch,
    ScoreAndAssign,
}

impl RuleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstMatch => "first_match",
            Self::ScoreAndAssign => "score_and_assign",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_match" => Some(Self::FirstMatch),
            "score_and_assign" => Some(Self::ScoreAndAssign),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStrategy {
    RoundRobin,
    #[default]
    BestFit,
}

/// Durable rule row. The JSON columns are opaque here; `parse` turns
/// them into typed shapes at the evaluation boundary so malformed
/// configuration surfaces as one `RuleParseError` instead of panics
/// scattered through evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub priority: i64,
    pub mode: RuleMode,
    pub enabled: bool,
    pub conditions_json: String,
    pub targets_json: String,
    pub fallback_json: Option<String>,
    pub sla_first_touch_minutes: Option<i64>,
    pub sla_kept_appointment_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConditionNode {
    All { nodes: Vec<ConditionNode> },
    Any { nodes: Vec<ConditionNode> },
    Not { node: Box<ConditionNode> },
    SourceIn { sources: Vec<String> },
    BuyerRep { value: bool },
    ConsentGranted { channel: Option<ConsentChannel> },
    PriceBetween { min: Option<Decimal>, max: Option<Decimal> },
    CityIn { cities: Vec<String> },
    OutsideQuietHours,
}

impl ConditionNode {
    pub fn matches(&self, context: &RoutingContext) -> bool {
        match self {
            Self::All { nodes } => nodes.iter().all(|node| node.matches(context)),
            Self::Any { nodes } => nodes.iter().any(|node| node.matches(context)),
            Self::Not { node } => !node.matches(context),
            Self::SourceIn { sources } => match context.lead.source.as_deref() {
                Some(source) => sources.iter().any(|wanted| wanted.eq_ignore_ascii_case(source)),
                None => false,
            },
            Self::BuyerRep { value } => context.lead.buyer_rep == Some(*value),
            Self::ConsentGranted { channel } => match channel {
                Some(channel) => context.consent.status(*channel) == ConsentStatus::Granted,
                None => context.consent.any_granted(),
            },
            Self::PriceBetween { min, max } => {
                let price = context.listing.as_ref().and_then(|listing| listing.price);
                match price {
                    Some(price) => {
                        min.map_or(true, |min| price >= min) && max.map_or(true, |max| price <= max)
                    }
                    None => false,
                }
            }
            Self::CityIn { cities } => {
                match context.listing.as_ref().and_then(|listing| listing.city.as_deref()) {
                    Some(city) => cities.iter().any(|wanted| wanted.eq_ignore_ascii_case(city)),
                    None => false,
                }
            }
            Self::OutsideQuietHours => !context.quiet_hours,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTarget {
    Agent {
        agent_id: AgentId,
    },
    Team {
        team_id: TeamId,
        #[serde(default)]
        strategy: TeamStrategy,
    },
    Pond {
        team_id: TeamId,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFallback {
    pub team_id: Option<TeamId>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("rule `{rule_id}` has invalid conditions: {detail}")]
    Conditions { rule_id: String, detail: String },
    #[error("rule `{rule_id}` has invalid targets: {detail}")]
    Targets { rule_id: String, detail: String },
    #[error("rule `{rule_id}` has invalid fallback: {detail}")]
    Fallback { rule_id: String, detail: String },
    #[error("rule `{rule_id}` declares no targets")]
    EmptyTargets { rule_id: String },
}

/// A rule whose JSON configuration passed validation, ready for
/// evaluation. Holds the source row for priority/SLA metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRule {
    pub rule: RoutingRule,
    pub conditions: ConditionNode,
    pub targets: Vec<RuleTarget>,
    pub fallback: RuleFallback,
}

impl RoutingRule {
    pub fn parse(&self) -> Result<ParsedRule, RuleParseError> {
        let conditions = if self.conditions_json.trim().is_empty() {
            ConditionNode::All { nodes: Vec::new() }
        } else {
            serde_json::from_str(&self.conditions_json).map_err(|error| {
                RuleParseError::Conditions { rule_id: self.id.0.clone(), detail: error.to_string() }
            })?
        };

        let targets: Vec<RuleTarget> =
            serde_json::from_str(&self.targets_json).map_err(|error| RuleParseError::Targets {
                rule_id: self.id.0.clone(),
                detail: error.to_string(),
            })?;
        if targets.is_empty() {
            return Err(RuleParseError::EmptyTargets { rule_id: self.id.0.clone() });
        }

        let fallback = match self.fallback_json.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(raw).map_err(|error| RuleParseError::Fallback {
                    rule_id: self.id.0.clone(),
                    detail: error.to_string(),
                })?
            }
            _ => RuleFallback::default(),
        };

        Ok(ParsedRule { rule: self.clone(), conditions, targets, fallback })
    }
}

impl ParsedRule {
    pub fn matches(&self, context: &RoutingContext) -> bool {
        self.conditions.matches(context)
    }
}
