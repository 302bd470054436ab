use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candidate::AgentId;
use crate::domain::lead::{LeadId, TenantId};
use crate::domain::rule::RuleId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaTimerType {
    FirstTouch,
    KeptAppointment,
}

impl SlaTimerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstTouch => "first_touch",
            Self::KeptAppointment => "kept_appointment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_touch" => Some(Self::FirstTouch),
            "kept_appointment" => Some(Self::KeptAppointment),
            _ => None,
        }
    }

    pub fn breach_reason_code(&self) -> &'static str {
        match self {
            Self::FirstTouch => "FIRST_TOUCH_BREACHED",
            Self::KeptAppointment => "KEPT_APPOINTMENT_BREACHED",
        }
    }
}

/// `Pending` is the only live state. `Satisfied` and `Breached` are
/// terminal; a timer is never resurrected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaTimerStatus {
    Pending,
    Satisfied,
    Breached,
}

impl SlaTimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Satisfied => "satisfied",
            Self::Breached => "breached",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "satisfied" => Some(Self::Satisfied),
            "breached" => Some(Self::Breached),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Breached)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaTimerId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaTimer {
    pub id: SlaTimerId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub rule_id: Option<RuleId>,
    pub assigned_agent_id: Option<AgentId>,
    pub timer_type: SlaTimerType,
    pub status: SlaTimerStatus,
    pub due_at: DateTime<Utc>,
    pub satisfied_at: Option<DateTime<Utc>>,
    pub breached_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
