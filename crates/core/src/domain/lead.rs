use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentChannel {
    Sms,
    Email,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Granted,
    Revoked,
    #[default]
    Unknown,
}

/// Per-channel consent for one lead, as reported by the consent module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentState {
    pub sms: ConsentStatus,
    pub email: ConsentStatus,
}

impl ConsentState {
    pub fn status(&self, channel: ConsentChannel) -> ConsentStatus {
        match channel {
            ConsentChannel::Sms => self.sms,
            ConsentChannel::Email => self.email,
        }
    }

    pub fn any_granted(&self) -> bool {
        self.sms == ConsentStatus::Granted || self.email == ConsentStatus::Granted
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub source: Option<String>,
    pub buyer_rep: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingContext {
    pub listing_id: Option<String>,
    pub price: Option<Decimal>,
    pub city: Option<String>,
}

/// Everything a rule's conditions may look at, assembled once per
/// `assign` call with a single shared `now`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub tenant_id: TenantId,
    pub lead: Lead,
    pub listing: Option<ListingContext>,
    pub consent: ConsentState,
    pub quiet_hours: bool,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ConsentState, ConsentStatus};

    #[test]
    fn consent_any_granted_checks_both_channels() {
        let none = ConsentState::default();
        assert!(!none.any_granted());

        let sms_only = ConsentState { sms: ConsentStatus::Granted, ..ConsentState::default() };
        assert!(sms_only.any_granted());

        let revoked = ConsentState {
            sms: ConsentStatus::Revoked,
            email: ConsentStatus::Revoked,
        };
        assert!(!revoked.any_granted());
    }
}
