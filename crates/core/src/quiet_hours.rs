use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Tenant routing context supplied by the tenant config collaborator.
/// The provider resolves the tenant's IANA timezone to a UTC offset for
/// the moment of the call; this crate only does the window arithmetic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub timezone: String,
    pub utc_offset_minutes: i32,
    pub quiet_hours_start: Option<u32>,
    pub quiet_hours_end: Option<u32>,
    pub messaging_ready: bool,
}

impl TenantContext {
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let (start, end) = match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => (start % 24, end % 24),
            _ => return false,
        };
        if start == end {
            return false;
        }

        // An out-of-range offset from the provider degrades to UTC.
        let offset =
            FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        let local_hour = now.with_timezone(&offset).hour();

        if start < end {
            local_hour >= start && local_hour < end
        } else {
            // Window wraps past midnight, e.g. 21:00 -> 08:00.
            local_hour >= start || local_hour < end
        }
    }
}
