use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::kv::{Identifiable, KVIdentity};

/// Remembers when the daily fact was last delivered, so a restart inside the trigger minute doesn't post twice.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone, Copy, Default)]
pub struct DeliveryState {
    pub last_run: DateTime<Utc>,
}

impl DeliveryState {
    pub fn new(last_run: DateTime<Utc>) -> Self {
        Self { last_run }
    }

    /// The UTC calendar date of the last delivery.
    pub fn last_run_date(&self) -> NaiveDate {
        self.last_run.date_naive()
    }
}

impl Identifiable for DeliveryState {
    fn kv_key(&self) -> KVIdentity {
        "factbot_delivery_state".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn last_run_date_is_utc_date() {
        let state = DeliveryState::new(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 30).unwrap());

        assert_eq!(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(), state.last_run_date());
    }
}
