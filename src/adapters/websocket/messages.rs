//! Live channel protocol.
//!
//! Server → client only. Every frame is a JSON object with a `type` tag and
//! a `data` payload.

use serde::{Deserialize, Serialize};

use crate::adapters::http::revenue::ProgressResponse;
use crate::domain::revenue::DailyRevenueSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Current progress for a business date.
    ProgressUpdate(ProgressResponse),
}

impl LiveMessage {
    pub fn progress(snapshot: &DailyRevenueSnapshot) -> Self {
        LiveMessage::ProgressUpdate(ProgressResponse::from(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Cents;
    use chrono::NaiveDate;

    #[test]
    fn progress_update_wire_shape() {
        let snapshot = DailyRevenueSnapshot::compute(
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            Cents::new(63_200).unwrap(),
            Cents::new(60_000).unwrap(),
            8,
            None,
        );

        let json = serde_json::to_value(LiveMessage::progress(&snapshot)).unwrap();

        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["data"]["total_amount"], 63_200);
        assert_eq!(json["data"]["target_amount"], 60_000);
        assert_eq!(json["data"]["achieved_flag"], true);
        assert_eq!(json["data"]["business_date"], "2024-03-14");
        assert!(json["data"]["progress_pct"].as_f64().unwrap() > 105.0);
    }
}
