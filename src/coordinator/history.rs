use super::merge::{FieldMap, flatten_history};
use crate::cloud::HistoryWindow;
use crate::config::HistoryFailurePolicy;
use crate::error::Result;
use crate::logging::StructuredLogger;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

/// Cadence and last result of the historical summary fetch
#[derive(Debug)]
pub struct HistoryTracker {
    interval: Duration,
    policy: HistoryFailurePolicy,
    key: String,
    tz: Tz,
    last_fetch: Option<DateTime<Utc>>,
    fields: FieldMap,
    attempts: u64,
}

impl HistoryTracker {
    pub fn new(interval_secs: u64, policy: HistoryFailurePolicy, key: &str, tz: Tz) -> Self {
        Self {
            interval: i64::try_from(interval_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            policy,
            key: key.to_string(),
            tz,
            last_fetch: None,
            fields: FieldMap::new(),
            attempts: 0,
        }
    }

    /// True when nothing has been fetched yet or the interval has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_fetch {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Window to request if a fetch is due at `now`
    pub fn due_window(&self, now: DateTime<Utc>) -> Option<HistoryWindow> {
        self.is_due(now)
            .then(|| HistoryWindow::current_week(now, &self.tz))
    }

    /// Apply the outcome of a fetch started at `attempted_at`
    pub fn record(
        &mut self,
        result: Result<Map<String, Value>>,
        attempted_at: DateTime<Utc>,
        logger: &StructuredLogger,
    ) {
        self.attempts += 1;
        match result {
            Ok(data) => {
                self.fields = flatten_history(&data, &self.key);
                self.last_fetch = Some(attempted_at);
                logger.debug(&format!(
                    "Historical summary merged ({} fields)",
                    self.fields.len()
                ));
            }
            Err(e) => {
                logger.error(&format!("Error fetching historical data: {}", e));
                if self.policy == HistoryFailurePolicy::Advance {
                    self.last_fetch = Some(attempted_at);
                }
            }
        }
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PowerOceanError;
    use crate::logging::get_logger;
    use chrono::TimeZone;
    use serde_json::json;

    fn tracker(policy: HistoryFailurePolicy) -> HistoryTracker {
        HistoryTracker::new(3_600, policy, "historical_data", chrono_tz::UTC)
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 19, h, m, 0).unwrap()
    }

    #[test]
    fn due_until_first_success_then_after_interval() {
        let logger = get_logger("history");
        let mut h = tracker(HistoryFailurePolicy::Advance);
        assert!(h.is_due(t(10, 0)));

        h.record(Ok(Map::new()), t(10, 0), &logger);
        assert!(!h.is_due(t(10, 30)));
        assert!(!h.is_due(t(10, 59)));
        assert!(h.is_due(t(11, 0)));
        assert_eq!(h.fields().get("historical_data"), Some(&json!({})));
    }

    #[test]
    fn advance_policy_waits_after_failure() {
        let logger = get_logger("history");
        let mut h = tracker(HistoryFailurePolicy::Advance);
        h.record(Err(PowerOceanError::timeout("slow")), t(10, 0), &logger);
        assert_eq!(h.last_fetch(), Some(t(10, 0)));
        assert!(!h.is_due(t(10, 1)));
    }

    #[test]
    fn retry_policy_stays_due_after_failure() {
        let logger = get_logger("history");
        let mut h = tracker(HistoryFailurePolicy::RetryNextTick);
        h.record(Err(PowerOceanError::timeout("slow")), t(10, 0), &logger);
        assert_eq!(h.last_fetch(), None);
        assert!(h.is_due(t(10, 1)));
        assert_eq!(h.attempts(), 1);
    }

    #[test]
    fn failure_keeps_previous_summary() {
        let logger = get_logger("history");
        let mut h = tracker(HistoryFailurePolicy::Advance);
        h.record(
            Ok(json!({"data": [{"indexName": "Self-sufficiency", "indexValue": 88}]})
                .as_object()
                .cloned()
                .unwrap()),
            t(9, 0),
            &logger,
        );
        h.record(Err(PowerOceanError::network("down")), t(10, 0), &logger);
        assert_eq!(
            h.fields().get("historical_data.data[0].indexValue"),
            Some(&json!(88))
        );
    }

    #[test]
    fn due_window_is_current_week() {
        let h = tracker(HistoryFailurePolicy::Advance);
        let window = h.due_window(t(10, 0)).unwrap();
        assert_eq!(window.begin_time(), "2024-06-17 00:00:00");
        assert_eq!(window.end_time(), "2024-06-23 23:59:59");
    }
}
