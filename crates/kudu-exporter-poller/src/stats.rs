//! The exporter's own metrics.
//!
//! Registered in the same registry as the upstream series but tracked
//! separately, so they survive observation clears and filter reloads.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prometheus::{Gauge, IntCounterVec, IntGauge, Opts, Registry};

/// Outcome label values for `kudu_exporter_polls_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Success,
    FetchError,
    DecodeError,
}

impl PollResult {
    fn as_label(self) -> &'static str {
        match self {
            PollResult::Success => "success",
            PollResult::FetchError => "fetch_error",
            PollResult::DecodeError => "decode_error",
        }
    }
}

/// Poll loop counters and gauges.
#[derive(Clone)]
pub struct PollStats {
    polls: IntCounterVec,
    last_duration: Gauge,
    last_success: Gauge,
    consecutive_failures: IntGauge,
    series: IntGauge,
    reloads: IntCounterVec,
}

impl PollStats {
    /// Create the collectors and register them in `registry`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let stats = Self {
            polls: IntCounterVec::new(
                Opts::new("kudu_exporter_polls_total", "Upstream polls by result."),
                &["result"],
            )?,
            last_duration: Gauge::new(
                "kudu_exporter_last_poll_duration_seconds",
                "Duration of the last poll, fetch included.",
            )?,
            last_success: Gauge::new(
                "kudu_exporter_last_success_timestamp_seconds",
                "Unix time of the last successful poll.",
            )?,
            consecutive_failures: IntGauge::new(
                "kudu_exporter_consecutive_fetch_failures",
                "Consecutive failed upstream fetches.",
            )?,
            series: IntGauge::new("kudu_exporter_series", "Upstream series currently registered.")?,
            reloads: IntCounterVec::new(
                Opts::new("kudu_exporter_filter_reloads_total", "Filter reloads by result."),
                &["result"],
            )?,
        };

        registry.register(Box::new(stats.polls.clone()))?;
        registry.register(Box::new(stats.last_duration.clone()))?;
        registry.register(Box::new(stats.last_success.clone()))?;
        registry.register(Box::new(stats.consecutive_failures.clone()))?;
        registry.register(Box::new(stats.series.clone()))?;
        registry.register(Box::new(stats.reloads.clone()))?;
        Ok(stats)
    }

    pub fn record_poll(&self, result: PollResult, elapsed: Duration, consecutive_failures: u32) {
        self.polls.with_label_values(&[result.as_label()]).inc();
        self.last_duration.set(elapsed.as_secs_f64());
        self.consecutive_failures.set(i64::from(consecutive_failures));
        if result == PollResult::Success {
            self.last_success.set(epoch_secs());
        }
    }

    pub fn set_series(&self, count: usize) {
        self.series.set(count as i64);
    }

    pub fn record_reload(&self, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.reloads.with_label_values(&[result]).inc();
    }

    pub fn polls(&self, result: PollResult) -> u64 {
        self.polls.with_label_values(&[result.as_label()]).get()
    }

    pub fn consecutive_failures(&self) -> i64 {
        self.consecutive_failures.get()
    }

    /// Unix time of the last successful poll, `None` before the first one.
    pub fn last_success_epoch(&self) -> Option<u64> {
        let value = self.last_success.get();
        (value > 0.0).then_some(value as u64)
    }

    pub fn series(&self) -> i64 {
        self.series.get()
    }
}

fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_records() {
        let registry = Registry::new();
        let stats = PollStats::register(&registry).unwrap();
        assert_eq!(stats.last_success_epoch(), None);

        stats.record_poll(PollResult::FetchError, Duration::from_millis(20), 1);
        assert_eq!(stats.polls(PollResult::FetchError), 1);
        assert_eq!(stats.consecutive_failures(), 1);

        stats.record_poll(PollResult::Success, Duration::from_millis(20), 0);
        assert_eq!(stats.consecutive_failures(), 0);
        assert!(stats.last_success_epoch().is_some());

        let names: Vec<String> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"kudu_exporter_polls_total".to_string()));
        assert!(names.contains(&"kudu_exporter_last_poll_duration_seconds".to_string()));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        PollStats::register(&registry).unwrap();
        assert!(PollStats::register(&registry).is_err());
    }
}
