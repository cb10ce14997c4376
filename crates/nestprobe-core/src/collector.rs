use crate::config::Label;
use crate::prober::Prober;
use tracing::debug;

/// The prefix of every exported series name.
pub const METRIC_PREFIX: &str = "nestprobe_";

/// The kind of an exported series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One exported series: a snapshot value with its labels.
///
/// Counters are snapshot values, not rates: successive scrapes of the same
/// bucket observe identical values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub name: String,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: Vec<Label>,
    pub value: u64,
}

impl Prober {
    /// Collect the series for the most recent finished bucket.
    ///
    /// Returns nothing when no sends fell into that bucket.  The late packet
    /// counter is prober-level and cumulative, not bucket-scoped.
    #[must_use]
    pub fn collect(&self) -> Vec<Series> {
        let ts = self.last_finished_bucket();
        let Some(bucket) = self.measurements().snapshot(ts) else {
            debug!("requested bucket {ts} not found");
            return Vec::new();
        };
        let labels = self.labels();
        let series = |name: &str, help, kind, value| Series {
            name: format!("{METRIC_PREFIX}{name}"),
            help,
            kind,
            labels: labels.clone(),
            value,
        };
        vec![
            series(
                "packets_sent",
                "Sent packets",
                MetricKind::Counter,
                bucket.sent,
            ),
            series(
                "packets_received",
                "Received packets",
                MetricKind::Counter,
                bucket.received,
            ),
            series("rtt_min", "RTT Min", MetricKind::Gauge, bucket.rtt_min),
            series("rtt_max", "RTT Max", MetricKind::Gauge, bucket.rtt_max),
            series(
                "rtt_avg",
                "RTT Average",
                MetricKind::Gauge,
                bucket.rtt_avg(),
            ),
            series(
                "late_packets_total",
                "Replies received after the timeout",
                MetricKind::Counter,
                self.late_packets(),
            ),
        ]
    }

    /// The operator supplied static labels plus `tos` and `path`.
    fn labels(&self) -> Vec<Label> {
        let config = self.config();
        let mut labels = config.static_labels.clone();
        labels.push(Label {
            key: String::from("tos"),
            value: config.class.name.clone(),
        });
        labels.push(Label {
            key: String::from("path"),
            value: config.path_name.clone(),
        });
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::FixedClock;
    use crate::prober::tests::test_config;
    use std::sync::Arc;
    use std::time::Duration;

    // One second buckets, 200ms timeout: at t=1542556558s the most recent
    // finished bucket starts at 1542556556s.
    const NOW: i64 = 1_542_556_558_000_000_000;
    const BUCKET_START: i64 = 1_542_556_556_000_000_000;

    fn test_prober() -> Prober {
        Prober::with_clock(test_config(), Arc::new(FixedClock(NOW)))
    }

    fn fill_bucket(prober: &Prober) {
        let bucket_length = prober.config().bucket_length;
        for i in 0..5 {
            prober
                .measurements()
                .record_sent(BUCKET_START + i * 1_000_000, bucket_length);
        }
        for (ts, rtt) in [(0, 3_000_000), (1_000_000, 1_000_000), (2_000_000, 2_000_000)] {
            assert!(prober
                .measurements()
                .record_recv(BUCKET_START + ts, rtt, bucket_length));
        }
    }

    #[test]
    fn test_collect_empty_bucket_emits_nothing() {
        assert!(test_prober().collect().is_empty());
    }

    #[test]
    fn test_collect_reports_finished_bucket() {
        let prober = test_prober();
        fill_bucket(&prober);
        prober.add_late_packets(2);
        let series = prober.collect();
        let by_name = |name: &str| {
            series
                .iter()
                .find(|s| s.name == format!("{METRIC_PREFIX}{name}"))
                .unwrap()
        };
        assert_eq!(6, series.len());
        assert_eq!(5, by_name("packets_sent").value);
        assert_eq!(MetricKind::Counter, by_name("packets_sent").kind);
        assert_eq!(3, by_name("packets_received").value);
        assert_eq!(1_000_000, by_name("rtt_min").value);
        assert_eq!(3_000_000, by_name("rtt_max").value);
        assert_eq!(2_000_000, by_name("rtt_avg").value);
        assert_eq!(MetricKind::Gauge, by_name("rtt_avg").kind);
        assert_eq!(2, by_name("late_packets_total").value);
    }

    #[test]
    fn test_collect_is_stable_across_scrapes() {
        let prober = test_prober();
        fill_bucket(&prober);
        assert_eq!(prober.collect(), prober.collect());
    }

    #[test]
    fn test_labels_include_tos_and_path() {
        let prober = test_prober();
        fill_bucket(&prober);
        let series = prober.collect();
        let labels = &series[0].labels;
        assert!(labels
            .iter()
            .any(|label| label.key == "tos" && label.value == "BE"));
        assert!(labels
            .iter()
            .any(|label| label.key == "path" && label.value == "lab"));
    }

    #[test]
    fn test_unfinished_bucket_is_not_reported() {
        let prober = test_prober();
        let bucket_length = prober.config().bucket_length;
        // a send in the still-open bucket must not surface yet
        prober.measurements().record_sent(NOW, bucket_length);
        assert!(prober.collect().is_empty());
        assert_eq!(BUCKET_START, prober.last_finished_bucket());
    }
}
