use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Align a timestamp to the start of its measurement bucket.
///
/// `align(ts) = ts - ts % L` where `L` is the bucket length in nanoseconds,
/// so a timestamp exactly on the boundary belongs to the bucket starting at
/// that timestamp.
#[must_use]
pub fn align(ts_ns: i64, bucket_length: Duration) -> i64 {
    let length_ns = bucket_length.as_nanos() as i64;
    ts_ns - ts_ns % length_ns
}

/// Aggregated measurements for one time bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    /// Count of probes sent within the bucket.
    pub sent: u64,
    /// Count of replies credited to the bucket.
    pub received: u64,
    /// Sum of all credited round-trip times in nanoseconds.
    pub rtt_sum: u64,
    /// Smallest credited round-trip time; zero until the first sample.
    pub rtt_min: u64,
    /// Largest credited round-trip time.
    pub rtt_max: u64,
    /// The individual round-trip times in arrival order.
    pub rtts: Vec<u64>,
}

impl Bucket {
    /// The mean round-trip time, zero when nothing was received.
    #[must_use]
    pub fn rtt_avg(&self) -> u64 {
        if self.received == 0 {
            0
        } else {
            self.rtt_sum / self.received
        }
    }
}

/// The time-bucketed measurement store of one prober.
///
/// Buckets are keyed by their aligned start timestamp and created lazily by
/// [`MeasurementStore::record_sent`].  Replies never create a bucket: once
/// the bucket cleaner has pruned a bucket, any straggling reply for it is
/// dropped.
#[derive(Debug, Default)]
pub struct MeasurementStore {
    buckets: RwLock<HashMap<i64, Bucket>>,
}

impl MeasurementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a sent probe to the bucket holding `ts_ns`.
    pub fn record_sent(&self, ts_ns: i64, bucket_length: Duration) {
        let aligned = align(ts_ns, bucket_length);
        let mut buckets = self.buckets.write();
        buckets.entry(aligned).or_default().sent += 1;
    }

    /// Credit a reply to the bucket its probe was sent in.
    ///
    /// Returns `false` if the bucket has already been pruned, in which case
    /// the reply is dropped.
    pub fn record_recv(&self, sent_ts_ns: i64, rtt_ns: u64, bucket_length: Duration) -> bool {
        let aligned = align(sent_ts_ns, bucket_length);
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(&aligned) else {
            debug!("reply for pruned bucket {aligned}: sent at {sent_ts_ns}, rtt {rtt_ns}ns");
            return false;
        };
        bucket.received += 1;
        bucket.rtts.push(rtt_ns);
        bucket.rtt_sum += rtt_ns;
        if rtt_ns < bucket.rtt_min || bucket.rtt_min == 0 {
            bucket.rtt_min = rtt_ns;
        }
        if rtt_ns > bucket.rtt_max {
            bucket.rtt_max = rtt_ns;
        }
        true
    }

    /// Drop all buckets that start before `ts_ns`.
    pub fn prune_older_than(&self, ts_ns: i64) {
        self.buckets.write().retain(|start, _| *start >= ts_ns);
    }

    /// A deep copy of the bucket starting at `bucket_start_ns`, if present.
    #[must_use]
    pub fn snapshot(&self, bucket_start_ns: i64) -> Option<Bucket> {
        self.buckets.read().get(&bucket_start_ns).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }
}
