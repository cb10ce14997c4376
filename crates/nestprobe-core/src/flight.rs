use parking_lot::Mutex;
use std::collections::HashMap;

/// The set of probes that have been sent and are awaiting a reply.
///
/// Entries are inserted by the sender before the packet leaves the raw
/// socket, and removed either by the receiver when the reply arrives or by
/// the timeout reaper once the reply is overdue.  [`FlightTable::remove`] is
/// the sole path that credits a reply as not late: the reaper competes for
/// the same removal and wins when replies exceed the timeout.
#[derive(Debug, Default)]
pub struct FlightTable {
    probes: Mutex<HashMap<u64, i64>>,
}

impl FlightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe as in flight.
    pub fn insert(&self, sequence: u64, sent_at: i64) {
        self.probes.lock().insert(sequence, sent_at);
    }

    /// Remove a probe, returning whether it was still in flight.
    #[must_use]
    pub fn remove(&self, sequence: u64) -> bool {
        self.probes.lock().remove(&sequence).is_some()
    }

    /// Remove and return the sequence numbers of all probes sent before
    /// `cutoff_ns`.
    pub fn drain_older_than(&self, cutoff_ns: i64) -> Vec<u64> {
        let mut probes = self.probes.lock();
        let timed_out = probes
            .iter()
            .filter(|(_, sent_at)| **sent_at < cutoff_ns)
            .map(|(sequence, _)| *sequence)
            .collect::<Vec<_>>();
        for sequence in &timed_out {
            probes.remove(sequence);
        }
        timed_out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let table = FlightTable::new();
        table.insert(1, 100);
        table.insert(2, 200);
        assert_eq!(2, table.len());
        assert!(table.remove(1));
        assert!(!table.remove(1));
        assert!(!table.remove(3));
        assert_eq!(1, table.len());
    }

    #[test]
    fn test_insert_same_sequence_overwrites() {
        let table = FlightTable::new();
        table.insert(1, 100);
        table.insert(1, 200);
        assert_eq!(1, table.len());
        assert!(table.remove(1));
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_older_than() {
        let table = FlightTable::new();
        table.insert(1, 100);
        table.insert(2, 200);
        table.insert(3, 300);
        let mut drained = table.drain_older_than(300);
        drained.sort_unstable();
        assert_eq!(vec![1, 2], drained);
        assert_eq!(1, table.len());
        assert!(table.remove(3));
    }

    #[test]
    fn test_drain_empty() {
        let table = FlightTable::new();
        assert!(table.drain_older_than(i64::MAX).is_empty());
    }
}
