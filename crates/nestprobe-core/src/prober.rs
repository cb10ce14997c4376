use crate::clock::{Clock, SystemClock};
use crate::config::ProberConfig;
use crate::error::ProbeResult;
use crate::flight::FlightTable;
use crate::measurement::{align, MeasurementStore};
use crate::net::raw::RawSocket;
use crate::net::recv::RecvSocket;
use crate::net::source;
use crate::packet::{PacketBuilder, MAX_PACKET_SIZE};
use crate::probe::Probe;
use crate::types::Port;
use parking_lot::Mutex;
use rand::Rng;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How long a blocking UDP read may go without observing the stop signal.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// The granularity at which sleeping loops observe the stop signal.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The interval of the bucket cleaner.
const CLEANER_INTERVAL: Duration = Duration::from_secs(1);

/// A prober instance for one (path, traffic class) pair.
///
/// Once started, four threads cooperate: the sender paces probe emission at
/// the configured packet rate, the receiver reads returning probes and
/// credits round-trip times, the timeout reaper evicts probes whose reply is
/// overdue, and the bucket cleaner trims buckets that can no longer be
/// credited.  A prober is never reconfigured in place: the manager stops it
/// and creates a fresh instance instead.
#[derive(Debug)]
pub struct Prober {
    inner: Arc<ProberInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug)]
struct ProberInner {
    config: ProberConfig,
    clock: Arc<dyn Clock>,
    flight: FlightTable,
    measurements: MeasurementStore,
    probes_sent: AtomicU64,
    probes_received: AtomicU64,
    late_packets: AtomicU64,
    stopped: AtomicBool,
}

impl Prober {
    /// Create a prober driven by the system clock.
    #[must_use]
    pub fn new(config: ProberConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub(crate) fn with_clock(config: ProberConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ProberInner {
                config,
                clock,
                flight: FlightTable::new(),
                measurements: MeasurementStore::new(),
                probes_sent: AtomicU64::new(0),
                probes_received: AtomicU64::new(0),
                late_packets: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Bind the sockets and start the prober threads.
    ///
    /// Fails if the raw socket cannot be created (GRE sockets require
    /// privilege) or no UDP receive port is free at or above the base port.
    pub fn start(&self) -> ProbeResult<()> {
        let config = &self.inner.config;
        let raw_socket = RawSocket::new(config.ip_version, config.class.tos)?;
        let recv_socket = RecvSocket::bind(config.ip_version, config.base_port)?;
        recv_socket.set_read_timeout(READ_TIMEOUT)?;
        let port = recv_socket.port();
        let local_addr = source::resolve_local_addr(
            config.configured_src_addr,
            config.hops[0].dst_range.first(),
        )?;
        info!(
            "starting prober for path {} class {} on UDP port {}",
            config.path_name, config.class.name, port.0
        );
        let mut handles = self.handles.lock();
        let inner = Arc::clone(&self.inner);
        handles.push(thread::spawn(move || {
            inner.sender(&raw_socket, port, local_addr);
        }));
        let inner = Arc::clone(&self.inner);
        handles.push(thread::spawn(move || inner.receiver(&recv_socket)));
        let inner = Arc::clone(&self.inner);
        handles.push(thread::spawn(move || inner.reaper()));
        let inner = Arc::clone(&self.inner);
        handles.push(thread::spawn(move || inner.cleaner()));
        Ok(())
    }

    /// Signal all prober threads to stop and wait for them to exit.
    ///
    /// Idempotent; once this returns no further probe is sent and the UDP
    /// receive port has been released.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        debug!(
            "prober for path {} class {} stopped",
            self.inner.config.path_name, self.inner.config.class.name
        );
    }

    /// The configuration this prober was created from.
    #[must_use]
    pub fn config(&self) -> &ProberConfig {
        &self.inner.config
    }

    /// Count of probes handed to the raw socket.
    #[must_use]
    pub fn probes_sent(&self) -> u64 {
        self.inner.probes_sent.load(Ordering::Relaxed)
    }

    /// Count of datagrams read from the receive socket.
    #[must_use]
    pub fn probes_received(&self) -> u64 {
        self.inner.probes_received.load(Ordering::Relaxed)
    }

    /// Count of replies that arrived after the timeout.
    #[must_use]
    pub fn late_packets(&self) -> u64 {
        self.inner.late_packets.load(Ordering::Relaxed)
    }

    /// The start timestamp of the most recent finished bucket.
    #[must_use]
    pub fn last_finished_bucket(&self) -> i64 {
        self.inner.last_finished_bucket()
    }

    pub(crate) fn measurements(&self) -> &MeasurementStore {
        &self.inner.measurements
    }

    #[cfg(test)]
    pub(crate) fn flight(&self) -> &FlightTable {
        &self.inner.flight
    }

    #[cfg(test)]
    pub(crate) fn add_late_packets(&self, count: u64) {
        self.inner.late_packets.fetch_add(count, Ordering::Relaxed);
    }
}

impl ProberInner {
    /// The paced probe emitter.
    ///
    /// Starts after a random jitter of up to the timeout so that multiple
    /// probers do not phase-lock, then ticks at `1s / PPS`.  The in-flight
    /// entry is inserted before the packet reaches the raw socket so a reply
    /// can never race ahead of it.
    fn sender(&self, raw_socket: &RawSocket, port: Port, local_addr: IpAddr) {
        let config = &self.config;
        let max_jitter_us = config.timeout.as_millis() as u64;
        let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..=max_jitter_us));
        if !self.sleep_unless_stopped(jitter) {
            return;
        }
        let payload = vec![0_u8; config.payload_size];
        let builder = PacketBuilder::new(
            &config.hops,
            config.class.tos,
            config.ip_version,
            port,
            local_addr,
            &payload,
        );
        let interval = tick_interval(config.pps);
        let mut next_tick = Instant::now() + interval;
        let mut sequence = 0_u64;
        loop {
            let now = Instant::now();
            if next_tick > now && !self.sleep_unless_stopped(next_tick - now) {
                return;
            }
            if self.stopped() {
                return;
            }
            next_tick += interval;
            if next_tick < Instant::now() {
                // a stall longer than the interval coalesces the missed ticks
                next_tick = Instant::now() + interval;
            }
            let probe = Probe::new(sequence, self.clock.now_ns());
            let packet = match builder.build(&probe) {
                Ok(packet) => packet,
                Err(err) => {
                    error!("unable to build packet for sequence {sequence}: {err}");
                    continue;
                }
            };
            self.flight.insert(probe.sequence, probe.sent_at);
            self.measurements
                .record_sent(probe.sent_at, config.bucket_length);
            let src = config.src_addrs.addr(sequence);
            let dst = config.hops[0].dst_range.addr(sequence);
            if let Err(err) = raw_socket.send(&packet, src, dst) {
                // the bucket keeps the send: local loss is still path loss
                error!("unable to send probe {sequence}: {err}");
                let _ = self.flight.remove(sequence);
                continue;
            }
            self.probes_sent.fetch_add(1, Ordering::Relaxed);
            sequence += 1;
        }
    }

    /// The reply reader.
    ///
    /// Replies that no longer have an in-flight entry were either reaped as
    /// lost or are stray traffic and are ignored; replies beyond the timeout
    /// only count towards the late counter.  A decode failure terminates the
    /// loop: it means something other than a matched prober is talking to
    /// this port.
    fn receiver(&self, recv_socket: &RecvSocket) {
        let config = &self.config;
        let timeout_ns = config.timeout.as_nanos() as i64;
        let mut buf = [0_u8; MAX_PACKET_SIZE];
        loop {
            if self.stopped() {
                return;
            }
            let len = match recv_socket.recv(&mut buf) {
                Ok(len) => len,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(err) => {
                    error!("unable to read from UDP socket: {err}");
                    return;
                }
            };
            let now = self.clock.now_ns();
            self.probes_received.fetch_add(1, Ordering::Relaxed);
            let probe = match Probe::decode(&buf[..len]) {
                Ok(probe) => probe,
                Err(err) => {
                    error!("unable to decode probe: {err}");
                    return;
                }
            };
            if !self.flight.remove(probe.sequence) {
                // already reaped as lost, or stray traffic
                continue;
            }
            let rtt_ns = now - probe.sent_at;
            if rtt_ns > timeout_ns {
                self.late_packets.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.measurements.record_recv(
                probe.sent_at,
                u64::try_from(rtt_ns).unwrap_or_default(),
                config.bucket_length,
            );
        }
    }

    /// Evict in-flight probes whose reply is overdue; they are permanently
    /// lost.
    fn reaper(&self) {
        let bucket_ns = self.config.bucket_length.as_nanos() as i64;
        loop {
            if !self.sleep_unless_stopped(self.config.bucket_length) {
                return;
            }
            let cutoff = self.clock.now_ns() - 3 * bucket_ns;
            for sequence in self.flight.drain_older_than(cutoff) {
                debug!("probe {sequence} timed out");
            }
        }
    }

    /// Trim buckets that can no longer be credited.
    fn cleaner(&self) {
        loop {
            if !self.sleep_unless_stopped(CLEANER_INTERVAL) {
                return;
            }
            self.measurements
                .prune_older_than(self.last_finished_bucket());
        }
    }

    /// The largest bucket start that can no longer receive credit, aligned
    /// to the bucket length.
    fn last_finished_bucket(&self) -> i64 {
        let bucket_ns = self.config.bucket_length.as_nanos() as i64;
        let timeout_ns = self.config.timeout.as_nanos() as i64;
        let ts = self.clock.now_ns() - timeout_ns - bucket_ns;
        align(ts, self.config.bucket_length)
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, returning `false` as soon as the stop signal is
    /// observed.
    fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.stopped() {
                return false;
            }
            let chunk = remaining.min(STOP_POLL_INTERVAL);
            thread::sleep(chunk);
            remaining -= chunk;
        }
        !self.stopped()
    }
}

/// The sender pacing interval for a packet rate.
fn tick_interval(pps: u64) -> Duration {
    Duration::from_secs(1) / pps as u32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::tests::FixedClock;
    use crate::config::{Class, Hop};
    use crate::pool::AddrPool;
    use crate::types::{IpVersion, TypeOfService};
    use std::str::FromStr;

    pub(crate) fn test_config() -> ProberConfig {
        ProberConfig {
            path_name: String::from("lab"),
            base_port: Port(32768),
            configured_src_addr: Some(IpAddr::from_str("10.255.3.1").unwrap()),
            src_addrs: AddrPool::from_cidr("169.254.0.0/31").unwrap(),
            hops: vec![Hop {
                name: String::from("first-hop"),
                dst_range: AddrPool::from_cidr("10.255.0.1/32").unwrap(),
                src_range: AddrPool::from_cidr("10.255.1.1/32").unwrap(),
            }],
            static_labels: Vec::new(),
            class: Class {
                name: String::from("BE"),
                tos: TypeOfService(0x00),
            },
            pps: 25,
            payload_size: 0,
            bucket_length: Duration::from_millis(1000),
            timeout: Duration::from_millis(200),
            ip_version: IpVersion::V4,
        }
    }

    #[test]
    fn test_last_finished_bucket() {
        let prober = Prober::with_clock(
            test_config(),
            Arc::new(FixedClock(1_542_556_558_000_000_000)),
        );
        assert_eq!(1_542_556_556_000_000_000, prober.last_finished_bucket());
    }

    #[test]
    fn test_last_finished_bucket_mid_bucket() {
        let prober = Prober::with_clock(
            test_config(),
            Arc::new(FixedClock(1_542_556_558_250_000_000)),
        );
        assert_eq!(1_542_556_557_000_000_000, prober.last_finished_bucket());
    }

    #[test]
    fn test_tick_interval() {
        assert_eq!(Duration::from_secs(1), tick_interval(1));
        assert_eq!(Duration::from_millis(40), tick_interval(25));
        assert_eq!(Duration::from_millis(10), tick_interval(100));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let prober = Prober::new(test_config());
        prober.stop();
        prober.stop();
    }

    #[test]
    fn test_counters_start_at_zero() {
        let prober = Prober::new(test_config());
        assert_eq!(0, prober.probes_sent());
        assert_eq!(0, prober.probes_received());
        assert_eq!(0, prober.late_packets());
        assert!(prober.flight().is_empty());
    }
}
