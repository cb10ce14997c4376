use crate::error::{ProbeResult, ProberError};

/// The size of an encoded probe record in bytes.
pub const PROBE_SIZE: usize = 16;

/// A probe record as carried inside the innermost UDP payload.
///
/// The wire representation is 16 bytes in network byte order: an unsigned
/// 64 bit sequence number followed by a signed 64 bit send timestamp in
/// nanoseconds since the UNIX epoch.  The format carries no version marker;
/// it is private to matched sender/receiver pairs of the same build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Probe {
    /// The sequence number, strictly monotonic per prober.
    pub sequence: u64,
    /// The send timestamp in nanoseconds.
    pub sent_at: i64,
}

impl Probe {
    #[must_use]
    pub const fn new(sequence: u64, sent_at: i64) -> Self {
        Self { sequence, sent_at }
    }

    /// Encode the probe into its 16 byte wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; PROBE_SIZE] {
        let mut bytes = [0_u8; PROBE_SIZE];
        bytes[0..8].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.sent_at.to_be_bytes());
        bytes
    }

    /// Decode a probe from the leading 16 bytes of `data`.
    ///
    /// Fails with [`ProberError::ShortProbe`] if fewer than 16 bytes are
    /// provided.  Trailing bytes (the configured padding payload) are
    /// ignored.
    pub fn decode(data: &[u8]) -> ProbeResult<Self> {
        if data.len() < PROBE_SIZE {
            return Err(ProberError::ShortProbe(data.len()));
        }
        let sequence = u64::from_be_bytes(data[0..8].try_into().unwrap());
        let sent_at = i64::from_be_bytes(data[8..16].try_into().unwrap());
        Ok(Self { sequence, sent_at })
    }
}
