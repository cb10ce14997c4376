use crate::error::{IoError, IoOperation, IoResult, ProbeResult, ProberError};
use crate::types::{IpVersion, Port};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// The socket returning probes are received on.
///
/// Binding starts at the prober's base port and probes upward while the port
/// is busy; the port that won is stamped into every probe packet as both the
/// UDP source and destination port.
#[derive(Debug)]
pub(crate) struct RecvSocket {
    inner: UdpSocket,
    port: Port,
}

impl RecvSocket {
    pub(crate) fn bind(version: IpVersion, base_port: Port) -> ProbeResult<Self> {
        let unspecified = match version {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let mut port = base_port.0;
        loop {
            match UdpSocket::bind(SocketAddr::new(unspecified, port)) {
                Ok(inner) => {
                    return Ok(Self {
                        inner,
                        port: Port(port),
                    });
                }
                Err(err) => {
                    debug!("UDP port {port} is busy, trying the next one: {err}");
                    if port == u16::MAX {
                        return Err(ProberError::UdpPortsExhausted(base_port.0));
                    }
                    port += 1;
                }
            }
        }
    }

    pub(crate) const fn port(&self) -> Port {
        self.port
    }

    /// Bound the blocking read so the stop signal is observed.
    pub(crate) fn set_read_timeout(&self, timeout: Duration) -> IoResult<()> {
        self.inner
            .set_read_timeout(Some(timeout))
            .map_err(|err| IoError::Other(err, IoOperation::SetReadTimeout))
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.recv(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_scans_past_busy_port() {
        let first = RecvSocket::bind(IpVersion::V4, Port(40000)).unwrap();
        assert_eq!(Port(40000), first.port());
        let second = RecvSocket::bind(IpVersion::V4, Port(40000)).unwrap();
        assert_eq!(Port(40001), second.port());
    }

    #[test]
    fn test_port_released_on_drop() {
        {
            let socket = RecvSocket::bind(IpVersion::V4, Port(40100)).unwrap();
            assert_eq!(Port(40100), socket.port());
        }
        let socket = RecvSocket::bind(IpVersion::V4, Port(40100)).unwrap();
        assert_eq!(Port(40100), socket.port());
    }
}
