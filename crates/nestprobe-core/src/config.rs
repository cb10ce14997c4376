use crate::error::{ProbeResult, ProberError};
use crate::net::source;
use crate::pool::AddrPool;
use crate::types::{IpVersion, Port, TypeOfService};
use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Default values for configuration.
pub mod defaults {
    use std::time::Duration;

    /// The default value for `metrics_path`.
    pub const DEFAULT_METRICS_PATH: &str = "/metrics";

    /// The default value for `listen_address`.
    pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9517";

    /// The default value for `base_port`.
    pub const DEFAULT_BASE_PORT: u16 = 32768;

    /// The default value for `measurement_length_ms`.
    pub const DEFAULT_MEASUREMENT_LENGTH: Duration = Duration::from_millis(1000);

    /// The default value for `payload_size_bytes`.
    pub const DEFAULT_PAYLOAD_SIZE_BYTES: u64 = 0;

    /// The default value for `pps`.
    pub const DEFAULT_PPS: u64 = 25;

    /// The default value for `timeout`.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    /// The default value for `src_range` on IPv4 paths.
    pub const DEFAULT_SRC_RANGE_V4: &str = "169.254.0.0/16";

    /// The default value for `src_range` on IPv6 paths.
    pub const DEFAULT_SRC_RANGE_V6: &str = "fc00::/112";

    /// The name of the default traffic class.
    pub const DEFAULT_CLASS_NAME: &str = "BE";

    /// The TOS byte of the default traffic class.
    pub const DEFAULT_CLASS_TOS: u8 = 0x00;
}

/// The declarative prober configuration.
///
/// All optional fields are filled in by a single [`Config::apply_defaults`]
/// pass after loading; [`Config::validate`] rejects documents that reference
/// unknown routers or carry oversized address ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The HTTP path the scrape endpoint is served on.
    pub metrics_path: Option<String>,
    /// The HTTP listen address as `<ip>:<port>` (IPv6 as `[addr]:port`).
    pub listen_address: Option<String>,
    /// The first UDP receive port to try; prober `i` starts at `base_port + i`.
    pub base_port: Option<u16>,
    /// Defaults applied to paths and routers that omit a setting.
    pub defaults: Option<Defaults>,
    /// The range the outer source addresses are drawn from.
    pub src_range: Option<String>,
    /// The traffic classes to probe each path with.
    pub classes: Option<Vec<Class>>,
    /// The paths to probe.
    #[serde(default)]
    pub paths: Vec<PathConfig>,
    /// The routers paths may reference as hops.
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

/// The defaults section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub measurement_length_ms: Option<u64>,
    pub payload_size_bytes: Option<u64>,
    pub pps: Option<u64>,
    pub src_range: Option<String>,
    pub timeout: Option<u64>,
    pub src_interface: Option<String>,
}

/// A traffic class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Class {
    pub name: String,
    pub tos: TypeOfService,
}

/// A path to be probed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    pub name: String,
    pub hops: Vec<String>,
    pub measurement_length_ms: Option<u64>,
    pub payload_size_bytes: Option<u64>,
    pub pps: Option<u64>,
    pub timeout: Option<u64>,
    /// Static labels stamped on every series of this path's probers.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A router that may be used as an explicit hop in a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    pub name: String,
    pub dst_range: String,
    pub src_range: Option<String>,
}

/// A resolved hop: a named waypoint with materialized address pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub name: String,
    pub dst_range: AddrPool,
    pub src_range: AddrPool,
}

/// A static label attached to every series of a prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// The fully resolved configuration of a single prober instance.
///
/// Structural equality over this type decides whether a live prober must be
/// recreated on reconfiguration: address pools compare element-wise in
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberConfig {
    pub path_name: String,
    pub base_port: Port,
    pub configured_src_addr: Option<IpAddr>,
    pub src_addrs: AddrPool,
    pub hops: Vec<Hop>,
    pub static_labels: Vec<Label>,
    pub class: Class,
    pub pps: u64,
    pub payload_size: usize,
    pub bucket_length: Duration,
    pub timeout: Duration,
    pub ip_version: IpVersion,
}

impl Config {
    /// Fill in every missing optional field from the defaults.
    ///
    /// The default source range follows the address family of the first
    /// router's destination range; IPv4 when there are no routers.
    pub fn apply_defaults(&mut self) {
        let v6 = self.routers.first().is_some_and(|router| {
            router
                .dst_range
                .parse::<IpNetwork>()
                .is_ok_and(|network| network.is_ipv6())
        });
        let dflt_src_range = if v6 {
            defaults::DEFAULT_SRC_RANGE_V6
        } else {
            defaults::DEFAULT_SRC_RANGE_V4
        };
        let dflts = self.defaults.get_or_insert_with(Defaults::default);
        dflts
            .measurement_length_ms
            .get_or_insert(defaults::DEFAULT_MEASUREMENT_LENGTH.as_millis() as u64);
        dflts
            .payload_size_bytes
            .get_or_insert(defaults::DEFAULT_PAYLOAD_SIZE_BYTES);
        dflts.pps.get_or_insert(defaults::DEFAULT_PPS);
        dflts
            .timeout
            .get_or_insert(defaults::DEFAULT_TIMEOUT.as_millis() as u64);
        dflts
            .src_range
            .get_or_insert_with(|| dflt_src_range.to_string());
        if self.src_range.is_none() {
            self.src_range.clone_from(&dflts.src_range);
        }
        self.metrics_path
            .get_or_insert_with(|| defaults::DEFAULT_METRICS_PATH.to_string());
        self.listen_address
            .get_or_insert_with(|| defaults::DEFAULT_LISTEN_ADDRESS.to_string());
        self.base_port.get_or_insert(defaults::DEFAULT_BASE_PORT);
        for path in &mut self.paths {
            path.measurement_length_ms
                .get_or_insert_with(|| dflts.measurement_length_ms.unwrap_or_default());
            path.payload_size_bytes
                .get_or_insert_with(|| dflts.payload_size_bytes.unwrap_or_default());
            path.pps
                .get_or_insert_with(|| dflts.pps.unwrap_or_default());
            path.timeout
                .get_or_insert_with(|| dflts.timeout.unwrap_or_default());
        }
        for router in &mut self.routers {
            if router.src_range.is_none() {
                router.src_range.clone_from(&dflts.src_range);
            }
        }
        self.classes.get_or_insert_with(|| {
            vec![Class {
                name: defaults::DEFAULT_CLASS_NAME.to_string(),
                tos: TypeOfService(defaults::DEFAULT_CLASS_TOS),
            }]
        });
    }

    /// Validate the configuration.
    ///
    /// Rejects paths referencing unknown routers, unparsable or oversized
    /// address ranges and paced rates of zero.
    pub fn validate(&self) -> ProbeResult<()> {
        for path in &self.paths {
            if path.hops.is_empty() {
                return Err(ProberError::BadConfig(format!(
                    "path {} has no hops",
                    path.name
                )));
            }
            for hop in &path.hops {
                if !self.routers.iter().any(|router| router.name == *hop) {
                    return Err(ProberError::UnknownRouter {
                        path: path.name.clone(),
                        router: hop.clone(),
                    });
                }
            }
            if path.pps == Some(0) {
                return Err(ProberError::BadConfig(format!(
                    "path {} has a packet rate of zero",
                    path.name
                )));
            }
        }
        for router in &self.routers {
            AddrPool::from_cidr(&router.dst_range)?;
            if let Some(src_range) = &router.src_range {
                AddrPool::from_cidr(src_range)?;
            }
        }
        if let Some(src_range) = &self.src_range {
            AddrPool::from_cidr(src_range)?;
        }
        Ok(())
    }

    /// Resolve the hops of a path against the declared routers.
    pub fn path_hops(&self, path: &PathConfig) -> ProbeResult<Vec<Hop>> {
        path.hops
            .iter()
            .map(|name| {
                let router = self
                    .routers
                    .iter()
                    .find(|router| router.name == *name)
                    .ok_or_else(|| ProberError::UnknownRouter {
                        path: path.name.clone(),
                        router: name.clone(),
                    })?;
                Ok(Hop {
                    name: router.name.clone(),
                    dst_range: AddrPool::from_cidr(&router.dst_range)?,
                    src_range: AddrPool::from_cidr(router.src_range.as_deref().unwrap_or_else(
                        || {
                            self.defaults
                                .as_ref()
                                .and_then(|dflts| dflts.src_range.as_deref())
                                .unwrap_or(defaults::DEFAULT_SRC_RANGE_V4)
                        },
                    ))?,
                })
            })
            .collect()
    }

    /// The address of the configured source interface for the given family,
    /// if a source interface is configured.
    pub fn configured_src_addr(&self, version: IpVersion) -> ProbeResult<Option<IpAddr>> {
        let Some(interface) = self
            .defaults
            .as_ref()
            .and_then(|dflts| dflts.src_interface.as_deref())
        else {
            return Ok(None);
        };
        source::lookup_interface_addr(version, interface).map(Some)
    }

    #[must_use]
    pub fn metrics_path(&self) -> &str {
        self.metrics_path
            .as_deref()
            .unwrap_or(defaults::DEFAULT_METRICS_PATH)
    }

    #[must_use]
    pub fn listen_address(&self) -> &str {
        self.listen_address
            .as_deref()
            .unwrap_or(defaults::DEFAULT_LISTEN_ADDRESS)
    }

    #[must_use]
    pub fn base_port(&self) -> u16 {
        self.base_port.unwrap_or(defaults::DEFAULT_BASE_PORT)
    }

    #[must_use]
    pub fn src_range(&self) -> &str {
        self.src_range
            .as_deref()
            .unwrap_or(defaults::DEFAULT_SRC_RANGE_V4)
    }

    #[must_use]
    pub fn classes(&self) -> Vec<Class> {
        self.classes.clone().unwrap_or_else(|| {
            vec![Class {
                name: defaults::DEFAULT_CLASS_NAME.to_string(),
                tos: TypeOfService(defaults::DEFAULT_CLASS_TOS),
            }]
        })
    }
}

impl PathConfig {
    #[must_use]
    pub fn bucket_length(&self) -> Duration {
        self.measurement_length_ms
            .map_or(defaults::DEFAULT_MEASUREMENT_LENGTH, Duration::from_millis)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
            .map_or(defaults::DEFAULT_TIMEOUT, Duration::from_millis)
    }

    #[must_use]
    pub fn pps(&self) -> u64 {
        self.pps.unwrap_or(defaults::DEFAULT_PPS)
    }

    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload_size_bytes
            .unwrap_or(defaults::DEFAULT_PAYLOAD_SIZE_BYTES) as usize
    }

    /// The path's static labels as ordered key/value pairs.
    #[must_use]
    pub fn static_labels(&self) -> Vec<Label> {
        self.labels
            .iter()
            .map(|(key, value)| Label {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}
