use crate::collector::Series;
use crate::config::{Config, Hop, ProberConfig};
use crate::error::{ProbeResult, ProberError};
use crate::pool::AddrPool;
use crate::prober::Prober;
use crate::types::{IpVersion, Port, TypeOfService};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{error, info};

/// The identity of a prober: one per (path, traffic class) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProberKey {
    pub path: String,
    pub tos: TypeOfService,
}

/// Reconciles the set of running probers against a declarative
/// configuration.
///
/// On every [`ProberManager::configure`] call the desired set is derived
/// from the configuration (the cross product of paths and classes) and
/// compared against the live set: missing probers are started, abandoned
/// probers are stopped and structurally changed probers are stopped and
/// recreated.  Scrape readers take the read side of the map lock;
/// reconfiguration takes the write side.
#[derive(Debug, Default)]
pub struct ProberManager {
    probers: RwLock<HashMap<ProberKey, Prober>>,
}

/// The actions a reconciliation pass has to take, in deterministic order.
#[derive(Debug, Default, PartialEq, Eq)]
struct Plan {
    start: Vec<ProberKey>,
    stop: Vec<ProberKey>,
    restart: Vec<ProberKey>,
}

impl ProberManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the live probers against `config`.
    ///
    /// Paths that reference unknown routers or mix address families are
    /// skipped with an error log; the remaining probers proceed.
    pub fn configure(&self, config: &Config) -> ProbeResult<()> {
        let desired = desired_prober_configs(config)?;
        let mut live = self.probers.write();
        let live_configs = live
            .iter()
            .map(|(key, prober)| (key.clone(), prober.config().clone()))
            .collect::<HashMap<_, _>>();
        let plan = reconcile(&live_configs, &desired);
        for key in &plan.stop {
            if let Some(prober) = live.remove(key) {
                info!("removing prober {} ({})", key.path, key.tos);
                prober.stop();
            }
        }
        for key in &plan.restart {
            if let Some(prober) = live.remove(key) {
                info!("reconfiguring prober {} ({})", key.path, key.tos);
                prober.stop();
            }
            start_prober(&mut live, key, desired[key].clone());
        }
        for key in &plan.start {
            info!("adding prober {} ({})", key.path, key.tos);
            start_prober(&mut live, key, desired[key].clone());
        }
        Ok(())
    }

    /// Collect the series of every live prober.
    #[must_use]
    pub fn collect(&self) -> Vec<Series> {
        self.probers
            .read()
            .values()
            .flat_map(Prober::collect)
            .collect()
    }

    /// Stop and remove every live prober.
    pub fn stop_all(&self) {
        for (key, prober) in self.probers.write().drain() {
            info!("removing prober {} ({})", key.path, key.tos);
            prober.stop();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.probers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probers.read().is_empty()
    }
}

fn start_prober(live: &mut HashMap<ProberKey, Prober>, key: &ProberKey, config: ProberConfig) {
    let prober = Prober::new(config);
    match prober.start() {
        Ok(()) => {
            live.insert(key.clone(), prober);
        }
        Err(err) => {
            error!("unable to start prober {} ({}): {err}", key.path, key.tos);
        }
    }
}

/// Derive the desired prober set: the cross product of paths and classes.
fn desired_prober_configs(config: &Config) -> ProbeResult<HashMap<ProberKey, ProberConfig>> {
    let src_addrs = AddrPool::from_cidr(config.src_range())?;
    let classes = config.classes();
    let mut desired = HashMap::new();
    for (index, path) in config.paths.iter().enumerate() {
        let hops = match config.path_hops(path) {
            Ok(hops) => hops,
            Err(err) => {
                error!("unable to create hops for path {}: {err}", path.name);
                continue;
            }
        };
        if hops.is_empty() {
            error!("path {} has no hops", path.name);
            continue;
        }
        let ip_version = match path_ip_version(&hops, &src_addrs, &path.name) {
            Ok(version) => version,
            Err(err) => {
                error!("unable to probe path {}: {err}", path.name);
                continue;
            }
        };
        let configured_src_addr = match config.configured_src_addr(ip_version) {
            Ok(addr) => addr,
            Err(err) => {
                error!("unable to get configured src addr for path {}: {err}", path.name);
                continue;
            }
        };
        for class in &classes {
            let key = ProberKey {
                path: path.name.clone(),
                tos: class.tos,
            };
            desired.insert(
                key,
                ProberConfig {
                    path_name: path.name.clone(),
                    base_port: Port(config.base_port().saturating_add(index as u16)),
                    configured_src_addr,
                    src_addrs: src_addrs.clone(),
                    hops: hops.clone(),
                    static_labels: path.static_labels(),
                    class: class.clone(),
                    pps: path.pps(),
                    payload_size: path.payload_size(),
                    bucket_length: path.bucket_length(),
                    timeout: path.timeout(),
                    ip_version,
                },
            );
        }
    }
    Ok(desired)
}

/// The IP version a path is probed with: the family of the first hop's
/// source pool.  Paths mixing families, or whose family differs from the
/// outer source pool, cannot be probed.
fn path_ip_version(
    hops: &[Hop],
    src_addrs: &AddrPool,
    path_name: &str,
) -> ProbeResult<IpVersion> {
    let version = hops[0].src_range.version();
    let uniform = hops
        .iter()
        .all(|hop| hop.src_range.version() == version && hop.dst_range.version() == version);
    if !uniform || src_addrs.version() != version {
        return Err(ProberError::MixedAddressFamily(path_name.to_string()));
    }
    Ok(version)
}

/// Compute which probers to start, stop and recreate.
///
/// A prober is recreated when any field of its resolved configuration
/// differs, down to the element-wise order of its address pools.
fn reconcile(
    live: &HashMap<ProberKey, ProberConfig>,
    desired: &HashMap<ProberKey, ProberConfig>,
) -> Plan {
    let mut plan = Plan::default();
    for (key, config) in desired {
        match live.get(key) {
            None => plan.start.push(key.clone()),
            Some(live_config) if live_config != config => plan.restart.push(key.clone()),
            Some(_) => {}
        }
    }
    for key in live.keys() {
        if !desired.contains_key(key) {
            plan.stop.push(key.clone());
        }
    }
    plan.start.sort();
    plan.stop.sort();
    plan.restart.sort();
    plan
}
