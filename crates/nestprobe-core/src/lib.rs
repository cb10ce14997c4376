//! Nestprobe - an active path quality probing library.
//!
//! This crate provides the probing facility used by the standalone
//! `nestprobe` daemon.
//!
//! A [`Prober`] continuously emits UDP probe packets wrapped in one or more
//! layers of GRE encapsulation so that each router on a declared path
//! decapsulates and forwards the inner packet along a specific sequence of
//! hops before the probe returns to the prober itself.  Packet loss and
//! round-trip time are aggregated into fixed length time buckets which are
//! exposed as scrape-driven counters and gauges.
//!
//! The [`ProberManager`] reconciles a set of running probers against a
//! declarative [`Config`]: one prober per (path, traffic class) pair is
//! started, stopped or recreated as the configuration changes.
//!
//! # Example
//!
//! The following example loads a configuration and starts a prober for every
//! (path, class) pair it declares:
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use nestprobe_core::{Config, ProberManager};
//!
//! let mut config: Config = serde_yaml::from_str(
//!     r"
//! routers:
//!   - name: lab1
//!     dst_range: 10.0.0.0/28
//! paths:
//!   - name: lab
//!     hops: [ lab1 ]
//! ",
//! )?;
//! config.apply_defaults();
//! config.validate()?;
//! let manager = ProberManager::new();
//! manager.configure(&config)?;
//! # Ok(())
//! # }
//! ```
#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::use_self,
    clippy::option_if_let_else,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![deny(unsafe_code)]

mod clock;
mod collector;
mod config;
mod error;
mod flight;
mod manager;
mod measurement;
mod net;
mod packet;
mod pool;
mod probe;
mod prober;
mod types;

pub use clock::{Clock, SystemClock};
pub use collector::{MetricKind, Series, METRIC_PREFIX};
pub use config::{
    defaults, Class, Config, Defaults, Hop, Label, PathConfig, ProberConfig, RouterConfig,
};
pub use error::ProberError;
pub use flight::FlightTable;
pub use manager::{ProberKey, ProberManager};
pub use measurement::{align, Bucket, MeasurementStore};
pub use packet::MAX_PACKET_SIZE;
pub use pool::AddrPool;
pub use probe::{Probe, PROBE_SIZE};
pub use prober::Prober;
pub use types::{IpVersion, Port, TypeOfService};
