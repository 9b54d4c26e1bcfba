//! Quillon application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{QuillonError, Result};

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8630;
pub const DEFAULT_PORT_HTTP: &str = "8630";
pub const STANDARD_PORT_MIX: u16 = 8631;
pub const DEFAULT_PORT_MIX: &str = "8631";

/// Logical identity a learner fleet registers under: the engine kind
/// (e.g. "classifier") plus a deployment name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceName {
    pub kind: String,
    pub name: String,
}

impl ServiceName {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Immutable configuration record for the push mixer, fixed at construction.
///
/// A zero `count_threshold` or zero `tick_threshold` disables that trigger;
/// both zero disables automatic mixing entirely (forced mixes still work).
#[derive(Clone, Debug)]
pub struct MixSettings {
    pub count_threshold: u32,
    pub tick_threshold: Duration,
    pub rpc_timeout: Duration,
    pub self_id: SocketAddr,
    pub service: ServiceName,
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port_http: u16,

    // Mix RPC listen port
    pub listen_port_mix: u16,

    // Logical service identity in the cluster registry
    pub service_kind: String,
    pub service_name: String,

    // Mix trigger: local updates before a mix fires (0 disables)
    pub count_threshold: u32,

    // Mix trigger: seconds since the last mix before one fires (0 disables)
    pub tick_threshold_secs: u64,

    // Per-call timeout for peer RPCs, in seconds
    pub rpc_timeout_secs: u64,

    // Dimensionality of the served weight vector
    pub model_dimensions: usize,

    // Cluster configuration information: peer mix addresses
    pub topology: Vec<SocketAddr>,
}

impl Settings {
    pub fn service(&self) -> ServiceName {
        ServiceName::new(self.service_kind.clone(), self.service_name.clone())
    }

    pub fn self_id(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen_address.parse().map_err(|_| {
            QuillonError::Config(format!("invalid listen address: {}", self.listen_address))
        })?;
        Ok(SocketAddr::from((ip, self.listen_port_mix)))
    }

    pub fn mix_settings(&self) -> Result<MixSettings> {
        if self.rpc_timeout_secs == 0 {
            return Err(QuillonError::Config(
                "rpc timeout must be at least one second".to_string(),
            ));
        }
        Ok(MixSettings {
            count_threshold: self.count_threshold,
            tick_threshold: Duration::from_secs(self.tick_threshold_secs),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            self_id: self.self_id()?,
            service: self.service(),
        })
    }
}

/// Parse `host:port` topology entries from the CLI or environment.
pub fn parse_topology(entries: &[String]) -> Result<Vec<SocketAddr>> {
    entries
        .iter()
        .map(|entry| {
            entry.parse::<SocketAddr>().map_err(|_| {
                QuillonError::Config(format!("invalid topology entry: {}", entry))
            })
        })
        .collect()
}
