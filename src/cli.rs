//! CLI for this application
//!
use crate::error::Result;
use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("QUILLON_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("QUILLON_HTTP_LISTEN_PORT"),
        help = "Port to bind the Quillon HTTP API server to"
    )]
    pub listen_port: u16,

    // Mix RPC listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_MIX,
        env("QUILLON_MIX_LISTEN_PORT"),
        help = "Port to bind the Quillon mix RPC server to"
    )]
    pub listen_port_mix: u16,

    // Logical service identity in the cluster registry
    #[clap(
        long,
        default_value = "classifier",
        env("QUILLON_SERVICE_KIND"),
        help = "Engine kind this node registers as"
    )]
    pub service_kind: String,

    #[clap(
        long,
        default_value = "default",
        env("QUILLON_SERVICE_NAME"),
        help = "Deployment name this node registers under"
    )]
    pub service_name: String,

    // Mix trigger settings
    #[clap(
        long,
        default_value = "512",
        env("QUILLON_COUNT_THRESHOLD"),
        help = "Local updates before a mix fires (0 disables the count trigger)"
    )]
    pub count_threshold: u32,

    #[clap(
        long,
        default_value = "16",
        env("QUILLON_TICK_THRESHOLD_SECS"),
        help = "Seconds since the last mix before one fires (0 disables the tick trigger)"
    )]
    pub tick_threshold_secs: u64,

    #[clap(
        long,
        default_value = "10",
        env("QUILLON_RPC_TIMEOUT_SECS"),
        help = "Per-call timeout for peer RPCs in seconds"
    )]
    pub rpc_timeout_secs: u64,

    #[clap(
        long,
        default_value = "64",
        env("QUILLON_MODEL_DIMENSIONS"),
        help = "Dimensionality of the served weight vector"
    )]
    pub model_dimensions: usize,

    // Cluster configuration information: topology
    #[clap(
        long,
        env("QUILLON_TOPOLOGY"),
        value_delimiter = ',',
        help = "Peer mix addresses (e.g., 10.0.0.2:8631,10.0.0.3:8631). If empty, runs without peers."
    )]
    pub topology: Vec<String>,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let topology = settings::parse_topology(&self.topology)?;
        Ok(settings::Settings {
            listen_address: self.listen_address,
            listen_port_http: self.listen_port,
            listen_port_mix: self.listen_port_mix,
            service_kind: self.service_kind,
            service_name: self.service_name,
            count_threshold: self.count_threshold,
            tick_threshold_secs: self.tick_threshold_secs,
            rpc_timeout_secs: self.rpc_timeout_secs,
            model_dimensions: self.model_dimensions,
            topology,
        })
    }
}
