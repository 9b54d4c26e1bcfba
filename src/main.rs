use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillon::api;
use quillon::cli;
use quillon::mixable::SharedModel;
use quillon::mixer::PushMixer;
use quillon::model::AveragedWeights;
use quillon::registry::StaticRegistry;
use quillon::server::MixServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quillon=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let settings = args.into_settings()?;
    let mix_settings = settings.mix_settings()?;

    let listen_address: IpAddr = settings.listen_address.parse()?;

    // The served model, shared between the HTTP update path and the mixer.
    let model = Arc::new(RwLock::new(AveragedWeights::new(settings.model_dimensions)));
    let shared: SharedModel = model.clone();

    let registry = Arc::new(StaticRegistry::new(settings.topology.clone()));
    let mixer = PushMixer::new(mix_settings, registry);
    mixer.set_mixable(shared)?;

    // Mix RPC surface for peers and operators
    let mix_address = SocketAddr::from((listen_address, settings.listen_port_mix));
    let mix_server = MixServer::bind(mix_address, mixer.clone()).await?;
    info!("Mix RPC listening on {}", mix_server.local_addr()?);
    mix_server.start();

    mixer.start().await?;

    // Operator HTTP API
    let api = api::router(api::ApiState {
        mixer: mixer.clone(),
        model,
    });
    let http_address = SocketAddr::from((listen_address, settings.listen_port_http));
    let listener = tokio::net::TcpListener::bind(http_address).await?;
    info!("Starting Quillon on {}", http_address);
    axum::serve(listener, api).await?;

    mixer.stop().await;
    Ok(())
}
