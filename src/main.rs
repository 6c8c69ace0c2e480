use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use turngate::controller::{run_controller, ControllerState};
use turngate::renderer::{DataplaneMode, RenderSettings};
use turngate::store::ResourceStore;
use turngate::CONTROLLER_NAME;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Dataplane topology: "managed" or "legacy"
    #[arg(long, env = "DATAPLANE_MODE", default_value = "managed")]
    dataplane_mode: String,

    /// Resolve live pod addresses for Service backends
    #[arg(long, env = "ENABLE_ENDPOINT_DISCOVERY", default_value_t = true)]
    enable_endpoint_discovery: bool,

    /// Use the EndpointSlice API instead of the legacy Endpoints API
    #[arg(long, env = "ENDPOINT_SLICE_API", default_value_t = true)]
    endpoint_slice_api: bool,

    /// Also relay to the backend Service's cluster IP
    #[arg(long, env = "ENABLE_RELAY_CLUSTER_IP")]
    enable_relay_cluster_ip: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Turngate Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Controller Name: {CONTROLLER_NAME}");
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_operator(args: RunArgs) -> anyhow::Result<()> {
    turngate::telemetry::init_tracing(args.log_json);

    let dataplane_mode: DataplaneMode = args
        .dataplane_mode
        .parse()
        .map_err(anyhow::Error::msg)?;
    let settings = RenderSettings {
        dataplane_mode,
        enable_endpoint_discovery: args.enable_endpoint_discovery,
        endpoint_slice_api: args.endpoint_slice_api,
        enable_relay_cluster_ip: args.enable_relay_cluster_ip,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %settings.dataplane_mode,
        "starting Turngate operator"
    );

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    info!("connected to Kubernetes cluster");

    let state = Arc::new(ControllerState {
        client,
        store: ResourceStore::new(),
        settings,
    });

    run_controller(state).await?;
    Ok(())
}
