//! # Tether CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the person directory on the configured address (127.0.0.1:9999)
//! tether server
//!
//! # Serve with a properties file
//! tether server --config rpc.properties
//!
//! # Run 5000 call rounds against the server
//! tether client --config rpc.properties
//!
//! # Run a smaller load
//! tether client -t 100
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use anyhow::{Context, Result};
use argh::FromArgs;
use tether_cli::{client_participants, server_participants, Customer, DEFAULT_TIMES};
use tether_common::config::RpcConfig;
use tether_container::Application;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Tether - remote calls over plain Rust traits
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Server**: serve the person directory
/// - **Client**: drive call rounds against a running server
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Server(ServerArgs),
    Client(ClientArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
/// serve the person directory
struct ServerArgs {
    /// properties file with address, port and other settings
    ///
    /// A missing file falls back to the defaults.
    #[argh(option, short = 'c')]
    config: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "client")]
/// run call rounds against a person server
struct ClientArgs {
    /// properties file with the server address and port
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// number of call rounds to submit to the worker pool
    #[argh(option, short = 't', default = "DEFAULT_TIMES")]
    times: usize,
}

fn load_config(path: Option<&str>) -> Result<RpcConfig> {
    match path {
        Some(path) => RpcConfig::load(path).with_context(|| format!("Failed to load config {}", path)),
        None => Ok(RpcConfig::default()),
    }
}

fn run_server(args: ServerArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    tracing::info!(endpoint = %config.endpoint(), "Starting person server");

    let application = Application::run(server_participants(), config)?;
    application.wait()?;
    application.close();
    Ok(())
}

fn run_client(args: ClientArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    tracing::info!(endpoint = %config.endpoint(), times = args.times, "Starting customer");

    let application = Application::run(client_participants(), config)?;
    let customer = application
        .container()?
        .get_by_type::<Customer>()?
        .context("Customer component missing")?;
    let report = customer.run(args.times);
    application.close();

    let report = report?;
    println!("{}", report);
    Ok(())
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to INFO, but allow RUST_LOG to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Server(args) => run_server(args),
        Commands::Client(args) => run_client(args),
    }
}
