//! Buswatch server binary.
//!
//! # Usage
//!
//! ```bash
//! # Seed a driver record
//! buswatch-server add-driver --id 42 --name "A" --phone 555 --vehicle BUS-7
//!
//! # Run the relay
//! buswatch-server serve --bind 0.0.0.0:3000 --auth-secret $SECRET
//! ```

use std::{path::PathBuf, time::Duration};

use buswatch_core::{DriverProfile, RelayConfig};
use buswatch_server::{GeocoderConfig, RedbDriverStore, Server, ServerRuntimeConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// School-bus fleet location relay
#[derive(Parser, Debug)]
#[command(name = "buswatch-server")]
#[command(about = "Real-time school-bus location relay server")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server
    Serve(ServeArgs),
    /// Insert or update a driver record in the store
    AddDriver(AddDriverArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Path to the driver store
    #[arg(long, default_value = "buswatch.redb")]
    store: PathBuf,

    /// Shared secret for connection tokens
    #[arg(long)]
    auth_secret: Option<String>,

    /// Reverse-geocoding endpoint
    #[arg(long, default_value = "https://nominatim.openstreetmap.org/reverse")]
    geocoder_url: String,

    /// Per-request geocoding timeout in seconds
    #[arg(long, default_value = "5")]
    geocoder_timeout_secs: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,
}

#[derive(clap::Args, Debug)]
struct AddDriverArgs {
    /// Path to the driver store
    #[arg(long, default_value = "buswatch.redb")]
    store: PathBuf,

    /// Driver id
    #[arg(long)]
    id: u64,

    /// Display name
    #[arg(long)]
    name: String,

    /// Contact phone number
    #[arg(long)]
    phone: String,

    /// Assigned vehicle label (omit when unassigned)
    #[arg(long)]
    vehicle: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::AddDriver(args) => add_driver(&args),
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Buswatch relay starting");
    tracing::info!("Binding to {}", args.bind);

    let auth_secret = match args.auth_secret {
        Some(secret) => secret,
        None => {
            tracing::warn!("No auth secret provided - using built-in development secret");
            tracing::warn!("This is NOT suitable for production use!");
            "insecure-dev-secret".to_string()
        },
    };

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        store_path: args.store,
        auth_secret,
        geocoder: GeocoderConfig {
            endpoint: args.geocoder_url,
            timeout: Duration::from_secs(args.geocoder_timeout_secs),
            ..GeocoderConfig::default()
        },
        relay: RelayConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Relay listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}

fn add_driver(args: &AddDriverArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = RedbDriverStore::open(&args.store)?;

    let profile = DriverProfile {
        id: args.id,
        display_name: args.name.clone(),
        phone_number: args.phone.clone(),
        assigned_vehicle_label: args.vehicle.clone(),
    };
    store.put(&profile)?;

    tracing::info!(driver_id = args.id, "driver record stored");
    Ok(())
}
