use clap::Parser;
use radius_proxy::{LogFormat, LoggingConfig, RadiusConfig, RadiusServer};
use std::process;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RADIUS edge proxy with live/canary tier routing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-proxy")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "radius-proxy.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start the proxy)
    #[arg(short, long)]
    validate: bool,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match RadiusConfig::from_file(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cli.config_path, e);
            process::exit(1);
        }
    };

    if cli.validate {
        if let Err(e) = RadiusServer::check(&config.server) {
            eprintln!("Configuration validation failed: {}", e);
            process::exit(1);
        }

        let server = &config.server;
        println!("Configuration validated successfully");
        println!("  Dedup window: {}", humantime::format_duration(server.dedup_window));
        println!("  Filters: {}", server.filters.join(", "));
        println!("  Service tiers: {}", server.load_balance.service_tiers.len());
        for canary in &server.load_balance.canaries {
            println!("  Canary {}: {}%", canary.name, canary.traffic_slice_percent);
        }
        for listener in &server.listeners {
            let modules: Vec<_> = listener.modules.iter().map(|m| m.name.as_str()).collect();
            println!("  Listener {}: [{}]", listener.name, modules.join(" -> "));
        }
        process::exit(0);
    }

    init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config_path,
        "Starting RADIUS edge proxy"
    );

    let server = match RadiusServer::from_config(config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start");
            process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Proxy stopped");
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    for (operation, counts) in server.counters().snapshot() {
        info!(
            operation = %operation,
            started = counts.started,
            succeeded = counts.succeeded,
            failed = counts.failed_total(),
            "Final counters"
        );
    }
}
