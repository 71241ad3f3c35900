//! ragguard web server binary

use clap::Parser;
use ragguard_core::{init_logging, RagGuardConfig};
use ragguard_web::{RagGuardServerBuilder, WebConfig};
use std::path::PathBuf;

/// ragguard web server - guarded retrieval-augmented chat over HTTP
#[derive(Parser)]
#[command(name = "ragguard-web")]
#[command(about = "Serve the guarded chat pipeline over HTTP")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let mut config = match &args.config {
        Some(path) => match RagGuardConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RagGuardConfig::default(),
    };

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config
        .logging
        .filter_directives
        .push("tower_http=debug".to_string());
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialise logging: {}", e);
        std::process::exit(1);
    }

    let web = WebConfig::from(&config.server).with_env();
    let host = args.host.unwrap_or(web.host);
    let port = args.port.unwrap_or(web.port);

    let server = match RagGuardServerBuilder::new(config)
        .host(host)
        .port(port)
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
