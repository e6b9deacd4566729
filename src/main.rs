use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use relay::{
    adapters::{FileSystemAdapter, HttpClientAdapter, HttpHandler, build_router},
    config::{ServerConfigValidator, loader::DEFAULT_CONFIG_TOML, load_config},
    core::RelayService,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "relay.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "relay.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "relay.toml")]
        config: String,
    },
    /// Start the relay server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "relay.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}:\n{e}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let relay = Arc::new(
        RelayService::from_config(&config, http_client)
            .context("Failed to build relay service")?,
    );
    let handler = Arc::new(HttpHandler::new(
        relay,
        Arc::new(FileSystemAdapter::new()),
        &config,
    ));
    let app = build_router(handler);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        listen_addr = %addr,
        forward_path = %config.forward_path,
        health_path = %config.health_path,
        upstream = %config.upstream.allowed_host,
        allow_subdomains = config.upstream.allow_subdomains,
        timeout = %config.upstream.timeout,
        "Relay listening"
    );
    println!(
        "relay listening on {} (forwarding {} -> {})",
        addr, config.forward_path, config.upstream.allowed_host
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handle = {
        let graceful_shutdown = graceful_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = graceful_shutdown.run_signal_handler().await {
                tracing::error!("Signal handler error: {:?}", e);
            }
        })
    };

    let shutdown_signal = {
        let graceful_shutdown = graceful_shutdown.clone();
        async move {
            let reason = graceful_shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    signal_handle.abort();
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Forward Path: {}", config.forward_path);
            println!("   • Health Path: {}", config.health_path);
            println!(
                "   • Upstream: {} (subdomains: {})",
                config.upstream.allowed_host, config.upstream.allow_subdomains
            );
            println!("   • Timeout: {}", config.upstream.timeout);
            println!("   • Session Cookie: {}", config.session.cookie_name);
            println!(
                "   • Static Root: {}",
                config
                    .static_files
                    .as_ref()
                    .map_or("built-in page", |s| s.root.as_str())
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • upstream.allowed_host is a bare hostname (no scheme, port or path)");
            println!("   • Timeouts use humantime units (e.g. '500ms', '30s')");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Check that static_files.root exists");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, DEFAULT_CONFIG_TOML)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'relay serve --config {config_path}' to start the relay");
    Ok(())
}
