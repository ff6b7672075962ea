use std::{future::IntoFuture, net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use folio_gateway::{
    adapters::{HttpClientAdapter, HttpHandler},
    config::{GatewayConfig, GatewayConfigValidator, load_config},
    core::GatewayService,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (optional; defaults and environment apply without one)
    #[clap(short, long)]
    config: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(config.or(args.config)).await,
        None => serve(args.config).await,
    }
}

async fn serve(config_path: Option<String>) -> Result<()> {
    let config: GatewayConfig = load_config(config_path.as_deref())
        .await
        .wrap_err_with(|| match &config_path {
            Some(path) => format!("Failed to load configuration from {path}"),
            None => "Failed to load configuration from the environment".to_string(),
        })?;

    tracing_setup::init_tracing(&config.log)?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    GatewayConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .wrap_err_with(|| format!("Invalid listen address: {}", config.listen_addr))?;

    let config = Arc::new(config);
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::from_config(&config.upstream)
            .wrap_err("Failed to create HTTP client adapter")?,
    );
    let gateway = Arc::new(
        GatewayService::new(config.clone(), http_client).wrap_err("Failed to build gateway")?,
    );
    gateway.start_background_tasks();

    for route in &config.routes {
        tracing::debug!(
            path = %route.path,
            methods = ?route.methods,
            access = ?route.access,
            backend = %route.target,
            "Configured route"
        );
    }

    let app = HttpHandler::new(gateway.clone())
        .wrap_err("Failed to build HTTP handler")?
        .into_router();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        environment = %config.environment,
        "API gateway listening on {}",
        addr
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_task = {
        let shutdown = graceful_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {:?}", e);
            }
        })
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = graceful_shutdown.clone();
        async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
        }
    })
    .into_future();

    let drain_deadline = {
        let shutdown = graceful_shutdown.clone();
        async move {
            shutdown.wait_for_shutdown_signal().await;
            tokio::time::sleep(shutdown.drain_timeout()).await;
        }
    };

    let server_result = tokio::select! {
        result = server => result.wrap_err("Server error"),
        _ = drain_deadline => {
            tracing::warn!("Drain timeout exceeded, dropping remaining connections");
            Ok(())
        }
    };

    gateway.shutdown().await;
    signal_task.abort();
    tracing::info!("Graceful shutdown completed");

    server_result
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(Some(config_path)).await {
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

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.environment);
            println!("   • Routes: {}", config.routes.len());
            println!(
                "   • Rate Limit: {} requests / {}",
                config.rate_limit.requests, config.rate_limit.window
            );
            println!("   • Identity Service: {}", config.services.identity);
            println!("   • Portfolio Service: {}", config.services.portfolio);
            println!("   • Analysis Service: {}", config.services.analysis);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all service URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Ensure rate limit windows use valid units (s, m, h)");
            println!("   • Set a real jwt_secret when environment is production");
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

    let default_config = r#"# folio-gateway configuration
#
# Every key is optional. GATEWAY_* variables override this file
# (e.g. GATEWAY_AUTH__JWT_SECRET), and APP_HOST, APP_PORT, JWT_SECRET,
# AUTH_SERVICE_URL, DATA_SERVICE_URL, ANALYSIS_SERVICE_URL and APP_ENV
# override both.

listen_addr: "0.0.0.0:8080"
environment: "development"
api_prefix: "/api"

auth:
  # Shared with the identity service. Must be changed in production.
  jwt_secret: "your-secret-key"
  user_id_claim: "user_id"
  leeway_secs: 0

services:
  identity: "http://auth-service:8081"
  portfolio: "http://data-service:8082"
  analysis: "http://analysis-service:8083"

rate_limit:
  requests: 100
  window: "60s"
  sweep_interval: "5m"

server:
  read_timeout_secs: 120
  write_timeout_secs: 120

upstream:
  request_timeout_secs: 120
  connect_timeout_secs: 10

cors:
  allowed_origins: ["*"]

log:
  level: "info"
  format: "json"

# Omit `routes` to use the built-in route table. When present it replaces
# the table entirely.
# routes:
#   - path: "/health"
#     methods: ["GET"]
#     access: "public"
#     target: "gateway"
#   - path: "/api/stocks/{symbol}"
#     methods: ["GET"]
#     access: "protected"
#     target: "portfolio"
"#;

    tokio::fs::write(path, default_config)
        .await
        .wrap_err("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'folio-gateway serve --config {config_path}' to start the server");
    Ok(())
}
