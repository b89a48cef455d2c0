// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! ESXi Service
//!
//! HTTP facade over a task pipeline for virtual ESXi appliances. It:
//!
//! - Verifies the caller's `X-Auth` bearer token
//! - Translates each request 1:1 into a background task
//! - Executes tasks against the vCenter control plane and the on-disk
//!   OVA image catalog
//! - Serves task status for polling clients, plus healthcheck and
//!   Prometheus metrics

use anyhow::{Context, Result};
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use esxi_service::config::EsxiConfig;
use esxi_service::context::ApiContext;
use esxi_service::{EsxiServiceImpl, metrics};
use tracing::info;

/// Default bind address for the HTTP server.
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default maximum request body size (bytes). Request bodies here are
/// small JSON documents; images are read from disk, never uploaded.
const DEFAULT_BODY_MAX_BYTES: usize = 64 * 1024; // 64KB

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --version and --help
    let args: Vec<String> = std::env::args().collect();
    #[allow(clippy::never_loop)] // Intentional: early return on first recognized arg
    for arg in &args[1..] {
        match arg.as_str() {
            "-V" | "--version" => {
                print_version();
                return Ok(());
            }
            "-h" | "--help" => {
                print_version();
                println!("Usage: {} [OPTIONS]", args[0]);
                println!();
                println!("Options:");
                println!("  -h, --help       Display this information");
                println!("  -V, --version    Display the program's version number");
                println!();
                println!("Environment variables:");
                println!(
                    "  BIND_ADDRESS         Server bind address (default: {})",
                    DEFAULT_BIND_ADDRESS
                );
                println!("  VCENTER_URL          vCenter Automation API base URL (required)");
                println!("  VCENTER_USER         vCenter service account (required)");
                println!("  VCENTER_PASSWORD     vCenter service account password (required)");
                println!("  VCENTER_LIBRARY      Content library for OVA staging (default: esxi)");
                println!("  IMAGES_DIR           OVA catalog directory (default: /opt/images/esxi)");
                println!("  EXTERNAL_URL         External base URL for Link headers (required)");
                println!("  AUTH_SECRET          HMAC secret for X-Auth verification (required)");
                println!("  HTTP_TIMEOUT_SECS    vCenter request timeout (default: 300)");
                println!("  TASK_RETENTION_SECS  Finished task retention (default: 3600)");
                println!("  RUST_LOG             Log filter (default: esxi_service=info,dropshot=info)");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                std::process::exit(1);
            }
        }
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "esxi_service=info,dropshot=info".to_string()),
        ))
        .init();

    print_version();

    // Pin the rustls crypto provider before any TLS client is built; see
    // the provider-selection note in the workspace Cargo.toml.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    metrics::register_metrics();

    // Load configuration
    let config = EsxiConfig::from_env().context("Failed to load configuration")?;
    info!("vCenter URL: {}", config.vcenter_url);
    info!("Images directory: {}", config.images_dir.display());
    info!("External URL: {}", config.external_url);

    // Create API context
    let api_context = ApiContext::new(config).context("Failed to create API context")?;

    // Get API description from the trait implementation
    let api = esxi_api::esxi_api_mod::api_description::<EsxiServiceImpl>()
        .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    // Configure the server
    let bind_address = std::env::var("BIND_ADDRESS")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string())
        .parse()
        .context("Invalid BIND_ADDRESS")?;

    let config_dropshot = ConfigDropshot {
        bind_address,
        default_request_body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("esxi-service")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    // Start the server
    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("ESXi service running on http://{}", bind_address);

    server
        .await
        .map_err(|error| anyhow::anyhow!("server failed: {}", error))
}
