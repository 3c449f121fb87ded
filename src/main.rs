//! OpenTelemetry Operator - manifest rendering and admission webhook

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use otel_operator::config::{
    Config, DEFAULT_COLLECTOR_IMAGE, DEFAULT_OPAMP_BRIDGE_IMAGE, DEFAULT_TARGET_ALLOCATOR_IMAGE,
};
use otel_operator::crd::{OpAMPBridge, OpenTelemetryCollector};
use otel_operator::manifests::{compile_collector, compile_opamp_bridge, CompiledManifests};
use otel_operator::webhook::{webhook_router, WebhookState};
use otel_operator::DEFAULT_WEBHOOK_ADDR;

/// OpenTelemetry Operator - compile OpenTelemetry resources and guard them at admission
#[derive(Parser, Debug)]
#[command(name = "otel-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Label keys kept off generated objects (glob patterns, `*` wildcard)
    #[arg(
        long = "labels-filter",
        env = "OTEL_OPERATOR_LABELS_FILTER",
        value_delimiter = ',',
        global = true
    )]
    labels_filter: Vec<String>,

    /// Collector image used when a resource does not pin one
    #[arg(
        long,
        env = "OTEL_OPERATOR_COLLECTOR_IMAGE",
        default_value = DEFAULT_COLLECTOR_IMAGE,
        global = true
    )]
    collector_image: String,

    /// Target allocator image used when a resource does not pin one
    #[arg(
        long,
        env = "OTEL_OPERATOR_TARGET_ALLOCATOR_IMAGE",
        default_value = DEFAULT_TARGET_ALLOCATOR_IMAGE,
        global = true
    )]
    target_allocator_image: String,

    /// OpAMP bridge image used when a resource does not pin one
    #[arg(
        long,
        env = "OTEL_OPERATOR_OPAMP_BRIDGE_IMAGE",
        default_value = DEFAULT_OPAMP_BRIDGE_IMAGE,
        global = true
    )]
    opamp_bridge_image: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile resources from a file and print the generated manifests
    ///
    /// The file may hold several YAML documents. Each must be an OpAMPBridge
    /// or an OpenTelemetryCollector.
    Render(RenderArgs),

    /// Serve the OpAMPBridge admission webhook (default mode)
    Webhook(WebhookArgs),
}

/// Render mode arguments
#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path to the resource YAML file
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
}

/// Webhook mode arguments
#[derive(Parser, Debug)]
struct WebhookArgs {
    /// Address to listen on
    #[arg(long, env = "OTEL_OPERATOR_WEBHOOK_ADDR", default_value = DEFAULT_WEBHOOK_ADDR)]
    listen: SocketAddr,
}

impl Cli {
    fn config(&self) -> Config {
        Config::new()
            .with_label_filters(&self.labels_filter)
            .with_collector_image(&self.collector_image)
            .with_target_allocator_image(&self.target_allocator_image)
            .with_opamp_bridge_image(&self.opamp_bridge_image)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so rendered manifests on stdout stay clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let bridge = serde_yaml::to_string(&OpAMPBridge::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        let collector = serde_yaml::to_string(&OpenTelemetryCollector::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{bridge}---\n{collector}");
        return Ok(());
    }

    let config = cli.config();
    match cli.command {
        Some(Commands::Render(args)) => run_render(&config, &args.file).await,
        Some(Commands::Webhook(args)) => run_webhook(args.listen).await,
        None => run_webhook(DEFAULT_WEBHOOK_ADDR.parse()?).await,
    }
}

/// Compile every resource in `file` and print the manifests
async fn run_render(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut out = CompiledManifests::default();
    for document in serde_yaml::Deserializer::from_str(&content) {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        if value.is_null() {
            continue;
        }
        out.merge(compile_document(config, value)?);
    }

    print!("{}", out.to_yaml()?);
    Ok(())
}

fn compile_document(config: &Config, value: serde_yaml::Value) -> anyhow::Result<CompiledManifests> {
    let kind = value
        .get("kind")
        .and_then(|k| k.as_str())
        .unwrap_or_default()
        .to_string();
    match kind.as_str() {
        "OpAMPBridge" => {
            let bridge: OpAMPBridge =
                serde_yaml::from_value(value).context("Failed to parse OpAMPBridge")?;
            Ok(compile_opamp_bridge(config, &bridge))
        }
        "OpenTelemetryCollector" => {
            let collector: OpenTelemetryCollector = serde_yaml::from_value(value)
                .context("Failed to parse OpenTelemetryCollector")?;
            Ok(compile_collector(config, &collector))
        }
        other => anyhow::bail!("unsupported kind {other:?}"),
    }
}

/// Serve the admission webhook until interrupted
async fn run_webhook(addr: SocketAddr) -> anyhow::Result<()> {
    let router = webhook_router(Arc::new(WebhookState::default()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "Serving OpAMPBridge admission webhook");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down webhook server");
        })
        .await?;
    Ok(())
}
