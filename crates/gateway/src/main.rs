use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use vg_domain::config::{Config, ConfigSeverity, CorsConfig};
use vg_gateway::api;
use vg_gateway::cli::{Cli, Command, ConfigCommand};
use vg_gateway::runtime::metrics::MetricsRecorder;
use vg_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = vg_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = vg_gateway::cli::load_config()?;
            if !vg_gateway::cli::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = vg_gateway::cli::load_config()?;
            vg_gateway::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("voicegate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vg_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the voice channel server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("VoiceGate starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Instance id (fresh per process unless pinned in config) ──────
    let instance_id = config
        .server
        .instance_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    tracing::info!(instance_id = %instance_id, "server instance id ready");

    // ── Text generator ───────────────────────────────────────────────
    let generator = vg_providers::from_config(&config.generator)
        .context("initializing text generator")?;
    tracing::info!(backend = generator.backend_id(), "text generator ready");

    // ── Synthesizers (one per language) ──────────────────────────────
    let voices = vg_synth::from_config(&config.tts).context("initializing synthesizers")?;
    tracing::info!(
        backend = voices.zh.backend_id(),
        zh_sample_rate = voices.zh.sample_rate(),
        en_sample_rate = voices.en.sample_rate(),
        "synthesizers ready"
    );

    // ── Metrics recorder ─────────────────────────────────────────────
    let recorder = Arc::new(MetricsRecorder::new(&config.metrics.log_dir));
    tracing::info!(log_dir = %config.metrics.log_dir, "metrics recorder ready");

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        instance_id,
        generator,
        voices,
        recorder,
    };

    // ── Router ───────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);
    let app = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_connections,
        ))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "VoiceGate listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. A single
/// literal `"*"` allows all origins (the default; browser voice clients run
/// from arbitrary dev ports).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
    }

    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in &cors.allowed_origins {
        match origin.parse::<HeaderValue>() {
            Ok(hv) => origins.push(hv),
            Err(_) => tracing::warn!(origin = %origin, "invalid CORS origin, skipping"),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
