use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use chrono::Utc;
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use va_callcontrol::{CallEventProcessor, NoopCallControlClient};
use va_domain::config::{Config, ConfigSeverity};
use va_gateway::api;
use va_gateway::runtime::broadcast::BroadcastHub;
use va_gateway::runtime::cancel::CancelMap;
use va_gateway::runtime::orchestrator::Orchestrator;
use va_gateway::state::AppState;
use va_providers::{NoopSttAdapterFactory, NoopTtsAdapter, OpenAiCompatProvider};
use va_sessions::SessionStore;
use va_tools::Directory;

/// Run the voice-agent gateway, the built-in HTTP/WS server mediating
/// STT/LLM/TTS for one or more in-progress calls.
#[derive(Debug, Parser)]
#[command(name = "voiceagent-gateway", version)]
struct Cli {
    /// Path to the TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "voiceagent.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("loading config")?;
    run_server(Arc::new(config)).await
}

/// Initialize structured JSON tracing.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,va_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("voiceagent-gateway starting");

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
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Session store (KV-backed, best-effort under a per-op timeout) ──
    let sessions = Arc::new(SessionStore::new(config.kv.op_timeout_ms));
    tracing::info!(op_timeout_ms = config.kv.op_timeout_ms, "session store ready");

    // ── LLM provider ─────────────────────────────────────────────────
    let llm_provider = Arc::new(OpenAiCompatProvider::from_config(&config.llm).context("initializing LLM provider")?);
    tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "LLM provider ready");

    // ── Tool directory + orchestrator ───────────────────────────────
    let directory = Arc::new(Directory::default());
    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        llm_provider,
        directory,
        config.dialog.clone(),
    ));
    tracing::info!("orchestrator ready");

    // ── Broadcast hub (observer relay fan-out) ──────────────────────
    let broadcast = Arc::new(BroadcastHub::new());

    // ── Call-control client + event processor ───────────────────────
    // No real telephony provider is wired up by default; the no-op client
    // logs every call-control action instead of placing it (§4.5).
    let call_control_client = Arc::new(NoopCallControlClient::default());
    let call_events = Arc::new(CallEventProcessor::new(
        sessions.clone(),
        call_control_client.clone(),
        broadcast.clone(),
        config.dialog.dtmf.clone(),
    ));
    tracing::info!("call event processor ready");

    // ── Cancel map (per-call barge-in cancellation) ─────────────────
    let cancel_map = Arc::new(CancelMap::new());

    // ── STT / TTS adapters ───────────────────────────────────────────
    // No cloud speech credentials are required to run the gateway: the
    // no-op adapters still exercise the demux/framing/pacing pipeline
    // (§4.2, §4.3); swap these for real adapters behind the same traits
    // to go live. `stt` is a factory, not a shared instance — the Turn
    // Controller mints one recognizer per call (§4.2).
    let stt = Arc::new(NoopSttAdapterFactory);
    let tts = Arc::new(NoopTtsAdapter);

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %env_var, "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(env_var = %env_var, "API bearer-token auth DISABLED — set {env_var} to enable");
                None
            }
        }
    };

    let state = AppState {
        config: config.clone(),
        sessions,
        orchestrator,
        broadcast,
        call_events,
        call_control: call_control_client,
        cancel_map,
        stt,
        tts,
        pending_outbound: Arc::new(parking_lot::Mutex::new(std::collections::HashSet::new())),
        api_token_hash,
        started_at: Utc::now(),
    };

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Rate-limit layer (per-IP token bucket via governor) ─────────
    // `Config::validate()` already rejects a zero `requests_per_second` or
    // `burst_size` above, so `finish()` failing here would mean a config
    // this process already bailed out on — but `GovernorConfigBuilder`
    // gives no stronger guarantee than "checked at validate time", so this
    // stays a graceful None rather than an `.expect()` panic.
    let governor_layer = config.server.rate_limit.as_ref().and_then(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = match GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
        {
            Some(cfg) => cfg,
            None => {
                tracing::error!(
                    requests_per_second = rl.requests_per_second,
                    burst_size = rl.burst_size,
                    "invalid rate_limit config, disabling per-IP rate limiting"
                );
                return None;
            }
        };

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        Some(GovernorLayer { config: Arc::new(gov_config) })
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config, or config invalid)");
    }

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(state.clone()).layer(cors_layer);
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "voiceagent-gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). These are expanded into a predicate that
/// matches any port on that host. A literal `"*"` allows all origins
/// (not recommended for production).
fn build_cors_layer(cors: &va_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
