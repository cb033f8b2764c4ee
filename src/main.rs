use std::sync::Arc;

use lead_assist::api::{ApiState, api_routes};
use lead_assist::config::EngineConfig;
use lead_assist::engine::TurnEngine;
use lead_assist::enrich::EnrichmentQueue;
use lead_assist::flow::StaticFlowProvider;
use lead_assist::llm::{LlmBackend, LlmConfig, create_provider};
use lead_assist::session::spawn_prune_task;
use lead_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; optional rolling file log when a log dir is set.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match std::env::var("LEAD_ASSIST_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "lead-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    // ── LLM provider ─────────────────────────────────────────────────────
    let backend = match std::env::var("LEAD_ASSIST_BACKEND").as_deref() {
        Ok("openai") => LlmBackend::OpenAi,
        _ => LlmBackend::Anthropic,
    };
    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        eprintln!("  export {key_var}=...");
        std::process::exit(1);
    });
    let model = std::env::var("LEAD_ASSIST_MODEL").unwrap_or_else(|_| default_model.to_string());

    let port: u16 = std::env::var("LEAD_ASSIST_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    eprintln!("🏠 Lead Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Turn API: http://0.0.0.0:{}/api/sessions", port);

    let llm_config = LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("LEAD_ASSIST_DB_PATH").unwrap_or_else(|_| "./data/lead-assist.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", db_path);

    // ── Engine ───────────────────────────────────────────────────────────
    let config = EngineConfig::default();
    let (enrich_queue, _enrich_handle) =
        EnrichmentQueue::spawn(llm.clone(), Arc::clone(&db), &config);

    let flows = Arc::new(StaticFlowProvider::default_flows());
    let engine = Arc::new(TurnEngine::new(
        flows,
        llm,
        Arc::clone(&db),
        enrich_queue,
        config.clone(),
    ));

    // Idle-session sweep: evicted sessions rehydrate from the store.
    let _prune_handle = spawn_prune_task(
        engine.registry(),
        config.session_idle_timeout,
        config.prune_interval,
    );

    // ── Serve ────────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        engine,
        store: db,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Turn API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
