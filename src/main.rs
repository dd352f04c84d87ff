use std::sync::Arc;
use std::time::Duration;

use mail_triage::http::{AppState, router};
use mail_triage::llm::{LlmBackend, LlmConfig, create_provider};
use mail_triage::mail::graph::{GraphConfig, GraphMailbox};
use mail_triage::pipeline::TriagePipeline;
use mail_triage::store::{Ledger, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .unwrap_or_else(|_| {
            eprintln!("Error: ANTHROPIC_API_KEY (or OPENAI_API_KEY) not set");
            eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
            std::process::exit(1);
        });
    let backend = if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        LlmBackend::Anthropic
    } else {
        LlmBackend::OpenAi
    };

    let model = std::env::var("TRIAGE_MODEL").unwrap_or_else(|_| match backend {
        LlmBackend::Anthropic => "claude-sonnet-4-20250514".to_string(),
        LlmBackend::OpenAi => "gpt-4o".to_string(),
    });

    let http_port: u16 = std::env::var("TRIAGE_HTTP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let db_path =
        std::env::var("TRIAGE_DB_PATH").unwrap_or_else(|_| "./data/mail-triage.db".to_string());

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Database: {}", db_path);
    eprintln!("   API: http://0.0.0.0:{}/api/agent/run", http_port);

    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
        base_url: None,
    });

    let graph_config = GraphConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Set GRAPH_TENANT_ID, GRAPH_CLIENT_ID, GRAPH_CLIENT_SECRET, GRAPH_MAILBOX");
        std::process::exit(1);
    });
    eprintln!("   Mailbox: {}", graph_config.mailbox);
    let mailbox = Arc::new(GraphMailbox::new(graph_config));

    let store = Arc::new(LibSqlBackend::new_local(std::path::Path::new(&db_path)).await?);

    let pipeline = Arc::new(TriagePipeline::new(
        store.clone(),
        mailbox,
        store.clone(),
        store.clone(),
        store.clone(),
        llm,
    ));

    // Optional polling loop; without it runs are HTTP-triggered only.
    if let Ok(interval_str) = std::env::var("TRIAGE_INTERVAL_SECS")
        && let Ok(secs) = interval_str.parse::<u64>()
        && secs > 0
    {
        eprintln!("   Polling: every {}s", secs);
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let summary = pipeline.run().await;
                if !summary.success {
                    tracing::error!(
                        errors = summary.results.errors.len(),
                        "Scheduled triage run failed"
                    );
                }
            }
        });
    } else {
        eprintln!("   Polling: disabled (POST /api/agent/run to trigger)");
    }

    let state = Arc::new(AppState {
        pipeline,
        ledger: store as Arc<dyn Ledger>,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port)).await?;
    tracing::info!(port = http_port, "HTTP server started");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
