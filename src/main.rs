use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gift_concierge::agents::{AgentOrchestrator, ResponsesEngine};
use gift_concierge::auth::SessionAuth;
use gift_concierge::config::AppConfig;
use gift_concierge::realtime::{SessionFactory, SessionManager, WebSocketTransportBuilder};
use gift_concierge::server::{AppState, app_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🎁 Gift Concierge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.backend_url);
    eprintln!("   Realtime model: {}", config.realtime.model);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.http_port);
    eprintln!("   Voice WS: ws://0.0.0.0:{}/ws/voice", config.http_port);

    // ── Auth ────────────────────────────────────────────────────────────
    let auth = Arc::new(SessionAuth::new(config.backend_url.clone()));
    match config.id_token.clone() {
        Some(token) => auth.sign_in(token),
        None => eprintln!("   Auth: signed out (set GIFT_ID_TOKEN to sign in)"),
    }

    // ── Text conversation ───────────────────────────────────────────────
    let engine = Arc::new(ResponsesEngine::new(config.chat_model.clone()));
    eprintln!("   Chat model: {}", engine.model_name());
    let orchestrator = AgentOrchestrator::new(auth.clone(), engine, &config.prompts);

    // ── Voice session ───────────────────────────────────────────────────
    let factory = SessionFactory::new(
        config.realtime.clone(),
        config.prompts.clone(),
        Arc::new(WebSocketTransportBuilder),
    );
    let sessions = SessionManager::new(factory, auth.clone());

    let state = AppState::new(orchestrator, sessions);
    let app = app_routes(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "HTTP server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    eprintln!("   Type a message and press Enter. /reset to start over, /quit to exit.\n");
    run_repl(state).await
}

fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gift-concierge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

async fn run_repl(state: AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                state.orchestrator.lock().await.reset();
                println!("[reset] conversation cleared\n");
            }
            text => {
                let result = state.orchestrator.lock().await.send_message(text).await;
                if result.handoff_occurred {
                    println!("[handoff] now talking to {}", result.agent);
                }
                println!("[{}] {}\n", result.agent, result.response);
            }
        }
    }

    Ok(())
}
