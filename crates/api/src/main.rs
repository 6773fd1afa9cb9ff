use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use audioforma_api::background::workspace_sweep;
use audioforma_api::config::ServerConfig;
use audioforma_api::router::build_app_router;
use audioforma_api::state::AppState;
use audioforma_cloud::{BlobStore, SupabaseStorage};
use audioforma_core::workspace::WorkspaceManager;
use audioforma_events::{ActivityLog, JobEventBus};
use audioforma_pipeline::{FfprobeProbe, JobOrchestrator, OrchestratorDeps};
use audioforma_separator::DemucsEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        workspace_dir = %config.workspace_dir.display(),
        model = %config.demucs.model,
        "Loaded server configuration"
    );

    // --- Status store ---
    let store = audioforma_db::connect(&config.store)
        .await
        .expect("Failed to open the job status store");

    // --- Workspaces ---
    let workspaces = WorkspaceManager::new(config.workspace_dir.clone());
    let stale_after = workspace_sweep::stale_after(config.orchestrator.result_retention);
    workspace_sweep::sweep_at_startup(&workspaces, stale_after).await;

    // --- Blob store ---
    let blob_store: Option<Arc<dyn BlobStore>> = config.supabase.clone().map(|supabase| {
        let storage = SupabaseStorage::new(supabase).expect("Invalid Supabase configuration");
        tracing::info!(bucket = storage.bucket(), "Artifacts will be uploaded to Supabase Storage");
        Arc::new(storage) as Arc<dyn BlobStore>
    });

    // --- Event bus ---
    let events = Arc::new(JobEventBus::default());
    let activity_handle = tokio::spawn(ActivityLog::run(events.subscribe()));

    // --- Orchestrator ---
    let orchestrator = JobOrchestrator::new(
        OrchestratorDeps {
            store: Arc::clone(&store),
            engine: Arc::new(DemucsEngine::new(config.demucs.clone())),
            probe: Arc::new(FfprobeProbe::new(config.ffprobe_program.clone())),
            blob_store,
            workspaces: workspaces.clone(),
            events: Arc::clone(&events),
            http: reqwest::Client::new(),
        },
        config.orchestrator.clone(),
    );

    // --- Workspace sweep ---
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_handle = tokio::spawn(workspace_sweep::run(
        workspaces,
        store,
        stale_after,
        config.sweep_interval(),
        sweep_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: orchestrator.clone(),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining jobs");

    // Jobs still running when the bound expires are failed, not left open.
    orchestrator.shutdown(config.shutdown_timeout()).await;

    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;
    tracing::info!("Workspace sweep stopped");

    // The orchestrator holds the other sender handle; the activity log
    // exits once both are gone.
    drop(orchestrator);
    drop(events);
    let _ = tokio::time::timeout(Duration::from_secs(5), activity_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "audioforma_api=debug,audioforma_pipeline=debug,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
