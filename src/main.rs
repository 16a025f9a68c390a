use anyhow::{Context, Result};
use callvault::config::StoreBackend;
use callvault::lifecycle::ExpirySweeper;
use callvault::{
    create_router, AppState, CallController, CallEventPublisher, CallLocks, CallService,
    CallStore, ChannelTransport, Config, FileCallStore, InMemoryCallStore, LocalSegmentStorage,
    NatsEventPublisher, NoopEventPublisher, RecordingManager, SegmentUploader,
    StaticGroupPolicy, WavTranscoder,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "callvault", about = "Group call server with durable recording")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/callvault")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn CallStore> = match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory call store, records are lost on restart");
            Arc::new(InMemoryCallStore::new())
        }
        StoreBackend::File => {
            let dir = cfg.store.dir()?;
            info!("Call store: {:?}", dir);
            Arc::new(FileCallStore::open(dir).await?)
        }
    };

    let storage_dir = cfg.recording.storage_dir()?;
    let staging_dir = cfg.recording.staging_dir()?;
    tokio::fs::create_dir_all(&storage_dir)
        .await
        .with_context(|| format!("Failed to create recording directory: {:?}", storage_dir))?;
    info!("Recordings: {:?} (staging {:?})", storage_dir, staging_dir);

    let policy = Arc::new(StaticGroupPolicy::from_config(&cfg.recording));
    let locks = Arc::new(CallLocks::new());
    let transport = Arc::new(ChannelTransport::new(staging_dir.clone()));
    let storage = Arc::new(LocalSegmentStorage::new(storage_dir.clone(), "/media"));

    let uploader = Arc::new(SegmentUploader::new(
        Arc::clone(&store),
        Arc::new(WavTranscoder::new()),
        storage,
        Arc::clone(&locks),
    ));
    let recordings = Arc::new(RecordingManager::new(
        Arc::clone(&store),
        Arc::clone(&uploader),
        transport,
        policy.clone(),
        locks,
        cfg.recording.segment_duration(),
    ));
    let controller = CallController::new(Arc::clone(&store), policy, cfg.calls.ring_timeout());

    let events: Arc<dyn CallEventPublisher> = match &cfg.events.nats_url {
        Some(url) => Arc::new(NatsEventPublisher::connect(url).await?),
        None => {
            info!("No NATS URL configured, call events are not published");
            Arc::new(NoopEventPublisher)
        }
    };

    let service = Arc::new(CallService::new(
        controller,
        recordings,
        uploader,
        events,
        cfg.calls.recently_ended_window(),
    ));

    let sweeper = ExpirySweeper::new(Arc::clone(&service), cfg.calls.sweep_interval()).spawn();

    let app = create_router(AppState::new(service, staging_dir, storage_dir));

    let bind = args.bind.unwrap_or(cfg.service.http.bind);
    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    sweeper.shutdown().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
