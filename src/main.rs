use std::sync::Arc;

use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vod_pipeline::app;
use vod_pipeline::config::settings::AppConfig;
use vod_pipeline::infrastructure::db::pool::connect_to_db;
use vod_pipeline::infrastructure::queue::{
    InMemoryJobQueue, JobQueue, RabbitJobQueue, RabbitMqService,
};
use vod_pipeline::infrastructure::transcoder::FfmpegTranscoder;
use vod_pipeline::modules::content::repository::{
    AssetRepository, InMemoryAssetRepository, PgAssetRepository,
};
use vod_pipeline::state::AppState;
use vod_pipeline::workers::pipeline::Pipeline;
use vod_pipeline::workers::transcoder::start_transcoder_workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;
    let shutdown = CancellationToken::new();

    let assets: Arc<dyn AssetRepository> = match &config.database_url {
        Some(url) => Arc::new(PgAssetRepository::new(connect_to_db(url).await?)),
        None => {
            warn!("DATABASE_URL not set, asset records are kept in memory");
            Arc::new(InMemoryAssetRepository::new())
        }
    };

    let queue: Arc<dyn JobQueue> = match &config.amqp_url {
        Some(url) => {
            let service = RabbitMqService::new(url).await?;
            let prefetch = u16::try_from(config.worker_count).unwrap_or(u16::MAX);
            Arc::new(RabbitJobQueue::start(
                service,
                config.queue_name.clone(),
                prefetch,
                shutdown.clone(),
            ))
        }
        None => {
            warn!("AMQP_URL not set, jobs are queued in memory and lost on restart");
            Arc::new(InMemoryJobQueue::new())
        }
    };

    tokio::fs::create_dir_all(&config.media_root).await?;
    let state = AppState::new(config.clone(), assets.clone(), queue.clone());

    let pipeline = Arc::new(Pipeline::new(
        state.store.clone(),
        assets,
        Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path)),
        config.renditions.clone(),
    ));
    let workers = start_transcoder_workers(pipeline, queue, config.worker_count, shutdown.clone());

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for worker in workers {
        let _ = worker.await;
    }

    info!("Server stopped");
    Ok(())
}
