use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::error::AppError;
use crate::infrastructure::queue::JobQueue;
use crate::workers::pipeline::Pipeline;

const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Starts `count` workers pulling from `queue`. Each worker handles one job
/// at a time. Cancelling `shutdown` stops the workers; a job still running
/// is abandoned unacknowledged and its encoder process is killed. A job
/// whose outcome could not be recorded is requeued rather than acked.
pub fn start_transcoder_workers(
    pipeline: Arc<Pipeline>,
    queue: Arc<dyn JobQueue>,
    count: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    info!("🎥 Starting {} transcoder worker(s)...", count);

    (0..count.max(1))
        .map(|worker_id| {
            tokio::spawn(run_worker(
                worker_id,
                pipeline.clone(),
                queue.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    pipeline: Arc<Pipeline>,
    queue: Arc<dyn JobQueue>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = queue.dequeue() => received,
        };

        let received = match received {
            Ok(received) => received,
            Err(e) => {
                error!(worker_id, "Queue error: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(QUEUE_RETRY_DELAY) => continue,
                }
            }
        };

        info!(worker_id, asset_id = received.job.asset_id, kind = %received.job.kind, "📦 Received job");

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => {
                warn!(worker_id, asset_id = received.job.asset_id, "Shutting down mid-job, leaving it for redelivery");
                break;
            }
            outcome = pipeline.handle(&received.job) => outcome,
        };

        let settled = match outcome {
            Ok(asset) => {
                info!(worker_id, asset_id = asset.id, status = %asset.status, "✅ Job completed");
                true
            }
            Err(AppError::NotFound(what)) => {
                warn!(worker_id, "Dropping job: {} not found", what);
                true
            }
            Err(e) => {
                error!(worker_id, "❌ Failed to process job {:?}: {}", received.job, e);
                false
            }
        };

        if settled {
            if let Err(e) = received.ack().await {
                error!(worker_id, "Failed to ack job: {}", e);
            }
            continue;
        }

        // The outcome was never recorded; hand the job back after a pause.
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(QUEUE_RETRY_DELAY) => {}
        }
        if let Err(e) = received.requeue().await {
            error!(worker_id, "Failed to requeue job: {}", e);
        }
    }

    info!(worker_id, "Transcoder worker stopped");
}
