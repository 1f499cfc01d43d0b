use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use thiserror::Error;

use crate::common::error::AppError;
use crate::modules::content::events::Job;

pub mod memory;
pub mod rabbitmq;

pub use memory::InMemoryJobQueue;
pub use rabbitmq::{RabbitJobQueue, RabbitMqService};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("broker error: {0}")]
    Broker(String),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::QueueUnavailable(err.to_string())
    }
}

/// Work dispatch shared by the enqueuing side and the worker pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Hands a job to the queue. Returns once the queue has accepted it.
    async fn enqueue(&self, job: &Job) -> Result<(), QueueError>;

    /// Waits until a job is available. The job stays owned by the queue until
    /// [`ReceivedJob::ack`] is called.
    async fn dequeue(&self) -> Result<ReceivedJob, QueueError>;
}

pub struct ReceivedJob {
    pub job: Job,
    receipt: Receipt,
}

enum Receipt {
    Local(async_channel::Sender<Job>),
    Amqp(lapin::message::Delivery),
}

impl ReceivedJob {
    pub(crate) fn local(job: Job, requeue: async_channel::Sender<Job>) -> Self {
        Self {
            job,
            receipt: Receipt::Local(requeue),
        }
    }

    pub(crate) fn amqp(job: Job, delivery: lapin::message::Delivery) -> Self {
        Self {
            job,
            receipt: Receipt::Amqp(delivery),
        }
    }

    /// Removes the job from the queue. Unacknowledged jobs are redelivered.
    pub async fn ack(self) -> Result<(), QueueError> {
        match self.receipt {
            Receipt::Local(_) => Ok(()),
            Receipt::Amqp(delivery) => delivery
                .ack(BasicAckOptions::default())
                .await
                .map(|_| ())
                .map_err(|e| QueueError::Broker(e.to_string())),
        }
    }

    /// Hands the job back to the queue for another delivery.
    pub async fn requeue(self) -> Result<(), QueueError> {
        match self.receipt {
            Receipt::Local(tx) => tx.send(self.job).await.map_err(|_| QueueError::Closed),
            Receipt::Amqp(delivery) => delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                })
                .await
                .map(|_| ())
                .map_err(|e| QueueError::Broker(e.to_string())),
        }
    }
}
