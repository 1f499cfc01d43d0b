use async_channel::{Receiver, Sender};
use async_trait::async_trait;

use super::{JobQueue, QueueError, ReceivedJob};
use crate::modules::content::events::Job;

/// Process-local queue. Jobs do not survive a restart; use the RabbitMQ
/// backend when delivery has to be durable.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stops accepting and delivering jobs.
    pub fn close(&self) {
        self.tx.close();
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        self.tx
            .send(job.clone())
            .await
            .map_err(|_| QueueError::Closed)
    }

    async fn dequeue(&self) -> Result<ReceivedJob, QueueError> {
        let job = self.rx.recv().await.map_err(|_| QueueError::Closed)?;
        Ok(ReceivedJob::local(job, self.tx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = InMemoryJobQueue::new();
        let timeout = Duration::from_secs(60);
        queue.enqueue(&Job::transcode(1, timeout)).await.unwrap();
        queue.enqueue(&Job::thumbnail(1, timeout)).await.unwrap();
        assert_eq!(queue.len(), 2);

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.job, Job::transcode(1, timeout));
        first.ack().await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().job, Job::thumbnail(1, timeout));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn requeued_job_is_delivered_again() {
        let queue = InMemoryJobQueue::new();
        let job = Job::transcode(3, Duration::from_secs(60));
        queue.enqueue(&job).await.unwrap();

        let received = queue.dequeue().await.unwrap();
        assert!(queue.is_empty());
        received.requeue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().await.unwrap().job, job);
    }

    #[tokio::test]
    async fn closed_queue_rejects_work() {
        let queue = InMemoryJobQueue::new();
        queue.close();
        let err = queue
            .enqueue(&Job::transcode(1, Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
        assert!(matches!(queue.dequeue().await, Err(QueueError::Closed)));
    }
}
