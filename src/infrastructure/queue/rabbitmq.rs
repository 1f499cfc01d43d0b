use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, message::Delivery,
    options::*, publisher_confirm::Confirmation, types::FieldTable,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{JobQueue, QueueError, ReceivedJob};
use crate::modules::content::events::Job;

const CONSUMER_TAG: &str = "transcoder_worker";
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        // Publisher confirms: a publish only counts once the broker has it.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn declare(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;
        Ok(())
    }

    async fn publish_internal(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;
        Self::declare(&channel, queue).await?;

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        confirmed(confirmation)
    }

    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        if let Err(e) = self.publish_internal(queue, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(queue, payload).await?;
        }

        Ok(())
    }

    async fn consumer(&self, queue: &str, prefetch: u16) -> Result<Consumer> {
        let channel = self.channel.lock().await;
        Self::declare(&channel, queue).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))
    }
}

/// Only a broker ack means the job was accepted and persisted.
fn confirmed(confirmation: Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(None) => Ok(()),
        Confirmation::Ack(Some(_)) => Err(anyhow!("Broker returned the message as unroutable")),
        Confirmation::Nack(_) => Err(anyhow!("Broker rejected the message")),
        Confirmation::NotRequested => Err(anyhow!("Publisher confirms are not enabled")),
    }
}

/// Durable job queue. A single consumer with `prefetch` unacknowledged
/// deliveries feeds every worker; jobs are acknowledged by the worker once
/// handled, so anything in flight at a crash is delivered again.
pub struct RabbitJobQueue {
    service: RabbitMqService,
    queue_name: String,
    deliveries: Receiver<Delivery>,
}

impl RabbitJobQueue {
    pub fn start(
        service: RabbitMqService,
        queue_name: impl Into<String>,
        prefetch: u16,
        shutdown: CancellationToken,
    ) -> Self {
        let queue_name = queue_name.into();
        let (tx, rx) = async_channel::bounded(usize::from(prefetch.max(1)));

        tokio::spawn(consume_loop(
            service.clone(),
            queue_name.clone(),
            prefetch.max(1),
            tx,
            shutdown,
        ));

        Self {
            service,
            queue_name,
            deliveries: rx,
        }
    }
}

async fn consume_loop(
    service: RabbitMqService,
    queue_name: String,
    prefetch: u16,
    tx: Sender<Delivery>,
    shutdown: CancellationToken,
) {
    loop {
        match service.consumer(&queue_name, prefetch).await {
            Ok(mut consumer) => {
                info!("🎥 Transcoder consumer listening on '{}'", queue_name);
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => {
                            tx.close();
                            return;
                        }
                        next = consumer.next() => next,
                    };
                    match next {
                        Some(Ok(delivery)) => {
                            if tx.send(delivery).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Consumer error: {}", e);
                            break;
                        }
                        None => {
                            warn!("Consumer stream ended");
                            break;
                        }
                    }
                }
            }
            Err(e) => error!("Failed to start consumer: {}", e),
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                tx.close();
                return;
            }
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        if let Err(e) = service.reconnect().await {
            error!("RabbitMQ reconnect failed: {}", e);
        }
    }
}

#[async_trait]
impl JobQueue for RabbitJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(job)?;
        self.service
            .publish(&self.queue_name, &payload)
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))
    }

    async fn dequeue(&self) -> Result<ReceivedJob, QueueError> {
        loop {
            let delivery = self
                .deliveries
                .recv()
                .await
                .map_err(|_| QueueError::Closed)?;

            match serde_json::from_slice::<Job>(&delivery.data) {
                Ok(job) => return Ok(ReceivedJob::amqp(job, delivery)),
                Err(e) => {
                    // Malformed payloads can never succeed; drop them.
                    error!("❌ Failed to parse job: {}", e);
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!("Failed to ack message: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_plain_ack_confirms_a_publish() {
        assert!(confirmed(Confirmation::Ack(None)).is_ok());
        assert!(confirmed(Confirmation::Nack(None)).is_err());
        assert!(confirmed(Confirmation::NotRequested).is_err());
    }
}
