//! Redis Streams-backed [`Broker`] for out-of-process, multi-worker
//! deployments, built on the consumer-group/XREADGROUP/XACK/XCLAIM
//! pattern narrowed to the single `Broker` trait.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::{QueueError, QueueResult};
use crate::task::{Delivery, Task};

#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    pub redis_url: String,
    pub stream_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub dlq_stream_name: String,
    pub max_retries: u32,
    pub visibility_timeout: Duration,
    pub block_timeout: Duration,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "entityscan:tasks".to_string(),
            consumer_group: "entityscan:workers".to_string(),
            consumer_name: format!("worker-{}", std::process::id()),
            dlq_stream_name: "entityscan:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600),
            block_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisBrokerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redis_url: std::env::var("BROKER_URL").unwrap_or(default.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(default.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(default.consumer_group),
            consumer_name: default.consumer_name,
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(default.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_retries),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.visibility_timeout.as_secs()),
            ),
            block_timeout: default.block_timeout,
        }
    }
}

pub struct RedisBroker {
    client: redis::Client,
    config: RedisBrokerConfig,
}

impl RedisBroker {
    pub fn new(config: RedisBrokerConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create the consumer group if absent. Safe to call on every worker
    /// startup.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(group = %self.config.consumer_group, "created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, task: Task) -> QueueResult<String> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&task)?;
        let id: String = conn
            .xadd(&self.config.stream_name, "*", &[("payload", payload)])
            .await?;
        Ok(id)
    }

    async fn dequeue(&self) -> QueueResult<Option<Delivery>> {
        let mut conn = self.conn().await?;
        let opts = redis::streams::StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_name)
            .count(1)
            .block(self.config.block_timeout.as_millis() as usize);

        let reply: redis::streams::StreamReadReply = conn
            .xread_options(&[&self.config.stream_name], &[">"], &opts)
            .await?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let payload: String = entry
                    .map
                    .get("payload")
                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                    .ok_or_else(|| QueueError::DequeueFailed("missing payload field".into()))?;
                let task: Task = serde_json::from_str(&payload)?;
                let delivery_count = self.pending_delivery_count(&entry.id).await.unwrap_or(1);
                return Ok(Some(Delivery {
                    task,
                    delivery_id: entry.id,
                    delivery_count,
                }));
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.xack(&self.config.stream_name, &self.config.consumer_group, &[&delivery.delivery_id])
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: Delivery) -> QueueResult<()> {
        if delivery.delivery_count >= self.config.max_retries {
            warn!(
                video_id = %delivery.task.video_id,
                delivery_count = delivery.delivery_count,
                "task exceeded max retries, routing to dead-letter stream"
            );
            let mut conn = self.conn().await?;
            let payload = serde_json::to_string(&delivery.task)?;
            let _: String = conn
                .xadd(&self.config.dlq_stream_name, "*", &[("payload", payload)])
                .await?;
            conn.xack(&self.config.stream_name, &self.config.consumer_group, &[&delivery.delivery_id])
                .await?;
        }
        // Otherwise leave the entry pending; XCLAIM by another consumer
        // (or this one, after `visibility_timeout`) will redeliver it
        // with an incremented delivery count.
        Ok(())
    }

    async fn depth(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}

impl RedisBroker {
    async fn pending_delivery_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let pending: redis::streams::StreamPendingCountReply = conn
            .xpending_consumer_count(
                &self.config.stream_name,
                &self.config.consumer_group,
                message_id,
                message_id,
                1,
                &self.config.consumer_name,
            )
            .await?;
        Ok(pending
            .ids
            .first()
            .map(|entry| entry.times_delivered as u32)
            .unwrap_or(1))
    }

    /// Reclaim entries idle past `visibility_timeout` that were never
    /// acked or nacked (crashed consumer), so another consumer can retry
    /// them.
    pub async fn reclaim_stale(&self) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let claimed: redis::streams::StreamClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0")
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for entry in claimed.ids {
            if let Some(payload) = entry
                .map
                .get("payload")
                .and_then(|v| redis::from_redis_value::<String>(v).ok())
            {
                if let Ok(task) = serde_json::from_str::<Task>(&payload) {
                    let delivery_count = self.pending_delivery_count(&entry.id).await.unwrap_or(1);
                    deliveries.push(Delivery {
                        task,
                        delivery_id: entry.id,
                        delivery_count,
                    });
                }
            }
        }
        Ok(deliveries)
    }
}
