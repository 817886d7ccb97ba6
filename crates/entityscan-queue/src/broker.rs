//! The `Broker` interface and its in-process implementation.

use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::sync::{mpsc, Mutex};

use crate::error::{QueueError, QueueResult};
use crate::task::{Delivery, Task};

/// Abstracts the in-process vs. out-of-process worker transport. A single job is always processed by exactly
/// one worker; the broker's only job is to hand each enqueued `Task` to
/// exactly one caller of `dequeue` and to support redelivery on `nack`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a task. Returns the broker-assigned identifier.
    async fn enqueue(&self, task: Task) -> QueueResult<String>;

    /// Block until a task is available, or return `None` if the broker
    /// has been closed and drained.
    async fn dequeue(&self) -> QueueResult<Option<Delivery>>;

    /// Acknowledge successful processing; the task will not be redelivered.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Signal failed processing. The broker may redeliver up to its own
    /// retry policy before routing the task to a dead-letter sink.
    async fn nack(&self, delivery: Delivery) -> QueueResult<()>;

    /// Current number of tasks awaiting a worker.
    async fn depth(&self) -> QueueResult<u64>;
}

/// Config for the in-process broker: the bounded channel capacity is the
/// backpressure signal the façade observes.
#[derive(Debug, Clone)]
pub struct InProcessBrokerConfig {
    pub capacity: usize,
    pub max_retries: u32,
}

impl Default for InProcessBrokerConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_retries: 3,
        }
    }
}

/// A bounded `tokio::sync::mpsc` channel standing in for an out-of-process
/// broker in single-node deployments.
pub struct InProcessBroker {
    sender: mpsc::Sender<Delivery>,
    receiver: Mutex<mpsc::Receiver<Delivery>>,
    max_retries: u32,
    next_id: std::sync::atomic::AtomicU64,
}

impl InProcessBroker {
    pub fn new(config: InProcessBrokerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            max_retries: config.max_retries,
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    fn next_delivery_id(&self) -> String {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("inproc-{id}")
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn enqueue(&self, task: Task) -> QueueResult<String> {
        let delivery = Delivery {
            task,
            delivery_id: self.next_delivery_id(),
            delivery_count: 1,
        };
        let id = delivery.delivery_id.clone();
        self.sender
            .send(delivery)
            .await
            .map_err(|_| QueueError::Closed)?;
        counter!("entityscan_broker_enqueued_total").increment(1);
        gauge!("entityscan_broker_depth").set(self.sender.max_capacity() as f64 - self.sender.capacity() as f64);
        Ok(id)
    }

    async fn dequeue(&self) -> QueueResult<Option<Delivery>> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }

    async fn ack(&self, _delivery: &Delivery) -> QueueResult<()> {
        counter!("entityscan_broker_acked_total").increment(1);
        Ok(())
    }

    async fn nack(&self, mut delivery: Delivery) -> QueueResult<()> {
        delivery.delivery_count += 1;
        if delivery.delivery_count > self.max_retries {
            tracing::warn!(
                video_id = %delivery.task.video_id,
                delivery_count = delivery.delivery_count,
                "task exceeded max retries, dropping"
            );
            counter!("entityscan_broker_dropped_total").increment(1);
            return Ok(());
        }
        counter!("entityscan_broker_redelivered_total").increment(1);
        self.sender
            .send(delivery)
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(())
    }

    async fn depth(&self) -> QueueResult<u64> {
        Ok((self.sender.max_capacity() - self.sender.capacity()) as u64)
    }
}

/// Build the broker this process should use, shared by the worker and
/// facade binaries so the two never disagree on how `broker_url` is interpreted: absent means the in-process
/// channel, present means Redis Streams behind the `redis-broker` feature.
pub fn open_broker(broker_url: Option<&str>) -> QueueResult<std::sync::Arc<dyn Broker>> {
    match broker_url {
        None => Ok(std::sync::Arc::new(InProcessBroker::new(InProcessBrokerConfig::default()))),
        #[cfg(feature = "redis-broker")]
        Some(_) => {
            let config = crate::redis_broker::RedisBrokerConfig::from_env();
            Ok(std::sync::Arc::new(crate::redis_broker::RedisBroker::new(config)?))
        }
        #[cfg(not(feature = "redis-broker"))]
        Some(_) => Err(QueueError::connection_failed(
            "broker_url is set but this binary was built without the redis-broker feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entityscan_models::VideoId;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let broker = InProcessBroker::new(InProcessBrokerConfig::default());
        let task = Task::new(VideoId::from("abcd1234"));
        broker.enqueue(task.clone()).await.unwrap();

        let delivery = broker.dequeue().await.unwrap().unwrap();
        assert_eq!(delivery.task, task);
        assert_eq!(delivery.delivery_count, 1);
        broker.ack(&delivery).await.unwrap();
    }

    #[tokio::test]
    async fn nack_redelivers_until_max_retries() {
        let broker = InProcessBroker::new(InProcessBrokerConfig { capacity: 8, max_retries: 2 });
        let task = Task::new(VideoId::from("abcd1234"));
        broker.enqueue(task).await.unwrap();

        let first = broker.dequeue().await.unwrap().unwrap();
        assert_eq!(first.delivery_count, 1);
        broker.nack(first).await.unwrap();

        let second = broker.dequeue().await.unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        // A third delivery would carry delivery_count 3, exceeding
        // max_retries of 2, so this nack drops the task instead of
        // redelivering it.
        broker.nack(second).await.unwrap();

        let third = tokio::time::timeout(std::time::Duration::from_millis(50), broker.dequeue()).await;
        assert!(third.is_err(), "no further delivery expected after drop");
    }

    #[tokio::test]
    async fn depth_reflects_queued_tasks() {
        let broker = InProcessBroker::new(InProcessBrokerConfig::default());
        assert_eq!(broker.depth().await.unwrap(), 0);
        broker.enqueue(Task::new(VideoId::from("aaaaaaaa"))).await.unwrap();
        assert_eq!(broker.depth().await.unwrap(), 1);
    }
}
