//! An [UpdateConsumer] drains a queue subscription one delivery at a time.
//!
//! For every delivery it will:
//!
//! - decode the body in to an [IssueUpdate]. A malformed body is rejected
//! without touching the store.
//! - apply the update through its [RecordStore]. A failed update is
//! rejected. No distinction is made between transient and permanent
//! failures, and nothing is retried: a poison message must not loop
//! forever, at the cost of losing updates during a store outage.
//! - acknowledge the delivery once the update succeeded, even if it matched
//! no rows.
//!
//! Rejected deliveries are never requeued. Each delivery is settled exactly
//! once before the next one is taken, so acknowledgements follow delivery
//! order. A failure to settle is logged and otherwise ignored; the broker's
//! redelivery policy decides what happens to that message.
//!
//! Example usage:
//!
//! ``` no_run
//! # use issue_sync::{SyncConfig, UpdateConsumer};
//! # async fn inner(config: SyncConfig) -> Result<(), issue_sync::SyncError> {
//! let consumer = UpdateConsumer::connect(config).await?;
//! // blocks until the delivery stream closes
//! let result = consumer.start().await;
//! // both the channel and the connection are released, even on error
//! consumer.close().await?;
//! # result
//! # }
//! ```

mod outcome;

use std::{error::Error, future::Future};

use futures::StreamExt;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use outcome::Outcome;

use crate::{
    config::QueueConfig,
    error::{ProcessError, SyncError},
    queue::{Delivery, MessageQueue},
    record::IssueUpdate,
    store::RecordStore,
};

pub struct UpdateConsumer<Q, S> {
    queue: Q,
    store: S,
    /// The queue to subscribe to.
    queue_name: String,
    /// Maximum unacknowledged deliveries in flight.
    prefetch_count: u16,
}

impl<Q: MessageQueue, S: RecordStore> UpdateConsumer<Q, S> {
    /// Create a new instance from already open handles. The broker URL in
    /// `config` is not used.
    pub fn new(queue: Q, store: S, config: QueueConfig) -> Self {
        Self {
            queue,
            store,
            queue_name: config.name,
            prefetch_count: config.prefetch_count,
        }
    }

    /// Finish construction once the store is open by waiting on the queue.
    /// If the queue can't be opened the store is closed before returning.
    pub async fn open<F, E>(store: S, queue: F, config: QueueConfig) -> Result<Self, SyncError>
    where
        F: Future<Output = Result<Q, E>>,
        E: Error + Send + Sync + 'static,
    {
        match queue.await {
            Ok(queue) => Ok(Self::new(queue, store, config)),
            Err(e) => {
                store.close().await;
                Err(SyncError::queue(e))
            }
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume until the delivery stream ends. Returns an error if the
    /// subscription can't be set up or the stream fails.
    pub async fn start(&self) -> Result<(), SyncError> {
        self.start_until(CancellationToken::new()).await
    }

    /// As [UpdateConsumer::start], but also stop (successfully) once
    /// `shutdown` is cancelled. A delivery already being processed is
    /// always finished first.
    pub async fn start_until(&self, shutdown: CancellationToken) -> Result<(), SyncError> {
        self.queue
            .set_prefetch(self.prefetch_count)
            .await
            .map_err(SyncError::queue)?;
        let mut deliveries = self
            .queue
            .subscribe(&self.queue_name)
            .await
            .map_err(SyncError::queue)?;
        info!(
            "Waiting for messages on {} (prefetch {})",
            self.queue_name, self.prefetch_count
        );

        loop {
            let next = select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, leaving {}", self.queue_name);
                    return Ok(());
                }
                next = deliveries.next() => next,
            };
            match next {
                Some(Ok(delivery)) => {
                    self.process(delivery).await;
                }
                Some(Err(e)) => {
                    error!("Delivery stream for {} failed: {}", self.queue_name, e);
                    return Err(SyncError::queue(e));
                }
                None => {
                    warn!("Delivery stream for {} closed", self.queue_name);
                    return Ok(());
                }
            }
        }
    }

    /// Take a single delivery through decode, update and settlement.
    pub async fn process(&self, delivery: Q::Delivery) -> Outcome {
        let tag = delivery.delivery_tag();
        let update = match IssueUpdate::decode(delivery.body()) {
            Ok(update) => update,
            Err(e) => {
                warn!("Rejecting delivery {}, malformed body: {}", tag, e);
                Self::reject(delivery).await;
                return Outcome::Rejected {
                    id: None,
                    error: e.into(),
                };
            }
        };

        match self.store.apply_update(update.id, &update.issue).await {
            Ok(rows_affected) => {
                if rows_affected == 0 {
                    info!("Issue {} matched no changed rows", update.id);
                } else {
                    info!("Issue {} updated", update.id);
                }
                Self::ack(delivery).await;
                Outcome::Acknowledged {
                    id: update.id,
                    rows_affected,
                }
            }
            Err(e) => {
                error!(
                    "Rejecting delivery {}, failed to update issue {}: {}",
                    tag, update.id, e
                );
                Self::reject(delivery).await;
                Outcome::Rejected {
                    id: Some(update.id),
                    error: ProcessError::Store(Box::new(e)),
                }
            }
        }
    }

    async fn ack(delivery: Q::Delivery) {
        let tag = delivery.delivery_tag();
        if let Err(e) = delivery.ack().await {
            error!("Failed to ack delivery {}: {}", tag, e);
        }
    }

    async fn reject(delivery: Q::Delivery) {
        let tag = delivery.delivery_tag();
        if let Err(e) = delivery.reject().await {
            error!("Failed to reject delivery {}: {}", tag, e);
        }
    }

    /// Release the queue (channel, then connection) and then the store.
    /// Every release is attempted; the first queue error is returned.
    pub async fn close(self) -> Result<(), SyncError> {
        let queue = self.queue.close().await.map_err(SyncError::queue);
        self.store.close().await;
        queue
    }
}

#[cfg(all(feature = "mysql", feature = "amqp"))]
impl UpdateConsumer<crate::queue::amqp::AmqpQueue, crate::store::sql::MySqlRecordStore> {
    /// Connect to the database, then the broker, and open a channel.
    pub async fn connect(config: crate::SyncConfig) -> Result<Self, SyncError> {
        let store = crate::store::sql::MySqlRecordStore::connect(&config.database)
            .await
            .map_err(SyncError::store)?;
        let url = config.queue.url.clone();
        let queue = crate::queue::amqp::AmqpQueue::connect(&url);
        let consumer = Self::open(store, queue, config.queue).await?;
        info!("Connected to {}", config.database.host);
        Ok(consumer)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        queue::mock::{Disposition, MockBroker, MockQueue, MockQueueError},
        record::Issue,
        store::mock::MockRecordStore,
    };

    fn issue(id: i64, status: &str) -> Issue {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Issue {
            id,
            summary: format!("issue {id}"),
            status: status.to_string(),
            di: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn config() -> QueueConfig {
        QueueConfig {
            url: "amqp://unused".to_string(),
            name: "issue.updates".to_string(),
            prefetch_count: 4,
        }
    }

    fn make_consumer(
        issues: Vec<Issue>,
    ) -> (UpdateConsumer<MockQueue, MockRecordStore>, MockBroker) {
        let (queue, broker) = MockQueue::new();
        let store = MockRecordStore::with_issues(issues);
        (UpdateConsumer::new(queue, store, config()), broker)
    }

    #[tokio::test]
    async fn update_existing() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open"), issue(6, "open")]);
        let tag = broker.publish(r#"{"id":5,"issue":{"status":"closed"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Ack)]);
        let issues = consumer.store().issues().await;
        assert_eq!(issues[&5].status, "closed");
        assert_eq!(issues[&5].summary, "issue 5");
        assert_eq!(issues[&6], issue(6, "open"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        let tag = broker.publish(r#"{"id":5,"issue":{"status":"clo"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Reject)]);
        assert_eq!(consumer.store().calls(), 0);
        assert_eq!(consumer.store().issues().await[&5], issue(5, "open"));
    }

    #[tokio::test]
    async fn missing_record_is_acked() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        let tag = broker.publish(r#"{"id":999,"issue":{"status":"closed"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Ack)]);
        assert_eq!(consumer.store().calls(), 1);
        assert_eq!(consumer.store().issues().await[&5], issue(5, "open"));
    }

    #[tokio::test]
    async fn null_issue_and_missing_id_are_acked() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        let null_issue = broker.publish(r#"{"id":5,"issue":null}"#);
        let no_id = broker.publish(r#"{"issue":{"Status":"closed"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(
            broker.dispositions().await,
            vec![(null_issue, Disposition::Ack), (no_id, Disposition::Ack)]
        );
        assert_eq!(consumer.store().calls(), 2);
        let issues = consumer.store().issues().await;
        assert_eq!(issues[&5].status, "open");
        assert_eq!(issues[&5].summary, "issue 5");
    }

    #[tokio::test]
    async fn capitalised_keys_are_applied() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        let tag = broker.publish(r#"{"ID":5,"Issue":{"Status":"closed","Di":4}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Ack)]);
        let issues = consumer.store().issues().await;
        assert_eq!(issues[&5].status, "closed");
        assert_eq!(issues[&5].di, 4);
    }

    #[tokio::test]
    async fn nested_id_clash_is_rejected() {
        let (consumer, broker) = make_consumer(vec![issue(2, "open"), issue(3, "open")]);
        let tag = broker.publish(r#"{"id":2,"issue":{"id":3,"status":"clash"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Reject)]);
        let issues = consumer.store().issues().await;
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[&2], issue(2, "open"));
        assert_eq!(issues[&3], issue(3, "open"));
    }

    #[tokio::test]
    async fn store_failure_is_rejected() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        consumer.store().set_failing(true);
        let tag = broker.publish(r#"{"id":5,"issue":{"status":"closed"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Reject)]);
        assert_eq!(consumer.store().issues().await[&5], issue(5, "open"));
    }

    #[tokio::test]
    async fn process_outcomes() {
        let (consumer, broker) = make_consumer(vec![issue(5, "open")]);
        let mut stream = consumer.queue().subscribe("q").await.unwrap();

        broker.publish(r#"{"id":5,"issue":{"di":2}}"#);
        let outcome = consumer.process(stream.next().await.unwrap().unwrap()).await;
        assert!(matches!(
            outcome,
            Outcome::Acknowledged {
                id: 5,
                rows_affected: 1
            }
        ));

        broker.publish("not json");
        let outcome = consumer.process(stream.next().await.unwrap().unwrap()).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected {
                id: None,
                error: ProcessError::Decode(_)
            }
        ));

        consumer.store().set_failing(true);
        broker.publish(r#"{"id":5}"#);
        let outcome = consumer.process(stream.next().await.unwrap().unwrap()).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected {
                id: Some(5),
                error: ProcessError::Store(_)
            }
        ));
    }

    #[tokio::test]
    async fn settled_once_in_delivery_order() {
        let (consumer, broker) = make_consumer(vec![issue(1, "open"), issue(2, "open")]);
        let bodies = [
            r#"{"id":1,"issue":{"status":"a"}}"#,
            "{",
            r#"{"id":3,"issue":{"status":"b"}}"#,
            r#"{"id":2,"issue":{"status":"c"}}"#,
            "[]",
        ];
        let tags: Vec<_> = bodies.iter().map(|b| broker.publish(*b)).collect();
        broker.disconnect();
        consumer.start().await.unwrap();

        let expected: Vec<_> = tags
            .into_iter()
            .zip([
                Disposition::Ack,
                Disposition::Reject,
                Disposition::Ack,
                Disposition::Ack,
                Disposition::Reject,
            ])
            .collect();
        assert_eq!(broker.dispositions().await, expected);
        assert_eq!(consumer.store().calls(), 3);
    }

    #[tokio::test]
    async fn settle_failure_does_not_stop_consuming() {
        let (consumer, broker) = make_consumer(vec![issue(1, "open")]);
        let first = broker.publish_unsettleable(r#"{"id":1,"issue":{"status":"a"}}"#);
        let second = broker.publish(r#"{"id":1,"issue":{"status":"b"}}"#);
        broker.disconnect();
        consumer.start().await.unwrap();

        assert_eq!(
            broker.dispositions().await,
            vec![(first, Disposition::Ack), (second, Disposition::Ack)]
        );
        assert_eq!(consumer.store().issues().await[&1].status, "b");
    }

    #[tokio::test]
    async fn subscribes_with_prefetch() {
        let (consumer, broker) = make_consumer(vec![]);
        broker.disconnect();
        consumer.start().await.unwrap();
        assert_eq!(broker.prefetch().await, Some(4));
        assert_eq!(broker.subscription().await.as_deref(), Some("issue.updates"));
    }

    #[tokio::test]
    async fn broken_stream_is_an_error() {
        let (consumer, broker) = make_consumer(vec![issue(1, "open")]);
        let tag = broker.publish(r#"{"id":1,"issue":{"status":"a"}}"#);
        broker.break_stream();
        assert!(matches!(consumer.start().await, Err(SyncError::Queue(_))));
        assert_eq!(broker.dispositions().await, vec![(tag, Disposition::Ack)]);
    }

    #[tokio::test]
    async fn cancellation_stops_between_messages() -> anyhow::Result<()> {
        let (consumer, broker) = make_consumer(vec![issue(1, "open")]);
        let consumer = Arc::new(consumer);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            let shutdown = shutdown.clone();
            async move { consumer.start_until(shutdown).await }
        });

        broker.publish(r#"{"id":1,"issue":{"status":"a"}}"#);
        timeout(Duration::from_secs(5), async {
            while broker.dispositions().await.is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;

        shutdown.cancel();
        timeout(Duration::from_secs(5), handle).await???;

        broker.publish(r#"{"id":1,"issue":{"status":"b"}}"#);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.dispositions().await.len(), 1);
        assert_eq!(consumer.store().issues().await[&1].status, "a");

        Ok(())
    }

    #[tokio::test]
    async fn close_attempts_everything() {
        let (consumer, broker) = make_consumer(vec![]);
        broker.fail_channel_close();
        broker.fail_connection_close();
        let result = consumer.close().await;
        assert!(matches!(result, Err(SyncError::Queue(ref e)) if e.to_string() == "failed to close channel"));
        assert!(broker.channel_closed());
        assert!(broker.connection_closed());
    }

    #[tokio::test]
    async fn close_releases_store() {
        let (queue, broker) = MockQueue::new();
        let store = Arc::new(MockRecordStore::new());
        let consumer = UpdateConsumer::new(queue, Arc::clone(&store), config());
        consumer.close().await.unwrap();
        assert!(broker.channel_closed());
        assert!(broker.connection_closed());
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn open_closes_store_when_queue_fails() {
        let store = Arc::new(MockRecordStore::new());
        let result = UpdateConsumer::<MockQueue, _>::open(
            Arc::clone(&store),
            async { Err(MockQueueError::Unreachable) },
            config(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Queue(_))));
        assert!(store.is_closed());
    }
}
