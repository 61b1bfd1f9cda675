//! Pull-based event ingestion.
//!
//! One subscriber task per subscription. Within a subscription messages are handled one at a
//! time in pull order and always acknowledged, including when the handler fails or the
//! payload does not decode. Failed events are logged, not redelivered.

pub mod events;
pub mod handlers;
pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngestionConfig;

pub use events::{DomainEvent, EventDecodeError, Topic};
pub use handlers::{default_handlers, EventHandler, HandlerError};
pub use queue::{MessageQueue, PubSubRestQueue, QueueError, ReceivedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_messages: usize,
    pub poll_interval: Duration,
}

impl PollSettings {
    pub fn from_config(config: &IngestionConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            poll_interval: config.poll_interval,
        }
    }
}

/// Polling loop for one subscription.
pub struct Subscriber {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn EventHandler>,
    settings: PollSettings,
}

impl Subscriber {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn EventHandler>,
        settings: PollSettings,
    ) -> Self {
        Self {
            queue,
            handler,
            settings,
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let topic = self.handler.topic();
        let subscription = self.handler.subscription();

        if let Err(err) = self.queue.ensure_subscription(topic, subscription).await {
            warn!(topic = topic.name(), subscription, error = %err, "could not ensure subscription");
        }
        info!(topic = topic.name(), subscription, "subscriber started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pulled = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                pulled = self.queue.pull(subscription, self.settings.max_messages) => pulled,
            };

            let idle = match pulled {
                Ok(messages) if messages.is_empty() => true,
                Ok(messages) => {
                    self.process_batch(messages, &shutdown).await;
                    false
                }
                Err(err) => {
                    warn!(topic = topic.name(), subscription, error = %err, "pull failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        info!(topic = topic.name(), subscription, "subscriber stopped");
    }

    /// Handles messages in order and acknowledges each one that was attempted. Messages left
    /// over once shutdown is requested stay unacknowledged for redelivery.
    pub async fn process_batch(
        &self,
        messages: Vec<ReceivedMessage>,
        shutdown: &watch::Receiver<bool>,
    ) -> usize {
        let subscription = self.handler.subscription();
        let mut ack_ids = Vec::with_capacity(messages.len());

        for message in messages {
            if *shutdown.borrow() {
                debug!(subscription, "shutdown requested, leaving rest of batch");
                break;
            }
            self.dispatch(&message).await;
            ack_ids.push(message.ack_id);
        }

        if let Err(err) = self.queue.acknowledge(subscription, &ack_ids).await {
            warn!(subscription, count = ack_ids.len(), error = %err, "acknowledge failed");
        }
        ack_ids.len()
    }

    async fn dispatch(&self, message: &ReceivedMessage) {
        let topic = self.handler.topic();
        let subscription = self.handler.subscription();

        let event = match DomainEvent::decode(topic, &message.data) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    topic = topic.name(),
                    subscription,
                    message_id = %message.message_id,
                    error = %err,
                    "dropping undecodable message"
                );
                return;
            }
        };

        let (key, id) = event.primary_key();
        info!(topic = topic.name(), subscription, key, id, "message received");
        let id = id.to_string();

        if let Err(err) = self.handler.handle(event).await {
            error!(
                topic = topic.name(),
                subscription,
                id = %id,
                error = %err,
                "message handler failed"
            );
        }
    }
}

/// Owns every subscriber task and drains them on shutdown.
pub struct IngestionSupervisor {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    grace: Duration,
}

impl IngestionSupervisor {
    pub fn start(
        queue: Arc<dyn MessageQueue>,
        handlers: Vec<Arc<dyn EventHandler>>,
        settings: PollSettings,
        grace: Duration,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let tasks = handlers
            .into_iter()
            .map(|handler| {
                let subscription = handler.subscription();
                let subscriber = Subscriber::new(queue.clone(), handler, settings);
                let task = tokio::spawn(subscriber.run(receiver.clone()));
                (subscription, task)
            })
            .collect();

        Self {
            shutdown,
            tasks,
            grace,
        }
    }

    pub fn subscriptions(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signals every subscriber, waits up to the grace period, then aborts stragglers.
    /// Returns how many tasks had to be aborted.
    pub async fn shutdown(self) -> usize {
        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + self.grace;
        let mut aborted = 0;

        for (subscription, mut task) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => debug!(subscription, "subscriber drained"),
                Ok(Err(err)) => error!(subscription, error = %err, "subscriber task panicked"),
                Err(_) => {
                    warn!(subscription, "grace period elapsed, aborting subscriber");
                    task.abort();
                    aborted += 1;
                }
            }
        }

        info!(aborted, "ingestion stopped");
        aborted
    }
}
