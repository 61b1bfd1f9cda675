use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::events::Topic;

/// One pulled message. `ack_id` is only valid for the subscription it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue transport failed: {0}")]
    Transport(String),
    #[error("queue returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("queue response could not be decoded: {0}")]
    Decode(String),
}

/// Pull-based subscription queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Creates the topic and subscription when missing. Existing resources are fine.
    async fn ensure_subscription(&self, topic: Topic, subscription: &str) -> Result<(), QueueError>;

    async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn acknowledge(&self, subscription: &str, ack_ids: &[String]) -> Result<(), QueueError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
}

/// Decodes each message on its own. A payload that is not valid base64 is passed on empty so
/// the subscriber logs it as undecodable and still acknowledges it.
fn into_messages(subscription: &str, body: PullResponse) -> Vec<ReceivedMessage> {
    body.received_messages
        .into_iter()
        .map(|received| {
            let data = STANDARD
                .decode(received.message.data.as_bytes())
                .unwrap_or_else(|err| {
                    warn!(
                        subscription,
                        message_id = %received.message.message_id,
                        error = %err,
                        "message data is not base64"
                    );
                    Vec::new()
                });
            ReceivedMessage {
                ack_id: received.ack_id,
                message_id: received.message.message_id,
                data,
            }
        })
        .collect()
}

/// Pub/Sub REST API (emulator or service endpoint).
#[derive(Debug)]
pub struct PubSubRestQueue {
    endpoint: Url,
    project_id: String,
    pull_timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl PubSubRestQueue {
    pub fn new(endpoint: Url, project_id: impl Into<String>, pull_timeout: Duration) -> Self {
        Self {
            endpoint,
            project_id: project_id.into(),
            pull_timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, QueueError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .build()
                    .map_err(|err| QueueError::Transport(err.to_string()))
            })
            .await
    }

    pub fn topic_path(&self, topic: Topic) -> String {
        format!("projects/{}/topics/{}", self.project_id, topic.name())
    }

    pub fn subscription_path(&self, subscription: &str) -> String {
        format!("projects/{}/subscriptions/{}", self.project_id, subscription)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.endpoint.as_str().trim_end_matches('/'), resource)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, QueueError> {
        request
            .send()
            .await
            .map_err(|err| QueueError::Transport(err.to_string()))
    }

    /// PUT that treats 409 Conflict as "already exists".
    async fn create(&self, resource: &str, body: Value) -> Result<bool, QueueError> {
        let client = self.client().await?;
        let response = self.send(client.put(self.url(resource)).json(&body)).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status => Err(QueueError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, QueueError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(QueueError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl MessageQueue for PubSubRestQueue {
    async fn ensure_subscription(&self, topic: Topic, subscription: &str) -> Result<(), QueueError> {
        let topic_path = self.topic_path(topic);
        if self.create(&topic_path, json!({})).await? {
            info!(topic = topic.name(), "topic created");
        }
        let subscription_path = self.subscription_path(subscription);
        if self
            .create(&subscription_path, json!({ "topic": topic_path }))
            .await?
        {
            info!(topic = topic.name(), subscription, "subscription created");
        }
        Ok(())
    }

    async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let client = self.client().await?;
        let url = self.url(&format!("{}:pull", self.subscription_path(subscription)));
        let request = client
            .post(url)
            .timeout(self.pull_timeout)
            .json(&json!({ "maxMessages": max_messages }));
        let response = ensure_success(self.send(request).await?).await?;
        let body: PullResponse = response
            .json()
            .await
            .map_err(|err| QueueError::Decode(err.to_string()))?;

        Ok(into_messages(subscription, body))
    }

    async fn acknowledge(&self, subscription: &str, ack_ids: &[String]) -> Result<(), QueueError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let url = self.url(&format!("{}:acknowledge", self.subscription_path(subscription)));
        let request = client.post(url).json(&json!({ "ackIds": ack_ids }));
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::events::DomainEvent;

    fn queue() -> PubSubRestQueue {
        PubSubRestQueue::new(
            Url::parse("http://localhost:8085").expect("valid url"),
            "marketplace",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn builds_resource_urls() {
        let queue = queue();
        assert_eq!(
            queue.url(&queue.topic_path(Topic::JobPublished)),
            "http://localhost:8085/v1/projects/marketplace/topics/job-published"
        );
        assert_eq!(
            queue.url(&format!("{}:pull", queue.subscription_path("job-published-scope"))),
            "http://localhost:8085/v1/projects/marketplace/subscriptions/job-published-scope:pull"
        );
    }

    #[test]
    fn pull_response_tolerates_missing_messages() {
        let body: PullResponse = serde_json::from_str("{}").expect("decodes");
        assert!(body.received_messages.is_empty());

        let body: PullResponse = serde_json::from_value(json!({
            "receivedMessages": [
                {"ackId": "a-1", "message": {"data": STANDARD.encode(br#"{"user_id":"u"}"#), "messageId": "1"}}
            ]
        }))
        .expect("decodes");
        assert_eq!(body.received_messages[0].ack_id, "a-1");
    }

    #[test]
    fn bad_base64_does_not_sink_the_batch() {
        let body: PullResponse = serde_json::from_value(json!({
            "receivedMessages": [
                {"ackId": "a-1", "message": {"data": "eyJ1c2VyX2lkIjoidSJ9", "messageId": "1"}},
                {"ackId": "a-2", "message": {"data": "!!not-base64!!", "messageId": "2"}},
                {"ackId": "a-3", "message": {"data": STANDARD.encode(br#"{"user_id":"v"}"#), "messageId": "3"}}
            ]
        }))
        .expect("decodes");

        let messages = into_messages("user-registered-fraud", body);

        let ack_ids: Vec<&str> = messages.iter().map(|m| m.ack_id.as_str()).collect();
        assert_eq!(ack_ids, vec!["a-1", "a-2", "a-3"]);
        assert_eq!(messages[0].data, br#"{"user_id":"u"}"#.to_vec());
        assert!(messages[1].data.is_empty());
        assert_eq!(messages[2].data, br#"{"user_id":"v"}"#.to_vec());
        assert!(DomainEvent::decode(Topic::UserRegistered, &messages[1].data).is_err());
    }
}
