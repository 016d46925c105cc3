use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionId, Topic, UserId};

/// Reference to a posted channel message, used to correlate inbound
/// acknowledgment events back to the session that owns the prompt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

impl MessageRef {
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self { channel: channel.into(), ts: ts.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("delivery to `{recipient}` failed: {reason}")]
pub struct DeliveryError {
    pub recipient: String,
    pub reason: String,
}

impl DeliveryError {
    pub fn new(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), reason: reason.into() }
    }
}

/// Outbound send capability. Message wording and layout belong to the
/// implementation; the engine only states what happened and to whom.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts the roll-call prompt to the topic channel and returns a reference
    /// to the posted message.
    async fn post_prompt(
        &self,
        topic: &Topic,
        session_id: &SessionId,
    ) -> Result<MessageRef, DeliveryError>;

    /// Sends a direct reminder to one unacknowledged user.
    async fn send_escalation(&self, user: &UserId, topic: &Topic) -> Result<(), DeliveryError>;

    /// Announces in the topic channel that everyone has acknowledged.
    async fn send_completion(&self, topic: &Topic, roster_size: usize)
        -> Result<(), DeliveryError>;

    /// Posts the final non-responder summary after the session deadline passed.
    async fn send_expiry_summary(
        &self,
        topic: &Topic,
        pending: &BTreeSet<UserId>,
    ) -> Result<(), DeliveryError>;
}

/// Notifier that drops everything. Useful for wiring the engine without a
/// live chat backend.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn post_prompt(
        &self,
        topic: &Topic,
        _session_id: &SessionId,
    ) -> Result<MessageRef, DeliveryError> {
        Ok(MessageRef::new(topic.0.clone(), "0.000000"))
    }

    async fn send_escalation(&self, _user: &UserId, _topic: &Topic) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_completion(
        &self,
        _topic: &Topic,
        _roster_size: usize,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_expiry_summary(
        &self,
        _topic: &Topic,
        _pending: &BTreeSet<UserId>,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }
}
