use async_trait::async_trait;
use thiserror::Error;

use crate::session::{Topic, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("roster unavailable for `{topic}`: {reason}")]
pub struct RosterUnavailable {
    pub topic: String,
    pub reason: String,
}

impl RosterUnavailable {
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { topic: topic.into(), reason: reason.into() }
    }
}

/// Resolves the set of identities expected to respond for a topic.
///
/// A successful empty listing is a valid answer and is distinguished from a
/// fetch failure; the caller decides whether an empty roster is acceptable.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn list(&self, topic: &Topic) -> Result<Vec<UserId>, RosterUnavailable>;
}

/// Roster source with a fixed membership, independent of topic.
#[derive(Clone, Debug, Default)]
pub struct StaticRosterSource {
    members: Vec<UserId>,
}

impl StaticRosterSource {
    pub fn new(members: Vec<UserId>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl RosterSource for StaticRosterSource {
    async fn list(&self, _topic: &Topic) -> Result<Vec<UserId>, RosterUnavailable> {
        Ok(self.members.clone())
    }
}
