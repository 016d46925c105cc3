use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ApplicationError, DomainError};
use crate::notify::Notifier;
use crate::registry::{Evaluation, SessionRegistry, SessionSnapshot};
use crate::roster::RosterSource;
use crate::scheduler::EscalationScheduler;
use crate::session::{Session, SessionId, Topic, UserId};

/// Baseline timing and roster filtering applied when a trigger does not
/// specify its own values.
#[derive(Clone, Debug)]
pub struct SessionDefaults {
    pub interval: Duration,
    pub expires_in: Option<Duration>,
    pub exclude: Vec<UserId>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), expires_in: None, exclude: Vec::new() }
    }
}

#[derive(Clone, Debug)]
pub struct CreateSessionRequest {
    pub topic: Topic,
    pub interval: Option<Duration>,
    pub expires_in: Option<Duration>,
}

impl CreateSessionRequest {
    pub fn for_topic(topic: Topic) -> Self {
        Self { topic, interval: None, expires_in: None }
    }
}

/// Session lifecycle entry point: every trigger surface (HTTP, slash command,
/// recurring schedule) funnels through here.
pub struct SessionService {
    registry: Arc<SessionRegistry>,
    scheduler: Arc<EscalationScheduler>,
    roster_source: Arc<dyn RosterSource>,
    notifier: Arc<dyn Notifier>,
    defaults: SessionDefaults,
}

impl SessionService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        scheduler: Arc<EscalationScheduler>,
        roster_source: Arc<dyn RosterSource>,
        notifier: Arc<dyn Notifier>,
        defaults: SessionDefaults,
    ) -> Self {
        Self { registry, scheduler, roster_source, notifier, defaults }
    }

    /// Resolves the roster once, posts the prompt, registers the session, and
    /// starts its escalation timer.
    ///
    /// Ordering matters: the conflict pre-check runs before the prompt is
    /// posted so a rejected start leaves no stray message in the channel, and
    /// the session is only registered once the prompt exists, so a failed
    /// send leaves nothing half-created behind.
    pub async fn create(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionId, ApplicationError> {
        let topic = request.topic;
        let members = self.roster_source.list(&topic).await.map_err(|error| {
            ApplicationError::RosterUnavailable { topic: topic.0.clone(), reason: error.reason }
        })?;

        let roster: BTreeSet<UserId> = members
            .into_iter()
            .filter(|member| !self.defaults.exclude.contains(member))
            .collect();
        if roster.is_empty() {
            return Err(DomainError::EmptyRoster { topic: topic.0.clone() }.into());
        }

        if let Some(existing) = self.registry.active_session(&topic) {
            return Err(ApplicationError::SessionConflict {
                topic: topic.0.clone(),
                existing: existing.0,
            });
        }

        let id = SessionId(Uuid::new_v4().to_string());
        let interval = request.interval.unwrap_or(self.defaults.interval);
        let expires_in = request.expires_in.or(self.defaults.expires_in);

        let prompt = self.notifier.post_prompt(&topic, &id).await.map_err(|error| {
            ApplicationError::Delivery { recipient: topic.0.clone(), reason: error.reason }
        })?;

        let mut session = Session::new(
            id.clone(),
            topic.clone(),
            roster,
            interval,
            expires_in.map(|delta| {
                Utc::now() + chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::zero())
            }),
        );
        session.prompt_ref = Some(prompt);
        let roster_size = session.roster.len();

        if let Err(error) = self.registry.insert(session) {
            // Lost a creation race after the prompt went out; the posted
            // message stays in the channel but tracks nothing.
            warn!(
                event_name = "session.create_conflict_after_prompt",
                topic = %topic,
                session_id = %id,
                "conflicting session registered while posting prompt"
            );
            return Err(error);
        }

        self.scheduler.spawn(id.clone(), interval);
        info!(
            event_name = "session.created",
            session_id = %id,
            topic = %topic,
            roster_size,
            interval_secs = interval.as_secs(),
            "roll-call session started"
        );
        Ok(id)
    }

    /// Stops a session. State flips before the timer is torn down, so no
    /// further escalations can be observed once this returns.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        let cancelled = self.registry.cancel(session_id);
        self.scheduler.deregister(session_id);
        if cancelled {
            info!(
                event_name = "session.cancelled",
                session_id = %session_id,
                "roll-call session cancelled"
            );
        }
        cancelled
    }

    pub fn status(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        self.registry.snapshot(session_id)
    }

    pub fn evaluate(&self, session_id: &SessionId) -> Option<Evaluation> {
        self.registry.evaluate(session_id)
    }

    pub fn active_session(&self, topic: &Topic) -> Option<SessionId> {
        self.registry.active_session(topic)
    }
}
