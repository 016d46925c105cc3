use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::errors::ApplicationError;
use crate::notify::MessageRef;
use crate::session::{AckOutcome, Session, SessionId, SessionState, Topic, UserId};

/// Consistent point-in-time copy of one session, taken under a single lock
/// acquisition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub topic: Topic,
    pub state: SessionState,
    pub roster: BTreeSet<UserId>,
    pub acknowledged: BTreeSet<UserId>,
    pub pending: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub interval_secs: u64,
    pub prompt_ref: Option<MessageRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub fully_acknowledged: bool,
    pub pending: BTreeSet<UserId>,
}

/// What the escalation loop should do for a session on this tick.
///
/// Terminal variants are produced exactly once: the state transition happens
/// inside the same lock that computed the pending set, so a second tick racing
/// the boundary observes `Stop`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickDecision {
    /// Session is terminal or gone; deregister the timer.
    Stop,
    /// Everyone acknowledged; one completion notice is owed.
    Complete { topic: Topic, roster_size: usize },
    /// Deadline passed with responders outstanding; one summary is owed.
    Expire { topic: Topic, pending: BTreeSet<UserId> },
    /// Still active; remind every pending user.
    Escalate { pending: BTreeSet<UserId> },
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Arc<Mutex<Session>>>,
    by_topic: HashMap<Topic, SessionId>,
    by_prompt: HashMap<MessageRef, SessionId>,
}

/// In-memory session registry and acknowledgment store.
///
/// The map itself sits behind one mutex; each session behind its own, so
/// acknowledgment traffic for unrelated sessions does not contend. Lock order
/// is always registry before session, and no lock is held across an await.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, enforcing the one-active-session-per-topic rule.
    pub fn insert(&self, session: Session) -> Result<SessionId, ApplicationError> {
        let mut inner = self.lock_inner();

        if let Some(existing_id) = inner.by_topic.get(&session.topic).cloned() {
            let still_active = inner
                .sessions
                .get(&existing_id)
                .map(|entry| !lock_session(entry).state.is_terminal())
                .unwrap_or(false);
            if still_active {
                return Err(ApplicationError::SessionConflict {
                    topic: session.topic.0.clone(),
                    existing: existing_id.0,
                });
            }
        }

        let id = session.id.clone();
        inner.by_topic.insert(session.topic.clone(), id.clone());
        if let Some(prompt) = session.prompt_ref.clone() {
            inner.by_prompt.insert(prompt, id.clone());
        }
        inner.sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        Ok(id)
    }

    /// Idempotently records an acknowledgment. Dropped acknowledgments are
    /// logged here and never surface as errors to the ingress path.
    pub fn record_ack(&self, session_id: &SessionId, user: &UserId) -> AckOutcome {
        let Some(entry) = self.session_entry(session_id) else {
            debug!(
                event_name = "ack.dropped_unknown_session",
                session_id = %session_id,
                user_id = %user,
                "acknowledgment for unknown session dropped"
            );
            return AckOutcome::UnknownSession;
        };

        let outcome = lock_session(&entry).acknowledge(user);
        match outcome {
            AckOutcome::Recorded => {
                debug!(
                    event_name = "ack.recorded",
                    session_id = %session_id,
                    user_id = %user,
                    "acknowledgment recorded"
                );
            }
            AckOutcome::AlreadyAcknowledged => {}
            AckOutcome::NotOnRoster => {
                debug!(
                    event_name = "ack.dropped_not_on_roster",
                    session_id = %session_id,
                    user_id = %user,
                    "acknowledgment from identity outside the roster dropped"
                );
            }
            AckOutcome::SessionClosed => {
                debug!(
                    event_name = "ack.dropped_session_closed",
                    session_id = %session_id,
                    user_id = %user,
                    "late acknowledgment after terminal state dropped"
                );
            }
            AckOutcome::UnknownSession => unreachable!("resolved entries have a session"),
        }
        outcome
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        let entry = self.session_entry(session_id)?;
        let session = lock_session(&entry);
        Some(SessionSnapshot {
            id: session.id.clone(),
            topic: session.topic.clone(),
            state: session.state,
            roster: session.roster.clone(),
            acknowledged: session.acknowledged.clone(),
            pending: session.pending(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            interval_secs: session.interval.as_secs(),
            prompt_ref: session.prompt_ref.clone(),
        })
    }

    /// Pure read: `roster − acknowledged` for one session.
    pub fn evaluate(&self, session_id: &SessionId) -> Option<Evaluation> {
        let entry = self.session_entry(session_id)?;
        let session = lock_session(&entry);
        let pending = session.pending();
        Some(Evaluation { fully_acknowledged: pending.is_empty(), pending })
    }

    /// Transitions `Active -> Cancelled`. Returns false (and does nothing) for
    /// terminal or unknown sessions, so cancellation is safely repeatable.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        let Some(entry) = self.session_entry(session_id) else {
            return false;
        };
        let mut session = lock_session(&entry);
        session.transition_to(SessionState::Cancelled).is_ok()
    }

    /// The evaluate-then-transition step at the heart of every scheduler tick.
    ///
    /// Runs entirely under the session lock: the pending set it reports and
    /// the terminal transition it may perform come from one atomic view.
    pub fn tick_decision(&self, session_id: &SessionId, now: DateTime<Utc>) -> TickDecision {
        let Some(entry) = self.session_entry(session_id) else {
            return TickDecision::Stop;
        };
        let mut session = lock_session(&entry);

        if session.state.is_terminal() {
            return TickDecision::Stop;
        }

        let pending = session.pending();
        if pending.is_empty() {
            if session.transition_to(SessionState::Complete).is_err() {
                return TickDecision::Stop;
            }
            return TickDecision::Complete {
                topic: session.topic.clone(),
                roster_size: session.roster.len(),
            };
        }

        if session.expires_at.is_some_and(|deadline| now >= deadline) {
            if session.transition_to(SessionState::Expired).is_err() {
                return TickDecision::Stop;
            }
            return TickDecision::Expire { topic: session.topic.clone(), pending };
        }

        TickDecision::Escalate { pending }
    }

    /// Session currently bound to a topic, if it is still active.
    pub fn active_session(&self, topic: &Topic) -> Option<SessionId> {
        let inner = self.lock_inner();
        let id = inner.by_topic.get(topic)?;
        let entry = inner.sessions.get(id)?;
        let active = !lock_session(entry).state.is_terminal();
        active.then(|| id.clone())
    }

    /// Resolves an inbound event's message reference to the owning session.
    pub fn resolve_prompt(&self, prompt: &MessageRef) -> Option<SessionId> {
        self.lock_inner().by_prompt.get(prompt).cloned()
    }

    pub fn active_count(&self) -> usize {
        let inner = self.lock_inner();
        inner
            .sessions
            .values()
            .filter(|entry| !lock_session(entry).state.is_terminal())
            .count()
    }

    fn session_entry(&self, session_id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.lock_inner().sessions.get(session_id).cloned()
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_session(entry: &Arc<Mutex<Session>>) -> MutexGuard<'_, Session> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use crate::errors::ApplicationError;
    use crate::notify::MessageRef;
    use crate::session::{AckOutcome, Session, SessionId, SessionState, Topic, UserId};

    use super::{SessionRegistry, TickDecision};

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn roster(users: &[&str]) -> BTreeSet<UserId> {
        users.iter().map(|id| user(id)).collect()
    }

    fn session(id: &str, topic: &str, users: &[&str]) -> Session {
        Session::new(
            SessionId(id.to_string()),
            Topic(topic.to_string()),
            roster(users),
            Duration::from_secs(60),
            None,
        )
    }

    #[test]
    fn insert_rejects_second_active_session_for_topic() {
        let registry = SessionRegistry::new();
        registry.insert(session("rs-1", "C-ops", &["U1"])).expect("first insert");

        let error = registry
            .insert(session("rs-2", "C-ops", &["U1"]))
            .expect_err("duplicate topic must conflict");

        assert!(matches!(
            error,
            ApplicationError::SessionConflict { ref topic, ref existing }
                if topic == "C-ops" && existing == "rs-1"
        ));
    }

    #[test]
    fn insert_allows_new_session_once_prior_is_terminal() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1"])).expect("first insert");
        assert!(registry.cancel(&id));

        registry.insert(session("rs-2", "C-ops", &["U1"])).expect("terminal topic is free again");
        assert_eq!(registry.active_session(&Topic("C-ops".to_string())), Some(SessionId("rs-2".to_string())));
    }

    #[test]
    fn record_ack_for_unknown_session_is_dropped() {
        let registry = SessionRegistry::new();
        let outcome = registry.record_ack(&SessionId("rs-missing".to_string()), &user("U1"));
        assert_eq!(outcome, AckOutcome::UnknownSession);
    }

    #[test]
    fn snapshot_reports_consistent_roster_and_pending() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1", "U2", "U3"])).expect("insert");
        registry.record_ack(&id, &user("U2"));

        let snapshot = registry.snapshot(&id).expect("snapshot");
        assert_eq!(snapshot.roster, roster(&["U1", "U2", "U3"]));
        assert_eq!(snapshot.acknowledged, roster(&["U2"]));
        assert_eq!(snapshot.pending, roster(&["U1", "U3"]));
        assert_eq!(snapshot.state, SessionState::Active);
    }

    #[test]
    fn evaluate_computes_roster_minus_acknowledged() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1", "U2"])).expect("insert");
        registry.record_ack(&id, &user("U1"));

        let evaluation = registry.evaluate(&id).expect("evaluate");
        assert!(!evaluation.fully_acknowledged);
        assert_eq!(evaluation.pending, roster(&["U2"]));
    }

    #[test]
    fn tick_decision_escalates_only_unacknowledged_users() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1", "U2", "U3"])).expect("insert");
        registry.record_ack(&id, &user("U1"));

        let decision = registry.tick_decision(&id, Utc::now());
        assert_eq!(decision, TickDecision::Escalate { pending: roster(&["U2", "U3"]) });
    }

    #[test]
    fn tick_decision_completes_exactly_once() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1"])).expect("insert");
        registry.record_ack(&id, &user("U1"));

        let first = registry.tick_decision(&id, Utc::now());
        assert!(matches!(first, TickDecision::Complete { roster_size: 1, .. }));

        // A duplicate tick racing the boundary observes the terminal state.
        assert_eq!(registry.tick_decision(&id, Utc::now()), TickDecision::Stop);
        assert_eq!(registry.snapshot(&id).expect("snapshot").state, SessionState::Complete);
    }

    #[test]
    fn tick_decision_expires_exactly_once_with_pending_listed() {
        let registry = SessionRegistry::new();
        let mut expiring = session("rs-1", "C-ops", &["U1", "U2", "U3"]);
        expiring.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let id = registry.insert(expiring).expect("insert");
        registry.record_ack(&id, &user("U1"));

        let first = registry.tick_decision(&id, Utc::now());
        assert_eq!(
            first,
            TickDecision::Expire {
                topic: Topic("C-ops".to_string()),
                pending: roster(&["U2", "U3"]),
            }
        );

        assert_eq!(registry.tick_decision(&id, Utc::now()), TickDecision::Stop);
        assert_eq!(registry.snapshot(&id).expect("snapshot").state, SessionState::Expired);
    }

    #[test]
    fn completion_wins_over_expiry_when_pending_is_empty_at_deadline() {
        let registry = SessionRegistry::new();
        let mut expiring = session("rs-1", "C-ops", &["U1"]);
        expiring.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let id = registry.insert(expiring).expect("insert");
        registry.record_ack(&id, &user("U1"));

        assert!(matches!(registry.tick_decision(&id, Utc::now()), TickDecision::Complete { .. }));
    }

    #[test]
    fn cancel_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session("rs-1", "C-ops", &["U1"])).expect("insert");

        assert!(registry.cancel(&id));
        assert!(!registry.cancel(&id));
        assert!(!registry.cancel(&SessionId("rs-missing".to_string())));
        assert_eq!(registry.snapshot(&id).expect("snapshot").state, SessionState::Cancelled);
    }

    #[test]
    fn resolve_prompt_maps_message_ref_to_session() {
        let registry = SessionRegistry::new();
        let mut prompted = session("rs-1", "C-ops", &["U1"]);
        prompted.prompt_ref = Some(MessageRef::new("C-ops", "1730000000.1000"));
        registry.insert(prompted).expect("insert");

        let resolved = registry.resolve_prompt(&MessageRef::new("C-ops", "1730000000.1000"));
        assert_eq!(resolved, Some(SessionId("rs-1".to_string())));
        assert_eq!(registry.resolve_prompt(&MessageRef::new("C-ops", "9.9")), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acknowledgments_are_not_lost() {
        let users: Vec<String> = (0..100).map(|n| format!("U{n:03}")).collect();
        let full_roster: BTreeSet<UserId> = users.iter().map(|u| UserId(u.clone())).collect();

        let registry = Arc::new(SessionRegistry::new());
        let id = registry
            .insert(Session::new(
                SessionId("rs-load".to_string()),
                Topic("C-ops".to_string()),
                full_roster.clone(),
                Duration::from_secs(60),
                None,
            ))
            .expect("insert");

        let mut handles = Vec::new();
        for u in users {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                registry.record_ack(&id, &UserId(u))
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("task"), AckOutcome::Recorded);
        }

        let snapshot = registry.snapshot(&id).expect("snapshot");
        assert_eq!(snapshot.acknowledged.len(), 100);
        assert_eq!(snapshot.acknowledged, full_roster);
    }
}
