use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::notify::MessageRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Complete,
    Expired,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Outcome of attempting to record an acknowledgment.
///
/// None of these are errors: a duplicate, out-of-roster, or late acknowledgment
/// is dropped quietly and the caller decides whether to log it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Recorded,
    AlreadyAcknowledged,
    NotOnRoster,
    SessionClosed,
    UnknownSession,
}

/// One outstanding prompt: the roster expected to respond to it, the subset
/// that already has, and the timing parameters driving escalation.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub topic: Topic,
    pub roster: BTreeSet<UserId>,
    pub acknowledged: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub interval: Duration,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub prompt_ref: Option<MessageRef>,
}

impl Session {
    pub fn new(
        id: SessionId,
        topic: Topic,
        roster: BTreeSet<UserId>,
        interval: Duration,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            topic,
            roster,
            acknowledged: BTreeSet::new(),
            created_at: Utc::now(),
            interval,
            expires_at,
            state: SessionState::Active,
            prompt_ref: None,
        }
    }

    /// Roster members that have not acknowledged yet.
    pub fn pending(&self) -> BTreeSet<UserId> {
        self.roster.difference(&self.acknowledged).cloned().collect()
    }

    pub fn is_fully_acknowledged(&self) -> bool {
        self.acknowledged.len() == self.roster.len()
    }

    /// Idempotently records an acknowledgment. Only roster members of a live
    /// session mutate state; everything else reports why it was dropped.
    pub fn acknowledge(&mut self, user: &UserId) -> AckOutcome {
        if self.state.is_terminal() {
            return AckOutcome::SessionClosed;
        }
        if !self.roster.contains(user) {
            return AckOutcome::NotOnRoster;
        }
        if self.acknowledged.insert(user.clone()) {
            AckOutcome::Recorded
        } else {
            AckOutcome::AlreadyAcknowledged
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (&self.state, next),
            (SessionState::Active, SessionState::Complete)
                | (SessionState::Active, SessionState::Expired)
                | (SessionState::Active, SessionState::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: SessionState) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.state = next;
            return Ok(());
        }

        Err(DomainError::InvalidSessionTransition { from: self.state, to: next })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::{AckOutcome, Session, SessionId, SessionState, Topic, UserId};

    fn roster(users: &[&str]) -> BTreeSet<UserId> {
        users.iter().map(|user| UserId((*user).to_string())).collect()
    }

    fn session(users: &[&str]) -> Session {
        Session::new(
            SessionId("rs-1".to_string()),
            Topic("C-ops".to_string()),
            roster(users),
            Duration::from_secs(60),
            None,
        )
    }

    #[test]
    fn acknowledgment_stays_within_roster() {
        let mut session = session(&["U1", "U2"]);

        assert_eq!(session.acknowledge(&UserId("U1".to_string())), AckOutcome::Recorded);
        assert_eq!(session.acknowledge(&UserId("U9".to_string())), AckOutcome::NotOnRoster);

        assert!(session.acknowledged.is_subset(&session.roster));
        assert_eq!(session.acknowledged.len(), 1);
    }

    #[test]
    fn double_acknowledgment_is_idempotent() {
        let mut session = session(&["U1", "U2"]);
        let user = UserId("U1".to_string());

        assert_eq!(session.acknowledge(&user), AckOutcome::Recorded);
        let after_first = session.acknowledged.clone();
        assert_eq!(session.acknowledge(&user), AckOutcome::AlreadyAcknowledged);

        assert_eq!(session.acknowledged, after_first);
    }

    #[test]
    fn pending_is_roster_minus_acknowledged() {
        let mut session = session(&["U1", "U2", "U3"]);
        session.acknowledge(&UserId("U2".to_string()));

        assert_eq!(session.pending(), roster(&["U1", "U3"]));
        assert!(!session.is_fully_acknowledged());

        session.acknowledge(&UserId("U1".to_string()));
        session.acknowledge(&UserId("U3".to_string()));
        assert!(session.pending().is_empty());
        assert!(session.is_fully_acknowledged());
    }

    #[test]
    fn late_acknowledgment_after_terminal_state_is_dropped() {
        let mut session = session(&["U1"]);
        session.transition_to(SessionState::Cancelled).expect("active -> cancelled");

        assert_eq!(session.acknowledge(&UserId("U1".to_string())), AckOutcome::SessionClosed);
        assert!(session.acknowledged.is_empty());
    }

    #[test]
    fn allows_each_terminal_transition_from_active() {
        for terminal in [SessionState::Complete, SessionState::Expired, SessionState::Cancelled] {
            let mut session = session(&["U1"]);
            session.transition_to(terminal).expect("active -> terminal");
            assert_eq!(session.state, terminal);
        }
    }

    #[test]
    fn terminal_states_never_reenter_active() {
        let mut session = session(&["U1"]);
        session.transition_to(SessionState::Complete).expect("active -> complete");

        let error = session
            .transition_to(SessionState::Active)
            .expect_err("complete -> active must be rejected");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidSessionTransition {
                from: SessionState::Complete,
                to: SessionState::Active,
            }
        ));
    }

    #[test]
    fn duplicate_terminal_transition_is_rejected() {
        let mut session = session(&["U1"]);
        session.transition_to(SessionState::Expired).expect("active -> expired");

        assert!(session.transition_to(SessionState::Complete).is_err());
        assert_eq!(session.state, SessionState::Expired);
    }
}
