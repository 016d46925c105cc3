use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::notify::Notifier;
use crate::registry::{SessionRegistry, TickDecision};
use crate::session::SessionId;

/// Timer-driven escalation loops, one task per active session.
///
/// Each tick recomputes the pending set fresh via the registry's atomic
/// tick decision, so ticks are idempotent: acknowledgments landing mid-tick
/// are picked up on the next one and never double-remind anyone. There is no
/// "already reminded" bookkeeping to go stale.
pub struct EscalationScheduler {
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    tasks: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl EscalationScheduler {
    pub fn new(registry: Arc<SessionRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier, tasks: Mutex::new(HashMap::new()) }
    }

    /// Starts the repeating escalation timer for a session. The first tick
    /// fires one full interval after registration, not immediately.
    pub fn spawn(self: &Arc<Self>, session_id: SessionId, interval: Duration) {
        let scheduler = Arc::clone(self);
        let task_id = session_id.clone();
        let period = interval.max(Duration::from_secs(1));
        let handle = tokio::spawn(async move {
            scheduler.run_session(task_id, period).await;
        });

        let mut tasks = self.lock_tasks();
        if let Some(previous) = tasks.insert(session_id.clone(), handle) {
            // A stale task for a reused id must not keep ticking.
            previous.abort();
            warn!(
                event_name = "scheduler.replaced_stale_task",
                session_id = %session_id,
                "aborted leftover escalation task while spawning a new one"
            );
        }
        debug!(
            event_name = "scheduler.task_started",
            session_id = %session_id,
            interval_secs = interval.as_secs(),
            "escalation timer registered"
        );
    }

    /// Stops the timer for a session. The session state itself is flipped by
    /// the registry before this is called, so even an in-flight tick observes
    /// a terminal state and sends nothing further.
    pub fn deregister(&self, session_id: &SessionId) {
        if let Some(handle) = self.lock_tasks().remove(session_id) {
            handle.abort();
            debug!(
                event_name = "scheduler.task_deregistered",
                session_id = %session_id,
                "escalation timer stopped"
            );
        }
    }

    /// Aborts every escalation task. Used on process shutdown.
    pub fn shutdown(&self) {
        let mut tasks = self.lock_tasks();
        for (session_id, handle) in tasks.drain() {
            handle.abort();
            debug!(
                event_name = "scheduler.task_deregistered",
                session_id = %session_id,
                "escalation timer stopped during shutdown"
            );
        }
    }

    pub fn task_count(&self) -> usize {
        self.lock_tasks().len()
    }

    async fn run_session(self: Arc<Self>, session_id: SessionId, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.registry.tick_decision(&session_id, Utc::now()) {
                TickDecision::Stop => break,
                TickDecision::Complete { topic, roster_size } => {
                    info!(
                        event_name = "session.complete",
                        session_id = %session_id,
                        topic = %topic,
                        roster_size,
                        "all responders acknowledged"
                    );
                    if let Err(error) = self.notifier.send_completion(&topic, roster_size).await {
                        warn!(
                            event_name = "session.completion_notice_failed",
                            session_id = %session_id,
                            topic = %topic,
                            error = %error,
                            "completion notice could not be delivered"
                        );
                    }
                    break;
                }
                TickDecision::Expire { topic, pending } => {
                    info!(
                        event_name = "session.expired",
                        session_id = %session_id,
                        topic = %topic,
                        pending_count = pending.len(),
                        "session deadline passed with responders outstanding"
                    );
                    if let Err(error) = self.notifier.send_expiry_summary(&topic, &pending).await {
                        warn!(
                            event_name = "session.expiry_summary_failed",
                            session_id = %session_id,
                            topic = %topic,
                            error = %error,
                            "non-responder summary could not be delivered"
                        );
                    }
                    break;
                }
                TickDecision::Escalate { pending } => {
                    debug!(
                        event_name = "session.escalation_tick",
                        session_id = %session_id,
                        pending_count = pending.len(),
                        "sending reminders to unacknowledged responders"
                    );
                    let topic = match self.registry.snapshot(&session_id) {
                        Some(snapshot) => snapshot.topic,
                        None => break,
                    };
                    for user in &pending {
                        // One failed reminder must not starve the rest of the
                        // pending set; the next tick retries naturally.
                        if let Err(error) = self.notifier.send_escalation(user, &topic).await {
                            warn!(
                                event_name = "session.escalation_failed",
                                session_id = %session_id,
                                user_id = %user,
                                error = %error,
                                "escalation reminder could not be delivered"
                            );
                        }
                    }
                }
            }
        }

        self.lock_tasks().remove(&session_id);
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<SessionId, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
