use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rollcall_core::service::{CreateSessionRequest, SessionService};
use rollcall_core::session::Topic;
use rollcall_slack::blocks::{self, MessageTemplate};
use rollcall_slack::commands::{CommandEnvelope, CommandRouteError, RollcallCommandService};

const NO_ACTIVE_SESSION: &str = "No roll call is currently running in this channel.";

/// Slash-command backend: `/rollcall` verbs issued in a channel operate on
/// that channel's session.
pub struct SessionCommandService {
    service: Arc<SessionService>,
}

impl SessionCommandService {
    pub fn new(service: Arc<SessionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RollcallCommandService for SessionCommandService {
    async fn start_session(
        &self,
        interval: Option<Duration>,
        expiry: Option<Duration>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let topic = Topic(envelope.channel_id.clone());
        let request = CreateSessionRequest { topic, interval, expires_in: expiry };

        match self.service.create(request).await {
            Ok(session_id) => {
                let (roster_size, interval_secs) = self
                    .service
                    .status(&session_id)
                    .map(|snapshot| (snapshot.roster.len(), snapshot.interval_secs))
                    .unwrap_or_default();
                Ok(blocks::started_message(roster_size, interval_secs))
            }
            Err(error) => {
                let interface = error.into_interface(envelope.request_id.clone());
                Ok(blocks::error_message(interface.user_message(), &envelope.request_id))
            }
        }
    }

    async fn session_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let topic = Topic(envelope.channel_id.clone());
        let snapshot = self
            .service
            .active_session(&topic)
            .and_then(|session_id| self.service.status(&session_id));

        Ok(match snapshot {
            Some(snapshot) => blocks::status_message(
                &envelope.channel_id,
                snapshot.acknowledged.len(),
                snapshot.roster.len(),
            ),
            None => blocks::error_message(NO_ACTIVE_SESSION, &envelope.request_id),
        })
    }

    async fn cancel_session(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let topic = Topic(envelope.channel_id.clone());
        Ok(match self.service.active_session(&topic) {
            Some(session_id) => {
                self.service.cancel(&session_id);
                blocks::cancelled_message()
            }
            None => blocks::error_message(NO_ACTIVE_SESSION, &envelope.request_id),
        })
    }
}
