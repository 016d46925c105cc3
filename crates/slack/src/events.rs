use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use rollcall_core::notify::MessageRef;
use rollcall_core::registry::SessionRegistry;
use rollcall_core::session::{AckOutcome, UserId};

use crate::{
    blocks::{self, MessageTemplate, ACK_ACTION_ID},
    commands::{
        normalize_rollcall_command, CommandParseError, CommandRouteError, CommandRouter,
        NoopRollcallCommandService, RollcallCommandService, SlashCommandPayload,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    ReactionAdded(ReactionAddedEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    ReactionAdded,
    BlockAction,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub reactor_user_id: String,
    pub reaction: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub user_id: String,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(NoopRollcallCommandService));
    dispatcher
}

/// How an acknowledgment arrived. Both kinds are equivalent to the tracker;
/// the distinction only matters for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckKind {
    Button,
    Reaction,
}

impl AckKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Reaction => "reaction",
        }
    }
}

/// Where normalized acknowledgments land. The session hint is the channel
/// message the user responded to; resolving it to a session is the sink's job.
#[async_trait]
pub trait AckSink: Send + Sync {
    async fn record(&self, hint: &MessageRef, user: &UserId, kind: AckKind) -> AckOutcome;
}

/// Binds the ingress path to the in-memory session registry: the prompt
/// message reference is looked up and the acknowledgment recorded against the
/// owning session.
pub struct RegistryAckSink {
    registry: Arc<SessionRegistry>,
}

impl RegistryAckSink {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl AckSink for RegistryAckSink {
    async fn record(&self, hint: &MessageRef, user: &UserId, kind: AckKind) -> AckOutcome {
        let Some(session_id) = self.registry.resolve_prompt(hint) else {
            debug!(
                event_name = "ingress.ack.unresolved_hint",
                channel_id = %hint.channel,
                message_ts = %hint.ts,
                user_id = %user,
                kind = kind.label(),
                "acknowledgment did not match any tracked prompt"
            );
            return AckOutcome::UnknownSession;
        };
        self.registry.record_ack(&session_id, user)
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: RollcallCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: RollcallCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_rollcall_command(payload.clone())?;
        let message = self.router.route(normalized).await?;
        Ok(HandlerResult::Responded(message))
    }
}

/// Records acknowledgments signalled by a supported emoji reaction on the
/// prompt message. Unsupported reactions and reactions on unrelated messages
/// pass through without effect.
pub struct ReactionAckHandler<S> {
    sink: S,
}

impl<S> ReactionAckHandler<S>
where
    S: AckSink,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S> EventHandler for ReactionAckHandler<S>
where
    S: AckSink + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if !is_ack_reaction(&event.reaction) {
            return Ok(HandlerResult::Processed);
        }

        let hint = MessageRef::new(event.channel_id.clone(), event.message_ts.clone());
        let user = UserId(event.reactor_user_id.clone());
        let outcome = self.sink.record(&hint, &user, AckKind::Reaction).await;

        Ok(match outcome {
            AckOutcome::Recorded => {
                HandlerResult::Responded(blocks::ack_confirmation_message(&user))
            }
            _ => HandlerResult::Processed,
        })
    }
}

/// Records acknowledgments signalled by the prompt's acknowledge button.
pub struct BlockActionAckHandler<S> {
    sink: S,
}

impl<S> BlockActionAckHandler<S>
where
    S: AckSink,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionAckHandler<S>
where
    S: AckSink + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if event.action_id == "rollcall.help.v1" {
            return Ok(HandlerResult::Responded(blocks::help_message()));
        }
        if event.action_id != ACK_ACTION_ID {
            return Ok(HandlerResult::Processed);
        }

        let hint = MessageRef::new(event.channel_id.clone(), event.message_ts.clone());
        let user = UserId(event.user_id.clone());
        let outcome = self.sink.record(&hint, &user, AckKind::Button).await;

        Ok(match outcome {
            AckOutcome::Recorded | AckOutcome::AlreadyAcknowledged => {
                HandlerResult::Responded(blocks::ack_confirmation_message(&user))
            }
            _ => HandlerResult::Processed,
        })
    }
}

pub fn is_ack_reaction(reaction: &str) -> bool {
    matches!(
        normalize_reaction_token(reaction).as_str(),
        "✅" | "white_check_mark"
            | "check"
            | "👍"
            | "thumbsup"
            | "+1"
            | "🙌"
            | "raised_hands"
            | "👌"
            | "ok_hand"
            | "ok"
    )
}

fn normalize_reaction_token(reaction: &str) -> String {
    reaction.trim().trim_matches(':').to_ascii_lowercase()
}
