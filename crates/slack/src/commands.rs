use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_ts: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: String,
    pub verb: String,
    pub freeform_args: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_ts: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollcallCommand {
    Start { interval: Option<Duration>, expiry: Option<Duration> },
    Status,
    Cancel,
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("invalid duration argument `{0}` (expected forms like `90s`, `15m`, `2h`)")]
    InvalidDuration(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

pub fn normalize_rollcall_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != "/rollcall" {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let text = payload.text.trim().to_owned();
    let mut parts = text.split_whitespace();
    let verb = parts.next().unwrap_or("help").to_ascii_lowercase();
    let freeform_args = parts.collect::<Vec<_>>().join(" ");

    Ok(CommandEnvelope {
        command: "rollcall".to_owned(),
        verb,
        freeform_args,
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        trigger_ts: payload.trigger_ts,
        request_id: payload.request_id,
    })
}

pub fn classify_rollcall_command(
    verb: &str,
    freeform_args: &str,
) -> Result<RollcallCommand, CommandParseError> {
    match verb {
        "" | "help" => Ok(RollcallCommand::Help),
        "start" => {
            let mut durations = freeform_args.split_whitespace().map(parse_duration_token);
            let interval = durations.next().transpose()?;
            let expiry = durations.next().transpose()?;
            Ok(RollcallCommand::Start { interval, expiry })
        }
        "status" => Ok(RollcallCommand::Status),
        "cancel" | "stop" => Ok(RollcallCommand::Cancel),
        other => Ok(RollcallCommand::Unknown { verb: other.to_owned() }),
    }
}

/// Parses `90s` / `15m` / `2h` style duration arguments. A bare number is
/// read as minutes, matching how people type reminder cadences.
pub fn parse_duration_token(token: &str) -> Result<Duration, CommandParseError> {
    let token = token.trim();
    let (digits, unit) = match token.find(|ch: char| !ch.is_ascii_digit()) {
        Some(split) => token.split_at(split),
        None => (token, "m"),
    };

    let value: u64 =
        digits.parse().map_err(|_| CommandParseError::InvalidDuration(token.to_owned()))?;
    if value == 0 {
        return Err(CommandParseError::InvalidDuration(token.to_owned()));
    }

    let seconds = match unit {
        "s" | "sec" | "secs" => value,
        "m" | "min" | "mins" => value * 60,
        "h" | "hr" | "hrs" => value * 3_600,
        _ => return Err(CommandParseError::InvalidDuration(token.to_owned())),
    };
    Ok(Duration::from_secs(seconds))
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: RollcallCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let command = match classify_rollcall_command(&envelope.verb, &envelope.freeform_args) {
            Ok(command) => command,
            Err(parse_error) => {
                return Ok(blocks::error_message(&parse_error.to_string(), &envelope.request_id));
            }
        };

        match command {
            RollcallCommand::Start { interval, expiry } => {
                self.service.start_session(interval, expiry, &envelope).await
            }
            RollcallCommand::Status => self.service.session_status(&envelope).await,
            RollcallCommand::Cancel => self.service.cancel_session(&envelope).await,
            RollcallCommand::Help => Ok(blocks::help_message()),
            RollcallCommand::Unknown { verb } => Ok(blocks::error_message(
                &format!("Unsupported command `/rollcall {verb}`. Try `/rollcall help`."),
                &envelope.request_id,
            )),
        }
    }
}

#[async_trait]
pub trait RollcallCommandService: Send + Sync {
    async fn start_session(
        &self,
        interval: Option<Duration>,
        expiry: Option<Duration>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn session_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn cancel_session(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}

/// Placeholder service used before a live session backend is wired in.
#[derive(Default)]
pub struct NoopRollcallCommandService;

#[async_trait]
impl RollcallCommandService for NoopRollcallCommandService {
    async fn start_session(
        &self,
        _interval: Option<Duration>,
        _expiry: Option<Duration>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(blocks::error_message(
            "Roll call backend is not connected; nothing was started.",
            &envelope.request_id,
        ))
    }

    async fn session_status(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(blocks::error_message(
            "Roll call backend is not connected; no status available.",
            &envelope.request_id,
        ))
    }

    async fn cancel_session(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(blocks::error_message(
            "Roll call backend is not connected; nothing was cancelled.",
            &envelope.request_id,
        ))
    }
}
