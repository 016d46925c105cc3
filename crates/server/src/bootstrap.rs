use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use rollcall_core::config::{AppConfig, ConfigError, LoadOptions};
use rollcall_core::notify::Notifier;
use rollcall_core::registry::SessionRegistry;
use rollcall_core::roster::RosterSource;
use rollcall_core::scheduler::EscalationScheduler;
use rollcall_core::service::{SessionDefaults, SessionService};
use rollcall_core::session::UserId;
use rollcall_slack::api::{ApiError, SlackApiClient};
use rollcall_slack::events::{
    BlockActionAckHandler, EventDispatcher, ReactionAckHandler, RegistryAckSink,
    SlashCommandHandler,
};
use rollcall_slack::socket::SocketModeRunner;

use crate::commands::SessionCommandService;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub scheduler: Arc<EscalationScheduler>,
    pub service: Arc<SessionService>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack api client initialization failed: {0}")]
    SlackClient(#[from] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = Arc::new(SlackApiClient::new(&config.slack)?);
    let notifier: Arc<dyn Notifier> = client.clone();
    let roster_source: Arc<dyn RosterSource> = client;

    let registry = Arc::new(SessionRegistry::new());
    let scheduler =
        Arc::new(EscalationScheduler::new(Arc::clone(&registry), Arc::clone(&notifier)));
    let service = Arc::new(SessionService::new(
        Arc::clone(&registry),
        Arc::clone(&scheduler),
        roster_source,
        notifier,
        session_defaults(&config),
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReactionAckHandler::new(RegistryAckSink::new(Arc::clone(&registry))));
    dispatcher.register(BlockActionAckHandler::new(RegistryAckSink::new(Arc::clone(&registry))));
    dispatcher.register(SlashCommandHandler::new(SessionCommandService::new(Arc::clone(&service))));
    let slack_runner = SocketModeRunner::with_noop_transport(dispatcher);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        reminder_interval_secs = config.reminder.interval_secs,
        schedule_entries = config.schedule.entries.len(),
        "application components wired"
    );

    Ok(Application { config, registry, scheduler, service, slack_runner })
}

fn session_defaults(config: &AppConfig) -> SessionDefaults {
    SessionDefaults {
        interval: Duration::from_secs(config.reminder.interval_secs),
        expires_in: config.reminder.expiry_secs.map(Duration::from_secs),
        exclude: config.reminder.exclude_users.iter().cloned().map(UserId).collect(),
    }
}
