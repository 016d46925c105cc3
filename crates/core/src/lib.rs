pub mod config;
pub mod errors;
pub mod notify;
pub mod registry;
pub mod roster;
pub mod scheduler;
pub mod service;
pub mod session;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{DeliveryError, MessageRef, NoopNotifier, Notifier};
pub use registry::{Evaluation, SessionRegistry, SessionSnapshot, TickDecision};
pub use roster::{RosterSource, RosterUnavailable, StaticRosterSource};
pub use scheduler::EscalationScheduler;
pub use service::{CreateSessionRequest, SessionDefaults, SessionService};
pub use session::{AckOutcome, Session, SessionId, SessionState, Topic, UserId};
