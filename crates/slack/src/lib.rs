//! Slack integration for the roll-call tracker.
//!
//! This crate is the boundary between Slack and the tracking engine:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - reaction and button acknowledgments, slash commands
//! - **Slash Commands** (`commands`) - `/rollcall start`, `/rollcall status`, ...
//! - **Block Kit** (`blocks`) - prompt, reminder, and summary message builders
//! - **Web API** (`api`) - outbound sends and channel roster resolution
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `reaction_added` and interactivity
//! 3. Add the slash command: `/rollcall`
//! 4. Set env vars: `ROLLCALL_SLACK_APP_TOKEN`, `ROLLCALL_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → EventDispatcher → Ack handlers → Session registry
//!                                                       ↑
//! Escalation scheduler → SlackApiClient (prompts, reminders, summaries)
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
