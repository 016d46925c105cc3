use std::collections::BTreeSet;

use rollcall_core::session::UserId;
use serde::Serialize;

/// Block action id carried by the acknowledge button on the roll-call prompt.
pub const ACK_ACTION_ID: &str = "rollcall.ack.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

fn mention(user: &UserId) -> String {
    format!("<@{user}>")
}

/// The roll-call prompt posted to the channel. The button value carries the
/// session id so interactions can be correlated even if the message reference
/// is lost.
pub fn prompt_message(session_id: &str) -> MessageTemplate {
    MessageBuilder::new("🔔 Roll call: please confirm you have seen this")
        .section("rollcall.prompt.header.v1", |section| {
            section.mrkdwn("🔔 *Roll call* — please confirm you have seen this.");
        })
        .actions("rollcall.prompt.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(ACK_ACTION_ID, "✅ Acknowledge")
                    .style(ButtonStyle::Primary)
                    .value(session_id),
            );
        })
        .context("rollcall.prompt.context.v1", |context| {
            context.plain("Press the button or react with ✅ to check in.");
        })
        .build()
}

/// Direct reminder sent to one unacknowledged user.
pub fn escalation_message(topic: &str) -> MessageTemplate {
    MessageBuilder::new("⏳ You haven't acknowledged the roll call yet")
        .section("rollcall.escalation.body.v1", |section| {
            section.mrkdwn(format!(
                "⏳ You haven't acknowledged the roll call in <#{topic}> yet. \
                 Press the button or react with ✅ on the channel message."
            ));
        })
        .build()
}

/// Channel notice posted once everyone on the roster has acknowledged.
pub fn completion_message(roster_size: usize) -> MessageTemplate {
    MessageBuilder::new("✅ Roll call complete")
        .section("rollcall.complete.body.v1", |section| {
            section.mrkdwn(format!(
                "✅ *Roll call complete* — all {roster_size} expected responders checked in."
            ));
        })
        .build()
}

/// Final channel summary after the deadline passed with responders missing.
pub fn expiry_summary_message(pending: &BTreeSet<UserId>) -> MessageTemplate {
    let mentions = pending.iter().map(mention).collect::<Vec<_>>().join("\n");
    MessageBuilder::new(format!("⚠️ Roll call expired with {} outstanding", pending.len()))
        .section("rollcall.expired.header.v1", |section| {
            section.mrkdwn("⚠️ *Roll call expired.* Still waiting on:");
        })
        .section("rollcall.expired.pending.v1", |section| {
            section.mrkdwn(mentions);
        })
        .build()
}

/// Ephemeral confirmation shown to a user whose acknowledgment was recorded.
pub fn ack_confirmation_message(user: &UserId) -> MessageTemplate {
    MessageBuilder::new("Acknowledgment recorded")
        .section("rollcall.ack.confirm.v1", |section| {
            section.mrkdwn(format!("✅ Thanks {}, your acknowledgment is recorded.", mention(user)));
        })
        .build()
}

/// Confirmation returned to whoever started a roll call.
pub fn started_message(roster_size: usize, interval_secs: u64) -> MessageTemplate {
    MessageBuilder::new("🔔 Roll call started")
        .section("rollcall.started.body.v1", |section| {
            section.mrkdwn(format!(
                "🔔 *Roll call started.* Tracking {roster_size} expected responders; reminders every {interval_secs}s until everyone checks in."
            ));
        })
        .build()
}

pub fn cancelled_message() -> MessageTemplate {
    MessageBuilder::new("Roll call cancelled")
        .section("rollcall.cancelled.body.v1", |section| {
            section.mrkdwn("🛑 Roll call cancelled. No further reminders will be sent.");
        })
        .build()
}

pub fn status_message(topic: &str, acknowledged: usize, total: usize) -> MessageTemplate {
    MessageBuilder::new(format!("Roll call status: {acknowledged}/{total} acknowledged"))
        .section("rollcall.status.body.v1", |section| {
            section.mrkdwn(format!(
                "*Roll call in <#{topic}>*: {acknowledged} of {total} acknowledged."
            ));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("rollcall.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("rollcall.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Roll call command help")
        .section("rollcall.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/rollcall start [interval] [expiry]` — start a roll call in this channel (e.g. `/rollcall start 15m 2h`)\n• `/rollcall status`\n• `/rollcall cancel`\n• `/rollcall help`",
            );
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rollcall_core::session::UserId;

    use super::{
        error_message, expiry_summary_message, prompt_message, Block, ButtonStyle, MessageBuilder,
        TextObject, ACK_ACTION_ID,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("rollcall.test.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .actions("rollcall.test.actions.v1", |actions| {
                actions.button(super::ButtonElement::new("rollcall.confirm.v1", "Confirm"));
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                block_id,
                text: TextObject::Mrkdwn { .. }
            } if block_id == "rollcall.test.v1"
        ));
        assert!(matches!(
            &message.blocks[1],
            Block::Actions { block_id, elements } if block_id == "rollcall.test.actions.v1" && elements.len() == 1
        ));
    }

    #[test]
    fn prompt_carries_ack_button_with_session_id_value() {
        let message = prompt_message("rs-42");

        let elements = if let Block::Actions { elements, .. } = &message.blocks[1] {
            Some(elements)
        } else {
            None
        };
        assert!(elements.is_some(), "expected actions block");
        let elements = elements.expect("actions block asserted above");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].action_id, ACK_ACTION_ID);
        assert_eq!(elements[0].style, Some(ButtonStyle::Primary));
        assert_eq!(elements[0].value.as_deref(), Some("rs-42"));
    }

    #[test]
    fn expiry_summary_mentions_every_pending_user() {
        let pending: BTreeSet<UserId> =
            ["U1", "U2"].iter().map(|u| UserId((*u).to_string())).collect();
        let message = expiry_summary_message(&pending);

        let body = if let Block::Section { text: TextObject::Mrkdwn { text }, .. } =
            &message.blocks[1]
        {
            Some(text)
        } else {
            None
        };
        assert!(body.is_some(), "expected pending section");
        let body = body.expect("pending section asserted above");
        assert!(body.contains("<@U1>"));
        assert!(body.contains("<@U2>"));
        assert!(message.fallback_text.contains("2 outstanding"));
    }

    #[test]
    fn error_template_contains_correlation_id() {
        let message = error_message("Cannot process request", "req-123");
        let elements = if let Block::Context { elements, .. } = &message.blocks[1] {
            Some(elements)
        } else {
            None
        };
        assert!(elements.is_some(), "expected context block");
        let elements = elements.expect("context block asserted above");
        assert!(matches!(
            elements.first(),
            Some(TextObject::Plain { text }) if text.contains("req-123")
        ));
    }
}
