use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use rollcall_core::config::SlackConfig;
use rollcall_core::notify::{DeliveryError, MessageRef, Notifier};
use rollcall_core::roster::{RosterSource, RosterUnavailable};
use rollcall_core::session::{SessionId, Topic, UserId};

use crate::blocks::{self, MessageTemplate};

const MEMBERS_PAGE_LIMIT: &str = "200";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("slack api transport failure calling {method}: {reason}")]
    Transport { method: String, reason: String },
    #[error("slack api call {method} failed: {error}")]
    Api { method: String, error: String },
}

/// Web API client backing both outbound delivery and roster resolution.
///
/// The bot's own user id is fetched once via `auth.test` and cached so it can
/// be stripped from every resolved roster.
pub struct SlackApiClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    bot_user_id: OnceCell<String>,
}

impl SlackApiClient {
    pub fn new(config: &SlackConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| ApiError::Transport {
                method: "client.build".to_owned(),
                reason: error.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            bot_user_id: OnceCell::new(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|error| ApiError::Transport {
                method: method.to_owned(),
                reason: error.to_string(),
            })?;

        response.json::<T>().await.map_err(|error| ApiError::Transport {
            method: method.to_owned(),
            reason: error.to_string(),
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| ApiError::Transport {
                method: method.to_owned(),
                reason: error.to_string(),
            })?;

        response.json::<T>().await.map_err(|error| ApiError::Transport {
            method: method.to_owned(),
            reason: error.to_string(),
        })
    }

    async fn bot_user_id(&self) -> Result<&str, ApiError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let response: AuthTestResponse = self.get("auth.test", &[]).await?;
                ensure_ok("auth.test", response.ok, response.error)?;
                response.user_id.ok_or_else(|| ApiError::Api {
                    method: "auth.test".to_owned(),
                    error: "response did not include user_id".to_owned(),
                })
            })
            .await
            .map(String::as_str)
    }

    /// Lists channel members, following cursor pagination to the end.
    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, ApiError> {
        let mut members = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![("channel", channel), ("limit", MEMBERS_PAGE_LIMIT)];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }

            let response: MembersResponse = self.get("conversations.members", &query).await?;
            ensure_ok("conversations.members", response.ok, response.error)?;
            members.extend(response.members);

            cursor = response
                .response_metadata
                .map(|metadata| metadata.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        Ok(members)
    }

    /// Posts a Block Kit message to a channel id or user id (Slack opens the
    /// direct-message channel for a bare user id) and returns the message ts.
    async fn post_message(
        &self,
        target: &str,
        template: &MessageTemplate,
    ) -> Result<String, ApiError> {
        let body = json!({
            "channel": target,
            "text": template.fallback_text,
            "blocks": template.blocks,
        });

        let response: PostMessageResponse = self.post_json("chat.postMessage", body).await?;
        ensure_ok("chat.postMessage", response.ok, response.error)?;
        debug!(
            event_name = "egress.message_posted",
            channel_id = target,
            message_ts = response.ts.as_deref().unwrap_or("unknown"),
            "posted slack message"
        );
        response.ts.ok_or_else(|| ApiError::Api {
            method: "chat.postMessage".to_owned(),
            error: "response did not include ts".to_owned(),
        })
    }
}

#[async_trait]
impl RosterSource for SlackApiClient {
    async fn list(&self, topic: &Topic) -> Result<Vec<UserId>, RosterUnavailable> {
        let bot_user_id = self
            .bot_user_id()
            .await
            .map_err(|error| RosterUnavailable::new(topic.0.clone(), error.to_string()))?
            .to_owned();
        let members = self
            .channel_members(&topic.0)
            .await
            .map_err(|error| RosterUnavailable::new(topic.0.clone(), error.to_string()))?;

        Ok(filter_roster(members, &bot_user_id))
    }
}

#[async_trait]
impl Notifier for SlackApiClient {
    async fn post_prompt(
        &self,
        topic: &Topic,
        session_id: &SessionId,
    ) -> Result<MessageRef, DeliveryError> {
        let ts = self
            .post_message(&topic.0, &blocks::prompt_message(&session_id.0))
            .await
            .map_err(|error| DeliveryError::new(topic.0.clone(), error.to_string()))?;
        Ok(MessageRef::new(topic.0.clone(), ts))
    }

    async fn send_escalation(&self, user: &UserId, topic: &Topic) -> Result<(), DeliveryError> {
        self.post_message(&user.0, &blocks::escalation_message(&topic.0))
            .await
            .map_err(|error| DeliveryError::new(user.0.clone(), error.to_string()))?;
        Ok(())
    }

    async fn send_completion(
        &self,
        topic: &Topic,
        roster_size: usize,
    ) -> Result<(), DeliveryError> {
        self.post_message(&topic.0, &blocks::completion_message(roster_size))
            .await
            .map_err(|error| DeliveryError::new(topic.0.clone(), error.to_string()))?;
        Ok(())
    }

    async fn send_expiry_summary(
        &self,
        topic: &Topic,
        pending: &BTreeSet<UserId>,
    ) -> Result<(), DeliveryError> {
        self.post_message(&topic.0, &blocks::expiry_summary_message(pending))
            .await
            .map_err(|error| DeliveryError::new(topic.0.clone(), error.to_string()))?;
        Ok(())
    }
}

/// Drops the bot's own identity from a member listing; nobody expects the
/// prompt author to acknowledge itself.
fn filter_roster(members: Vec<String>, bot_user_id: &str) -> Vec<UserId> {
    members.into_iter().filter(|member| member != bot_user_id).map(UserId).collect()
}

fn ensure_ok(method: &str, ok: bool, error: Option<String>) -> Result<(), ApiError> {
    if ok {
        return Ok(());
    }
    Err(ApiError::Api {
        method: method.to_owned(),
        error: error.unwrap_or_else(|| "unknown_error".to_owned()),
    })
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[cfg(test)]
mod tests {
    use rollcall_core::session::UserId;

    use super::{
        ensure_ok, filter_roster, ApiError, AuthTestResponse, MembersResponse, PostMessageResponse,
    };

    #[test]
    fn filter_roster_removes_only_the_bot_identity() {
        let roster = filter_roster(
            vec!["U1".to_owned(), "UBOT".to_owned(), "U2".to_owned()],
            "UBOT",
        );
        assert_eq!(roster, vec![UserId("U1".to_owned()), UserId("U2".to_owned())]);
    }

    #[test]
    fn ensure_ok_maps_api_level_errors() {
        assert!(ensure_ok("auth.test", true, None).is_ok());

        let error = ensure_ok("conversations.members", false, Some("channel_not_found".to_owned()))
            .expect_err("must fail");
        assert_eq!(
            error,
            ApiError::Api {
                method: "conversations.members".to_owned(),
                error: "channel_not_found".to_owned(),
            }
        );

        let unnamed = ensure_ok("chat.postMessage", false, None).expect_err("must fail");
        assert!(unnamed.to_string().contains("unknown_error"));
    }

    #[test]
    fn members_response_parses_cursor_pagination_metadata() {
        let page: MembersResponse = serde_json::from_str(
            r#"{
                "ok": true,
                "members": ["U1", "U2"],
                "response_metadata": {"next_cursor": "dXNlcjpVMg=="}
            }"#,
        )
        .expect("parse");

        assert!(page.ok);
        assert_eq!(page.members, vec!["U1".to_owned(), "U2".to_owned()]);
        assert_eq!(
            page.response_metadata.map(|metadata| metadata.next_cursor),
            Some("dXNlcjpVMg==".to_owned())
        );
    }

    #[test]
    fn auth_test_and_post_message_responses_parse_error_envelopes() {
        let auth: AuthTestResponse =
            serde_json::from_str(r#"{"ok": true, "user_id": "UBOT"}"#).expect("parse");
        assert_eq!(auth.user_id.as_deref(), Some("UBOT"));

        let failed: PostMessageResponse =
            serde_json::from_str(r#"{"ok": false, "error": "rate_limited"}"#).expect("parse");
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("rate_limited"));
        assert_eq!(failed.ts, None);
    }
}
