//! Outbound notifications to the chat platform.
//!
//! Every sender implements [`Notifier`]. A failed send is logged and reported
//! as `false`; it never propagates into the decision that triggered it.
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::{StatusCode, blocking::Client};
use serde_json::json;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, info, warn};

use crate::{
    config::{ChannelIds, DiscordSettings, NotifySettings},
    constants::{DISCORD_API_BASE, WEBHOOK_USERNAME},
    error::WatchdogError,
};

/// Discord rejects message bodies longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Logical destination of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    /// General bot updates.
    Main,
    /// Watchdog, restart and cleanup reports.
    Logs,
    /// Host-level notices (startup, shutdown, token checks).
    Ops,
}

impl Channel {
    fn marker(&self) -> &'static str {
        match self {
            Channel::Main => "🚀",
            Channel::Logs => "🪵",
            Channel::Ops => "🖥️",
        }
    }
}

/// Sends a text message to a logical channel.
pub trait Notifier: Send + Sync {
    /// Returns whether the message was accepted by the sink.
    fn notify(&self, channel: Channel, message: &str) -> bool;
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn notify(&self, channel: Channel, message: &str) -> bool {
        (**self).notify(channel, message)
    }
}

/// Prefixes `message` with the channel marker and a local timestamp.
pub fn format_message(channel: Channel, message: &str, now: DateTime<Utc>, tz: Tz) -> String {
    let stamp = now.with_timezone(&tz).format("[%Y-%m-%d %I:%M %p %Z]");
    truncate(&format!("{} {stamp} {message}", channel.marker()))
}

fn truncate(content: &str) -> String {
    if content.chars().count() <= MAX_MESSAGE_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

/// Posts to channels through the Discord bot REST API.
pub struct DiscordNotifier {
    client: Client,
    api_base: String,
    token: String,
    channels: ChannelIds,
    timezone: Tz,
}

impl DiscordNotifier {
    pub fn new(
        settings: &DiscordSettings,
        timeout: std::time::Duration,
        timezone: Tz,
    ) -> Result<Self, WatchdogError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_base: DISCORD_API_BASE.to_string(),
            token: settings.token.clone(),
            channels: settings.channels.clone(),
            timezone,
        })
    }

    /// Points the notifier at a different API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn channel_id(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Main => self.channels.main.as_deref(),
            Channel::Logs => self.channels.logs.as_deref(),
            Channel::Ops => self.channels.ops.as_deref(),
        }
        .filter(|id| !id.trim().is_empty())
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, channel: Channel, message: &str) -> bool {
        info!("[{channel}] {message}");
        let Some(channel_id) = self.channel_id(channel) else {
            warn!("No Discord channel id configured for '{channel}'; message dropped");
            return false;
        };

        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        let content = format_message(channel, message, Utc::now(), self.timezone);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": content }))
            .send();

        match response {
            Ok(response) if response.status().is_success() => {
                debug!("Sent message to channel {channel_id}");
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                warn!("Discord API returned {status} for channel {channel_id}: {body}");
                false
            }
            Err(err) => {
                warn!("Failed to post to Discord channel {channel_id}: {err}");
                false
            }
        }
    }
}

/// Posts every channel to a single Discord webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    timezone: Tz,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        timeout: std::time::Duration,
        timezone: Tz,
    ) -> Result<Self, WatchdogError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
            timezone,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, channel: Channel, message: &str) -> bool {
        info!("[{channel}] {message}");
        let content = format_message(channel, message, Utc::now(), self.timezone);
        let payload = json!({ "username": WEBHOOK_USERNAME, "content": content });

        match self.client.post(&self.url).json(&payload).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Webhook returned {}", response.status());
                false
            }
            Err(err) => {
                warn!("Failed to send webhook alert: {err}");
                false
            }
        }
    }
}

/// Records messages in the local log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, channel: Channel, message: &str) -> bool {
        info!("[{channel}] {message}");
        true
    }
}

/// Outcome of verifying the bot token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// The API accepted the token; `account` is the bot's display name.
    Valid { account: String },
    /// The token was rejected or could not be checked.
    Invalid { reason: String },
}

/// Confirms that the monitored bot's credentials still work.
pub trait TokenValidator: Send + Sync {
    fn validate(&self) -> TokenStatus;
}

/// Checks the bot token against `GET /users/@me`.
pub struct DiscordTokenValidator {
    client: Client,
    api_base: String,
    token: String,
}

impl DiscordTokenValidator {
    pub fn new(
        settings: &DiscordSettings,
        timeout: std::time::Duration,
    ) -> Result<Self, WatchdogError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_base: DISCORD_API_BASE.to_string(),
            token: settings.token.clone(),
        })
    }

    /// Points the validator at a different API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

impl TokenValidator for DiscordTokenValidator {
    fn validate(&self) -> TokenStatus {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .send();

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                let account = response
                    .json::<serde_json::Value>()
                    .ok()
                    .and_then(|user| {
                        let name = user.get("username")?.as_str()?.to_string();
                        Some(match user.get("discriminator").and_then(|d| d.as_str()) {
                            Some(tag) if tag != "0" => format!("{name}#{tag}"),
                            _ => name,
                        })
                    })
                    .unwrap_or_else(|| "unknown account".to_string());
                debug!("Bot token valid for {account}");
                TokenStatus::Valid { account }
            }
            Ok(response) => TokenStatus::Invalid {
                reason: format!("Invalid token ({})", response.status().as_u16()),
            },
            Err(err) => TokenStatus::Invalid {
                reason: format!("Token check error: {err}"),
            },
        }
    }
}

/// Builds the notifier described by the configuration.
///
/// The bot API is preferred when configured, then the webhook; without either
/// messages only reach the log.
pub fn build_notifier(
    settings: &NotifySettings,
    timezone: Tz,
) -> Result<Box<dyn Notifier>, WatchdogError> {
    if let Some(discord) = &settings.discord {
        return Ok(Box::new(DiscordNotifier::new(
            discord,
            settings.timeout,
            timezone,
        )?));
    }

    if let Some(url) = &settings.webhook_url {
        return Ok(Box::new(WebhookNotifier::new(
            url.clone(),
            settings.timeout,
            timezone,
        )?));
    }

    warn!("No notification backend configured; messages will only be logged");
    Ok(Box::new(LogNotifier))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures every message for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub messages: Mutex<Vec<(Channel, String)>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn messages(&self) -> Vec<(Channel, String)> {
            self.messages.lock().unwrap().clone()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.messages()
                .iter()
                .any(|(_, message)| message.contains(needle))
        }

        pub fn count_containing(&self, needle: &str) -> usize {
            self.messages()
                .iter()
                .filter(|(_, message)| message.contains(needle))
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, channel: Channel, message: &str) -> bool {
            self.messages
                .lock()
                .unwrap()
                .push((channel, message.to_string()));
            !self.fail
        }
    }
}
