//! Pushover backend (push channel only)

use async_trait::async_trait;
use wanwatch_core::config::NotifyConfig;
use wanwatch_core::traits::{ChangeNotice, Channel, Notifier, NotifierFactory};
use wanwatch_core::{Error, Result};

use crate::error_body;

/// Pushover messages API
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover user key and application token
#[derive(Clone)]
pub struct PushoverCredentials {
    user: String,
    token: String,
}

impl PushoverCredentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for PushoverCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverCredentials")
            .field("user", &"<REDACTED>")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug)]
pub struct PushoverNotifier {
    client: reqwest::Client,
    api_url: String,
    credentials: PushoverCredentials,
    host_label: String,
}

impl PushoverNotifier {
    fn message(&self, notice: &ChangeNotice) -> String {
        format!(
            "New IP for {} in {} - {} updated {} (was {}, elapsed {})",
            self.host_label,
            notice.location.city(),
            notice.ip,
            notice.observed_at.format("%D"),
            notice.previous_ip_label(),
            notice.elapsed_label()
        )
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn backend_name(&self) -> &'static str {
        "pushover"
    }

    async fn notify(&self, notice: &ChangeNotice) -> Result<()> {
        let message = self.message(notice);
        let form = [
            ("user", self.credentials.user.as_str()),
            ("token", self.credentials.token.as_str()),
            ("message", message.as_str()),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::notification("push", format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(Error::notification(
            "push",
            format!("Pushover returned {}: {}", status, error_body(response).await),
        ))
    }
}

/// Factory for the `pushover` backend
pub struct PushoverFactory {
    credentials: Option<PushoverCredentials>,
    client: reqwest::Client,
    api_url: String,
}

impl PushoverFactory {
    pub fn new(credentials: Option<PushoverCredentials>, client: reqwest::Client) -> Self {
        Self {
            credentials,
            client,
            api_url: PUSHOVER_API_URL.to_string(),
        }
    }

    /// Send to a different messages URL (tests, proxies)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl NotifierFactory for PushoverFactory {
    fn create(&self, config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            Error::config(
                "notify.backend = \"pushover\" requires WANWATCH_PUSHOVER_USER and WANWATCH_PUSHOVER_TOKEN",
            )
        })?;

        Ok(vec![Box::new(PushoverNotifier {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            credentials,
            host_label: config.host_label().to_string(),
        })])
    }
}
