//! Notification gateway backend
//!
//! Both channels POST JSON to the same endpoint, authenticated with the
//! `X-User-Key` and `X-API-Token` headers:
//!
//! ```json
//! {"channel": "email", "emailType": "html", "to": "ops@example.com",
//!  "subject": "New IP for homelab", "template": "welcome",
//!  "context": {"name": "Operator", "ip_address": "203.0.113.5", "location": "Portugal",
//!              "checked_at": "2026-03-14 09:30:00 UTC", "platform": "Linux"}}
//!
//! {"channel": "push", "app": "wanwatch", "to": "device-1",
//!  "subject": "homelab IP change alert",
//!  "body": "New IP: 203.0.113.5 - Lisbon, Portugal (checked 2026-03-14 09:30:00 UTC from Linux)"}
//! ```

use async_trait::async_trait;
use serde::Serialize;
use wanwatch_core::config::NotifyConfig;
use wanwatch_core::traits::{ChangeNotice, Channel, Notifier, NotifierFactory};
use wanwatch_core::{Error, Result};

use crate::error_body;

const BACKEND: &str = "gateway";

const CHECKED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Gateway API credentials
#[derive(Clone)]
pub struct GatewayCredentials {
    user_key: String,
    api_token: String,
}

impl GatewayCredentials {
    pub fn new(user_key: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            api_token: api_token.into(),
        }
    }
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("user_key", &"<REDACTED>")
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailMessage<'a> {
    channel: &'static str,
    email_type: &'a str,
    to: &'a str,
    subject: String,
    template: &'a str,
    context: EmailContext<'a>,
}

#[derive(Debug, Serialize)]
struct EmailContext<'a> {
    name: &'a str,
    ip_address: String,
    location: String,
    checked_at: String,
    platform: &'a str,
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    channel: &'static str,
    app: &'a str,
    to: &'a str,
    subject: String,
    body: String,
}

/// Connection shared by the two gateway notifiers
#[derive(Debug, Clone)]
struct GatewayClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: GatewayCredentials,
}

impl GatewayClient {
    async fn post<T: Serialize + ?Sized>(&self, channel: Channel, message: &T) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-User-Key", &self.credentials.user_key)
            .header("X-API-Token", &self.credentials.api_token)
            .json(message)
            .send()
            .await
            .map_err(|e| Error::notification(channel.to_string(), format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(Error::notification(
            channel.to_string(),
            format!("gateway returned {}: {}", status, error_body(response).await),
        ))
    }
}

/// Email over the gateway
#[derive(Debug)]
pub struct GatewayEmailNotifier {
    gateway: GatewayClient,
    email_type: String,
    template: String,
    recipient: String,
    name: String,
    location_label: Option<String>,
    host_label: String,
}

impl GatewayEmailNotifier {
    fn message<'a>(&'a self, notice: &'a ChangeNotice) -> EmailMessage<'a> {
        let location = self
            .location_label
            .clone()
            .unwrap_or_else(|| notice.location.country_or_code().to_string());

        EmailMessage {
            channel: "email",
            email_type: &self.email_type,
            to: &self.recipient,
            subject: format!("New IP for {}", self.host_label),
            template: &self.template,
            context: EmailContext {
                name: &self.name,
                ip_address: notice.ip.to_string(),
                location,
                checked_at: notice.observed_at.format(CHECKED_AT_FORMAT).to_string(),
                platform: &notice.platform,
            },
        }
    }
}

#[async_trait]
impl Notifier for GatewayEmailNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn notify(&self, notice: &ChangeNotice) -> Result<()> {
        tracing::debug!("Sending email for {} to {}", notice.ip, self.recipient);
        self.gateway.post(Channel::Email, &self.message(notice)).await
    }
}

/// Push over the gateway
#[derive(Debug)]
pub struct GatewayPushNotifier {
    gateway: GatewayClient,
    app: String,
    to: String,
    host_label: String,
}

impl GatewayPushNotifier {
    fn message<'a>(&'a self, notice: &ChangeNotice) -> PushMessage<'a> {
        PushMessage {
            channel: "push",
            app: &self.app,
            to: &self.to,
            subject: format!("{} IP change alert", self.host_label),
            body: format!(
                "New IP: {} - {}, {} (checked {} from {})",
                notice.ip,
                notice.location.city(),
                notice.location.country_or_code(),
                notice.observed_at.format(CHECKED_AT_FORMAT),
                notice.platform
            ),
        }
    }
}

#[async_trait]
impl Notifier for GatewayPushNotifier {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn notify(&self, notice: &ChangeNotice) -> Result<()> {
        tracing::debug!("Sending push for {} to {}", notice.ip, self.to);
        self.gateway.post(Channel::Push, &self.message(notice)).await
    }
}

/// Factory for the `gateway` backend
pub struct GatewayFactory {
    credentials: Option<GatewayCredentials>,
    client: reqwest::Client,
}

impl GatewayFactory {
    pub fn new(credentials: Option<GatewayCredentials>, client: reqwest::Client) -> Self {
        Self {
            credentials,
            client,
        }
    }
}

impl NotifierFactory for GatewayFactory {
    fn create(&self, config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            Error::config(
                "notify.backend = \"gateway\" requires WANWATCH_GATEWAY_USER_KEY and WANWATCH_GATEWAY_API_TOKEN",
            )
        })?;

        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::config("notify.endpoint is required for the gateway backend"))?;

        let recipient = config
            .email_recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                Error::config("notify.email_recipient is required for the gateway backend")
            })?;

        let gateway = GatewayClient {
            client: self.client.clone(),
            endpoint: endpoint.to_string(),
            credentials,
        };
        let host_label = config.host_label().to_string();

        let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(GatewayEmailNotifier {
            gateway: gateway.clone(),
            email_type: config.email_type.clone(),
            template: config.email_template.clone(),
            recipient: recipient.to_string(),
            name: config
                .email_name
                .clone()
                .unwrap_or_else(|| "Operator".to_string()),
            location_label: config.location_label.clone(),
            host_label: host_label.clone(),
        })];

        match config.push_recipient() {
            Some(to) => notifiers.push(Box::new(GatewayPushNotifier {
                gateway,
                app: config.push_app.clone(),
                to: to.to_string(),
                host_label,
            })),
            None => tracing::debug!("notify.push_to not set, push channel disabled"),
        }

        Ok(notifiers)
    }
}
