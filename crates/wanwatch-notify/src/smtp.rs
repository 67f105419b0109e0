//! SMTP email backend
//!
//! Sends a plain-text email through an authenticated SMTP relay. Port 465
//! uses implicit TLS; any other port upgrades with STARTTLS.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials as SmtpAuth;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use wanwatch_core::config::NotifyConfig;
use wanwatch_core::traits::{ChangeNotice, Channel, Notifier, NotifierFactory};
use wanwatch_core::{Error, Result};

/// Implicit-TLS submission port
pub const SMTPS_PORT: u16 = 465;

const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// SMTP relay and login
#[derive(Clone)]
pub struct SmtpCredentials {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: Option<String>,
}

impl SmtpCredentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            from: None,
        }
    }

    /// Sender address; defaults to the login name
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Delivery seam between message rendering and the SMTP connection
#[async_trait]
trait Mailer: Send + Sync {
    async fn deliver(&self, message: Message) -> std::result::Result<(), String>;
}

#[async_trait]
impl Mailer for AsyncSmtpTransport<Tokio1Executor> {
    async fn deliver(&self, message: Message) -> std::result::Result<(), String> {
        self.send(message).await.map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Email over SMTP
pub struct SmtpNotifier {
    mailer: Box<dyn Mailer>,
    from: Mailbox,
    to: Mailbox,
    name: String,
    host_label: String,
}

impl SmtpNotifier {
    fn subject(&self, notice: &ChangeNotice) -> String {
        format!(
            "{} IP just got updated from {}",
            self.host_label,
            notice.location.country_or_code()
        )
    }

    fn body(&self, notice: &ChangeNotice) -> String {
        let location = &notice.location;
        format!(
            "Hello {name},\n\
             \n\
             This is an automated message from {host}, do not reply.\n\
             A new WAN IP was set up by your ISP in {city} - {country}.\n\
             \n\
             Last update check: {checked}\n\
             Current location: {city}, {region} - {country}\n\
             Information checked from: {platform}\n\
             Previous IP: {previous} (elapsed {elapsed})\n\
             \n\
             New IP\n\
             ---------------------------\n\
             {ip}\n\
             ---------------------------\n",
            name = self.name,
            host = self.host_label,
            city = location.city(),
            region = location.region(),
            country = location.country(),
            checked = notice.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            platform = notice.platform,
            previous = notice.previous_ip_label(),
            elapsed = notice.elapsed_label(),
            ip = notice.ip,
        )
    }

    fn message(&self, notice: &ChangeNotice) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject(notice))
            .header(ContentType::TEXT_PLAIN)
            .body(self.body(notice))
            .map_err(|e| Error::notification("email", format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn backend_name(&self) -> &'static str {
        "smtp"
    }

    async fn notify(&self, notice: &ChangeNotice) -> Result<()> {
        let message = self.message(notice)?;
        tracing::debug!("Sending email for {} to {}", notice.ip, self.to);
        self.mailer
            .deliver(message)
            .await
            .map_err(|e| Error::notification("email", format!("SMTP delivery failed: {}", e)))
    }
}

/// Factory for the `smtp` backend
pub struct SmtpFactory {
    credentials: Option<SmtpCredentials>,
}

impl SmtpFactory {
    pub fn new(credentials: Option<SmtpCredentials>) -> Self {
        Self { credentials }
    }

    fn notifier(
        credentials: &SmtpCredentials,
        config: &NotifyConfig,
        mailer: Box<dyn Mailer>,
    ) -> Result<SmtpNotifier> {
        let from: Mailbox = credentials.sender().parse().map_err(|e| {
            Error::config(format!("Invalid SMTP sender '{}': {}", credentials.sender(), e))
        })?;

        let recipient = config
            .email_recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::config("notify.email_recipient is required for the smtp backend"))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| Error::config(format!("Invalid email recipient '{}': {}", recipient, e)))?;

        Ok(SmtpNotifier {
            mailer,
            from,
            to,
            name: config
                .email_name
                .clone()
                .unwrap_or_else(|| "there".to_string()),
            host_label: config.host_label().to_string(),
        })
    }
}

fn transport(credentials: &SmtpCredentials) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let builder = if credentials.port == SMTPS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&credentials.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&credentials.host)
    }
    .map_err(|e| Error::config(format!("Invalid SMTP host '{}': {}", credentials.host, e)))?;

    Ok(builder
        .port(credentials.port)
        .credentials(SmtpAuth::new(
            credentials.username.clone(),
            credentials.password.clone(),
        ))
        .timeout(Some(SMTP_TIMEOUT))
        .build())
}

impl NotifierFactory for SmtpFactory {
    fn create(&self, config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            Error::config(
                "notify.backend = \"smtp\" requires WANWATCH_SMTP_HOST, WANWATCH_SMTP_USER and WANWATCH_SMTP_PASSWORD",
            )
        })?;

        let mailer = Box::new(transport(credentials)?);
        Ok(vec![Box::new(Self::notifier(credentials, config, mailer)?)])
    }
}
