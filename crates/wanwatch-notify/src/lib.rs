// # Notification Backends
//
// Notifiers for the change loop, registered by name with the
// [`NotifierRegistry`]:
//
// - `gateway`: a notification gateway with one POST endpoint for both
//   channels; builds an email notifier and, when `push_to` is set, a push
//   notifier
// - `pushover`: the Pushover messages API; push only
// - `smtp`: plain-text email through an authenticated SMTP relay; email only
//
// Credentials come from the process environment and are handed over once
// at registration; everything else (endpoint, recipients, template) comes
// from the cycle settings, so a backend can be switched without a restart.
//
// ## Security
//
// Credentials never appear in logs or `Debug` output.

mod gateway;
mod pushover;
mod smtp;

pub use gateway::{GatewayCredentials, GatewayEmailNotifier, GatewayFactory, GatewayPushNotifier};
pub use pushover::{PUSHOVER_API_URL, PushoverCredentials, PushoverFactory, PushoverNotifier};
pub use smtp::{SMTPS_PORT, SmtpCredentials, SmtpFactory, SmtpNotifier};

use std::time::Duration;
use wanwatch_core::config::{NOTIFY_BACKEND_GATEWAY, NOTIFY_BACKEND_PUSHOVER, NOTIFY_BACKEND_SMTP};
use wanwatch_core::{Error, NotifierRegistry, Result};

/// Timeout for each notification request
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials for every backend; absent ones make that backend unusable
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gateway: Option<GatewayCredentials>,
    pub pushover: Option<PushoverCredentials>,
    pub smtp: Option<SmtpCredentials>,
}

pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Register the `gateway`, `pushover` and `smtp` backends with a registry
///
/// Backends are registered even without credentials so that selecting one
/// reports a configuration error instead of an unknown backend.
///
/// # Example
///
/// ```rust
/// use wanwatch_core::NotifierRegistry;
///
/// let registry = NotifierRegistry::new();
/// wanwatch_notify::register(&registry, wanwatch_notify::Credentials::default()).unwrap();
/// assert!(registry.has_backend("gateway"));
/// assert!(registry.has_backend("smtp"));
/// ```
pub fn register(registry: &NotifierRegistry, credentials: Credentials) -> Result<()> {
    let client = build_client()?;

    registry.register_backend(
        NOTIFY_BACKEND_GATEWAY,
        Box::new(GatewayFactory::new(credentials.gateway, client.clone())),
    );
    registry.register_backend(
        NOTIFY_BACKEND_PUSHOVER,
        Box::new(PushoverFactory::new(credentials.pushover, client)),
    );
    registry.register_backend(
        NOTIFY_BACKEND_SMTP,
        Box::new(SmtpFactory::new(credentials.smtp)),
    );

    Ok(())
}

/// Read a response body for an error message, capped to keep logs readable
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    const MAX_LEN: usize = 512;

    let mut text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    if text.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
