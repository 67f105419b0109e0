//! Cycle settings for wanwatch
//!
//! Settings are re-read at the top of every cycle so an operator can change
//! the interval, the enabled flag or the notification target without
//! restarting the process. Credentials are not part of this file; the
//! daemon reads them once from the environment at startup.
//!
//! ```toml
//! [wanwatch]
//! enabled = true
//! interval_seconds = 120
//!
//! [notify]
//! backend = "gateway"
//! endpoint = "https://gateway.example/v1/messages"
//! email_recipient = "ops@example.com"
//! push_to = "device-id"
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Interval used when no settings could be loaded yet
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Upper bound for `interval_seconds` (one day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Backend name that disables notifications
pub const NOTIFY_BACKEND_NONE: &str = "none";

/// Backend name of the notification gateway
pub const NOTIFY_BACKEND_GATEWAY: &str = "gateway";

/// Backend name of Pushover
pub const NOTIFY_BACKEND_PUSHOVER: &str = "pushover";

/// Backend name of direct SMTP delivery
pub const NOTIFY_BACKEND_SMTP: &str = "smtp";

/// Settings for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Loop settings (`[wanwatch]` table)
    #[serde(default, rename = "wanwatch")]
    pub general: GeneralSettings,

    /// Notification settings (`[notify]` table)
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Settings {
    /// Parse and validate settings from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings = Self::parse_toml(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text without validating them
    ///
    /// `enabled = false` must be honored even when the rest of the file is
    /// incomplete, so sources return parsed settings and the loop validates
    /// after checking the flag.
    pub fn parse_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.general.validate()?;
        self.notify.validate()
    }

    /// Sleep between cycles
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.general.interval_seconds)
    }

    /// Whether the change loop should keep running
    pub fn enabled(&self) -> bool {
        self.general.enabled
    }
}

/// Loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// When false the loop terminates cleanly
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds to sleep between cycles
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl GeneralSettings {
    /// Validate the loop settings
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_INTERVAL_SECS).contains(&self.interval_seconds) {
            return Err(Error::config(format!(
                "interval_seconds must be between 1 and {}. Got: {}",
                MAX_INTERVAL_SECS, self.interval_seconds
            )));
        }
        Ok(())
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval_seconds(),
        }
    }
}

/// Notification settings
///
/// `backend` selects a factory registered in the
/// [`NotifierRegistry`](crate::registry::NotifierRegistry); the remaining
/// fields are read by that backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Backend name: `gateway`, `pushover`, `smtp` or `none`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Gateway message endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Email body type (`html` or `txt`)
    #[serde(default = "default_email_type")]
    pub email_type: String,

    /// Gateway email template name
    #[serde(default = "default_email_template")]
    pub email_template: String,

    /// Email recipient
    #[serde(default)]
    pub email_recipient: Option<String>,

    /// Name used in the email greeting
    #[serde(default)]
    pub email_name: Option<String>,

    /// Location text for the email; defaults to the geolocated country
    #[serde(default)]
    pub location_label: Option<String>,

    /// Push recipient; push is skipped when absent
    #[serde(default)]
    pub push_to: Option<String>,

    /// Push application name
    #[serde(default = "default_push_app")]
    pub push_app: String,

    /// Host name used in subjects
    #[serde(default)]
    pub host_label: Option<String>,
}

impl NotifyConfig {
    /// Validate the notification settings
    pub fn validate(&self) -> Result<()> {
        let backend = self.backend.trim();
        if backend.is_empty() {
            return Err(Error::config("notify.backend cannot be empty"));
        }

        if backend == NOTIFY_BACKEND_GATEWAY {
            match self.endpoint.as_deref().map(str::trim) {
                None | Some("") => {
                    return Err(Error::config(
                        "notify.endpoint is required when notify.backend = \"gateway\"",
                    ));
                }
                Some(url) if !url.starts_with("https://") && !url.starts_with("http://") => {
                    return Err(Error::config(format!(
                        "notify.endpoint must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Some(_) => {}
            }

            match self.email_type.as_str() {
                "html" | "txt" => {}
                other => {
                    return Err(Error::config(format!(
                        "notify.email_type '{}' is not valid. Valid types: html, txt",
                        other
                    )));
                }
            }
        }

        if (backend == NOTIFY_BACKEND_GATEWAY || backend == NOTIFY_BACKEND_SMTP)
            && self.email_recipient.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(Error::config(format!(
                "notify.email_recipient is required when notify.backend = \"{}\"",
                backend
            )));
        }

        Ok(())
    }

    /// True when notifications are switched off
    pub fn is_disabled(&self) -> bool {
        self.backend.trim() == NOTIFY_BACKEND_NONE
    }

    /// Host name used in subjects
    pub fn host_label(&self) -> &str {
        self.host_label.as_deref().unwrap_or("wanwatch")
    }

    /// Push recipient, if one is configured
    pub fn push_recipient(&self) -> Option<&str> {
        self.push_to.as_deref().map(str::trim).filter(|to| !to.is_empty())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: None,
            email_type: default_email_type(),
            email_template: default_email_template(),
            email_recipient: None,
            email_name: None,
            location_label: None,
            push_to: None,
            push_app: default_push_app(),
            host_label: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_backend() -> String {
    NOTIFY_BACKEND_NONE.to_string()
}

fn default_email_type() -> String {
    "html".to_string()
}

fn default_email_template() -> String {
    "welcome".to_string()
}

fn default_push_app() -> String {
    "wanwatch".to_string()
}

/// Source of per-cycle settings
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Load the current settings
    ///
    /// Settings are parsed but not validated; callers check
    /// [`Settings::enabled`] first and then [`Settings::validate`].
    ///
    /// # Returns
    ///
    /// - `Ok(Settings)`: Parsed settings for this cycle
    /// - `Err(Error::Config | Error::Toml)`: Unreadable or unparsable; the cycle must be skipped
    async fn load(&self) -> Result<Settings>;

    /// Where the settings come from (for logging)
    fn describe(&self) -> String;
}

/// Settings read from a TOML file on every cycle
#[derive(Debug, Clone)]
pub struct TomlSettingsFile {
    path: PathBuf,
}

impl TomlSettingsFile {
    /// Create a settings source for `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsSource for TomlSettingsFile {
    async fn load(&self) -> Result<Settings> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tracing::warn!(
                "Settings file {} not found. Using defaults.",
                self.path.display()
            );
            return Ok(Settings::default());
        }

        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read settings file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Settings::parse_toml(&text)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Settings held in memory
///
/// Clones share the same settings, so a caller can change them while a
/// loop is running.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    inner: Arc<RwLock<Settings>>,
}

impl StaticSettings {
    /// Create a source that always returns `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replace the settings returned from now on
    pub async fn set(&self, settings: Settings) {
        *self.inner.write().await = settings;
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn load(&self) -> Result<Settings> {
        Ok(self.inner.read().await.clone())
    }

    fn describe(&self) -> String {
        "in-memory settings".to_string()
    }
}
