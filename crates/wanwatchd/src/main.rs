// # wanwatchd - public IP watcher daemon
//
// Thin integration layer: reads credentials from the environment, wires the
// resolvers, the Cloudflare updater, the notification backends and the
// history store into a `ChangeLoop`, and runs it until a signal arrives or
// the settings file disables it. All change-loop behavior lives in
// wanwatch-core.
//
// ## Configuration
//
// Startup environment (read once):
//
// ### Cloudflare
// - `WANWATCH_CF_TOKEN`: API token with Zone:DNS:Edit permission (required)
// - `WANWATCH_CF_ZONE`: Zone name, e.g. `example.com` (required)
// - `WANWATCH_CF_SUBDOMAIN`: Record label inside the zone (default `@`)
// - `WANWATCH_CF_ZONE_ID`: Zone ID, skips the lookup by name
//
// ### Files
// - `WANWATCH_CONFIG`: Cycle settings file (default `config.toml`)
// - `WANWATCH_HISTORY_PATH`: History file (default `ip_history.json`)
//
// ### Lookups
// - `WANWATCH_IP_URL`: Public IP endpoint (default `https://api.ipify.org`)
// - `WANWATCH_GEO_URL`: Geolocation endpoint (default `http://ip-api.com/json`)
//
// ### Notifications
// - `WANWATCH_GATEWAY_USER_KEY`, `WANWATCH_GATEWAY_API_TOKEN`
// - `WANWATCH_PUSHOVER_USER`, `WANWATCH_PUSHOVER_TOKEN`
// - `WANWATCH_SMTP_HOST`, `WANWATCH_SMTP_USER`, `WANWATCH_SMTP_PASSWORD`
// - `WANWATCH_SMTP_PORT`: 465 for implicit TLS, anything else uses STARTTLS (default 465)
// - `WANWATCH_SMTP_FROM`: Sender address (default `WANWATCH_SMTP_USER`)
//
// ### Logging
// - `WANWATCH_LOG_LEVEL`: trace, debug, info, warn or error (default `info`)
//
// The settings file (interval, enabled flag, notification backend and
// recipients) is re-read at the start of every cycle.
//
// ## Example
//
// ```bash
// export WANWATCH_CF_TOKEN=your_token
// export WANWATCH_CF_ZONE=example.com
// export WANWATCH_CF_SUBDOMAIN=home
// export WANWATCH_HISTORY_PATH=/var/lib/wanwatch/ip_history.json
//
// wanwatchd
// ```

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use wanwatch_cloudflare::CloudflareUpdater;
use wanwatch_core::traits::DnsUpdater;
use wanwatch_core::{
    ChangeLoop, Collaborators, Error, FileHistoryStore, LoopEvent, NotifierRegistry,
    SettingsSource, StopReason, TomlSettingsFile, current_platform,
};
use wanwatch_ip_http::{DEFAULT_GEO_URL, DEFAULT_IP_URL, HttpAddressResolver, IpApiGeoResolver};
use wanwatch_notify::{
    Credentials, GatewayCredentials, PushoverCredentials, SMTPS_PORT, SmtpCredentials,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown, or disabled by the settings file
/// - 1: Configuration or startup error (including another running instance)
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WanwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WanwatchExitCode> for ExitCode {
    fn from(code: WanwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Startup configuration
struct Config {
    cf_token: String,
    cf_zone: String,
    cf_subdomain: String,
    cf_zone_id: Option<String>,
    settings_path: PathBuf,
    history_path: PathBuf,
    ip_url: String,
    geo_url: String,
    gateway_user_key: Option<String>,
    gateway_api_token: Option<String>,
    pushover_user: Option<String>,
    pushover_token: Option<String>,
    smtp_host: Option<String>,
    smtp_port: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            cf_token: env::var("WANWATCH_CF_TOKEN").context("WANWATCH_CF_TOKEN is required")?,
            cf_zone: env::var("WANWATCH_CF_ZONE").context("WANWATCH_CF_ZONE is required")?,
            cf_subdomain: optional_var("WANWATCH_CF_SUBDOMAIN").unwrap_or_else(|| "@".to_string()),
            cf_zone_id: optional_var("WANWATCH_CF_ZONE_ID"),
            settings_path: optional_var("WANWATCH_CONFIG")
                .unwrap_or_else(|| "config.toml".to_string())
                .into(),
            history_path: optional_var("WANWATCH_HISTORY_PATH")
                .unwrap_or_else(|| "ip_history.json".to_string())
                .into(),
            ip_url: optional_var("WANWATCH_IP_URL").unwrap_or_else(|| DEFAULT_IP_URL.to_string()),
            geo_url: optional_var("WANWATCH_GEO_URL")
                .unwrap_or_else(|| DEFAULT_GEO_URL.to_string()),
            gateway_user_key: optional_var("WANWATCH_GATEWAY_USER_KEY"),
            gateway_api_token: optional_var("WANWATCH_GATEWAY_API_TOKEN"),
            pushover_user: optional_var("WANWATCH_PUSHOVER_USER"),
            pushover_token: optional_var("WANWATCH_PUSHOVER_TOKEN"),
            smtp_host: optional_var("WANWATCH_SMTP_HOST"),
            smtp_port: optional_var("WANWATCH_SMTP_PORT"),
            smtp_user: optional_var("WANWATCH_SMTP_USER"),
            smtp_password: optional_var("WANWATCH_SMTP_PASSWORD"),
            smtp_from: optional_var("WANWATCH_SMTP_FROM"),
            log_level: optional_var("WANWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Returns warnings to log once tracing is up.
    fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.cf_token.trim().is_empty() {
            anyhow::bail!(
                "WANWATCH_CF_TOKEN is required. \
                Set it via: export WANWATCH_CF_TOKEN=your_token"
            );
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.cf_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "WANWATCH_CF_TOKEN appears to be a placeholder. \
                Use an actual Cloudflare API token."
            );
        }

        validate_domain_name(self.cf_zone.trim_end_matches('.'))
            .context("WANWATCH_CF_ZONE is not a valid zone name")?;

        let subdomain = self.cf_subdomain.trim();
        if subdomain != "@" {
            validate_domain_name(subdomain)
                .context("WANWATCH_CF_SUBDOMAIN is not a valid record label")?;
        }

        if let Some(warning) = validate_url("WANWATCH_IP_URL", &self.ip_url)? {
            warnings.push(warning);
        }
        // ip-api only serves its free tier over plain HTTP
        if let Some(warning) = validate_url("WANWATCH_GEO_URL", &self.geo_url)?
            && self.geo_url != DEFAULT_GEO_URL
        {
            warnings.push(warning);
        }

        if self.settings_path.as_os_str().is_empty() {
            anyhow::bail!("WANWATCH_CONFIG cannot be empty");
        }
        if self.history_path.as_os_str().is_empty() {
            anyhow::bail!("WANWATCH_HISTORY_PATH cannot be empty");
        }

        pair(
            "WANWATCH_GATEWAY_USER_KEY",
            &self.gateway_user_key,
            "WANWATCH_GATEWAY_API_TOKEN",
            &self.gateway_api_token,
        )?;
        pair(
            "WANWATCH_PUSHOVER_USER",
            &self.pushover_user,
            "WANWATCH_PUSHOVER_TOKEN",
            &self.pushover_token,
        )?;
        pair(
            "WANWATCH_SMTP_USER",
            &self.smtp_user,
            "WANWATCH_SMTP_PASSWORD",
            &self.smtp_password,
        )?;
        pair(
            "WANWATCH_SMTP_HOST",
            &self.smtp_host,
            "WANWATCH_SMTP_USER",
            &self.smtp_user,
        )?;
        self.smtp_port()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "WANWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(warnings)
    }

    fn credentials(&self) -> Credentials {
        let gateway = match (&self.gateway_user_key, &self.gateway_api_token) {
            (Some(key), Some(token)) => Some(GatewayCredentials::new(key, token)),
            _ => None,
        };
        let pushover = match (&self.pushover_user, &self.pushover_token) {
            (Some(user), Some(token)) => Some(PushoverCredentials::new(user, token)),
            _ => None,
        };
        let smtp = match (&self.smtp_host, &self.smtp_user, &self.smtp_password) {
            (Some(host), Some(user), Some(password)) => {
                let port = self.smtp_port().unwrap_or(SMTPS_PORT);
                let credentials = SmtpCredentials::new(host, port, user, password);
                Some(match &self.smtp_from {
                    Some(from) => credentials.with_from(from),
                    None => credentials,
                })
            }
            _ => None,
        };
        Credentials {
            gateway,
            pushover,
            smtp,
        }
    }

    fn smtp_port(&self) -> Result<u16> {
        match &self.smtp_port {
            None => Ok(SMTPS_PORT),
            Some(port) => match port.parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => anyhow::bail!("WANWATCH_SMTP_PORT must be a port number. Got: {}", port),
            },
        }
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// An environment variable, treating blank values as unset
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Credentials come in pairs; half a pair is a mistake
fn pair(a_name: &str, a: &Option<String>, b_name: &str, b: &Option<String>) -> Result<()> {
    match (a, b) {
        (Some(_), None) => anyhow::bail!("{} is set but {} is missing", a_name, b_name),
        (None, Some(_)) => anyhow::bail!("{} is set but {} is missing", b_name, a_name),
        _ => Ok(()),
    }
}

/// Check the URL scheme; plain HTTP yields a warning
fn validate_url(name: &str, url: &str) -> Result<Option<String>> {
    if url.starts_with("https://") {
        Ok(None)
    } else if url.starts_with("http://") {
        Ok(Some(format!(
            "{} uses HTTP (not HTTPS). This is less secure. Consider using HTTPS.",
            name
        )))
    } else {
        anyhow::bail!("{} must use HTTP or HTTPS scheme. Got: {}", name, url)
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks: total length, label length, characters, and no
/// leading or trailing hyphen.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        // `_` shows up in service labels such as `_acme-challenge`
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return WanwatchExitCode::ConfigError.into();
        }
    };

    let warnings = match config.validate() {
        Ok(warnings) => warnings,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return WanwatchExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WanwatchExitCode::ConfigError.into();
    }

    for warning in &warnings {
        warn!("{}", warning);
    }

    info!("Starting wanwatchd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WanwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> WanwatchExitCode {
    let (change_loop, events) = match build_loop(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return WanwatchExitCode::ConfigError;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal handler failed: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    tokio::spawn(log_events(events));

    match change_loop.run(shutdown_rx).await {
        Ok(StopReason::Shutdown) => {
            info!("Shutting down");
            WanwatchExitCode::CleanShutdown
        }
        Ok(StopReason::Disabled) => {
            info!("Disabled by {}, exiting", config.settings_path.display());
            WanwatchExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Change loop error: {}", e);
            WanwatchExitCode::RuntimeError
        }
    }
}

/// Wire the collaborators and create the change loop
async fn build_loop(config: &Config) -> Result<(ChangeLoop, mpsc::Receiver<LoopEvent>)> {
    let history = match FileHistoryStore::open(&config.history_path).await {
        Ok(store) => store,
        Err(Error::AlreadyRunning(lock)) => {
            anyhow::bail!("Another instance holds {}", lock)
        }
        Err(e) => return Err(e).context("Failed to open the history store"),
    };
    info!("History: {}", history.path().display());

    let resolver = HttpAddressResolver::new(&config.ip_url)?;
    let geo = IpApiGeoResolver::with_base_url(&config.geo_url)?;
    let dns = CloudflareUpdater::new(
        &config.cf_token,
        &config.cf_zone,
        &config.cf_subdomain,
        config.cf_zone_id.clone(),
    )?;
    info!("Managing record: {}", dns.record_name());

    let registry = NotifierRegistry::new();
    wanwatch_notify::register(&registry, config.credentials())?;
    info!("Notification backends: {}", registry.list_backends().join(", "));

    let settings = TomlSettingsFile::new(&config.settings_path);
    check_initial_settings(&settings, &registry).await?;

    Ok(ChangeLoop::new(
        Collaborators {
            settings: Box::new(settings),
            resolver: Box::new(resolver),
            geo: Box::new(geo),
            dns: Box::new(dns),
            notifiers: Arc::new(registry),
            history: Box::new(history),
        },
        current_platform(),
    ))
}

/// Fail fast when the selected backend is missing its credentials
///
/// An unreadable or invalid settings file is not fatal here; the loop
/// reports it every cycle until it is fixed.
async fn check_initial_settings(
    settings: &TomlSettingsFile,
    registry: &NotifierRegistry,
) -> Result<()> {
    let current = match settings.load().await {
        Ok(current) => current,
        Err(e) => {
            warn!("{}: {}", settings.describe(), e);
            return Ok(());
        }
    };

    if !current.enabled() {
        info!("{} has enabled = false", settings.describe());
        return Ok(());
    }

    if let Err(e) = current.validate() {
        warn!("{}: {}", settings.describe(), e);
        return Ok(());
    }

    let notifiers = registry
        .build(&current.notify)
        .with_context(|| format!("notify.backend = \"{}\"", current.notify.backend))?;
    info!(
        "Notifications: backend {} with {} channel(s)",
        current.notify.backend,
        notifiers.len()
    );

    Ok(())
}

/// Drain loop telemetry into the log
async fn log_events(mut events: mpsc::Receiver<LoopEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Loop event: {:?}", event);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
