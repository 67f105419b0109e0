//! Plugin-based notifier registry
//!
//! Notification backends register a factory under a name; the change loop
//! asks the registry for the notifiers of the backend named in the current
//! cycle's settings. Adding a backend never touches the loop.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the wanwatch-notify crate
//! pub fn register(registry: &NotifierRegistry, credentials: Credentials) -> Result<()> {
//!     let client = build_client()?;
//!     registry.register_backend("gateway", Box::new(GatewayFactory::new(credentials.gateway, client)));
//!     Ok(())
//! }
//! ```

use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use crate::traits::{Notifier, NotifierFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

/// Registry of notification backends
///
/// Uses interior mutability so backends can be registered through a shared
/// reference while the loop holds an `Arc` to the registry.
#[derive(Default)]
pub struct NotifierRegistry {
    backends: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,
}

impl NotifierRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory, replacing any previous one with the same name
    pub fn register_backend(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        let name = name.into();
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if backends.insert(name.clone(), factory).is_some() {
            tracing::debug!("Replaced notifier backend '{}'", name);
        }
    }

    /// Build the notifiers for a cycle's settings, in dispatch order
    ///
    /// # Returns
    ///
    /// - `Ok(vec![])`: The backend is `none`
    /// - `Ok(notifiers)`: Email notifiers first, then push
    /// - `Err(Error::Config)`: The backend is not registered or rejected the settings
    pub fn build(&self, config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
        if config.is_disabled() {
            return Ok(Vec::new());
        }

        let name = config.backend.trim();
        let backends = self.read();
        let factory = backends.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = backends.keys().map(String::as_str).collect();
            known.sort_unstable();
            Error::config(format!(
                "Unknown notify backend '{}'. Registered: {}",
                name,
                known.join(", ")
            ))
        })?;

        let mut notifiers = factory.create(config)?;
        notifiers.sort_by_key(|notifier| notifier.channel());
        Ok(notifiers)
    }

    /// Names of all registered backends
    pub fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a backend is registered under `name`
    pub fn has_backend(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Box<dyn NotifierFactory>>> {
        self.backends
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChangeNotice, Channel};
    use async_trait::async_trait;

    struct NoopNotifier(Channel);

    #[async_trait]
    impl Notifier for NoopNotifier {
        fn channel(&self) -> Channel {
            self.0
        }

        fn backend_name(&self) -> &'static str {
            "noop"
        }

        async fn notify(&self, _notice: &ChangeNotice) -> Result<()> {
            Ok(())
        }
    }

    struct PushThenEmailFactory;

    impl NotifierFactory for PushThenEmailFactory {
        fn create(&self, _config: &NotifyConfig) -> Result<Vec<Box<dyn Notifier>>> {
            Ok(vec![
                Box::new(NoopNotifier(Channel::Push)),
                Box::new(NoopNotifier(Channel::Email)),
            ])
        }
    }

    fn config_for(backend: &str) -> NotifyConfig {
        NotifyConfig {
            backend: backend.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = NotifierRegistry::new();
        assert!(!registry.has_backend("noop"));

        registry.register_backend("noop", Box::new(PushThenEmailFactory));

        assert!(registry.has_backend("noop"));
        assert_eq!(registry.list_backends(), vec!["noop".to_string()]);
    }

    #[test]
    fn test_build_orders_email_before_push() {
        let registry = NotifierRegistry::new();
        registry.register_backend("noop", Box::new(PushThenEmailFactory));

        let notifiers = registry.build(&config_for("noop")).unwrap();
        let channels: Vec<Channel> = notifiers.iter().map(|n| n.channel()).collect();
        assert_eq!(channels, vec![Channel::Email, Channel::Push]);
    }

    #[test]
    fn test_none_backend_builds_nothing() {
        let registry = NotifierRegistry::new();
        assert!(registry.build(&config_for("none")).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let registry = NotifierRegistry::new();
        registry.register_backend("noop", Box::new(PushThenEmailFactory));

        let err = match registry.build(&config_for("carrier-pigeon")) {
            Err(err) => err,
            Ok(_) => panic!("unknown backend should not build"),
        };
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("noop"));
    }
}
