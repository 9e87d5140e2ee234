//! Plugin Catalog
//!
//! Explicit table of every broker plugin compiled into the binary. Each
//! registration names its authenticate entry point, its adapter factory,
//! and optionally a margin calculator. Discovery decides which catalog
//! entries become active; the catalog itself never changes at runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::ports::{AdapterFactory, Authenticator, MarginCalculator};
use crate::domain::plugin::BrokerId;

/// A discovered plugin could not be turned into a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginResolutionError {
    /// No plugin with this identifier is compiled in.
    #[error("no plugin registered for broker '{0}'")]
    NotRegistered(String),

    /// The plugin provides no authenticate entry point.
    #[error("broker '{0}' provides no authenticate entry point")]
    MissingAuthenticate(String),

    /// The plugin provides no streaming adapter factory.
    #[error("broker '{0}' provides no adapter factory")]
    MissingAdapterFactory(String),
}

impl PluginResolutionError {
    /// Broker the error is about.
    #[must_use]
    pub fn broker(&self) -> &str {
        match self {
            Self::NotRegistered(broker)
            | Self::MissingAuthenticate(broker)
            | Self::MissingAdapterFactory(broker) => broker,
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

/// What one broker plugin contributes.
#[derive(Clone)]
pub struct PluginRegistration {
    identifier: BrokerId,
    authenticator: Option<Arc<dyn Authenticator>>,
    adapter_factory: Option<Arc<dyn AdapterFactory>>,
    margin_calculator: Option<Arc<dyn MarginCalculator>>,
}

impl PluginRegistration {
    /// Start a registration with no entry points.
    #[must_use]
    pub const fn new(identifier: BrokerId) -> Self {
        Self {
            identifier,
            authenticator: None,
            adapter_factory: None,
            margin_calculator: None,
        }
    }

    /// Provide the authenticate entry point.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Provide the streaming adapter factory.
    #[must_use]
    pub fn with_adapter_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.adapter_factory = Some(factory);
        self
    }

    /// Provide a margin calculator. Only served for brokers that also
    /// declare `Operation::MarginCalculator`.
    #[must_use]
    pub fn with_margin_calculator(mut self, calculator: Arc<dyn MarginCalculator>) -> Self {
        self.margin_calculator = Some(calculator);
        self
    }

    /// Broker identifier.
    #[must_use]
    pub const fn identifier(&self) -> &BrokerId {
        &self.identifier
    }
}

impl std::fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("identifier", &self.identifier)
            .field("authenticator", &self.authenticator.is_some())
            .field("adapter_factory", &self.adapter_factory.is_some())
            .field("margin_calculator", &self.margin_calculator.is_some())
            .finish()
    }
}

/// Entry points of a plugin that passed resolution.
#[derive(Clone)]
pub struct ResolvedPlugin {
    /// Authenticate entry point.
    pub authenticator: Arc<dyn Authenticator>,
    /// Streaming adapter factory.
    pub adapter_factory: Arc<dyn AdapterFactory>,
    /// Margin calculator, if the broker has one.
    pub margin_calculator: Option<Arc<dyn MarginCalculator>>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Every plugin compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    registrations: BTreeMap<BrokerId, PluginRegistration>,
}

impl PluginCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. A later registration for the same identifier replaces
    /// the earlier one.
    pub fn register(&mut self, registration: PluginRegistration) {
        let id = registration.identifier.clone();
        if self.registrations.insert(id.clone(), registration).is_some() {
            tracing::warn!(broker = %id, "Plugin registered twice, keeping the latest");
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, registration: PluginRegistration) -> Self {
        self.register(registration);
        self
    }

    /// Identifiers of every compiled-in plugin, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &BrokerId> {
        self.registrations.keys()
    }

    /// Whether a plugin is compiled in.
    #[must_use]
    pub fn contains(&self, broker: &BrokerId) -> bool {
        self.registrations.contains_key(broker)
    }

    /// Number of compiled-in plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Resolve a plugin's required entry points.
    pub fn resolve(&self, broker: &BrokerId) -> Result<ResolvedPlugin, PluginResolutionError> {
        let registration = self
            .registrations
            .get(broker)
            .ok_or_else(|| PluginResolutionError::NotRegistered(broker.to_string()))?;

        let authenticator = registration
            .authenticator
            .clone()
            .ok_or_else(|| PluginResolutionError::MissingAuthenticate(broker.to_string()))?;

        let adapter_factory = registration
            .adapter_factory
            .clone()
            .ok_or_else(|| PluginResolutionError::MissingAdapterFactory(broker.to_string()))?;

        Ok(ResolvedPlugin {
            authenticator,
            adapter_factory,
            margin_calculator: registration.margin_calculator.clone(),
        })
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::PluginRegistration;
    use crate::application::ports::{AuthError, Authenticator, BrokerSession, Credentials};
    use crate::application::services::adapter::{StandardAdapterFactory, testing::profile};
    use crate::domain::plugin::BrokerId;

    /// Authenticator that accepts any credentials with an auth token.
    pub struct StubAuthenticator(pub BrokerId);

    #[async_trait]
    impl Authenticator for StubAuthenticator {
        async fn authenticate(&self, credentials: &Credentials) -> Result<BrokerSession, AuthError> {
            let token = credentials
                .auth_token()
                .ok_or(AuthError::MissingField("auth_token"))?;
            Ok(BrokerSession::new(self.0.clone(), token, None))
        }
    }

    pub fn id(raw: &str) -> BrokerId {
        BrokerId::parse(raw).unwrap()
    }

    /// Registration with both required entry points.
    pub fn complete(raw: &str) -> PluginRegistration {
        PluginRegistration::new(id(raw))
            .with_authenticator(Arc::new(StubAuthenticator(id(raw))))
            .with_adapter_factory(Arc::new(StandardAdapterFactory::new(profile(), |_| {
                "loopback://test".to_string()
            })))
    }
}
