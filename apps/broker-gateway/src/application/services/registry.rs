//! Broker Registry
//!
//! The set of active broker plugins produced by one loading pass. A
//! registry is immutable once built; [`SharedRegistry`] swaps in a fresh
//! one on explicit reload so readers never observe a half-built set.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::adapter::{AdapterSettings, StreamingAdapter};
use super::catalog::ResolvedPlugin;
use crate::application::ports::{
    AdapterFactory, AuthError, Authenticator, BrokerSession, Credentials, MarginCalculator,
    Transport,
};
use crate::domain::capability::{CapabilityRegistry, NotSupportedError};
use crate::domain::plugin::{ActivationDecision, BrokerId, BrokerPluginDescriptor};
use crate::domain::vocabulary::Operation;

/// Registry lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No active plugin with this identifier.
    #[error("unknown broker '{0}'")]
    UnknownBroker(String),

    /// The session was issued by a different broker.
    #[error("session belongs to '{actual}', not '{expected}'")]
    SessionMismatch {
        /// Broker the adapter was requested from.
        expected: String,
        /// Broker the session belongs to.
        actual: String,
    },
}

// =============================================================================
// Entry
// =============================================================================

/// One active broker plugin.
#[derive(Clone)]
pub struct BrokerRegistryEntry {
    identifier: BrokerId,
    descriptor: Option<BrokerPluginDescriptor>,
    activation: ActivationDecision,
    plugin: ResolvedPlugin,
}

impl BrokerRegistryEntry {
    /// Assemble an entry from a resolved plugin.
    #[must_use]
    pub const fn new(
        identifier: BrokerId,
        descriptor: Option<BrokerPluginDescriptor>,
        activation: ActivationDecision,
        plugin: ResolvedPlugin,
    ) -> Self {
        Self {
            identifier,
            descriptor,
            activation,
            plugin,
        }
    }

    /// Broker identifier.
    #[must_use]
    pub const fn identifier(&self) -> &BrokerId {
        &self.identifier
    }

    /// Parsed metadata, if the plugin shipped usable metadata.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&BrokerPluginDescriptor> {
        self.descriptor.as_ref()
    }

    /// Why the plugin was activated.
    #[must_use]
    pub const fn activation(&self) -> ActivationDecision {
        self.activation
    }

    /// Name the authenticate entry point is registered under.
    #[must_use]
    pub fn auth_function_name(&self) -> String {
        self.identifier.auth_function_name()
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        self.plugin.adapter_factory.capabilities()
    }

    /// Authenticate entry point.
    #[must_use]
    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.plugin.authenticator
    }

    /// Adapter factory.
    #[must_use]
    pub fn adapter_factory(&self) -> &Arc<dyn AdapterFactory> {
        &self.plugin.adapter_factory
    }

    /// Authenticate with this broker.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<BrokerSession, AuthError> {
        let session = self.plugin.authenticator.authenticate(credentials).await?;
        tracing::info!(broker = %self.identifier, session_id = %session.session_id, "Broker session established");
        Ok(session)
    }

    /// Streaming endpoint for a session.
    #[must_use]
    pub fn stream_url(&self, session: &BrokerSession) -> String {
        self.plugin.adapter_factory.stream_url(session)
    }

    /// Build a streaming adapter for a session issued by this broker.
    pub fn create_adapter(
        &self,
        session: BrokerSession,
        transport: Arc<dyn Transport>,
        settings: AdapterSettings,
    ) -> Result<Arc<StreamingAdapter>, RegistryError> {
        if session.broker != self.identifier {
            return Err(RegistryError::SessionMismatch {
                expected: self.identifier.to_string(),
                actual: session.broker.to_string(),
            });
        }
        Ok(self
            .plugin
            .adapter_factory
            .create(session, transport, settings))
    }

    /// The margin calculator, or [`NotSupportedError`] unless the broker both
    /// declares the operation and registered a calculator.
    pub fn margin_calculator(&self) -> Result<&dyn MarginCalculator, NotSupportedError> {
        self.capabilities().require_operation(Operation::MarginCalculator)?;
        self.plugin.margin_calculator.as_deref().ok_or_else(|| {
            NotSupportedError::new(self.identifier.as_str(), Operation::MarginCalculator)
        })
    }
}

impl std::fmt::Debug for BrokerRegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRegistryEntry")
            .field("identifier", &self.identifier)
            .field("descriptor", &self.descriptor)
            .field("activation", &self.activation)
            .field("margin_calculator", &self.plugin.margin_calculator.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable set of active broker plugins.
#[derive(Debug, Clone, Default)]
pub struct BrokerRegistry {
    entries: BTreeMap<BrokerId, BrokerRegistryEntry>,
}

impl BrokerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, entry: BrokerRegistryEntry) {
        self.entries.insert(entry.identifier.clone(), entry);
    }

    /// Look up a broker. The identifier is normalized first.
    #[must_use]
    pub fn get(&self, broker: &str) -> Option<&BrokerRegistryEntry> {
        let id = BrokerId::parse(broker)?;
        self.entries.get(&id)
    }

    /// Look up a broker or fail with [`RegistryError::UnknownBroker`].
    pub fn entry(&self, broker: &str) -> Result<&BrokerRegistryEntry, RegistryError> {
        self.get(broker)
            .ok_or_else(|| RegistryError::UnknownBroker(broker.trim().to_string()))
    }

    /// Look up an authenticate entry point by its registered name
    /// (`<broker>_auth`).
    #[must_use]
    pub fn auth_function(&self, name: &str) -> Option<&Arc<dyn Authenticator>> {
        let broker = name.trim().strip_suffix("_auth")?;
        self.get(broker).map(BrokerRegistryEntry::authenticator)
    }

    /// Whether a broker is active.
    #[must_use]
    pub fn contains(&self, broker: &str) -> bool {
        self.get(broker).is_some()
    }

    /// Active broker identifiers, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &BrokerId> {
        self.entries.keys()
    }

    /// Active entries, sorted by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &BrokerRegistryEntry> {
        self.entries.values()
    }

    /// Number of active brokers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no broker is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Shared Registry
// =============================================================================

/// Process-wide handle to the current registry.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    current: RwLock<Arc<BrokerRegistry>>,
}

impl SharedRegistry {
    /// Wrap an initial registry.
    #[must_use]
    pub fn new(registry: BrokerRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry as of now. Later reloads do not affect the returned value.
    #[must_use]
    pub fn current(&self) -> Arc<BrokerRegistry> {
        Arc::clone(&self.current.read())
    }

    /// Install a freshly loaded registry and return the previous one.
    pub fn replace(&self, registry: BrokerRegistry) -> Arc<BrokerRegistry> {
        let next = Arc::new(registry);
        tracing::info!(brokers = next.len(), "Broker registry replaced");
        std::mem::replace(&mut *self.current.write(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MarginError;
    use crate::application::services::catalog::PluginCatalog;
    use crate::application::services::catalog::testing::{complete, id};
    use crate::domain::margin::{MarginPosition, MarginSummary};
    use crate::domain::plugin::BrokerPluginDescriptor;
    use crate::infrastructure::loopback::LoopbackTransport;

    fn entry(raw: &str) -> BrokerRegistryEntry {
        let catalog = PluginCatalog::new().with(complete(raw));
        BrokerRegistryEntry::new(
            id(raw),
            Some(BrokerPluginDescriptor::new(id(raw))),
            ActivationDecision::Enabled,
            catalog.resolve(&id(raw)).unwrap(),
        )
    }

    fn registry(ids: &[&str]) -> BrokerRegistry {
        let mut registry = BrokerRegistry::empty();
        for raw in ids {
            registry.insert(entry(raw));
        }
        registry
    }

    #[test]
    fn lookup_normalizes_identifier() {
        let registry = registry(&["kotak"]);
        assert!(registry.get(" KOTAK ").is_some());
        assert!(registry.contains("kotak"));
        assert!(!registry.contains("dhan"));
    }

    #[test]
    fn entry_reports_unknown_broker() {
        let registry = registry(&["kotak"]);
        assert_eq!(
            registry.entry("zerodha").unwrap_err(),
            RegistryError::UnknownBroker("zerodha".to_string())
        );
    }

    #[test]
    fn auth_function_resolves_by_registered_name() {
        let registry = registry(&["kotak", "wisdom"]);
        assert_eq!(registry.get("kotak").unwrap().auth_function_name(), "kotak_auth");
        assert!(registry.auth_function("wisdom_auth").is_some());
        assert!(registry.auth_function("wisdom").is_none());
        assert!(registry.auth_function("zerodha_auth").is_none());
    }

    #[test]
    fn margin_calculator_absent_is_not_supported() {
        let registry = registry(&["wisdom"]);
        let err = registry
            .get("wisdom")
            .unwrap()
            .margin_calculator()
            .err()
            .unwrap();
        assert_eq!(err, NotSupportedError::new("wisdom", Operation::MarginCalculator));
    }

    struct FlatMargin;

    impl MarginCalculator for FlatMargin {
        fn transform_positions(
            &self,
            _positions: &[MarginPosition],
        ) -> Result<serde_json::Value, MarginError> {
            Ok(serde_json::Value::Null)
        }

        fn parse_response(&self, _response: &serde_json::Value) -> Result<MarginSummary, MarginError> {
            Err(MarginError::EmptyBasket)
        }
    }

    #[test]
    fn margin_calculator_requires_declared_operation() {
        let registration = complete("testbroker").with_margin_calculator(Arc::new(FlatMargin));
        let catalog = PluginCatalog::new().with(registration);
        let entry = BrokerRegistryEntry::new(
            id("testbroker"),
            None,
            ActivationDecision::Enabled,
            catalog.resolve(&id("testbroker")).unwrap(),
        );

        assert!(!entry.capabilities().supports_operation(Operation::MarginCalculator));
        let err = entry.margin_calculator().err().unwrap();
        assert_eq!(err, NotSupportedError::new("testbroker", Operation::MarginCalculator));
    }

    #[tokio::test]
    async fn authenticate_then_create_adapter() {
        let registry = registry(&["testbroker"]);
        let entry = registry.entry("testbroker").unwrap();

        let session = entry
            .authenticate(&Credentials::new("k", "s").with_auth_token("tok"))
            .await
            .unwrap();
        assert_eq!(session.broker.as_str(), "testbroker");

        let transport = Arc::new(LoopbackTransport::new("loopback://registry"));
        let adapter = entry
            .create_adapter(session, transport, AdapterSettings::default())
            .unwrap();
        assert_eq!(adapter.broker().as_str(), "testbroker");
    }

    #[test]
    fn create_adapter_rejects_foreign_session() {
        let registry = registry(&["kotak"]);
        let session = BrokerSession::new(id("wisdom"), "tok", None);
        let transport = Arc::new(LoopbackTransport::new("loopback://registry"));

        let err = registry
            .entry("kotak")
            .unwrap()
            .create_adapter(session, transport, AdapterSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::SessionMismatch { .. }));
    }

    #[test]
    fn shared_registry_swaps_atomically() {
        let shared = SharedRegistry::new(registry(&["kotak"]));
        let before = shared.current();

        let previous = shared.replace(registry(&["kotak", "wisdom"]));

        assert_eq!(previous.len(), 1);
        assert_eq!(before.len(), 1);
        assert_eq!(shared.current().len(), 2);
    }
}
