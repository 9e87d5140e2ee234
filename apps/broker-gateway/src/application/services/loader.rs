//! Plugin Loader
//!
//! Turns a list of discovered plugin candidates into a [`BrokerRegistry`].
//! Each candidate is normalized, checked against its metadata and the
//! activation policy, then resolved against the plugin catalog. A plugin
//! that fails any step is skipped on its own; loading never aborts.

use std::collections::BTreeSet;

use super::catalog::{PluginCatalog, PluginResolutionError};
use super::registry::{BrokerRegistry, BrokerRegistryEntry};
use crate::application::ports::DescriptorSource;
use crate::domain::plugin::{
    ActivationDecision, ActivationPolicy, BrokerId, DescriptorLookup, evaluate_activation,
};
use crate::infrastructure::metrics;

/// Result of one loading pass.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Active plugins.
    pub registry: BrokerRegistry,
    /// Plugins left inactive by the activation policy.
    pub inactive: Vec<BrokerId>,
    /// Active plugins that could not be resolved.
    pub failures: Vec<PluginResolutionError>,
    /// Candidate names that are not valid identifiers.
    pub rejected: Vec<String>,
}

/// Loads broker plugins from a catalog.
pub struct PluginLoader<'a> {
    catalog: &'a PluginCatalog,
    descriptors: &'a dyn DescriptorSource,
    policy: ActivationPolicy,
}

impl<'a> PluginLoader<'a> {
    /// Create a loader.
    #[must_use]
    pub const fn new(
        catalog: &'a PluginCatalog,
        descriptors: &'a dyn DescriptorSource,
        policy: ActivationPolicy,
    ) -> Self {
        Self {
            catalog,
            descriptors,
            policy,
        }
    }

    /// Load every candidate. The same inputs always yield an equivalent
    /// registry.
    pub fn load_all<I, S>(&self, candidates: I) -> LoadOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = LoadOutcome::default();
        let mut seen = BTreeSet::new();

        for candidate in candidates {
            let raw = candidate.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            let Some(id) = BrokerId::parse(raw) else {
                tracing::warn!(candidate = raw, "Skipping plugin with invalid identifier");
                outcome.rejected.push(raw.to_string());
                continue;
            };
            if !seen.insert(id.clone()) {
                tracing::debug!(broker = %id, "Skipping duplicate plugin candidate");
                continue;
            }

            self.load_one(id, &mut outcome);
        }

        tracing::info!(
            registered = outcome.registry.len(),
            inactive = outcome.inactive.len(),
            failed = outcome.failures.len(),
            brokers = ?outcome.registry.identifiers().map(BrokerId::as_str).collect::<Vec<_>>(),
            "Broker plugins loaded"
        );
        metrics::set_registry_size(outcome.registry.len(), outcome.inactive.len());

        outcome
    }

    fn load_one(&self, id: BrokerId, outcome: &mut LoadOutcome) {
        let lookup = self.descriptors.lookup(&id);
        let decision = evaluate_activation(&lookup, self.policy);

        match (&lookup, decision) {
            (DescriptorLookup::Malformed { reason }, _) => {
                tracing::warn!(broker = %id, reason = %reason, "Plugin metadata unusable, activating by default");
            }
            (_, ActivationDecision::RegionOverride) => {
                tracing::info!(broker = %id, "Disabled Indian broker activated by ENABLE_INDIAN_BROKERS");
            }
            (_, ActivationDecision::Disabled) => {
                tracing::info!(broker = %id, "Plugin disabled, skipping");
            }
            _ => {}
        }

        if !decision.is_active() {
            outcome.inactive.push(id);
            return;
        }

        match self.catalog.resolve(&id) {
            Ok(plugin) => {
                tracing::debug!(broker = %id, auth = %id.auth_function_name(), "Plugin registered");
                let descriptor = lookup.descriptor().cloned();
                outcome
                    .registry
                    .insert(BrokerRegistryEntry::new(id, descriptor, decision, plugin));
            }
            Err(error) => {
                tracing::error!(broker = %id, error = %error, "Failed to load broker plugin");
                metrics::record_plugin_failure(id.as_str());
                outcome.failures.push(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::application::ports::{MockDescriptorSource, StaticDescriptorSource};
    use crate::application::services::catalog::PluginRegistration;
    use crate::application::services::catalog::testing::{complete, id};
    use crate::domain::plugin::{BrokerPluginDescriptor, Region};

    fn found(raw: &str, enabled: bool, region: Region) -> DescriptorLookup {
        DescriptorLookup::Found(BrokerPluginDescriptor::new(id(raw)).enabled(enabled).region(region))
    }

    fn catalog() -> PluginCatalog {
        PluginCatalog::new()
            .with(complete("broker_a"))
            .with(complete("broker_b"))
            .with(complete("broker_c"))
    }

    fn three_candidates() -> StaticDescriptorSource {
        StaticDescriptorSource::new()
            .with(id("broker_b"), found("broker_b", false, Region::In))
            .with(id("broker_c"), found("broker_c", false, Region::Us))
    }

    #[test]
    fn activates_only_enabled_or_unconfigured_plugins() {
        let catalog = catalog();
        let source = three_candidates();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::new(false));

        let outcome = loader.load_all(["broker_a", "broker_b", "broker_c"]);

        let ids: Vec<_> = outcome.registry.identifiers().map(BrokerId::as_str).collect();
        assert_eq!(ids, vec!["broker_a"]);
        assert_eq!(outcome.inactive, vec![id("broker_b"), id("broker_c")]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn override_activates_only_indian_plugins() {
        let catalog = catalog();
        let source = three_candidates();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::new(true));

        let outcome = loader.load_all(["broker_a", "broker_b", "broker_c"]);

        assert!(outcome.registry.contains("broker_b"));
        assert!(!outcome.registry.contains("broker_c"));
        assert_eq!(
            outcome.registry.get("broker_b").unwrap().activation(),
            ActivationDecision::RegionOverride
        );
    }

    #[test_case("  Broker_A ", "broker_a" ; "trims and lowercases")]
    #[test_case("BROKER_A", "broker_a" ; "uppercase")]
    fn normalizes_candidate_identifiers(candidate: &str, expected: &str) {
        let catalog = catalog();
        let source = StaticDescriptorSource::new();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all([candidate]);
        assert!(outcome.registry.contains(expected));
    }

    #[test]
    fn skips_empty_duplicate_and_invalid_candidates() {
        let catalog = catalog();
        let source = StaticDescriptorSource::new();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all(["", "   ", "broker_a", "BROKER_A", "bad name"]);

        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.rejected, vec!["bad name".to_string()]);
    }

    #[test]
    fn malformed_metadata_still_activates() {
        let catalog = catalog();
        let mut source = MockDescriptorSource::new();
        source.expect_lookup().times(1).returning(|_| DescriptorLookup::Malformed {
            reason: "expected value at line 1 column 1".to_string(),
        });
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all(["broker_a"]);

        let entry = outcome.registry.get("broker_a").unwrap();
        assert_eq!(entry.activation(), ActivationDecision::UnreadableMetadata);
        assert!(entry.descriptor().is_none());
    }

    #[test]
    fn descriptor_is_looked_up_once_per_unique_candidate() {
        let catalog = catalog();
        let mut source = MockDescriptorSource::new();
        source
            .expect_lookup()
            .times(2)
            .returning(|_| DescriptorLookup::Missing);
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all(["broker_a", "broker_b", "broker_a"]);
        assert_eq!(outcome.registry.len(), 2);
    }

    #[test]
    fn resolution_failure_omits_only_that_broker() {
        let catalog = catalog()
            .with(PluginRegistration::new(id("broken")))
            .with(complete("broker_d"));
        let source = StaticDescriptorSource::new();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all(["broken", "broker_d", "zerodha"]);

        assert!(outcome.registry.contains("broker_d"));
        assert!(!outcome.registry.contains("broken"));
        assert_eq!(
            outcome.failures,
            vec![
                PluginResolutionError::MissingAuthenticate("broken".to_string()),
                PluginResolutionError::NotRegistered("zerodha".to_string()),
            ]
        );
    }

    #[test]
    fn loading_is_idempotent() {
        let catalog = catalog();
        let source = three_candidates();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::new(true));

        let first = loader.load_all(["broker_a", "broker_b", "broker_c"]);
        let second = loader.load_all(["broker_a", "broker_b", "broker_c"]);

        let ids = |o: &LoadOutcome| {
            o.registry
                .identifiers()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.inactive, second.inactive);
    }

    #[test]
    fn empty_candidate_list_yields_empty_registry() {
        let catalog = catalog();
        let source = StaticDescriptorSource::new();
        let loader = PluginLoader::new(&catalog, &source, ActivationPolicy::default());

        let outcome = loader.load_all(Vec::<String>::new());
        assert!(outcome.registry.is_empty());
    }
}
