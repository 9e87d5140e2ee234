//! Descriptor Source Port
//!
//! Where plugin metadata comes from. The filesystem source reads
//! `plugin.json` next to each plugin; the in-memory source serves fixed
//! lookups for embedded deployments and tests.

use std::collections::HashMap;

use crate::domain::plugin::{BrokerId, DescriptorLookup};

/// Lookup of plugin metadata by broker identifier.
#[cfg_attr(test, mockall::automock)]
pub trait DescriptorSource: Send + Sync {
    /// Metadata for one plugin. Never fails; problems surface as
    /// [`DescriptorLookup::Malformed`].
    fn lookup(&self, broker: &BrokerId) -> DescriptorLookup;
}

/// Fixed, in-memory descriptor lookups. Unknown brokers are `Missing`.
#[derive(Debug, Clone, Default)]
pub struct StaticDescriptorSource {
    entries: HashMap<BrokerId, DescriptorLookup>,
}

impl StaticDescriptorSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the lookup result for a broker.
    #[must_use]
    pub fn with(mut self, broker: BrokerId, lookup: DescriptorLookup) -> Self {
        self.entries.insert(broker, lookup);
        self
    }
}

impl DescriptorSource for StaticDescriptorSource {
    fn lookup(&self, broker: &BrokerId) -> DescriptorLookup {
        self.entries
            .get(broker)
            .cloned()
            .unwrap_or(DescriptorLookup::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plugin::BrokerPluginDescriptor;

    #[test]
    fn static_source_defaults_to_missing() {
        let source = StaticDescriptorSource::new();
        let id = BrokerId::parse("zerodha").unwrap();
        assert_eq!(source.lookup(&id), DescriptorLookup::Missing);
    }

    #[test]
    fn static_source_returns_registered_lookup() {
        let id = BrokerId::parse("kotak").unwrap();
        let descriptor = BrokerPluginDescriptor::new(id.clone()).enabled(false);
        let source = StaticDescriptorSource::new().with(id.clone(), DescriptorLookup::Found(descriptor.clone()));

        assert_eq!(source.lookup(&id), DescriptorLookup::Found(descriptor));
    }
}
