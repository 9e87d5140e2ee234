//! Broker Plugin Descriptors & Activation
//!
//! Identity and metadata of a broker plugin, and the pure rule deciding
//! whether a discovered plugin becomes active.
//!
//! # Activation Rule
//!
//! 1. No metadata → active.
//! 2. Metadata present but unreadable or malformed → active (the loader
//!    logs a warning).
//! 3. `enabled: true` (the default when the field is absent) → active.
//! 4. `enabled: false` with region `IN` and the Indian-broker override
//!    switched on → active.
//! 5. Otherwise inactive.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Broker Identifier
// =============================================================================

/// Normalized broker identifier (trimmed, lowercase, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrokerId(String);

impl BrokerId {
    /// Normalize a raw identifier. Returns `None` for blank input or
    /// identifiers containing path separators or whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let id = raw.trim().to_ascii_lowercase();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then_some(Self(id))
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name under which the plugin's authenticate entry point is registered.
    #[must_use]
    pub fn auth_function_name(&self) -> String {
        format!("{}_auth", self.0)
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BrokerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for BrokerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BrokerId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid broker identifier: {value:?}"))
    }
}

impl From<BrokerId> for String {
    fn from(id: BrokerId) -> Self {
        id.0
    }
}

// =============================================================================
// Region
// =============================================================================

/// Market region a broker operates in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Region {
    /// India.
    In,
    /// United States.
    Us,
    /// No specific region.
    #[default]
    Global,
    /// Any other region code, uppercased.
    Other(String),
}

impl Region {
    /// Parse a region code. Blank means global.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let code = raw.trim().to_ascii_uppercase();
        match code.as_str() {
            "" | "GLOBAL" => Self::Global,
            "IN" => Self::In,
            "US" => Self::Us,
            _ => Self::Other(code),
        }
    }

    /// Region code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::In => "IN",
            Self::Us => "US",
            Self::Global => "GLOBAL",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Metadata a broker plugin ships with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerPluginDescriptor {
    /// Broker identifier.
    pub identifier: BrokerId,
    /// Whether the plugin is enabled without any override.
    pub enabled: bool,
    /// Market region.
    pub region: Region,
    /// Human-readable name.
    pub display_name: Option<String>,
    /// Plugin version string.
    pub version: Option<String>,
}

impl BrokerPluginDescriptor {
    /// Enabled global descriptor, the same as having no metadata.
    #[must_use]
    pub const fn new(identifier: BrokerId) -> Self {
        Self {
            identifier,
            enabled: true,
            region: Region::Global,
            display_name: None,
            version: None,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the region.
    #[must_use]
    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }
}

/// Result of looking up a plugin's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorLookup {
    /// The plugin ships no metadata.
    Missing,
    /// Metadata exists but could not be read or parsed.
    Malformed {
        /// Why it could not be used.
        reason: String,
    },
    /// Metadata parsed.
    Found(BrokerPluginDescriptor),
}

impl DescriptorLookup {
    /// The parsed descriptor, if any.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&BrokerPluginDescriptor> {
        match self {
            Self::Found(descriptor) => Some(descriptor),
            Self::Missing | Self::Malformed { .. } => None,
        }
    }
}

// =============================================================================
// Activation
// =============================================================================

/// Process-wide activation settings, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationPolicy {
    /// Activate disabled plugins whose region is `IN`.
    pub enable_indian_brokers: bool,
}

impl ActivationPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(enable_indian_brokers: bool) -> Self {
        Self {
            enable_indian_brokers,
        }
    }
}

/// Why a plugin was or was not activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationDecision {
    /// No metadata; active by default.
    NoMetadata,
    /// Metadata unusable; active by default.
    UnreadableMetadata,
    /// Metadata says enabled.
    Enabled,
    /// Disabled in metadata, activated by the Indian-broker override.
    RegionOverride,
    /// Disabled and not overridden.
    Disabled,
}

impl ActivationDecision {
    /// Whether the plugin should be registered.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Short label for logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoMetadata => "no_metadata",
            Self::UnreadableMetadata => "unreadable_metadata",
            Self::Enabled => "enabled",
            Self::RegionOverride => "region_override",
            Self::Disabled => "disabled",
        }
    }
}

/// Decide activation for one plugin.
#[must_use]
pub fn evaluate_activation(lookup: &DescriptorLookup, policy: ActivationPolicy) -> ActivationDecision {
    match lookup {
        DescriptorLookup::Missing => ActivationDecision::NoMetadata,
        DescriptorLookup::Malformed { .. } => ActivationDecision::UnreadableMetadata,
        DescriptorLookup::Found(descriptor) if descriptor.enabled => ActivationDecision::Enabled,
        DescriptorLookup::Found(descriptor)
            if descriptor.region == Region::In && policy.enable_indian_brokers =>
        {
            ActivationDecision::RegionOverride
        }
        DescriptorLookup::Found(_) => ActivationDecision::Disabled,
    }
}

/// Whether a plugin should be activated.
#[must_use]
pub fn should_activate(lookup: &DescriptorLookup, policy: ActivationPolicy) -> bool {
    evaluate_activation(lookup, policy).is_active()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn id(raw: &str) -> BrokerId {
        BrokerId::parse(raw).unwrap()
    }

    fn found(enabled: bool, region: &str) -> DescriptorLookup {
        DescriptorLookup::Found(
            BrokerPluginDescriptor::new(id("kotak"))
                .enabled(enabled)
                .region(Region::parse(region)),
        )
    }

    #[test]
    fn broker_id_normalizes_case_and_whitespace() {
        assert_eq!(id("  Kotak ").as_str(), "kotak");
        assert_eq!(id("dhan_sandbox").auth_function_name(), "dhan_sandbox_auth");
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("../etc" ; "path traversal")]
    #[test_case("two words" ; "inner whitespace")]
    fn broker_id_rejects_invalid(raw: &str) {
        assert_eq!(BrokerId::parse(raw), None);
    }

    #[test]
    fn broker_id_deserializes_normalized() {
        let parsed: BrokerId = serde_json::from_str("\"Wisdom\"").unwrap();
        assert_eq!(parsed.as_str(), "wisdom");
        assert!(serde_json::from_str::<BrokerId>("\"\"").is_err());
    }

    #[test_case("IN", Region::In)]
    #[test_case("in", Region::In ; "lowercase")]
    #[test_case("", Region::Global ; "blank")]
    #[test_case("US", Region::Us)]
    #[test_case("uk", Region::Other("UK".to_string()) ; "other")]
    fn region_parses(raw: &str, expected: Region) {
        assert_eq!(Region::parse(raw), expected);
    }

    #[test]
    fn missing_metadata_activates() {
        assert!(should_activate(&DescriptorLookup::Missing, ActivationPolicy::default()));
    }

    #[test]
    fn malformed_metadata_activates() {
        let lookup = DescriptorLookup::Malformed {
            reason: "expected value at line 1".to_string(),
        };
        assert_eq!(
            evaluate_activation(&lookup, ActivationPolicy::default()),
            ActivationDecision::UnreadableMetadata
        );
        assert!(should_activate(&lookup, ActivationPolicy::default()));
    }

    #[test_case(true, "IN", false, ActivationDecision::Enabled ; "enabled indian")]
    #[test_case(true, "US", false, ActivationDecision::Enabled ; "enabled us")]
    #[test_case(false, "IN", true, ActivationDecision::RegionOverride ; "disabled indian with override")]
    #[test_case(false, "IN", false, ActivationDecision::Disabled ; "disabled indian without override")]
    #[test_case(false, "US", true, ActivationDecision::Disabled ; "override ignores other regions")]
    #[test_case(false, "", true, ActivationDecision::Disabled ; "override ignores global")]
    fn activation_rule(enabled: bool, region: &str, override_on: bool, expected: ActivationDecision) {
        let decision = evaluate_activation(&found(enabled, region), ActivationPolicy::new(override_on));
        assert_eq!(decision, expected);
    }

    #[test]
    fn lookup_exposes_descriptor_only_when_found() {
        assert!(DescriptorLookup::Missing.descriptor().is_none());
        assert_eq!(
            found(true, "IN").descriptor().map(|d| d.region.clone()),
            Some(Region::In)
        );
    }
}
