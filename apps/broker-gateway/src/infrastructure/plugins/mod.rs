//! Plugin Directory
//!
//! Filesystem side of plugin discovery. Every broker plugin owns a
//! sub-directory of the plugin root, optionally holding a `plugin.json`
//! metadata file:
//!
//! ```json
//! { "enabled": false, "region": "IN" }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::application::ports::DescriptorSource;
use crate::application::services::PluginCatalog;
use crate::domain::plugin::{BrokerId, BrokerPluginDescriptor, DescriptorLookup, Region};
use crate::infrastructure::config::ConfigError;

/// Name of the metadata file inside a plugin directory.
pub const METADATA_FILE: &str = "plugin.json";

/// On-disk metadata shape.
#[derive(Debug, Deserialize)]
struct PluginMetadata {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    region: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

const fn default_enabled() -> bool {
    true
}

/// Reads `<root>/<broker>/plugin.json`.
#[derive(Debug, Clone)]
pub struct FsDescriptorSource {
    root: PathBuf,
}

impl FsDescriptorSource {
    /// Create a source rooted at the plugin directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Plugin root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata path for a broker.
    #[must_use]
    pub fn metadata_path(&self, broker: &BrokerId) -> PathBuf {
        self.root.join(broker.as_str()).join(METADATA_FILE)
    }

    fn read(&self, broker: &BrokerId) -> Result<Option<BrokerPluginDescriptor>, ConfigError> {
        let path = self.metadata_path(broker);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::MetadataUnreadable {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let metadata: PluginMetadata =
            serde_json::from_str(&raw).map_err(|e| ConfigError::MetadataMalformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut descriptor = BrokerPluginDescriptor::new(broker.clone())
            .enabled(metadata.enabled)
            .region(Region::parse(&metadata.region));
        descriptor.display_name = metadata.display_name;
        descriptor.version = metadata.version;
        Ok(Some(descriptor))
    }
}

impl DescriptorSource for FsDescriptorSource {
    fn lookup(&self, broker: &BrokerId) -> DescriptorLookup {
        match self.read(broker) {
            Ok(Some(descriptor)) => DescriptorLookup::Found(descriptor),
            Ok(None) => DescriptorLookup::Missing,
            Err(error) => DescriptorLookup::Malformed {
                reason: error.to_string(),
            },
        }
    }
}

/// Candidate plugin names under `root`, sorted.
///
/// Hidden entries and entries starting with `_` are skipped. When the root
/// cannot be listed the catalog's identifiers are used instead.
#[must_use]
pub fn discover_candidates(root: &Path, catalog: &PluginCatalog) -> Vec<String> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(
                root = %root.display(),
                error = %error,
                "Plugin directory unavailable, using compiled-in plugins"
            );
            return catalog.identifiers().map(ToString::to_string).collect();
        }
    };

    let mut candidates: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.') && !name.starts_with('_'))
        .collect();
    candidates.sort();

    tracing::debug!(root = %root.display(), count = candidates.len(), "Discovered plugin candidates");
    candidates
}
