//! Process-wide operator configuration
//!
//! A [`Config`] is built once at startup and shared behind an `Arc`. It is
//! never mutated afterwards, so compilers running on different resources can
//! read it concurrently without locking.

use crate::labels::LabelFilter;

/// Default collector image
pub const DEFAULT_COLLECTOR_IMAGE: &str = "otel/opentelemetry-collector:0.88.0";

/// Default target allocator image
pub const DEFAULT_TARGET_ALLOCATOR_IMAGE: &str =
    "ghcr.io/open-telemetry/opentelemetry-operator/target-allocator:0.88.0";

/// Default OpAMP bridge image
pub const DEFAULT_OPAMP_BRIDGE_IMAGE: &str =
    "ghcr.io/open-telemetry/opentelemetry-operator/operator-opamp-bridge:0.88.0";

/// Read-only configuration shared by all compilers
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    label_filters: Vec<LabelFilter>,
    collector_image: String,
    target_allocator_image: String,
    opamp_bridge_image: String,
}

impl Config {
    /// Configuration with default images and no label filters
    pub fn new() -> Self {
        Self {
            label_filters: Vec::new(),
            collector_image: DEFAULT_COLLECTOR_IMAGE.to_string(),
            target_allocator_image: DEFAULT_TARGET_ALLOCATOR_IMAGE.to_string(),
            opamp_bridge_image: DEFAULT_OPAMP_BRIDGE_IMAGE.to_string(),
        }
    }

    /// Exclude user labels matching these patterns from generated objects
    ///
    /// Empty patterns are ignored.
    pub fn with_label_filters<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.label_filters = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(LabelFilter::new)
            .collect();
        self
    }

    /// Set the collector image used when a resource does not pin one
    pub fn with_collector_image(mut self, image: impl Into<String>) -> Self {
        self.collector_image = image.into();
        self
    }

    /// Set the target allocator image used when a resource does not pin one
    pub fn with_target_allocator_image(mut self, image: impl Into<String>) -> Self {
        self.target_allocator_image = image.into();
        self
    }

    /// Set the OpAMP bridge image used when a resource does not pin one
    pub fn with_opamp_bridge_image(mut self, image: impl Into<String>) -> Self {
        self.opamp_bridge_image = image.into();
        self
    }

    /// Compiled label filters
    pub fn label_filters(&self) -> &[LabelFilter] {
        &self.label_filters
    }

    /// Default collector image
    pub fn collector_image(&self) -> &str {
        &self.collector_image
    }

    /// Default target allocator image
    pub fn target_allocator_image(&self) -> &str {
        &self.target_allocator_image
    }

    /// Default OpAMP bridge image
    pub fn opamp_bridge_image(&self) -> &str {
        &self.opamp_bridge_image
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
