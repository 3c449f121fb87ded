//! Supporting types shared by the OpenTelemetry CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the operator treats a managed resource when the operator itself upgrades
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeStrategy {
    /// The operator migrates the resource to newer versions automatically
    #[default]
    Automatic,
    /// The resource is left untouched on operator upgrades
    None,
}

impl std::fmt::Display for UpgradeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Deployment mode of an OpenTelemetry collector
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Replicated pods behind a Deployment
    #[default]
    Deployment,
    /// One pod per node via a DaemonSet
    DaemonSet,
    /// Replicated pods with stable identity
    StatefulSet,
    /// Injected next to application containers
    Sidecar,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::DaemonSet => write!(f, "daemonset"),
            Self::StatefulSet => write!(f, "statefulset"),
            Self::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// Capabilities an OpAMP bridge advertises to its OpAMP server
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum OpAMPBridgeCapability {
    /// Accepts remote configuration from the server
    AcceptsRemoteConfig,
    /// Reports the effective configuration of managed collectors
    ReportsEffectiveConfig,
    /// Reports its own traces
    ReportsOwnTraces,
    /// Reports its own metrics
    ReportsOwnMetrics,
    /// Reports its own logs
    ReportsOwnLogs,
    /// Accepts OpAMP connection settings
    AcceptsOpAMPConnectionSettings,
    /// Accepts connection settings for other destinations
    AcceptsOtherConnectionSettings,
    /// Accepts restart commands
    AcceptsRestartCommand,
    /// Reports health of managed collectors
    ReportsHealth,
    /// Reports the status of applied remote configuration
    ReportsRemoteConfig,
}

/// Strategy the target allocator uses to spread scrape targets over collectors
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    /// Assign each target to the collector with the fewest targets
    #[default]
    LeastWeighted,
    /// Assign targets by consistent hashing of the target URL
    ConsistentHashing,
}

impl std::fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeastWeighted => write!(f, "least-weighted"),
            Self::ConsistentHashing => write!(f, "consistent-hashing"),
        }
    }
}
