//! Custom Resource Definitions for the OpenTelemetry operator
//!
//! The compilers in [`crate::manifests`] and the admission hooks in
//! [`crate::webhook`] treat these types as their input schema.

mod collector;
mod opamp_bridge;
mod types;

pub use collector::{
    OpenTelemetryCollector, OpenTelemetryCollectorSpec, OpenTelemetryCollectorStatus,
    PrometheusCrSpec, TargetAllocatorEmbedded,
};
pub use opamp_bridge::{OpAMPBridge, OpAMPBridgeSpec, OpAMPBridgeStatus};
pub use types::{AllocationStrategy, Mode, OpAMPBridgeCapability, UpgradeStrategy};
