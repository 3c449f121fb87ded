//! OpAMPBridge admission
//!
//! Defaulting and validation of OpAMPBridge resources, composed into an
//! [`AdmissionPipeline`] that always defaults before it validates.

use k8s_openapi::api::core::v1::ServicePort;
use kube::core::admission::Operation;
use tracing::{debug, info};

use crate::crd::{OpAMPBridge, UpgradeStrategy};
use crate::labels::{LABEL_MANAGED_BY, MANAGED_BY_OPERATOR};
use crate::{Error, Result};

/// Maximum length of an IANA service name
const MAX_PORT_NAME_LEN: usize = 15;

fn name_of(bridge: &OpAMPBridge) -> &str {
    bridge.metadata.name.as_deref().unwrap_or_default()
}

// =============================================================================
// Defaulting
// =============================================================================

/// Fill in unset fields of a bridge
///
/// Sets the upgrade strategy to automatic, the managed-by label to the
/// operator when it is missing or empty, and replicas to 1. Fields the user
/// set are left alone, so applying this twice changes nothing.
pub fn default(bridge: &mut OpAMPBridge) {
    info!(name = name_of(bridge), "default");

    if bridge.spec.upgrade_strategy.is_none() {
        bridge.spec.upgrade_strategy = Some(UpgradeStrategy::Automatic);
    }

    let labels = bridge.metadata.labels.get_or_insert_with(Default::default);
    if labels.get(LABEL_MANAGED_BY).map_or(true, |v| v.is_empty()) {
        labels.insert(
            LABEL_MANAGED_BY.to_string(),
            MANAGED_BY_OPERATOR.to_string(),
        );
    }

    if bridge.spec.replicas.is_none() {
        bridge.spec.replicas = Some(1);
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a bridge about to be created
///
/// Checks run in order and stop at the first failure.
pub fn validate_create(bridge: &OpAMPBridge) -> Result<()> {
    info!(name = name_of(bridge), "validate create");
    let spec = &bridge.spec;

    if spec.endpoint.trim().is_empty() {
        return Err(Error::validation(
            "the OpAMP server endpoint is not specified",
        ));
    }

    if spec.protocol.trim().is_empty() {
        return Err(Error::validation(
            "the transport for OpAMP server protocol is not specified",
        ));
    }

    if spec.capabilities.is_empty() {
        return Err(Error::validation(
            "the capabilities supported by OpAMP Bridge are not specified",
        ));
    }

    for port in &spec.ports {
        validate_port(port)?;
    }
    Ok(())
}

/// Validate an update to an existing bridge
///
/// Spec changes on update are not restricted.
pub fn validate_update(_old: &OpAMPBridge, new: &OpAMPBridge) -> Result<()> {
    info!(name = name_of(new), "validate update");
    Ok(())
}

/// Validate the deletion of a bridge
pub fn validate_delete(bridge: &OpAMPBridge) -> Result<()> {
    info!(name = name_of(bridge), "validate delete");
    Ok(())
}

fn validate_port(port: &ServicePort) -> Result<()> {
    let name = port.name.as_deref().unwrap_or_default();
    let name_errs = validate_port_name(name);
    let num_errs = validate_port_number(port.port);
    if name_errs.is_empty() && num_errs.is_empty() {
        return Ok(());
    }
    Err(Error::validation(format!(
        "the OpAMPBridge Spec Ports configuration is incorrect, port name '{}' errors: [{}], num '{}' errors: [{}]",
        name,
        name_errs.join(", "),
        port.port,
        num_errs.join(", "),
    )))
}

/// Problems with a port name under the IANA service name rules
///
/// An empty list means the name is valid.
pub fn validate_port_name(name: &str) -> Vec<&'static str> {
    let mut errs = Vec::new();
    if name.len() > MAX_PORT_NAME_LEN {
        errs.push("must be no more than 15 characters");
    }
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        errs.push("must contain only alpha-numeric characters (a-z, 0-9), and hyphens (-)");
    }
    if !name.chars().any(|c| c.is_ascii_lowercase()) {
        errs.push("must contain at least one letter (a-z)");
    }
    if name.contains("--") {
        errs.push("must not contain consecutive hyphens");
    }
    if name.starts_with('-') || name.ends_with('-') {
        errs.push("must not begin or end with a hyphen");
    }
    errs
}

/// Problems with a port number
///
/// An empty list means the number is valid.
pub fn validate_port_number(port: i32) -> Vec<&'static str> {
    if (1..=65535).contains(&port) {
        Vec::new()
    } else {
        vec!["must be between 1 and 65535, inclusive"]
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A step of admission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionStage {
    /// Fill in unset fields
    Default,
    /// Reject invalid resources
    Validate,
}

impl std::fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Validate => write!(f, "validate"),
        }
    }
}

/// Ordered admission stages
///
/// The default pipeline defaults first and validates second, so validation
/// always sees the object as it will be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionPipeline {
    stages: Vec<AdmissionStage>,
}

impl Default for AdmissionPipeline {
    fn default() -> Self {
        Self {
            stages: vec![AdmissionStage::Default, AdmissionStage::Validate],
        }
    }
}

impl AdmissionPipeline {
    /// Pipeline running only the defaulting stage
    pub fn mutating() -> Self {
        Self {
            stages: vec![AdmissionStage::Default],
        }
    }

    /// Pipeline running only the validation stage
    pub fn validating() -> Self {
        Self {
            stages: vec![AdmissionStage::Validate],
        }
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[AdmissionStage] {
        &self.stages
    }

    /// Run every stage against `new`
    ///
    /// `old` is the stored object for updates. Deletes are validated against
    /// `new` unchanged, since there is nothing to default. Returns the
    /// admitted object or the first rejection.
    pub fn admit(
        &self,
        op: &Operation,
        old: Option<&OpAMPBridge>,
        mut new: OpAMPBridge,
    ) -> Result<OpAMPBridge> {
        for stage in &self.stages {
            debug!(name = name_of(&new), %stage, ?op, "admission stage");
            match stage {
                AdmissionStage::Default => {
                    if !matches!(op, Operation::Delete) {
                        default(&mut new);
                    }
                }
                AdmissionStage::Validate => validate(op, old, &new)?,
            }
        }
        Ok(new)
    }
}

fn validate(op: &Operation, old: Option<&OpAMPBridge>, new: &OpAMPBridge) -> Result<()> {
    match (op, old) {
        (Operation::Create, _) | (Operation::Update, None) => validate_create(new),
        (Operation::Update, Some(old)) => validate_update(old, new),
        (Operation::Delete, _) => validate_delete(new),
        (Operation::Connect, _) => Ok(()),
    }
}
