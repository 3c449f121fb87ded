//! Names of generated objects, containers and volumes
//!
//! Object names are DNS labels, so every derived name is capped at 63
//! characters by shortening the resource name, never the suffix.

/// Maximum length of a DNS-1123 label
const MAX_NAME_LEN: usize = 63;

/// Container name of the managed collector container
pub const COLLECTOR_CONTAINER: &str = "otc-container";

/// Container name of the managed target allocator container
pub const TARGET_ALLOCATOR_CONTAINER: &str = "ta-container";

/// Container name of the managed OpAMP bridge container
pub const OPAMP_BRIDGE_CONTAINER: &str = "opamp-bridge-container";

/// Volume holding the collector configuration
pub const COLLECTOR_CONFIG_VOLUME: &str = "otc-internal";

/// Volume holding the target allocator configuration
pub const TARGET_ALLOCATOR_CONFIG_VOLUME: &str = "ta-internal";

/// Volume holding the OpAMP bridge configuration
pub const OPAMP_BRIDGE_CONFIG_VOLUME: &str = "opamp-bridge-internal";

/// Append `suffix` to `name`, shortening `name` so the result fits a DNS label
fn with_suffix(name: &str, suffix: &str) -> String {
    let budget = MAX_NAME_LEN.saturating_sub(suffix.len());
    let mut base: String = name.chars().take(budget).collect();
    while base.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        base.pop();
    }
    format!("{base}{suffix}")
}

/// Workload name of a collector
pub fn collector(name: &str) -> String {
    with_suffix(name, "-collector")
}

/// ConfigMap name holding a collector configuration
pub fn collector_config_map(name: &str) -> String {
    with_suffix(name, "-collector")
}

/// Generated service account name of a collector
pub fn collector_service_account(name: &str) -> String {
    with_suffix(name, "-collector")
}

/// Workload name of a target allocator
pub fn target_allocator(name: &str) -> String {
    with_suffix(name, "-targetallocator")
}

/// ConfigMap name holding a target allocator configuration
pub fn target_allocator_config_map(name: &str) -> String {
    with_suffix(name, "-targetallocator")
}

/// Generated service account name of a target allocator
pub fn target_allocator_service_account(name: &str) -> String {
    with_suffix(name, "-targetallocator")
}

/// Workload name of an OpAMP bridge
pub fn opamp_bridge(name: &str) -> String {
    with_suffix(name, "-opamp-bridge")
}

/// ConfigMap name holding an OpAMP bridge configuration
pub fn opamp_bridge_config_map(name: &str) -> String {
    with_suffix(name, "-opamp-bridge")
}

/// Generated service account name of an OpAMP bridge
pub fn opamp_bridge_service_account(name: &str) -> String {
    with_suffix(name, "-opamp-bridge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_component_suffix() {
        assert_eq!(collector("simplest"), "simplest-collector");
        assert_eq!(target_allocator("simplest"), "simplest-targetallocator");
        assert_eq!(opamp_bridge("my-instance"), "my-instance-opamp-bridge");
    }

    #[test]
    fn long_names_are_truncated_to_dns_label() {
        let long = "a".repeat(80);
        let name = opamp_bridge(&long);
        assert_eq!(name.len(), 63);
        assert!(name.ends_with("-opamp-bridge"));
    }

    #[test]
    fn truncation_does_not_leave_dangling_separator() {
        // the 53 character budget ends on the hyphen
        let name = format!("{}-{}", "a".repeat(52), "b".repeat(20));
        let out = collector(&name);
        assert!(out.len() <= 63);
        assert!(!out.contains("--"));
        assert!(out.ends_with("a-collector"));
    }
}
