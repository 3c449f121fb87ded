//! Annotation synthesis helpers
//!
//! Checksums of dependent configuration are written as annotations so that a
//! change to the configuration changes the pod template and rolls the pods.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};

/// Annotation set type used across the crate
pub type AnnotationSet = BTreeMap<String, String>;

/// Hex SHA-256 of a string
pub fn sha256_hex(data: &str) -> String {
    sha256_hex_bytes(data.as_bytes())
}

fn sha256_hex_bytes(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Checksum of the data held by a ConfigMap
///
/// Keys are visited in sorted order so the checksum only changes when the
/// content does.
pub fn config_map_hash(config_map: &ConfigMap) -> String {
    let mut data = String::new();
    if let Some(entries) = &config_map.data {
        for (k, v) in entries {
            data.push_str(k);
            data.push('=');
            data.push_str(v);
            data.push('\n');
        }
    }
    if let Some(entries) = &config_map.binary_data {
        for (k, v) in entries {
            data.push_str("binary:");
            data.push_str(k);
            data.push('=');
            data.push_str(&sha256_hex_bytes(&v.0));
            data.push('\n');
        }
    }
    sha256_hex(&data)
}

/// Copy of the resource's own annotations
pub fn resource_annotations(meta: &ObjectMeta) -> AnnotationSet {
    meta.annotations.clone().unwrap_or_default()
}

/// Insert `key` with the checksum of `config_map`, if there is one
pub fn insert_config_map_hash(
    annotations: &mut AnnotationSet,
    key: &str,
    config_map: Option<&ConfigMap>,
) {
    if let Some(cm) = config_map {
        annotations.insert(key.to_string(), config_map_hash(cm));
    }
}
