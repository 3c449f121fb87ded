//! Label synthesis and filtering
//!
//! Every generated object carries the canonical identity labels. Workload
//! selectors use a narrower, stable subset so a workload keeps matching its
//! pods when the name or version of the owning resource changes.
//!
//! # Filter pattern grammar
//!
//! A [`LabelFilter`] pattern is a literal label key that may contain `*`
//! wildcards. Each `*` matches any run of characters, including none. The
//! pattern must match the whole key and matching is case-sensitive. Examples:
//! `foo*`, `*.bar`, `app.*.bar`, `*`. There are no other metacharacters.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Label key for the component of the application
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Label key identifying the owning resource as `<namespace>.<name>`
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Label key for the tool managing the object
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label key for the application the object belongs to
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

/// Label key for the version of the component
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";

/// Label key for the name of the generated object
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Value of [`LABEL_MANAGED_BY`] on everything this operator generates
pub const MANAGED_BY_OPERATOR: &str = "opentelemetry-operator";

/// Value of [`LABEL_PART_OF`] on everything this operator generates
pub const PART_OF_OPENTELEMETRY: &str = "opentelemetry";

/// Value of [`LABEL_VERSION`] when the resource does not pin an image tag
pub const DEFAULT_VERSION: &str = "latest";

/// Label values are limited to 63 characters
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Label set type used across the crate
pub type LabelSet = BTreeMap<String, String>;

// =============================================================================
// Filters
// =============================================================================

/// A compiled label key exclusion pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelFilter {
    pattern: String,
    parts: Vec<String>,
}

impl LabelFilter {
    /// Compile a pattern; see the module docs for the grammar
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let parts = pattern.split('*').map(str::to_string).collect();
        Self { pattern, parts }
    }

    /// The pattern as written
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if `key` matches the whole pattern
    pub fn matches(&self, key: &str) -> bool {
        let (first, rest) = match self.parts.split_first() {
            Some(split) => split,
            None => return false,
        };
        let Some((last, middle)) = rest.split_last() else {
            return key == first;
        };

        if key.len() < first.len() + last.len()
            || !key.starts_with(first.as_str())
            || !key.ends_with(last.as_str())
        {
            return false;
        }

        // prefix and suffix are fixed, the middle segments float left to right
        let mut remaining = &key[first.len()..key.len() - last.len()];
        for segment in middle {
            match remaining.find(segment.as_str()) {
                Some(idx) => remaining = &remaining[idx + segment.len()..],
                None => return false,
            }
        }
        true
    }
}

impl std::fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Returns true if any filter matches `key`
pub fn is_filtered(key: &str, filters: &[LabelFilter]) -> bool {
    filters.iter().any(|f| f.matches(key))
}

/// Copy `labels` without the keys matched by `filters`
pub fn filter_labels(labels: &LabelSet, filters: &[LabelFilter]) -> LabelSet {
    labels
        .iter()
        .filter(|(k, _)| !is_filtered(k, filters))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// =============================================================================
// Synthesis
// =============================================================================

/// `<namespace>.<name>` of the owning resource, capped to a valid label value
pub fn instance(meta: &ObjectMeta) -> String {
    truncate_value(&format!(
        "{}.{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    ))
}

/// Cap a label value at 63 characters without a dangling separator
fn truncate_value(value: &str) -> String {
    let mut out: String = value.chars().take(MAX_LABEL_VALUE_LEN).collect();
    while out.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        out.pop();
    }
    out
}

/// Version taken from the tag of a pinned image
///
/// `registry:5000/otel/collector:0.88.0` yields `0.88.0`. Untagged images and
/// digests yield `None`.
pub fn version_from_image(image: &str) -> Option<String> {
    let repo = image.split('@').next().unwrap_or(image);
    let last_path = repo.rsplit('/').next().unwrap_or(repo);
    let (_, tag) = last_path.split_once(':')?;
    let tag = truncate_value(tag);
    if tag.is_empty() {
        return None;
    }
    Some(tag)
}

/// Identity labels of a generated object
///
/// User labels of the resource are copied first, minus the keys matched by
/// `filters`; the canonical keys are then written over them.
pub fn labels(
    meta: &ObjectMeta,
    component: &str,
    name: &str,
    image: Option<&str>,
    filters: &[LabelFilter],
) -> LabelSet {
    let mut out = meta
        .labels
        .as_ref()
        .map(|user| filter_labels(user, filters))
        .unwrap_or_default();

    out.extend(selector_labels(meta, component));
    out.insert(
        LABEL_VERSION.to_string(),
        image
            .and_then(version_from_image)
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    );
    out.insert(LABEL_NAME.to_string(), name.to_string());
    out
}

/// Selector labels of a workload
///
/// Excludes name and version, which may differ between a resource and the
/// resource that replaces it.
pub fn selector_labels(meta: &ObjectMeta, component: &str) -> LabelSet {
    let mut out = LabelSet::new();
    out.insert(LABEL_COMPONENT.to_string(), component.to_string());
    out.insert(LABEL_INSTANCE.to_string(), instance(meta));
    out.insert(
        LABEL_MANAGED_BY.to_string(),
        MANAGED_BY_OPERATOR.to_string(),
    );
    out.insert(
        LABEL_PART_OF.to_string(),
        PART_OF_OPENTELEMETRY.to_string(),
    );
    out
}

/// Returns true if every entry of `subset` is present with the same value in `superset`
pub fn is_subset(subset: &LabelSet, superset: &LabelSet) -> bool {
    subset.iter().all(|(k, v)| superset.get(k) == Some(v))
}
