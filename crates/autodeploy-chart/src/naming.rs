//! Resource name derivation
//!
//! The base name comes from the release (or its override) and is cut to the
//! DNS label bound. The raw release name is kept alongside it because labels
//! always carry the untruncated value.

use tracing::warn;

use crate::DNS_LABEL_MAX_LEN;

/// Suffix appended to the base name for the NetworkPolicy
const NETWORK_POLICY_SUFFIX: &str = "auto-deploy";

/// Cut `name` to its first [`DNS_LABEL_MAX_LEN`] characters.
///
/// No hashing and no trailing-dash cleanup: the same input always maps to the
/// same prefix.
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(DNS_LABEL_MAX_LEN) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}

/// Names derived from a release, computed once per render
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    base_name: String,
    release: String,
}

impl ResourceNames {
    /// Resolve the base name: a non-empty override wins over the release name,
    /// and the result is truncated.
    pub fn resolve(release: &str, name_override: Option<&str>) -> Self {
        let base = match name_override {
            Some(name) if !name.is_empty() => name,
            _ => release,
        };
        Self {
            base_name: truncate_name(base).to_string(),
            release: release.to_string(),
        }
    }

    /// Truncated base name
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Raw release name, never truncated
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Name of the web Deployment
    pub fn web(&self) -> String {
        self.base_name.clone()
    }

    /// Name of a worker Deployment: `<base>-<key>`.
    ///
    /// The suffix is appended after truncation and the result is not cut
    /// again, so a long key can push the name past the bound.
    pub fn worker(&self, key: &str) -> String {
        let name = format!("{}-{}", self.base_name, key);
        warn_if_overlong("worker", &name);
        name
    }

    /// Name of the NetworkPolicy: `<base>-auto-deploy`
    pub fn network_policy(&self) -> String {
        let name = format!("{}-{}", self.base_name, NETWORK_POLICY_SUFFIX);
        warn_if_overlong("network policy", &name);
        name
    }
}

fn warn_if_overlong(kind: &str, name: &str) {
    let len = name.chars().count();
    if len > DNS_LABEL_MAX_LEN {
        warn!(
            kind = %kind,
            name = %name,
            len,
            max = DNS_LABEL_MAX_LEN,
            "derived name exceeds DNS label length and will be rejected by Kubernetes"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_release() {
        let names = ResourceNames::resolve("production", Some("productionOverridden"));
        assert_eq!(names.base_name(), "productionOverridden");
        assert_eq!(names.release(), "production");
        assert_eq!(names.web(), "productionOverridden");
    }

    #[test]
    fn empty_override_falls_back_to_release() {
        let names = ResourceNames::resolve("production", Some(""));
        assert_eq!(names.base_name(), "production");

        let names = ResourceNames::resolve("production", None);
        assert_eq!(names.base_name(), "production");
    }

    #[test]
    fn long_release_is_truncated_but_label_value_is_not() {
        let release = "r".repeat(80);
        let names = ResourceNames::resolve(&release, None);
        assert_eq!(names.web(), "r".repeat(63));
        assert_eq!(names.release(), release);
    }

    #[test]
    fn long_override_is_truncated() {
        let names = ResourceNames::resolve("production", Some(&"o".repeat(70)));
        assert_eq!(names.base_name(), "o".repeat(63));
    }

    #[test]
    fn exactly_63_is_untouched() {
        let name = "a".repeat(63);
        assert_eq!(truncate_name(&name), name);
    }

    #[test]
    fn truncation_keeps_trailing_dash() {
        let name = format!("{}-tail", "a".repeat(62));
        assert_eq!(truncate_name(&name), format!("{}-", "a".repeat(62)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = "é".repeat(70);
        assert_eq!(truncate_name(&name).chars().count(), 63);
    }

    #[test]
    fn empty_release_yields_empty_base() {
        let names = ResourceNames::resolve("", None);
        assert_eq!(names.base_name(), "");
        assert_eq!(names.worker("w"), "-w");
    }

    #[test]
    fn worker_suffix_is_appended_after_truncation() {
        let names = ResourceNames::resolve(&"r".repeat(80), None);
        let worker = names.worker("worker1");
        assert_eq!(worker, format!("{}-worker1", "r".repeat(63)));
        assert_eq!(worker.len(), 71);
    }

    #[test]
    fn network_policy_name() {
        let names = ResourceNames::resolve("production", None);
        assert_eq!(names.network_policy(), "production-auto-deploy");
    }
}
