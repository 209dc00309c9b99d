//! NetworkPolicy generation
//!
//! The policy mode is resolved once from values:
//!
//! - `Disabled`: feature flag unset or false; nothing is generated
//! - `Default`: flag set, no rule fields supplied; namespace-local ingress
//!   plus ingress from GitLab-managed namespaces
//! - `Custom`: flag set and at least one rule field supplied; supplied fields
//!   replace the matching default fields verbatim

use std::collections::BTreeMap;

use tracing::debug;

use crate::k8s::{
    LabelSelector, NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
    ObjectMeta,
};
use crate::labels::LabelContext;
use crate::naming::ResourceNames;
use crate::values::{NetworkPolicySpecOverlay, NetworkPolicyValues};

/// Namespace label marking namespaces managed by GitLab
pub const MANAGED_BY_LABEL: &str = "app.gitlab.com/managed_by";

/// Value of [`MANAGED_BY_LABEL`] admitted by the default rule
pub const MANAGED_BY_GITLAB: &str = "gitlab";

/// Which NetworkPolicy branch runs
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkPolicyMode {
    /// No policy
    Disabled,
    /// Generated default rule set
    Default,
    /// Default rule set with user-supplied fields replacing their defaults
    Custom(NetworkPolicySpecOverlay),
}

impl NetworkPolicyMode {
    /// Resolve the mode from values
    pub fn resolve(values: &NetworkPolicyValues) -> Self {
        if !values.enabled {
            return Self::Disabled;
        }
        match &values.spec {
            Some(overlay) if overlay.has_rules() => Self::Custom(overlay.clone()),
            _ => Self::Default,
        }
    }

    /// Mode name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Default => "default",
            Self::Custom(_) => "custom",
        }
    }
}

/// Builds zero or one NetworkPolicy for a release
pub struct NetworkPolicyGenerator<'a> {
    names: &'a ResourceNames,
    labels: &'a LabelContext,
}

impl<'a> NetworkPolicyGenerator<'a> {
    /// Create a generator over resolved names and label inputs
    pub fn new(names: &'a ResourceNames, labels: &'a LabelContext) -> Self {
        Self { names, labels }
    }

    /// Generate the policy for `mode`; `None` when disabled
    pub fn generate(&self, mode: &NetworkPolicyMode) -> Option<NetworkPolicy> {
        let spec = match mode {
            NetworkPolicyMode::Disabled => {
                debug!("network policy disabled");
                return None;
            }
            NetworkPolicyMode::Default => Self::default_spec(),
            NetworkPolicyMode::Custom(overlay) => Self::apply_overlay(overlay),
        };

        let metadata =
            ObjectMeta::new(self.names.network_policy()).with_labels(self.labels.policy_labels());

        debug!(
            name = %metadata.name,
            mode = mode.as_str(),
            "generated network policy"
        );
        Some(NetworkPolicy::new(metadata, spec))
    }

    /// Default rules: all pods selected, ingress from the same namespace and
    /// from GitLab-managed namespaces, no egress and no explicit policy types
    pub fn default_spec() -> NetworkPolicySpec {
        let managed_namespaces = LabelSelector::from_labels(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_GITLAB.to_string(),
        )]));

        NetworkPolicySpec {
            pod_selector: LabelSelector::everything(),
            policy_types: None,
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: vec![
                    NetworkPolicyPeer::pods(LabelSelector::everything()),
                    NetworkPolicyPeer::namespaces(managed_namespaces),
                ],
                ports: Vec::new(),
            }]),
            egress: None,
        }
    }

    fn apply_overlay(overlay: &NetworkPolicySpecOverlay) -> NetworkPolicySpec {
        let mut spec = Self::default_spec();
        if let Some(selector) = &overlay.pod_selector {
            spec.pod_selector = selector.clone();
        }
        if let Some(policy_types) = &overlay.policy_types {
            spec.policy_types = Some(policy_types.clone());
        }
        if let Some(ingress) = &overlay.ingress {
            spec.ingress = Some(ingress.clone());
        }
        if let Some(egress) = &overlay.egress {
            spec.egress = Some(egress.clone());
        }
        spec
    }
}
