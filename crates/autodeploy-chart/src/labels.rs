//! Label and annotation schema shared by every generated resource
//!
//! Each workload gets four maps: labels and annotations on the object itself,
//! and labels and annotations on its pod template. The key sets differ
//! between the two levels and between tiers:
//!
//! | map                  | web                                        | worker            |
//! |----------------------|--------------------------------------------|-------------------|
//! | resource labels      | app chart heritage release tier track      | same without app  |
//! | template labels      | app release tier track                     | same without app  |
//! | resource annotations | gitlab app/env                             | same              |
//! | template annotations | gitlab app/env + secrets checksum          | same              |

use std::collections::BTreeMap;

use crate::{CHART_NAME, CHART_VERSION, HERITAGE};

// =============================================================================
// Keys
// =============================================================================

/// Application label; the base name on workloads, the release on policies
pub const LABEL_APP: &str = "app";

/// Chart identity label (`<name>-<version>`)
pub const LABEL_CHART: &str = "chart";

/// Tool that produced the resource
pub const LABEL_HERITAGE: &str = "heritage";

/// Raw release name
pub const LABEL_RELEASE: &str = "release";

/// Process role (`web` or `worker`)
pub const LABEL_TIER: &str = "tier";

/// Rollout lane
pub const LABEL_TRACK: &str = "track";

/// GitLab project path
pub const ANNOTATION_GITLAB_APP: &str = "app.gitlab.com/app";

/// GitLab environment slug
pub const ANNOTATION_GITLAB_ENV: &str = "app.gitlab.com/env";

/// Checksum of the application secret; changing it rolls the pods
pub const ANNOTATION_SECRETS_CHECKSUM: &str = "checksum/application-secrets";

/// The only track this chart renders
pub const TRACK_STABLE: &str = "stable";

// =============================================================================
// Tier
// =============================================================================

/// Role of a workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// The primary process serving traffic
    Web,
    /// A background process
    Worker,
}

impl Tier {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Worker => "worker",
        }
    }

    /// Worker workloads are never tagged with `app`
    pub fn carries_app_label(&self) -> bool {
        matches!(self, Self::Web)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Chart identity
// =============================================================================

/// Chart name and version, rendered into the `chart` label
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartIdentity {
    /// Chart name; also the container name
    pub name: String,
    /// Chart version
    pub version: String,
}

impl ChartIdentity {
    /// Create an identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// `<name>-<version>`, with `+` replaced since it is not a valid label character
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.version).replace('+', "_")
    }
}

impl Default for ChartIdentity {
    fn default() -> Self {
        Self::new(CHART_NAME, CHART_VERSION)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// The four maps attached to a workload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLabels {
    /// Labels on the Deployment object
    pub resource_labels: BTreeMap<String, String>,
    /// Annotations on the Deployment object
    pub resource_annotations: BTreeMap<String, String>,
    /// Labels on the pod template (also the selector)
    pub template_labels: BTreeMap<String, String>,
    /// Annotations on the pod template
    pub template_annotations: BTreeMap<String, String>,
}

/// Inputs shared by every label map of a release
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelContext {
    base_name: String,
    release: String,
    chart: String,
    app_tag: Option<String>,
    env_tag: Option<String>,
    secret_checksum: String,
}

impl LabelContext {
    /// Create a context for a base name and raw release name
    pub fn new(
        base_name: impl Into<String>,
        release: impl Into<String>,
        chart: &ChartIdentity,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            release: release.into(),
            chart: chart.label(),
            app_tag: None,
            env_tag: None,
            secret_checksum: String::new(),
        }
    }

    /// Set the GitLab project tag
    pub fn with_app_tag(mut self, tag: Option<String>) -> Self {
        self.app_tag = tag;
        self
    }

    /// Set the GitLab environment tag
    pub fn with_env_tag(mut self, tag: Option<String>) -> Self {
        self.env_tag = tag;
        self
    }

    /// Set the application secret checksum (may be empty)
    pub fn with_secret_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.secret_checksum = checksum.into();
        self
    }

    /// Build the label and annotation maps for a workload tier
    pub fn build(&self, tier: Tier) -> ResourceLabels {
        let mut template_labels = BTreeMap::new();
        if tier.carries_app_label() {
            template_labels.insert(LABEL_APP.to_string(), self.base_name.clone());
        }
        template_labels.insert(LABEL_RELEASE.to_string(), self.release.clone());
        template_labels.insert(LABEL_TIER.to_string(), tier.as_str().to_string());
        template_labels.insert(LABEL_TRACK.to_string(), TRACK_STABLE.to_string());

        let mut resource_labels = template_labels.clone();
        resource_labels.insert(LABEL_CHART.to_string(), self.chart.clone());
        resource_labels.insert(LABEL_HERITAGE.to_string(), HERITAGE.to_string());

        let resource_annotations = self.gitlab_annotations();
        let mut template_annotations = resource_annotations.clone();
        template_annotations.insert(
            ANNOTATION_SECRETS_CHECKSUM.to_string(),
            self.secret_checksum.clone(),
        );

        ResourceLabels {
            resource_labels,
            resource_annotations,
            template_labels,
            template_annotations,
        }
    }

    /// Labels for the NetworkPolicy: `app` is the release, not the base name
    pub fn policy_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_APP.to_string(), self.release.clone()),
            (LABEL_CHART.to_string(), self.chart.clone()),
            (LABEL_RELEASE.to_string(), self.release.clone()),
            (LABEL_HERITAGE.to_string(), HERITAGE.to_string()),
        ])
    }

    /// Both GitLab keys are always present; an unset tag renders as ""
    fn gitlab_annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                ANNOTATION_GITLAB_APP.to_string(),
                self.app_tag.clone().unwrap_or_default(),
            ),
            (
                ANNOTATION_GITLAB_ENV.to_string(),
                self.env_tag.clone().unwrap_or_default(),
            ),
        ])
    }
}
