//! Manifest assembly: runs the generators for a release and serializes the result

use serde::Serialize;
use tracing::debug;

use crate::k8s::{Deployment, NetworkPolicy, ObjectMeta};
use crate::labels::{ChartIdentity, LabelContext};
use crate::naming::ResourceNames;
use crate::network_policy::{NetworkPolicyGenerator, NetworkPolicyMode};
use crate::values::ReleaseValues;
use crate::workload::WorkloadGenerator;
use crate::{ChartError, Result};

/// A generated Kubernetes object
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum GeneratedResource {
    /// Web or worker Deployment
    Deployment(Deployment),
    /// Release NetworkPolicy
    NetworkPolicy(NetworkPolicy),
}

impl GeneratedResource {
    /// Resource kind
    pub fn kind(&self) -> &str {
        match self {
            Self::Deployment(d) => &d.kind,
            Self::NetworkPolicy(p) => &p.kind,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Deployment(d) => &d.metadata,
            Self::NetworkPolicy(p) => &p.metadata,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.metadata().name
    }
}

impl From<Deployment> for GeneratedResource {
    fn from(deployment: Deployment) -> Self {
        Self::Deployment(deployment)
    }
}

impl From<NetworkPolicy> for GeneratedResource {
    fn from(policy: NetworkPolicy) -> Self {
        Self::NetworkPolicy(policy)
    }
}

/// Everything rendered for one release
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestSet {
    /// Web Deployment
    pub web: Deployment,
    /// Worker Deployments in declaration order
    pub workers: Vec<Deployment>,
    /// NetworkPolicy, absent when disabled
    pub network_policy: Option<NetworkPolicy>,
}

impl ManifestSet {
    /// Resources in emission order: web, workers, network policy
    pub fn resources(&self) -> Vec<GeneratedResource> {
        std::iter::once(self.web.clone())
            .chain(self.workers.iter().cloned())
            .map(GeneratedResource::from)
            .chain(self.network_policy.clone().map(GeneratedResource::from))
            .collect()
    }

    /// Multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        to_yaml_stream(&self.resources())
    }

    /// Pretty-printed JSON array
    pub fn to_json(&self) -> Result<String> {
        to_json_array(&self.resources())
    }
}

/// Render resources as `---` separated YAML documents
pub fn to_yaml_stream(resources: &[GeneratedResource]) -> Result<String> {
    let mut out = String::new();
    for resource in resources {
        let doc = serde_yaml::to_string(resource)
            .map_err(|e| ChartError::serialization("yaml", e.to_string()))?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

/// Render resources as a pretty-printed JSON array
pub fn to_json_array(resources: &[GeneratedResource]) -> Result<String> {
    serde_json::to_string_pretty(resources)
        .map_err(|e| ChartError::serialization("json", e.to_string()))
}

/// Renders a release from its values.
///
/// ```rust,ignore
/// let manifests = ChartRenderer::new("production", &values)
///     .with_chart(ChartIdentity::new("auto-deploy-app", "0.4.1"))
///     .render();
/// ```
pub struct ChartRenderer<'a> {
    release: String,
    values: &'a ReleaseValues,
    chart: ChartIdentity,
}

impl<'a> ChartRenderer<'a> {
    /// Create a renderer for a release with the default chart identity
    pub fn new(release: impl Into<String>, values: &'a ReleaseValues) -> Self {
        Self {
            release: release.into(),
            values,
            chart: ChartIdentity::default(),
        }
    }

    /// Override the chart identity
    pub fn with_chart(mut self, chart: ChartIdentity) -> Self {
        self.chart = chart;
        self
    }

    /// Generate every resource for the release
    pub fn render(&self) -> ManifestSet {
        let values = self.values;
        let names = ResourceNames::resolve(&self.release, values.release_override.as_deref());
        let labels = LabelContext::new(names.base_name(), names.release(), &self.chart)
            .with_app_tag(values.gitlab.app.clone())
            .with_env_tag(values.gitlab.env.clone())
            .with_secret_checksum(values.application.secret_checksum.clone());

        debug!(
            release = %names.release(),
            base_name = %names.base_name(),
            workers = values.workers.len(),
            "rendering release"
        );

        let workloads = WorkloadGenerator::new(&names, &labels, values, &self.chart);
        let mode = NetworkPolicyMode::resolve(&values.network_policy);

        ManifestSet {
            web: workloads.generate_web(),
            workers: workloads.generate_workers(),
            network_policy: NetworkPolicyGenerator::new(&names, &labels).generate(&mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::ValuesLoader;

    fn render(release: &str, yaml: &str) -> ManifestSet {
        let values = ValuesLoader::new()
            .with_yaml(yaml)
            .unwrap()
            .build()
            .unwrap();
        ChartRenderer::new(release, &values).render()
    }

    const FULL: &str = r#"
gitlab:
  app: group/project
  env: prod
workers:
  worker1:
    command: [echo, worker1]
  worker2:
    command: [echo, worker2]
networkPolicy:
  enabled: true
"#;

    #[test]
    fn resources_are_in_emission_order() {
        let set = render("production", FULL);
        let summary: Vec<_> = set
            .resources()
            .iter()
            .map(|r| (r.kind().to_string(), r.name().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Deployment".to_string(), "production".to_string()),
                ("Deployment".to_string(), "production-worker1".to_string()),
                ("Deployment".to_string(), "production-worker2".to_string()),
                ("NetworkPolicy".to_string(), "production-auto-deploy".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_render_only_web() {
        let set = render("production", "");
        assert_eq!(set.resources().len(), 1);
        assert!(set.network_policy.is_none());
    }

    #[test]
    fn annotation_keys_present_without_gitlab_tags() {
        let set = render("production", "");
        for key in ["app.gitlab.com/app", "app.gitlab.com/env"] {
            assert_eq!(set.web.metadata.annotations.get(key), Some(&String::new()));
            assert_eq!(
                set.web.spec.template.metadata.annotations.get(key),
                Some(&String::new())
            );
        }
    }

    #[test]
    fn gitlab_tags_flow_into_annotations() {
        let set = render("production", FULL);
        assert_eq!(
            set.web.metadata.annotations.get("app.gitlab.com/app"),
            Some(&"group/project".to_string())
        );
        assert_eq!(
            set.workers[1]
                .spec
                .template
                .metadata
                .annotations
                .get("checksum/application-secrets"),
            Some(&String::new())
        );
    }

    #[test]
    fn custom_chart_identity() {
        let values = ReleaseValues::default();
        let set = ChartRenderer::new("production", &values)
            .with_chart(ChartIdentity::new("my-chart", "1.0.0+abc"))
            .render();
        assert_eq!(
            set.web.metadata.labels.get("chart"),
            Some(&"my-chart-1.0.0_abc".to_string())
        );
        assert_eq!(set.web.spec.template.spec.containers[0].name, "my-chart");
    }

    #[test]
    fn yaml_stream_has_one_document_per_resource() {
        let set = render("production", FULL);
        let yaml = set.to_yaml().unwrap();
        assert_eq!(yaml.matches("---\n").count(), 4);

        let docs: Vec<serde_yaml::Value> = yaml
            .split("---\n")
            .filter(|d| !d.trim().is_empty())
            .map(|d| serde_yaml::from_str(d).unwrap())
            .collect();
        assert_eq!(docs[0]["kind"], serde_yaml::Value::from("Deployment"));
        assert_eq!(docs[0]["apiVersion"], serde_yaml::Value::from("apps/v1"));
        assert_eq!(docs[3]["kind"], serde_yaml::Value::from("NetworkPolicy"));
        assert_eq!(
            docs[3]["spec"]["podSelector"]["matchLabels"],
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        );
    }

    #[test]
    fn json_is_an_array() {
        let set = render("production", FULL);
        let json: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[1]["metadata"]["name"], "production-worker1");
        assert_eq!(
            items[1]["spec"]["template"]["spec"]["containers"][0]["command"],
            serde_json::json!(["echo", "worker1"])
        );
        assert!(items[1]["metadata"]["labels"].get("app").is_none());
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render("production", FULL).to_yaml().unwrap();
        let b = render("production", FULL).to_yaml().unwrap();
        assert_eq!(a, b);
    }
}
