//! Deployment generation for the web process and each worker

use tracing::debug;

use crate::k8s::{
    Container, ContainerPort, Deployment, DeploymentSpec, DeploymentStrategy, EnvFromSource,
    HttpGetAction, LabelSelector, LocalObjectReference, ObjectMeta, PodMeta, PodSpec,
    PodTemplateSpec, Probe,
};
use crate::labels::{ChartIdentity, LabelContext, Tier};
use crate::naming::ResourceNames;
use crate::values::{ProbeValues, ReleaseValues, StrategyType, Worker};

/// Fallbacks for a probe's unset fields
struct ProbeDefaults {
    path: &'static str,
    initial_delay_seconds: i32,
    timeout_seconds: i32,
}

const LIVENESS_DEFAULTS: ProbeDefaults = ProbeDefaults {
    path: "/",
    initial_delay_seconds: 15,
    timeout_seconds: 15,
};

const READINESS_DEFAULTS: ProbeDefaults = ProbeDefaults {
    path: "/",
    initial_delay_seconds: 5,
    timeout_seconds: 3,
};

/// Builds the web Deployment and one Deployment per worker.
///
/// Every Deployment carries exactly one container named after the chart. The
/// selector equals the pod-template labels.
pub struct WorkloadGenerator<'a> {
    names: &'a ResourceNames,
    labels: &'a LabelContext,
    values: &'a ReleaseValues,
    chart: &'a ChartIdentity,
}

impl<'a> WorkloadGenerator<'a> {
    /// Create a generator over resolved names, label inputs and values
    pub fn new(
        names: &'a ResourceNames,
        labels: &'a LabelContext,
        values: &'a ReleaseValues,
        chart: &'a ChartIdentity,
    ) -> Self {
        Self {
            names,
            labels,
            values,
            chart,
        }
    }

    /// The web Deployment, named after the truncated base name
    pub fn generate_web(&self) -> Deployment {
        let values = self.values;
        let port = values.service.internal_port;

        let container = Container {
            ports: vec![ContainerPort {
                name: Some(values.service.name.clone()),
                container_port: port,
            }],
            liveness_probe: Some(http_probe(&values.liveness_probe, &LIVENESS_DEFAULTS, port)),
            readiness_probe: Some(http_probe(
                &values.readiness_probe,
                &READINESS_DEFAULTS,
                port,
            )),
            ..self.base_container()
        };

        let deployment = self.build_deployment(
            self.names.web(),
            Tier::Web,
            Some(values.replica_count),
            values.strategy_type,
            container,
        );
        debug!(name = %deployment.metadata.name, "generated web deployment");
        deployment
    }

    /// One Deployment per worker, in declaration order
    pub fn generate_workers(&self) -> Vec<Deployment> {
        self.values
            .workers
            .iter()
            .map(|worker| self.generate_worker(worker))
            .collect()
    }

    fn generate_worker(&self, worker: &Worker) -> Deployment {
        let container = Container {
            command: Some(worker.spec.command.clone()),
            ..self.base_container()
        };

        // Worker override, then the release-wide strategy, then platform default
        let strategy = worker.spec.strategy_type.or(self.values.strategy_type);

        let deployment = self.build_deployment(
            self.names.worker(&worker.name),
            Tier::Worker,
            worker.spec.replica_count,
            strategy,
            container,
        );
        debug!(
            worker = %worker.name,
            name = %deployment.metadata.name,
            strategy = ?strategy,
            "generated worker deployment"
        );
        deployment
    }

    /// Container fields shared by web and workers
    fn base_container(&self) -> Container {
        let values = self.values;
        Container {
            name: self.chart.name.clone(),
            image: values.image.reference(),
            image_pull_policy: Some(values.image.pull_policy.clone()),
            command: None,
            env_from: values
                .application
                .secret_name
                .iter()
                .filter(|name| !name.is_empty())
                .map(EnvFromSource::secret)
                .collect(),
            ports: Vec::new(),
            liveness_probe: None,
            readiness_probe: None,
            resources: values.resources.clone(),
        }
    }

    fn build_deployment(
        &self,
        name: String,
        tier: Tier,
        replicas: Option<u32>,
        strategy: Option<StrategyType>,
        container: Container,
    ) -> Deployment {
        let labels = self.labels.build(tier);

        let metadata = ObjectMeta::new(name)
            .with_labels(labels.resource_labels)
            .with_annotations(labels.resource_annotations);

        let spec = DeploymentSpec {
            replicas,
            selector: LabelSelector::from_labels(labels.template_labels.clone()),
            strategy: strategy.map(|s| DeploymentStrategy {
                type_: s.as_str().to_string(),
            }),
            template: PodTemplateSpec {
                metadata: PodMeta {
                    labels: labels.template_labels,
                    annotations: labels.template_annotations,
                },
                spec: PodSpec {
                    image_pull_secrets: self
                        .values
                        .image
                        .secrets
                        .iter()
                        .map(|s| LocalObjectReference {
                            name: s.name.clone(),
                        })
                        .collect(),
                    containers: vec![container],
                },
            },
        };

        Deployment::new(metadata, spec)
    }
}

fn http_probe(values: &ProbeValues, defaults: &ProbeDefaults, port: u16) -> Probe {
    Probe {
        http_get: HttpGetAction {
            path: values
                .path
                .clone()
                .unwrap_or_else(|| defaults.path.to_string()),
            port,
        },
        initial_delay_seconds: Some(
            values
                .initial_delay_seconds
                .unwrap_or(defaults.initial_delay_seconds),
        ),
        timeout_seconds: Some(values.timeout_seconds.unwrap_or(defaults.timeout_seconds)),
    }
}
