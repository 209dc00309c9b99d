//! Release values: the configuration tree a release is rendered from
//!
//! Values are composed in layers, lowest precedence first:
//! 1. Defaults baked into the serde model
//! 2. YAML documents (deep-merged, mappings key by key)
//! 3. `path=value` assignments (`--set` / `--set-string`)
//!
//! Worker declaration order survives every layer: YAML mappings keep
//! insertion order and [`Workers`] stores an explicit ordered list.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::k8s::{
    LabelSelector, NetworkPolicyEgressRule, NetworkPolicyIngressRule, PolicyType,
    ResourceRequirements,
};
use crate::{ChartError, Result};

/// Largest list index accepted in a key path
const MAX_LIST_INDEX: usize = 65_536;

// =============================================================================
// Strategy type
// =============================================================================

/// Deployment rollout strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StrategyType {
    /// Replace pods gradually
    RollingUpdate,
    /// Kill all pods before creating new ones
    Recreate,
}

impl StrategyType {
    /// Kubernetes spelling of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RollingUpdate => "RollingUpdate",
            Self::Recreate => "Recreate",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RollingUpdate" => Ok(Self::RollingUpdate),
            "Recreate" => Ok(Self::Recreate),
            other => Err(format!(
                "unknown strategy type '{}': expected RollingUpdate or Recreate",
                other
            )),
        }
    }
}

/// Deserialize an optional strategy where the empty string means unset
fn optional_strategy<'de, D>(deserializer: D) -> std::result::Result<Option<StrategyType>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(de::Error::custom),
    }
}

// =============================================================================
// Scalar strings
// =============================================================================

/// A YAML scalar read as text.
///
/// `--set` turns `3600` into an integer; string-typed fields take it back as
/// its literal digits.
struct ScalarString(String);

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = ScalarString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<ScalarString, E> {
                Ok(ScalarString(v.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    ScalarString::deserialize(deserializer).map(|s| s.0)
}

fn optional_scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ScalarString>::deserialize(deserializer)?.map(|s| s.0))
}

fn scalar_string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<ScalarString>>::deserialize(deserializer)?;
    Ok(items.into_iter().flatten().map(|s| s.0).collect())
}

// =============================================================================
// Values model
// =============================================================================

/// Complete values tree for a release
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseValues {
    /// Replaces the release name as the resource base name
    #[serde(
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_override: Option<String>,
    /// Web Deployment replicas
    pub replica_count: u32,
    /// Rollout strategy for the web Deployment and workers without an override
    #[serde(
        deserialize_with = "optional_strategy",
        skip_serializing_if = "Option::is_none"
    )]
    pub strategy_type: Option<StrategyType>,
    /// Container image
    pub image: ImageValues,
    /// GitLab identity tags
    pub gitlab: GitlabValues,
    /// Application secret wiring
    pub application: ApplicationValues,
    /// Web port
    pub service: ServiceValues,
    /// Web liveness probe
    pub liveness_probe: ProbeValues,
    /// Web readiness probe
    pub readiness_probe: ProbeValues,
    /// Resource requirements applied to every container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Background processes, in declaration order
    pub workers: Workers,
    /// NetworkPolicy configuration
    pub network_policy: NetworkPolicyValues,
}

impl Default for ReleaseValues {
    fn default() -> Self {
        Self {
            release_override: None,
            replica_count: 1,
            strategy_type: None,
            image: ImageValues::default(),
            gitlab: GitlabValues::default(),
            application: ApplicationValues::default(),
            service: ServiceValues::default(),
            liveness_probe: ProbeValues::default(),
            readiness_probe: ProbeValues::default(),
            resources: None,
            workers: Workers::default(),
            network_policy: NetworkPolicyValues::default(),
        }
    }
}

/// Container image settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageValues {
    /// Image repository
    #[serde(deserialize_with = "scalar_string")]
    pub repository: String,
    /// Image tag
    #[serde(deserialize_with = "scalar_string")]
    pub tag: String,
    /// Image pull policy
    #[serde(deserialize_with = "scalar_string")]
    pub pull_policy: String,
    /// Image pull secrets
    pub secrets: Vec<ImagePullSecret>,
}

impl ImageValues {
    /// Full image reference (`repository:tag`)
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl Default for ImageValues {
    fn default() -> Self {
        Self {
            repository: "gitlab.example.com/group/project".to_string(),
            tag: "stable".to_string(),
            pull_policy: "IfNotPresent".to_string(),
            secrets: vec![ImagePullSecret {
                name: "gitlab-registry".to_string(),
            }],
        }
    }
}

/// Image pull secret reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImagePullSecret {
    /// Secret name
    pub name: String,
}

/// GitLab project and environment tags, surfaced as annotations
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitlabValues {
    /// Project path (e.g. `group/project`)
    #[serde(
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub app: Option<String>,
    /// Environment slug (e.g. `production`)
    #[serde(
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<String>,
}

/// Application secret wiring
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationValues {
    /// Secret loaded into every container via `envFrom`
    #[serde(
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_name: Option<String>,
    /// Opaque checksum of the application secret; rolls pods when it changes
    #[serde(deserialize_with = "scalar_string")]
    pub secret_checksum: String,
}

/// Web port settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceValues {
    /// Port name
    pub name: String,
    /// Container port
    pub internal_port: u16,
}

impl Default for ServiceValues {
    fn default() -> Self {
        Self {
            name: "web".to_string(),
            internal_port: 5000,
        }
    }
}

/// HTTP probe settings; unset fields take per-probe defaults at generation time
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeValues {
    /// Request path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Seconds before the first probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<i32>,
    /// Probe timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
}

/// NetworkPolicy settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkPolicyValues {
    /// Feature flag; nothing is generated unless set
    pub enabled: bool,
    /// Rule overlay replacing parts of the default rule set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<NetworkPolicySpecOverlay>,
}

/// User-supplied NetworkPolicy rule fields
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NetworkPolicySpecOverlay {
    /// Pods the policy applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
    /// Explicit policy types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_types: Option<Vec<PolicyType>>,
    /// Ingress rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Vec<NetworkPolicyIngressRule>>,
    /// Egress rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress: Option<Vec<NetworkPolicyEgressRule>>,
}

impl NetworkPolicySpecOverlay {
    /// Whether any rule-shaping field is supplied
    pub fn has_rules(&self) -> bool {
        self.pod_selector.is_some()
            || self.policy_types.is_some()
            || self.ingress.is_some()
            || self.egress.is_some()
    }
}

// =============================================================================
// Workers
// =============================================================================

/// Settings for one background process
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSpec {
    /// Container command, passed through verbatim
    #[serde(deserialize_with = "scalar_string_list")]
    pub command: Vec<String>,
    /// Rollout strategy override
    #[serde(
        deserialize_with = "optional_strategy",
        skip_serializing_if = "Option::is_none"
    )]
    pub strategy_type: Option<StrategyType>,
    /// Replicas; unset leaves the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<u32>,
}

/// A named worker
#[derive(Clone, Debug, PartialEq)]
pub struct Worker {
    /// Key under `workers`
    pub name: String,
    /// Worker settings
    pub spec: WorkerSpec,
}

/// Workers in declaration order.
///
/// (De)serializes as a mapping of worker name to [`WorkerSpec`] but never
/// reorders entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workers(Vec<Worker>);

impl Workers {
    /// Iterate workers in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Worker> {
        self.0.iter()
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no workers are configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&WorkerSpec> {
        self.0.iter().find(|w| w.name == name).map(|w| &w.spec)
    }
}

impl FromIterator<(String, WorkerSpec)> for Workers {
    fn from_iter<I: IntoIterator<Item = (String, WorkerSpec)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, spec)| Worker { name, spec })
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Workers {
    type Item = &'a Worker;
    type IntoIter = std::slice::Iter<'a, Worker>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Workers {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|w| (&w.name, &w.spec)))
    }
}

impl<'de> Deserialize<'de> for Workers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct WorkersVisitor;

        impl<'de> Visitor<'de> for WorkersVisitor {
            type Value = Workers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of worker name to worker settings")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Workers, E> {
                Ok(Workers::default())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Workers, A::Error> {
                let mut workers: Vec<Worker> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, spec)) = map.next_entry::<String, Option<WorkerSpec>>()? {
                    if workers.iter().any(|w| w.name == name) {
                        return Err(de::Error::custom(format!("duplicate worker '{}'", name)));
                    }
                    workers.push(Worker {
                        name,
                        spec: spec.unwrap_or_default(),
                    });
                }
                Ok(Workers(workers))
            }
        }

        deserializer.deserialize_any(WorkersVisitor)
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Builds a [`ReleaseValues`] from YAML documents and `path=value` assignments.
///
/// ```rust,ignore
/// let values = ValuesLoader::new()
///     .with_yaml(base)?
///     .with_set("networkPolicy.enabled=true")?
///     .with_set_string("workers.worker1.command[0]=echo")?
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct ValuesLoader {
    tree: Value,
}

impl Default for ValuesLoader {
    fn default() -> Self {
        Self {
            tree: Value::Mapping(Mapping::new()),
        }
    }
}

impl ValuesLoader {
    /// Start from an empty tree (serde defaults apply on build)
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-merge a YAML document over the current tree.
    ///
    /// An empty document is a no-op.
    pub fn with_yaml(mut self, document: &str) -> Result<Self> {
        let overlay: Value = serde_yaml::from_str(document)?;
        match overlay {
            Value::Null => {}
            Value::Mapping(_) => merge_values(&mut self.tree, overlay),
            other => {
                return Err(ChartError::NotAMapping {
                    found: node_kind(&other),
                })
            }
        }
        Ok(self)
    }

    /// Apply a `path=value` assignment, coercing booleans, null and integers
    pub fn with_set(mut self, expression: &str) -> Result<Self> {
        let (path, raw) = split_assignment(expression)?;
        self.set_value(path, coerce_scalar(raw))?;
        Ok(self)
    }

    /// Apply a `path=value` assignment, always storing a string
    pub fn with_set_string(mut self, expression: &str) -> Result<Self> {
        let (path, raw) = split_assignment(expression)?;
        self.set_value(path, Value::String(raw.to_string()))?;
        Ok(self)
    }

    /// Assign `value` at a key path such as `workers.sidekiq.command[0]`
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path).map_err(|message| ChartError::invalid_set(path, message))?;
        debug!(path = %path, "setting value");
        assign(&mut self.tree, &segments, value, path)
    }

    /// The merged tree
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Deserialize the merged tree
    pub fn build(self) -> Result<ReleaseValues> {
        Ok(serde_yaml::from_value(self.tree)?)
    }
}

/// One step of a key path
#[derive(Clone, Debug, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(&key.replace('.', "\\.")),
            Self::Index(index) => write!(f, "[{}]", index),
        }
    }
}

fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if matches!(segment, PathSegment::Key(_)) && !out.is_empty() {
            out.push('.');
        }
        out.push_str(&segment.to_string());
    }
    out
}

fn split_assignment(expression: &str) -> Result<(&str, &str)> {
    let (path, value) = expression
        .split_once('=')
        .ok_or_else(|| ChartError::invalid_set(expression, "expected 'path=value'"))?;
    if path.is_empty() {
        return Err(ChartError::invalid_set(expression, "empty key path"));
    }
    Ok((path, value))
}

/// Parse `a.b\.c[0].d` into segments
fn parse_path(path: &str) -> std::result::Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut after_index = false;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                key.push('.');
            }
            '.' => {
                if key.is_empty() && !after_index {
                    return Err("empty key segment".to_string());
                }
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                after_index = false;
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                } else if segments.is_empty() {
                    return Err("list index without a key".to_string());
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        Some(other) => {
                            return Err(format!("invalid character '{}' in list index", other))
                        }
                        None => return Err("unterminated list index".to_string()),
                    }
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| "empty list index".to_string())?;
                if index > MAX_LIST_INDEX {
                    return Err(format!(
                        "list index {} exceeds maximum {}",
                        index, MAX_LIST_INDEX
                    ));
                }
                segments.push(PathSegment::Index(index));
                after_index = true;
                match chars.peek() {
                    None | Some('.') | Some('[') => {}
                    Some(other) => {
                        return Err(format!("unexpected '{}' after list index", other));
                    }
                }
            }
            ']' => return Err("unmatched ']'".to_string()),
            _ => key.push(c),
        }
    }

    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    } else if !after_index {
        return Err("empty key segment".to_string());
    }
    Ok(segments)
}

fn assign(root: &mut Value, segments: &[PathSegment], value: Value, path: &str) -> Result<()> {
    let mut current = root;
    let mut value = Some(value);

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match segment {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Mapping(Mapping::new());
                }
                let found = node_kind(current);
                let map = current.as_mapping_mut().ok_or_else(|| {
                    ChartError::path_conflict(
                        path,
                        format!("'{}' is a {}, not a mapping", render_path(&segments[..i]), found),
                    )
                })?;
                let key = Value::String(key.clone());
                if last {
                    map.insert(key, value.take().unwrap_or(Value::Null));
                    return Ok(());
                }
                current = map.entry(key).or_insert(Value::Null);
            }
            PathSegment::Index(index) => {
                if current.is_null() {
                    *current = Value::Sequence(Vec::new());
                }
                let found = node_kind(current);
                let seq = current.as_sequence_mut().ok_or_else(|| {
                    ChartError::path_conflict(
                        path,
                        format!("'{}' is a {}, not a list", render_path(&segments[..i]), found),
                    )
                })?;
                if seq.len() <= *index {
                    seq.resize(index + 1, Value::Null);
                }
                if last {
                    seq[*index] = value.take().unwrap_or(Value::Null);
                    return Ok(());
                }
                current = &mut seq[*index];
            }
        }
    }
    Ok(())
}

/// Deep-merge `overlay` into `base`: mappings merge per key, anything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ if is_plain_integer(raw) => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Decimal integer without leading zeros (so "0123" stays a string)
fn is_plain_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
}

fn node_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
