//! Template command - render a release's manifests
//!
//! Values are layered in the order: `--values` files (later files win), then
//! `--set`, then `--set-string`.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tracing::{debug, info};

use autodeploy_chart::manifest::{to_json_array, to_yaml_stream};
use autodeploy_chart::{ChartRenderer, GeneratedResource, ManifestSet, ReleaseValues, ValuesLoader};

use crate::{Error, Result};

/// Render manifests for a release
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Release name
    pub release: String,

    /// Values file; may be repeated
    #[arg(short = 'f', long = "values", value_name = "FILE")]
    pub values: Vec<PathBuf>,

    /// Set a value (e.g. workers.sidekiq.command[0]=bundle)
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub set: Vec<String>,

    /// Set a value, always as a string
    #[arg(long = "set-string", value_name = "PATH=VALUE")]
    pub set_string: Vec<String>,

    /// Only render one group of resources
    #[arg(long, value_enum)]
    pub show_only: Option<ShowOnly>,

    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub output: OutputFormat,
}

/// Resource group filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowOnly {
    /// Web Deployment
    Web,
    /// Worker Deployments
    Workers,
    /// NetworkPolicy
    NetworkPolicy,
}

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Multi-document YAML (default)
    #[default]
    Yaml,
    /// JSON array
    Json,
}

/// Run the template command
pub fn run(args: TemplateArgs) -> Result<()> {
    let rendered = render(&args)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Load values and render the selected resources as text
pub fn render(args: &TemplateArgs) -> Result<String> {
    let values = load_values(args)?;
    let manifests = ChartRenderer::new(&args.release, &values).render();
    let resources = select(&manifests, args.show_only);

    info!(
        release = %args.release,
        resources = resources.len(),
        "rendered release"
    );

    let text = match args.output {
        OutputFormat::Yaml => to_yaml_stream(&resources)?,
        OutputFormat::Json => {
            let mut json = to_json_array(&resources)?;
            json.push('\n');
            json
        }
    };
    Ok(text)
}

fn load_values(args: &TemplateArgs) -> Result<ReleaseValues> {
    let mut loader = ValuesLoader::new();

    for path in &args.values {
        debug!(path = %path.display(), "loading values file");
        let document =
            std::fs::read_to_string(path).map_err(|e| Error::read_values(path, e))?;
        loader = loader.with_yaml(&document)?;
    }
    for expression in &args.set {
        loader = loader.with_set(expression)?;
    }
    for expression in &args.set_string {
        loader = loader.with_set_string(expression)?;
    }

    Ok(loader.build()?)
}

fn select(manifests: &ManifestSet, show_only: Option<ShowOnly>) -> Vec<GeneratedResource> {
    match show_only {
        None => manifests.resources(),
        Some(ShowOnly::Web) => vec![manifests.web.clone().into()],
        Some(ShowOnly::Workers) => manifests
            .workers
            .iter()
            .cloned()
            .map(GeneratedResource::from)
            .collect(),
        Some(ShowOnly::NetworkPolicy) => manifests
            .network_policy
            .iter()
            .cloned()
            .map(GeneratedResource::from)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    fn args(release: &str) -> TemplateArgs {
        TemplateArgs {
            release: release.to_string(),
            values: Vec::new(),
            set: Vec::new(),
            set_string: Vec::new(),
            show_only: None,
            output: OutputFormat::Yaml,
        }
    }

    fn documents(yaml: &str) -> Vec<serde_yaml::Value> {
        yaml.split("---\n")
            .filter(|d| !d.trim().is_empty())
            .map(|d| serde_yaml::from_str(d).unwrap())
            .collect()
    }

    // =========================================================================
    // Story: Argument Parsing
    // =========================================================================

    #[test]
    fn parses_template_flags() {
        let cli = Cli::try_parse_from([
            "autodeploy",
            "template",
            "production",
            "-f",
            "a.yaml",
            "--values",
            "b.yaml",
            "--set",
            "replicaCount=2",
            "--set-string",
            "workers.w.command[0]=1",
            "--show-only",
            "network-policy",
            "-o",
            "json",
        ])
        .unwrap();

        let Commands::Template(args) = cli.command;
        assert_eq!(args.release, "production");
        assert_eq!(
            args.values,
            vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]
        );
        assert_eq!(args.set, vec!["replicaCount=2"]);
        assert_eq!(args.set_string, vec!["workers.w.command[0]=1"]);
        assert_eq!(args.show_only, Some(ShowOnly::NetworkPolicy));
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn release_is_required() {
        assert!(Cli::try_parse_from(["autodeploy", "template"]).is_err());
    }

    #[test]
    fn output_defaults_to_yaml() {
        let cli = Cli::try_parse_from(["autodeploy", "template", "production"]).unwrap();
        let Commands::Template(args) = cli.command;
        assert_eq!(args.output, OutputFormat::Yaml);
        assert_eq!(args.show_only, None);
    }

    // =========================================================================
    // Story: Rendering
    // =========================================================================

    #[test]
    fn renders_defaults_as_single_document() {
        let yaml = render(&args("production")).unwrap();
        let docs = documents(&yaml);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["metadata"]["name"], serde_yaml::Value::from("production"));
    }

    #[test]
    fn values_files_merge_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let overlay = dir.path().join("overlay.yaml");
        std::fs::write(
            &base,
            concat!(
                "image:\n  repository: registry.example.com/app\n  tag: v1\n",
                "workers:\n  sidekiq:\n    command: [bundle, exec, sidekiq]\n",
            ),
        )
        .unwrap();
        std::fs::write(&overlay, "image:\n  tag: v2\n").unwrap();

        let mut args = args("production");
        args.values = vec![base, overlay];
        let docs = documents(&render(&args).unwrap());

        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[1]["spec"]["template"]["spec"]["containers"][0]["image"],
            serde_yaml::Value::from("registry.example.com/app:v2")
        );
        assert_eq!(
            docs[1]["metadata"]["name"],
            serde_yaml::Value::from("production-sidekiq")
        );
    }

    #[test]
    fn set_overrides_values_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.yaml");
        std::fs::write(&file, "replicaCount: 2\n").unwrap();

        let mut args = args("production");
        args.values = vec![file];
        args.set = vec!["replicaCount=5".to_string()];
        let docs = documents(&render(&args).unwrap());
        assert_eq!(docs[0]["spec"]["replicas"].as_u64(), Some(5));
    }

    #[test]
    fn show_only_network_policy() {
        let mut args = args("production");
        args.set = vec!["networkPolicy.enabled=true".to_string()];
        args.show_only = Some(ShowOnly::NetworkPolicy);
        let docs = documents(&render(&args).unwrap());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["kind"], serde_yaml::Value::from("NetworkPolicy"));
    }

    #[test]
    fn show_only_disabled_policy_renders_nothing() {
        let mut args = args("production");
        args.show_only = Some(ShowOnly::NetworkPolicy);
        assert_eq!(render(&args).unwrap(), "");
    }

    #[test]
    fn show_only_workers_in_order() {
        let mut args = args("production");
        args.set_string = vec![
            "workers.worker2.command[0]=echo".to_string(),
            "workers.worker1.command[0]=echo".to_string(),
        ];
        args.show_only = Some(ShowOnly::Workers);
        let names: Vec<_> = documents(&render(&args).unwrap())
            .iter()
            .map(|d| d["metadata"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["production-worker2", "production-worker1"]);
    }

    #[test]
    fn json_output() {
        let mut args = args("production");
        args.output = OutputFormat::Json;
        let json: serde_json::Value = serde_json::from_str(&render(&args).unwrap()).unwrap();
        assert_eq!(json[0]["kind"], "Deployment");
    }

    // =========================================================================
    // Story: Errors
    // =========================================================================

    #[test]
    fn missing_values_file_names_path() {
        let mut args = args("production");
        args.values = vec![PathBuf::from("/nonexistent/values.yaml")];
        let err = render(&args).unwrap_err();
        assert!(matches!(err, Error::ReadValues { .. }));
        assert!(err.to_string().contains("/nonexistent/values.yaml"));
    }

    #[test]
    fn bad_set_expression_is_a_chart_error() {
        let mut args = args("production");
        args.set = vec!["replicaCount".to_string()];
        assert!(matches!(render(&args).unwrap_err(), Error::Chart(_)));
    }

    #[test]
    fn invalid_strategy_is_a_chart_error() {
        let mut args = args("production");
        args.set = vec!["strategyType=Sideways".to_string()];
        assert!(matches!(render(&args).unwrap_err(), Error::Chart(_)));
    }
}
