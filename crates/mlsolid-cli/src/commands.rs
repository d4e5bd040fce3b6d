//! Subcommands and their execution

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use mlsolid_core::{Artifact, ContentType, MetricValue};
use mlsolid_service::{
    ArtifactUpload, CreateRunRequest, ExperimentView, MetricInput, MetricView, ModelRegistryView, RunView,
    ServiceRegistry,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a run, optionally with initial metrics and artifacts
    CreateRun {
        name: String,
        #[arg(short = 'x', long)]
        experiment: String,
        /// Metric values as name=v1,v2,...
        #[arg(short, long = "metric", value_parser = parse_metric)]
        metrics: Vec<MetricInput>,
        /// Text artifact files
        #[arg(long = "artifact")]
        artifacts: Vec<PathBuf>,
        /// Model checkpoint files
        #[arg(long = "checkpoint")]
        checkpoints: Vec<PathBuf>,
    },

    /// Show a run
    Run { id: String },

    /// Show several runs, or every run when no id is given
    Runs { ids: Vec<String> },

    /// Show an experiment with its runs
    Experiment { id: String },

    /// List experiment ids
    Experiments {
        /// List the run ids of one experiment instead
        #[arg(long)]
        runs_of: Option<String>,
    },

    /// Append metric values to a run
    AddMetric {
        run: String,
        #[arg(required = true, value_parser = parse_metric)]
        metrics: Vec<MetricInput>,
    },

    /// Upload files as artifacts of a run
    AddArtifact {
        run: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Store the files as model checkpoints
        #[arg(long)]
        model: bool,
    },

    /// Download an artifact
    Artifact {
        run: String,
        name: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List artifacts of a run
    Artifacts { run: String },

    /// Create a model registry
    CreateRegistry { name: String },

    /// Show a model registry
    Registry { name: String },

    /// Add a model URL to a registry
    AddModel {
        registry: String,
        url: String,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Add a run artifact to a registry
    AddArtifactModel {
        registry: String,
        run: String,
        artifact: String,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Tag a model version
    TagModel {
        registry: String,
        version: usize,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Show the model a tag points at
    TaggedModel {
        registry: String,
        tag: String,
        /// Show every model the tag was pointed at
        #[arg(long)]
        all: bool,
    },

    /// Show the latest model of a registry
    LastModel { registry: String },

    /// Show one model version
    ModelVersion { registry: String, version: usize },
}

/// Parse `name=v1,v2,...`; each value is typed as int, float or string
pub fn parse_metric(raw: &str) -> Result<MetricInput, String> {
    let (name, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value[,value...], got {:?}", raw))?;

    if name.trim().is_empty() {
        return Err("metric name cannot be empty".to_string());
    }

    let values: Vec<MetricValue> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(MetricValue::parse)
        .collect();
    if values.is_empty() {
        return Err(format!("metric {} has no values", name));
    }

    Ok(MetricInput::new(name.trim(), values))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_artifact(path: &Path, content_type: ContentType) -> Result<ArtifactUpload> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("cannot derive an artifact name from {}", path.display()))?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    Ok(ArtifactUpload {
        name: name.to_string(),
        content_type: content_type.to_string(),
        content,
    })
}

async fn read_artifacts(paths: &[PathBuf], content_type: ContentType) -> Result<Vec<ArtifactUpload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        uploads.push(read_artifact(path, content_type).await?);
    }
    Ok(uploads)
}

impl Command {
    pub async fn execute(self, services: &ServiceRegistry) -> Result<()> {
        match self {
            Command::CreateRun {
                name,
                experiment,
                metrics,
                artifacts,
                checkpoints,
            } => {
                let mut request = CreateRunRequest::new(name, experiment);
                request.metrics = metrics;
                request.artifacts = read_artifacts(&artifacts, ContentType::Text).await?;
                request
                    .artifacts
                    .extend(read_artifacts(&checkpoints, ContentType::Model).await?);

                let run = services.runs().create_run(request).await?;
                print_json(&RunView::from(&run))
            }

            Command::Run { id } => {
                let run = services.runs().get_run(&id).await?;
                print_json(&RunView::from(&run))
            }

            Command::Runs { ids } => {
                let runs = services.runs().list_runs(&ids).await?;
                print_json(&runs.iter().map(RunView::from).collect::<Vec<_>>())
            }

            Command::Experiment { id } => {
                let experiment = services.runs().get_experiment(&id).await?;
                print_json(&ExperimentView::from(&experiment))
            }

            Command::Experiments { runs_of } => match runs_of {
                Some(exp_id) => print_json(&services.runs().list_experiment_runs(&exp_id).await?),
                None => print_json(&services.runs().list_experiments().await?),
            },

            Command::AddMetric { run, metrics } => {
                let updated = services.runs().add_metrics(&run, metrics).await?;
                let views: std::collections::BTreeMap<_, _> = updated
                    .iter()
                    .map(|m| (m.name().to_string(), MetricView::from(m)))
                    .collect();
                print_json(&views)
            }

            Command::AddArtifact { run, files, model } => {
                let content_type = if model { ContentType::Model } else { ContentType::Text };
                let artifacts = read_artifacts(&files, content_type)
                    .await?
                    .into_iter()
                    .map(Artifact::try_from)
                    .collect::<Result<Vec<_>, _>>()?;

                let response = services.artifacts().add_artifacts(&run, artifacts).await?;
                print_json(&response)
            }

            Command::Artifact { run, name, output } => {
                let mut stream = services.artifacts().get_artifact(&run, &name).await?;
                match output {
                    Some(path) => {
                        let mut file = tokio::fs::File::create(&path)
                            .await
                            .with_context(|| format!("failed to create {}", path.display()))?;
                        let written = tokio::io::copy(&mut stream.reader, &mut file).await?;
                        file.flush().await?;
                        print_json(&json!({ "artifact": stream.artifact, "bytes": written }))
                    }
                    None => {
                        let mut stdout = tokio::io::stdout();
                        tokio::io::copy(&mut stream.reader, &mut stdout).await?;
                        stdout.flush().await?;
                        Ok(())
                    }
                }
            }

            Command::Artifacts { run } => print_json(&services.artifacts().list_artifacts(&run).await?),

            Command::CreateRegistry { name } => {
                let registry = services.registries().create_registry(&name).await?;
                print_json(&ModelRegistryView::from(&registry))
            }

            Command::Registry { name } => {
                let registry = services.registries().get_registry(&name).await?;
                print_json(&ModelRegistryView::from(&registry))
            }

            Command::AddModel { registry, url, tags } => {
                let version = services.registries().add_model_entry(&registry, &url, tags).await?;
                print_json(&json!({ "registry": registry, "version": version }))
            }

            Command::AddArtifactModel {
                registry,
                run,
                artifact,
                tags,
            } => {
                let version = services
                    .registries()
                    .add_artifact_to_registry(&registry, &run, &artifact, tags)
                    .await?;
                print_json(&json!({ "registry": registry, "version": version }))
            }

            Command::TagModel {
                registry,
                version,
                tags,
            } => {
                if version == 0 {
                    bail!("versions start at 1");
                }
                services.registries().tag_model(&registry, version, tags.clone()).await?;
                print_json(&json!({ "registry": registry, "version": version, "tags": tags }))
            }

            Command::TaggedModel { registry, tag, all } => {
                if all {
                    print_json(&services.registries().get_tagged_models(&registry, &tag).await?)
                } else {
                    print_json(&services.registries().get_tagged_model(&registry, &tag).await?)
                }
            }

            Command::LastModel { registry } => {
                print_json(&services.registries().get_last_model_entry(&registry).await?)
            }

            Command::ModelVersion { registry, version } => {
                print_json(&services.registries().get_model_by_version(&registry, version).await?)
            }
        }
    }
}
