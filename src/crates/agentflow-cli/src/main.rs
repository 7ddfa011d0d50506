//! # agentflow-cli
//!
//! Command-line front end for running, recording, replaying, and
//! visualizing agentflow flow definitions.

mod printer;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use agentflow_core::{
    FlowDefinition, Harness, HarnessConfig, NodeRegistry, ReplayPacing, RunStatus, VisualizeFormat,
};
use agentflow_store::{CreateOptions, FileStore, SignalStore};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Run, record, replay, and visualize agentflow flows", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory backing the file-based recording store.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow file once, live.
    Run {
        flow_file: PathBuf,
        /// JSON input for the flow; defaults to `{}`.
        #[arg(short, long)]
        input: Option<String>,
        /// Print every signal as it is emitted.
        #[arg(long)]
        verbose: bool,
    },

    /// Run a flow file and persist every emitted signal to the store.
    Record {
        flow_file: PathBuf,
        #[arg(short, long)]
        input: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Replay a previously recorded run's signals.
    Replay {
        #[arg(long)]
        recording: String,
        #[arg(long, value_enum, default_value_t = PacingArg::AsFastAsPossible)]
        pacing: PacingArg,
    },

    /// Render a flow file as Mermaid or DOT for inspection.
    Visualize {
        flow_file: PathBuf,
        #[arg(long, value_enum, default_value_t = FormatArg::Mermaid)]
        format: FormatArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PacingArg {
    Literal,
    AsFastAsPossible,
    MonotonicStep,
}

impl From<PacingArg> for ReplayPacing {
    fn from(value: PacingArg) -> Self {
        match value {
            PacingArg::Literal => ReplayPacing::Literal,
            PacingArg::AsFastAsPossible => ReplayPacing::AsFastAsPossible,
            PacingArg::MonotonicStep => ReplayPacing::MonotonicStep,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Mermaid,
    Dot,
}

impl From<FormatArg> for VisualizeFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Mermaid => VisualizeFormat::Mermaid,
            FormatArg::Dot => VisualizeFormat::Dot,
        }
    }
}

fn database_root(cli_value: &Option<PathBuf>) -> PathBuf {
    cli_value.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("agentflow")
    })
}

fn parse_input(input: Option<String>) -> anyhow::Result<Value> {
    match input {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Object(Default::default())),
    }
}

fn default_registry() -> Arc<NodeRegistry> {
    Arc::new(agentflow_core::default_registry())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database = database_root(&cli.database);

    let result = tokio::select! {
        result = run_command(cli.command, database) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            // A flow file that doesn't parse/exist, or a malformed --input,
            // is a user/validation error (1); a flow that ran and failed
            // is a runtime failure (2).
            let validation_error = matches!(
                err.downcast_ref::<agentflow_core::CoreError>(),
                Some(agentflow_core::CoreError::Io(_))
                    | Some(agentflow_core::CoreError::Yaml(_))
                    | Some(agentflow_core::CoreError::Validation(_))
            ) || err.downcast_ref::<serde_json::Error>().is_some();
            if validation_error {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

async fn run_command(command: Commands, database: PathBuf) -> anyhow::Result<()> {
    match command {
        Commands::Run { flow_file, input, verbose } => {
            let flow = FlowDefinition::from_yaml_file(&flow_file)?;
            let input = parse_input(input)?;
            let mut harness = Harness::new(agentflow_core::harness::new_session_id(), HarnessConfig::default());
            if verbose {
                harness = harness.attach(printer::line_printer(vec!["**".into()]));
            }
            let result = harness.run_flow(flow, default_registry(), input).await?;
            println!("{}", serde_json::to_string_pretty(&result.outputs)?);
            if !matches!(result.status, RunStatus::Complete) {
                anyhow::bail!("flow did not complete: {:?}", result.status);
            }
            Ok(())
        }

        Commands::Record { flow_file, input, name, tags } => {
            let flow = FlowDefinition::from_yaml_file(&flow_file)?;
            let input = parse_input(input)?;
            let store: Arc<dyn SignalStore> = Arc::new(FileStore::new(database));
            let create_options = CreateOptions { name, tags, harness_type: Some("flow".into()) };
            let mut harness = Harness::new(agentflow_core::harness::new_session_id(), HarnessConfig::default())
                .record(store)
                .create_options(create_options);
            let result = harness.run_flow(flow, default_registry(), input).await?;
            println!(
                "recording: {}",
                result.recording_id.unwrap_or_else(|| "<none>".into())
            );
            Ok(())
        }

        Commands::Replay { recording, pacing } => {
            let store: Arc<dyn SignalStore> = Arc::new(FileStore::new(database));
            let flow = FlowDefinition {
                name: "replay".into(),
                version: None,
                state: Default::default(),
                nodes: Vec::new(),
                edges: Vec::new(),
            };
            let mut harness = Harness::new(agentflow_core::harness::new_session_id(), HarnessConfig::default())
                .replay(store, recording)
                .pacing(pacing.into())
                .attach(printer::line_printer(vec!["**".into()]));
            let result = harness.run_flow(flow, default_registry(), Value::Null).await?;
            println!("replayed {} signals", result.signals.len());
            Ok(())
        }

        Commands::Visualize { flow_file, format } => {
            let flow = FlowDefinition::from_yaml_file(&flow_file)?;
            println!("{}", agentflow_core::visualize(&flow, format.into()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW_YAML: &str = r#"
name: greet
nodes:
  - id: a
    type: echo
    input: {"v": 1}
"#;

    #[test]
    fn database_root_honors_explicit_flag() {
        let explicit = Some(PathBuf::from("/tmp/custom-agentflow"));
        assert_eq!(database_root(&explicit), PathBuf::from("/tmp/custom-agentflow"));
    }

    #[test]
    fn database_root_falls_back_to_data_dir() {
        let root = database_root(&None);
        assert!(root.ends_with("agentflow"));
    }

    #[test]
    fn parse_input_defaults_to_empty_object() {
        let value = parse_input(None).unwrap();
        assert_eq!(value, Value::Object(Default::default()));
    }

    #[test]
    fn parse_input_rejects_malformed_json() {
        let err = parse_input(Some("{not json".into())).unwrap_err();
        assert!(err.downcast_ref::<serde_json::Error>().is_some());
    }

    #[tokio::test]
    async fn run_command_executes_a_flow_file() {
        let dir = tempfile::tempdir().unwrap();
        let flow_path = dir.path().join("flow.yaml");
        std::fs::write(&flow_path, FLOW_YAML).unwrap();

        run_command(
            Commands::Run {
                flow_file: flow_path,
                input: None,
                verbose: false,
            },
            dir.path().join("db"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn record_then_visualize_round_trip_through_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let flow_path = dir.path().join("flow.yaml");
        std::fs::write(&flow_path, FLOW_YAML).unwrap();
        let database = dir.path().join("db");

        run_command(
            Commands::Record {
                flow_file: flow_path.clone(),
                input: None,
                name: Some("test-run".into()),
                tags: vec!["ci".into()],
            },
            database.clone(),
        )
        .await
        .unwrap();

        let store = FileStore::new(database.as_path());
        let recordings = store.list(agentflow_store::ListFilter::default()).await.unwrap();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].name.as_deref(), Some("test-run"));

        run_command(
            Commands::Visualize {
                flow_file: flow_path,
                format: FormatArg::Mermaid,
            },
            database,
        )
        .await
        .unwrap();
    }
}

