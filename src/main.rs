//! flowspec - workflow orchestrator for spec-driven development.
//!
//! Runs custom workflows from a definition file, logging every decision
//! and event of a run under the logs root.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowspec::core::Config;
use flowspec::workflow::{
    generate_session_id, CommandTaskTracker, CustomWorkflowResult, ExecutionContext, LogKind,
    Orchestrator, RigorEnforcer, RunStatus, ShellStepExecutor, StepState, WorkflowError,
    WorkflowStore, EXIT_VALIDATION,
};

/// Workflow orchestrator for spec-driven development
#[derive(Parser)]
#[command(name = "flowspec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Workflow definition file (YAML or JSON)
    #[arg(short, long, global = true, env = "FLOWSPEC_WORKFLOW_FILE")]
    file: Option<PathBuf>,

    /// Root directory of the audit logs
    #[arg(long, global = true, env = "FLOWSPEC_LOGS_ROOT")]
    logs_root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the custom workflows of the definition file
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a custom workflow
    Run {
        /// Custom workflow name
        name: String,

        /// Context values for step conditions (KEY=VALUE)
        #[arg(short, long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// Session id (generated if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Task to keep in sync with the run's progress
        #[arg(long)]
        task: Option<String>,

        /// Run each step through the configured executor command
        #[arg(long)]
        exec: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Continue a run halted at a checkpoint
    Resume {
        /// Session id of the halted run
        session: String,

        /// Run each step through the configured executor command
        #[arg(long)]
        exec: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate the definition file
    Validate,

    /// Print a session's audit log
    Log {
        /// Session id
        session: String,

        /// Which stream to print
        #[arg(long, value_enum, default_value = "events")]
        kind: LogStream,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogStream {
    Decisions,
    Events,
}

impl From<LogStream> for LogKind {
    fn from(stream: LogStream) -> Self {
        match stream {
            LogStream::Decisions => Self::Decision,
            LogStream::Events => Self::Event,
        }
    }
}

/// Configuration with command-line overrides applied.
struct Settings {
    config: Config,
    workflow_file: PathBuf,
    logs_root: PathBuf,
}

impl Settings {
    fn resolve(cli: &Cli) -> Result<Self> {
        let config = Config::load()?;
        let workflow_file = cli.file.clone().unwrap_or_else(|| config.general.workflow_file.clone());
        let logs_root = cli.logs_root.clone().unwrap_or_else(|| config.general.logs_root.clone());
        Ok(Self { config, workflow_file, logs_root })
    }

    fn load_store(&self) -> Result<WorkflowStore> {
        WorkflowStore::load(&self.workflow_file)
            .with_context(|| format!("Failed to load {}", self.workflow_file.display()))
    }

    fn orchestrator<'a>(
        &self,
        store: &'a WorkflowStore,
        session_id: String,
        exec: bool,
    ) -> Result<Orchestrator<'a>> {
        let mut orchestrator = Orchestrator::new(store, &self.logs_root, session_id)?;

        if exec {
            let template = self.config.executor.command.as_deref().ok_or_else(|| {
                anyhow::anyhow!("--exec needs an [executor] command in the configuration")
            })?;
            orchestrator = orchestrator.with_executor(ShellStepExecutor::new(template));
        }

        if let Some(ref template) = self.config.tracker.command {
            orchestrator = orchestrator.with_tracker(CommandTaskTracker::new(template.clone()));
        }

        Ok(orchestrator)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            match e.downcast_ref::<WorkflowError>() {
                Some(err) => eprintln!("Error [{}]: {e:#}", err.kind()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<WorkflowError>().map_or(EXIT_VALIDATION, WorkflowError::exit_code)
}

fn run(cli: Cli) -> Result<u8> {
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(0);
    }
    if let Commands::Config { path } = cli.command {
        cmd_config(path)?;
        return Ok(0);
    }

    let settings = Settings::resolve(&cli)?;

    match cli.command {
        Commands::List { format } => cmd_list(&settings, format).map(|()| 0),
        Commands::Run { name, context, session, task, exec, format } => {
            cmd_run(&settings, &name, &context, session, task.as_deref(), exec, format)
        }
        Commands::Resume { session, exec, format } => cmd_resume(&settings, session, exec, format),
        Commands::Validate => cmd_validate(&settings).map(|()| 0),
        Commands::Log { session, kind } => cmd_log(&settings, &session, kind.into()).map(|()| 0),
        Commands::Config { .. } | Commands::Completions { .. } => Ok(0),
    }
}

/// List custom workflows.
fn cmd_list(settings: &Settings, format: OutputFormat) -> Result<()> {
    let store = settings.load_store()?;

    match format {
        OutputFormat::Json => {
            let workflows: Vec<_> = store
                .custom_workflows()
                .map(|def| {
                    serde_json::json!({
                        "name": def.name,
                        "display_name": def.display_name,
                        "description": def.description,
                        "mode": def.mode.as_str(),
                        "steps": def.steps.iter().map(|s| s.workflow_name.as_str()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&workflows)?);
        }
        OutputFormat::Text => {
            for def in store.custom_workflows() {
                println!("{} - {} ({}, {} steps)", def.name, def.title(), def.mode, def.step_count());
                if let Some(ref desc) = def.description {
                    println!("    {desc}");
                }
            }
            println!("\nTotal: {} custom workflows", store.list_names().len());
        }
    }

    Ok(())
}

/// Run a custom workflow.
#[allow(clippy::too_many_arguments)]
fn cmd_run(
    settings: &Settings,
    name: &str,
    assignments: &[String],
    session: Option<String>,
    task: Option<&str>,
    exec: bool,
    format: OutputFormat,
) -> Result<u8> {
    let store = settings.load_store()?;
    let context = ExecutionContext::from_assignments(assignments)?;
    let session_id = session.unwrap_or_else(generate_session_id);

    let orchestrator = settings.orchestrator(&store, session_id, exec)?;
    let result = orchestrator.execute_for_task(name, &context, task)?;

    print_result(&result, format)?;
    Ok(result.exit_code())
}

/// Resume a run halted at a checkpoint.
fn cmd_resume(settings: &Settings, session: String, exec: bool, format: OutputFormat) -> Result<u8> {
    let store = settings.load_store()?;
    let orchestrator = settings.orchestrator(&store, session, exec)?;
    let result = orchestrator.resume()?;

    print_result(&result, format)?;
    Ok(result.exit_code())
}

/// Validate the definition file.
fn cmd_validate(settings: &Settings) -> Result<()> {
    let store = settings.load_store()?;
    println!(
        "{} is valid: {} custom workflows, {} built-in workflows",
        settings.workflow_file.display(),
        store.list_names().len(),
        store.config().workflows.len()
    );
    Ok(())
}

/// Print a session's audit records as JSON lines.
fn cmd_log(settings: &Settings, session: &str, kind: LogKind) -> Result<()> {
    let enforcer = RigorEnforcer::new(&settings.logs_root);
    let records = enforcer.read_records(kind, session)?;

    if records.is_empty() {
        eprintln!("No {} recorded for session '{session}'", kind.dir_name());
    }
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

/// Show configuration.
fn cmd_config(show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::locate().or_else(Config::global_path) {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    println!("{}", config.to_toml()?);

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "flowspec", &mut io::stdout());
}

fn print_result(result: &CustomWorkflowResult, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("Workflow: {} (session {})", result.workflow_name, result.session_id);
    for step in &result.steps {
        let detail = match step.state {
            StepState::Skipped => "condition not met".to_string(),
            StepState::Failed => step.error.clone().unwrap_or_default(),
            StepState::Dispatched | StepState::Succeeded => {
                step.dispatch.as_ref().map(|d| d.command.clone()).unwrap_or_default()
            }
        };
        println!("  {}. {:<16} {:<10} {}", step.index + 1, step.workflow_name, state_label(step.state), detail);
    }
    println!("Executed: {}, skipped: {}", result.steps_executed, result.steps_skipped);

    match result.status {
        RunStatus::Completed => println!("\nWorkflow completed successfully!"),
        RunStatus::HaltedOnCheckpoint => {
            if let Some(ref checkpoint) = result.checkpoint {
                println!(
                    "\nCheckpoint before step {} ({}): {}",
                    checkpoint.step_index + 1,
                    checkpoint.workflow_name,
                    checkpoint.prompt
                );
                println!("Approve and continue with: flowspec resume {}", result.session_id);
            }
        }
        RunStatus::HaltedOnError => {
            eprintln!(
                "Error [{}]: {}",
                result.error_kind.as_deref().unwrap_or("Error"),
                result.error.as_deref().unwrap_or("workflow halted")
            );
        }
    }

    Ok(())
}

fn state_label(state: StepState) -> &'static str {
    match state {
        StepState::Skipped => "skipped",
        StepState::Dispatched => "dispatched",
        StepState::Succeeded => "succeeded",
        StepState::Failed => "FAILED",
    }
}
