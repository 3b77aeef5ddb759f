use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use monospace_core::configs::monospace::config_schema;
use monospace_core::output::OutputMode;
use monospace_core::ui::{self, Interactivity, Terminal};
use monospace_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};

mod commands;
mod logging;

/// Monospace - A polyglot monorepo workbench
#[derive(Parser)]
#[command(name = "monospace")]
#[command(about = "Run task pipelines across the projects of a polyglot monorepo")]
#[command(version)]
struct Cli {
    /// Path to the monorepo root (defaults to the nearest parent holding .monospace/)
    #[arg(short = 'C', long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level (overrides MONOSPACE_LOG)
    #[arg(long, value_enum, global = true)]
    log_level: Option<logging::LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ExecutionArgs {
    /// Project filter: name, alias, glob or `root`; prefix with `!` to exclude
    #[arg(short = 'p', long = "project")]
    filters: Vec<String>,

    /// Maximum number of tasks running at once (0 = number of CPUs)
    #[arg(short = 'j', long, default_value_t = 0)]
    concurrency: usize,

    /// How task output is displayed
    #[arg(long)]
    output_mode: Option<OutputMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks and their dependencies
    Run {
        /// Tasks to run, as `task` or `project#task`
        #[arg(required = true)]
        tasks: Vec<String>,

        #[command(flatten)]
        execution: ExecutionArgs,

        /// Print the resolved tasks instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a command in every selected project
    Exec {
        #[command(flatten)]
        execution: ExecutionArgs,

        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// List and manage pipeline tasks
    Tasks {
        #[command(subcommand)]
        command: Option<TasksCommands>,

        /// Show commands, dependencies and options of each task
        #[arg(long)]
        details: bool,

        /// Show full project names instead of aliases
        #[arg(long)]
        full_project_names: bool,

        /// Project filter
        #[arg(short = 'p', long = "project")]
        filters: Vec<String>,
    },
    /// Pin and restore repository states
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Print the task graph in Graphviz dot format
    Graph {
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Project filter
        #[arg(short = 'p', long = "project")]
        filters: Vec<String>,
    },
    /// Print the JSON schema of monospace.yml
    Schema,
}

#[derive(Subcommand)]
pub enum TasksCommands {
    /// Remove tasks from the pipeline
    Remove {
        #[arg(required = true)]
        tasks: Vec<String>,
    },
    /// Create tasks from package.json scripts
    Import {
        /// `project#script` entries; every script when omitted
        scripts: Vec<String>,
    },
    /// Edit task definitions in $EDITOR
    Edit { tasks: Vec<String> },
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// Record current revisions under a name
    Pin { name: String },
    /// Forget a pinned state
    Unpin { name: String },
    /// Check out the revisions of a pinned state
    Restore { name: String },
    /// List pinned states
    List,
}

fn load_manager(workspace: Option<PathBuf>) -> Result<WorkspaceManager> {
    let manager = match workspace {
        Some(workspace_root) => WorkspaceManager::new(WorkspaceManagerConfig { workspace_root }),
        None => WorkspaceManager::discover(&std::env::current_dir()?),
    };
    manager.map_err(|e| anyhow::anyhow!("Failed to load workspace: {}", e))
}

/// `Ok(false)` when the command ran but did not succeed.
async fn dispatch(cli: Cli, terminal: Terminal) -> Result<bool> {
    if let Commands::Schema = cli.command {
        println!("{}", config_schema()?);
        return Ok(true);
    }

    let mut manager = load_manager(cli.workspace)?;
    let interactivity = Interactivity::detect();

    match cli.command {
        Commands::Run {
            tasks,
            execution,
            dry_run,
        } => commands::run::execute(&manager, &tasks, execution.into(), dry_run, terminal).await,
        Commands::Exec { execution, command } => {
            commands::exec::execute(&manager, &command, execution.into(), terminal).await
        }
        Commands::Tasks {
            command,
            details,
            full_project_names,
            filters,
        } => match command {
            None => commands::tasks::list(&manager, &filters, details, full_project_names),
            Some(command) => commands::tasks::execute(&mut manager, command),
        },
        Commands::State { command } => {
            commands::state::execute(&manager, command, interactivity)
        }
        Commands::Graph { tasks, filters } => commands::graph::execute(&manager, &tasks, &filters),
        Commands::Schema => Ok(true),
    }
}

impl From<ExecutionArgs> for commands::ExecutionOptions {
    fn from(args: ExecutionArgs) -> Self {
        Self {
            filters: args.filters,
            concurrency: args.concurrency,
            output_mode: args.output_mode,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(cli.log_level) {
        eprintln!("{}", e);
    }

    let terminal = Terminal::detect();
    terminal.apply();

    match dispatch(cli, terminal).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            ui::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
