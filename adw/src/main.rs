//! `adw`: run AI developer workflows with the director pattern.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use adw::director::{Director, RunStop};
use adw::error::ConfigError;
use adw::exit_codes;
use adw::io::catalog::list_workflows;
use adw::io::coder::AiderCoder;
use adw::io::config::{
    DEFAULT_CONFIG_ROOT, LoadOptions, WorkflowConfig, load_workflow, resolve_workflow_path,
};
use adw::io::judge::{CliJudge, ProviderRegistry};
use adw::logging;

#[derive(Parser)]
#[command(
    name = "adw",
    version,
    about = "Run AI developer workflows: code, validate, evaluate, retry"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow until it succeeds or runs out of iterations.
    Run {
        /// Descriptor path, or a workflow name under the config root.
        workflow: String,
        #[arg(long, default_value = DEFAULT_CONFIG_ROOT)]
        config_root: PathBuf,
        /// Replace the task prompt (a file path or literal text).
        #[arg(long)]
        prompt: Option<String>,
        /// Edit the files in this directory instead of the descriptor's list.
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// List workflows under the config root.
    List {
        #[arg(long, default_value = DEFAULT_CONFIG_ROOT)]
        config_root: PathBuf,
    },
    /// Load and validate a workflow without running it.
    Check {
        workflow: String,
        #[arg(long, default_value = DEFAULT_CONFIG_ROOT)]
        config_root: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                exit_codes::INVALID
            } else {
                exit_codes::FAILED
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            workflow,
            config_root,
            prompt,
            context,
        } => cmd_run(
            &workflow,
            LoadOptions {
                config_root,
                prompt_override: prompt,
                context_dir: context,
            },
        ),
        Command::List { config_root } => cmd_list(&config_root),
        Command::Check {
            workflow,
            config_root,
        } => cmd_check(
            &workflow,
            LoadOptions {
                config_root,
                ..LoadOptions::default()
            },
        ),
    }
}

fn load(workflow: &str, options: &LoadOptions) -> Result<WorkflowConfig, ConfigError> {
    let path = resolve_workflow_path(workflow, &options.config_root)?;
    load_workflow(&path, options)
}

fn cmd_run(workflow: &str, options: LoadOptions) -> Result<i32> {
    let config = load(workflow, &options)?;
    let scratch_dir = config
        .log_file
        .parent()
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let coder = AiderCoder::new(config.settings.coder_limits());
    let judge = CliJudge::new(
        ProviderRegistry::default(),
        config.settings.judge_limits(),
        scratch_dir,
    );

    let outcome = Director::new(config, coder, judge)?.run()?;
    match outcome.stop {
        RunStop::Succeeded { iteration } => {
            println!("Workflow succeeded after {iteration} iteration(s).");
            Ok(exit_codes::OK)
        }
        RunStop::Exhausted => {
            println!(
                "Workflow failed after {} iteration(s).",
                outcome.iterations
            );
            Ok(exit_codes::FAILED)
        }
        RunStop::CoderFailed { iteration, error } => {
            println!("Workflow aborted in iteration {iteration}: {error}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_list(config_root: &Path) -> Result<i32> {
    let workflows = list_workflows(config_root)?;
    if workflows.is_empty() {
        println!("No workflows found in {}", config_root.display());
        return Ok(exit_codes::OK);
    }
    println!("Available workflows:");
    let width = workflows.iter().map(|w| w.name.len()).max().unwrap_or(0);
    for workflow in &workflows {
        println!("  {:<width$}  {}", workflow.name, workflow.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_check(workflow: &str, options: LoadOptions) -> Result<i32> {
    let config = load(workflow, &options)?;
    println!("Workflow:         {}", config.name);
    println!("Coder model:      {}", config.coder_model);
    println!("Evaluator model:  {}", config.evaluator_model);
    if config.evaluator_fell_back() {
        println!(
            "Evaluator:        {} (unknown '{}')",
            config.evaluator.as_str(),
            config.evaluator_tag
        );
    } else {
        println!("Evaluator:        {}", config.evaluator.as_str());
    }
    println!("Max iterations:   {}", config.max_iterations);
    println!("Command:          {}", config.execution_command);
    println!("Editable files:   {}", config.context_editable.len());
    println!("Read-only files:  {}", config.context_read_only.len());
    println!("Log file:         {}", config.log_file.display());
    Ok(exit_codes::OK)
}
