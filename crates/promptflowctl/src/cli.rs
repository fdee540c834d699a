use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands;

/// PromptFlow CLI - run, validate and inspect prompt flows
#[derive(Parser, Debug)]
#[command(name = "promptflowctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (providers, execution, retry)
    #[arg(long, short = 'c', global = true, env = "PROMPTFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "PROMPTFLOW_LOG", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for structured results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a flow file
    Run {
        /// Flow file (JSON or YAML)
        flow: PathBuf,

        /// Input variable as key=value (value parsed as JSON when possible)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// JSON or YAML file with an object of input variables
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        /// Default model for prompt nodes without a modelId
        #[arg(short, long)]
        model: Option<String>,

        /// Aggregate timeout in seconds (0 disables; overrides config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Stream execution events to stderr as JSON lines
        #[arg(long)]
        events: bool,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Validate a flow file
    Validate {
        /// Flow file (JSON or YAML)
        flow: PathBuf,
    },

    /// Describe a flow: nodes, edges, start nodes and referenced variables
    Describe {
        /// Flow file (JSON or YAML)
        flow: PathBuf,
    },

    /// List the {{variables}} referenced by a template
    Variables {
        /// Template file, or template text with --text
        template: String,

        /// Treat the argument as template text instead of a path
        #[arg(long)]
        text: bool,
    },

    /// Render a template with variables and defaults
    Render {
        /// Template file, or template text with --text
        template: String,

        /// Treat the argument as template text instead of a path
        #[arg(long)]
        text: bool,

        /// Variable as key=value
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Default as key=value, used when the variable has no value
        #[arg(short, long = "default", value_name = "KEY=VALUE")]
        defaults: Vec<String>,

        /// Fail when a variable has neither a value nor a non-empty default
        #[arg(long)]
        strict: bool,
    },

    /// Run one template against many variable sets through the router
    Batch {
        /// Template file
        template: PathBuf,

        /// JSON or YAML file with an array of variable objects
        #[arg(long)]
        inputs_file: PathBuf,

        /// Model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum concurrent requests
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List models from every configured provider
    Models {
        /// Also probe provider availability
        #[arg(long)]
        check: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: commands::completion::Shell,
    },
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        let config = commands::load_engine_config(self.config.as_deref())?;

        match self.command {
            Commands::Run {
                flow,
                inputs,
                inputs_file,
                model,
                timeout,
                events,
                output,
            } => {
                commands::run::execute(commands::run::RunArgs {
                    config,
                    flow,
                    inputs,
                    inputs_file,
                    model,
                    timeout,
                    events,
                    output,
                })
                .await
            }
            Commands::Validate { flow } => commands::validate::execute(&flow),
            Commands::Describe { flow } => commands::describe::execute(&flow),
            Commands::Variables { template, text } => {
                commands::template::variables(&template, text)
            }
            Commands::Render {
                template,
                text,
                inputs,
                defaults,
                strict,
            } => commands::template::render(&template, text, &inputs, &defaults, strict),
            Commands::Batch {
                template,
                inputs_file,
                model,
                concurrency,
                output,
            } => {
                commands::batch::execute(
                    &config,
                    &template,
                    &inputs_file,
                    model.as_deref(),
                    concurrency,
                    output,
                )
                .await
            }
            Commands::Models { check } => commands::models::execute(&config, check).await,
            Commands::Completion { shell } => commands::completion::execute(shell),
        }
    }
}
