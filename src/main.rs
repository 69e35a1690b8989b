use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use papa_core::{PapaConfig, PapaError, PullRequestTarget};
use papa_review::dispatch::{self, EventOutcome};
use papa_review::event::parse_event;
use tracing_subscriber::EnvFilter;

mod server;

const CONFIG_FILE: &str = ".papa.toml";

#[derive(Parser)]
#[command(
    name = "papa",
    version,
    about = "Automated LLM reviews for GitHub pull requests",
    long_about = "Code Review Papa reviews GitHub pull requests with an LLM and posts exactly\n\
                   one signed comment per pull request.\n\n\
                   Examples:\n  \
                     papa serve                         Listen for GitHub webhooks\n  \
                     papa review --pr owner/repo#42     Review one pull request now\n  \
                     papa event --file payload.json     Replay a webhook payload\n  \
                     papa init                          Write a starter .papa.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .papa.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server
    #[command(long_about = "Run the webhook server.\n\n\
        Accepts GitHub deliveries on POST /webhook and reviews pull requests that\n\
        were opened, reopened, edited, or synchronized. GET /healthz answers probes.\n\n\
        Examples:\n  papa serve\n  PAPA_BIND=127.0.0.1:3000 papa serve")]
    Serve,
    /// Review a single pull request, bypassing the event filter
    #[command(long_about = "Review a single pull request, bypassing the event filter.\n\n\
        The dedup and size gates still apply: a PR that already carries a\n\
        Code Review Papa comment is left alone.\n\n\
        Examples:\n  papa review --pr octocat/hello#7\n  papa review --pr octocat/hello#7 --installation-id 123")]
    Review {
        /// Pull request as owner/repo#number
        #[arg(long)]
        pr: PullRequestTarget,

        /// GitHub App installation to authenticate as
        #[arg(long)]
        installation_id: Option<u64>,
    },
    /// Run a raw webhook payload through the full pipeline
    #[command(long_about = "Run a raw pull_request webhook payload through the full pipeline.\n\n\
        Reads the payload from a file or stdin.\n\n\
        Examples:\n  papa event --file payload.json\n  cat payload.json | papa event")]
    Event {
        /// Read the payload from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Create a default .papa.toml configuration file
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Machine-readable JSON with camelCase keys
    Json,
}

const DEFAULT_CONFIG: &str = r#"# Code Review Papa configuration
# Environment variables override every value in this file.

[github]
# Static token, or set GITHUB_TOKEN
# token = "ghp_..."
# GitHub App authentication takes precedence when a private key is present
# app_id = 12345                        # GITHUB_APP_ID
# private_key_path = "papa.private-key.pem"  # GITHUB_APP_PRIVATE_KEY_PATH
# installation_id = 67890               # GITHUB_APP_INSTALLATION_ID
api_url = "https://api.github.com"
# webhook_secret = "..."                # GITHUB_WEBHOOK_SECRET

[llm]
model = "deepseek-coder"
base_url = "https://api.deepseek.com"
# api_key = "..."                       # DEEPSEEK_KEY
max_tokens = 1000
temperature = 0.7
timeout_secs = 120

[review]
# Larger diffs get a short advisory instead of a review
max_diff_bytes = 100000

[server]
bind = "0.0.0.0:8080"
deadline_secs = 60
"#;

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PapaConfig> {
    let mut config = match path {
        Some(path) => PapaConfig::from_file(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                PapaConfig::from_file(default_path)?
            } else {
                PapaConfig::default()
            }
        }
    };
    config.apply_env()?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let mut input = Vec::new();
            std::io::stdin()
                .read_to_end(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

fn render_outcome(outcome: &EventOutcome, format: OutputFormat) -> Result<String, PapaError> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(outcome)?,
        OutputFormat::Text => match outcome {
            EventOutcome::Ineligible { action } => {
                format!("ignored: action '{action}' does not trigger a review")
            }
            EventOutcome::Reviewed { outcome } => outcome.to_string(),
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Command::Serve => {
            let config = load_config(cli.config.as_deref())?;
            server::serve(Arc::new(config)).await?;
        }
        Command::Review {
            ref pr,
            installation_id,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let outcome = dispatch::review_pull_request(&config, pr, installation_id).await?;
            println!("{}", render_outcome(&EventOutcome::Reviewed { outcome }, cli.format)?);
        }
        Command::Event { ref file } => {
            let payload = read_payload(file.as_deref())?;
            let event = parse_event(&payload)?;
            let config = load_config(cli.config.as_deref())?;
            let outcome = dispatch::dispatch(&event, |event| {
                dispatch::connect(&config, event.installation_id)
            })
            .await?;
            println!("{}", render_outcome(&outcome, cli.format)?);
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "papa", &mut std::io::stdout());
        }
    }

    Ok(())
}
