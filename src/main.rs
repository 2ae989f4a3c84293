mod aggregate;
mod error;
mod output;
mod providers;
mod setup;
mod storage;
mod ui;

use anyhow::Result;
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::providers::ProviderRegistry;
use crate::storage::SecureStorage;

#[derive(Parser)]
#[command(name = "llm-usage")]
#[command(about = "Query usage and quota windows across LLM provider accounts", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("format").args(["json", "waybar"])))]
struct Cli {
    /// Print usage as JSON
    #[arg(long)]
    json: bool,

    /// Print a waybar custom module payload
    #[arg(long)]
    waybar: bool,

    /// Only query these providers (repeatable)
    #[arg(short, long = "provider", value_name = "ID")]
    providers: Vec<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding accounts.json
    #[arg(long, env = "LLM_USAGE_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Generate shell completions
    #[arg(long = "generate", value_enum)]
    generator: Option<Shell>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage provider accounts (launches the wizard without a subcommand)
    Setup {
        #[command(subcommand)]
        action: Option<SetupAction>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SetupAction {
    /// Add an account, reading its API key or token from stdin
    Add {
        /// Provider id (claude, kimi, zai)
        provider: String,

        /// Account name
        #[arg(short, long, default_value = aggregate::DEFAULT_ACCOUNT)]
        account: String,
    },

    /// List configured accounts
    List {
        /// Only show accounts for this provider
        provider: Option<String>,
    },

    /// Rename an account
    Rename {
        provider: String,
        old: String,
        new: String,
    },

    /// Remove an account and its stored secret
    Remove { provider: String, account: String },

    /// Import the Claude CLI's OAuth credentials as the default Claude account
    MigrateClaude,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    // Handle shell completion generation
    if let Some(generator) = cli.generator {
        let mut cmd = Cli::command();
        eprintln!("Generating completion file for {generator:?}...");
        generate(generator, &mut cmd, "llm-usage", &mut io::stdout());
        return Ok(());
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("llm-usage {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Setup { action }) => {
            let storage = SecureStorage::new(cli.config_dir)?;
            debug!(config_dir = %storage.config_dir().display(), "using config directory");
            run_setup(&storage, action)?;
        }
        None => {
            let format = if cli.json {
                Format::Json
            } else if cli.waybar {
                Format::Waybar
            } else {
                Format::Pretty
            };
            show_usage(cli.config_dir, &cli.providers, format).await?;
        }
    }

    Ok(())
}

fn run_setup(storage: &SecureStorage, action: Option<SetupAction>) -> Result<()> {
    let Some(action) = action else {
        return ui::wizard::run(storage);
    };

    match action {
        SetupAction::Add { provider, account } => {
            setup::prompt_add(storage, &provider, &account)?;
        }
        SetupAction::List { provider } => {
            let accounts = setup::list_accounts(storage, provider.as_deref())?;
            setup::print_accounts(&accounts);
        }
        SetupAction::Rename { provider, old, new } => {
            setup::rename_account(storage, &provider, &old, &new)?;
            println!("✓ Renamed '{}' to '{}'", old, new.trim());
        }
        SetupAction::Remove { provider, account } => {
            setup::remove_account(storage, &provider, &account)?;
            println!("✓ Removed account '{}' from {}", account, provider);
        }
        SetupAction::MigrateClaude => {
            let expires_at = setup::migrate_claude(storage)?;
            println!("✓ Imported Claude CLI credentials as the default Claude account");
            if let Some(at) = expires_at {
                println!("  Token expires {}", at.format("%Y-%m-%d %H:%M UTC"));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pretty,
    Json,
    Waybar,
}

async fn show_usage(config_dir: Option<PathBuf>, providers: &[String], format: Format) -> Result<()> {
    let stats = match collect_usage(config_dir, providers).await {
        Ok(stats) => stats,
        Err(err) if format == Format::Waybar => {
            error!(error = %format!("{:#}", err), "failed to collect usage");
            let payload = output::waybar::error(&format!("{:#}", err));
            println!("{}", serde_json::to_string(&payload)?);
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    match format {
        Format::Pretty => println!("{}", output::pretty::render(&stats)),
        Format::Json => println!("{}", output::json::render(&stats)?),
        Format::Waybar => {
            println!("{}", serde_json::to_string(&output::waybar::build(&stats))?)
        }
    }

    Ok(())
}

async fn collect_usage(
    config_dir: Option<PathBuf>,
    providers: &[String],
) -> Result<providers::UsageStats> {
    let storage = SecureStorage::new(config_dir)?;
    let accounts = aggregate::resolve_accounts(&storage, providers)?;
    debug!(accounts = accounts.len(), "resolved accounts");

    aggregate::collect(&accounts, &ProviderRegistry::with_defaults()).await
}
