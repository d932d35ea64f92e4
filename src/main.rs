use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::config::DEFAULT_CONFIG_FILE;
use repomirror::{
    Config, GitHubClient, ListingStrategy, MirrorEngine, RepoState, SyncResult, SyncSummary,
};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "Mirror every non-fork GitHub repository you own onto local disk")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Destination directory (overrides `destination` from the config file)
    #[arg(short, long)]
    dest: Option<String>,

    /// Repository listing strategy: `search` or `user`
    #[arg(long)]
    strategy: Option<ListingStrategy>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Clone missing repositories and fast-forward existing ones (default)
    Sync,

    /// List the repositories that would be mirrored
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting repomirror v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    if let Some(dest) = cli.dest {
        config.destination = dest;
    }
    if let Some(strategy) = cli.strategy {
        config.listing = strategy;
    }

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => cmd_sync(&config).await,
        Commands::List => cmd_list(&config).await,
    }
}

/// Initialize logging based on verbosity level
///
/// Logs go to stderr; stdout carries the status lines.
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Mirror every repository of the authenticated user
async fn cmd_sync(config: &Config) -> Result<()> {
    let client = GitHubClient::new(config).context("Failed to create GitHub client")?;
    let username = client
        .get_identity()
        .await
        .context("Failed to resolve the authenticated user")?;

    let root = config.destination_path()?;
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create destination directory {}", root.display()))?;

    println!("🔍 Discovering repositories for {}...", username);
    let repos = client
        .list_repositories(&username, config.listing)
        .await
        .context("Failed to list repositories")?;
    println!("   Found {} repositories", repos.len());

    let engine = MirrorEngine::new(config);
    let summary = engine.sync_all(&repos, &root, print_result).await;

    print_summary(&summary);
    Ok(())
}

/// List repositories that would be mirrored
async fn cmd_list(config: &Config) -> Result<()> {
    let client = GitHubClient::new(config).context("Failed to create GitHub client")?;
    let username = client
        .get_identity()
        .await
        .context("Failed to resolve the authenticated user")?;

    let repos = client
        .list_repositories(&username, config.listing)
        .await
        .context("Failed to list repositories")?;

    println!("Repositories ({}): ", repos.len());
    for repo in repos {
        println!("  📁 {}  {}", repo.name, repo.clone_url);
    }

    Ok(())
}

fn print_result(result: &SyncResult) {
    match result {
        SyncResult::Cloned { name, .. } => {
            println!("Cloning {}...", name);
            println!("   📥 Cloned {}", name);
        }
        SyncResult::Recloned { name, path } => {
            print_corruption_notice(path);
            println!("Cloning {}...", name);
            println!("   📥 Cloned {}", name);
        }
        SyncResult::Pulled { name, from, to, .. } => {
            let from = from.as_deref().map(short_id).unwrap_or("(none)");
            println!("Updating {}...", name);
            println!("   🔄 Updated {} ({}..{})", name, from, short_id(to));
        }
        SyncResult::UpToDate { name, .. } => println!("{} is up to date.", name),
        SyncResult::Failed {
            name,
            path,
            state,
            error,
        } => {
            match state {
                RepoState::Absent => println!("Cloning {}...", name),
                RepoState::CorruptCopy => {
                    print_corruption_notice(path);
                    println!("Cloning {}...", name);
                }
                RepoState::ValidCopy => println!("Updating {}...", name),
            }
            println!("   ❌ Failed to mirror {}: {}", name, error);
        }
    }
}

fn print_corruption_notice(path: &Path) {
    println!(
        "Error: {} is not a git repository. Removing and cloning again...",
        path.display()
    );
}

fn print_summary(summary: &SyncSummary) {
    println!("\n🎉 Mirroring Complete!");
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Updated: {}", summary.pulled);
    println!("   ✅ Up to date: {}", summary.up_to_date);
    println!("   ❌ Failed: {}", summary.failed_operations);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed_operations > 0 {
        println!("\n🔍 Failed Operations:");
        for result in summary.failures() {
            if let SyncResult::Failed { path, error, .. } = result {
                println!("   ❌ {}: {}", path.display(), error);
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}
