use anyhow::Result;
use clap::{Parser, Subcommand};
use providers_finder::{ProviderRecord, ProvidersFinder};
use providers_finder_bootstrap::{build_finder, AppConfig, CliArgs};

use std::path::PathBuf;

// Ensure the built-in providers are linked and registered via inventory
#[allow(dead_code)]
fn _ensure_providers_linked() {
    let _ = std::any::type_name::<providers_finder::NamespacesConfigProvider>();
}

/// Providers Finder - provider discovery and dependency ordering
#[derive(Parser)]
#[command(name = "providers-finder")]
#[command(about = "Find the providers of a contract in dependency order")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the providers of a contract
    Find {
        /// Contract name, e.g. Routes
        contract: String,

        /// Module identifier to leave out (repeatable)
        #[arg(short, long = "exclude", value_name = "PKG")]
        exclude: Vec<String>,

        /// Print a JSON array instead of one provider per line
        #[arg(long)]
        json: bool,

        /// Resolve from scratch without reading or filling any cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Drop the cached resolution of a contract (run after installing or updating modules)
    Invalidate {
        contract: String,
    },
    /// Validate configuration and the provider registry, then exit
    Check,
}

fn main() -> Result<()> {
    _ensure_providers_linked();

    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (PF__*) -> 4) CLI overrides
    // Also normalizes + creates finder.home_dir.
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    providers_finder_bootstrap::logging::init_logging_unified(&logging_config, &config.home_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Find {
            contract,
            exclude,
            json,
            no_cache,
        } => {
            let finder = build_finder(&config)?;
            let providers = find(&finder, &contract, &exclude, no_cache)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&providers)?);
            } else {
                for p in &providers {
                    println!("{}", format_line(p));
                }
            }
            Ok(())
        }
        Commands::Invalidate { contract } => {
            let finder = build_finder(&config)?;
            let removed = finder.invalidate(&contract)?;
            println!("{removed}");
            Ok(())
        }
        Commands::Check => check_config(&config),
    }
}

fn find(
    finder: &ProvidersFinder,
    contract: &str,
    exclude: &[String],
    no_cache: bool,
) -> Result<Vec<ProviderRecord>> {
    tracing::info!(contract, ?exclude, no_cache, "Resolving providers");
    if no_cache {
        let all = finder.resolve_uncached(contract)?;
        return Ok(providers_finder::filter::exclude_packages(&all, exclude));
    }
    Ok(finder.find(contract, exclude)?)
}

/// `package  provider_ref  dep1,dep2`; `-` stands for an absent value.
fn format_line(p: &ProviderRecord) -> String {
    let deps = if p.dependencies.is_empty() {
        "-".to_string()
    } else {
        p.dependencies.join(",")
    };
    format!(
        "{}  {}  {}",
        p.package_id.as_deref().unwrap_or("-"),
        p.provider_ref,
        deps
    )
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let finder = build_finder(config)?;
    println!(
        "Configuration is valid ({} registered providers)",
        finder.registry().len()
    );
    println!("{}", config.to_yaml()?);
    Ok(())
}
