use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use codereport_ai::{GenerationConfig, LLMProvider, LLMProviderFactory, LlmOracle};
use codereport_core::{ConfigManager, FsSourceProvider, GraphPackage, LoggingConfig};
use codereport_report::{CodeReportBuilder, ReportOptions};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Registry};

#[derive(Parser)]
#[command(name = "codereport")]
#[command(about = "CodeReport - Narrative reports from code knowledge graphs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a report from a graph package
    Report {
        /// Graph package JSON produced by the graph builder
        #[arg(short, long)]
        package: PathBuf,

        /// Root of the code base the graph was built from
        #[arg(short, long)]
        code_base: PathBuf,

        /// Number of subsystems to describe (overrides the config)
        #[arg(short, long)]
        num_components: Option<usize>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (defaults to .codereport.toml, then ~/.codereport/config.toml)
        #[arg(long, env = "CODEREPORT_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Write a default config file
    InitConfig {
        /// Destination path
        #[arg(default_value = ".codereport.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            package,
            code_base,
            num_components,
            output,
            config,
        } => run_report(&package, &code_base, num_components, output.as_deref(), config.as_deref()).await,
        Commands::InitConfig { path } => init_config(&path),
    }
}

async fn run_report(
    package: &Path,
    code_base: &Path,
    num_components: Option<usize>,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let manager = match config_path {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let config = manager.config();

    init_logging(&config.logging);
    log_loaded_config(&manager);

    let mut options = ReportOptions::from(&config.report);
    if let Some(n) = num_components {
        ensure!(n > 0, "--num-components must be at least 1");
        options.num_critical_components = n;
    }

    let graph = GraphPackage::from_json_file(package)
        .with_context(|| format!("Failed to load graph package {}", package.display()))?;
    ensure!(
        code_base.is_dir(),
        "Code base root {} is not a directory",
        code_base.display()
    );

    let provider = LLMProviderFactory::create_from_config(&config.llm)?;
    info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        "Using LLM provider"
    );
    let oracle = LlmOracle::new(provider).with_generation_config(GenerationConfig {
        temperature: config.llm.temperature,
        max_tokens: Some(config.llm.max_tokens),
        reasoning_effort: config.llm.reasoning_effort.clone(),
        ..Default::default()
    });

    let builder = CodeReportBuilder::new(
        Arc::new(oracle),
        &graph,
        Arc::new(FsSourceProvider::new(code_base)),
        options,
    );

    let report = match builder.build_report().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!(
                "{} report build failed at {}: {}",
                "Error:".red().bold(),
                e.stage().to_string().yellow(),
                e
            );
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            std::fs::write(path, &report)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("{} {}", "✓ Report written to".green(), path.display());
        }
        None => println!("{}", report),
    }

    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to create config at {}", path.display()))?;
    println!("{} {}", "✓ Created default config at".green(), path.display());
    Ok(())
}

/// Config loading happens before a subscriber exists, so its outcome is
/// logged again here.
fn log_loaded_config(manager: &ConfigManager) {
    let config = manager.config();
    match manager.config_path() {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No config file found, using defaults"),
    }
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        components = config.report.num_critical_components,
        "Report settings"
    );
}

/// Logs go to stderr so a report on stdout stays clean. `RUST_LOG` wins over
/// the configured level.
fn init_logging(logging: &LoggingConfig) {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format.as_str() {
        "json" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().json().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        "compact" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().compact().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        _ => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).ok();
        }
    }
}
