//! mongo-pg-migrate CLI - two-pass MongoDB to PostgreSQL migration.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mongo_pg_migrate::{AttributeDescriptor, Config, MigrateError, Orchestrator};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mongo-pg-migrate")]
#[command(about = "Two-pass MongoDB to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the target and migrate every collection
    Run {
        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Dry run: migrate into memory and report counts without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the model registry with classified attributes
    Inspect,

    /// Compare collection document counts with table row counts
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            target_schema,
            dry_run,
        } => {
            if let Some(schema) = target_schema {
                config.target.schema = schema;
                config.validate()?;
            }
            info!("Target: {}", config.target.display_target());

            let orchestrator = if dry_run {
                Orchestrator::dry_run(config).await?
            } else {
                Orchestrator::new(config).await?
            };
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Models: {}", result.models_loaded);
                println!("  Tables: {}", result.tables_migrated);
                println!("  Rows: {}", result.rows_inserted);
                println!("  Link rows: {}", result.link_rows);
                println!("  Foreign keys: {}", result.foreign_keys);
                if result.duplicates_skipped > 0 {
                    println!("  Duplicates skipped: {}", result.duplicates_skipped);
                }
                if result.dangling > 0 || result.parent_misses > 0 {
                    println!(
                        "  Dropped: {} dangling references, {} fields without parent",
                        result.dangling, result.parent_misses
                    );
                }
                if !result.skipped_tables.is_empty() {
                    println!("  Shared tables skipped: {:?}", result.skipped_tables);
                }
            }
        }

        Commands::Inspect => {
            let orchestrator = Orchestrator::new(config).await?;
            let registry = orchestrator.inspect().await;
            orchestrator.close().await;
            let registry = registry?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(registry.models())?);
            } else {
                for model in registry.models() {
                    let degraded = if model.is_degraded() { " (unresolved namespace)" } else { "" };
                    println!("{} -> {}{}", model.uid, model.collection_name, degraded);
                    for (name, attribute) in &model.attributes {
                        if matches!(attribute, AttributeDescriptor::Scalar { .. }) {
                            continue;
                        }
                        println!("    {:<28} {}", name, attribute.label());
                    }
                }
                println!("\n{} models", registry.len());
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.validate().await;
            orchestrator.close().await;
            let report = report?;

            let mismatched = report.values().filter(|v| !v.matches).count();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Validation Results:");
                for (table, counts) in &report {
                    println!(
                        "  {:<40} source={:<10} target={:<10} {}",
                        table,
                        counts.source_documents,
                        counts.target_rows,
                        if counts.matches { "OK" } else { "MISMATCH" }
                    );
                }
            }

            if mismatched > 0 {
                return Err(MigrateError::Config(format!(
                    "Validation failed: {} of {} tables differ",
                    mismatched,
                    report.len()
                )));
            }
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MongoDB): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
