//! Command-line front end for the dataset versioning core: create, compare,
//! rollback, list, history, info and verify.
//!
//! Configuration is layered: defaults, then `--config`, then `DSV_*`
//! environment variables, then `--root` / `-v`. Each error kind exits with
//! its own non-zero status.

mod cli;
mod profile;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use version_store_core::{
    Dataset, IndexManager, RollbackController, VersionComparator, VersionCreator, VersionError,
    VersionStore, VersioningConfig,
};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => return report(err),
    };
    init_tracing(&config.log_level, cli.verbose);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(err),
    }
}

fn report(err: anyhow::Error) -> ExitCode {
    eprintln!("Error: {:#}", err);
    let code = err
        .downcast_ref::<VersionError>()
        .map_or(1, VersionError::exit_code);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn load_config(cli: &Cli) -> Result<VersioningConfig> {
    let mut config = match &cli.config {
        Some(path) => VersioningConfig::from_file(path)?,
        None => VersioningConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(log_level: &str, verbose: u8) {
    let level = match verbose {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands, config: &VersioningConfig) -> Result<()> {
    match command {
        Commands::Create {
            input,
            schema,
            source,
            quality_score,
            activate,
            no_activate,
        } => {
            let dataset = read_dataset(&input, schema.as_deref())?;
            let source = source.unwrap_or_else(|| input.display().to_string());
            let created = VersionCreator::new(config).create(
                &dataset,
                &source,
                quality_score,
                Commands::activation_override(activate, no_activate),
            )?;
            tracing::debug!(
                "Version {} stored at revision {} ({})",
                created.record.id,
                created.revision,
                created.record.file_hash
            );
            println!("{}", created.record.id);
        }

        Commands::Compare { a, b, output } => {
            let comparator = VersionComparator::new(config);
            let report = comparator.compare(&a, &b)?;
            let path = comparator.save_report(&report, output.as_deref())?;

            println!("Comparison: {} -> {}", report.version_a, report.version_b);
            println!(
                "  Rows: {} -> {} ({:+}, {:+.2}%, {})",
                report.row_count_a,
                report.row_count_b,
                report.row_count_delta,
                report.percentage_change,
                report.direction
            );
            if !report.columns_added.is_empty() {
                println!("  Columns added: {}", report.columns_added.join(", "));
            }
            if !report.columns_removed.is_empty() {
                println!("  Columns removed: {}", report.columns_removed.join(", "));
            }
            for change in &report.type_changes {
                println!("  Type change: {} {} -> {}", change.column, change.from, change.to);
            }
            println!("  Total differences: {}", report.summary.total_differences);
            for line in &report.summary.key_changes {
                println!("    - {}", line);
            }
            println!("Report written to {}", path.display());
        }

        Commands::Rollback { id } => {
            let outcome = RollbackController::new(config).rollback(&id)?;
            if outcome.changed {
                println!(
                    "Active version: {} (was {})",
                    outcome.active,
                    outcome.previous.as_deref().unwrap_or("none")
                );
            } else {
                println!("Active version: {} (unchanged)", outcome.active);
            }
        }

        Commands::List => {
            let index = IndexManager::new(config).read()?;
            if index.is_empty() {
                println!("No versions in {}", config.root.display());
            }
            for record in index.records() {
                let marker = if index.active.as_deref() == Some(record.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let quality = record
                    .quality_score
                    .map_or_else(|| "-".to_string(), |q| format!("{:.2}", q));
                println!(
                    "{} {:<8} {}  rows={:<8} cols={:<4} quality={:<5} {}",
                    marker,
                    record.id,
                    record.created_at.to_rfc3339(),
                    record.row_count,
                    record.column_count(),
                    quality,
                    record.source
                );
            }
            let orphans = VersionStore::new(config).unreferenced_dirs(&index, &config.id_prefix)?;
            if !orphans.is_empty() {
                println!("Unreferenced directories: {}", orphans.join(", "));
            }
        }

        Commands::History => {
            let history = RollbackController::new(config).history()?;
            if history.is_empty() {
                println!("No rollbacks recorded");
            }
            for event in history {
                println!(
                    "{}  {} -> {}",
                    event.timestamp.to_rfc3339(),
                    event.from_version.as_deref().unwrap_or("none"),
                    event.to_version
                );
            }
        }

        Commands::Info { id } => {
            let index = IndexManager::new(config).read()?;
            let record = index.get(&id).ok_or_else(|| VersionError::VersionNotFound {
                id: id.clone(),
                operation: "info",
            })?;
            let active = index.active.as_deref() == Some(record.id.as_str());

            println!("Version: {}{}", record.id, if active { " (active)" } else { "" });
            println!("  Created:  {}", record.created_at.to_rfc3339());
            println!("  Source:   {}", record.source);
            println!("  Rows:     {}", record.row_count);
            println!("  Columns:  {}", record.column_count());
            for column in &record.columns {
                println!("    {} ({})", column.name, column.inferred_type);
            }
            match record.quality_score {
                Some(q) => println!("  Quality:  {:.2}", q),
                None => println!("  Quality:  -"),
            }
            println!("  Size:     {} bytes", record.file_size_bytes);
            println!("  Hash:     {}", record.file_hash);
            println!(
                "  Stored at: {}",
                config.root.join(&record.storage_path).display()
            );
        }

        Commands::Verify { id } => {
            let manifest = VersionStore::new(config).verify(&id)?;
            println!(
                "{} OK ({} bytes, {})",
                id, manifest.file_size_bytes, manifest.file_hash
            );
        }
    }
    Ok(())
}

/// Reads the input payload and works out its shape.
fn read_dataset(input: &Path, schema: Option<&Path>) -> Result<Dataset> {
    let payload =
        fs::read(input).with_context(|| format!("Failed to read input {}", input.display()))?;
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let shape = match schema {
        Some(path) => profile::load_schema(path, &payload, &extension)?,
        None if profile::is_csv(&extension) => profile::profile_csv(&payload)
            .with_context(|| format!("Failed to profile {}", input.display()))?,
        None => anyhow::bail!(
            "{} is not CSV; pass --schema with its columns and row_count",
            input.display()
        ),
    };

    Ok(Dataset::new(payload, extension, shape.row_count, shape.columns))
}
