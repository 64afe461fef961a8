use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use sekolah_import::analysis;
use sekolah_import::config::Config;
use sekolah_import::db::SqliteStore;
use sekolah_import::error::ImportError;
use sekolah_import::logging;
use sekolah_import::pipeline::{CancelFlag, ImportPipeline, ImportRequest};
use sekolah_import::source::SourceFormat;
use sekolah_import::types::ImportSummary;

#[derive(Parser)]
#[command(name = "sekolah-import")]
#[command(about = "Import the Malaysian school directory spreadsheet into the schools table")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ./sekolah-import.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert every school in the spreadsheet and log the batch
    Import {
        /// Spreadsheet to import (defaults to the configured path)
        path: Option<PathBuf>,
        /// Batch label; defaults to BATCH_<timestamp>
        #[arg(long)]
        batch_id: Option<String>,
        /// Source name recorded in the batch log; defaults to the file name
        #[arg(long)]
        source_name: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Xlsx)]
        format: Format,
        /// Fold state and city aliases to canonical names and log the changes with the batch
        #[arg(long)]
        canonicalize_names: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Profile the spreadsheet columns and export JSON and CSV summaries
    Analyze {
        path: Option<PathBuf>,
        #[arg(long, default_value = "docs/school-directory")]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Xlsx)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Xlsx,
    Csv,
}

impl From<Format> for SourceFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Xlsx => SourceFormat::Xlsx,
            Format::Csv => SourceFormat::Csv,
        }
    }
}

fn ensure_exists(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        eprintln!("Error: File not found: {}", path.display());
        eprintln!("Usage: sekolah-import import [path_to_excel_file]");
        anyhow::bail!(ImportError::source_unavailable(
            path.display().to_string(),
            "file not found"
        ));
    }
    Ok(())
}

fn print_summary(summary: &ImportSummary, preview: usize) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    if summary.cancelled {
        println!("Import Cancelled (work so far committed)");
    } else {
        println!("Import Complete!");
    }
    println!("{rule}");
    println!("Batch ID: {}", summary.batch_id);
    println!("Total schools: {}", summary.total);
    println!("New imports: {}", summary.imported);
    println!("Updated: {}", summary.updated);
    println!("Failed: {}", summary.failed);
    if let Some(changes) = &summary.name_changes {
        println!(
            "Canonicalized names: {} states, {} cities",
            changes.states.len(),
            changes.cities.len()
        );
    }

    if !summary.errors.is_empty() {
        println!("\nFirst {} errors:", preview.min(summary.errors.len()));
        for e in summary.errors.iter().take(preview) {
            println!("  - {}", e);
        }
    }
    if let Some(e) = &summary.log_error {
        println!("\nWarning: batch log not written: {}", e);
    }
}

async fn run_import(
    config: Config,
    path: PathBuf,
    batch_id: Option<String>,
    format: SourceFormat,
) -> anyhow::Result<ImportSummary> {
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current record");
            on_signal.cancel();
        }
    });

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<ImportSummary> {
        let mut request = ImportRequest::from_path(&path, format, &config.import)?;
        if let Some(id) = batch_id {
            request = request.with_batch_id(id);
        }
        let store = SqliteStore::open(&config.store).context("Failed to open school store")?;
        let summary = ImportPipeline::new(&config.import, &store, &store)
            .with_cancel(cancel)
            .run(request)?;
        Ok(summary)
    })
    .await
    .context("Import task panicked")??;

    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Import {
            path,
            batch_id,
            source_name,
            format,
            canonicalize_names,
            json,
        } => {
            let path = path.unwrap_or_else(|| config.import.default_path.clone());
            ensure_exists(&path)?;
            if source_name.is_some() {
                config.import.source_name = source_name;
            }
            if canonicalize_names {
                config.import.canonicalize_names = true;
            }
            let preview = config.import.console_error_preview;

            println!("Reading Excel file: {}", path.display());
            info!(store = ?config.store, "Running import");
            let summary = run_import(config, path, batch_id, format.into()).await;
            match summary {
                Ok(summary) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else {
                        print_summary(&summary, preview);
                    }
                }
                Err(e) => {
                    error!("Import failed: {:#}", e);
                    return Err(e);
                }
            }
        }
        Commands::Analyze {
            path,
            out_dir,
            format,
        } => {
            let path = path.unwrap_or_else(|| config.import.default_path.clone());
            ensure_exists(&path)?;

            let mut source = SourceFormat::from(format).open(&path);
            let rows = analysis::load_rows(source.as_mut(), config.import.header_row)?;
            let (report, paths) = analysis::write_report(&rows, &out_dir)?;

            let rule = "=".repeat(80);
            println!("Total schools: {}", report.total_schools);
            println!("\n{rule}\n");
            println!("States (NEGERI): {}", report.states.len());
            println!("Sample: {:?}", report.states.iter().take(10).collect::<Vec<_>>());
            println!("\n{rule}\n");
            println!("Education Levels (PERINGKAT): {:?}", report.education_levels);
            println!("School Types (JENIS): {:?}", report.school_types);
            println!("\n{rule}\n");
            println!("Sample schools:");
            for [code, name, state, level, kind] in analysis::preview(&rows, 10) {
                println!("  {code:<10} {name:<50} {state:<20} {level:<10} {kind}");
            }
            println!("\n[SAVED] Analysis saved to {}", paths.json.display());
            println!("[SAVED] Full data saved to {}", paths.csv.display());
        }
    }
    Ok(())
}
