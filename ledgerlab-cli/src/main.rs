//! LedgerLab CLI: scenario runs, profit ledgers, and drawdown analysis.
//!
//! Commands:
//! - `run`: aggregate, fetch, and build ledgers for one symbol/scenario
//! - `profits`: build profit ledgers for a trader list from local data files
//! - `drawdown`: drawdown and streak statistics for one trader

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledgerlab_core::Direction;
use ledgerlab_runner::ledgers::{build_profit_ledgers, list_data_files, read_trader_ids};
use ledgerlab_runner::{analyze_trader, run_scenario, write_timeline, PipelineConfig, RunContext, RunReport};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledgerlab", about = "LedgerLab: per-trader profit ledgers from scenario trades")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one symbol and scenario.
    Run {
        #[arg(long)]
        symbol: String,

        #[arg(long)]
        scenario: String,

        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bucket holding the scenario summary CSVs.
        #[arg(long, env = "S3_MOCHI_GRAPHS_BUCKET")]
        summary_bucket: Option<String>,

        /// Root of the directory-backed object store.
        #[arg(long)]
        store_root: Option<PathBuf>,

        /// Root of the output tree. Defaults to ./output.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip uploading scenario archives.
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },
    /// Build profit ledgers for the trader ids listed in a file.
    Profits {
        /// Text file with one trader id per line.
        #[arg(long)]
        trader_ids: PathBuf,

        /// Directory of partition data files.
        #[arg(long)]
        data_dir: PathBuf,

        #[arg(long)]
        symbol: String,

        /// Ledgers go to <output-dir>/<symbol>/<scenario>/profits.
        #[arg(long)]
        scenario: String,

        /// Root of the output tree. Defaults to the config's output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sort the ledgers chronologically afterwards.
        #[arg(long, default_value_t = false)]
        sort: bool,
    },
    /// Drawdown, melt-up, and streak statistics for one trader.
    Drawdown {
        #[arg(long)]
        trader_id: String,

        /// Directory of partition data files.
        #[arg(long)]
        data_dir: PathBuf,

        /// Timeline CSV destination.
        #[arg(long, default_value = "drawdown.csv")]
        output: PathBuf,

        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Treat trades as short (profit = filled - exit).
        #[arg(long, default_value_t = false)]
        short: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            symbol,
            scenario,
            config,
            summary_bucket,
            store_root,
            output_dir,
            no_export,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(bucket) = summary_bucket {
                config.summary_bucket = bucket;
            }
            if let Some(root) = store_root {
                config.store_root = root;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if no_export {
                config.export = false;
            }
            config.validate()?;
            run_cmd(config, &symbol, &scenario)
        }
        Commands::Profits {
            trader_ids,
            data_dir,
            symbol,
            scenario,
            output_dir,
            config,
            sort,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if sort {
                config.sort_profit_ledgers = true;
            }
            profits_cmd(&config, &trader_ids, &data_dir, &symbol, &scenario)
        }
        Commands::Drawdown {
            trader_id,
            data_dir,
            output,
            config,
            short,
        } => drawdown_cmd(&trader_id, &data_dir, &output, config.as_deref(), short),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ledgerlab=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_cmd(config: PipelineConfig, symbol: &str, scenario: &str) -> Result<()> {
    info!(
        symbol,
        scenario,
        store = %config.store_root.display(),
        output = %config.output_dir.display(),
        "starting scenario run"
    );
    let ctx = RunContext::local(config);
    match run_scenario(&ctx, symbol, scenario) {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn print_summary(report: &RunReport) {
    println!("Symbol:    {}", report.symbol);
    println!("Scenario:  {} ({})", report.scenario, report.direction);
    if let Some(agg) = &report.aggregation {
        println!(
            "Aggregated: {} sources, {} rows kept, {} duplicates, {} traders",
            agg.sources.len(),
            agg.rows_kept,
            agg.duplicates_removed,
            agg.trader_ids.len()
        );
    }
    if let Some(fetch) = &report.fetch {
        println!(
            "Fetched:   {} partitions, {} matching lines",
            fetch.partitions(),
            fetch.route.lines_matched
        );
        let incomplete = fetch.incomplete_years();
        if !incomplete.is_empty() {
            println!("Incomplete years: {incomplete:?}");
        }
    }
    println!(
        "Ledgers:   {} files, {} rows, {} dropped lines",
        report.ledgers.files_processed, report.ledgers.build.lines_written, report.ledgers.build.lines_dropped
    );
    if let Some(export) = &report.export {
        println!("Exported:  {} archives, {} failed", export.uploaded.len(), export.failed.len());
    }
    println!("Manifest:  {}", report.manifest_path.display());
}

fn profits_cmd(
    config: &PipelineConfig,
    trader_ids_path: &Path,
    data_dir: &Path,
    symbol: &str,
    scenario: &str,
) -> Result<()> {
    let trader_ids = read_trader_ids(trader_ids_path)
        .with_context(|| format!("reading trader ids from {}", trader_ids_path.display()))?;
    if trader_ids.is_empty() {
        bail!("no trader ids in {}", trader_ids_path.display());
    }
    let files = list_data_files(data_dir)
        .with_context(|| format!("listing data files in {}", data_dir.display()))?;
    if files.is_empty() {
        bail!("no data files in {}", data_dir.display());
    }

    let direction = Direction::from_name(&format!("{scenario} {}", trader_ids_path.display()));
    let out_dir = config.layout(symbol, scenario).profits_dir();
    let summary = build_profit_ledgers(
        &trader_ids,
        &files,
        &out_dir,
        direction,
        config.trader_id_column,
        config.decompression.decompressor().as_ref(),
        config.sort_profit_ledgers,
    )?;

    println!(
        "{} {} ledgers in {} ({} rows, {} files skipped, {} ledgers failed)",
        trader_ids.len(),
        direction,
        out_dir.display(),
        summary.build.lines_written,
        summary.files_skipped.len(),
        summary.outputs_failed.len()
    );
    Ok(())
}

fn drawdown_cmd(
    trader_id: &str,
    data_dir: &Path,
    output: &Path,
    config_path: Option<&Path>,
    short: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let files = list_data_files(data_dir)
        .with_context(|| format!("listing data files in {}", data_dir.display()))?;
    let direction = if short { Direction::Short } else { Direction::Long };

    let report = analyze_trader(
        trader_id,
        &files,
        config.decompression.decompressor().as_ref(),
        config.trader_id_column,
        direction,
    )?;
    write_timeline(&report, output)?;

    let mut summary = serde_json::to_value(&report)?;
    if let Some(obj) = summary.as_object_mut() {
        obj.remove("timeline");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("Timeline written to: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "ledgerlab",
            "run",
            "--symbol",
            "ES",
            "--scenario",
            "s1-short",
            "--summary-bucket",
            "b",
            "--no-export",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                symbol,
                summary_bucket,
                no_export,
                ..
            } => {
                assert_eq!(symbol, "ES");
                assert_eq!(summary_bucket.as_deref(), Some("b"));
                assert!(no_export);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn drawdown_output_defaults() {
        let cli = Cli::try_parse_from(["ledgerlab", "drawdown", "--trader-id", "t1", "--data-dir", "d"]).unwrap();
        match cli.command {
            Commands::Drawdown { output, short, .. } => {
                assert_eq!(output, PathBuf::from("drawdown.csv"));
                assert!(!short);
            }
            _ => panic!("expected drawdown"),
        }
    }
}
