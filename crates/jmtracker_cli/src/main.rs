//! JMTracker command-line front end.
//!
//! # Responsibility
//! - Wire settings, logging, the source registry and the SQLite store.
//! - Print registry contents, run reports and stored postings.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jmtracker_core::model::columns::{DEADLINE, INSTITUTION, LOCATION, ORIGIN, ORIGIN_ID, STATUS, TITLE};
use jmtracker_core::repo::posting_repo::SourceRunStatus;
use jmtracker_core::service::ingest_service::{cached_inputs, finished_at_now};
use jmtracker_core::source::{default_sources, load_custom_sources};
use jmtracker_core::{
    db, init_logging, IngestService, NormalizedRecord, PostingRepository, RunReport, Settings,
    SourceInput, SourceRegistry, SqlitePostingRepository,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "jmtracker", version, about = "Aggregate job-market postings into one store")]
struct Cli {
    /// Settings file (TOML); missing file means defaults.
    #[arg(long, global = true, env = "JMTRACKER_SETTINGS", default_value = "settings.toml")]
    settings: PathBuf,
    /// Store database; defaults to `<storage_dir>/postings.sqlite3`.
    #[arg(long, global = true, env = "JMTRACKER_DB")]
    db: Option<PathBuf>,
    /// Log directory; defaults to `<storage_dir>/logs`.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered sources and where to get their files.
    Sources,
    /// Run the ingestion pipeline.
    Ingest {
        /// `ORIGIN=PATH`; repeatable. Without inputs, cached files are used.
        #[arg(long = "input", value_parser = parse_input)]
        inputs: Vec<(String, PathBuf)>,
        /// Scrape ORIGIN through its download action; repeatable.
        #[arg(long = "scrape")]
        scrape: Vec<String>,
    },
    /// Print stored postings.
    List {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print recent per-source run outcomes.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn parse_input(value: &str) -> Result<(String, PathBuf), String> {
    let (origin, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ORIGIN=PATH, got `{value}`"))?;
    let origin = origin.trim();
    if origin.is_empty() || path.trim().is_empty() {
        return Err(format!("expected ORIGIN=PATH, got `{value}`"));
    }
    Ok((origin.to_string(), PathBuf::from(path.trim())))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("event=cli_exit module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(&cli.settings)?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    let log_dir = absolute(cli.log_dir.unwrap_or_else(|| settings.storage_dir.join("logs")))?;
    init_logging(level, &log_dir)?;

    let registry = build_registry(&settings)?;
    let db_path = cli.db.unwrap_or_else(|| settings.db_path());

    match cli.command {
        Command::Sources => {
            print_sources(&registry);
            Ok(ExitCode::SUCCESS)
        }
        Command::Ingest { inputs, scrape } => ingest(registry, &settings, &db_path, inputs, scrape),
        Command::List { origin, limit } => {
            let mut conn = db::open_db(&db_path)?;
            let repo = SqlitePostingRepository::try_new(&mut conn)?;
            let store = repo.load_store()?;
            let origin = origin
                .map(|origin| registry.get(&origin).map(|d| d.origin().to_string()))
                .transpose()?;
            let records: Box<dyn Iterator<Item = &NormalizedRecord> + '_> = match origin.as_deref() {
                Some(origin) => Box::new(store.records_for_origin(origin)),
                None => Box::new(store.iter()),
            };
            for record in records.take(limit) {
                let cell = |column: &str| {
                    record
                        .get(column)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                };
                println!(
                    "{}#{}\t{}\t{}\t{}\t{}\t{}",
                    cell(ORIGIN),
                    cell(ORIGIN_ID),
                    cell(STATUS),
                    cell(DEADLINE),
                    cell(TITLE),
                    cell(INSTITUTION),
                    cell(LOCATION)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Runs { limit } => {
            let mut conn = db::open_db(&db_path)?;
            let repo = SqlitePostingRepository::try_new(&mut conn)?;
            for entry in repo.recent_runs(limit)? {
                println!(
                    "{}\t{}\t{}\t{}\tinserted={} updated={} rejected={}\t{}",
                    entry.finished_at,
                    entry.run_id,
                    entry.origin,
                    entry.status.as_str(),
                    entry.inserted,
                    entry.updated,
                    entry.rejected,
                    entry.message.unwrap_or_default()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_registry(settings: &Settings) -> Result<SourceRegistry> {
    let custom = load_custom_sources(&settings.custom_settings_path)?;
    let registry =
        SourceRegistry::with_custom(default_sources()?, custom, settings.custom_overrides_default)?;
    log::info!(
        "event=registry_build module=cli status=ok sources={}",
        registry.origins().join(",")
    );
    Ok(registry)
}

fn ingest(
    registry: SourceRegistry,
    settings: &Settings,
    db_path: &Path,
    inputs: Vec<(String, PathBuf)>,
    scrape: Vec<String>,
) -> Result<ExitCode> {
    let mut inputs: Vec<(String, SourceInput)> = inputs
        .into_iter()
        .map(|(origin, path)| (origin, SourceInput::File(path)))
        .chain(scrape.into_iter().map(|origin| (origin, SourceInput::Scrape)))
        .collect();
    if inputs.is_empty() {
        inputs = cached_inputs(&registry, settings);
        if inputs.is_empty() {
            bail!(
                "no inputs given and no cached source files in `{}`",
                settings.input_dir.display()
            );
        }
    }

    let mut conn = db::open_db(db_path)?;
    let mut repo = SqlitePostingRepository::try_new(&mut conn)?;
    let store = repo.load_store()?;
    let mut service = IngestService::with_store(registry, store, settings.today())
        .with_max_messages(settings.max_report_messages);

    let report = service.run(inputs).context("ingestion run aborted")?;
    repo.save_store(service.store())?;
    repo.record_runs(&report.to_run_entries(&finished_at_now()))?;

    print_report(&report, service.store().len());
    if report.failed().next().is_some() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_sources(registry: &SourceRegistry) {
    for source in registry.iter() {
        let download = source.download();
        println!(
            "{}{}\t.{}\t{}",
            source.origin(),
            if source.is_beta() { " (beta)" } else { "" },
            source.expected_extension(),
            download.url.as_deref().unwrap_or("-")
        );
        if !download.instructions.is_empty() {
            println!("    {}", download.instructions);
        }
        if let Some(name) = &download.input_file_name {
            println!("    cached as {name}");
        }
    }
}

fn print_report(report: &RunReport, total: usize) {
    println!("run {}", report.run_id);
    for outcome in &report.outcomes {
        match (&outcome.status, &outcome.report) {
            (SourceRunStatus::Merged, Some(merge)) => {
                println!(
                    "  {}: inserted={} updated={} rejected={}",
                    outcome.origin, merge.inserted, merge.updated, merge.rejected
                );
                for message in &merge.messages {
                    println!("    {message}");
                }
            }
            (status, _) => println!(
                "  {}: {}{}",
                outcome.origin,
                status.as_str(),
                outcome
                    .message
                    .as_deref()
                    .map(|message| format!(" ({message})"))
                    .unwrap_or_default()
            ),
        }
    }
    println!("store holds {total} postings");
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::parse_input;
    use std::path::PathBuf;

    #[test]
    fn parses_origin_path_pairs() {
        assert_eq!(
            parse_input("EJM=input/ejm.csv"),
            Ok(("EJM".to_string(), PathBuf::from("input/ejm.csv")))
        );
        assert!(parse_input("input/ejm.csv").is_err());
        assert!(parse_input("=x").is_err());
    }
}
