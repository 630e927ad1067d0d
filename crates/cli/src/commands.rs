//! `votegrid run | validate | sources`: config-driven snapshot reconciliation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use votegrid_recon::source::{parse_source_list, select_sources};
use votegrid_recon::{CourtesyDelay, DatasetConfig, PipelineError};

use crate::exit_codes::{EXIT_RUN_INVALID_CONFIG, EXIT_RUN_NO_DATA, EXIT_RUN_RUNTIME, EXIT_USAGE};
use crate::fetch::AutoFetcher;
use crate::CliError;

fn run_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn load_config(config_path: &Path) -> Result<DatasetConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        run_err(EXIT_RUN_INVALID_CONFIG, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    DatasetConfig::from_toml(&config_str).map_err(|e| run_err(EXIT_RUN_INVALID_CONFIG, e.to_string()))
}

fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Source list path: `--sources` as given, else `[sources] list` relative to
/// the config file's directory.
fn source_list_path(
    config: &DatasetConfig,
    config_path: &Path,
    sources: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    match (sources, &config.sources.list) {
        (Some(path), _) => Ok(path),
        (None, Some(list)) => Ok(config_dir(config_path).join(list)),
        (None, None) => Err(CliError {
            code: EXIT_USAGE,
            message: format!("dataset '{}' has no source list", config.name),
            hint: Some("pass --sources FILE or set [sources] list in the config".into()),
        }),
    }
}

/// Identifiers from the list file, plus the directory local identifiers
/// resolve against.
fn load_identifiers(list_path: &Path) -> Result<(Vec<String>, PathBuf), CliError> {
    let text = std::fs::read_to_string(list_path).map_err(|e| {
        run_err(EXIT_RUN_RUNTIME, format!("cannot read source list {}: {e}", list_path.display()))
    })?;
    Ok((parse_source_list(&text), config_dir(list_path).to_path_buf()))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn cmd_run(
    config_path: PathBuf,
    sources: Option<PathBuf>,
    out: Option<PathBuf>,
    json_output: bool,
    timeout_secs: u64,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    let out = out.or_else(|| {
        config
            .output
            .csv
            .as_ref()
            .map(|csv| config_dir(&config_path).join(csv))
    });
    if json_output && out.is_none() {
        return Err(CliError {
            code: EXIT_USAGE,
            message: "--json needs the CSV written to a file".into(),
            hint: Some("pass --out FILE or set [output] csv in the config".into()),
        });
    }

    let list_path = source_list_path(&config, &config_path, sources)?;
    let (identifiers, base_dir) = load_identifiers(&list_path)?;

    let mut fetcher = AutoFetcher::new(base_dir, Duration::from_secs(timeout_secs))
        .map_err(|e| run_err(EXIT_RUN_RUNTIME, e.to_string()))?;
    let mut pacer = CourtesyDelay::new(config.courtesy_multiplier);

    let report = votegrid_recon::run(&config, &identifiers, &mut fetcher, &mut pacer).map_err(|e| match e {
        PipelineError::EmptyDataset { .. } => CliError {
            code: EXIT_RUN_NO_DATA,
            message: e.to_string(),
            hint: Some(format!(
                "{} identifier(s) listed in {}; check the filters and the logged fetch failures",
                identifiers.len(),
                list_path.display()
            )),
        },
        other => run_err(EXIT_RUN_RUNTIME, other.to_string()),
    })?;

    // CSV
    match &out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| run_err(EXIT_RUN_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
            report
                .table
                .write_csv(std::io::BufWriter::new(file))
                .map_err(|e| run_err(EXIT_RUN_RUNTIME, e.to_string()))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            report
                .table
                .write_csv(&mut lock)
                .map_err(|e| run_err(EXIT_RUN_RUNTIME, e.to_string()))?;
            lock.flush()
                .map_err(|e| run_err(EXIT_RUN_RUNTIME, format!("cannot write stdout: {e}")))?;
        }
    }

    if json_output {
        let doc = serde_json::json!({
            "summary": &report.summary,
            "unresolved": &report.unresolved,
        });
        let json_str = serde_json::to_string_pretty(&doc)
            .map_err(|e| run_err(EXIT_RUN_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &report.summary;
    eprintln!(
        "{} ({}): {} row(s), {} filled; {} of {} source(s) fetched in {} pass(es), {} unresolved, {} record(s) dropped",
        s.dataset,
        s.feed,
        s.rows,
        s.rows_filled,
        s.sources_fetched,
        s.sources_selected,
        s.passes,
        s.sources_unresolved,
        s.records_dropped,
    );
    let l = &s.levels;
    eprintln!(
        "levels: {} source, {} precinct totals, {} counties, {} county totals, {} states, {} state totals",
        l.source, l.precinct_totals, l.counties, l.county_totals, l.states, l.state_totals,
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: {} feed '{}' with {} candidate(s), rollup to {}",
        config.feed,
        config.name,
        config.candidates.len(),
        if config.rollup.includes_state() { "state" } else { "county" },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// sources
// ---------------------------------------------------------------------------

pub fn cmd_sources(config_path: PathBuf, sources: Option<PathBuf>, json_output: bool) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let list_path = source_list_path(&config, &config_path, sources)?;
    let (identifiers, _) = load_identifiers(&list_path)?;

    let selected = select_sources(&identifiers, &config);
    let fmt_time = |t: Option<chrono::NaiveDateTime>| t.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string());

    if json_output {
        let rows: Vec<serde_json::Value> = selected
            .iter()
            .map(|source| {
                serde_json::json!({
                    "source": source,
                    "canonical_key": source.canonical_key(),
                    "capture_time": fmt_time(source.capture_time()),
                    "snapshot_time": fmt_time(source.snapshot_time()),
                })
            })
            .collect();
        let json_str = serde_json::to_string_pretty(&rows)
            .map_err(|e| run_err(EXIT_RUN_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for source in &selected {
            println!(
                "{}\t{}\t{}",
                fmt_time(source.capture_time()).as_deref().unwrap_or("-"),
                fmt_time(source.snapshot_time()).as_deref().unwrap_or("-"),
                source.canonical_key(),
            );
        }
    }

    eprintln!("{} of {} identifier(s) eligible", selected.len(), identifiers.len());
    Ok(())
}
