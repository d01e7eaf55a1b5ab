// Command-line front end.
//
// Loads the given report files once, derives every review table from the
// unified data under the session settings, prints short previews and writes
// the CSV, JSON and workbook exports.
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use mismatch_report::analysis::{
    analyze_issue_types, calculate_region_timeline, calculate_summary_stats, compare_reports,
    compare_two_regions, predict_future_trend, region_totals, TREND_LIMITATION,
};
use mismatch_report::cache::LoadCache;
use mismatch_report::columns::detect_columns;
use mismatch_report::config::SessionConfig;
use mismatch_report::loader::read_sources;
use mismatch_report::logging::init_logging;
use mismatch_report::output::{self, ChartImage, WorkbookContent};
use mismatch_report::reports::{
    calculate_benchmark, calculate_progress, find_new_issues, find_repeated_issues,
    new_issues_by_region,
};
use mismatch_report::types::{ColumnRoles, FileInfo, UnifiedTable};
use mismatch_report::util;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const PREVIEW_ROWS: usize = 5;
const TOP_REGIONS: usize = 10;

#[derive(Parser, Debug)]
#[command(
    name = "mismatch-report",
    about = "Compare dated mismatch reports and track remediation progress"
)]
struct Cli {
    /// Report files named like `<prefix>_YYYYMMDD.csv` (also xlsx, xlsm, xlsb, xls, ods)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// TOML file with session settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only analyze these report dates (comma separated, YYYY-MM-DD)
    #[arg(long, value_delimiter = ',')]
    dates: Vec<NaiveDate>,

    /// Minimum repeat count shown in the repeated-issues view
    #[arg(long)]
    min_repeat: Option<usize>,

    /// Number of future reports to project (1-10)
    #[arg(long)]
    periods: Option<usize>,

    /// Print the issue timeline of one region
    #[arg(long)]
    region: Option<String>,

    /// Compare two regions side by side
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    compare: Vec<String>,

    /// Preview the unified raw rows
    #[arg(long)]
    show_raw: bool,

    /// Directory for exported files
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// PNG chart to embed in the workbook (repeatable)
    #[arg(long = "chart")]
    charts: Vec<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Everything one run works on. Derived tables are recomputed from here.
struct Session {
    config: SessionConfig,
    files: Vec<FileInfo>,
    table: UnifiedTable,
    roles: ColumnRoles,
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if !cli.dates.is_empty() {
        config.date_filter = Some(cli.dates.clone());
    }
    if let Some(n) = cli.min_repeat {
        config.repeated.min_repeat = n;
    }
    if let Some(n) = cli.periods {
        config.projection_periods = n;
    }
    if cli.show_raw {
        config.show_raw_data = true;
    }
    Ok(config)
}

/// Read and unify the report files, printing what was skipped.
fn handle_load(cli: &Cli, cache: &mut LoadCache) -> Result<Session> {
    let config = session_config(cli)?;
    let (sources, read_errors) = read_sources(&cli.files);
    for e in &read_errors {
        eprintln!("Skipped: {}", e);
    }
    if sources.is_empty() {
        bail!("none of the {} given files could be read", cli.files.len());
    }
    let outcome = cache
        .get_or_load(&sources)
        .context("no report data could be loaded")?;

    println!(
        "Loaded {} files ({} rows, {} report dates)",
        util::format_int(outcome.files.len() as i64),
        util::format_int(outcome.table.len() as i64),
        util::format_int(outcome.table.report_dates().len() as i64)
    );
    for w in &outcome.warnings {
        println!("Warning: {}", w);
    }
    for e in &outcome.errors {
        eprintln!("Skipped: {}", e);
    }
    println!();

    let table = config.apply_date_filter(&outcome.table);
    let roles = detect_columns(&table.columns);
    Ok(Session {
        config,
        files: outcome.files.clone(),
        table,
        roles,
    })
}

fn handle_overview(session: &Session) {
    let stats = calculate_summary_stats(&session.table, &session.roles);
    println!("Overview");
    println!(
        "Issues: {} | Sites: {} | Regions: {} | Reports: {} ({})\n",
        util::format_int(stats.total_issues as i64),
        util::format_int(stats.unique_sites as i64),
        util::format_int(stats.unique_regions as i64),
        stats.total_dates,
        stats.date_range
    );
    output::preview_table("Files", None, &session.files, session.files.len());
    if session.roles.site.is_none() {
        println!("Note: no site column detected, identity-based tables will be empty.\n");
    }
    if session.config.show_raw_data {
        println!("Raw data");
        output::preview_raw(&session.table, PREVIEW_ROWS * 4);
    }
}

fn handle_comparison(session: &Session) {
    let rows = compare_reports(&session.table, &session.roles);
    output::preview_table("Report comparison", None, &rows, rows.len());

    let top = region_totals(&session.table, &session.roles, Some(TOP_REGIONS));
    output::preview_table(
        "Issues by region",
        Some("Top 10 by count"),
        &top,
        TOP_REGIONS,
    );
}

fn handle_regions(session: &Session, cli: &Cli) {
    if let Some(region) = &cli.region {
        let timeline = calculate_region_timeline(&session.table, &session.roles, region);
        output::preview_table(
            &format!("Timeline: {}", region),
            None,
            &timeline,
            timeline.len(),
        );
    }
    if let [first, second] = cli.compare.as_slice() {
        let cmp = compare_two_regions(&session.table, &session.roles, first, second);
        output::preview_table(
            &format!("{} vs {}", first, second),
            None,
            &cmp.profiles,
            cmp.profiles.len(),
        );
        output::preview_table(
            "Shared issue types",
            None,
            &cmp.shared_issue_types,
            PREVIEW_ROWS,
        );
    }
}

fn handle_trend(session: &Session) {
    if !session.config.show_advanced_charts {
        return;
    }
    match predict_future_trend(&session.table, session.config.projection_periods()) {
        Some(projection) => {
            output::preview_table(
                "Trend projection",
                Some(TREND_LIMITATION),
                &projection.rows,
                projection.rows.len(),
            );
        }
        None => println!("Trend projection needs at least three reports.\n"),
    }
}

fn write_export<T: serde::Serialize>(path: &Path, rows: &[T]) {
    match output::write_csv(path, rows) {
        Ok(()) => println!("(Full table exported to {})\n", path.display()),
        Err(e) => eprintln!("Write error: {}", e),
    }
}

/// Derive every table, preview it and write the exports.
fn handle_generate_reports(session: &Session, cli: &Cli) -> Result<()> {
    let Session { table, roles, .. } = session;
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    let progress = calculate_progress(table, roles);
    output::preview_table("Progress by region", None, &progress, PREVIEW_ROWS);
    write_export(&cli.out_dir.join("provinces_progress.csv"), &progress);

    let repeated = find_repeated_issues(table, roles);
    let repeated_view = session.config.repeated.apply(&repeated);
    let note = format!(
        "{} of {} shown",
        util::format_int(repeated_view.len() as i64),
        util::format_int(repeated.len() as i64)
    );
    output::preview_table("Repeated issues", Some(note.as_str()), &repeated_view, PREVIEW_ROWS);
    write_export(&cli.out_dir.join("repeated_issues.csv"), &repeated_view);

    let new_issues = find_new_issues(table, roles);
    output::preview_table("New issues", None, &new_issues, PREVIEW_ROWS);
    let by_region = new_issues_by_region(&new_issues);
    output::preview_table("New issues by region", None, &by_region, PREVIEW_ROWS);
    write_export(&cli.out_dir.join("new_issues.csv"), &new_issues);

    let issue_types = analyze_issue_types(table, roles);
    output::preview_table("Issue types (Pareto)", None, &issue_types, PREVIEW_ROWS * 2);

    let benchmark = calculate_benchmark(&progress);
    output::preview_table("Benchmark", None, &benchmark, PREVIEW_ROWS);
    if let Some(b) = benchmark.first() {
        println!(
            "Overall progress: mean {}%, median {}%\n",
            util::format_number(b.overall_mean, 2),
            util::format_number(b.overall_median, 2)
        );
    }

    let comparison = compare_reports(table, roles);
    let summary = calculate_summary_stats(table, roles);
    let summary_path = cli.out_dir.join("summary.json");
    if let Err(e) = output::write_json(&summary_path, &summary) {
        eprintln!("Write error: {}", e);
    }
    println!("Summary Stats ({}):", summary_path.display());
    println!(
        "{{\"total_issues\": {}, \"unique_sites\": {}, \"date_range\": \"{}\"}}\n",
        util::format_int(summary.total_issues as i64),
        util::format_int(summary.unique_sites as i64),
        summary.date_range
    );

    let charts: Vec<ChartImage> = cli
        .charts
        .iter()
        .map(|path| ChartImage {
            title: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.clone(),
        })
        .collect();
    let content = WorkbookContent {
        table,
        files: &session.files,
        comparison: &comparison,
        progress: &progress,
        repeated: &repeated,
        new_issues: &new_issues,
        issue_types: &issue_types,
        benchmark: &benchmark,
        summary: &summary,
    };
    let workbook_path = cli.out_dir.join("mismatch_analysis.xlsx");
    let report = output::write_workbook(&workbook_path, &content, &charts)
        .with_context(|| format!("writing {}", workbook_path.display()))?;
    println!(
        "Workbook saved to {} ({} sheets)",
        workbook_path.display(),
        report.sheets.len()
    );
    for (title, reason) in &report.image_failures {
        warn!(chart = %title, %reason, "chart not embedded");
        println!("Chart '{}' was not embedded: {}", title, reason);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cache = LoadCache::new();
    let session = handle_load(&cli, &mut cache)?;

    handle_overview(&session);
    handle_comparison(&session);
    handle_regions(&session, &cli);
    handle_trend(&session);
    handle_generate_reports(&session, &cli)
}
