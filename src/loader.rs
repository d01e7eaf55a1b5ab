use crate::calendar;
use crate::error::{AnalyzerError, Result};
use crate::types::{FileInfo, IngestError, IssueRecord, LoadOutcome, UnifiedTable};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Local, NaiveDate};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use tracing::{info, warn};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").unwrap());
static DASHED_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// An uploaded report: its original file name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        SourceFile {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(SourceFile { name, bytes })
    }
}

/// A header row plus text cells, before any report tagging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub bad_rows: usize,
}

/// Extract the report date from the last `_`-separated segment of the file stem.
///
/// `Report_20250315.xlsx` and `Report_2025-03-15.xlsx` both yield 2025-03-15.
pub fn parse_report_date(file_name: &str) -> Option<NaiveDate> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let token = stem.rsplit('_').next()?.trim();
    if DASHED_DATE.is_match(token) {
        NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
    } else if COMPACT_DATE.is_match(token) {
        NaiveDate::parse_from_str(token, "%Y%m%d").ok()
    } else {
        None
    }
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn read_table(source: &SourceFile) -> Result<RawTable> {
    match extension(&source.name).as_str() {
        "csv" => read_csv(&source.bytes),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(&source.bytes),
        other => Err(AnalyzerError::UnsupportedFormat(format!(
            "'{}' (extension '{}')",
            source.name, other
        ))),
    }
}

fn read_csv(bytes: &[u8]) -> Result<RawTable> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    let mut bad_rows = 0usize;
    for result in rdr.records() {
        match result {
            Ok(rec) => rows.push(rec.iter().map(|c| c.trim().to_string()).collect()),
            Err(_) => bad_rows += 1,
        }
    }
    let mut table = normalize(headers, rows);
    table.bad_rows = bad_rows;
    Ok(table)
}

fn read_spreadsheet(bytes: &[u8]) -> Result<RawTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalyzerError::Spreadsheet("workbook has no worksheets".to_string()))??;
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|r| r.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    let body = rows.map(|r| r.iter().map(cell_to_string).collect()).collect();
    Ok(normalize(headers, body))
}

/// Render a spreadsheet cell as text. Whole floats print without a fraction
/// so numeric site codes match their CSV spelling.
pub fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

/// Name blank and duplicate headers, square every row to the header width and
/// drop rows with no content.
fn normalize(headers: Vec<String>, rows: Vec<Vec<String>>) -> RawTable {
    let mut named: Vec<String> = Vec::with_capacity(headers.len());
    for (idx, h) in headers.into_iter().enumerate() {
        let base = if h.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            h
        };
        let mut name = base.clone();
        let mut n = 1;
        while named.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        named.push(name);
    }
    let width = named.len();
    let rows = rows
        .into_iter()
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .map(|mut r| {
            r.resize(width, String::new());
            r
        })
        .collect();
    RawTable {
        headers: named,
        rows,
        bad_rows: 0,
    }
}

/// Read report files from disk. Unreadable paths become ingestion errors.
pub fn read_sources<P: AsRef<Path>>(paths: &[P]) -> (Vec<SourceFile>, Vec<IngestError>) {
    let mut sources = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match SourceFile::from_path(path) {
            Ok(s) => sources.push(s),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read report file");
                errors.push(IngestError {
                    file_name: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    (sources, errors)
}

/// Parse every source, tag its rows with the report date and file name, and
/// merge everything into one table sorted by report date.
///
/// Unparseable files are skipped and recorded in `errors`; a missing date
/// token falls back to today and is recorded in `warnings`. Returns
/// `AnalyzerError::NoData` when nothing could be loaded.
pub fn load_reports(sources: &[SourceFile]) -> Result<LoadOutcome> {
    let today = Local::now().date_naive();
    let mut columns: Vec<String> = Vec::new();
    let mut records: Vec<IssueRecord> = Vec::new();
    let mut files: Vec<FileInfo> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut errors: Vec<IngestError> = Vec::new();

    for source in sources {
        let raw = match read_table(source) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %source.name, error = %e, "skipping unreadable report");
                errors.push(IngestError {
                    file_name: source.name.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if raw.bad_rows > 0 {
            warnings.push(format!(
                "{}: {} malformed rows skipped",
                source.name, raw.bad_rows
            ));
        }

        let (report_date, date_fallback) = match parse_report_date(&source.name) {
            Some(d) => (d, false),
            None => {
                let msg = format!(
                    "no report date in '{}' (expected _YYYYMMDD or _YYYY-MM-DD); using {}",
                    source.name, today
                );
                warn!("{}", msg);
                warnings.push(msg);
                (today, true)
            }
        };
        let localized = calendar::localize(report_date);

        for h in &raw.headers {
            if !columns.contains(h) {
                columns.push(h.clone());
            }
        }
        let row_count = raw.rows.len();
        for row in raw.rows {
            records.push(IssueRecord {
                values: raw.headers.iter().cloned().zip(row).collect(),
                report_date,
                report_date_localized: localized.clone(),
                source_name: source.name.clone(),
            });
        }
        info!(file = %source.name, rows = row_count, date = %report_date, "loaded report");
        files.push(FileInfo {
            file_name: source.name.clone(),
            rows: row_count,
            columns: raw.headers.len(),
            report_date,
            report_date_local: localized,
            date_fallback,
        });
    }

    if files.is_empty() || records.is_empty() {
        return Err(AnalyzerError::NoData);
    }

    Ok(LoadOutcome {
        table: UnifiedTable::from_records(columns, records),
        files,
        warnings,
        errors,
    })
}
