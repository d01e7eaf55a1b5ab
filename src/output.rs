use crate::error::{AnalyzerError, Result};
use crate::loader::UTF8_BOM;
use crate::types::{
    BenchmarkRow, FileInfo, IssueTypeRow, NewIssueRow, ProgressRow, RepeatedIssueRow,
    ReportComparisonRow, SummaryStats, UnifiedTable, REPORT_DATE_COLUMN, REPORT_DATE_LOCAL_COLUMN,
    SOURCE_COLUMN,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::{info, warn};
use umya_spreadsheet::structs::drawing::spreadsheet::MarkerType;
use umya_spreadsheet::structs::Image;
use umya_spreadsheet::Spreadsheet;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
/// Rows reserved below each embedded chart.
const CHART_ROW_STRIDE: u32 = 45;

fn serialize_rows<T: Serialize>(rows: &[T], with_bom: bool) -> Result<Vec<u8>> {
    let mut buf = if with_bom { UTF8_BOM.to_vec() } else { Vec::new() };
    {
        let mut wtr = csv::Writer::from_writer(&mut buf);
        for r in rows {
            wtr.serialize(r)?;
        }
        wtr.flush()?;
    }
    Ok(buf)
}

/// CSV with a UTF-8 byte-order mark so spreadsheet tools pick the right encoding.
pub fn csv_bytes<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    serialize_rows(rows, true)
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    std::fs::write(path, csv_bytes(rows)?)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown preview of the first `max_rows` unified rows, including the
/// report date and source columns.
pub fn preview_raw(table: &UnifiedTable, max_rows: usize) {
    let (headers, rows) = raw_grid(table);
    if rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(headers);
    for row in rows.into_iter().take(max_rows) {
        builder.push_record(row);
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// A rendered chart to embed in the workbook's `Charts` sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartImage {
    pub title: String,
    pub path: PathBuf,
}

/// Everything that goes into the combined workbook.
pub struct WorkbookContent<'a> {
    pub table: &'a UnifiedTable,
    pub files: &'a [FileInfo],
    pub comparison: &'a [ReportComparisonRow],
    pub progress: &'a [ProgressRow],
    pub repeated: &'a [RepeatedIssueRow],
    pub new_issues: &'a [NewIssueRow],
    pub issue_types: &'a [IssueTypeRow],
    pub benchmark: &'a [BenchmarkRow],
    pub summary: &'a SummaryStats,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportReport {
    pub sheets: Vec<String>,
    /// `(chart title, reason)` for every image that could not be embedded.
    pub image_failures: Vec<(String, String)>,
}

type Grid = (Vec<String>, Vec<Vec<String>>);

/// Header and text cells of serialized rows, using the same column names as
/// the CSV export.
fn grid<T: Serialize>(rows: &[T]) -> Result<Grid> {
    let bytes = serialize_rows(rows, false)?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(bytes.as_slice());
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let mut cells = Vec::new();
    for rec in rdr.records() {
        cells.push(rec?.iter().map(str::to_string).collect());
    }
    Ok((headers, cells))
}

/// Raw unified rows plus the report date, localized date and source columns.
fn raw_grid(table: &UnifiedTable) -> Grid {
    let mut headers = table.columns.clone();
    headers.extend(
        [REPORT_DATE_COLUMN, REPORT_DATE_LOCAL_COLUMN, SOURCE_COLUMN]
            .iter()
            .map(|c| c.to_string()),
    );
    let rows = table
        .records
        .iter()
        .map(|r| {
            let mut row: Vec<String> = table
                .columns
                .iter()
                .map(|c| r.text(c).to_string())
                .collect();
            row.push(r.report_date.to_string());
            row.push(r.report_date_localized.clone());
            row.push(r.source_name.clone());
            row
        })
        .collect();
    (headers, rows)
}

fn add_sheet(
    book: &mut Spreadsheet,
    name: &str,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    let sheet = book
        .new_sheet(name)
        .map_err(|e| AnalyzerError::Export(format!("cannot add sheet '{}': {}", name, e)))?;
    for (c, h) in headers.iter().enumerate() {
        let cell = sheet.get_cell_mut(((c + 1) as u32, 1u32));
        cell.set_value(h.clone());
        cell.get_style_mut().get_font_mut().set_bold(true);
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            sheet
                .get_cell_mut(((c + 1) as u32, (r + 2) as u32))
                .set_value(v.clone());
        }
    }
    Ok(())
}

fn add_rows_sheet<T: Serialize>(
    book: &mut Spreadsheet,
    report: &mut ExportReport,
    name: &str,
    rows: &[T],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let (headers, cells) = grid(rows)?;
    add_sheet(book, name, &headers, &cells)?;
    report.sheets.push(name.to_string());
    Ok(())
}

/// Reject anything that is not a PNG that decodes completely. The workbook
/// writer decodes each image again and panics on corrupt data.
fn check_png(path: &Path) -> std::result::Result<(), String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("not a PNG image".to_string());
    }
    let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err("empty PNG image".to_string());
    }
    Ok(())
}

fn add_chart_sheet(
    book: &mut Spreadsheet,
    report: &mut ExportReport,
    charts: &[ChartImage],
) -> Result<()> {
    let sheet = book
        .new_sheet("Charts")
        .map_err(|e| AnalyzerError::Export(format!("cannot add sheet 'Charts': {}", e)))?;
    report.sheets.push("Charts".to_string());
    let mut row = 1u32;
    for chart in charts {
        if let Err(reason) = check_png(&chart.path) {
            warn!(
                chart = %chart.title,
                path = %chart.path.display(),
                %reason,
                "skipping chart image"
            );
            report.image_failures.push((chart.title.clone(), reason));
            continue;
        }
        let title = sheet.get_cell_mut((1u32, row));
        title.set_value(chart.title.clone());
        title.get_style_mut().get_font_mut().set_bold(true);

        let mut marker = MarkerType::default();
        marker.set_coordinate(format!("A{}", row + 1));
        let mut image = Image::default();
        image.new_image(&chart.path.to_string_lossy(), marker);
        sheet.add_image(image);
        row += CHART_ROW_STRIDE;
    }
    Ok(())
}

/// Write the combined workbook: raw data, file metadata, every non-empty
/// derived table and, when charts are given, a `Charts` sheet. Chart images
/// that cannot be embedded are reported in the result instead of failing the
/// export.
pub fn write_workbook(
    path: &Path,
    content: &WorkbookContent<'_>,
    charts: &[ChartImage],
) -> Result<ExportReport> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    let mut report = ExportReport::default();

    let (headers, rows) = raw_grid(content.table);
    add_sheet(&mut book, "All_Data", &headers, &rows)?;
    report.sheets.push("All_Data".to_string());
    let (headers, rows) = grid(content.files)?;
    add_sheet(&mut book, "Files_Info", &headers, &rows)?;
    report.sheets.push("Files_Info".to_string());

    add_rows_sheet(&mut book, &mut report, "Reports_Comparison", content.comparison)?;
    add_rows_sheet(&mut book, &mut report, "Provinces_Progress", content.progress)?;
    add_rows_sheet(&mut book, &mut report, "Repeated_Issues", content.repeated)?;
    add_rows_sheet(&mut book, &mut report, "New_Issues", content.new_issues)?;
    add_rows_sheet(&mut book, &mut report, "Issue_Types_Pareto", content.issue_types)?;
    add_rows_sheet(&mut book, &mut report, "Benchmark_Analysis", content.benchmark)?;
    add_rows_sheet(
        &mut book,
        &mut report,
        "Summary_Stats",
        std::slice::from_ref(content.summary),
    )?;

    if !charts.is_empty() {
        add_chart_sheet(&mut book, &mut report, charts)?;
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| AnalyzerError::Export(format!("{:?}", e)))?;
    info!(path = %path.display(), sheets = report.sheets.len(), "workbook written");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{calculate_summary_stats, compare_reports};
    use crate::loader::{read_table, SourceFile};
    use crate::reports::{calculate_progress, find_new_issues, find_repeated_issues};
    use crate::test_support::{roles, table};
    use calamine::{open_workbook_auto, Reader};

    fn sample() -> UnifiedTable {
        table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "A", "Y", "t", "c"),
            ("2025-02-01", "A", "Y", "t", "c"),
            ("2025-02-01", "A", "Z", "t", "c"),
        ])
    }

    #[test]
    fn csv_starts_with_bom_and_round_trips() {
        let rows = find_repeated_issues(&sample(), &roles());
        assert_eq!(rows.len(), 1);
        let bytes = csv_bytes(&rows).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let mut rdr = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let parsed: Vec<RepeatedIssueRow> = rdr.deserialize().collect::<csv::Result<_>>().unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn write_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.csv");
        let rows = calculate_progress(&sample(), &roles());
        write_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('\u{feff}'));
        assert!(text.contains("Region,InitialIssues,CurrentIssues"));
    }

    #[test]
    fn grid_uses_serde_headers() {
        let rows = calculate_progress(&sample(), &roles());
        let (headers, cells) = grid(&rows).unwrap();
        assert_eq!(headers[0], "Region");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0][0], "A");
    }

    #[test]
    fn workbook_has_sheet_per_non_empty_table() {
        let t = sample();
        let r = roles();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.xlsx");

        let comparison = compare_reports(&t, &r);
        let progress = calculate_progress(&t, &r);
        let repeated = find_repeated_issues(&t, &r);
        let new_issues = find_new_issues(&t, &r);
        let summary = calculate_summary_stats(&t, &r);
        let content = WorkbookContent {
            table: &t,
            files: &[],
            comparison: &comparison,
            progress: &progress,
            repeated: &repeated,
            new_issues: &new_issues,
            issue_types: &[],
            benchmark: &[],
            summary: &summary,
        };
        let charts = vec![ChartImage {
            title: "Trend".to_string(),
            path: dir.path().join("missing.png"),
        }];
        let report = write_workbook(&path, &content, &charts).unwrap();

        assert_eq!(
            report.sheets,
            vec![
                "All_Data",
                "Files_Info",
                "Reports_Comparison",
                "Provinces_Progress",
                "Repeated_Issues",
                "New_Issues",
                "Summary_Stats",
                "Charts",
            ]
        );
        assert_eq!(report.image_failures.len(), 1);
        assert_eq!(report.image_failures[0].0, "Trend");

        let workbook = open_workbook_auto(&path).unwrap();
        let names = workbook.sheet_names().to_owned();
        assert!(names.contains(&"Repeated_Issues".to_string()));
        assert!(!names.contains(&"Benchmark_Analysis".to_string()));

        let source = SourceFile::from_path(&path).unwrap();
        let raw = read_table(&source).unwrap();
        assert_eq!(raw.rows.len(), 4);
        assert!(raw.headers.contains(&SOURCE_COLUMN.to_string()));
    }

    #[test]
    fn png_check_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        std::fs::write(&path, b"GIF89a").unwrap();
        assert_eq!(check_png(&path), Err("not a PNG image".to_string()));
        assert!(check_png(&dir.path().join("absent.png")).is_err());
    }

    fn export_with_charts(dir: &Path, charts: &[ChartImage]) -> ExportReport {
        let t = sample();
        let summary = calculate_summary_stats(&t, &roles());
        let content = WorkbookContent {
            table: &t,
            files: &[],
            comparison: &[],
            progress: &[],
            repeated: &[],
            new_issues: &[],
            issue_types: &[],
            benchmark: &[],
            summary: &summary,
        };
        write_workbook(&dir.join("charts.xlsx"), &content, charts).unwrap()
    }

    #[test]
    fn valid_png_is_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trend.png");
        image::RgbImage::from_pixel(4, 3, image::Rgb([200, 30, 30]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(check_png(&path), Ok(()));

        let report = export_with_charts(
            dir.path(),
            &[ChartImage {
                title: "Trend".to_string(),
                path,
            }],
        );
        assert!(report.sheets.contains(&"Charts".to_string()));
        assert!(report.image_failures.is_empty());
        assert!(dir.path().join("charts.xlsx").exists());
    }

    #[test]
    fn corrupt_png_body_is_reported_and_export_continues() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.png");
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        bytes.extend_from_slice(b"not really image data");
        std::fs::write(&corrupt, &bytes).unwrap();
        assert!(check_png(&corrupt).is_err());

        let valid = dir.path().join("valid.png");
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 255]))
            .save_with_format(&valid, image::ImageFormat::Png)
            .unwrap();

        let report = export_with_charts(
            dir.path(),
            &[
                ChartImage {
                    title: "Broken".to_string(),
                    path: corrupt,
                },
                ChartImage {
                    title: "Regions".to_string(),
                    path: valid,
                },
            ],
        );
        assert_eq!(report.image_failures.len(), 1);
        assert_eq!(report.image_failures[0].0, "Broken");
        assert!(report.sheets.contains(&"Charts".to_string()));
        assert!(dir.path().join("charts.xlsx").exists());
    }
}
