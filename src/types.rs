use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tabled::Tabled;

/// Column names appended to every exported raw row.
pub const REPORT_DATE_COLUMN: &str = "ReportDate";
pub const REPORT_DATE_LOCAL_COLUMN: &str = "ReportDateLocal";
pub const SOURCE_COLUMN: &str = "SourceFile";

/// One mismatch row from a source report, tagged with the report it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRecord {
    pub values: HashMap<String, String>,
    pub report_date: NaiveDate,
    pub report_date_localized: String,
    pub source_name: String,
}

impl IssueRecord {
    pub fn new<K, V, I>(report_date: NaiveDate, source_name: &str, values: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        IssueRecord {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            report_date,
            report_date_localized: crate::calendar::localize(report_date),
            source_name: source_name.to_string(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Cell text, with missing cells read as the empty string.
    pub fn text(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Cell text for grouping purposes: blank cells count as missing.
    pub fn non_blank(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.trim().is_empty())
    }
}

/// All records across every loaded report, ordered by report date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedTable {
    pub columns: Vec<String>,
    pub records: Vec<IssueRecord>,
}

impl UnifiedTable {
    /// Build a table from records in append order. Columns are the union of
    /// every record's keys in first-seen order; the sort by date is stable.
    pub fn from_records(mut columns: Vec<String>, mut records: Vec<IssueRecord>) -> Self {
        for r in &records {
            let mut extra: Vec<&String> = r
                .values
                .keys()
                .filter(|k| !columns.contains(*k))
                .collect();
            extra.sort();
            columns.extend(extra.into_iter().cloned());
        }
        records.sort_by_key(|r| r.report_date);
        UnifiedTable { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Distinct report dates, ascending.
    pub fn report_dates(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .map(|r| r.report_date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Localized label of a report date as recorded at ingestion.
    pub fn date_label(&self, date: NaiveDate) -> String {
        self.records
            .iter()
            .find(|r| r.report_date == date)
            .map(|r| r.report_date_localized.clone())
            .unwrap_or_else(|| crate::calendar::localize(date))
    }

    pub fn records_on(&self, date: NaiveDate) -> impl Iterator<Item = &IssueRecord> {
        self.records.iter().filter(move |r| r.report_date == date)
    }

    /// A copy holding only the records whose report date is in `dates`.
    pub fn retain_dates(&self, dates: &[NaiveDate]) -> UnifiedTable {
        UnifiedTable {
            columns: self.columns.clone(),
            records: self
                .records
                .iter()
                .filter(|r| dates.contains(&r.report_date))
                .cloned()
                .collect(),
        }
    }
}

/// Semantic roles found among the table's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub region: Option<String>,
    pub site: Option<String>,
    pub issue_type: Option<String>,
    pub issue_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub file_name: String,
    pub message: String,
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file_name, self.message)
    }
}

/// Per-file metadata collected during ingestion.
#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct FileInfo {
    #[serde(rename = "FileName")]
    #[tabled(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Columns")]
    #[tabled(rename = "Columns")]
    pub columns: usize,
    #[serde(rename = "ReportDate")]
    #[tabled(rename = "ReportDate")]
    pub report_date: NaiveDate,
    #[serde(rename = "ReportDateLocal")]
    #[tabled(rename = "ReportDateLocal")]
    pub report_date_local: String,
    #[serde(rename = "DateFallback")]
    #[tabled(rename = "DateFallback")]
    pub date_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub table: UnifiedTable,
    pub files: Vec<FileInfo>,
    pub warnings: Vec<String>,
    pub errors: Vec<IngestError>,
}

macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labelled_enum!(ProgressStatus {
    Excellent => "Excellent",
    Good => "Good",
    Moderate => "Moderate",
    Poor => "Poor",
});

labelled_enum!(Priority {
    Critical => "Critical",
    Important => "Important",
    Normal => "Normal",
});

labelled_enum!(ResolutionStatus {
    Unresolved => "Unresolved",
    Resolved => "Resolved",
});

labelled_enum!(ParetoCategory {
    Critical => "Critical (80%)",
    Important => "Important (95%)",
    Minor => "Minor",
});

labelled_enum!(RelativePerformance {
    AboveAverage => "Above average",
    NearAverage => "Near average",
    BelowAverage => "Below average",
});

labelled_enum!(Trend {
    Decrease => "Decrease",
    Increase => "Increase",
    NoChange => "No change",
});

labelled_enum!(TrendDirection {
    Decreasing => "Decreasing",
    Increasing => "Increasing",
    Flat => "Flat",
});

impl ProgressStatus {
    pub fn from_pct(pct: f64) -> Self {
        if pct >= 75.0 {
            ProgressStatus::Excellent
        } else if pct >= 50.0 {
            ProgressStatus::Good
        } else if pct >= 25.0 {
            ProgressStatus::Moderate
        } else {
            ProgressStatus::Poor
        }
    }
}

impl Priority {
    pub fn from_repeats(count: usize) -> Self {
        if count >= 5 {
            Priority::Critical
        } else if count >= 3 {
            Priority::Important
        } else {
            Priority::Normal
        }
    }
}

impl ParetoCategory {
    pub fn from_cumulative(cumulative_pct: f64) -> Self {
        if cumulative_pct <= 80.0 {
            ParetoCategory::Critical
        } else if cumulative_pct <= 95.0 {
            ParetoCategory::Important
        } else {
            ParetoCategory::Minor
        }
    }
}

impl RelativePerformance {
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > 10.0 {
            RelativePerformance::AboveAverage
        } else if deviation >= -10.0 {
            RelativePerformance::NearAverage
        } else {
            RelativePerformance::BelowAverage
        }
    }
}

impl Trend {
    pub fn from_change(change: i64) -> Self {
        match change {
            c if c < 0 => Trend::Decrease,
            c if c > 0 => Trend::Increase,
            _ => Trend::NoChange,
        }
    }
}

impl TrendDirection {
    pub fn from_slope(slope: f64) -> Self {
        if slope < 0.0 {
            TrendDirection::Decreasing
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Flat
        }
    }
}

fn display_opt<T: fmt::Display>(o: &Option<T>) -> String {
    match o {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct ProgressRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "InitialIssues")]
    #[tabled(rename = "InitialIssues")]
    pub initial_count: usize,
    #[serde(rename = "CurrentIssues")]
    #[tabled(rename = "CurrentIssues")]
    pub current_count: usize,
    #[serde(rename = "Resolved")]
    #[tabled(rename = "Resolved")]
    pub resolved: usize,
    #[serde(rename = "Remaining")]
    #[tabled(rename = "Remaining")]
    pub remaining: usize,
    #[serde(rename = "NewIssues")]
    #[tabled(rename = "NewIssues")]
    pub new_issues: usize,
    #[serde(rename = "ProgressPct")]
    #[tabled(rename = "ProgressPct")]
    pub progress_pct: f64,
    #[serde(rename = "FirstDate")]
    #[tabled(rename = "FirstDate")]
    pub first_date: NaiveDate,
    #[serde(rename = "LastDate")]
    #[tabled(rename = "LastDate")]
    pub last_date: NaiveDate,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: ProgressStatus,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct RepeatedIssueRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region", display_with = "display_opt")]
    pub region: Option<String>,
    #[serde(rename = "Site")]
    #[tabled(rename = "Site")]
    pub site: String,
    #[serde(rename = "IssueType")]
    #[tabled(rename = "IssueType")]
    pub issue_type: String,
    #[serde(rename = "IssueTitle")]
    #[tabled(rename = "IssueTitle")]
    pub issue_title: String,
    #[serde(rename = "RepeatCount")]
    #[tabled(rename = "RepeatCount")]
    pub repeat_count: usize,
    #[serde(rename = "Priority")]
    #[tabled(rename = "Priority")]
    pub priority: Priority,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: ResolutionStatus,
    #[serde(rename = "FirstSeen")]
    #[tabled(rename = "FirstSeen")]
    pub first_seen: NaiveDate,
    #[serde(rename = "LastSeen")]
    #[tabled(rename = "LastSeen")]
    pub last_seen: NaiveDate,
    #[serde(rename = "Span")]
    #[tabled(rename = "Span")]
    pub span: String,
    #[serde(rename = "IdentityKey")]
    #[tabled(skip)]
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct NewIssueRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region", display_with = "display_opt")]
    pub region: Option<String>,
    #[serde(rename = "Site")]
    #[tabled(rename = "Site")]
    pub site: String,
    #[serde(rename = "IssueType")]
    #[tabled(rename = "IssueType")]
    pub issue_type: String,
    #[serde(rename = "IssueTitle")]
    #[tabled(rename = "IssueTitle")]
    pub issue_title: String,
    #[serde(rename = "FirstSeen")]
    #[tabled(rename = "FirstSeen")]
    pub first_seen: NaiveDate,
    #[serde(rename = "ReviewPriority")]
    #[tabled(rename = "ReviewPriority")]
    pub review_priority: String,
    #[serde(rename = "IdentityKey")]
    #[tabled(skip)]
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct IssueTypeRow {
    #[serde(rename = "IssueType")]
    #[tabled(rename = "IssueType")]
    pub issue_type: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Percentage")]
    #[tabled(rename = "Percentage")]
    pub percentage: f64,
    #[serde(rename = "CumulativePct")]
    #[tabled(rename = "CumulativePct")]
    pub cumulative_pct: f64,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: ParetoCategory,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct BenchmarkRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "InitialIssues")]
    #[tabled(rename = "InitialIssues")]
    pub initial_count: usize,
    #[serde(rename = "Resolved")]
    #[tabled(rename = "Resolved")]
    pub resolved: usize,
    #[serde(rename = "ProgressPct")]
    #[tabled(rename = "ProgressPct")]
    pub progress_pct: f64,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: ProgressStatus,
    #[serde(rename = "OverallMean")]
    #[tabled(rename = "OverallMean")]
    pub overall_mean: f64,
    #[serde(rename = "OverallMedian")]
    #[tabled(rename = "OverallMedian")]
    pub overall_median: f64,
    #[serde(rename = "Deviation")]
    #[tabled(rename = "Deviation")]
    pub deviation: f64,
    #[serde(rename = "Performance")]
    #[tabled(rename = "Performance")]
    pub performance: RelativePerformance,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct RegionProfileRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "TotalIssues")]
    #[tabled(rename = "TotalIssues")]
    pub total_issues: usize,
    #[serde(rename = "DistinctSites")]
    #[tabled(rename = "DistinctSites")]
    pub distinct_sites: usize,
    #[serde(rename = "IssuesPerSite")]
    #[tabled(rename = "IssuesPerSite")]
    pub issues_per_site: f64,
    #[serde(rename = "DistinctIssueTypes")]
    #[tabled(rename = "DistinctIssueTypes")]
    pub distinct_issue_types: usize,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct SharedIssueTypeRow {
    #[serde(rename = "IssueType")]
    #[tabled(rename = "IssueType")]
    pub issue_type: String,
    #[serde(rename = "FirstRegionCount")]
    #[tabled(rename = "FirstRegionCount")]
    pub first_region_count: usize,
    #[serde(rename = "SecondRegionCount")]
    #[tabled(rename = "SecondRegionCount")]
    pub second_region_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionComparison {
    pub profiles: Vec<RegionProfileRow>,
    pub shared_issue_types: Vec<SharedIssueTypeRow>,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct ReportComparisonRow {
    #[serde(rename = "ReportDate")]
    #[tabled(rename = "ReportDate")]
    pub report_date: NaiveDate,
    #[serde(rename = "ReportDateLocal")]
    #[tabled(rename = "ReportDateLocal")]
    pub report_date_local: String,
    #[serde(rename = "IssueCount")]
    #[tabled(rename = "IssueCount")]
    pub issue_count: usize,
    #[serde(rename = "SiteCount")]
    #[tabled(rename = "SiteCount")]
    pub site_count: usize,
    #[serde(rename = "RegionCount")]
    #[tabled(rename = "RegionCount")]
    pub region_count: usize,
    #[serde(rename = "SourceFile")]
    #[tabled(rename = "SourceFile")]
    pub source_file: String,
    #[serde(rename = "Change")]
    #[tabled(rename = "Change", display_with = "display_opt")]
    pub change: Option<i64>,
    #[serde(rename = "ChangePct")]
    #[tabled(rename = "ChangePct", display_with = "display_opt")]
    pub change_pct: Option<f64>,
    #[serde(rename = "Trend")]
    #[tabled(rename = "Trend", display_with = "display_opt")]
    pub trend: Option<Trend>,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct TimelinePoint {
    #[serde(rename = "ReportDate")]
    #[tabled(rename = "ReportDate")]
    pub report_date: NaiveDate,
    #[serde(rename = "ReportDateLocal")]
    #[tabled(rename = "ReportDateLocal")]
    pub report_date_local: String,
    #[serde(rename = "IssueCount")]
    #[tabled(rename = "IssueCount")]
    pub issue_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct TrendProjectionRow {
    #[serde(rename = "Period")]
    #[tabled(rename = "Period")]
    pub period: String,
    #[serde(rename = "PredictedCount")]
    #[tabled(rename = "PredictedCount")]
    pub predicted_count: i64,
    #[serde(rename = "Direction")]
    #[tabled(rename = "Direction")]
    pub direction: TrendDirection,
    #[serde(rename = "Slope")]
    #[tabled(rename = "Slope")]
    pub slope: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendProjection {
    pub observed: Vec<usize>,
    pub fitted: Vec<f64>,
    pub slope: f64,
    pub intercept: f64,
    pub direction: TrendDirection,
    pub rows: Vec<TrendProjectionRow>,
}

#[derive(Debug, Serialize, Deserialize, Tabled, Clone, PartialEq)]
pub struct RegionCountRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}

/// Region × report-date issue counts, zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionDateMatrix {
    pub dates: Vec<NaiveDate>,
    pub regions: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SummaryStats {
    pub total_issues: usize,
    pub unique_sites: usize,
    pub unique_regions: usize,
    pub total_dates: usize,
    pub date_range: String,
    pub files_count: usize,
}
