use crate::error::{AnalyzerError, Result};
use crate::types::{Priority, RepeatedIssueRow, ResolutionStatus, UnifiedTable};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const MIN_PROJECTION_PERIODS: usize = 1;
pub const MAX_PROJECTION_PERIODS: usize = 10;

/// Per-session view settings. Every derived table is recomputed from the
/// unified table under these settings; nothing here is global.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub show_raw_data: bool,
    pub show_advanced_charts: bool,
    /// Report dates to keep. `None` or an empty list keeps every date.
    pub date_filter: Option<Vec<NaiveDate>>,
    pub repeated: RepeatedFilter,
    pub projection_periods: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            show_raw_data: false,
            show_advanced_charts: true,
            date_filter: None,
            repeated: RepeatedFilter::default(),
            projection_periods: 3,
        }
    }
}

/// Filters of the repeated-issues view. Empty lists mean "all".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepeatedFilter {
    pub min_repeat: usize,
    pub priorities: Vec<Priority>,
    pub regions: Vec<String>,
    pub statuses: Vec<ResolutionStatus>,
}

impl Default for RepeatedFilter {
    fn default() -> Self {
        RepeatedFilter {
            min_repeat: 2,
            priorities: Vec::new(),
            regions: Vec::new(),
            statuses: Vec::new(),
        }
    }
}

impl RepeatedFilter {
    pub fn matches(&self, row: &RepeatedIssueRow) -> bool {
        row.repeat_count >= self.min_repeat
            && (self.priorities.is_empty() || self.priorities.contains(&row.priority))
            && (self.statuses.is_empty() || self.statuses.contains(&row.status))
            && (self.regions.is_empty()
                || row
                    .region
                    .as_ref()
                    .map(|r| self.regions.contains(r))
                    .unwrap_or(false))
    }

    pub fn apply(&self, rows: &[RepeatedIssueRow]) -> Vec<RepeatedIssueRow> {
        rows.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AnalyzerError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Projection horizon clamped to the supported 1..=10 range.
    pub fn projection_periods(&self) -> usize {
        self.projection_periods
            .clamp(MIN_PROJECTION_PERIODS, MAX_PROJECTION_PERIODS)
    }

    /// The subset of `table` the derived-table engine should see.
    pub fn apply_date_filter(&self, table: &UnifiedTable) -> UnifiedTable {
        match &self.date_filter {
            Some(dates) if !dates.is_empty() => table.retain_dates(dates),
            _ => table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, table};
    use std::io::Write;

    fn repeated(region: Option<&str>, count: usize, status: ResolutionStatus) -> RepeatedIssueRow {
        RepeatedIssueRow {
            region: region.map(str::to_string),
            site: "S".to_string(),
            issue_type: String::new(),
            issue_title: String::new(),
            repeat_count: count,
            priority: Priority::from_repeats(count),
            status,
            first_seen: date("2025-01-01"),
            last_seen: date("2025-02-01"),
            span: String::new(),
            key: format!("S{}", count),
        }
    }

    #[test]
    fn defaults_match_the_dashboard() {
        let c = SessionConfig::default();
        assert!(!c.show_raw_data);
        assert!(c.show_advanced_charts);
        assert_eq!(c.repeated.min_repeat, 2);
        assert_eq!(c.projection_periods(), 3);
    }

    #[test]
    fn projection_periods_are_clamped() {
        let mut c = SessionConfig::default();
        c.projection_periods = 0;
        assert_eq!(c.projection_periods(), 1);
        c.projection_periods = 50;
        assert_eq!(c.projection_periods(), 10);
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
show_raw_data = true
date_filter = ["2025-01-01"]
projection_periods = 5

[repeated]
min_repeat = 3
priorities = ["Critical"]
statuses = ["Unresolved"]
"#
        )
        .unwrap();
        let c = SessionConfig::load(file.path()).unwrap();
        assert!(c.show_raw_data);
        assert!(c.show_advanced_charts);
        assert_eq!(c.date_filter, Some(vec![date("2025-01-01")]));
        assert_eq!(c.projection_periods(), 5);
        assert_eq!(c.repeated.min_repeat, 3);
        assert_eq!(c.repeated.priorities, vec![Priority::Critical]);
        assert_eq!(c.repeated.statuses, vec![ResolutionStatus::Unresolved]);
        assert!(c.repeated.regions.is_empty());
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let err = SessionConfig::load(Path::new("/nonexistent/session.toml")).unwrap_err();
        assert!(matches!(err, AnalyzerError::Config(_)));
    }

    #[test]
    fn date_filter_keeps_selected_reports() {
        let t = table(&[
            ("2025-01-01", "A", "S1", "t", "c"),
            ("2025-02-01", "A", "S1", "t", "c"),
            ("2025-03-01", "A", "S2", "t", "c"),
        ]);
        let mut c = SessionConfig::default();
        assert_eq!(c.apply_date_filter(&t).len(), 3);
        c.date_filter = Some(vec![]);
        assert_eq!(c.apply_date_filter(&t).len(), 3);
        c.date_filter = Some(vec![date("2025-01-01"), date("2025-03-01")]);
        let filtered = c.apply_date_filter(&t);
        assert_eq!(
            filtered.report_dates(),
            vec![date("2025-01-01"), date("2025-03-01")]
        );
    }

    #[test]
    fn repeated_filter_combines_selections() {
        let rows = vec![
            repeated(Some("A"), 2, ResolutionStatus::Unresolved),
            repeated(Some("B"), 5, ResolutionStatus::Resolved),
            repeated(None, 3, ResolutionStatus::Unresolved),
        ];
        let all = RepeatedFilter::default();
        assert_eq!(all.apply(&rows).len(), 3);

        let f = RepeatedFilter {
            min_repeat: 3,
            ..RepeatedFilter::default()
        };
        assert_eq!(f.apply(&rows).len(), 2);

        let f = RepeatedFilter {
            regions: vec!["A".to_string()],
            ..RepeatedFilter::default()
        };
        assert_eq!(f.apply(&rows)[0].key, "S2");
        assert_eq!(f.apply(&rows).len(), 1);

        let f = RepeatedFilter {
            statuses: vec![ResolutionStatus::Unresolved],
            priorities: vec![Priority::Important],
            ..RepeatedFilter::default()
        };
        assert_eq!(f.apply(&rows).len(), 1);
        assert_eq!(f.apply(&rows)[0].key, "S3");
    }
}
