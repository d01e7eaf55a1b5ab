// Identity-based reports: remediation progress per region, benchmark against
// the cross-region average, issues repeated across reports and issues that
// first appeared in the latest report.
//
// Each function is pure and returns an empty table when the roles or dates
// it needs are missing.
use crate::columns::role_column;
use crate::identity::build_keys;
use crate::types::{
    BenchmarkRow, ColumnRoles, IssueRecord, NewIssueRow, Priority, ProgressRow, ProgressStatus,
    RegionCountRow, RelativePerformance, RepeatedIssueRow, ResolutionStatus, UnifiedTable,
};
use crate::util::{average, median, percent, round2};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;

/// Compare each region's identity keys at the earliest and the latest report
/// date. Counts are distinct keys, so `resolved + remaining` is the initial
/// count and `remaining + new_issues` the current one.
pub fn calculate_progress(table: &UnifiedTable, roles: &ColumnRoles) -> Vec<ProgressRow> {
    let Some(region_col) = role_column(table, &roles.region) else {
        return Vec::new();
    };
    let dates = table.report_dates();
    if dates.len() < 2 {
        return Vec::new();
    }
    let Some(keys) = build_keys(table, roles) else {
        warn!("no site column detected; progress by region is unavailable");
        return Vec::new();
    };
    let (first_date, last_date) = (dates[0], dates[dates.len() - 1]);

    #[derive(Default)]
    struct Acc<'a> {
        first: HashSet<&'a str>,
        last: HashSet<&'a str>,
    }
    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    for (r, key) in table.records.iter().zip(&keys) {
        let Some(region) = r.non_blank(region_col) else {
            continue;
        };
        let acc = map.entry(region).or_default();
        if r.report_date == first_date {
            acc.first.insert(key.as_str());
        } else if r.report_date == last_date {
            acc.last.insert(key.as_str());
        }
    }

    let mut rows: Vec<ProgressRow> = map
        .into_iter()
        .map(|(region, acc)| {
            let resolved = acc.first.difference(&acc.last).count();
            let new_issues = acc.last.difference(&acc.first).count();
            let remaining = acc.first.intersection(&acc.last).count();
            let progress_pct = round2(percent(resolved as f64, acc.first.len() as f64));
            ProgressRow {
                region: region.to_string(),
                initial_count: acc.first.len(),
                current_count: acc.last.len(),
                resolved,
                remaining,
                new_issues,
                progress_pct,
                first_date,
                last_date,
                status: ProgressStatus::from_pct(progress_pct),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.progress_pct
            .partial_cmp(&a.progress_pct)
            .unwrap_or(Ordering::Equal)
    });
    rows
}

/// Annotate progress rows with the cross-region mean and median.
pub fn calculate_benchmark(progress: &[ProgressRow]) -> Vec<BenchmarkRow> {
    if progress.is_empty() {
        return Vec::new();
    }
    let pcts: Vec<f64> = progress.iter().map(|p| p.progress_pct).collect();
    let mean = average(&pcts);
    let med = median(pcts);
    progress
        .iter()
        .map(|p| {
            let deviation = round2(p.progress_pct - mean);
            BenchmarkRow {
                region: p.region.clone(),
                initial_count: p.initial_count,
                resolved: p.resolved,
                progress_pct: p.progress_pct,
                status: p.status,
                overall_mean: round2(mean),
                overall_median: round2(med),
                deviation,
                performance: RelativePerformance::from_deviation(deviation),
            }
        })
        .collect()
}

/// Issues whose identity key shows up on two or more distinct report dates.
///
/// An issue is still unresolved when its key is present on the latest report
/// date. Regions come from the first row seen for each site. Unresolved
/// issues sort first, then by repeat count descending.
pub fn find_repeated_issues(table: &UnifiedTable, roles: &ColumnRoles) -> Vec<RepeatedIssueRow> {
    let Some(keys) = build_keys(table, roles) else {
        return Vec::new();
    };
    let Some(site_col) = roles.site.as_deref() else {
        return Vec::new();
    };
    let Some(last_date) = table.records.iter().map(|r| r.report_date).max() else {
        return Vec::new();
    };
    let region_col = role_column(table, &roles.region);

    let mut region_of: HashMap<&str, Option<&str>> = HashMap::new();
    if let Some(region_col) = region_col {
        for r in &table.records {
            region_of
                .entry(r.text(site_col))
                .or_insert_with(|| r.non_blank(region_col));
        }
    }

    struct Acc<'a> {
        first_row: &'a IssueRecord,
        dates: BTreeSet<NaiveDate>,
    }
    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    for (r, key) in table.records.iter().zip(&keys) {
        map.entry(key.as_str())
            .or_insert_with(|| Acc {
                first_row: r,
                dates: BTreeSet::new(),
            })
            .dates
            .insert(r.report_date);
    }

    let text_of = |r: &IssueRecord, col: &Option<String>| {
        col.as_deref().map(|c| r.text(c).to_string()).unwrap_or_default()
    };

    let mut rows: Vec<RepeatedIssueRow> = map
        .into_iter()
        .filter(|(_, acc)| acc.dates.len() > 1)
        .filter_map(|(key, acc)| {
            let first_seen = *acc.dates.iter().next()?;
            let last_seen = *acc.dates.iter().next_back()?;
            let site = acc.first_row.text(site_col);
            let status = if acc.dates.contains(&last_date) {
                ResolutionStatus::Unresolved
            } else {
                ResolutionStatus::Resolved
            };
            Some(RepeatedIssueRow {
                region: region_of
                    .get(site)
                    .copied()
                    .flatten()
                    .map(str::to_string),
                site: site.to_string(),
                issue_type: text_of(acc.first_row, &roles.issue_type),
                issue_title: text_of(acc.first_row, &roles.issue_title),
                repeat_count: acc.dates.len(),
                priority: Priority::from_repeats(acc.dates.len()),
                status,
                first_seen,
                last_seen,
                span: format!("{} to {}", first_seen, last_seen),
                key: key.to_string(),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| b.repeat_count.cmp(&a.repeat_count))
    });
    rows
}

/// Rows of the latest report whose identity key was absent from the report
/// immediately before it.
pub fn find_new_issues(table: &UnifiedTable, roles: &ColumnRoles) -> Vec<NewIssueRow> {
    let dates = table.report_dates();
    if dates.len() < 2 {
        return Vec::new();
    }
    let Some(keys) = build_keys(table, roles) else {
        return Vec::new();
    };
    let Some(site_col) = roles.site.as_deref() else {
        return Vec::new();
    };
    let last_date = dates[dates.len() - 1];
    let previous_date = dates[dates.len() - 2];
    let region_col = role_column(table, &roles.region);

    let keys_on = |date: NaiveDate| {
        table
            .records
            .iter()
            .zip(&keys)
            .filter(|(r, _)| r.report_date == date)
            .map(|(_, k)| k.as_str())
            .collect::<HashSet<&str>>()
    };
    let previous = keys_on(previous_date);
    let latest = keys_on(last_date);
    let new_keys: HashSet<&str> = latest.difference(&previous).copied().collect();
    if new_keys.is_empty() {
        return Vec::new();
    }

    let cell = |r: &IssueRecord, col: &Option<String>| {
        col.as_deref().map(|c| r.text(c).to_string()).unwrap_or_default()
    };
    table
        .records
        .iter()
        .zip(&keys)
        .filter(|(r, k)| r.report_date == last_date && new_keys.contains(k.as_str()))
        .map(|(r, k)| NewIssueRow {
            region: region_col.and_then(|c| r.non_blank(c)).map(str::to_string),
            site: r.text(site_col).to_string(),
            issue_type: cell(r, &roles.issue_type),
            issue_title: cell(r, &roles.issue_title),
            first_seen: last_date,
            review_priority: "Urgent".to_string(),
            key: k.clone(),
        })
        .collect()
}

/// Count of new issues per region, most affected region first.
pub fn new_issues_by_region(new_issues: &[NewIssueRow]) -> Vec<RegionCountRow> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in new_issues {
        if let Some(region) = row.region.as_deref() {
            *counts.entry(region).or_default() += 1;
        }
    }
    let mut rows: Vec<RegionCountRow> = counts
        .into_iter()
        .map(|(region, count)| RegionCountRow {
            region: region.to_string(),
            count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, roles, table};

    fn scenario_a() -> UnifiedTable {
        table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "A", "Y", "t", "c"),
            ("2025-02-01", "A", "Y", "t", "c"),
            ("2025-02-01", "A", "Z", "t", "c"),
        ])
    }

    #[test]
    fn progress_for_scenario_a() {
        let rows = calculate_progress(&scenario_a(), &roles());
        assert_eq!(rows.len(), 1);
        let a = &rows[0];
        assert_eq!(a.region, "A");
        assert_eq!((a.resolved, a.remaining, a.new_issues), (1, 1, 1));
        assert_eq!(a.progress_pct, 50.0);
        assert_eq!(a.status, ProgressStatus::Good);
        assert_eq!(a.first_date, date("2025-01-01"));
        assert_eq!(a.last_date, date("2025-02-01"));
    }

    #[test]
    fn progress_uses_earliest_and_latest_dates_and_sorts_descending() {
        let t = table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "B", "P", "t", "c"),
            ("2025-01-01", "B", "Q", "t", "c"),
            ("2025-01-15", "A", "X", "t", "c"),
            ("2025-02-01", "A", "X", "t", "c"),
            ("2025-02-01", "C", "R", "t", "c"),
        ]);
        let rows = calculate_progress(&t, &roles());
        let order: Vec<&str> = rows.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(rows[0].progress_pct, 100.0);
        assert_eq!(rows[0].status, ProgressStatus::Excellent);
        // No initial issues: zero, not a division fault.
        assert_eq!(rows[2].initial_count, 0);
        assert_eq!(rows[2].progress_pct, 0.0);
        assert_eq!(rows[2].new_issues, 1);
    }

    #[test]
    fn single_report_yields_empty_results() {
        let t = table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "A", "X", "t", "c"),
        ]);
        assert!(calculate_progress(&t, &roles()).is_empty());
        assert!(find_repeated_issues(&t, &roles()).is_empty());
        assert!(find_new_issues(&t, &roles()).is_empty());
    }

    #[test]
    fn progress_needs_region_and_site_roles() {
        let mut r = roles();
        r.region = None;
        assert!(calculate_progress(&scenario_a(), &r).is_empty());
        let mut r = roles();
        r.site = None;
        assert!(calculate_progress(&scenario_a(), &r).is_empty());
    }

    #[test]
    fn benchmark_buckets_against_mean() {
        let t = table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "B", "Y", "t", "c"),
            ("2025-01-01", "C", "Z", "t", "c"),
            ("2025-01-01", "C", "W", "t", "c"),
            ("2025-02-01", "B", "Y", "t", "c"),
            ("2025-02-01", "C", "Z", "t", "c"),
        ]);
        let progress = calculate_progress(&t, &roles());
        let bench = calculate_benchmark(&progress);
        assert_eq!(bench.len(), 3);
        assert_eq!(bench[0].overall_mean, 50.0);
        assert_eq!(bench[0].overall_median, 50.0);
        let a = bench.iter().find(|b| b.region == "A").unwrap();
        assert_eq!(a.deviation, 50.0);
        assert_eq!(a.performance, RelativePerformance::AboveAverage);
        let c = bench.iter().find(|b| b.region == "C").unwrap();
        assert_eq!(c.performance, RelativePerformance::NearAverage);
        let b = bench.iter().find(|b| b.region == "B").unwrap();
        assert_eq!(b.performance, RelativePerformance::BelowAverage);
        assert!(calculate_benchmark(&[]).is_empty());
    }

    #[test]
    fn repeated_issues_count_distinct_dates_only() {
        let t = table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-01-01", "A", "Y", "t", "c"),
            ("2025-02-01", "A", "X", "t", "c"),
        ]);
        let rows = find_repeated_issues(&t, &roles());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "X||t||c");
        assert_eq!(rows[0].repeat_count, 2);
        assert_eq!(rows[0].priority, Priority::Normal);
        assert_eq!(rows[0].status, ResolutionStatus::Unresolved);
        assert_eq!(rows[0].region.as_deref(), Some("A"));
        assert_eq!(rows[0].span, "2025-01-01 to 2025-02-01");
    }

    #[test]
    fn repeated_issues_sort_unresolved_first_then_by_count() {
        let dates = ["2025-01-01", "2025-01-02", "2025-01-03", "2025-01-04", "2025-01-05"];
        let mut rows = Vec::new();
        for d in &dates {
            rows.push((*d, "A", "OLD", "t", "c"));
        }
        for d in &dates[..3] {
            rows.push((*d, "A", "MID", "t", "c"));
        }
        for d in &dates[3..] {
            rows.push((*d, "B", "NOW", "t", "c"));
        }
        let t = table(&rows);
        let result = find_repeated_issues(&t, &roles());
        let sites: Vec<&str> = result.iter().map(|r| r.site.as_str()).collect();
        assert_eq!(sites, vec!["OLD", "NOW", "MID"]);
        assert_eq!(result[0].priority, Priority::Critical);
        assert_eq!(result[0].status, ResolutionStatus::Unresolved);
        assert_eq!(result[2].priority, Priority::Important);
        assert_eq!(result[2].status, ResolutionStatus::Resolved);
        assert_eq!(result[2].last_seen, date("2025-01-03"));
    }

    #[test]
    fn repeated_issues_keep_first_seen_region_for_a_site() {
        let t = table(&[
            ("2025-01-01", "North", "S1", "t", "c"),
            ("2025-02-01", "South", "S1", "t", "c"),
        ]);
        let rows = find_repeated_issues(&t, &roles());
        assert_eq!(rows[0].region.as_deref(), Some("North"));
    }

    #[test]
    fn new_issues_compare_against_previous_report_not_first() {
        let t = table(&[
            ("2025-01-01", "A", "X", "t", "c"),
            ("2025-02-01", "A", "Y", "t", "c"),
            ("2025-03-01", "A", "X", "t", "c"),
            ("2025-03-01", "A", "Y", "t", "c"),
            ("2025-03-01", "B", "Z", "t", "c"),
        ]);
        let rows = find_new_issues(&t, &roles());
        let sites: Vec<&str> = rows.iter().map(|r| r.site.as_str()).collect();
        assert_eq!(sites, vec!["X", "Z"]);
        assert!(rows.iter().all(|r| r.first_seen == date("2025-03-01")));

        let by_region = new_issues_by_region(&rows);
        assert_eq!(by_region.len(), 2);
        assert_eq!(by_region[0].count, 1);
    }

    #[test]
    fn derived_tables_are_idempotent() {
        let t = scenario_a();
        let r = roles();
        assert_eq!(calculate_progress(&t, &r), calculate_progress(&t, &r));
        assert_eq!(find_repeated_issues(&t, &r), find_repeated_issues(&t, &r));
        assert_eq!(find_new_issues(&t, &r), find_new_issues(&t, &r));
    }
}
