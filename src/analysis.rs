// Count-based reports over the unified table: issue-type Pareto, report to
// report comparison, per-region timelines and distributions, region
// head-to-head comparison, summary statistics and the linear trend
// projection.
use crate::columns::role_column;
use crate::types::{
    ColumnRoles, IssueRecord, IssueTypeRow, ParetoCategory, RegionComparison, RegionCountRow,
    RegionDateMatrix, RegionProfileRow, ReportComparisonRow, SharedIssueTypeRow, SummaryStats,
    TimelinePoint, Trend, TrendDirection, TrendProjection, TrendProjectionRow, UnifiedTable,
};
use crate::util::{linear_fit, percent, round2, safe_div};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Caveat shown next to every trend projection.
pub const TREND_LIMITATION: &str =
    "Naive linear extrapolation: no seasonality, no confidence interval.";

fn distinct<'a, I>(records: I, column: Option<&str>) -> usize
where
    I: IntoIterator<Item = &'a IssueRecord>,
{
    let Some(column) = column else {
        return 0;
    };
    records
        .into_iter()
        .filter_map(|r| r.non_blank(column))
        .collect::<HashSet<_>>()
        .len()
}

/// Frequency of each issue type, most frequent first, with cumulative
/// percentage buckets (≤80 critical, ≤95 important, else minor).
pub fn analyze_issue_types(table: &UnifiedTable, roles: &ColumnRoles) -> Vec<IssueTypeRow> {
    let Some(type_col) = role_column(table, &roles.issue_type) else {
        return Vec::new();
    };
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in &table.records {
        if let Some(kind) = r.non_blank(type_col) {
            let c = counts.entry(kind).or_insert(0);
            if *c == 0 {
                order.push(kind);
            }
            *c += 1;
        }
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }
    // Stable sort keeps first-appearance order among equal counts.
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let mut cumulative = 0.0;
    order
        .into_iter()
        .map(|kind| {
            let count = counts[kind];
            let percentage = round2(percent(count as f64, total as f64));
            cumulative += percentage;
            let cumulative_pct = round2(cumulative);
            IssueTypeRow {
                issue_type: kind.to_string(),
                count,
                percentage,
                cumulative_pct,
                category: ParetoCategory::from_cumulative(cumulative_pct),
            }
        })
        .collect()
}

/// Side-by-side profile of two regions plus the issue types they share.
pub fn compare_two_regions(
    table: &UnifiedTable,
    roles: &ColumnRoles,
    first: &str,
    second: &str,
) -> RegionComparison {
    let Some(region_col) = role_column(table, &roles.region) else {
        return RegionComparison::default();
    };
    let site_col = role_column(table, &roles.site);
    let type_col = role_column(table, &roles.issue_type);

    let rows_of = |region: &str| {
        table
            .records
            .iter()
            .filter(|r| r.get(region_col) == Some(region))
            .collect::<Vec<&IssueRecord>>()
    };
    let first_rows = rows_of(first);
    let second_rows = rows_of(second);

    let profile = |region: &str, rows: &[&IssueRecord]| {
        let distinct_sites = distinct(rows.iter().copied(), site_col);
        RegionProfileRow {
            region: region.to_string(),
            total_issues: rows.len(),
            distinct_sites,
            issues_per_site: round2(safe_div(rows.len() as f64, distinct_sites as f64)),
            distinct_issue_types: distinct(rows.iter().copied(), type_col),
        }
    };
    let profiles = vec![profile(first, &first_rows), profile(second, &second_rows)];

    let shared_issue_types = match type_col {
        Some(type_col) => {
            let tally = |rows: &[&IssueRecord]| {
                let mut m: BTreeMap<String, usize> = BTreeMap::new();
                for r in rows {
                    if let Some(kind) = r.non_blank(type_col) {
                        *m.entry(kind.to_string()).or_default() += 1;
                    }
                }
                m
            };
            let a = tally(&first_rows);
            let b = tally(&second_rows);
            a.iter()
                .filter_map(|(kind, &count)| {
                    b.get(kind).map(|&other| SharedIssueTypeRow {
                        issue_type: kind.clone(),
                        first_region_count: count,
                        second_region_count: other,
                    })
                })
                .collect()
        }
        None => Vec::new(),
    };

    RegionComparison {
        profiles,
        shared_issue_types,
    }
}

/// Per report date: issue, site and region counts, plus the change against
/// the previous report when more than one report is loaded.
pub fn compare_reports(table: &UnifiedTable, roles: &ColumnRoles) -> Vec<ReportComparisonRow> {
    let site_col = role_column(table, &roles.site);
    let region_col = role_column(table, &roles.region);
    let dates = table.report_dates();

    let mut rows: Vec<ReportComparisonRow> = dates
        .iter()
        .map(|&date| {
            let on_date: Vec<&IssueRecord> = table.records_on(date).collect();
            ReportComparisonRow {
                report_date: date,
                report_date_local: table.date_label(date),
                issue_count: on_date.len(),
                site_count: distinct(on_date.iter().copied(), site_col),
                region_count: distinct(on_date.iter().copied(), region_col),
                source_file: on_date
                    .first()
                    .map(|r| r.source_name.clone())
                    .unwrap_or_default(),
                change: None,
                change_pct: None,
                trend: None,
            }
        })
        .collect();

    if rows.len() > 1 {
        for i in 1..rows.len() {
            let prev = rows[i - 1].issue_count as i64;
            let change = rows[i].issue_count as i64 - prev;
            rows[i].change = Some(change);
            rows[i].change_pct = Some(round2(percent(change as f64, prev as f64)));
            rows[i].trend = Some(Trend::from_change(change));
        }
    }
    rows
}

/// Issue count of one region on every report date in the table, with zero
/// for dates where the region has no rows.
pub fn calculate_region_timeline(
    table: &UnifiedTable,
    roles: &ColumnRoles,
    region: &str,
) -> Vec<TimelinePoint> {
    let Some(region_col) = role_column(table, &roles.region) else {
        return Vec::new();
    };
    let mut counts: HashMap<_, usize> = HashMap::new();
    for r in table.records.iter().filter(|r| r.get(region_col) == Some(region)) {
        *counts.entry(r.report_date).or_default() += 1;
    }
    table
        .report_dates()
        .into_iter()
        .map(|date| TimelinePoint {
            report_date: date,
            report_date_local: table.date_label(date),
            issue_count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Fit a least-squares line to the per-report totals and extend it `periods`
/// reports past the last one. Needs at least three report dates.
///
/// See [`TREND_LIMITATION`].
pub fn predict_future_trend(table: &UnifiedTable, periods: usize) -> Option<TrendProjection> {
    let dates = table.report_dates();
    if dates.len() < 3 {
        return None;
    }
    let observed: Vec<usize> = dates.iter().map(|&d| table.records_on(d).count()).collect();
    let ys: Vec<f64> = observed.iter().map(|&c| c as f64).collect();
    let (slope, intercept) = linear_fit(&ys);
    let direction = TrendDirection::from_slope(slope);
    let fitted = (0..ys.len())
        .map(|i| intercept + slope * i as f64)
        .collect();

    let last_label = table.date_label(dates[dates.len() - 1]);
    let rows = (0..periods)
        .map(|i| {
            let x = (ys.len() + i) as f64;
            TrendProjectionRow {
                period: format!("{} + {}", last_label, i + 1),
                predicted_count: (intercept + slope * x) as i64,
                direction,
                slope: round2(slope),
            }
        })
        .collect();

    Some(TrendProjection {
        observed,
        fitted,
        slope,
        intercept,
        direction,
        rows,
    })
}

pub fn calculate_summary_stats(table: &UnifiedTable, roles: &ColumnRoles) -> SummaryStats {
    let dates = table.report_dates();
    let date_range = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => {
            format!("{} to {}", table.date_label(first), table.date_label(last))
        }
        _ => "unknown".to_string(),
    };
    SummaryStats {
        total_issues: table.len(),
        unique_sites: distinct(&table.records, role_column(table, &roles.site)),
        unique_regions: distinct(&table.records, role_column(table, &roles.region)),
        total_dates: dates.len(),
        date_range,
        files_count: table
            .records
            .iter()
            .map(|r| r.source_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
    }
}

/// Issue count per region, highest first, optionally cut to the top `limit`.
pub fn region_totals(
    table: &UnifiedTable,
    roles: &ColumnRoles,
    limit: Option<usize>,
) -> Vec<RegionCountRow> {
    let Some(region_col) = role_column(table, &roles.region) else {
        return Vec::new();
    };
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in &table.records {
        if let Some(region) = r.non_blank(region_col) {
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
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

/// Region × report date counts, zero-filled, regions sorted by name.
pub fn region_date_matrix(table: &UnifiedTable, roles: &ColumnRoles) -> RegionDateMatrix {
    let Some(region_col) = role_column(table, &roles.region) else {
        return RegionDateMatrix::default();
    };
    let dates = table.report_dates();
    let regions: Vec<String> = table
        .records
        .iter()
        .filter_map(|r| r.non_blank(region_col))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut counts = vec![vec![0usize; dates.len()]; regions.len()];
    for r in &table.records {
        let Some(region) = r.non_blank(region_col) else {
            continue;
        };
        if let (Ok(ri), Ok(di)) = (
            regions.binary_search_by(|x| x.as_str().cmp(region)),
            dates.binary_search(&r.report_date),
        ) {
            counts[ri][di] += 1;
        }
    }
    RegionDateMatrix {
        dates,
        regions,
        counts,
    }
}
