// Builders shared by the unit tests.
use crate::columns::detect_columns;
use crate::types::{ColumnRoles, IssueRecord, UnifiedTable};
use chrono::NaiveDate;

pub const COLUMNS: [&str; 4] = ["Province", "Site", "Mismatch Type", "Comment"];

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `(date, province, site, type, comment)` rows in append order.
pub fn table(rows: &[(&str, &str, &str, &str, &str)]) -> UnifiedTable {
    let records = rows
        .iter()
        .map(|(d, province, site, kind, comment)| {
            let d = date(d);
            let source = format!("report_{}.csv", d.format("%Y%m%d"));
            IssueRecord::new(
                d,
                &source,
                COLUMNS.iter().copied().zip([*province, *site, *kind, *comment]),
            )
        })
        .collect();
    UnifiedTable::from_records(COLUMNS.iter().map(|c| c.to_string()).collect(), records)
}

pub fn roles() -> ColumnRoles {
    detect_columns(&COLUMNS)
}
