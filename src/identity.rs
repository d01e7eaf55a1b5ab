use crate::types::{ColumnRoles, IssueRecord, UnifiedTable};

pub const KEY_SEPARATOR: &str = "||";

/// Identity key of a single record: `site||issue_type||issue_title`.
///
/// Returns `None` without a site role. Missing optional roles contribute
/// empty segments.
pub fn record_key(record: &IssueRecord, roles: &ColumnRoles) -> Option<String> {
    let site = roles.site.as_deref()?;
    Some(
        [
            record.text(site),
            segment(record, roles.issue_type.as_deref()),
            segment(record, roles.issue_title.as_deref()),
        ]
        .join(KEY_SEPARATOR),
    )
}

fn segment<'a>(record: &'a IssueRecord, column: Option<&str>) -> &'a str {
    column.map(|c| record.text(c)).unwrap_or("")
}

/// One identity key per record, in table order, or `None` when the site role
/// is absent or not a column of this table.
pub fn build_keys(table: &UnifiedTable, roles: &ColumnRoles) -> Option<Vec<String>> {
    let site = roles.site.as_deref()?;
    if !table.has_column(site) {
        return None;
    }
    table
        .records
        .iter()
        .map(|r| record_key(r, roles))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(pairs: &[(&str, &str)]) -> IssueRecord {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        IssueRecord::new(date, "r_20250101.csv", pairs.iter().copied())
    }

    fn roles(site: Option<&str>, kind: Option<&str>, title: Option<&str>) -> ColumnRoles {
        ColumnRoles {
            region: None,
            site: site.map(str::to_string),
            issue_type: kind.map(str::to_string),
            issue_title: title.map(str::to_string),
        }
    }

    #[test]
    fn joins_all_three_segments() {
        let r = record(&[("Site", "S1"), ("Type", "power"), ("Title", "low")]);
        let key = record_key(&r, &roles(Some("Site"), Some("Type"), Some("Title")));
        assert_eq!(key.as_deref(), Some("S1||power||low"));
    }

    #[test]
    fn missing_optional_roles_give_empty_segments() {
        let r = record(&[("Site", "S1"), ("Title", "low")]);
        assert_eq!(
            record_key(&r, &roles(Some("Site"), None, Some("Title"))).as_deref(),
            Some("S1||||low")
        );
        assert_eq!(
            record_key(&r, &roles(Some("Site"), None, None)).as_deref(),
            Some("S1||||")
        );
    }

    #[test]
    fn no_site_role_means_no_keys() {
        let r = record(&[("Type", "power")]);
        assert_eq!(record_key(&r, &roles(None, Some("Type"), None)), None);

        let table = UnifiedTable::from_records(vec!["Type".to_string()], vec![r]);
        assert_eq!(build_keys(&table, &roles(None, Some("Type"), None)), None);
        assert_eq!(build_keys(&table, &roles(Some("Site"), None, None)), None);
    }

    #[test]
    fn builds_one_key_per_record() {
        let table = UnifiedTable::from_records(
            vec!["Site".to_string()],
            vec![record(&[("Site", "A")]), record(&[("Site", "B")])],
        );
        let keys = build_keys(&table, &roles(Some("Site"), None, None)).unwrap();
        assert_eq!(keys, vec!["A||||", "B||||"]);
    }
}
