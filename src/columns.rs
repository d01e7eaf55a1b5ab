// Heuristic column role detection.
//
// Headers are lower-cased and matched by substring against fixed keyword
// lists. A column is claimed by the first role whose keywords it matches;
// the role is only filled if still empty, and the column never falls
// through to a later role.
use crate::types::{ColumnRoles, UnifiedTable};
use tracing::debug;

pub const REGION_KEYWORDS: &[&str] = &["استان", "province", "region"];
pub const SITE_KEYWORDS: &[&str] = &["سایت", "site", "کد", "code"];
/// Every word of one group must appear in the header.
pub const ISSUE_TYPE_KEYWORDS: &[&[&str]] = &[
    &["ستون", "مغایرت"],
    &["mismatch", "type"],
    &["issue", "type"],
];
pub const ISSUE_TITLE_KEYWORDS: &[&str] = &[
    "کامنت",
    "عنوان",
    "توضیح",
    "comment",
    "title",
    "description",
];

fn matches_any(header: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| header.contains(k))
}

fn matches_group(header: &str, groups: &[&[&str]]) -> bool {
    groups.iter().any(|g| g.iter().all(|k| header.contains(k)))
}

fn fill(slot: &mut Option<String>, column: &str) {
    if slot.is_none() {
        *slot = Some(column.to_string());
    }
}

/// The column assigned to `role`, if it is actually present in `table`.
pub(crate) fn role_column<'a>(table: &UnifiedTable, role: &'a Option<String>) -> Option<&'a str> {
    role.as_deref().filter(|c| table.has_column(c))
}

pub fn detect_columns<S: AsRef<str>>(columns: &[S]) -> ColumnRoles {
    let mut roles = ColumnRoles::default();
    for col in columns {
        let col = col.as_ref();
        let header = col.to_lowercase();
        if matches_any(&header, REGION_KEYWORDS) {
            fill(&mut roles.region, col);
        } else if matches_any(&header, SITE_KEYWORDS) {
            fill(&mut roles.site, col);
        } else if matches_group(&header, ISSUE_TYPE_KEYWORDS) {
            fill(&mut roles.issue_type, col);
        } else if matches_any(&header, ISSUE_TITLE_KEYWORDS) {
            fill(&mut roles.issue_title, col);
        }
    }
    debug!(?roles, "detected column roles");
    roles
}
