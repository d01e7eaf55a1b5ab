// Solar Hijri (Jalali) rendering of report dates.
//
// With the `jalali` feature disabled, `localize` returns the Gregorian
// `YYYY-MM-DD` string unmodified.
use chrono::NaiveDate;
#[cfg(feature = "jalali")]
use chrono::Datelike;

/// Days before each Gregorian month in a non-leap year.
#[cfg(feature = "jalali")]
const DAYS_BEFORE_MONTH: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Convert a Gregorian date to a Jalali `(year, month, day)` triple.
#[cfg(feature = "jalali")]
pub fn to_jalali(date: NaiveDate) -> (i64, i64, i64) {
    let gy = date.year() as i64;
    let gm = date.month() as usize;
    let gd = date.day() as i64;
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + gd
        + DAYS_BEFORE_MONTH[gm - 1];
    let mut jy = -1595 + 33 * (days / 12_053);
    days %= 12_053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }
    if days < 186 {
        (jy, 1 + days / 31, 1 + days % 31)
    } else {
        (jy, 7 + (days - 186) / 30, 1 + (days - 186) % 30)
    }
}

#[cfg(feature = "jalali")]
pub fn localize(date: NaiveDate) -> String {
    let (y, m, d) = to_jalali(date);
    format!("{:04}/{:02}/{:02}", y, m, d)
}

#[cfg(not(feature = "jalali"))]
pub fn localize(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
