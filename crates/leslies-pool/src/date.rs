//! Test date normalization.
//!
//! The results page only carries a calendar date. It is pinned to midday so
//! that shifting it into any timezone keeps the same day.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::error;

const TEST_DATE_FORMAT: &str = "%m/%d/%Y";

/// Parse a `MM/DD/YYYY` test date into a naive timestamp at 12:00:00.000.
///
/// Returns `None` for absent or empty input, for any other shape, and for
/// impossible calendar dates. Never fails otherwise.
pub fn parse_test_date(date_str: Option<&str>) -> Option<NaiveDateTime> {
    let date_str = date_str?;
    if date_str.is_empty() {
        return None;
    }

    if !has_exact_shape(date_str) {
        error!(date = date_str, "Failed to parse test date");
        return None;
    }

    match NaiveDate::parse_from_str(date_str, TEST_DATE_FORMAT) {
        Ok(date) => date.and_hms_milli_opt(12, 0, 0, 0),
        Err(e) => {
            error!(date = date_str, error = %e, "Failed to parse test date");
            None
        }
    }
}

// Two-digit month and day, four-digit year.
fn has_exact_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'/',
            _ => b.is_ascii_digit(),
        })
}
