//! Water test results table parser.
//!
//! The results endpoint returns an HTML fragment holding one table; each row
//! is a test, newest first. Only the first row is read. Columns are
//! positional: `td` cells 1 through 10 are the measurements in
//! [`Measurement::ALL`](crate::reading::Measurement::ALL) order, the date
//! sits in a badge inside the row's header cell and the last cell flags
//! tests not done in store.

use scraper::{ElementRef, Html};
use tracing::debug;

use crate::error::ParseError;
use crate::html::{ClassQuery, text_of};
use crate::reading::WaterTestReading;

const RESULTS_TABLE: ClassQuery = ClassQuery::new(
    "table",
    &[
        "table",
        "table-striped",
        "table-bordered",
        "table-hover",
        "table-sm",
    ],
);
const TABLE_BODY: ClassQuery = ClassQuery::tag("tbody");
const ROW: ClassQuery = ClassQuery::tag("tr");
const CELL: ClassQuery = ClassQuery::tag("td");
const DATE_HEADER: ClassQuery = ClassQuery::new("th", &["text-center", "align-middle", "p-1"]);
const DATE_BADGE: ClassQuery = ClassQuery::new("span", &["badge", "badge-secondary", "p-2"]);
const NOT_IN_STORE_ICON: ClassQuery =
    ClassQuery::new("i", &["fa", "fa-times-circle", "text-danger"]);

/// A row needs more cells than this to be read.
const MIN_CELLS_EXCLUSIVE: usize = 10;

/// Extract the most recent reading from the results fragment.
pub fn extract_reading(html: &str) -> Result<WaterTestReading, ParseError> {
    let document = Html::parse_fragment(html);

    let table = RESULTS_TABLE
        .first_in(&document)?
        .ok_or(ParseError::TableNotFound)?;
    let body = TABLE_BODY
        .first(table)?
        .ok_or(ParseError::MissingTableBody)?;
    let row = ROW.first(body)?.ok_or(ParseError::MissingRow)?;

    let cells = CELL.all(row)?;
    if cells.len() <= MIN_CELLS_EXCLUSIVE {
        return Err(ParseError::TooFewCells { found: cells.len() });
    }
    debug!(cells = cells.len(), "Found water test row");

    let test_date = extract_test_date(row)?;
    let in_store = match cells.last() {
        Some(last) => NOT_IN_STORE_ICON.first(*last)?.is_none(),
        None => true,
    };

    // Column 0 names the pool; the measurements follow in table order.
    let value = |column: usize| text_of(cells[column]);

    Ok(WaterTestReading {
        free_chlorine: value(1),
        total_chlorine: value(2),
        ph: value(3),
        alkalinity: value(4),
        calcium: value(5),
        cyanuric_acid: value(6),
        iron: value(7),
        copper: value(8),
        phosphates: value(9),
        salt: value(10),
        test_date,
        in_store,
    })
}

fn extract_test_date(row: ElementRef<'_>) -> Result<Option<String>, ParseError> {
    let Some(header) = DATE_HEADER.first(row)? else {
        return Ok(None);
    };
    Ok(DATE_BADGE.first(header)?.map(text_of))
}
