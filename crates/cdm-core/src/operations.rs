//! Value transforms for pass-through fields.
//!
//! Dates are parsed leniently from the common layouts found in source
//! extracts and rendered in a single canonical form. A value that cannot be
//! parsed becomes `Missing`.

use cdm_model::{CellValue, FieldOperation};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

/// Canonical datetime layout for destination fields.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Canonical date layout for destination fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATETIME_FORMATS: [&str; 13] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%b-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%d %b %Y",
];

/// Parse a date or datetime; date-only values resolve to midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Apply one operation. `Missing` passes through unchanged.
pub fn apply(operation: FieldOperation, value: CellValue) -> CellValue {
    let CellValue::Text(text) = value else {
        return CellValue::Missing;
    };
    match operation {
        FieldOperation::Trim => CellValue::from_raw(&text),
        FieldOperation::Uppercase => CellValue::Text(text.to_uppercase()),
        FieldOperation::Lowercase => CellValue::Text(text.to_lowercase()),
        FieldOperation::ExtractYear
        | FieldOperation::ExtractMonth
        | FieldOperation::ExtractDay
        | FieldOperation::GetDatetime
        | FieldOperation::GetDate => {
            let Some(dt) = parse_datetime(&text) else {
                debug!(operation = %operation, "unparseable date");
                return CellValue::Missing;
            };
            let rendered = match operation {
                FieldOperation::ExtractYear => dt.year().to_string(),
                FieldOperation::ExtractMonth => dt.month().to_string(),
                FieldOperation::ExtractDay => dt.day().to_string(),
                FieldOperation::GetDate => dt.format(DATE_FORMAT).to_string(),
                _ => dt.format(DATETIME_FORMAT).to_string(),
            };
            CellValue::Text(rendered)
        }
    }
}

/// Apply operations in declaration order.
pub fn apply_all(operations: &[FieldOperation], value: CellValue) -> CellValue {
    operations
        .iter()
        .fold(value, |value, operation| apply(*operation, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn date_parts_from_iso_and_european_dates() {
        assert_eq!(apply(FieldOperation::ExtractYear, text("1984-03-07")), text("1984"));
        assert_eq!(apply(FieldOperation::ExtractMonth, text("07/03/1984")), text("3"));
        assert_eq!(apply(FieldOperation::ExtractDay, text("1984-03-07T10:15:00")), text("7"));
    }

    #[test]
    fn datetime_is_normalized() {
        assert_eq!(
            apply(FieldOperation::GetDatetime, text("2020-01-02T03:04:05")),
            text("2020-01-02 03:04:05")
        );
        assert_eq!(
            apply(FieldOperation::GetDatetime, text("2020-01-02")),
            text("2020-01-02 00:00:00")
        );
        assert_eq!(
            apply(FieldOperation::GetDate, text("02-Jan-2020 10:00:00")),
            text("2020-01-02")
        );
    }

    #[test]
    fn unparseable_dates_become_missing() {
        assert_eq!(apply(FieldOperation::GetDate, text("not a date")), CellValue::Missing);
        assert_eq!(apply(FieldOperation::ExtractYear, CellValue::Missing), CellValue::Missing);
    }

    #[test]
    fn text_operations_chain_in_order() {
        let ops = [FieldOperation::Trim, FieldOperation::Uppercase];
        assert_eq!(apply_all(&ops, text(" male ")), text("MALE"));
        assert_eq!(apply_all(&[], text("As Is")), text("As Is"));
    }
}
