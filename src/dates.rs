use crate::cell::Cell;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use thiserror::Error;

/// Largest serial we accept; well past year 9999 either way.
const MAX_SERIAL_DAYS: f64 = 3_000_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateParseError {
    #[error("blank cell")]
    Blank,

    #[error("unrecognized date value: {0}")]
    Unrecognized(String),

    #[error("not a calendar date: {0}")]
    InvalidDate(String),

    #[error("serial value is not finite")]
    NotFinite,
}

/// Declared encoding of a date cell. `Auto` sniffs the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    #[default]
    Auto,
    Iso,
    DayFirst,
    Serial,
}

impl DateFormat {
    pub fn parse(raw: &str) -> Option<DateFormat> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Some(DateFormat::Auto),
            "iso" => Some(DateFormat::Iso),
            "dayfirst" | "day_first" | "locale" => Some(DateFormat::DayFirst),
            "serial" => Some(DateFormat::Serial),
            _ => None,
        }
    }
}

/// Spreadsheet day zero.
fn serial_epoch() -> Result<NaiveDate, DateParseError> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .ok_or_else(|| DateParseError::InvalidDate("1899-12-30".to_string()))
}

/// Canonical calendar-day key used for storage and display.
pub fn date_key(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn from_serial(serial: f64) -> Result<NaiveDate, DateParseError> {
    if !serial.is_finite() {
        return Err(DateParseError::NotFinite);
    }
    let days = serial.floor();
    if days.abs() > MAX_SERIAL_DAYS {
        return Err(DateParseError::InvalidDate(serial.to_string()));
    }
    serial_epoch()?
        .checked_add_signed(Duration::days(days as i64))
        .ok_or_else(|| DateParseError::InvalidDate(serial.to_string()))
}

fn split_numeric(raw: &str) -> Option<(i64, i64, i64)> {
    let mut parts = raw.split('-').map(|t| t.trim());
    let a = parts.next()?.parse::<i64>().ok()?;
    let b = parts.next()?.parse::<i64>().ok()?;
    let c = parts.next()?.parse::<i64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b, c))
}

fn build_date(year: i64, month: i64, day: i64, raw: &str) -> Result<NaiveDate, DateParseError> {
    let (Ok(y), Ok(m), Ok(d)) = (i32::try_from(year), u32::try_from(month), u32::try_from(day))
    else {
        return Err(DateParseError::InvalidDate(raw.to_string()));
    };
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| DateParseError::InvalidDate(raw.to_string()))
}

/// `YYYY-MM-DD`, optionally followed by a `T...` or space-separated time.
pub fn parse_iso(raw: &str) -> Result<NaiveDate, DateParseError> {
    let t = raw.trim();
    let day_part = t.split(['T', ' ']).next().unwrap_or(t);
    let Some((y, m, d)) = split_numeric(day_part) else {
        return Err(DateParseError::Unrecognized(t.to_string()));
    };
    build_date(y, m, d, t)
}

/// `DD-MM-YYYY` or `DD/MM/YYYY`. Two-digit years are ambiguous and rejected.
pub fn parse_day_first(raw: &str) -> Result<NaiveDate, DateParseError> {
    let t = raw.trim();
    let dashed = t.replace('/', "-");
    let year = dashed.rsplit('-').next().unwrap_or("").trim();
    if year.len() < 4 {
        return Err(DateParseError::Unrecognized(t.to_string()));
    }
    let Some((d, m, y)) = split_numeric(&dashed) else {
        return Err(DateParseError::Unrecognized(t.to_string()));
    };
    build_date(y, m, d, t)
}

fn sniff_text(raw: &str) -> Result<NaiveDate, DateParseError> {
    let t = raw.trim();
    if !t.contains('-') {
        return Err(DateParseError::Unrecognized(t.to_string()));
    }
    let first = t.split('-').next().unwrap_or("");
    if first.trim().len() == 4 {
        parse_iso(t)
    } else {
        parse_day_first(t)
    }
}

/// Normalize one cell. Never panics; a bad cell is an `Err`, not a failure
/// of the surrounding batch.
pub fn normalize_cell(cell: &Cell, format: DateFormat) -> Result<NaiveDate, DateParseError> {
    match (cell, format) {
        (Cell::Blank, _) => Err(DateParseError::Blank),
        (Cell::Number(n), DateFormat::Auto | DateFormat::Serial) => from_serial(*n),
        (Cell::Text(s), DateFormat::Auto) => sniff_text(s),
        (Cell::Text(s), DateFormat::Iso) => parse_iso(s),
        (Cell::Text(s), DateFormat::DayFirst) => parse_day_first(s),
        (Cell::Text(s), DateFormat::Serial) => match s.trim().parse::<f64>() {
            Ok(n) => from_serial(n),
            Err(_) => Err(DateParseError::Unrecognized(s.trim().to_string())),
        },
        (other, _) => Err(DateParseError::Unrecognized(
            other.as_text().unwrap_or_default(),
        )),
    }
}

/// Result of normalizing a list of cells: the canonical day set plus the
/// cells that were dropped.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub dates: BTreeSet<NaiveDate>,
    pub dropped: Vec<DateParseError>,
}

/// Normalize every cell, dropping blanks silently and logging unparseable ones.
pub fn normalize_cells<'a, I>(cells: I, format: DateFormat) -> Normalized
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut out = Normalized::default();
    for cell in cells {
        match normalize_cell(cell, format) {
            Ok(d) => {
                out.dates.insert(d);
            }
            Err(DateParseError::Blank) => {}
            Err(e) => {
                tracing::warn!(cell = ?cell, error = %e, "dropping unparseable date cell");
                out.dropped.push(e);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn serial_45000_is_stable() {
        let first = normalize_cell(&Cell::Number(45000.0), DateFormat::Auto).expect("serial");
        let second = normalize_cell(&Cell::Number(45000.0), DateFormat::Auto).expect("serial");
        assert_eq!(first, ymd(2023, 3, 15));
        assert_eq!(first, second);
        assert_eq!(first, ymd(1899, 12, 30) + Duration::days(45000));
    }

    #[test]
    fn serial_drops_time_of_day() {
        assert_eq!(from_serial(45000.75), Ok(ymd(2023, 3, 15)));
        assert_eq!(from_serial(f64::NAN), Err(DateParseError::NotFinite));
        assert!(from_serial(1e12).is_err());
    }

    #[test]
    fn sniffing_uses_first_token_length() {
        assert_eq!(
            normalize_cell(&Cell::Text("2025-03-01".into()), DateFormat::Auto),
            Ok(ymd(2025, 3, 1))
        );
        assert_eq!(
            normalize_cell(&Cell::Text("01-03-2025".into()), DateFormat::Auto),
            Ok(ymd(2025, 3, 1))
        );
        assert_eq!(
            normalize_cell(&Cell::Text("2025-03-01T10:30:00.000Z".into()), DateFormat::Auto),
            Ok(ymd(2025, 3, 1))
        );
    }

    #[test]
    fn two_digit_years_are_not_guessed() {
        for raw in ["01-03-25", "1/3/25", "01-03-202"] {
            assert!(
                matches!(
                    normalize_cell(&Cell::Text(raw.into()), DateFormat::Auto),
                    Err(DateParseError::Unrecognized(_))
                ),
                "{raw}"
            );
        }
        assert!(matches!(
            parse_day_first("01-03-25"),
            Err(DateParseError::Unrecognized(_))
        ));
        assert_eq!(parse_day_first("1/3/2025"), Ok(ymd(2025, 3, 1)));
    }

    #[test]
    fn auto_rejects_shapes_without_dash() {
        assert!(matches!(
            normalize_cell(&Cell::Text("45000".into()), DateFormat::Auto),
            Err(DateParseError::Unrecognized(_))
        ));
        assert!(matches!(
            normalize_cell(&Cell::Text("March 1".into()), DateFormat::Auto),
            Err(DateParseError::Unrecognized(_))
        ));
        assert!(matches!(
            normalize_cell(&Cell::Bool(true), DateFormat::Auto),
            Err(DateParseError::Unrecognized(_))
        ));
    }

    #[test]
    fn impossible_dates_are_invalid_not_panics() {
        assert!(matches!(
            normalize_cell(&Cell::Text("2025-02-30".into()), DateFormat::Auto),
            Err(DateParseError::InvalidDate(_))
        ));
        assert!(matches!(
            normalize_cell(&Cell::Text("31-04-2025".into()), DateFormat::Auto),
            Err(DateParseError::InvalidDate(_))
        ));
    }

    #[test]
    fn declared_formats_do_not_guess() {
        // Day-first text declared as ISO must not silently become another date.
        assert!(normalize_cell(&Cell::Text("01-03-2025".into()), DateFormat::Iso).is_err());
        assert_eq!(
            normalize_cell(&Cell::Text("01/03/2025".into()), DateFormat::DayFirst),
            Ok(ymd(2025, 3, 1))
        );
        assert_eq!(
            normalize_cell(&Cell::Text("45000".into()), DateFormat::Serial),
            Ok(ymd(2023, 3, 15))
        );
        assert!(normalize_cell(&Cell::Number(45000.0), DateFormat::Iso).is_err());
    }

    #[test]
    fn normalize_cells_dedupes_and_collects_drops() {
        let cells = vec![
            Cell::Text("2025-03-01".into()),
            Cell::Text("01-03-2025".into()),
            Cell::Blank,
            Cell::Text("garbage".into()),
            Cell::Number(45000.0),
        ];
        let out = normalize_cells(&cells, DateFormat::Auto);
        assert_eq!(out.dates.len(), 2);
        assert_eq!(out.dropped.len(), 1);
    }

    #[test]
    fn date_keys_round_trip_through_storage_form() {
        let d = ymd(2025, 3, 9);
        assert_eq!(date_key(&d), "2025-03-09");
        assert_eq!(parse_date_key("2025-03-09"), Some(d));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!(DateFormat::parse("dayFirst"), Some(DateFormat::DayFirst));
        assert_eq!(DateFormat::parse("ISO"), Some(DateFormat::Iso));
        assert_eq!(DateFormat::parse("nope"), None);
    }
}
