use crate::cell::Cell;
use crate::dates::{self, DateFormat, Normalized};
use crate::error::{AttendanceError, Result};
use crate::roster::Scope;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCalendar {
    pub scope: Scope,
    pub month: String,
    pub days: BTreeSet<NaiveDate>,
    pub version: i64,
}

pub(crate) fn encode_days(days: &BTreeSet<NaiveDate>) -> Result<String> {
    let keys: Vec<String> = days.iter().map(dates::date_key).collect();
    Ok(serde_json::to_string(&keys)?)
}

pub(crate) fn decode_days(raw: &str) -> Result<BTreeSet<NaiveDate>> {
    let keys: Vec<String> = serde_json::from_str(raw)?;
    keys.iter()
        .map(|k| {
            dates::parse_date_key(k)
                .ok_or_else(|| AttendanceError::InvalidState(format!("stored date {k} is corrupt")))
        })
        .collect()
}

pub(crate) fn month_label(raw: &str) -> Result<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(AttendanceError::InvalidInput("month must not be empty".to_string()));
    }
    Ok(t.to_string())
}

/// Replace the working-day set for (scope, month), creating it if absent.
///
/// The previous set is discarded entirely. Attendance entries derived from it
/// are left as they are.
pub fn set_working_days(
    conn: &Connection,
    scope: &Scope,
    month: &str,
    days: &BTreeSet<NaiveDate>,
) -> Result<WorkingCalendar> {
    let month = month_label(month)?;
    let version: i64 = conn.query_row(
        "INSERT INTO working_calendars(class, division, month, days, version, updated_at)
         VALUES(?, ?, ?, ?, 1, ?)
         ON CONFLICT(class, division, month) DO UPDATE SET
           days = excluded.days,
           version = working_calendars.version + 1,
           updated_at = excluded.updated_at
         RETURNING version",
        (
            &scope.class,
            &scope.division,
            &month,
            encode_days(days)?,
            crate::db::now_stamp(),
        ),
        |r| r.get(0),
    )?;
    tracing::info!(
        class = %scope.class,
        division = %scope.division,
        month = %month,
        days = days.len(),
        version,
        "working days replaced"
    );
    Ok(WorkingCalendar {
        scope: scope.clone(),
        month,
        days: days.clone(),
        version,
    })
}

/// Normalize raw cells, then replace the set. Unparseable cells are dropped.
pub fn set_working_days_from_cells(
    conn: &Connection,
    scope: &Scope,
    month: &str,
    cells: &[Cell],
    format: DateFormat,
) -> Result<(WorkingCalendar, Normalized)> {
    let normalized = dates::normalize_cells(cells, format);
    let calendar = set_working_days(conn, scope, month, &normalized.dates)?;
    Ok((calendar, normalized))
}

pub fn get_working_days(conn: &Connection, scope: &Scope, month: &str) -> Result<Option<WorkingCalendar>> {
    let month = month_label(month)?;
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT days, version FROM working_calendars
             WHERE class = ? AND division = ? AND month = ?",
            (&scope.class, &scope.division, &month),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((raw, version)) = row else {
        return Ok(None);
    };
    Ok(Some(WorkingCalendar {
        scope: scope.clone(),
        month,
        days: decode_days(&raw)?,
        version,
    }))
}

/// Like `get_working_days`, but a missing calendar is `NotConfigured`.
pub fn require_working_days(conn: &Connection, scope: &Scope, month: &str) -> Result<WorkingCalendar> {
    get_working_days(conn, scope, month)?.ok_or_else(|| AttendanceError::NotConfigured {
        class: scope.class.clone(),
        division: scope.division.clone(),
        month: month.trim().to_string(),
    })
}
