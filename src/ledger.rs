use crate::calendar::{self, decode_days, encode_days, month_label};
use crate::db;
use crate::dates::{self, DateFormat, Normalized};
use crate::cell::Cell;
use crate::error::{AttendanceError, Result};
use crate::reconcile::{self, PercentBasis};
use crate::roster::{Roster, Scope, Student};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeSet;

pub const PERCENT_BASIS_KEY: &str = "attendance.percentBasis";

/// One student's attendance for one month. Absences and the percentage are
/// always derived from the working calendar, never submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthEntry {
    pub month: String,
    pub present_dates: BTreeSet<NaiveDate>,
    pub absent_dates: BTreeSet<NaiveDate>,
    pub present_percent: f64,
}

impl MonthEntry {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "month": self.month,
            "presentDates": self.present_dates.iter().map(dates::date_key).collect::<Vec<_>>(),
            "absentDates": self.absent_dates.iter().map(dates::date_key).collect::<Vec<_>>(),
            "presentPercent": self.present_percent,
        })
    }
}

/// What `record_presence` wrote, with the context callers report on.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub student: Student,
    pub entry: MonthEntry,
    pub total_working_days: usize,
    pub version: i64,
}

pub fn percent_basis(conn: &Connection) -> Result<PercentBasis> {
    let stored = db::settings_get_json(conn, PERCENT_BASIS_KEY)?;
    let Some(raw) = stored.as_ref().and_then(|v| v.as_str()) else {
        return Ok(PercentBasis::default());
    };
    Ok(PercentBasis::parse(raw).unwrap_or_else(|| {
        tracing::warn!(value = raw, "unknown percent basis in settings; using default");
        PercentBasis::default()
    }))
}

pub fn set_percent_basis(conn: &Connection, basis: PercentBasis) -> Result<()> {
    db::settings_set_json(conn, PERCENT_BASIS_KEY, &json!(basis.as_str()))
}

/// Resolve a student and check it sits inside the acting scope.
pub fn authorize(roster: &dyn Roster, scope: &Scope, student_id: &str) -> Result<Student> {
    let student = roster
        .student(student_id)?
        .ok_or_else(|| AttendanceError::NotFound(format!("student {student_id}")))?;
    if !scope.contains(&student) {
        return Err(AttendanceError::Forbidden {
            student_id: student_id.to_string(),
            class: scope.class.clone(),
            division: scope.division.clone(),
        });
    }
    Ok(student)
}

/// Record the present dates for (student, month) and derive absences and the
/// percentage against the scope's working calendar.
///
/// Runs as one write transaction; the entry itself is written with a
/// compare-and-swap on its version, so a concurrent writer can never be
/// silently overwritten.
pub fn record_presence(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
    month: &str,
    present: &BTreeSet<NaiveDate>,
) -> Result<PresenceRecord> {
    let month = month_label(month)?;
    let student = authorize(roster, scope, student_id)?;
    let basis = percent_basis(conn)?;

    let tx = db::begin_write(conn)?;
    let working = calendar::require_working_days(&tx, scope, &month)?;
    let derived = reconcile::reconcile(&working.days, present, basis)?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT version FROM attendance_entries WHERE student_id = ? AND month = ?",
            (&student.id, &month),
            |r| r.get(0),
        )
        .optional()?;
    let present_json = encode_days(present)?;
    let absent_json = encode_days(&derived.absent)?;
    let stamp = db::now_stamp();

    let version = match existing {
        Some(expected) => {
            let changed = tx.execute(
                "UPDATE attendance_entries
                 SET present_dates = ?, absent_dates = ?, present_percent = ?,
                     version = version + 1, updated_at = ?
                 WHERE student_id = ? AND month = ? AND version = ?",
                (
                    &present_json,
                    &absent_json,
                    derived.present_percent,
                    &stamp,
                    &student.id,
                    &month,
                    expected,
                ),
            )?;
            if changed == 0 {
                return Err(AttendanceError::Conflict(format!(
                    "attendance {} {}",
                    student.id, month
                )));
            }
            expected + 1
        }
        None => {
            let inserted = tx.execute(
                "INSERT INTO attendance_entries(
                    student_id, month, seq, present_dates, absent_dates,
                    present_percent, version, updated_at)
                 VALUES(?, ?,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM attendance_entries WHERE student_id = ?),
                    ?, ?, ?, 1, ?)",
                (
                    &student.id,
                    &month,
                    &student.id,
                    &present_json,
                    &absent_json,
                    derived.present_percent,
                    &stamp,
                ),
            );
            match inserted {
                Ok(_) => 1,
                Err(e) if db::is_constraint_violation(&e) => {
                    return Err(AttendanceError::Conflict(format!(
                        "attendance {} {}",
                        student.id, month
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    };
    tx.commit()?;

    tracing::debug!(
        student = %student.id,
        month = %month,
        present = present.len(),
        absent = derived.absent.len(),
        percent = derived.present_percent,
        version,
        "attendance recorded"
    );
    Ok(PresenceRecord {
        student,
        entry: MonthEntry {
            month,
            present_dates: present.clone(),
            absent_dates: derived.absent,
            present_percent: derived.present_percent,
        },
        total_working_days: working.days.len(),
        version,
    })
}

/// Normalize raw cells, then record them. Unparseable cells are dropped.
pub fn record_presence_from_cells(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
    month: &str,
    cells: &[Cell],
    format: DateFormat,
) -> Result<(PresenceRecord, Normalized)> {
    let normalized = dates::normalize_cells(cells, format);
    let record = record_presence(conn, roster, student_id, scope, month, &normalized.dates)?;
    Ok((record, normalized))
}

fn entry_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, f64)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
}

fn decode_entry(row: (String, String, String, f64)) -> Result<MonthEntry> {
    let (month, present, absent, present_percent) = row;
    Ok(MonthEntry {
        month,
        present_dates: decode_days(&present)?,
        absent_dates: decode_days(&absent)?,
        present_percent,
    })
}

pub fn get_attendance(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
    month: &str,
) -> Result<MonthEntry> {
    let month = month_label(month)?;
    let student = authorize(roster, scope, student_id)?;
    let row = conn
        .query_row(
            "SELECT month, present_dates, absent_dates, present_percent
             FROM attendance_entries WHERE student_id = ? AND month = ?",
            (&student.id, &month),
            entry_from_row,
        )
        .optional()?;
    match row {
        Some(row) => decode_entry(row),
        None => Err(AttendanceError::NotFound(format!(
            "attendance for {} in {}",
            student.id, month
        ))),
    }
}

/// Every month recorded for the student, in the order months were first submitted.
pub fn attendance_report(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
) -> Result<Vec<MonthEntry>> {
    let student = authorize(roster, scope, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT month, present_dates, absent_dates, present_percent
         FROM attendance_entries WHERE student_id = ? ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([&student.id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode_entry).collect()
}
