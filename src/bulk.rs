//! Spreadsheet ingestion for working days, attendance and marksheets.
//!
//! Every layout is processed unit by unit (column or row) in input order.
//! A unit either gets skipped, or produces exactly one item carrying its own
//! success or failure; a failing unit never aborts the batch. The units are
//! written through the same store entry points interactive requests use.

use crate::calendar;
use crate::cell::{Cell, Grid};
use crate::dates::DateFormat;
use crate::error::{AttendanceError, Result};
use crate::ledger;
use crate::marksheet::{self, MarksheetInput, SubjectMark};
use crate::roster::{Roster, Scope, Student};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const WORKING_DAYS_MARKER: &str = "workingdays";
const MONTH_MARKER: &str = "month";
const PRESENT_DATES_MARKER: &str = "presentdates";

/// Format A rows.
const WD_MONTH_ROW: usize = 1;
const WD_MARKER_ROW: usize = 2;
const WD_FIRST_DATE_ROW: usize = 3;

/// Format B rows.
const AT_ROLL_ROW: usize = 1;
const AT_MONTH_MARKER_ROW: usize = 2;
const AT_MONTH_ROW: usize = 3;
const AT_DATES_MARKER_ROW: usize = 4;
const AT_FIRST_DATE_ROW: usize = 5;

/// Marksheet columns; subject groups repeat every `MS_GROUP_WIDTH` columns.
const MS_ROLL_COL: usize = 0;
const MS_EXAM_COL: usize = 1;
const MS_REMARKS_COL: usize = 2;
const MS_FIRST_GROUP_COL: usize = 3;
const MS_GROUP_WIDTH: usize = 4;

/// Declared date encoding, either one for the whole grid or one per column.
#[derive(Debug, Clone, Default)]
pub struct FormatPlan {
    default: DateFormat,
    per_column: Vec<DateFormat>,
}

impl FormatPlan {
    pub fn uniform(format: DateFormat) -> Self {
        Self {
            default: format,
            per_column: Vec::new(),
        }
    }

    pub fn per_column(formats: Vec<DateFormat>) -> Self {
        Self {
            default: DateFormat::Auto,
            per_column: formats,
        }
    }

    pub fn for_column(&self, col: usize) -> DateFormat {
        self.per_column.get(col).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    Column(usize),
    Row(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemReport {
    WorkingDays {
        total_working_days: usize,
        dropped_cells: usize,
    },
    Attendance {
        total_working_days: usize,
        present_days: usize,
        absent_days: usize,
        present_percent: f64,
        dropped_cells: usize,
    },
    Marksheet {
        exam_type: String,
        obtained_marks: f64,
        total_marks: f64,
        percentage: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub code: &'static str,
    pub message: String,
}

impl From<AttendanceError> for ItemFailure {
    fn from(e: AttendanceError) -> Self {
        ItemFailure {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkItem {
    pub locator: Locator,
    pub roll: Option<i64>,
    pub student: Option<Student>,
    pub month: Option<String>,
    pub outcome: std::result::Result<ItemReport, ItemFailure>,
}

impl BulkItem {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn to_json(&self) -> Value {
        let mut m = Map::new();
        match self.locator {
            Locator::Column(c) => m.insert("column".into(), json!(c)),
            Locator::Row(r) => m.insert("row".into(), json!(r)),
        };
        if let Some(roll) = self.roll {
            m.insert("roll".into(), json!(roll));
        }
        if let Some(s) = &self.student {
            m.insert("studentId".into(), json!(s.id));
            m.insert("studentName".into(), json!(s.full_name));
        }
        if let Some(month) = &self.month {
            m.insert("month".into(), json!(month));
        }
        m.insert("ok".into(), json!(self.is_ok()));
        match &self.outcome {
            Ok(ItemReport::WorkingDays {
                total_working_days,
                dropped_cells,
            }) => {
                m.insert("totalWorkingDays".into(), json!(total_working_days));
                m.insert("droppedCells".into(), json!(dropped_cells));
            }
            Ok(ItemReport::Attendance {
                total_working_days,
                present_days,
                absent_days,
                present_percent,
                dropped_cells,
            }) => {
                m.insert("totalWorkingDays".into(), json!(total_working_days));
                m.insert("presentDays".into(), json!(present_days));
                m.insert("absentDays".into(), json!(absent_days));
                m.insert("presentPercent".into(), json!(present_percent));
                m.insert("droppedCells".into(), json!(dropped_cells));
            }
            Ok(ItemReport::Marksheet {
                exam_type,
                obtained_marks,
                total_marks,
                percentage,
            }) => {
                m.insert("examType".into(), json!(exam_type));
                m.insert("obtainedMarks".into(), json!(obtained_marks));
                m.insert("totalMarks".into(), json!(total_marks));
                m.insert("percentage".into(), json!(percentage));
            }
            Err(f) => {
                m.insert("code".into(), json!(f.code));
                m.insert("error".into(), json!(f.message));
            }
        }
        Value::Object(m)
    }
}

/// Ordered per-unit outcomes of one bulk call. Mixed outcomes are a normal
/// successful result.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub items: Vec<BulkItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn is_partial(&self) -> bool {
        self.succeeded() > 0 && self.failed() > 0
    }

    pub fn to_json(&self) -> Value {
        json!({
            "items": self.items.iter().map(BulkItem::to_json).collect::<Vec<_>>(),
            "attempted": self.items.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "partial": self.is_partial(),
        })
    }
}

/// Fold `units` sequentially into a report. `process` returns `None` to skip
/// a unit. A batch where every unit was skipped is the one batch-level error.
fn run_batch<F>(kind: &str, units: std::ops::Range<usize>, mut process: F) -> Result<BatchReport>
where
    F: FnMut(usize) -> Option<BulkItem>,
{
    let items: Vec<BulkItem> = units.filter_map(&mut process).collect();
    if items.is_empty() {
        return Err(AttendanceError::InvalidInput(format!(
            "no usable {kind} entries in sheet"
        )));
    }
    let report = BatchReport { items };
    tracing::info!(
        kind,
        attempted = report.items.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "bulk ingestion finished"
    );
    Ok(report)
}

fn non_blank_text(cell: &Cell) -> Option<String> {
    cell.as_text().filter(|t| !t.is_empty())
}

fn owned_cells(cells: Vec<&Cell>) -> Vec<Cell> {
    cells.into_iter().cloned().collect()
}

fn log_failure(item: &BulkItem) {
    if let Err(f) = &item.outcome {
        tracing::warn!(locator = ?item.locator, roll = ?item.roll, code = f.code, error = %f.message, "bulk item failed");
    }
}

fn resolve_roll(roster: &dyn Roster, roll: i64, scope: &Scope) -> Result<Student> {
    roster.student_by_roll(roll, scope)?.ok_or_else(|| {
        AttendanceError::NotFound(format!(
            "roll {} in {}/{}",
            roll, scope.class, scope.division
        ))
    })
}

/// Format A: one working-day column per month.
pub fn ingest_working_days(
    conn: &Connection,
    scope: &Scope,
    grid: &Grid,
    formats: &FormatPlan,
) -> Result<BatchReport> {
    run_batch("working-day", 0..grid.column_count(), |col| {
        let Some(month) = non_blank_text(grid.cell(WD_MONTH_ROW, col)) else {
            tracing::debug!(col, "skipping column without month");
            return None;
        };
        if !grid.cell(WD_MARKER_ROW, col).matches_marker(WORKING_DAYS_MARKER) {
            tracing::debug!(col, "skipping column without workingdays marker");
            return None;
        }
        let cells = owned_cells(grid.column_from(col, WD_FIRST_DATE_ROW));
        let outcome =
            calendar::set_working_days_from_cells(conn, scope, &month, &cells, formats.for_column(col))
                .map(|(cal, normalized)| ItemReport::WorkingDays {
                    total_working_days: cal.days.len(),
                    dropped_cells: normalized.dropped.len(),
                })
                .map_err(ItemFailure::from);
        let item = BulkItem {
            locator: Locator::Column(col),
            roll: None,
            student: None,
            month: Some(month),
            outcome,
        };
        log_failure(&item);
        Some(item)
    })
}

/// Resolve the unit's roll in scope, then run `write` for that student. The
/// student is reported even when `write` fails.
fn for_roll<F>(
    roster: &dyn Roster,
    scope: &Scope,
    roll: Option<i64>,
    write: F,
) -> (Option<Student>, Result<ItemReport>)
where
    F: FnOnce(&Student) -> Result<ItemReport>,
{
    let resolved = roll
        .ok_or_else(|| AttendanceError::InvalidInput("roll is not a whole number".to_string()))
        .and_then(|roll| resolve_roll(roster, roll, scope));
    match resolved {
        Ok(student) => {
            let outcome = write(&student);
            (Some(student), outcome)
        }
        Err(e) => (None, Err(e)),
    }
}

fn attendance_outcome(
    conn: &Connection,
    roster: &dyn Roster,
    scope: &Scope,
    student: &Student,
    month: &str,
    cells: &[Cell],
    format: DateFormat,
) -> Result<ItemReport> {
    let (record, normalized) =
        ledger::record_presence_from_cells(conn, roster, &student.id, scope, month, cells, format)?;
    Ok(ItemReport::Attendance {
        total_working_days: record.total_working_days,
        present_days: record.entry.present_dates.len(),
        absent_days: record.entry.absent_dates.len(),
        present_percent: record.entry.present_percent,
        dropped_cells: normalized.dropped.len(),
    })
}

/// Format B: one column per student, present dates below the markers.
pub fn ingest_attendance(
    conn: &Connection,
    roster: &dyn Roster,
    scope: &Scope,
    grid: &Grid,
    formats: &FormatPlan,
) -> Result<BatchReport> {
    run_batch("attendance", 0..grid.column_count(), |col| {
        let roll_cell = grid.cell(AT_ROLL_ROW, col);
        if roll_cell.is_blank() {
            tracing::debug!(col, "skipping column without roll");
            return None;
        }
        if !grid.cell(AT_MONTH_MARKER_ROW, col).matches_marker(MONTH_MARKER)
            || !grid.cell(AT_DATES_MARKER_ROW, col).matches_marker(PRESENT_DATES_MARKER)
        {
            tracing::debug!(col, "skipping column with missing markers");
            return None;
        }
        let Some(month) = non_blank_text(grid.cell(AT_MONTH_ROW, col)) else {
            tracing::debug!(col, "skipping column without month");
            return None;
        };
        let roll = roll_cell.as_integer();
        let cells = owned_cells(grid.column_from(col, AT_FIRST_DATE_ROW));
        let (student, outcome) = for_roll(roster, scope, roll, |student| {
            attendance_outcome(conn, roster, scope, student, &month, &cells, formats.for_column(col))
        });
        let item = BulkItem {
            locator: Locator::Column(col),
            roll,
            student,
            month: Some(month),
            outcome: outcome.map_err(ItemFailure::from),
        };
        log_failure(&item);
        Some(item)
    })
}

fn number_at(grid: &Grid, row: usize, col: usize, what: &str, subject: &str) -> Result<f64> {
    grid.cell(row, col).as_number().ok_or_else(|| {
        AttendanceError::InvalidInput(format!("{what} for {subject} is not a number"))
    })
}

fn marksheet_input(grid: &Grid, row: usize) -> Result<MarksheetInput> {
    let exam_type = non_blank_text(grid.cell(row, MS_EXAM_COL))
        .ok_or_else(|| AttendanceError::InvalidInput("exam type is blank".to_string()))?;
    let mut subjects = Vec::new();
    let width = grid.row(row).len();
    let mut col = MS_FIRST_GROUP_COL;
    while col < width {
        if let Some(subject) = non_blank_text(grid.cell(row, col)) {
            let marks = number_at(grid, row, col + 1, "marks", &subject)?;
            let total_marks = number_at(grid, row, col + 2, "total", &subject)?;
            subjects.push(SubjectMark {
                remark: non_blank_text(grid.cell(row, col + 3)),
                subject,
                marks,
                total_marks,
            });
        }
        col += MS_GROUP_WIDTH;
    }
    Ok(MarksheetInput {
        exam_type,
        subjects,
        overall_remarks: non_blank_text(grid.cell(row, MS_REMARKS_COL)),
    })
}

fn marksheet_outcome(
    conn: &Connection,
    roster: &dyn Roster,
    scope: &Scope,
    grid: &Grid,
    row: usize,
    student: &Student,
) -> Result<ItemReport> {
    let input = marksheet_input(grid, row)?;
    let (_, sheet) = marksheet::assign_marksheet(conn, roster, &student.id, scope, input)?;
    Ok(ItemReport::Marksheet {
        exam_type: sheet.exam_type,
        obtained_marks: sheet.obtained_marks,
        total_marks: sheet.total_marks,
        percentage: sheet.percentage,
    })
}

/// Format C: one student per row, subject groups of four columns.
pub fn ingest_marksheets(
    conn: &Connection,
    roster: &dyn Roster,
    scope: &Scope,
    grid: &Grid,
) -> Result<BatchReport> {
    run_batch("marksheet", 1..grid.row_count(), |row| {
        let roll_cell = grid.cell(row, MS_ROLL_COL);
        if roll_cell.is_blank() {
            return None;
        }
        let roll = roll_cell.as_integer();
        let (student, outcome) = for_roll(roster, scope, roll, |student| {
            marksheet_outcome(conn, roster, scope, grid, row, student)
        });
        let item = BulkItem {
            locator: Locator::Row(row),
            roll,
            student,
            month: None,
            outcome: outcome.map_err(ItemFailure::from),
        };
        log_failure(&item);
        Some(item)
    })
}
