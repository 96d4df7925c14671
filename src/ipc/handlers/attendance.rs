use crate::error::{AttendanceError, Result};
use crate::ipc::helpers::{cells, date_format, required_str, scope, with_db};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::reconcile::PercentBasis;
use crate::roster::SqliteRoster;
use rusqlite::Connection;
use serde_json::{json, Value};

fn attendance_record(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let student_id = required_str(params, "studentId")?;
    let month = required_str(params, "month")?;
    let raw = cells(params, "presentDates")?;
    let format = date_format(params)?;
    let roster = SqliteRoster::new(conn);
    let (record, normalized) = ledger::record_presence_from_cells(
        conn,
        &roster,
        &student_id,
        &scope,
        &month,
        &raw,
        format,
    )?;
    Ok(json!({
        "studentId": record.student.id,
        "studentName": record.student.full_name,
        "entry": record.entry.to_json(),
        "totalWorkingDays": record.total_working_days,
        "droppedCells": normalized.dropped.len(),
        "version": record.version,
    }))
}

fn attendance_get(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let student_id = required_str(params, "studentId")?;
    let month = required_str(params, "month")?;
    let roster = SqliteRoster::new(conn);
    let entry = ledger::get_attendance(conn, &roster, &student_id, &scope, &month)?;
    Ok(entry.to_json())
}

fn attendance_report(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let student_id = required_str(params, "studentId")?;
    let roster = SqliteRoster::new(conn);
    let months = ledger::attendance_report(conn, &roster, &student_id, &scope)?;
    Ok(json!({
        "studentId": student_id,
        "months": months.iter().map(|m| m.to_json()).collect::<Vec<_>>(),
    }))
}

fn settings_get(conn: &Connection, _params: &Value) -> Result<Value> {
    let basis = ledger::percent_basis(conn)?;
    Ok(json!({ "percentBasis": basis.as_str() }))
}

fn settings_set(conn: &Connection, params: &Value) -> Result<Value> {
    let raw = required_str(params, "percentBasis")?;
    let basis = PercentBasis::parse(&raw)
        .ok_or_else(|| AttendanceError::InvalidInput(format!("unknown percentBasis: {raw}")))?;
    ledger::set_percent_basis(conn, basis)?;
    Ok(json!({ "percentBasis": basis.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(with_db(state, req, attendance_record)),
        "attendance.get" => Some(with_db(state, req, attendance_get)),
        "attendance.report" => Some(with_db(state, req, attendance_report)),
        "attendance.settings.get" => Some(with_db(state, req, settings_get)),
        "attendance.settings.set" => Some(with_db(state, req, settings_set)),
        _ => None,
    }
}
