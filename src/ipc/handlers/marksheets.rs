use crate::error::{AttendanceError, Result};
use crate::ipc::helpers::{required_str, scope, with_db};
use crate::ipc::types::{AppState, Request};
use crate::marksheet::{self, MarksheetInput};
use crate::roster::SqliteRoster;
use rusqlite::Connection;
use serde_json::{json, Value};

fn marksheets_assign(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let student_id = required_str(params, "studentId")?;
    let input: MarksheetInput = serde_json::from_value(params.clone())
        .map_err(|e| AttendanceError::InvalidInput(e.to_string()))?;
    let roster = SqliteRoster::new(conn);
    let (student, sheet) = marksheet::assign_marksheet(conn, &roster, &student_id, &scope, input)?;
    Ok(json!({
        "studentName": student.full_name,
        "marksheet": sheet.to_json(),
        "version": sheet.version,
    }))
}

fn marksheets_get(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let student_id = required_str(params, "studentId")?;
    let roster = SqliteRoster::new(conn);
    let sheets = marksheet::get_marksheets(conn, &roster, &student_id, &scope)?;
    Ok(json!({
        "studentId": student_id,
        "marksheets": sheets.iter().map(|s| s.to_json()).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marksheets.assign" => Some(with_db(state, req, marksheets_assign)),
        "marksheets.get" => Some(with_db(state, req, marksheets_get)),
        _ => None,
    }
}
