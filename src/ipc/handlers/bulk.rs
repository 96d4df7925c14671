use crate::bulk;
use crate::error::Result;
use crate::ipc::helpers::{format_plan, grid, scope, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster::SqliteRoster;
use rusqlite::Connection;
use serde_json::Value;

fn bulk_working_days(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let sheet = grid(params)?;
    let formats = format_plan(params)?;
    Ok(bulk::ingest_working_days(conn, &scope, &sheet, &formats)?.to_json())
}

fn bulk_attendance(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let sheet = grid(params)?;
    let formats = format_plan(params)?;
    let roster = SqliteRoster::new(conn);
    Ok(bulk::ingest_attendance(conn, &roster, &scope, &sheet, &formats)?.to_json())
}

fn bulk_marksheets(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let sheet = grid(params)?;
    let roster = SqliteRoster::new(conn);
    Ok(bulk::ingest_marksheets(conn, &roster, &scope, &sheet)?.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulk.workingDays" => Some(with_db(state, req, bulk_working_days)),
        "bulk.attendance" => Some(with_db(state, req, bulk_attendance)),
        "bulk.marksheets" => Some(with_db(state, req, bulk_marksheets)),
        _ => None,
    }
}
