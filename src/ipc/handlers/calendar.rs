use crate::calendar;
use crate::error::Result;
use crate::ipc::helpers::{cells, date_format, day_keys, required_str, scope, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn calendar_set_working_days(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let month = required_str(params, "month")?;
    let raw = cells(params, "dates")?;
    let format = date_format(params)?;
    let (cal, normalized) =
        calendar::set_working_days_from_cells(conn, &scope, &month, &raw, format)?;
    Ok(json!({
        "month": cal.month,
        "workingDays": day_keys(&cal.days),
        "totalWorkingDays": cal.days.len(),
        "droppedCells": normalized.dropped.len(),
        "version": cal.version,
    }))
}

fn calendar_get_working_days(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let month = required_str(params, "month")?;
    let cal = calendar::require_working_days(conn, &scope, &month)?;
    Ok(json!({
        "month": cal.month,
        "workingDays": day_keys(&cal.days),
        "totalWorkingDays": cal.days.len(),
        "version": cal.version,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.setWorkingDays" => Some(with_db(state, req, calendar_set_working_days)),
        "calendar.getWorkingDays" => Some(with_db(state, req, calendar_get_working_days)),
        _ => None,
    }
}
