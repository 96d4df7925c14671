use crate::bulk::FormatPlan;
use crate::cell::{Cell, Grid};
use crate::dates::{self, DateFormat};
use crate::error::{AttendanceError, Result};
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster::Scope;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeSet;

/// Run `f` against the open workspace and wrap its outcome as a response.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => domain_err(&req.id, &e),
    }
}

fn bad(message: String) -> AttendanceError {
    AttendanceError::InvalidInput(message)
}

pub fn required_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| bad(format!("missing {key}")))
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64> {
    let v = params.get(key).ok_or_else(|| bad(format!("missing {key}")))?;
    if let Some(n) = v.as_i64() {
        return Ok(n);
    }
    v.as_str()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| bad(format!("{key} must be an integer")))
}

/// Class labels arrive as either numbers or strings. `8`, `8.0` and `"8"`
/// name the same class; fractional numbers are rejected.
fn label(v: Option<&Value>, key: &str) -> Result<String> {
    match v {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(i.to_string());
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => Ok(format!("{}", f as i64)),
                _ => Err(bad(format!("scope.{key} must be a whole number, got {n}"))),
            }
        }
        _ => Err(bad(format!("missing scope.{key}"))),
    }
}

/// `params.scope = { class, division }`, or `class`/`division` at the top
/// level of `params`.
pub fn scope(params: &Value) -> Result<Scope> {
    let raw = params
        .get("scope")
        .filter(|v| v.is_object())
        .unwrap_or(params);
    Scope::new(
        &label(raw.get("class"), "class")?,
        &label(raw.get("division"), "division")?,
    )
}

fn parse_format(v: &Value) -> Result<DateFormat> {
    match v {
        Value::Null => Ok(DateFormat::Auto),
        Value::String(s) => {
            DateFormat::parse(s).ok_or_else(|| bad(format!("unknown dateFormat: {s}")))
        }
        other => Err(bad(format!("dateFormat must be a string, got {other}"))),
    }
}

/// Optional `params.dateFormat`; absent means auto-detect.
pub fn date_format(params: &Value) -> Result<DateFormat> {
    parse_format(params.get("dateFormat").unwrap_or(&Value::Null))
}

/// `params.dateFormat` for a grid: one string for every column, or an array
/// indexed by column.
pub fn format_plan(params: &Value) -> Result<FormatPlan> {
    match params.get("dateFormat") {
        Some(Value::Array(items)) => Ok(FormatPlan::per_column(
            items.iter().map(parse_format).collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(FormatPlan::uniform(parse_format(other.unwrap_or(&Value::Null))?)),
    }
}

/// A required array of raw cells.
pub fn cells(params: &Value, key: &str) -> Result<Vec<Cell>> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().map(Cell::from_json).collect())
        .ok_or_else(|| bad(format!("missing {key} (array)")))
}

pub fn grid(params: &Value) -> Result<Grid> {
    params
        .get("grid")
        .and_then(Grid::from_json)
        .ok_or_else(|| bad("missing grid (array of rows)".to_string()))
}

pub fn day_keys(days: &BTreeSet<NaiveDate>) -> Vec<String> {
    days.iter().map(dates::date_key).collect()
}
