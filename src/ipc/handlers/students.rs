use crate::error::Result;
use crate::ipc::helpers::{required_i64, required_str, scope, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_create(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let full_name = required_str(params, "fullName")?;
    let roll = required_i64(params, "roll")?;
    let student = roster::create_student(conn, &full_name, roll, &scope)?;
    Ok(json!({ "student": serde_json::to_value(&student)? }))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value> {
    let scope = scope(params)?;
    let students = roster::list_students(conn, &scope)?;
    Ok(json!({ "students": serde_json::to_value(&students)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, students_create)),
        "students.list" => Some(with_db(state, req, students_list)),
        _ => None,
    }
}
