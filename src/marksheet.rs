use crate::db;
use crate::error::{AttendanceError, Result};
use crate::ledger::authorize;
use crate::reconcile::round_2;
use crate::roster::{Roster, Scope, Student};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject: String,
    pub marks: f64,
    pub total_marks: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksheetInput {
    pub exam_type: String,
    pub subjects: Vec<SubjectMark>,
    #[serde(default)]
    pub overall_remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marksheet {
    pub id: String,
    pub student_id: String,
    pub exam_type: String,
    pub subjects: Vec<SubjectMark>,
    pub obtained_marks: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub overall_remarks: Option<String>,
    pub version: i64,
}

impl Marksheet {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "examType": self.exam_type,
            "subjects": self.subjects,
            "obtainedMarks": self.obtained_marks,
            "totalMarks": self.total_marks,
            "percentage": self.percentage,
            "overallRemarks": self.overall_remarks,
        })
    }
}

/// Obtained, possible and percentage (two decimals) over all subjects.
/// Marks above a subject's total (bonus marks) count as given.
pub fn totals(subjects: &[SubjectMark]) -> Result<(f64, f64, f64)> {
    if subjects.is_empty() {
        return Err(AttendanceError::InvalidInput(
            "marksheet needs at least one subject".to_string(),
        ));
    }
    for s in subjects {
        if s.subject.trim().is_empty() {
            return Err(AttendanceError::InvalidInput("subject name is blank".to_string()));
        }
        if !(s.marks.is_finite() && s.total_marks.is_finite()) || s.marks < 0.0 || s.total_marks < 0.0 {
            return Err(AttendanceError::InvalidInput(format!(
                "marks for {} must be non-negative numbers",
                s.subject
            )));
        }
    }
    let obtained: f64 = subjects.iter().map(|s| s.marks).sum();
    let possible: f64 = subjects.iter().map(|s| s.total_marks).sum();
    if possible == 0.0 {
        return Err(AttendanceError::InvalidState(
            "total possible marks is zero".to_string(),
        ));
    }
    Ok((obtained, possible, round_2(100.0 * obtained / possible)))
}

/// Create or replace the marksheet for (student, exam type).
pub fn assign_marksheet(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
    input: MarksheetInput,
) -> Result<(Student, Marksheet)> {
    let exam_type = input.exam_type.trim().to_string();
    if exam_type.is_empty() {
        return Err(AttendanceError::InvalidInput("examType must not be empty".to_string()));
    }
    let student = authorize(roster, scope, student_id)?;
    let (obtained, possible, percentage) = totals(&input.subjects)?;
    let subjects_json = serde_json::to_string(&input.subjects)?;
    let remarks = input
        .overall_remarks
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let tx = db::begin_write(conn)?;
    let existing: Option<(String, i64)> = tx
        .query_row(
            "SELECT id, version FROM marksheets WHERE student_id = ? AND exam_type = ?",
            (&student.id, &exam_type),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let (id, version) = match existing {
        Some((id, expected)) => {
            let changed = tx.execute(
                "UPDATE marksheets
                 SET subjects = ?, total_marks = ?, obtained_marks = ?, percentage = ?,
                     overall_remarks = ?, version = version + 1, updated_at = ?
                 WHERE id = ? AND version = ?",
                (
                    &subjects_json,
                    possible,
                    obtained,
                    percentage,
                    &remarks,
                    db::now_stamp(),
                    &id,
                    expected,
                ),
            )?;
            if changed == 0 {
                return Err(AttendanceError::Conflict(format!("marksheet {id}")));
            }
            (id, expected + 1)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO marksheets(id, student_id, exam_type, subjects, total_marks,
                    obtained_marks, percentage, overall_remarks, version, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
                (
                    &id,
                    &student.id,
                    &exam_type,
                    &subjects_json,
                    possible,
                    obtained,
                    percentage,
                    &remarks,
                    db::now_stamp(),
                ),
            )?;
            (id, 1)
        }
    };
    tx.commit()?;

    let sheet = Marksheet {
        id,
        student_id: student.id.clone(),
        exam_type,
        subjects: input.subjects,
        obtained_marks: obtained,
        total_marks: possible,
        percentage,
        overall_remarks: remarks,
        version,
    };
    Ok((student, sheet))
}

pub fn get_marksheets(
    conn: &Connection,
    roster: &dyn Roster,
    student_id: &str,
    scope: &Scope,
) -> Result<Vec<Marksheet>> {
    let student = authorize(roster, scope, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, exam_type, subjects, obtained_marks, total_marks, percentage,
                overall_remarks, version
         FROM marksheets WHERE student_id = ? ORDER BY exam_type",
    )?;
    let rows = stmt
        .query_map([&student.id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, f64>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, i64>(7)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|(id, exam_type, subjects, obtained, total, percentage, remarks, version)| -> Result<Marksheet> {
            Ok(Marksheet {
                id,
                student_id: student.id.clone(),
                exam_type,
                subjects: serde_json::from_str(&subjects)?,
                obtained_marks: obtained,
                total_marks: total,
                percentage,
                overall_remarks: remarks,
                version,
            })
        })
        .collect()
}
