use crate::error::{AttendanceError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// The (class, division) pair a class teacher is authorized to act on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub class: String,
    pub division: String,
}

impl Scope {
    pub fn new(class: &str, division: &str) -> Result<Scope> {
        let class = class.trim();
        let division = division.trim();
        if class.is_empty() || division.is_empty() {
            return Err(AttendanceError::InvalidInput(
                "scope needs both class and division".to_string(),
            ));
        }
        Ok(Scope {
            class: class.to_string(),
            division: division.to_string(),
        })
    }

    pub fn contains(&self, student: &Student) -> bool {
        student.class == self.class && student.division == self.division
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub roll: i64,
    pub class: String,
    pub division: String,
}

/// Read-only view of the student directory. Class linkage is by value, so a
/// student who changes class is looked up under the new pair from then on.
pub trait Roster {
    fn student(&self, id: &str) -> Result<Option<Student>>;
    fn student_by_roll(&self, roll: i64, scope: &Scope) -> Result<Option<Student>>;
}

pub struct SqliteRoster<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRoster<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        full_name: r.get(1)?,
        roll: r.get(2)?,
        class: r.get(3)?,
        division: r.get(4)?,
    })
}

impl Roster for SqliteRoster<'_> {
    fn student(&self, id: &str) -> Result<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, full_name, roll, class, division FROM students WHERE id = ?",
                [id],
                student_from_row,
            )
            .optional()?)
    }

    fn student_by_roll(&self, roll: i64, scope: &Scope) -> Result<Option<Student>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, full_name, roll, class, division
                 FROM students
                 WHERE roll = ? AND class = ? AND division = ?",
                (roll, &scope.class, &scope.division),
                student_from_row,
            )
            .optional()?)
    }
}

pub fn create_student(conn: &Connection, full_name: &str, roll: i64, scope: &Scope) -> Result<Student> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(AttendanceError::InvalidInput(
            "fullName must not be empty".to_string(),
        ));
    }
    if roll <= 0 {
        return Err(AttendanceError::InvalidInput(
            "roll must be a positive integer".to_string(),
        ));
    }
    if SqliteRoster::new(conn).student_by_roll(roll, scope)?.is_some() {
        return Err(AttendanceError::InvalidInput(format!(
            "roll {} already used in {}/{}",
            roll, scope.class, scope.division
        )));
    }
    let student = Student {
        id: Uuid::new_v4().to_string(),
        full_name: full_name.to_string(),
        roll,
        class: scope.class.clone(),
        division: scope.division.clone(),
    };
    insert_student(conn, &student)?;
    Ok(student)
}

/// A roll taken by a concurrent create surfaces here as a UNIQUE violation.
fn insert_student(conn: &Connection, student: &Student) -> Result<()> {
    let inserted = conn.execute(
        "INSERT INTO students(id, full_name, roll, class, division, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.full_name,
            student.roll,
            &student.class,
            &student.division,
            crate::db::now_stamp(),
        ),
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(e) if crate::db::is_constraint_violation(&e) => {
            Err(AttendanceError::InvalidInput(format!(
                "roll {} already used in {}/{}",
                student.roll, student.class, student.division
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn list_students(conn: &Connection, scope: &Scope) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, roll, class, division
         FROM students
         WHERE class = ? AND division = ?
         ORDER BY roll",
    )?;
    let rows = stmt
        .query_map((&scope.class, &scope.division), student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// In-memory directory for tests that exercise the roster seam directly.
#[cfg(test)]
pub struct MemoryRoster(pub Vec<Student>);

#[cfg(test)]
impl Roster for MemoryRoster {
    fn student(&self, id: &str) -> Result<Option<Student>> {
        Ok(self.0.iter().find(|s| s.id == id).cloned())
    }

    fn student_by_roll(&self, roll: i64, scope: &Scope) -> Result<Option<Student>> {
        Ok(self
            .0
            .iter()
            .find(|s| s.roll == roll && scope.contains(s))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn roll_lookup_is_scoped() {
        let conn = conn();
        let a = Scope::new("8", "A").expect("scope");
        let b = Scope::new("8", "B").expect("scope");
        let asha = create_student(&conn, "Asha Rao", 4, &a).expect("create");
        create_student(&conn, "Ben Ortiz", 4, &b).expect("same roll other division");

        let roster = SqliteRoster::new(&conn);
        let hit = roster.student_by_roll(4, &a).expect("query").expect("found");
        assert_eq!(hit, asha);
        assert!(roster
            .student_by_roll(4, &Scope::new("9", "A").expect("scope"))
            .expect("query")
            .is_none());
    }

    #[test]
    fn duplicate_roll_in_scope_is_rejected() {
        let conn = conn();
        let a = Scope::new("8", "A").expect("scope");
        create_student(&conn, "Asha Rao", 4, &a).expect("create");
        let err = create_student(&conn, "Other", 4, &a).expect_err("duplicate");
        assert_eq!(err.code(), "bad_params");
    }

    #[test]
    fn racing_insert_on_taken_roll_is_invalid_input() {
        let conn = conn();
        let scope = Scope::new("8", "A").expect("scope");
        let first = create_student(&conn, "Asha Rao", 7, &scope).expect("first");
        // Same roll written past the lookup, as a concurrent create would.
        let twin = Student {
            id: Uuid::new_v4().to_string(),
            full_name: "Ben Ortiz".to_string(),
            ..first
        };
        let err = insert_student(&conn, &twin).expect_err("unique roll");
        assert_eq!(err.code(), "bad_params");
        assert_eq!(list_students(&conn, &scope).expect("list").len(), 1);
    }

    #[test]
    fn list_is_ordered_by_roll() {
        let conn = conn();
        let a = Scope::new(" 8 ", "A").expect("scope");
        create_student(&conn, "C", 3, &a).expect("create");
        create_student(&conn, "A", 1, &a).expect("create");
        create_student(&conn, "B", 2, &a).expect("create");
        let rolls: Vec<i64> = list_students(&conn, &a)
            .expect("list")
            .iter()
            .map(|s| s.roll)
            .collect();
        assert_eq!(rolls, vec![1, 2, 3]);
    }

    #[test]
    fn blank_scope_is_invalid() {
        assert!(Scope::new("8", "  ").is_err());
    }
}
