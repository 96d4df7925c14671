use thiserror::Error;

/// Errors produced by the attendance stores and the bulk pipeline.
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// A required field is missing or malformed, or a bulk grid yielded nothing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No working calendar exists for the requested scope and month.
    #[error("no working days configured for {class}/{division} {month}")]
    NotConfigured {
        class: String,
        division: String,
        month: String,
    },

    /// A student, roll or record lookup missed.
    #[error("{0} not found")]
    NotFound(String),

    /// The stored state cannot produce a meaningful result.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The student is outside the acting class-teacher scope.
    #[error("student {student_id} is not in {class}/{division}")]
    Forbidden {
        student_id: String,
        class: String,
        division: String,
    },

    /// A versioned write lost a compare-and-swap.
    #[error("concurrent update detected on {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to encode stored value: {0}")]
    Json(#[from] serde_json::Error),
}

impl AttendanceError {
    /// Stable wire code reported in IPC error objects and bulk items.
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::InvalidInput(_) => "bad_params",
            AttendanceError::NotConfigured { .. } => "not_configured",
            AttendanceError::NotFound(_) => "not_found",
            AttendanceError::InvalidState(_) => "invalid_state",
            AttendanceError::Forbidden { .. } => "forbidden",
            AttendanceError::Conflict(_) => "conflict",
            AttendanceError::Db(_) => "db_query_failed",
            AttendanceError::Json(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
