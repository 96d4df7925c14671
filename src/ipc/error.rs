use crate::error::AttendanceError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error response for a store failure. Keyed failures carry their key in `details`.
pub fn domain_err(id: &str, e: &AttendanceError) -> serde_json::Value {
    let details = match e {
        AttendanceError::NotConfigured {
            class,
            division,
            month,
        } => Some(json!({ "class": class, "division": division, "month": month })),
        AttendanceError::Forbidden {
            student_id,
            class,
            division,
        } => Some(json!({ "studentId": student_id, "class": class, "division": division })),
        _ => None,
    };
    if matches!(e, AttendanceError::Db(_) | AttendanceError::Json(_)) {
        tracing::error!(error = %e, "request failed");
    }
    err(id, e.code(), e.to_string(), details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_carries_scope_details() {
        let resp = domain_err(
            "7",
            &AttendanceError::Forbidden {
                student_id: "s1".to_string(),
                class: "8".to_string(),
                division: "A".to_string(),
            },
        );
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"]["code"], "forbidden");
        assert_eq!(resp["error"]["details"]["studentId"], "s1");
    }

    #[test]
    fn plain_errors_have_no_details() {
        let resp = domain_err("1", &AttendanceError::NotFound("student x".to_string()));
        assert_eq!(resp["error"]["code"], "not_found");
        assert!(resp["error"].get("details").is_none());
    }
}
