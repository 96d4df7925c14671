use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .env_remove("ATTENDANCED_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

fn open(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

#[test]
fn working_day_columns_then_attendance_columns() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open(&mut stdin, &mut reader, workspace.path());

    let scope = json!({ "class": 8, "division": "A" });
    let roster = [
        (json!({ "class": 8, "division": "A" }), "Asha Rao", 1),
        (json!({ "class": 8, "division": "B" }), "Ben Ortiz", 2),
        (json!({ "class": 8, "division": "A" }), "Chen Li", 3),
    ];
    for (i, (s, name, roll)) in roster.iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("st{i}"),
            "students.create",
            json!({ "scope": s, "fullName": name, "roll": roll }),
        );
    }

    let wd = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bulk.workingDays",
        json!({
            "scope": scope,
            "grid": [
                ["", "", ""],
                ["March 2025", "April 2025", "May 2025"],
                ["workingdays", "WorkingDays", "ignored"],
                ["2025-03-03", 45748, "2025-05-01"],
                ["2025-03-04", null, null]
            ],
            "dateFormat": ["iso", "serial", "auto"]
        }),
    );
    assert_eq!(wd["attempted"], 2);
    assert_eq!(wd["succeeded"], 2);
    assert_eq!(wd["partial"], false);
    assert_eq!(wd["items"][0]["month"], "March 2025");
    assert_eq!(wd["items"][0]["totalWorkingDays"], 2);
    assert_eq!(wd["items"][1]["column"], 1);

    let april = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.getWorkingDays",
        json!({ "scope": scope, "month": "April 2025" }),
    );
    assert_eq!(april["workingDays"], json!(["2025-04-01"]));

    let at = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bulk.attendance",
        json!({
            "scope": scope,
            "grid": [
                ["", "", ""],
                [1, 2, "3"],
                ["month", "month", "month"],
                ["March 2025", "March 2025", "March 2025"],
                ["presentdates", "presentdates", "presentdates"],
                ["2025-03-03", "2025-03-03", "03-03-2025"],
                ["2025-03-04", null, null]
            ]
        }),
    );
    let items = at["items"].as_array().expect("items");
    assert_eq!(items.len(), 3);
    assert_eq!(at["partial"], true);
    assert_eq!(at["failed"], 1);

    assert_eq!(items[0]["ok"], true);
    assert_eq!(items[0]["studentName"], "Asha Rao");
    assert_eq!(items[0]["presentPercent"].as_f64(), Some(100.0));

    // Roll 2 exists, but only in division B.
    assert_eq!(items[1]["ok"], false);
    assert_eq!(items[1]["roll"], 2);
    assert_eq!(items[1]["code"], "not_found");

    assert_eq!(items[2]["ok"], true);
    assert_eq!(items[2]["studentName"], "Chen Li");
    assert_eq!(items[2]["absentDays"], 1);
    assert_eq!(items[2]["presentPercent"].as_f64(), Some(50.0));

    let chen = items[2]["studentId"].as_str().expect("id").to_string();
    let entry = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.get",
        json!({ "scope": scope, "studentId": chen, "month": "March 2025" }),
    );
    assert_eq!(entry["absentDates"], json!(["2025-03-04"]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unconfigured_month_fails_per_column_and_empty_sheet_fails_call() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open(&mut stdin, &mut reader, workspace.path());

    let scope = json!({ "class": "8", "division": "A" });
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "scope": scope, "fullName": "Asha Rao", "roll": 1 }),
    );

    let at = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "bulk.attendance",
        json!({
            "scope": scope,
            "grid": [
                [""],
                [1],
                ["month"],
                ["June 2025"],
                ["presentdates"],
                ["2025-06-02"]
            ]
        }),
    );
    assert_eq!(at["succeeded"], 0);
    assert_eq!(at["partial"], false);
    assert_eq!(at["items"][0]["code"], "not_configured");

    let empty = request(
        &mut stdin,
        &mut reader,
        "3",
        "bulk.workingDays",
        json!({ "scope": scope, "grid": [["only a header"]] }),
    );
    assert_eq!(error_code(&empty), "bad_params");

    let missing_grid = request(
        &mut stdin,
        &mut reader,
        "4",
        "bulk.attendance",
        json!({ "scope": scope }),
    );
    assert_eq!(error_code(&missing_grid), "bad_params");

    drop(stdin);
    let _ = child.wait();
}
