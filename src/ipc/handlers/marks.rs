use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::guard;
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing or non-integer {}", key),
            details: None,
        })
}

fn mark_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let regrade_requested: i64 = row.get(5)?;
    Ok(json!({
        "markId": row.get::<_, i64>(0)?,
        "studentUsername": row.get::<_, String>(1)?,
        "assignment": row.get::<_, String>(2)?,
        "grade": row.get::<_, i64>(3)?,
        "datePosted": row.get::<_, String>(4)?,
        "regradeRequested": regrade_requested != 0,
        "regradeReason": row.get::<_, Option<String>>(6)?,
    }))
}

fn marks_for_student(conn: &Connection, username: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT mark_id, student_username, assignment, grade, date_posted,
                    regrade_requested, regrade_reason
             FROM marks
             WHERE student_username = ?
             ORDER BY mark_id",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([username], mark_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "marks": rows }))
}

fn marks_all(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT mark_id, student_username, assignment, grade, date_posted,
                    regrade_requested, regrade_reason
             FROM marks
             ORDER BY mark_id",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([], mark_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "marks": rows }))
}

fn marks_pending_regrade(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT mark_id, student_username, assignment, grade, date_posted,
                    regrade_requested, regrade_reason
             FROM marks
             WHERE regrade_requested = 1
             ORDER BY mark_id",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([], mark_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "marks": rows }))
}

fn student_roster(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT username FROM people WHERE position = 'student' ORDER BY username")
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "students": rows }))
}

fn student_exists(conn: &Connection, username: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM people WHERE username = ? AND position = 'student'",
        [username],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn record_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student = get_required_str(params, "studentUsername")?;
    let assignment = get_required_str(params, "assignment")?;
    let grade = get_required_i64(params, "grade")?;

    if !student_exists(conn, &student)? {
        return Err(HandlerErr {
            code: "unknown_student",
            message: "no student with that username".to_string(),
            details: Some(json!({ "studentUsername": student })),
        });
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT mark_id FROM marks WHERE student_username = ? AND assignment = ?",
            (&student, &assignment),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    // Re-grading overwrites the grade and resolves any pending regrade
    // request; there is no separate deny path. date_posted keeps the
    // creation timestamp on overwrite.
    let date_posted = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO marks(student_username, assignment, grade, date_posted,
                           regrade_requested, regrade_reason)
         VALUES(?, ?, ?, ?, 0, NULL)
         ON CONFLICT(student_username, assignment) DO UPDATE SET
           grade = excluded.grade,
           regrade_requested = 0,
           regrade_reason = NULL",
        (&student, &assignment, grade, &date_posted),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "marks" })),
    })?;

    let mark_id: i64 = match existing {
        Some(id) => id,
        None => conn
            .query_row(
                "SELECT mark_id FROM marks WHERE student_username = ? AND assignment = ?",
                (&student, &assignment),
                |r| r.get(0),
            )
            .map_err(|e| HandlerErr {
                code: "db_query_failed",
                message: e.to_string(),
                details: None,
            })?,
    };

    let notice = if existing.is_some() {
        "the student has been regraded"
    } else {
        "mark recorded for student"
    };
    Ok(json!({ "markId": mark_id, "notice": notice }))
}

fn request_regrade(
    conn: &Connection,
    student: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mark_id = get_required_i64(params, "markId")?;
    let reason = get_required_str(params, "regradeReason")?;

    // Ownership comes from the session identity, never from a parameter.
    // A mark belonging to another student reads as missing.
    let owner: Option<String> = conn
        .query_row(
            "SELECT student_username FROM marks WHERE mark_id = ?",
            [mark_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    match owner {
        Some(ref owner) if owner == student => {}
        _ => {
            return Err(HandlerErr {
                code: "not_found",
                message: "mark not found".to_string(),
                details: Some(json!({ "markId": mark_id })),
            })
        }
    }

    conn.execute(
        "UPDATE marks SET regrade_requested = 1, regrade_reason = ? WHERE mark_id = ?",
        (&reason, mark_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "marks" })),
    })?;

    Ok(json!({ "markId": mark_id, "regradeRequested": true }))
}

fn handle_marks_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = match guard::require(state, req, Some(Role::Student)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match marks_for_student(conn, &user.username) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_marks_request_regrade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = match guard::require(state, req, Some(Role::Student)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match request_regrade(conn, &user.username, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_input(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Instructor)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match record_mark(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Instructor)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match marks_all(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_regrade_requests(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Instructor)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match marks_pending_regrade(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Instructor)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match student_roster(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.mine" => Some(handle_marks_mine(state, req)),
        "marks.requestRegrade" => Some(handle_marks_request_regrade(state, req)),
        "grades.input" => Some(handle_grades_input(state, req)),
        "grades.all" => Some(handle_grades_all(state, req)),
        "grades.regradeRequests" => Some(handle_grades_regrade_requests(state, req)),
        "grades.students" => Some(handle_grades_students(state, req)),
        _ => None,
    }
}
