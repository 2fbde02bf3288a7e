use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::guard;
use crate::ipc::types::{AppState, Request};
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

fn instructor_roster(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT username FROM people WHERE position = 'instructor' ORDER BY username")
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
    Ok(json!({ "instructors": rows }))
}

fn instructor_exists(conn: &Connection, username: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM people WHERE username = ? AND position = 'instructor'",
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

fn submit_feedback(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let instructor = get_required_str(params, "instructorUsername")?;
    let feedback1 = get_required_str(params, "feedback1")?;
    let feedback2 = get_required_str(params, "feedback2")?;
    let feedback3 = get_required_str(params, "feedback3")?;
    let feedback4 = get_required_str(params, "feedback4")?;

    if !instructor_exists(conn, &instructor)? {
        return Err(HandlerErr {
            code: "unknown_instructor",
            message: "no instructor with that username".to_string(),
            details: Some(json!({ "instructorUsername": instructor })),
        });
    }

    conn.execute(
        "INSERT INTO feedback(instructor_username, feedback1, feedback2, feedback3, feedback4)
         VALUES(?, ?, ?, ?, ?)",
        (&instructor, &feedback1, &feedback2, &feedback3, &feedback4),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "feedback" })),
    })?;
    let feedback_id = conn.last_insert_rowid();

    Ok(json!({
        "feedbackId": feedback_id,
        "notice": "feedback for instructor submitted"
    }))
}

fn feedback_for_instructor(conn: &Connection, instructor: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT feedback_id, instructor_username, feedback1, feedback2, feedback3, feedback4
             FROM feedback
             WHERE instructor_username = ?
             ORDER BY feedback_id",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([instructor], |r| {
            Ok(json!({
                "feedbackId": r.get::<_, i64>(0)?,
                "instructorUsername": r.get::<_, String>(1)?,
                "feedback1": r.get::<_, String>(2)?,
                "feedback2": r.get::<_, String>(3)?,
                "feedback3": r.get::<_, String>(4)?,
                "feedback4": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "feedback": rows }))
}

fn handle_feedback_instructors(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Student)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match instructor_roster(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_feedback_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _user = match guard::require(state, req, Some(Role::Student)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match submit_feedback(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_feedback_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    // The viewing instructor is the session identity; submissions addressed
    // to anyone else are never reachable through this call.
    let user = match guard::require(state, req, Some(Role::Instructor)) {
        Ok(u) => u,
        Err(deny) => return deny.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match feedback_for_instructor(conn, &user.username) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.instructors" => Some(handle_feedback_instructors(state, req)),
        "feedback.submit" => Some(handle_feedback_submit(state, req)),
        "feedback.view" => Some(handle_feedback_view(state, req)),
        _ => None,
    }
}
