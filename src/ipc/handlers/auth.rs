use crate::auth::{self, Role};
use crate::ipc::error::{err, ok, redirect};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn username_taken(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM people WHERE username = ?", [username], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM people WHERE email = ?", [email], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let username = match req.params.get("username").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing username", None),
    };
    if username.is_empty() {
        return err(&req.id, "bad_params", "username must not be empty", None);
    }
    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing email", None),
    };
    if email.is_empty() {
        return err(&req.id, "bad_params", "email must not be empty", None);
    }
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing password", None),
    };
    let position = match req.params.get("position").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing position", None),
    };
    let Some(role) = Role::parse(&position) else {
        return err(
            &req.id,
            "bad_params",
            "position must be student or instructor",
            Some(json!({ "position": position })),
        );
    };

    match username_taken(conn, &username) {
        Ok(true) => {
            return err(
                &req.id,
                "duplicate_username",
                "username already exists, choose a different one",
                None,
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match email_taken(conn, &email) {
        Ok(true) => {
            return err(
                &req.id,
                "duplicate_email",
                "email already exists, use a different address",
                None,
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let password_hash = match auth::hash_password(&password) {
        Ok(h) => h,
        Err(e) => return err(&req.id, "hash_failed", e.to_string(), None),
    };

    if let Err(e) = conn.execute(
        "INSERT INTO people(username, email, password_hash, position) VALUES(?, ?, ?, ?)",
        (&username, &email, &password_hash, role.as_str()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "people" })),
        );
    }

    log::debug!("registered {} as {}", username, role.as_str());
    ok(
        &req.id,
        json!({
            "username": username,
            "position": role.as_str(),
            "redirect": "login",
            "notice": "registration successful, please log in"
        }),
    )
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    // A caller that still holds a live session is bounced straight home,
    // matching the original already-logged-in shortcut.
    if let Some(token) = req.params.get("sessionToken").and_then(|v| v.as_str()) {
        if state.sessions.validate(token).is_some() {
            return ok(
                &req.id,
                json!({
                    "alreadyAuthenticated": true,
                    "redirect": "home",
                    "notice": "you are already logged in"
                }),
            );
        }
    }

    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let username = match req.params.get("username").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing username", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing password", None),
    };

    let stored: Option<(String, String)> = match conn
        .query_row(
            "SELECT password_hash, position FROM people WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Unknown username, wrong password, and an unreadable stored row all
    // collapse into the same generic failure.
    let role = stored.and_then(|(hash, position)| {
        if auth::verify_password(&hash, &password) {
            Role::parse(&position)
        } else {
            None
        }
    });
    let Some(role) = role else {
        log::debug!("login rejected for {}", username);
        return err(
            &req.id,
            "invalid_credentials",
            "please check your login details and try again",
            None,
        );
    };

    let token = state.sessions.issue(&username, role);
    log::debug!("login ok user={}", username);
    ok(
        &req.id,
        json!({
            "sessionToken": token,
            "username": username,
            "position": role.as_str(),
            "redirect": "home"
        }),
    )
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Idempotent: logging out a missing or expired token is still a success.
    if let Some(token) = req.params.get("sessionToken").and_then(|v| v.as_str()) {
        state.sessions.logout(token);
    }
    redirect(&req.id, "login", None)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
