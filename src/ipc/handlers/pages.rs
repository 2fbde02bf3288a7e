use crate::auth::Role;
use crate::ipc::error::{err, ok};
use crate::ipc::guard;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Display title and role gate for each navigable page. Everything is behind
/// login; only the dashboards additionally require a role.
fn page_title(page: &str) -> Option<(&'static str, Option<Role>)> {
    match page {
        "home" => Some(("Home", None)),
        "announcements" => Some(("Announcements", None)),
        "faq" => Some(("FAQ", None)),
        "lectures" => Some(("Lectures", None)),
        "tutorials" => Some(("Tutorials", None)),
        "calendar" => Some(("Calendar", None)),
        "assignments" => Some(("Assignments", None)),
        "courseteam" => Some(("Course Team", None)),
        "student-dashboard" => Some(("Student Dashboard", Some(Role::Student))),
        "instructor-dashboard" => Some(("Instructor Dashboard", Some(Role::Instructor))),
        _ => None,
    }
}

fn handle_pages_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let page = match req.params.get("page").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing page", None),
    };

    let Some((title, required)) = page_title(&page) else {
        return err(
            &req.id,
            "not_found",
            format!("unknown page: {}", page),
            None,
        );
    };

    match guard::require(state, req, required) {
        Ok(_user) => ok(&req.id, json!({ "pagename": title })),
        Err(deny) => deny.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "pages.open" => Some(handle_pages_open(state, req)),
        _ => None,
    }
}
