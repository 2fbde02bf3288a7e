use crate::auth::Role;
use crate::ipc::error::redirect;
use crate::ipc::types::{AppState, Request};

pub struct CurrentUser {
    pub username: String,
    pub role: Role,
}

pub enum Deny {
    Unauthenticated,
    Forbidden,
}

impl Deny {
    /// Denials render as redirects: no session sends the caller to the login
    /// page, a wrong role silently back to home. Neither is an error envelope.
    pub fn response(self, id: &str) -> serde_json::Value {
        match self {
            Deny::Unauthenticated => redirect(id, "login", None),
            Deny::Forbidden => redirect(id, "home", None),
        }
    }
}

/// Authorization check invoked at the top of every gated handler. Reads
/// `params.sessionToken`, validates it against the store (expired entries are
/// pruned on touch), then checks the required role if one is given.
pub fn require(
    state: &mut AppState,
    req: &Request,
    role: Option<Role>,
) -> Result<CurrentUser, Deny> {
    let token = req
        .params
        .get("sessionToken")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let Some(session) = state.sessions.validate(token) else {
        return Err(Deny::Unauthenticated);
    };
    if let Some(required) = role {
        if session.role != required {
            return Err(Deny::Forbidden);
        }
    }
    Ok(CurrentUser {
        username: session.username,
        role: session.role,
    })
}
