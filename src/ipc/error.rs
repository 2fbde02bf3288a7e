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

/// Success envelope that steers the shell to another page. Denied access and
/// post-action navigation both come back this way, never as error envelopes;
/// the shell shows the notice (if any) and follows the target.
pub fn redirect(id: &str, target: &str, notice: Option<&str>) -> serde_json::Value {
    let mut result = json!({ "redirect": target });
    if let Some(n) = notice {
        result["notice"] = json!(n);
    }
    ok(id, result)
}
