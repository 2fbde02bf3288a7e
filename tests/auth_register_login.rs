use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coursehubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coursehubd");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(envelope: &serde_json::Value) -> &str {
    assert_eq!(
        envelope.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error envelope, got {}",
        envelope
    );
    envelope
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error.code")
}

fn result_of(envelope: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        envelope.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok envelope, got {}",
        envelope
    );
    envelope.get("result").expect("result")
}

#[test]
fn register_login_logout_lifecycle() {
    let workspace = temp_dir("coursehub-auth");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let reg = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({
            "username": "alice",
            "email": "alice@x.com",
            "password": "pw123",
            "position": "student"
        }),
    );
    assert_eq!(
        result_of(&reg).get("redirect").and_then(|v| v.as_str()),
        Some("login")
    );

    // Same username, different email.
    let dup_user = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        json!({
            "username": "alice",
            "email": "alice2@x.com",
            "password": "other",
            "position": "student"
        }),
    );
    assert_eq!(error_code(&dup_user), "duplicate_username");

    // Same email, different username.
    let dup_email = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.register",
        json!({
            "username": "bob",
            "email": "alice@x.com",
            "password": "pw456",
            "position": "instructor"
        }),
    );
    assert_eq!(error_code(&dup_email), "duplicate_email");

    // The rejected registration must not have created bob.
    let bob_login = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "username": "bob", "password": "pw456" }),
    );
    assert_eq!(error_code(&bob_login), "invalid_credentials");

    let bad_role = request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.register",
        json!({
            "username": "eve",
            "email": "eve@x.com",
            "password": "pw",
            "position": "admin"
        }),
    );
    assert_eq!(error_code(&bad_role), "bad_params");

    // Wrong password and unknown username are indistinguishable.
    let wrong_pw = request(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "username": "alice", "password": "pw124" }),
    );
    let unknown_user = request(
        &mut stdin,
        &mut reader,
        "8",
        "auth.login",
        json!({ "username": "ghost", "password": "pw123" }),
    );
    assert_eq!(error_code(&wrong_pw), "invalid_credentials");
    assert_eq!(wrong_pw.get("error"), unknown_user.get("error"));

    let login = request(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "username": "alice", "password": "pw123" }),
    );
    let result = result_of(&login);
    let token = result
        .get("sessionToken")
        .and_then(|v| v.as_str())
        .expect("sessionToken")
        .to_string();
    assert_eq!(result.get("username").and_then(|v| v.as_str()), Some("alice"));
    assert_eq!(
        result.get("position").and_then(|v| v.as_str()),
        Some("student")
    );
    assert_eq!(result.get("redirect").and_then(|v| v.as_str()), Some("home"));

    // A live session short-circuits a repeated login.
    let again = request(
        &mut stdin,
        &mut reader,
        "10",
        "auth.login",
        json!({ "sessionToken": token, "username": "alice", "password": "pw123" }),
    );
    assert_eq!(
        result_of(&again)
            .get("alreadyAuthenticated")
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let logout = request(
        &mut stdin,
        &mut reader,
        "11",
        "auth.logout",
        json!({ "sessionToken": token }),
    );
    assert_eq!(
        result_of(&logout).get("redirect").and_then(|v| v.as_str()),
        Some("login")
    );

    // The invalidated token no longer authenticates anything.
    let after = request(
        &mut stdin,
        &mut reader,
        "12",
        "marks.mine",
        json!({ "sessionToken": token }),
    );
    assert_eq!(
        result_of(&after).get("redirect").and_then(|v| v.as_str()),
        Some("login")
    );

    // Logging out twice stays a success.
    let relogout = request(
        &mut stdin,
        &mut reader,
        "13",
        "auth.logout",
        json!({ "sessionToken": token }),
    );
    assert_eq!(
        result_of(&relogout)
            .get("redirect")
            .and_then(|v| v.as_str()),
        Some("login")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
