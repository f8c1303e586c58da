//! HTML pages for the browser-driven login handshake
//!
//! Pages are small enough to render with `format!`; every dynamic value
//! goes through `html_escape` first.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::auth::{AuthPhase, AuthSnapshot};

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }
    input[type="text"], input[type="password"] { padding: 10px; font-size: 16px; width: 260px; }
    button { padding: 10px 20px; font-size: 16px; cursor: pointer; background: #0088cc; color: white; border: none; border-radius: 5px; }
    button:hover { background: #006699; }
    .info { background: #e7f3ff; padding: 15px; border-radius: 5px; margin: 20px 0; }
    .identity { font-weight: bold; color: #0088cc; }
    .success { color: green; }
    .error { color: red; }
"#;

fn layout(title: &str, refresh: Option<(u32, &str)>, body: &str) -> String {
    let refresh = refresh
        .map(|(seconds, url)| {
            format!(
                r#"<meta http-equiv="refresh" content="{}; url={}">"#,
                seconds,
                encode_double_quoted_attribute(url)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Ferry - {title}</title>
    {refresh}
    <style>{STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = encode_text(title),
        refresh = refresh,
        STYLE = STYLE,
        body = body,
    )
}

fn error_line(snapshot: &AuthSnapshot) -> String {
    snapshot
        .last_error
        .as_deref()
        .map(|e| format!(r#"<p class="error">{}</p>"#, encode_text(e)))
        .unwrap_or_default()
}

const RESEND_FORM: &str = r#"<form action="/auth/start" method="post">
    <button type="submit">Send a new code</button>
</form>"#;

/// Page for the current handshake phase
pub fn auth_page(snapshot: &AuthSnapshot, identity: &str) -> String {
    match snapshot.phase {
        AuthPhase::Authorized => layout(
            "Authorized",
            None,
            r#"<h1>Already Authorized</h1>
<p class="success">The platform session is authorized and ready.</p>
<p><a href="/health">Check health status</a></p>"#,
        ),

        AuthPhase::CodeSent => layout(
            "Verification Code",
            None,
            &format!(
                r#"<h1>Enter Verification Code</h1>
<div class="info">
    <p>A verification code has been sent to:</p>
    <p class="identity">{identity}</p>
</div>
{error}
<form action="/auth/code" method="post">
    <input type="text" name="code" placeholder="12345" required autofocus inputmode="numeric" autocomplete="one-time-code" />
    <br><br>
    <button type="submit">Verify</button>
</form>
<br>
{resend}"#,
                identity = encode_text(identity),
                error = error_line(snapshot),
                resend = RESEND_FORM,
            ),
        ),

        AuthPhase::PasswordRequired => layout(
            "Second Factor",
            None,
            &format!(
                r#"<h1>Enter Password</h1>
<div class="info">
    <p>This account has two-factor authentication enabled.</p>
    <p>Enter the account password, not the verification code.</p>
</div>
{error}
<form action="/auth/password" method="post">
    <input type="password" name="password" placeholder="Password" required autofocus />
    <br><br>
    <button type="submit">Submit</button>
</form>"#,
                error = error_line(snapshot),
            ),
        ),

        AuthPhase::Failed => layout(
            "Authorization Error",
            None,
            &format!(
                r#"<h1>Authorization Error</h1>
{error}
<p>Request a new code to start over.</p>
{resend}"#,
                error = error_line(snapshot),
                resend = RESEND_FORM,
            ),
        ),

        AuthPhase::Uninitialized => layout(
            "Initializing",
            Some((3, "/auth")),
            &format!(
                r#"<h1>Initializing...</h1>
<p>No login code has been requested yet.</p>
{error}
{resend}"#,
                error = error_line(snapshot),
                resend = RESEND_FORM,
            ),
        ),
    }
}

/// Short-lived page shown after a handshake step, redirecting onwards
pub fn outcome_page(phase: AuthPhase) -> String {
    match phase {
        AuthPhase::Authorized => layout(
            "Success",
            Some((2, "/health")),
            r#"<h1 class="success">Authorization Successful!</h1>
<p>Redirecting to health check...</p>"#,
        ),
        AuthPhase::PasswordRequired => layout(
            "Password Required",
            Some((2, "/auth")),
            r#"<h1>Password Required</h1>
<p>Redirecting to password page...</p>"#,
        ),
        _ => layout(
            "Code Sent",
            Some((2, "/auth")),
            r#"<h1>Code Sent</h1>
<p>Redirecting to the verification page...</p>"#,
        ),
    }
}

/// Page for a rejected handshake step
pub fn error_page(heading: &str, message: &str) -> String {
    layout(
        heading,
        Some((3, "/auth")),
        &format!(
            r#"<h1 class="error">{}</h1>
<p>{}</p>
<p>Redirecting back...</p>"#,
            encode_text(heading),
            encode_text(message)
        ),
    )
}
