use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;

use crate::device::flow::{DeviceLogin, SignOutReport, UserInfoOutcome};
use crate::device::poller::{PollObserver, PollProgress};
use crate::device::session::DeviceAuthorizationSession;
use crate::error::{GrantflowError, PollingError};
use crate::types::{TokenSet, UserInfo};

pub fn stdout_is_tty() -> bool {
    std::io::stdout().is_terminal()
}

pub fn stderr_is_tty() -> bool {
    std::io::stderr().is_terminal()
}

fn label(text: &str, is_tty: bool) -> String {
    if is_tty {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

pub fn print_error(err: &GrantflowError, json_mode: bool) {
    if json_mode {
        print_json(&err.to_json());
    } else if stderr_is_tty() {
        eprintln!("{}: {}", "Error".red().bold(), err);
    } else {
        eprintln!("Error: {err}");
    }
}

/// Lines telling the user where to approve the device.
pub fn device_prompt(session: &DeviceAuthorizationSession, is_tty: bool) -> Vec<String> {
    let code = if is_tty {
        session.user_code.bold().yellow().to_string()
    } else {
        session.user_code.clone()
    };
    vec![
        format!("{}: {}", label("Visit", is_tty), session.verification_uri),
        format!("{}: {}", label("Enter code", is_tty), code),
        format!(
            "{}: {}",
            label("Or open", is_tty),
            session.verification_uri_complete
        ),
    ]
}

pub fn user_info_lines(info: &UserInfo, is_tty: bool) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", label("Subject", is_tty), info.sub)];
    if let Some(ref name) = info.name {
        lines.push(format!("{}: {}", label("Name", is_tty), name));
    }
    if let Some(ref username) = info.preferred_username {
        lines.push(format!("{}: {}", label("Username", is_tty), username));
    }
    if let Some(ref email) = info.email {
        lines.push(format!("{}: {}", label("Email", is_tty), email));
    }
    lines
}

/// Summary of a token set. Token values themselves are never printed here.
pub fn token_summary(tokens: &TokenSet, is_tty: bool) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", label("Token type", is_tty), tokens.token_type)];
    if let Some(expires_in) = tokens.expires_in {
        lines.push(format!("{}: {}s", label("Expires in", is_tty), expires_in));
    }
    let scopes = tokens.scopes();
    if !scopes.is_empty() {
        lines.push(format!("{}: {}", label("Scopes", is_tty), scopes.join(" ")));
    }
    let refresh = if tokens.refresh_token.is_some() { "yes" } else { "no" };
    lines.push(format!("{}: {}", label("Refresh token", is_tty), refresh));
    lines
}

pub fn print_login(login: &DeviceLogin, json_mode: bool) {
    if json_mode {
        let user_info = match login.user_info {
            UserInfoOutcome::Loaded(ref info) => serde_json::to_value(info).unwrap_or_default(),
            UserInfoOutcome::Unavailable(_) => serde_json::Value::Null,
        };
        print_json(&serde_json::json!({
            "tokens": login.tokens,
            "userInfo": user_info,
        }));
        return;
    }

    let is_tty = stdout_is_tty();
    match login.user_info {
        UserInfoOutcome::Loaded(ref info) => {
            let who = info.display_name();
            if is_tty {
                println!("{} Signed in as {}", "✓".green(), who.bold());
            } else {
                println!("Signed in as {who}");
            }
            for line in user_info_lines(info, is_tty) {
                println!("  {line}");
            }
        }
        UserInfoOutcome::Unavailable(ref reason) => {
            println!("Signed in (user info unavailable: {reason})");
        }
    }
    for line in token_summary(&login.tokens, is_tty) {
        println!("  {line}");
    }
}

pub fn print_sign_out(report: &SignOutReport) {
    for hint in &report.revoked {
        println!("Revoked {}", hint.as_str());
    }
    for (hint, err) in &report.failures {
        eprintln!("Could not revoke {}: {err}", hint.as_str());
    }
    println!("Signed out");
}

/// Reports poll progress on stderr so stdout stays clean for results.
pub struct ConsoleObserver {
    is_tty: bool,
    open_browser: bool,
}

impl ConsoleObserver {
    pub fn new(open_browser: bool) -> Self {
        Self {
            is_tty: stderr_is_tty(),
            open_browser,
        }
    }
}

impl PollObserver for ConsoleObserver {
    fn on_started(&mut self, session: &DeviceAuthorizationSession) {
        for line in device_prompt(session, self.is_tty) {
            eprintln!("{line}");
        }
        if self.open_browser {
            if let Err(e) = webbrowser::open(&session.verification_uri_complete) {
                tracing::warn!("could not open browser: {e}");
            }
        }
    }

    fn on_progress(&mut self, progress: &PollProgress) {
        if self.is_tty {
            eprintln!("{}", progress.message.dimmed());
        } else {
            eprintln!("{}", progress.message);
        }
    }

    fn on_error(&mut self, error: &PollingError) {
        tracing::debug!(code = error.provider_code(), "poll ended with error");
    }
}
