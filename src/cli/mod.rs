//! Command-line console over the authenticated client.
//!
//! Each invocation loads the session file, runs one command and leaves the
//! (possibly renewed or cleared) session behind for the next invocation.

pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::{Method, Url};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::client::{navigate, navigation_client, ApiRequest, AuthenticatedClient, LogoutEvent, LogoutReason, Transport};
use crate::config::DEFAULT_HTTP_PORT;
use crate::error::{AppError, AppResult};
use crate::identity::cookies::SessionChange;
use crate::identity::{menu_for_role, RoutePermissionTable, SharedSessionStore, ADMIN_MENU};

pub const DEFAULT_SESSION_FILE: &str = ".worklocus/session.json";

/// Value following `name` in `args`, e.g. `--api http://...`.
pub fn parse_flag(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

pub fn parse_port_arg(args: &[String], name: &str) -> Option<u16> {
    parse_flag(args, name).and_then(|v| v.parse::<u16>().ok())
}

pub fn session_file_path() -> PathBuf {
    std::env::var("WORKLOCUS_SESSION_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE))
}

pub fn default_gate_url() -> String {
    std::env::var("WORKLOCUS_GATE_URL").unwrap_or_else(|_| format!("http://localhost:{}", DEFAULT_HTTP_PORT))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { email: String, password: String },
    Whoami,
    Logout,
    Menu,
    Call { method: Method, path: String, body: Option<Value> },
    Open { path: String },
}

impl Command {
    /// Parse positional words, e.g. `["get", "/api/projects"]`.
    pub fn parse(words: &[String]) -> AppResult<Command> {
        let Some(verb) = words.first() else {
            return Err(AppError::user("missing_command", "no command given"));
        };
        let arg = |i: usize, what: &str| -> AppResult<String> {
            words
                .get(i)
                .cloned()
                .ok_or_else(|| AppError::UserInput { code: "missing_argument".into(), message: format!("{} requires {}", verb, what) })
        };
        let body = |i: usize| -> AppResult<Option<Value>> {
            match words.get(i) {
                Some(text) => serde_json::from_str(text).map(Some).map_err(|e| AppError::UserInput {
                    code: "invalid_body".into(),
                    message: format!("body is not valid JSON: {}", e),
                }),
                None => Ok(None),
            }
        };
        let cmd = match verb.to_lowercase().as_str() {
            "login" => Command::Login { email: arg(1, "<email>")?, password: arg(2, "<password>")? },
            "whoami" => Command::Whoami,
            "logout" => Command::Logout,
            "menu" => Command::Menu,
            "get" => Command::Call { method: Method::GET, path: arg(1, "<path>")?, body: None },
            "delete" => Command::Call { method: Method::DELETE, path: arg(1, "<path>")?, body: None },
            "post" => Command::Call { method: Method::POST, path: arg(1, "<path>")?, body: body(2)? },
            "patch" => Command::Call { method: Method::PATCH, path: arg(1, "<path>")?, body: body(2)? },
            "open" => Command::Open { path: arg(1, "<path>")? },
            other => {
                return Err(AppError::UserInput { code: "unknown_command".into(), message: format!("unknown command '{}'", other) })
            }
        };
        Ok(cmd)
    }
}

pub struct Console<T: Transport> {
    client: AuthenticatedClient<T>,
    permissions: RoutePermissionTable,
    gate_url: Url,
    logout: broadcast::Receiver<LogoutEvent>,
}

impl<T: Transport> Console<T> {
    pub fn new(transport: Arc<T>, store: SharedSessionStore, permissions: RoutePermissionTable, gate_url: Url) -> Self {
        let client = AuthenticatedClient::new(transport, store);
        let logout = client.subscribe_logout();
        Self { client, permissions, gate_url, logout }
    }

    pub fn client(&self) -> &AuthenticatedClient<T> { &self.client }

    pub async fn run(&self, cmd: Command) -> AppResult<Value> {
        match cmd {
            Command::Login { email, password } => {
                let who = self.client.sign_in(&email, &password, &self.permissions).await?;
                Ok(serde_json::to_value(who)?)
            }
            Command::Whoami => Ok(serde_json::to_value(self.client.current_user().await?)?),
            Command::Logout => {
                self.client.logout();
                Ok(json!({"status": "ok"}))
            }
            Command::Menu => {
                let who = self.client.current_user().await?;
                let items: Vec<Value> = menu_for_role(&self.permissions, ADMIN_MENU, &who.role)
                    .into_iter()
                    .map(|m| json!({"href": m.href, "label": m.label}))
                    .collect();
                Ok(Value::Array(items))
            }
            Command::Call { method, path, body } => {
                let mut req = ApiRequest::new(method, path);
                if let Some(b) = body {
                    req = req.with_body(b);
                }
                Ok(self.client.execute(req).await?.body)
            }
            Command::Open { path } => {
                let http = navigation_client()?;
                let nav = navigate(&http, &self.gate_url, &path, self.client.store().as_ref()).await?;
                let session = match nav.change {
                    Some(SessionChange::Replaced(_)) => "renewed",
                    Some(SessionChange::Cleared) => "cleared",
                    None => "unchanged",
                };
                Ok(json!({"status": nav.status, "location": nav.location, "session": session}))
            }
        }
    }

    /// Logout events published since the last call.
    pub fn take_logout(&mut self) -> Option<LogoutReason> {
        let mut last = None;
        while let Ok(ev) = self.logout.try_recv() {
            last = Some(ev.reason);
        }
        last
    }
}
