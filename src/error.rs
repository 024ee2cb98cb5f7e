//! Unified application error model and mapping helpers.
//! One error enum is shared by the session store, the authenticated client,
//! the authorization gate and the HTTP frontends, so every layer classifies
//! failures the same way.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    /// The login call was rejected: wrong email or password.
    CredentialInvalid { code: String, message: String },
    /// Any non-login call rejected with 401. Recoverable through renewal.
    Unauthorized { code: String, message: String },
    /// Renewal failed or no renewal credential exists. The session is gone.
    SessionExpired { code: String, message: String },
    /// Valid session whose role may not enter the requested route.
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    /// Backend answered with a non-auth failure (validation, server error...).
    Remote { code: String, message: String, status: u16 },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::CredentialInvalid { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::SessionExpired { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Remote { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::CredentialInvalid { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::SessionExpired { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Remote { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn credential_invalid<S: Into<String>>(code: S, msg: S) -> Self { AppError::CredentialInvalid { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn session_expired<S: Into<String>>(code: S, msg: S) -> Self { AppError::SessionExpired { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn remote<S: Into<String>>(status: u16, code: S, msg: S) -> Self { AppError::Remote { code: code.into(), message: msg.into(), status } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// The terminal error handed to every request caught in a failed renewal.
    pub fn expired() -> Self {
        Self::session_expired("session_expired", "Your session has expired. Please sign in again.")
    }

    /// True for the failures that mean "this access credential is not accepted".
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, AppError::Unauthorized { .. })
    }

    /// True when the session can no longer be used and the user must sign in again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppError::SessionExpired { .. })
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::CredentialInvalid { .. } => 401,
            AppError::Unauthorized { .. } => 401,
            AppError::SessionExpired { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Remote { status, .. } => *status,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::io("timeout", "The connection timed out, please try again.");
        }
        if err.is_decode() {
            return AppError::Internal { code: "decode_error".into(), message: err.to_string() };
        }
        AppError::Io { code: "transport_error".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "decode_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::credential_invalid("bad_login", "no").http_status(), 401);
        assert_eq!(AppError::unauthorized("unauthorized", "no").http_status(), 401);
        assert_eq!(AppError::expired().http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "blocked").http_status(), 403);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::remote(422, "http_422", "bad").http_status(), 422);
        assert_eq!(AppError::io("io", "io").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn only_unauthorized_triggers_renewal() {
        assert!(AppError::unauthorized("unauthorized", "x").is_authorization_failure());
        assert!(!AppError::credential_invalid("bad_login", "x").is_authorization_failure());
        assert!(!AppError::expired().is_authorization_failure());
        assert!(!AppError::remote(500, "http_500", "x").is_authorization_failure());
        assert!(AppError::expired().is_terminal());
    }

    #[test]
    fn serializes_tagged() {
        let v = serde_json::to_value(AppError::forbidden("forbidden", "nope")).unwrap();
        assert_eq!(v["type"], "forbidden");
        assert_eq!(v["code"], "forbidden");
        assert_eq!(v["message"], "nope");
    }
}
