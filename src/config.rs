//! Runtime configuration read from the environment.
//!
//! Everything has a default so a bare `worklocus` starts against a local
//! backend. Binaries may override individual values from command-line flags.

use std::env;
use std::time::Duration;

use crate::identity::{RoutePermissionTable, DEFAULT_ROUTE_PERMISSIONS};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// The unauthenticated entry route (the sign-in page).
pub const ENTRY_ROUTE: &str = "/";
/// Where an already signed-in caller is sent from the entry route.
pub const LANDING_ROUTE: &str = "/admin";

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh-token";
pub const WHOAMI_PATH: &str = "/api/auth/me";

pub fn parse_bool_env(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Backend endpoint configuration shared by the client and the gate.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_URL.to_string(), timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS) }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("WORKLOCUS_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let secs = parse_env::<u64>("WORKLOCUS_REQUEST_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self { base_url, timeout: Duration::from_secs(secs) }
    }
}

/// Routing policy applied by the gate. Static for the life of the process.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub entry_route: String,
    pub landing_route: String,
    /// Path prefixes the gate intercepts (besides the entry route).
    pub protected_prefixes: Vec<String>,
    pub permissions: RoutePermissionTable,
    pub secure_cookies: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            entry_route: ENTRY_ROUTE.to_string(),
            landing_route: LANDING_ROUTE.to_string(),
            protected_prefixes: vec![LANDING_ROUTE.to_string()],
            permissions: DEFAULT_ROUTE_PERMISSIONS.clone(),
            secure_cookies: false,
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Self {
        Self { secure_cookies: parse_bool_env("WORKLOCUS_SECURE_COOKIES").unwrap_or(false), ..Self::default() }
    }
}

/// Everything the gateway server needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub frontend_url: Option<String>,
    pub api: ApiConfig,
    pub gate: GateConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            http_port: parse_env::<u16>("WORKLOCUS_HTTP_PORT").unwrap_or(DEFAULT_HTTP_PORT),
            frontend_url: env::var("WORKLOCUS_FRONTEND_URL").ok().filter(|s| !s.trim().is_empty()),
            api: ApiConfig::from_env(),
            gate: GateConfig::from_env(),
        }
    }
}
