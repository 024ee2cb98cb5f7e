//! Route permission table: which roles may enter which page prefix.
//!
//! Prefixes are compared per path segment, and the entry with the most
//! segments that matches governs. Entries are kept sorted deepest first so a
//! lookup is a single scan that stops at the first hit.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_PROJECT_MANAGER: &str = "project_manager";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePermission {
    pub prefix: String,
    segments: Vec<String>,
    pub allowed_roles: BTreeSet<String>,
}

impl RoutePermission {
    pub fn depth(&self) -> usize { self.segments.len() }

    pub fn allows(&self, role: &str) -> bool { self.allowed_roles.contains(role) }

    fn matches(&self, path_segments: &[&str]) -> bool {
        path_segments.len() >= self.segments.len()
            && self.segments.iter().zip(path_segments).all(|(a, b)| a.as_str() == *b)
    }
}

/// Split a request path into segments, ignoring query, fragment, empty and `.` parts.
pub fn path_segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty() && *s != ".").collect()
}

/// Canonical form of a request path: each segment decoded and re-encoded
/// uniformly, `.` and `..` resolved (also when percent-encoded), empty
/// segments dropped, query and fragment removed.
/// `..` above the root stays at the root. `None` for paths whose segments
/// decode to a separator or to invalid UTF-8, which no route may be judged on.
pub fn normalize_path(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    if path.contains('\\') {
        return None;
    }
    let mut out: Vec<String> = Vec::new();
    for seg in path.split('/') {
        let decoded = urlencoding::decode(seg).ok()?;
        if decoded.contains('/') || decoded.contains('\\') {
            return None;
        }
        match decoded.as_ref() {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            d => out.push(urlencoding::encode(d).into_owned()),
        }
    }
    Some(format!("/{}", out.join("/")))
}

#[derive(Debug, Clone, Default)]
pub struct RoutePermissionTable {
    entries: Vec<RoutePermission>,
}

impl RoutePermissionTable {
    pub fn new() -> Self { Self::default() }

    /// Add `prefix → roles`. Repeating a prefix widens its role set.
    pub fn with_route<I, R>(mut self, prefix: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let segments: Vec<String> = path_segments(prefix).into_iter().map(str::to_string).collect();
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.segments == segments) {
            existing.allowed_roles.extend(roles);
            return self;
        }
        let prefix = format!("/{}", segments.join("/"));
        self.entries.push(RoutePermission { prefix, segments, allowed_roles: roles });
        // Deepest first; ties keep insertion order (stable sort).
        self.entries.sort_by(|a, b| b.depth().cmp(&a.depth()));
        self
    }

    pub fn entries(&self) -> &[RoutePermission] { &self.entries }

    /// The most specific entry governing `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<&RoutePermission> {
        let segs = path_segments(path);
        self.entries.iter().find(|e| e.matches(&segs))
    }

    /// Unmatched paths are denied.
    pub fn is_allowed(&self, path: &str, role: &str) -> bool {
        self.lookup(path).map(|e| e.allows(role)).unwrap_or(false)
    }

    /// True when some entry covers `path`, i.e. the gate must run for it.
    pub fn covers(&self, path: &str) -> bool { self.lookup(path).is_some() }

    /// True when `role` may enter at least one configured route.
    pub fn grants_any(&self, role: &str) -> bool { self.entries.iter().any(|e| e.allows(role)) }
}

/// The admin console's table.
pub static DEFAULT_ROUTE_PERMISSIONS: Lazy<RoutePermissionTable> = Lazy::new(|| {
    RoutePermissionTable::new()
        .with_route("/admin", [ROLE_ADMIN])
        .with_route("/admin/timekeeping", [ROLE_ADMIN, ROLE_PROJECT_MANAGER])
        .with_route("/admin/project", [ROLE_ADMIN, ROLE_PROJECT_MANAGER])
        .with_route("/admin/task", [ROLE_ADMIN, ROLE_PROJECT_MANAGER])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub href: &'static str,
    pub label: &'static str,
}

pub const ADMIN_MENU: &[MenuItem] = &[
    MenuItem { href: "/admin", label: "Overview" },
    MenuItem { href: "/admin/timekeeping", label: "Timekeeping" },
    MenuItem { href: "/admin/project", label: "Projects" },
    MenuItem { href: "/admin/task", label: "Tasks" },
    MenuItem { href: "/admin/account", label: "Accounts" },
    MenuItem { href: "/admin/bonus", label: "Bonuses" },
    MenuItem { href: "/admin/payroll", label: "Payroll" },
    MenuItem { href: "/admin/payroll-history", label: "Payroll history" },
    MenuItem { href: "/admin/address", label: "Addresses" },
];

/// Menu entries a role may open, in menu order.
pub fn menu_for_role<'a>(table: &RoutePermissionTable, menu: &'a [MenuItem], role: &str) -> Vec<&'a MenuItem> {
    menu.iter().filter(|m| table.is_allowed(m.href, role)).collect()
}
