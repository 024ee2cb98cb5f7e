//! Session state shared by the client runtime and the authorization gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
pub mod cookies;
pub mod permissions;

pub use principal::CallerIdentity;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, SharedSessionStore};
pub use permissions::{
    menu_for_role, MenuItem, RoutePermission, RoutePermissionTable, ADMIN_MENU, DEFAULT_ROUTE_PERMISSIONS,
    ROLE_ADMIN, ROLE_PROJECT_MANAGER,
};
