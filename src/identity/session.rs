use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The access/renewal credential pair. Both present or no session at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "accessToken")]
    pub access_credential: String,
    #[serde(rename = "refreshToken")]
    pub renewal_credential: String,
}

impl Session {
    /// Build a session, refusing a pair where either credential is blank.
    pub fn new(access: impl Into<String>, renewal: impl Into<String>) -> Option<Self> {
        let access = access.into();
        let renewal = renewal.into();
        if access.trim().is_empty() || renewal.trim().is_empty() {
            return None;
        }
        Some(Self { access_credential: access, renewal_credential: renewal })
    }

    /// Same renewal credential, new access credential.
    pub fn renewed(&self, access: impl Into<String>) -> Self {
        Self { access_credential: access.into(), renewal_credential: self.renewal_credential.clone() }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_credential", &"<redacted>")
            .field("renewal_credential", &"<redacted>")
            .finish()
    }
}

/// Single owner of the current session. Implementations must make `write`
/// atomic: a concurrent `read` sees the old pair or the new pair, never a mix.
pub trait SessionStore: Send + Sync {
    fn read(&self) -> Option<Session>;
    fn write(&self, session: Session);
    fn clear(&self);
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

#[derive(Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_session(session: Session) -> Self {
        Self { slot: RwLock::new(Some(session)) }
    }
}

impl SessionStore for MemorySessionStore {
    fn read(&self) -> Option<Session> {
        self.slot.read().clone()
    }

    fn write(&self, session: Session) {
        *self.slot.write() = Some(session);
        debug!(target: "session", "session written");
    }

    fn clear(&self) {
        if self.slot.write().take().is_some() {
            debug!(target: "session", "session cleared");
        }
    }
}

/// Session persisted as a small JSON file, for runtimes that outlive a single
/// process (the CLI). Writes go to a sibling temp file and are renamed into
/// place so a reader never observes a torn pair.
pub struct FileSessionStore {
    path: PathBuf,
    cache: RwLock<Option<Session>>,
}

impl FileSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let cached = load_session_file(&path);
        Self { path, cache: RwLock::new(cached) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn persist(&self, session: &Session) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(session)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)
    }
}

fn load_session_file(path: &Path) -> Option<Session> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(target: "session", "cannot read session file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice::<Session>(&bytes) {
        // A file holding a blank credential is treated as no session.
        Ok(s) => Session::new(s.access_credential, s.renewal_credential),
        Err(e) => {
            warn!(target: "session", "ignoring malformed session file {}: {}", path.display(), e);
            None
        }
    }
}

impl SessionStore for FileSessionStore {
    fn read(&self) -> Option<Session> {
        self.cache.read().clone()
    }

    fn write(&self, session: Session) {
        let mut guard = self.cache.write();
        if let Err(e) = self.persist(&session) {
            warn!(target: "session", "failed to persist session to {}: {}", self.path.display(), e);
        }
        *guard = Some(session);
    }

    fn clear(&self) {
        let mut guard = self.cache.write();
        *guard = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(target: "session", "session file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "session", "failed to remove session file {}: {}", self.path.display(), e),
        }
    }
}
