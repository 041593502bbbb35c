//! Session id → active database path.
//!
//! Browsers only ever hold an opaque session id; the filesystem path stays on
//! the server.

use dashmap::DashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Resolves a caller's session to the database file it is working on.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, session_id: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    db_path: PathBuf,
    expires_at: Instant,
}

/// In-memory session map with a fixed time-to-live per registration.
#[derive(Debug)]
pub struct SessionStore {
    entries: DashMap<String, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Only ids this store could have issued are accepted; they end up in file names.
    pub fn is_valid_id(session_id: &str) -> bool {
        Uuid::parse_str(session_id).is_ok()
    }

    /// Point `session_id` at `db_path`, resetting its expiry.
    pub fn register(&self, session_id: &str, db_path: PathBuf) {
        debug!(session_id, path = %db_path.display(), "registered session database");
        self.entries.insert(
            session_id.to_string(),
            SessionEntry {
                db_path,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every expired entry, returning the database paths they pointed at
    /// so the caller can remove the files.
    pub fn purge_expired(&self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.expires_at > now {
                true
            } else {
                expired.push(entry.db_path.clone());
                false
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Expired entries stay in the map until `purge_expired` collects them, so the
// sweeper sees every path that needs deleting.
impl SessionResolver for SessionStore {
    fn resolve(&self, session_id: &str) -> Option<PathBuf> {
        let now = Instant::now();
        let entry = self.entries.get(session_id)?;
        if entry.expires_at > now {
            Some(entry.db_path.clone())
        } else {
            debug!(session_id, "session expired");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_sessions() {
        let store = SessionStore::new(Duration::from_secs(600));
        let id = SessionStore::new_session_id();
        assert!(store.resolve(&id).is_none());

        store.register(&id, PathBuf::from("/tmp/a.db"));
        assert_eq!(store.resolve(&id), Some(PathBuf::from("/tmp/a.db")));
        assert!(store.resolve("someone-else").is_none());
    }

    #[test]
    fn expired_sessions_are_purged_with_their_paths() {
        let store = SessionStore::new(Duration::ZERO);
        store.register("s1", PathBuf::from("/tmp/a.db"));
        assert!(store.resolve("s1").is_none());
        assert_eq!(store.len(), 1);

        store.register("s2", PathBuf::from("/tmp/b.db"));
        let mut purged = store.purge_expired();
        purged.sort();
        assert_eq!(
            purged,
            vec![PathBuf::from("/tmp/a.db"), PathBuf::from("/tmp/b.db")]
        );
        assert!(store.is_empty());
        assert!(store.purge_expired().is_empty());
    }

    #[test]
    fn re_registering_revives_an_expired_session() {
        let store = SessionStore::new(Duration::from_secs(600));
        store.entries.insert(
            "s1".to_string(),
            SessionEntry {
                db_path: PathBuf::from("/tmp/old.db"),
                expires_at: Instant::now(),
            },
        );
        assert!(store.resolve("s1").is_none());

        store.register("s1", PathBuf::from("/tmp/new.db"));
        assert_eq!(store.resolve("s1"), Some(PathBuf::from("/tmp/new.db")));
        assert!(store.purge_expired().is_empty());
    }

    #[test]
    fn session_ids_are_unique_uuids() {
        let id = SessionStore::new_session_id();
        assert_ne!(id, SessionStore::new_session_id());
        assert!(SessionStore::is_valid_id(&id));
        assert!(!SessionStore::is_valid_id("../../etc/passwd"));
        assert!(!SessionStore::is_valid_id(""));
    }
}
