use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Message, PvError};

/// Fixed key the credential lives under inside the session file. A missing
/// file or key means unauthenticated.
pub const TOKEN_KEY: &str = "auth_token";

/// Durable key-value store holding the credential, shared between all
/// running instances through the filesystem.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current credential, `None` when the file or the key is absent or the
    /// file does not parse. A broken store reads as logged out.
    pub fn load(&self) -> Option<String> {
        let text = fs::read_to_string(&self.path).ok()?;
        let value: Value = serde_json::from_str(&text).ok()?;
        value.get(TOKEN_KEY)?.as_str().map(str::to_string)
    }

    /// Persist a credential. Written to a sibling temp file first and
    /// renamed over, so watchers never observe a half-written store.
    pub fn save(&self, token: &str) -> Result<(), PvError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut map = serde_json::Map::new();
        map.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        let body = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| PvError::Store(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted credential to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), PvError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(String),
}

impl SessionState {
    fn from_value(value: Option<String>) -> Self {
        match value {
            Some(token) => SessionState::Authenticated(token),
            None => SessionState::Unauthenticated,
        }
    }
}

/// The process-wide session. State is read from the backing store once at
/// startup and afterwards only changes through [`Session::login`],
/// [`Session::logout`] or an external change notification. No network calls
/// happen here.
pub struct Session {
    store: TokenStore,
    state: SessionState,
}

impl Session {
    pub fn init(store: TokenStore) -> Self {
        let state = SessionState::from_value(store.load());
        info!(
            "Session initialized from {} ({})",
            store.path().display(),
            match state {
                SessionState::Authenticated(_) => "authenticated",
                SessionState::Unauthenticated => "unauthenticated",
            }
        );
        Session { store, state }
    }

    /// Persist first, then transition. A failed write leaves the previous
    /// state untouched.
    pub fn login(&mut self, token: String) -> Result<(), PvError> {
        self.store.save(&token)?;
        self.state = SessionState::Authenticated(token);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), PvError> {
        self.store.clear()?;
        self.state = SessionState::Unauthenticated;
        Ok(())
    }

    /// Reconcile a cross-instance change notification into local state.
    /// This is how a login or logout in a sibling instance propagates here
    /// without a local user action. Never writes the store (the writer
    /// already did), so the last writer wins.
    pub fn apply_change(&mut self, value: Option<String>) {
        let next = SessionState::from_value(value);
        if next != self.state {
            info!(
                "Session changed externally ({})",
                match next {
                    SessionState::Authenticated(_) => "authenticated",
                    SessionState::Unauthenticated => "unauthenticated",
                }
            );
        }
        self.state = next;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn token(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated(token) => Some(token),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Watch the session file and post a [`Message::SessionChanged`] with the
/// store's current value whenever another instance touches it. The returned
/// watcher must stay alive for the duration of the program.
pub fn watch_store(store: &TokenStore, tx: Sender<Message>) -> Result<RecommendedWatcher, PvError> {
    let file_name = store.path().file_name().map(|n| n.to_os_string());
    let reader = store.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let ours = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if ours && tx.send(Message::SessionChanged(reader.load())).is_err() {
                debug!("Session change observed after shutdown");
            }
        }
        Err(e) => warn!("Session watcher error: {e}"),
    })?;

    // Watch the directory, not the file: logout removes the file and a
    // watch on the path itself would die with it.
    let dir = match store.path().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // On a fresh install the data directory does not exist yet.
    fs::create_dir_all(dir)?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("Watching session store at {}", store.path().display());
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("session.json"));
        assert_eq!(store.load(), None);

        store.save("tok1").unwrap();
        assert_eq!(store.load(), Some("tok1".to_string()));

        store.save("tok2").unwrap();
        assert_eq!(store.load(), Some("tok2".to_string()));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing an already empty store is fine.
        store.clear().unwrap();
    }

    #[test]
    fn init_reads_the_store_once() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("session.json"));
        store.save("tok1").unwrap();

        let session = Session::init(store);
        assert_eq!(session.token(), Some("tok1"));
    }

    #[test]
    fn login_persists_and_logout_clears() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = Session::init(TokenStore::new(&path));
        assert!(!session.is_authenticated());

        session.login("tok1".to_string()).unwrap();
        assert_eq!(session.token(), Some("tok1"));
        // A sibling instance reading the same store sees the credential.
        assert_eq!(TokenStore::new(&path).load(), Some("tok1".to_string()));

        session.logout().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(TokenStore::new(&path).load(), None);
    }

    #[test]
    fn watching_a_not_yet_existing_directory_succeeds() {
        let dir = tempdir().unwrap();
        // First run: nothing below the temp dir exists yet.
        let store = TokenStore::new(dir.path().join("pv").join("session.json"));
        let (tx, _rx) = std::sync::mpsc::channel();

        let _watcher = watch_store(&store, tx).unwrap();
        assert!(store.path().parent().unwrap().exists());
    }

    #[test]
    fn change_notification_authenticates_a_sibling() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("session.json"));
        // Instance Y starts unauthenticated.
        let mut session = Session::init(store.clone());
        assert_eq!(*session.state(), SessionState::Unauthenticated);

        // Instance X logged in; the notification carries the new value.
        session.apply_change(Some("tok1".to_string()));
        assert_eq!(
            *session.state(),
            SessionState::Authenticated("tok1".to_string())
        );

        // Reconciling never writes the store.
        assert_eq!(store.load(), None);

        // A logout elsewhere propagates the same way.
        session.apply_change(None);
        assert_eq!(*session.state(), SessionState::Unauthenticated);
    }
}
