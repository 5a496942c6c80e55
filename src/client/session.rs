use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Key under which the bearer token is persisted.
pub const TOKEN_KEY: &str = "token";

/// Durable key-value storage for client state.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// JSON object on disk; survives process restarts. Writes go to a sibling
/// `.tmp` file which is then renamed over the target.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    async fn save(&self, map: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .context("create token store dir")?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(map)?)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace {}", self.path.display()))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut map = self.load().await?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    map: std::sync::Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map
            .lock()
            .map_err(|_| anyhow::anyhow!("token store lock poisoned"))
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Which screen the application should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Auth,
    Main,
}

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    view: View,
}

/// The client's single copy of the bearer token, mirrored into a `TokenStore`.
pub struct SessionHolder {
    store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
}

impl SessionHolder {
    /// Loads any persisted token so a restart resumes the previous session.
    pub async fn restore(store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let token = store.get(TOKEN_KEY).await?;
        let view = if token.is_some() { View::Main } else { View::Auth };
        debug!(?view, "session restored");
        Ok(Self {
            store,
            state: Mutex::new(SessionState { token, view }),
        })
    }

    pub async fn token(&self) -> Option<String> {
        self.state.lock().await.token.clone()
    }

    pub async fn view(&self) -> View {
        self.state.lock().await.view
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.token.is_some()
    }

    /// Persists a freshly issued token and switches to the main view.
    pub async fn establish(&self, token: String) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.store.set(TOKEN_KEY, &token).await?;
        state.token = Some(token);
        state.view = View::Main;
        info!("session established");
        Ok(())
    }

    /// Drops the token everywhere and returns to the auth view. Memory is
    /// reset even when the store fails; the store error is still returned.
    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.reset(&mut state).await
    }

    /// Clears only while `sent` is still the held token. Returns whether the
    /// session was cleared.
    pub async fn clear_if(&self, sent: &str) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        if state.token.as_deref() != Some(sent) {
            debug!("token replaced since it was sent, keeping session");
            return Ok(false);
        }
        self.reset(&mut state).await?;
        Ok(true)
    }

    async fn reset(&self, state: &mut SessionState) -> anyhow::Result<()> {
        let removed = self.store.remove(TOKEN_KEY).await;
        state.token = None;
        state.view = View::Auth;
        removed.context("remove persisted token")?;
        info!("session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StuckStore {
        token: String,
    }

    #[async_trait]
    impl TokenStore for StuckStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(self.token.clone()))
        }

        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn remove(&self, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only storage")
        }
    }

    #[tokio::test]
    async fn empty_store_starts_at_auth_view() {
        let session = SessionHolder::restore(Arc::new(MemoryTokenStore::new()))
            .await
            .unwrap();
        assert_eq!(session.view().await, View::Auth);
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn establish_persists_and_clear_removes() {
        let store = Arc::new(MemoryTokenStore::new());
        let session = SessionHolder::restore(store.clone()).await.unwrap();

        session.establish("tok".into()).await.unwrap();
        assert_eq!(session.view().await, View::Main);
        assert_eq!(store.get(TOKEN_KEY).await.unwrap().as_deref(), Some("tok"));

        session.clear().await.unwrap();
        assert_eq!(session.view().await, View::Auth);
        assert!(store.get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_if_only_drops_the_matching_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let session = SessionHolder::restore(store.clone()).await.unwrap();
        session.establish("new".into()).await.unwrap();

        assert!(!session.clear_if("old").await.unwrap());
        assert_eq!(session.token().await.as_deref(), Some("new"));
        assert_eq!(session.view().await, View::Main);
        assert_eq!(store.get(TOKEN_KEY).await.unwrap().as_deref(), Some("new"));

        assert!(session.clear_if("new").await.unwrap());
        assert!(session.token().await.is_none());
        assert!(store.get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_store_removal_still_logs_out_in_memory() {
        let session = SessionHolder::restore(Arc::new(StuckStore { token: "t".into() }))
            .await
            .unwrap();
        assert_eq!(session.view().await, View::Main);

        assert!(session.clear().await.is_err());
        assert!(session.token().await.is_none());
        assert_eq!(session.view().await, View::Auth);
    }

    #[tokio::test]
    async fn file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        let first = SessionHolder::restore(Arc::new(FileTokenStore::new(&path)))
            .await
            .unwrap();
        first.establish("persisted".into()).await.unwrap();
        drop(first);

        let reloaded = SessionHolder::restore(Arc::new(FileTokenStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(reloaded.token().await.as_deref(), Some("persisted"));
        assert_eq!(reloaded.view().await, View::Main);

        reloaded.clear().await.unwrap();
        let after = SessionHolder::restore(Arc::new(FileTokenStore::new(&path)))
            .await
            .unwrap();
        assert!(after.token().await.is_none());
    }

    #[tokio::test]
    async fn file_store_keeps_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("kv.json"));
        store.set("theme", "dark").await.unwrap();
        store.set(TOKEN_KEY, "t").await.unwrap();
        store.remove(TOKEN_KEY).await.unwrap();
        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("dark"));
        assert!(store.get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn torn_temp_file_does_not_affect_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileTokenStore::new(&path);
        store.set(TOKEN_KEY, "kept").await.unwrap();
        assert!(!store.tmp_path().exists());

        // An interrupted write leaves only the temp file behind.
        std::fs::write(store.tmp_path(), b"{\"token\": \"hal").unwrap();

        let session = SessionHolder::restore(Arc::new(FileTokenStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(session.token().await.as_deref(), Some("kept"));

        store.set(TOKEN_KEY, "next").await.unwrap();
        assert_eq!(store.get(TOKEN_KEY).await.unwrap().as_deref(), Some("next"));
    }
}
