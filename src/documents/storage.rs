use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
}

/// Object storage for uploaded documents. Keys are `<prefix>/<name>`.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, prefix: &str, name: &str, body: Bytes) -> anyhow::Result<()>;
    async fn get_object(&self, prefix: &str, name: &str) -> anyhow::Result<Option<Bytes>>;
    /// Returns false when the object did not exist.
    async fn delete_object(&self, prefix: &str, name: &str) -> anyhow::Result<bool>;
    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>>;
}

/// Filesystem-backed storage rooted at the upload directory.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn object_path(&self, prefix: &str, name: &str) -> anyhow::Result<PathBuf> {
        if !is_safe_component(prefix) || !is_safe_component(name) {
            anyhow::bail!("unsafe object key {prefix:?}/{name:?}");
        }
        Ok(self.root.join(prefix).join(name))
    }
}

/// A single path segment with no separators or parent references.
pub fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(['/', '\\', '\0'])
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, prefix: &str, name: &str, body: Bytes) -> anyhow::Result<()> {
        let path = self.object_path(prefix, name)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.context("create object dir")?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), bytes = body.len(), "object stored");
        Ok(())
    }

    async fn get_object(&self, prefix: &str, name: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.object_path(prefix, name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn delete_object(&self, prefix: &str, name: &str) -> anyhow::Result<bool> {
        let path = self.object_path(prefix, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    async fn list_objects(&self, prefix: &str) -> anyhow::Result<Vec<ObjectInfo>> {
        if !is_safe_component(prefix) {
            anyhow::bail!("unsafe prefix {prefix:?}");
        }
        let dir = self.root.join(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("list {}", dir.display())),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            out.push(ObjectInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
