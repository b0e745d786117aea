use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use super::{ObjectStore, ObjectStoreError};

/// Filesystem-backed object store.
///
/// Writes land in a sibling temporary file and are renamed into place, so a
/// reader never observes a half-written object.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ObjectStoreError::InvalidKey(key.to_string()))?;
        let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let mut file = fs::File::create(&staging).await?;
        let written = async {
            file.write_all(&body).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(err) = written {
            let _ = fs::remove_file(&staging).await;
            return Err(ObjectStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(ObjectStoreError::Io(err));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().to_path_buf()).expect("store");

        assert!(store.get("kv/cache.json").await.expect("get").is_none());

        store
            .put("kv/cache.json", Bytes::from_static(b"{}"))
            .await
            .expect("put");
        let body = store.get("kv/cache.json").await.expect("get").expect("body");
        assert_eq!(body, Bytes::from_static(b"{}"));

        store
            .put("kv/cache.json", Bytes::from_static(b"{\"a\":1}"))
            .await
            .expect("overwrite");
        let body = store.get("kv/cache.json").await.expect("get").expect("body");
        assert_eq!(body, Bytes::from_static(b"{\"a\":1}"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("kv"))
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "staging files must be renamed away");
    }

    #[tokio::test]
    async fn delete_missing_object_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().to_path_buf()).expect("store");
        store.delete("kv/none.json").await.expect("delete");
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().to_path_buf()).expect("store");

        for key in ["../outside.json", "/etc/passwd", ""] {
            assert!(matches!(
                store.get(key).await,
                Err(ObjectStoreError::InvalidKey(_))
            ));
        }
    }
}
