use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WamiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl CachedBlob {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new("application/json", serde_json::to_vec(value)?))
    }
}

/// Keyed blob store holding staged share transfers.
pub trait TransferCache {
    fn match_entry(&mut self, key: &str) -> Result<Option<CachedBlob>>;
    fn put(&mut self, key: &str, blob: CachedBlob) -> Result<()>;
    /// Returns whether an entry was removed.
    fn delete(&mut self, key: &str) -> Result<bool>;
    fn keys(&mut self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    content_type: String,
    body: String,
}

/// Transfer cache persisted as one JSON object of base64 bodies.
///
/// Every call re-reads the file so a writer in another process (the share
/// receiver) is observed.
#[derive(Debug, Clone)]
pub struct FileTransferCache {
    path: PathBuf,
}

impl FileTransferCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<IndexMap<String, StoredEntry>> {
        if !self.path.exists() {
            return Ok(IndexMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|err| WamiError::transfer(format!("{}: {err}", self.path.display())))?;
        if raw.trim().is_empty() {
            return Ok(IndexMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|err| WamiError::transfer(format!("{}: {err}", self.path.display())))
    }

    fn store(&self, payload: &IndexMap<String, StoredEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(payload)?)?;
        Ok(())
    }
}

impl TransferCache for FileTransferCache {
    fn match_entry(&mut self, key: &str) -> Result<Option<CachedBlob>> {
        let payload = self.load()?;
        let Some(entry) = payload.get(key) else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(entry.body.as_bytes())
            .map_err(|err| WamiError::transfer(format!("entry '{key}': {err}")))?;
        Ok(Some(CachedBlob {
            content_type: entry.content_type.clone(),
            bytes,
        }))
    }

    fn put(&mut self, key: &str, blob: CachedBlob) -> Result<()> {
        let mut payload = self.load()?;
        payload.insert(
            key.to_string(),
            StoredEntry {
                content_type: blob.content_type,
                body: BASE64.encode(&blob.bytes),
            },
        );
        self.store(&payload)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let mut payload = match self.load() {
            Ok(payload) => payload,
            // An unreadable cache cannot hold a readable entry; start over.
            Err(WamiError::TransferRead(_)) => {
                std::fs::remove_file(&self.path)?;
                return Ok(true);
            }
            Err(err) => return Err(err),
        };
        if payload.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.store(&payload)?;
        Ok(true)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{CachedBlob, FileTransferCache, TransferCache};

    #[test]
    fn put_match_delete() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut cache = FileTransferCache::new(temp.path().join("cache/transfer.json"));
        assert_eq!(cache.match_entry("file-0")?, None);

        cache.put("file-0", CachedBlob::new("image/png", vec![1, 2, 3]))?;
        assert_eq!(
            cache.match_entry("file-0")?,
            Some(CachedBlob::new("image/png", vec![1, 2, 3]))
        );

        assert!(cache.delete("file-0")?);
        assert!(!cache.delete("file-0")?);
        assert_eq!(cache.match_entry("file-0")?, None);
        Ok(())
    }

    #[test]
    fn writes_from_another_handle_are_visible() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("transfer.json");
        let mut writer = FileTransferCache::new(&path);
        let mut reader = FileTransferCache::new(&path);

        writer.put("shareData", CachedBlob::new("application/json", b"{}".to_vec()))?;
        assert!(reader.match_entry("shareData")?.is_some());
        reader.delete("shareData")?;
        assert!(writer.match_entry("shareData")?.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_body_is_a_transfer_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("transfer.json");
        std::fs::write(
            &path,
            r#"{"file-0": {"content_type": "image/png", "body": "%%%"}}"#,
        )?;
        let mut cache = FileTransferCache::new(&path);
        assert!(cache.match_entry("file-0").is_err());
        assert!(cache.delete("file-0")?);
        Ok(())
    }
}
