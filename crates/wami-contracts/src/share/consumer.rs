use tracing::{debug, warn};

use super::cache::{CachedBlob, TransferCache};
use super::manifest::{blob_index, blob_key, ShareManifest, MANIFEST_KEY};
use crate::error::{Result, WamiError};

/// A consumed share transfer.
///
/// The manifest and every indexed blob are deleted when the lease is
/// released or dropped, whatever happened to the data in between.
pub struct TransferLease<'a> {
    cache: &'a mut dyn TransferCache,
    manifest: std::result::Result<ShareManifest, String>,
    released: bool,
}

impl<'a> TransferLease<'a> {
    /// `Ok(None)` when no transfer is staged. A staged manifest that does not
    /// parse still yields a lease so the transfer gets cleaned up; one that
    /// cannot be read at all is purged before the error is returned.
    pub fn open(cache: &'a mut dyn TransferCache) -> Result<Option<Self>> {
        let entry = match cache.match_entry(MANIFEST_KEY) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(err) => {
                if let Err(purge_err) = purge_transfer(cache) {
                    warn!(error = %purge_err, "unreadable share transfer could not be purged");
                }
                return Err(err);
            }
        };
        let manifest = serde_json::from_slice::<ShareManifest>(&entry.bytes)
            .map_err(|err| format!("manifest: {err}"));
        Ok(Some(Self {
            cache,
            manifest,
            released: false,
        }))
    }

    pub fn manifest(&self) -> Result<&ShareManifest> {
        self.manifest
            .as_ref()
            .map_err(|reason| WamiError::TransferRead(reason.clone()))
    }

    pub fn read_blob(&mut self, index: usize) -> Result<CachedBlob> {
        let key = blob_key(index);
        self.cache
            .match_entry(&key)?
            .ok_or_else(|| WamiError::transfer(format!("missing entry '{key}'")))
    }

    /// Deletes the manifest and blobs, returning how many entries existed.
    /// Every key is attempted; the first failure is reported.
    pub fn release(mut self) -> Result<usize> {
        self.released = true;
        self.cleanup()
    }

    fn cleanup(&mut self) -> Result<usize> {
        let blob_limit = self.manifest.as_ref().ok().map(ShareManifest::blob_count);
        drain(self.cache, blob_limit)
    }
}

impl Drop for TransferLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.cleanup() {
            warn!(error = %err, "share transfer cleanup failed");
        }
    }
}

/// Deletes the manifest and the `file-<i>` entries actually present, below
/// `blob_limit` when the manifest could be trusted. Only existing keys are
/// visited, so the declared count never drives the work.
fn drain(cache: &mut dyn TransferCache, blob_limit: Option<usize>) -> Result<usize> {
    let keys = match cache.keys() {
        Ok(keys) => keys,
        Err(err) => {
            warn!(error = %err, "transfer cache unreadable, dropping manifest");
            return cache.delete(MANIFEST_KEY).map(usize::from);
        }
    };
    let mut doomed: Vec<String> = keys
        .into_iter()
        .filter(|key| {
            key == MANIFEST_KEY
                || blob_index(key).is_some_and(|index| blob_limit.map_or(true, |limit| index < limit))
        })
        .collect();
    doomed.sort_by_key(|key| key != MANIFEST_KEY);

    let mut removed = 0;
    let mut first_err = None;
    for key in &doomed {
        match cache.delete(key) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(key = %key, error = %err, "transfer entry delete failed");
                first_err.get_or_insert(err);
            }
        }
    }
    debug!(removed, "transfer entries deleted");
    match first_err {
        Some(err) => Err(err),
        None => Ok(removed),
    }
}

/// Removes a transfer whose manifest could not be trusted: the manifest and
/// every staged `file-<i>` entry.
pub fn purge_transfer(cache: &mut dyn TransferCache) -> Result<usize> {
    drain(cache, None)
}

/// Stages a transfer the way a share receiver does: blobs first, manifest
/// last, so a half-written transfer is never picked up.
pub fn stage_transfer(
    cache: &mut dyn TransferCache,
    manifest: &ShareManifest,
    blobs: &[CachedBlob],
) -> Result<()> {
    if manifest.blob_count() != blobs.len() {
        return Err(WamiError::transfer(format!(
            "manifest declares {} files but {} were given",
            manifest.file_count,
            blobs.len()
        )));
    }
    for (index, blob) in blobs.iter().enumerate() {
        cache.put(&blob_key(index), blob.clone())?;
    }
    cache.put(MANIFEST_KEY, CachedBlob::json(manifest)?)
}
