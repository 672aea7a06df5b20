mod cache;
mod consumer;
mod manifest;

pub use cache::{CachedBlob, FileTransferCache, TransferCache};
pub use consumer::{purge_transfer, stage_transfer, TransferLease};
pub use manifest::{blob_index, blob_key, extension_for, ShareManifest, MANIFEST_KEY};
