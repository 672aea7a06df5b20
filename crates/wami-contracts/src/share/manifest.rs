use serde::{Deserialize, Serialize};

pub const MANIFEST_KEY: &str = "shareData";

pub fn blob_key(index: usize) -> String {
    format!("file-{index}")
}

/// Inverse of [`blob_key`].
pub fn blob_index(key: &str) -> Option<usize> {
    let digits = key.strip_prefix("file-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The `shareData` entry staged next to `fileCount` indexed blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareManifest {
    pub file_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ShareManifest {
    /// Number of indexed blobs; non-positive counts stage nothing.
    pub fn blob_count(&self) -> usize {
        usize::try_from(self.file_count).unwrap_or(0)
    }

    pub fn file_name(&self, index: usize, content_type: &str) -> String {
        self.file_names
            .as_ref()
            .and_then(|names| names.get(index))
            .cloned()
            .unwrap_or_else(|| format!("shared-{}.{}", index + 1, extension_for(content_type)))
    }
}

const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
    ("image/tiff", "tiff"),
    ("image/x-icon", "ico"),
];

pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or("jpg")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{blob_index, blob_key, extension_for, ShareManifest};

    #[test]
    fn manifest_reads_camel_case_json() -> anyhow::Result<()> {
        let manifest: ShareManifest = serde_json::from_value(json!({
            "fileCount": 2,
            "fileNames": ["cat.png"],
            "title": "Pets",
        }))?;
        assert_eq!(manifest.blob_count(), 2);
        assert_eq!(manifest.file_name(0, "image/png"), "cat.png");
        assert_eq!(manifest.file_name(1, "image/webp"), "shared-2.webp");
        assert_eq!(manifest.url, None);
        Ok(())
    }

    #[test]
    fn blob_keys_round_trip_and_reject_lookalikes() {
        assert_eq!(blob_index(&blob_key(12)), Some(12));
        assert_eq!(blob_index("file-"), None);
        assert_eq!(blob_index("file-+1"), None);
        assert_eq!(blob_index("shareData"), None);
    }

    #[test]
    fn negative_counts_stage_nothing() -> anyhow::Result<()> {
        let manifest: ShareManifest = serde_json::from_value(json!({"fileCount": -1}))?;
        assert_eq!(manifest.blob_count(), 0);
        Ok(())
    }

    #[test]
    fn unknown_content_types_default_to_jpg() {
        assert_eq!(extension_for("image/png; charset=binary"), "png");
        assert_eq!(extension_for("IMAGE/GIF"), "gif");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
        assert_eq!(extension_for(""), "jpg");
    }
}
