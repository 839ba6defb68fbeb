use std::path::Path;

use bytes::Bytes;

use crate::services::file_validator::media_type_for_extension;

/// A file picked for upload, with the media type it declares.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub name: String,
    pub media_type: String,
    pub size: u64,
    pub contents: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, contents: Bytes) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size: contents.len() as u64,
            contents,
        }
    }

    /// Read a file from disk, declaring the media type implied by its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let contents = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = path
            .extension()
            .map(|ext| media_type_for_extension(&ext.to_string_lossy()))
            .unwrap_or("application/octet-stream");

        Ok(Self::new(name, media_type, Bytes::from(contents)))
    }
}
