//! Pre-flight checks on a selected file.
//!
//! Runs before any network call; a rejected file never produces a request.

use crate::error::ErrorKind;
use crate::models::SelectedFile;

pub const MAX_FILE_SIZE_MB: u64 = 10;
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Validate a file for upload
pub fn validate(file: Option<&SelectedFile>, max_size_mb: u64) -> Result<(), ErrorKind> {
    let file = file.ok_or(ErrorKind::FileRequired)?;

    if !is_allowed_media_type(&file.media_type) {
        return Err(ErrorKind::InvalidFileType(file.media_type.clone()));
    }

    let max = max_size_mb.saturating_mul(BYTES_PER_MB);
    if file.size > max {
        return Err(ErrorKind::FileTooLarge {
            size: file.size,
            max,
        });
    }

    Ok(())
}

/// Check a declared media type against the allow-list, ignoring case
pub fn is_allowed_media_type(media_type: &str) -> bool {
    let lower = media_type.trim().to_lowercase();
    ALLOWED_IMAGE_TYPES.contains(&lower.as_str())
}

/// Media type to declare for a file extension
pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
