/**
 * Media type guessing from file extensions
 */

use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "gif", "bmp", "tif", "tiff", "heic", "heif", "webp",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mov", "qt", "mp4", "m4v", "3gp", "3g2", "avi", "mkv", "mpg", "mpeg", "webm",
];

/// MIME family of a file, guessed from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    /// Known extension that is neither image nor video
    Other,
    /// No extension, or one we cannot map
    Unknown,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return MediaKind::Unknown;
        };
        let ext = ext.to_lowercase();

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else if is_other_known(&ext) {
            MediaKind::Other
        } else {
            MediaKind::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Other => "other",
            MediaKind::Unknown => "unknown",
        }
    }
}

fn is_other_known(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "json" | "xml" | "html" | "pdf" | "zip" | "mp3" | "wav" | "aac" | "m4a" | "ini" | "db"
    )
}
