//! Content type selection for uploads.

use std::path::Path;

/// Used when the extension is unknown or missing.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// MIME type of a Drive folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type for a file extension (without the dot, case-insensitive).
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "html" => "text/html",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// MIME type for a local file, from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(mime_for_extension)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_for_path(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("photo.JPEG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("shot.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("/srv/www/index.html")), "text/html");
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(mime_for_path(Path::new("notes.md")), DEFAULT_MIME_TYPE);
        assert_eq!(mime_for_path(Path::new("Makefile")), DEFAULT_MIME_TYPE);
        assert_eq!(mime_for_path(Path::new(".bashrc")), DEFAULT_MIME_TYPE);
    }

    proptest! {
        #[test]
        fn images_never_map_to_gif(stem in "[a-z0-9_]{1,16}", ext in "(jpg|png|JPG|PNG)") {
            let path = format!("{}.{}", stem, ext);
            let mime = mime_for_path(Path::new(&path));
            prop_assert!(mime.starts_with("image/"));
            prop_assert_ne!(mime, "image/gif");
        }
    }
}
