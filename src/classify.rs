//! Image classification by file extension.
//!
//! No content sniffing: a text file renamed to `.jpg` is treated as an
//! image. The allowlist is compared case-insensitively, so `IMG.JPG` and
//! `img.jpg` classify the same way.

use std::path::Path;

/// Extensions (lowercase, without the dot) accepted as images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif",
];

pub fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_allowlisted_extension_is_an_image() {
        for ext in IMAGE_EXTENSIONS {
            assert!(is_image(Path::new(&format!("photo.{ext}"))), "{ext}");
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_image(Path::new("IMG_0001.JPG")));
        assert!(is_image(Path::new("scan.TiFf")));
        assert!(is_image(Path::new("phone.HEIC")));
    }

    #[test]
    fn non_images_rejected() {
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("video.mp4")));
        assert!(!is_image(Path::new("raw.nef")));
    }

    #[test]
    fn missing_extension_rejected() {
        assert!(!is_image(Path::new("README")));
        assert!(!is_image(Path::new(".jpg")));
    }

    #[test]
    fn only_final_extension_counts() {
        assert!(is_image(Path::new("archive.tar.png")));
        assert!(!is_image(Path::new("photo.jpg.bak")));
    }
}
