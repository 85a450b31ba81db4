//! Training-image discovery for input validation.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions recognized as training images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Recursively collects recognized image files under `dir`, sorted by path.
#[must_use]
pub fn find_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image_file(path))
        .collect();
    images.sort();
    images
}

#[must_use]
pub fn count_images(dir: &Path) -> usize {
    find_images(dir).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/portrait.png")));
        assert!(is_image_file(Path::new("b.JPG")));
        assert!(is_image_file(Path::new("c.webp")));
        assert!(!is_image_file(Path::new("caption.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_find_images_recursive() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("one.png"), b"x").unwrap();
        std::fs::write(temp.path().join("nested/two.jpeg"), b"x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"x").unwrap();

        let images = find_images(temp.path());
        assert_eq!(images.len(), 2);
        assert_eq!(count_images(temp.path()), 2);
    }

    #[test]
    fn test_count_images_missing_dir() {
        assert_eq!(count_images(Path::new("/definitely/not/here")), 0);
    }
}
