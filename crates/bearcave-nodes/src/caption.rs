//! Caption sidecar files: one `.txt` per image, same basename.

use std::path::{Path, PathBuf};

/// Outputs of one caption operation.
#[derive(Debug, Clone)]
pub struct CaptionOutputs {
    pub caption_file: String,
    pub success: bool,
    pub status_message: String,
}

#[derive(Debug, Default)]
pub struct CaptionNode;

#[must_use]
pub fn caption_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("txt")
}

impl CaptionNode {
    /// Writes the caption sidecar next to the image.
    #[must_use]
    pub fn write(&self, image_path: &str, caption: &str) -> CaptionOutputs {
        let sidecar = caption_path(Path::new(image_path));
        match std::fs::write(&sidecar, caption) {
            Ok(()) => CaptionOutputs {
                caption_file: sidecar.display().to_string(),
                success: true,
                status_message: "caption written".to_string(),
            },
            Err(e) => CaptionOutputs {
                caption_file: String::new(),
                success: false,
                status_message: format!("failed to write caption: {e}"),
            },
        }
    }

    /// Reads an existing sidecar; empty string if none exists.
    #[must_use]
    pub fn read(&self, image_path: &str) -> String {
        std::fs::read_to_string(caption_path(Path::new(image_path))).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_caption_path_same_basename() {
        assert_eq!(caption_path(Path::new("/p/img_001.png")), PathBuf::from("/p/img_001.txt"));
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("subject.png");
        std::fs::write(&image, b"img").unwrap();

        let node = CaptionNode;
        let image_str = image.display().to_string();
        let outputs = node.write(&image_str, "bcgrizzly, portrait, forest");
        assert!(outputs.success);
        assert_eq!(node.read(&image_str), "bcgrizzly, portrait, forest");
    }

    #[test]
    fn test_read_missing_is_empty() {
        let node = CaptionNode;
        assert_eq!(node.read("/nowhere/subject.png"), "");
    }
}
