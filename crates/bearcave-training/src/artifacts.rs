//! Discovery of training by-products in a job's output directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File extensions recognized as trained model files.
pub const MODEL_EXTENSIONS: [&str; 3] = ["safetensors", "ckpt", "pt"];

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| allowed.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Scans `output_dir` (non-recursive) for trained model files, newest first by
/// modification time. The trainer may write any number of checkpoints.
#[must_use]
pub fn find_output_models(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return Vec::new();
    };

    let mut models: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &MODEL_EXTENSIONS))
        .map(|path| {
            let mtime = path
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (mtime, path)
        })
        .collect();

    models.sort_by(|a, b| b.0.cmp(&a.0));
    models.into_iter().map(|(_, path)| path).collect()
}

/// Collects sample images written under `<output_dir>/samples`, sorted by name.
#[must_use]
pub fn find_sample_images(output_dir: &Path) -> Vec<PathBuf> {
    let samples_dir = output_dir.join("samples");
    let Ok(entries) = std::fs::read_dir(samples_dir) else {
        return Vec::new();
    };

    let mut samples: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &["png", "jpg", "jpeg"]))
        .collect();
    samples.sort();
    samples
}

/// Size of a model file in megabytes, `0.0` if it cannot be read.
#[must_use]
pub fn model_size_mb(path: &Path) -> f64 {
    path.metadata().map_or(0.0, |meta| meta.len() as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_find_output_models_newest_first() {
        let temp = TempDir::new().unwrap();
        let older = temp.path().join("bear-000005.safetensors");
        let newer = temp.path().join("bear.safetensors");
        std::fs::write(&older, b"old").unwrap();
        std::fs::write(&newer, b"new").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"skip").unwrap();

        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let file = std::fs::File::options().write(true).open(&older).unwrap();
        file.set_modified(past).unwrap();

        let models = find_output_models(temp.path());
        assert_eq!(models, vec![newer, older]);
    }

    #[test]
    fn test_find_output_models_missing_dir() {
        assert!(find_output_models(Path::new("/no/such/output")).is_empty());
    }

    #[test]
    fn test_find_sample_images_sorted() {
        let temp = TempDir::new().unwrap();
        let samples = temp.path().join("samples");
        std::fs::create_dir(&samples).unwrap();
        std::fs::write(samples.join("b.png"), b"x").unwrap();
        std::fs::write(samples.join("a.jpg"), b"x").unwrap();
        std::fs::write(samples.join("prompt.txt"), b"x").unwrap();

        let found = find_sample_images(temp.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.jpg"));
    }

    #[test]
    fn test_model_size_mb() {
        let temp = TempDir::new().unwrap();
        let model = temp.path().join("m.safetensors");
        std::fs::write(&model, vec![0u8; 1024 * 1024]).unwrap();
        assert!((model_size_mb(&model) - 1.0).abs() < 1e-9);
        assert!(model_size_mb(Path::new("/missing")).abs() < f64::EPSILON);
    }
}
