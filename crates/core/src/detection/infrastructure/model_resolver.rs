use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file {0} does not exist")]
    MissingOverride(PathBuf),
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`, total 0 when unknown.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Locates the detector model, downloading it into the user cache on first use.
///
/// An explicit `override_path` wins and must exist.
pub fn resolve(
    name: &str,
    url: &str,
    override_path: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = override_path {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::MissingOverride(path.to_path_buf()))
        };
    }
    resolve_in(&model_cache_dir()?, name, url, progress)
}

/// Same as [`resolve`] against a caller-chosen cache directory.
pub fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.is_file() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform model cache: `<data dir>/FaceTag/models` on macOS,
/// `<cache dir>/FaceTag/models` elsewhere.
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join("FaceTag").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = download_to(url, &temp_path, progress).and_then(|()| {
        fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
            path: dest.to_path_buf(),
            source: e,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn download_to(
    url: &str,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let write_err = |e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };

    let total = response.content_length().unwrap_or(0);
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    // Streamed in 1 MiB chunks; the model is ~10 MB and progress is shown per chunk.
    let mut buf = vec![0u8; 1024 * 1024];
    let mut downloaded: u64 = 0;
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_path_is_returned_when_present() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("custom.onnx");
        fs::write(&model, b"weights").unwrap();

        let resolved = resolve("ignored.onnx", "http://unused.invalid/", Some(&model), None);
        assert_eq!(resolved.unwrap(), model);
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("absent.onnx");
        let err = resolve("x.onnx", "http://unused.invalid/", Some(&model), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::MissingOverride(p) if p == model));
    }

    #[test]
    fn test_resolve_in_prefers_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cached = tmp.path().join("face.onnx");
        fs::write(&cached, b"cached").unwrap();

        let resolved = resolve_in(tmp.path(), "face.onnx", "http://unused.invalid/", None);
        assert_eq!(resolved.unwrap(), cached);
    }

    #[test]
    fn test_model_cache_dir_is_app_scoped() {
        let path = model_cache_dir().unwrap();
        let text = path.to_string_lossy();
        assert!(text.contains("FaceTag"));
        assert!(text.ends_with("models"));
    }

    #[test]
    fn test_failed_download_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_in(
            tmp.path(),
            "face.onnx",
            "http://invalid.nonexistent.example.com/model",
            None,
        );
        assert!(matches!(result, Err(ModelResolveError::Download { .. })));
        assert!(!tmp.path().join("face.onnx").exists());
        assert!(!tmp.path().join("face.part").exists());
    }
}
