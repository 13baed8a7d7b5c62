//! Model identifiers, storage keys and local artifact listing
//!
//! A model's files live flat under `models/<model_id>/` in the bucket:
//! ```text
//! s3://my-bucket/
//! └── models/
//!     └── org/tiny-model/
//!         ├── config.json
//!         ├── model.safetensors
//!         └── tokenizer.json
//! ```
//! The prefix depends on the model id alone, so uploads and later
//! registration agree without any manifest.

use crate::error::{PackagerError, PackagerResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

const KEY_ROOT: &str = "models";

/// Hub model identifier, e.g. `deepseek-ai/DeepSeek-R1-Distill-Qwen-14B`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> PackagerResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(PackagerError::config("model name cannot be empty"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(PackagerError::config(format!(
                "model name '{}' cannot contain whitespace",
                id
            )));
        }
        if id.contains('\\') {
            return Err(PackagerError::config(format!(
                "model name '{}' cannot contain '\\'",
                id
            )));
        }
        if id
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(PackagerError::config(format!(
                "model name '{}' must be '/'-separated non-empty segments",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key prefix for this model's files
    pub fn key_prefix(&self) -> String {
        format!("{}/{}", KEY_ROOT, self.0)
    }

    /// Name usable as a SageMaker resource name
    ///
    /// SageMaker names allow `[a-zA-Z0-9-]` up to 63 characters, starting
    /// and ending with an alphanumeric.
    pub fn resource_name(&self) -> String {
        let mut name: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        name.truncate(63);
        let name = name.trim_matches('-');
        if name.is_empty() {
            "model".to_string()
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelId {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bucket plus key prefix under which an artifact's files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    pub prefix: String,
}

impl RemoteLocation {
    pub fn for_model(bucket: &str, model_id: &ModelId) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: model_id.key_prefix(),
        }
    }

    /// Object key for a local file: `<prefix>/<basename>`
    ///
    /// Only the final path component is used, so nested files flatten.
    pub fn key_for(&self, file: &Path) -> PackagerResult<String> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PackagerError::config(format!("{:?} has no valid UTF-8 file name", file))
            })?;
        Ok(format!("{}/{}", self.prefix, name))
    }

    /// `s3://bucket/prefix`, the artifact location handed to SageMaker
    pub fn url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Every regular file under `dir`, recursively, in a stable order
///
/// Symlinks are followed, so hub cache snapshots (links into `blobs/`)
/// list the files they point at.
pub fn list_files(dir: &Path) -> PackagerResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PackagerError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "model directory not found"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            PackagerError::io(path, source)
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_prefix() {
        let id = ModelId::new("org/tiny-model").unwrap();
        assert_eq!(id.key_prefix(), "models/org/tiny-model");
        assert_eq!(id.key_prefix(), id.clone().key_prefix());
    }

    #[test]
    fn test_invalid_model_ids() {
        for bad in ["", "/org/model", "org/model/", "org//model", "org/../x", "org/my model", "a\\b"] {
            let err = ModelId::new(bad).unwrap_err();
            assert!(err.is_config(), "expected config error for {:?}", bad);
        }
    }

    #[test]
    fn test_single_segment_model_id() {
        let id: ModelId = "gpt2".parse().unwrap();
        assert_eq!(id.key_prefix(), "models/gpt2");
    }

    #[test]
    fn test_resource_name() {
        let id = ModelId::new("deepseek-ai/DeepSeek-R1-Distill-Qwen-14B").unwrap();
        assert_eq!(id.resource_name(), "deepseek-ai-DeepSeek-R1-Distill-Qwen-14B");

        let id = ModelId::new("org/model_v1.5").unwrap();
        assert_eq!(id.resource_name(), "org-model-v1-5");

        let long = ModelId::new(format!("org/{}", "x".repeat(100))).unwrap();
        assert_eq!(long.resource_name().len(), 63);
    }

    #[test]
    fn test_remote_location_key_flattens() {
        let id = ModelId::new("org/tiny-model").unwrap();
        let location = RemoteLocation::for_model("my-bucket", &id);

        assert_eq!(
            location.key_for(Path::new("/tmp/x/config.json")).unwrap(),
            "models/org/tiny-model/config.json"
        );
        assert_eq!(
            location.key_for(Path::new("/tmp/x/nested/deeper/tokenizer.json")).unwrap(),
            "models/org/tiny-model/tokenizer.json"
        );
        assert_eq!(location.url(), "s3://my-bucket/models/org/tiny-model");
    }

    #[test]
    fn test_list_files_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        std::fs::write(dir.path().join("sub/inner/tokenizer.json"), "{}").unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.is_file()));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_files_follows_symlinks() {
        // Layout of a hub cache snapshot: every file is a link into blobs/
        let cache = TempDir::new().unwrap();
        let blobs = cache.path().join("blobs");
        let snapshot = cache.path().join("snapshots/abc123");
        std::fs::create_dir_all(&blobs).unwrap();
        std::fs::create_dir_all(&snapshot).unwrap();
        std::fs::write(blobs.join("1111"), "{}").unwrap();
        std::fs::write(blobs.join("2222"), "weights").unwrap();
        std::os::unix::fs::symlink(blobs.join("1111"), snapshot.join("config.json")).unwrap();
        std::os::unix::fs::symlink(blobs.join("2222"), snapshot.join("model.safetensors")).unwrap();

        let files = list_files(&snapshot).unwrap();
        assert_eq!(
            files,
            vec![snapshot.join("config.json"), snapshot.join("model.safetensors")]
        );
    }

    #[test]
    fn test_list_files_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_list_files_missing_dir() {
        let err = list_files(Path::new("/nonexistent/model/dir")).unwrap_err();
        assert!(matches!(err, PackagerError::Io { .. }));
    }
}
