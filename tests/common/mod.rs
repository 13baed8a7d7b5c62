//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use model_packager::{
    InferencePlatform, ModelId, ModelRecord, ModelSource, ObjectStore, PackagerError,
    PackagerResult,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source that writes a tiny fake checkpoint, with one nested file
pub struct TinyModelSource;

#[async_trait]
impl ModelSource for TinyModelSource {
    async fn save_weights(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()> {
        if model_id.as_str() == "org/unknown" {
            return Err(PackagerError::lookup(model_id.as_str(), "404 Not Found"));
        }
        write(dir, "config.json", r#"{"torch_dtype": "float16"}"#)?;
        write(dir, "model.safetensors", "weights")
    }

    async fn save_tokenizer(&self, _model_id: &ModelId, dir: &Path) -> PackagerResult<()> {
        write(dir, "tokenizer.json", "{}")?;
        std::fs::create_dir_all(dir.join("extra")).map_err(|e| PackagerError::io(dir, e))?;
        write(&dir.join("extra"), "special_tokens_map.json", "{}")
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PackagerResult<()> {
    let path = dir.join(name);
    std::fs::write(&path, content).map_err(|e| PackagerError::io(&path, e))
}

/// Object store backed by a local directory: `<root>/<bucket>/<key>`
pub struct LocalBucketStore {
    pub root: PathBuf,
    pub fail_on_key: Option<String>,
}

impl LocalBucketStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fail_on_key: None,
        }
    }

    /// Every stored key under `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let base = self.root.join(bucket);
        let mut keys: Vec<String> = walk(&base)
            .into_iter()
            .map(|p| {
                p.strip_prefix(&base)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        keys.sort();
        keys
    }
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(walk(&path));
            } else {
                out.push(path);
            }
        }
    }
    out
}

#[async_trait]
impl ObjectStore for LocalBucketStore {
    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> PackagerResult<()> {
        if self.fail_on_key.as_deref() == Some(key) {
            return Err(PackagerError::transport("s3", "AccessDenied"));
        }
        let dst = self.root.join(bucket).join(key);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackagerError::io(parent, e))?;
        }
        std::fs::copy(path, &dst).map_err(|e| PackagerError::io(&dst, e))?;
        Ok(())
    }
}

/// Platform that records registrations
#[derive(Default)]
pub struct RecordingPlatform {
    pub registered: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl InferencePlatform for RecordingPlatform {
    async fn register(&self, model_name: &str, artifact_url: &str) -> PackagerResult<ModelRecord> {
        self.registered
            .lock()
            .unwrap()
            .push((model_name.to_string(), artifact_url.to_string()));
        Ok(ModelRecord {
            model_name: model_name.to_string(),
            model_arn: Some(format!("arn:aws:sagemaker:us-east-1:1:model/{}", model_name)),
            artifact_url: artifact_url.to_string(),
        })
    }

    async fn deploy(&self, model_id: &ModelId, _instance_type: &str) -> PackagerResult<String> {
        Ok(model_id.resource_name())
    }

    async fn predict(&self, _endpoint: &str, inputs: &str) -> PackagerResult<serde_json::Value> {
        Ok(serde_json::json!({ "echo": inputs }))
    }

    async fn undeploy(&self, _endpoint: &str) -> PackagerResult<bool> {
        Ok(true)
    }
}
