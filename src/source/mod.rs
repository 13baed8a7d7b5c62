//! Model source adapter
//!
//! Fetches a model's weights and tokenizer from the HuggingFace Hub and
//! materializes them into a local directory:
//! - weights are converted to float16 safetensors
//! - `config.json` is rewritten with `torch_dtype = "float16"`
//! - tokenizer files are copied verbatim
//!
//! Saving weights and saving the tokenizer are separate calls; one may
//! succeed while the other fails.

pub mod convert;

use crate::artifact::ModelId;
use crate::error::{PackagerError, PackagerResult};
use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use convert::{ConversionStats, convert_file_to_f16};

const CONFIG_FILE: &str = "config.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const SHARD_INDEX_FILE: &str = "model.safetensors.index.json";

/// Tokenizer files copied when the repository carries them
pub const TOKENIZER_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "added_tokens.json",
    "tokenizer.model",
    "vocab.json",
    "vocab.txt",
    "merges.txt",
];

/// Source of pretrained model artifacts
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Write the model config and float16 weights into `dir`, overwriting
    async fn save_weights(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()>;

    /// Write the tokenizer files into `dir`, overwriting
    async fn save_tokenizer(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()>;
}

// ============================================================================
// HuggingFace Hub Implementation
// ============================================================================

/// Model source backed by the hf-hub client and its local cache
pub struct HubModelSource {
    api: Api,
}

impl HubModelSource {
    /// Create a hub client
    ///
    /// The client honours `HF_HOME` and `HF_ENDPOINT` from the environment.
    ///
    /// # Arguments
    /// * `cache_dir` - Optional custom cache directory, overriding `HF_HOME`.
    /// * `token` - Optional access token for gated or private repositories.
    pub fn new(cache_dir: Option<PathBuf>, token: Option<String>) -> PackagerResult<Self> {
        let mut builder = ApiBuilder::from_env().with_progress(false).with_token(token);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir);
        }
        let api = builder
            .build()
            .map_err(|e| PackagerError::config(format!("Failed to create HF API client: {}", e)))?;
        Ok(Self { api })
    }

    fn repo(&self, model_id: &ModelId) -> ApiRepo {
        self.api.model(model_id.as_str().to_string())
    }

    /// Top-level file names in the repository
    ///
    /// Fails with a lookup error when the hub does not know the model.
    async fn repo_files(&self, repo: &ApiRepo, model_id: &ModelId) -> PackagerResult<BTreeSet<String>> {
        let info = repo
            .info()
            .await
            .map_err(|e| PackagerError::lookup(model_id.as_str(), e.to_string()))?;

        Ok(info
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|name| !name.contains('/'))
            .collect())
    }

    async fn fetch(&self, repo: &ApiRepo, model_id: &ModelId, file: &str) -> PackagerResult<PathBuf> {
        tracing::debug!(model_id = %model_id, file = %file, "Downloading file");
        repo.get(file).await.map_err(|e| {
            PackagerError::lookup(model_id.as_str(), format!("Failed to download {}: {}", file, e))
        })
    }
}

#[async_trait]
impl ModelSource for HubModelSource {
    async fn save_weights(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()> {
        let repo = self.repo(model_id);
        let files = self.repo_files(&repo, model_id).await?;

        let config_path = self.fetch(&repo, model_id, CONFIG_FILE).await?;
        write_half_precision_config(&config_path, &dir.join(CONFIG_FILE)).await?;

        if files.contains(GENERATION_CONFIG_FILE) {
            let path = self.fetch(&repo, model_id, GENERATION_CONFIG_FILE).await?;
            copy_into(&path, dir, GENERATION_CONFIG_FILE).await?;
        }

        let index = if files.contains(SHARD_INDEX_FILE) {
            let path = self.fetch(&repo, model_id, SHARD_INDEX_FILE).await?;
            Some(read_json(&path).await?)
        } else {
            None
        };

        let shards = match &index {
            Some(index) => shard_files(index),
            None => files
                .iter()
                .filter(|name| name.ends_with(".safetensors"))
                .cloned()
                .collect(),
        };

        if shards.is_empty() {
            return Err(PackagerError::lookup(
                model_id.as_str(),
                missing_weights_message(&files),
            ));
        }

        tracing::info!(model_id = %model_id, shard_count = shards.len(), "Converting weights to float16");

        let mut total_size = 0u64;
        for shard in &shards {
            let src = self.fetch(&repo, model_id, shard).await?;
            let dst = shard_destination(dir, shard).await?;
            let stats = tokio::task::spawn_blocking(move || convert_file_to_f16(&src, &dst))
                .await
                .map_err(|e| PackagerError::Conversion {
                    path: PathBuf::from(shard),
                    message: format!("conversion task failed: {}", e),
                })??;
            tracing::debug!(
                model_id = %model_id,
                shard = %shard,
                tensors = stats.tensors,
                converted = stats.converted,
                "Converted shard"
            );
            total_size += stats.output_bytes;
        }

        if let Some(mut index) = index {
            set_total_size(&mut index, total_size);
            write_json(&dir.join(SHARD_INDEX_FILE), &index).await?;
        }

        Ok(())
    }

    async fn save_tokenizer(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()> {
        let repo = self.repo(model_id);
        let files = self.repo_files(&repo, model_id).await?;

        let wanted: Vec<&str> = TOKENIZER_FILES
            .iter()
            .copied()
            .filter(|name| files.contains(*name))
            .collect();

        if wanted.is_empty() {
            return Err(PackagerError::lookup(
                model_id.as_str(),
                "repository has no tokenizer files",
            ));
        }

        for file in wanted {
            let path = self.fetch(&repo, model_id, file).await?;
            copy_into(&path, dir, file).await?;
        }

        Ok(())
    }
}

/// Unique shard file names referenced by a sharded checkpoint index
fn shard_files(index: &serde_json::Value) -> Vec<String> {
    let shards: BTreeSet<String> = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.values()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    shards.into_iter().collect()
}

fn missing_weights_message(files: &BTreeSet<String>) -> &'static str {
    if files.iter().any(|name| name.ends_with(".bin")) {
        "repository has only pickle (.bin) weights; only safetensors checkpoints can be converted"
    } else {
        "repository has no safetensors weights"
    }
}

/// Output path for a shard named in the index, creating its parent
///
/// Index entries may name shards in subdirectories; names that would
/// escape `dir` are rejected.
async fn shard_destination(dir: &Path, shard: &str) -> PackagerResult<PathBuf> {
    let relative = Path::new(shard);
    if !relative
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)))
    {
        return Err(PackagerError::Conversion {
            path: relative.to_path_buf(),
            message: "shard name escapes the model directory".to_string(),
        });
    }

    let dst = dir.join(relative);
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PackagerError::io(parent, e))?;
    }
    Ok(dst)
}

fn set_total_size(index: &mut serde_json::Value, total_size: u64) {
    if let Some(obj) = index.as_object_mut() {
        let metadata = obj
            .entry("metadata")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("total_size".to_string(), total_size.into());
        }
    }
}

async fn write_half_precision_config(src: &Path, dst: &Path) -> PackagerResult<()> {
    let mut config = read_json(src).await?;
    if let Some(obj) = config.as_object_mut() {
        obj.insert("torch_dtype".to_string(), "float16".into());
    }
    write_json(dst, &config).await
}

async fn read_json(path: &Path) -> PackagerResult<serde_json::Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PackagerError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PackagerError::Conversion {
        path: path.to_path_buf(),
        message: format!("invalid JSON: {}", e),
    })
}

async fn write_json(path: &Path, value: &serde_json::Value) -> PackagerResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| PackagerError::Conversion {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PackagerError::io(path, e))
}

async fn copy_into(src: &Path, dir: &Path, name: &str) -> PackagerResult<()> {
    let dst = dir.join(name);
    tokio::fs::copy(src, &dst)
        .await
        .map_err(|e| PackagerError::io(&dst, e))?;
    Ok(())
}
