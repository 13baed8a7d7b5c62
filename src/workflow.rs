//! Workflow driver
//!
//! Composes the model source, object store and inference platform into the
//! packaging operations. Every operation runs start to finish on the calling
//! task; uploads happen one file at a time. There is no rollback: when file N
//! of M fails to upload, files before it stay uploaded.

use crate::artifact::{ModelId, RemoteLocation, list_files};
use crate::command::Invocation;
use crate::config::PackagerConfig;
use crate::error::{PackagerError, PackagerResult};
use crate::inference::{InferencePlatform, ModelRecord};
use crate::scratch::ScratchDir;
use crate::source::ModelSource;
use crate::store::ObjectStore;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one operation, printed as JSON by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Uploaded { location: String, keys: Vec<String> },
    Saved { model_dir: PathBuf },
    Registered(ModelRecord),
    Deployed { endpoint: String },
    Prediction(serde_json::Value),
    Undeployed { endpoint: String, deleted: bool },
}

pub struct Workflow {
    config: PackagerConfig,
    source: Option<Arc<dyn ModelSource>>,
    store: Option<Arc<dyn ObjectStore>>,
    platform: Option<Arc<dyn InferencePlatform>>,
    scratch_root: Option<PathBuf>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("config", &self.config)
            .field("scratch_root", &self.scratch_root)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    pub fn new(config: PackagerConfig) -> Self {
        Self {
            config,
            source: None,
            store: None,
            platform: None,
            scratch_root: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn InferencePlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = Some(root);
        self
    }

    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    /// Remote location for a model's files in the configured bucket
    pub fn remote_location(&self, model_id: &ModelId) -> RemoteLocation {
        RemoteLocation::for_model(&self.config.bucket, model_id)
    }

    fn source(&self) -> PackagerResult<&dyn ModelSource> {
        self.source
            .as_deref()
            .ok_or_else(|| PackagerError::config("no model source configured"))
    }

    fn store(&self) -> PackagerResult<&dyn ObjectStore> {
        self.store
            .as_deref()
            .ok_or_else(|| PackagerError::config("no object store configured"))
    }

    fn platform(&self) -> PackagerResult<&dyn InferencePlatform> {
        self.platform
            .as_deref()
            .ok_or_else(|| PackagerError::config("no inference platform configured"))
    }

    /// Run a validated invocation
    pub async fn run(&self, invocation: Invocation) -> PackagerResult<Outcome> {
        match invocation {
            Invocation::SaveAndUploadViaTempdir { model_id } => {
                let keys = self.save_and_upload_via_scratch(&model_id).await?;
                Ok(Outcome::Uploaded {
                    location: self.remote_location(&model_id).url(),
                    keys,
                })
            }
            Invocation::SaveToDisk { model_id, dir } => {
                self.save_to_disk(&model_id, &dir).await?;
                Ok(Outcome::Saved { model_dir: dir })
            }
            Invocation::UploadFromDisk { model_id, dir } => {
                let keys = self.upload_from_disk(&model_id, &dir).await?;
                Ok(Outcome::Uploaded {
                    location: self.remote_location(&model_id).url(),
                    keys,
                })
            }
            Invocation::CreateModel { model_id } => {
                Ok(Outcome::Registered(self.register(&model_id).await?))
            }
            Invocation::DeployModel {
                model_id,
                instance_type,
            } => {
                let endpoint = self.deploy(&model_id, instance_type.as_deref()).await?;
                Ok(Outcome::Deployed { endpoint })
            }
            Invocation::Predict { endpoint, input } => {
                Ok(Outcome::Prediction(self.predict(&endpoint, &input).await?))
            }
            Invocation::UndeployModel { endpoint } => {
                let deleted = self.undeploy(&endpoint).await?;
                Ok(Outcome::Undeployed { endpoint, deleted })
            }
        }
    }

    /// Fetch a model into a scratch directory and upload every file
    ///
    /// The scratch directory is removed whether or not the upload succeeds.
    pub async fn save_and_upload_via_scratch(&self, model_id: &ModelId) -> PackagerResult<Vec<String>> {
        tracing::info!(model_id = %model_id, "Save and upload model via tempdir - start");

        let scratch = match &self.scratch_root {
            Some(root) => ScratchDir::new_in(root)?,
            None => ScratchDir::new()?,
        };

        let result = self.fetch_and_upload(model_id, scratch.path()).await;
        let cleanup = scratch.close();

        let keys = match (result, cleanup) {
            (Ok(keys), Ok(())) => keys,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::warn!(error = %cleanup_err, "Scratch cleanup failed after error");
                }
                return Err(e);
            }
        };

        tracing::info!(model_id = %model_id, files = keys.len(), "Save and upload model via tempdir - done");
        Ok(keys)
    }

    async fn fetch_and_upload(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<Vec<String>> {
        let source = self.source()?;
        source.save_weights(model_id, dir).await?;
        source.save_tokenizer(model_id, dir).await?;
        self.upload_dir(model_id, dir).await
    }

    /// Fetch a model into a persistent directory, creating it if needed
    pub async fn save_to_disk(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<()> {
        let source = self.source()?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PackagerError::io(dir, e))?;
        tracing::info!(model_id = %model_id, model_dir = ?dir, "Save model to disk - start");

        source.save_weights(model_id, dir).await?;
        tracing::debug!(model_id = %model_id, model_dir = ?dir, "Weights saved");

        source.save_tokenizer(model_id, dir).await?;
        tracing::debug!(model_id = %model_id, model_dir = ?dir, "Tokenizer saved");

        tracing::info!(model_id = %model_id, model_dir = ?dir, "Save model to disk - done");
        Ok(())
    }

    /// Upload an already materialized model directory
    pub async fn upload_from_disk(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<Vec<String>> {
        tracing::info!(model_id = %model_id, model_dir = ?dir, "Upload model from disk - start");
        let keys = self.upload_dir(model_id, dir).await?;
        tracing::info!(model_id = %model_id, files = keys.len(), "Upload model from disk - done");
        Ok(keys)
    }

    async fn upload_dir(&self, model_id: &ModelId, dir: &Path) -> PackagerResult<Vec<String>> {
        let store = self.store()?;
        let location = self.remote_location(model_id);
        let files = list_files(dir)?;
        if files.is_empty() {
            tracing::warn!(model_id = %model_id, model_dir = ?dir, "No files found to upload");
        }

        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(files.len());
        for file in files {
            let key = location.key_for(&file)?;
            if !seen.insert(key.clone()) {
                tracing::warn!(key = %key, file = ?file, "Nested file overwrites an earlier upload with the same name");
            }
            tracing::debug!(file = ?file, bucket = %location.bucket, key = %key, "Uploading file");
            store.upload_file(&file, &location.bucket, &key).await?;
            keys.push(key);
        }

        Ok(keys)
    }

    /// Register an uploaded artifact with the inference platform
    pub async fn register(&self, model_id: &ModelId) -> PackagerResult<ModelRecord> {
        let platform = self.platform()?;
        let location = self.remote_location(model_id);

        tracing::info!(model_id = %model_id, artifact = %location, "Registering model");
        platform
            .register(&model_id.resource_name(), &location.url())
            .await
    }

    pub async fn deploy(&self, model_id: &ModelId, instance_type: Option<&str>) -> PackagerResult<String> {
        let instance_type = instance_type.unwrap_or(&self.config.default_instance_type);
        self.platform()?.deploy(model_id, instance_type).await
    }

    pub async fn predict(&self, endpoint: &str, input: &str) -> PackagerResult<serde_json::Value> {
        self.platform()?.predict(endpoint, input).await
    }

    pub async fn undeploy(&self, endpoint: &str) -> PackagerResult<bool> {
        self.platform()?.undeploy(endpoint).await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
