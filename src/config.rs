//! Configuration structures and loading logic

use crate::error::{PackagerError, PackagerResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_EXECUTION_ROLE_ARN: &str = "SM_EXECUTION_ROLE_ARN";
pub const ENV_BUCKET: &str = "SM_BUCKET";
pub const ENV_INFERENCE_IMAGE: &str = "SM_INFERENCE_IMAGE";
pub const ENV_HF_TOKEN: &str = "HF_TOKEN";

/// Packager configuration
///
/// Built once at startup and handed to each component by value or reference.
/// Nothing reads the environment after [`PackagerConfig::load`] returns.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PackagerConfig {
    /// IAM role SageMaker assumes for created models
    pub execution_role_arn: String,
    /// Bucket that receives model artifacts
    pub bucket: String,
    /// Container image for registered models
    pub inference_image: String,

    /// AWS region; falls back to the SDK's default provider chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,

    /// Root under which `save_model_to_disk` places `<model_id>/`
    pub models_dir: PathBuf,

    /// Parent for scratch directories; the system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Hub cache directory; the hub client's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_cache_dir: Option<PathBuf>,

    /// Hub access token for gated or private repositories
    #[serde(skip_serializing)]
    pub hf_token: Option<String>,

    /// Serving image for live endpoints; the regional TGI image when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_image: Option<String>,

    pub num_gpus: u32,
    pub health_check_timeout_secs: u64,
    pub default_instance_type: String,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            execution_role_arn: String::new(),
            bucket: String::new(),
            inference_image: String::new(),
            aws_region: None,
            models_dir: default_models_dir(),
            scratch_dir: None,
            hf_cache_dir: None,
            hf_token: None,
            llm_image: None,
            num_gpus: default_num_gpus(),
            health_check_timeout_secs: default_health_check_timeout(),
            default_instance_type: default_instance_type(),
        }
    }
}

impl PackagerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> PackagerResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`PackagerConfig::load`], reading variables through `lookup`
    pub fn load_with<F>(path: Option<PathBuf>, lookup: F) -> PackagerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                PackagerError::config(format!("Failed to read config file {:?}: {}", path, e))
            })?;
            toml::from_str(&content).map_err(|e| {
                PackagerError::config(format!("Failed to parse TOML config {:?}: {}", path, e))
            })?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Some(role) = lookup(ENV_EXECUTION_ROLE_ARN) {
            config.execution_role_arn = role;
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            config.bucket = bucket;
        }
        if let Some(image) = lookup(ENV_INFERENCE_IMAGE) {
            config.inference_image = image;
        }
        if let Some(region) = lookup("AWS_REGION") {
            config.aws_region = Some(region);
        }
        if let Some(dir) = lookup("MODEL_PACKAGER_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("MODEL_PACKAGER_SCRATCH_DIR") {
            config.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("MODEL_PACKAGER_HF_CACHE") {
            config.hf_cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(token) = lookup(ENV_HF_TOKEN).filter(|t| !t.trim().is_empty()) {
            config.hf_token = Some(token);
        }
        if let Some(image) = lookup("SM_LLM_IMAGE") {
            config.llm_image = Some(image);
        }
        if let Some(gpus) = lookup("SM_NUM_GPUS") {
            config.num_gpus = gpus
                .parse()
                .map_err(|_| PackagerError::config(format!("Invalid SM_NUM_GPUS value: {}", gpus)))?;
        }
        if let Some(secs) = lookup("SM_DEPLOY_TIMEOUT_SECS") {
            config.health_check_timeout_secs = secs.parse().map_err(|_| {
                PackagerError::config(format!("Invalid SM_DEPLOY_TIMEOUT_SECS value: {}", secs))
            })?;
        }

        Ok(config)
    }

    /// Validate configuration
    ///
    /// Reports every missing required value at once.
    pub fn validate(&self) -> PackagerResult<()> {
        let missing: Vec<&str> = [
            (ENV_EXECUTION_ROLE_ARN, &self.execution_role_arn),
            (ENV_BUCKET, &self.bucket),
            (ENV_INFERENCE_IMAGE, &self.inference_image),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(PackagerError::config(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }

        if self.bucket.contains('/') {
            return Err(PackagerError::config(format!(
                "bucket name '{}' cannot contain '/'",
                self.bucket
            )));
        }
        if self.num_gpus == 0 {
            return Err(PackagerError::config("SM_NUM_GPUS must be at least 1"));
        }
        if self.health_check_timeout_secs == 0 {
            return Err(PackagerError::config(
                "health check timeout must be greater than zero",
            ));
        }

        Ok(())
    }
}

// Default functions
fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_num_gpus() -> u32 {
    4
}
fn default_health_check_timeout() -> u64 {
    1200
}
fn default_instance_type() -> String {
    "ml.g6.12xlarge".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_EXECUTION_ROLE_ARN, "arn:aws:iam::123456789012:role/sm"),
            (ENV_BUCKET, "my-bucket"),
            (ENV_INFERENCE_IMAGE, "123.dkr.ecr.eu-west-1.amazonaws.com/inf:1"),
        ]
    }

    #[test]
    fn test_default_config() {
        let config = PackagerConfig::default();
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.num_gpus, 4);
        assert_eq!(config.health_check_timeout_secs, 1200);
        assert_eq!(config.default_instance_type, "ml.g6.12xlarge");
        // Required values have no defaults
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_provides_required_values() {
        let config = PackagerConfig::load_with(None, env(&required())).unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.execution_role_arn, "arn:aws:iam::123456789012:role/sm");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_values_are_all_reported() {
        let config =
            PackagerConfig::load_with(None, env(&[(ENV_BUCKET, "my-bucket")])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        let msg = err.to_string();
        assert!(msg.contains(ENV_EXECUTION_ROLE_ARN));
        assert!(msg.contains(ENV_INFERENCE_IMAGE));
        assert!(!msg.contains(ENV_BUCKET));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut vars = required();
        vars[1] = (ENV_BUCKET, "   ");
        let config = PackagerConfig::load_with(None, env(&vars)).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains(ENV_BUCKET));
    }

    #[test]
    fn test_hf_token_from_env() {
        let config = PackagerConfig::load_with(None, env(&required())).unwrap();
        assert_eq!(config.hf_token, None);

        let mut vars = required();
        vars.push((ENV_HF_TOKEN, "hf_abc123"));
        let config = PackagerConfig::load_with(None, env(&vars)).unwrap();
        assert_eq!(config.hf_token.as_deref(), Some("hf_abc123"));

        // Never written back out
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("hf_abc123"));
    }

    #[test]
    fn test_invalid_num_gpus() {
        let mut vars = required();
        vars.push(("SM_NUM_GPUS", "four"));
        let err = PackagerConfig::load_with(None, env(&vars)).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("SM_NUM_GPUS"));
    }

    #[test]
    fn test_toml_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bucket = "file-bucket"
execution_role_arn = "arn:aws:iam::1:role/file"
inference_image = "file-image"
models_dir = "/srv/models"
num_gpus = 8
"#
        )
        .unwrap();

        let config = PackagerConfig::load_with(
            Some(file.path().to_path_buf()),
            env(&[(ENV_BUCKET, "env-bucket")]),
        )
        .unwrap();

        assert_eq!(config.bucket, "env-bucket");
        assert_eq!(config.inference_image, "file-image");
        assert_eq!(config.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.num_gpus, 8);
        // Unset keys keep their defaults
        assert_eq!(config.health_check_timeout_secs, 1200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unreadable_config_file() {
        let err = PackagerConfig::load_with(
            Some(PathBuf::from("/nonexistent/model-packager.toml")),
            env(&[]),
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_bucket_with_slash_rejected() {
        let mut vars = required();
        vars[1] = (ENV_BUCKET, "bucket/prefix");
        let config = PackagerConfig::load_with(None, env(&vars)).unwrap();
        assert!(config.validate().is_err());
    }
}
