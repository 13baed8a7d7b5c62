//! Managed inference client (Amazon SageMaker)
//!
//! Registering creates a SageMaker model pointing at an uploaded artifact.
//! Deploying stands up a live endpoint on the Hugging Face LLM serving image,
//! which pulls the model straight from the hub.

use crate::artifact::ModelId;
use crate::config::PackagerConfig;
use crate::error::{PackagerError, PackagerResult};
use async_trait::async_trait;
use aws_sdk_sagemaker::Client as SageMakerClient;
use aws_sdk_sagemaker::error::DisplayErrorContext;
use aws_sdk_sagemaker::types::{
    ContainerDefinition, EndpointStatus, ProductionVariant, ProductionVariantInstanceType,
};
use aws_sdk_sagemakerruntime::Client as RuntimeClient;
use aws_sdk_sagemakerruntime::primitives::Blob;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const SERVICE: &str = "sagemaker";
const ENTRY_POINT: &str = "inference.py";
const TGI_IMAGE_TAG: &str = "2.4.0-tgi3.0.1-gpu-py311-cu124-ubuntu22.04";
const MAX_NAME_LEN: usize = 63;

/// Platform-side record of a registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_arn: Option<String>,
    pub artifact_url: String,
}

/// Hosted inference platform
#[async_trait]
pub trait InferencePlatform: Send + Sync {
    /// Create a model record pointing at `artifact_url`
    async fn register(&self, model_name: &str, artifact_url: &str) -> PackagerResult<ModelRecord>;

    /// Provision a live endpoint serving `model_id`, returning its name
    async fn deploy(&self, model_id: &ModelId, instance_type: &str) -> PackagerResult<String>;

    /// Run one synchronous prediction
    async fn predict(&self, endpoint: &str, inputs: &str) -> PackagerResult<serde_json::Value>;

    /// Tear down an endpoint
    async fn undeploy(&self, endpoint: &str) -> PackagerResult<bool>;
}

/// Settings the SageMaker client needs from [`PackagerConfig`]
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub execution_role_arn: String,
    pub inference_image: String,
    pub llm_image: String,
    pub num_gpus: u32,
    pub health_check_timeout_secs: u64,
    pub poll_interval: Duration,
}

impl PlatformSettings {
    pub fn from_config(config: &PackagerConfig, region: &str) -> Self {
        Self {
            execution_role_arn: config.execution_role_arn.clone(),
            inference_image: config.inference_image.clone(),
            llm_image: config
                .llm_image
                .clone()
                .unwrap_or_else(|| default_llm_image(region)),
            num_gpus: config.num_gpus,
            health_check_timeout_secs: config.health_check_timeout_secs,
            poll_interval: Duration::from_secs(30),
        }
    }

    /// Upper bound on waiting for an endpoint to come into service
    pub fn deploy_wait(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs.saturating_mul(3))
    }
}

/// Regional Hugging Face TGI image used for live endpoints
pub fn default_llm_image(region: &str) -> String {
    format!(
        "763104351884.dkr.ecr.{}.amazonaws.com/huggingface-pytorch-tgi-inference:{}",
        region, TGI_IMAGE_TAG
    )
}

/// `<base>-<timestamp>`, within SageMaker's 63 character limit
pub fn endpoint_name(base: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let stamp = now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string();
    let room = MAX_NAME_LEN - stamp.len() - 1;
    let base: String = base.chars().take(room).collect();
    format!("{}-{}", base.trim_end_matches('-'), stamp)
}

// ============================================================================
// SageMaker Implementation
// ============================================================================

pub struct SageMakerPlatform {
    client: SageMakerClient,
    runtime: RuntimeClient,
    settings: PlatformSettings,
}

impl SageMakerPlatform {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &PackagerConfig) -> Self {
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self::with_settings(sdk_config, PlatformSettings::from_config(config, &region))
    }

    pub fn with_settings(sdk_config: &aws_config::SdkConfig, settings: PlatformSettings) -> Self {
        Self {
            client: SageMakerClient::new(sdk_config),
            runtime: RuntimeClient::new(sdk_config),
            settings,
        }
    }

    async fn wait_in_service(&self, endpoint: &str) -> PackagerResult<()> {
        let deadline = Instant::now() + self.settings.deploy_wait();

        loop {
            let out = self
                .client
                .describe_endpoint()
                .endpoint_name(endpoint)
                .send()
                .await
                .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

            match out.endpoint_status() {
                Some(EndpointStatus::InService) => return Ok(()),
                Some(EndpointStatus::Failed) => {
                    return Err(PackagerError::transport(
                        SERVICE,
                        format!(
                            "endpoint {} failed: {}",
                            endpoint,
                            out.failure_reason().unwrap_or("no reason given")
                        ),
                    ));
                }
                other => {
                    tracing::debug!(endpoint = %endpoint, status = ?other, "Waiting for endpoint");
                }
            }

            if Instant::now() >= deadline {
                return Err(PackagerError::transport(
                    SERVICE,
                    format!(
                        "endpoint {} not in service after {}s",
                        endpoint,
                        self.settings.deploy_wait().as_secs()
                    ),
                ));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait]
impl InferencePlatform for SageMakerPlatform {
    async fn register(&self, model_name: &str, artifact_url: &str) -> PackagerResult<ModelRecord> {
        let container = ContainerDefinition::builder()
            .image(&self.settings.inference_image)
            .model_data_url(artifact_url)
            .environment("SAGEMAKER_PROGRAM", ENTRY_POINT)
            .build();

        let out = self
            .client
            .create_model()
            .model_name(model_name)
            .execution_role_arn(&self.settings.execution_role_arn)
            .primary_container(container)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        Ok(ModelRecord {
            model_name: model_name.to_string(),
            model_arn: out.model_arn().map(str::to_string),
            artifact_url: artifact_url.to_string(),
        })
    }

    async fn deploy(&self, model_id: &ModelId, instance_type: &str) -> PackagerResult<String> {
        let name = endpoint_name(&model_id.resource_name(), chrono::Utc::now());
        tracing::info!(model_id = %model_id, endpoint = %name, instance_type = %instance_type, "Deploying endpoint");

        let container = ContainerDefinition::builder()
            .image(&self.settings.llm_image)
            .environment("HF_MODEL_ID", model_id.as_str())
            .environment("SM_NUM_GPUS", self.settings.num_gpus.to_string())
            .build();

        self.client
            .create_model()
            .model_name(&name)
            .execution_role_arn(&self.settings.execution_role_arn)
            .primary_container(container)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        let health_check_timeout = i32::try_from(self.settings.health_check_timeout_secs)
            .map_err(|_| PackagerError::config("health check timeout out of range"))?;
        let variant = ProductionVariant::builder()
            .variant_name("AllTraffic")
            .model_name(&name)
            .initial_instance_count(1)
            .instance_type(ProductionVariantInstanceType::from(instance_type))
            .container_startup_health_check_timeout_in_seconds(health_check_timeout)
            .build();

        self.client
            .create_endpoint_config()
            .endpoint_config_name(&name)
            .production_variants(variant)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        self.client
            .create_endpoint()
            .endpoint_name(&name)
            .endpoint_config_name(&name)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        self.wait_in_service(&name).await?;

        tracing::info!(endpoint = %name, "Model deployed at endpoint");
        Ok(name)
    }

    async fn predict(&self, endpoint: &str, inputs: &str) -> PackagerResult<serde_json::Value> {
        let payload = serde_json::to_vec(&serde_json::json!({ "inputs": inputs }))
            .map_err(|e| PackagerError::transport(SERVICE, e))?;

        let out = self
            .runtime
            .invoke_endpoint()
            .endpoint_name(endpoint)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        Ok(parse_prediction(out.body().map(|b| b.as_ref()).unwrap_or_default()))
    }

    async fn undeploy(&self, endpoint: &str) -> PackagerResult<bool> {
        let described = self
            .client
            .describe_endpoint()
            .endpoint_name(endpoint)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;
        let config_name = described.endpoint_config_name();

        self.client
            .delete_endpoint()
            .endpoint_name(endpoint)
            .send()
            .await
            .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;

        if let Some(config_name) = config_name {
            self.client
                .delete_endpoint_config()
                .endpoint_config_name(config_name)
                .send()
                .await
                .map_err(|e| PackagerError::transport(SERVICE, DisplayErrorContext(e)))?;
        }

        tracing::info!(endpoint = %endpoint, "Endpoint deleted");
        Ok(true)
    }
}

/// Response body as JSON, or as a JSON string when it is not JSON
fn parse_prediction(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}
