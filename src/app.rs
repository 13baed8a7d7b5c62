//! Command execution
//!
//! Runs one command from raw arguments: parse the operation, load and
//! validate configuration, check the arguments, then build only the clients
//! that operation needs. Nothing touches the filesystem or network until
//! configuration has validated.

use crate::command::{CommandArgs, Invocation, Operation};
use crate::config::PackagerConfig;
use crate::error::PackagerResult;
use crate::inference::{InferencePlatform, SageMakerPlatform};
use crate::source::{HubModelSource, ModelSource};
use crate::store::{self, ObjectStore, S3Store};
use crate::workflow::{Outcome, Workflow};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds the external clients an operation uses
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn model_source(&self, config: &PackagerConfig) -> PackagerResult<Arc<dyn ModelSource>>;

    async fn object_store(&self, config: &PackagerConfig) -> PackagerResult<Arc<dyn ObjectStore>>;

    async fn inference_platform(
        &self,
        config: &PackagerConfig,
    ) -> PackagerResult<Arc<dyn InferencePlatform>>;
}

/// Hub, S3 and SageMaker clients
pub struct DefaultClients;

#[async_trait]
impl ClientFactory for DefaultClients {
    async fn model_source(&self, config: &PackagerConfig) -> PackagerResult<Arc<dyn ModelSource>> {
        let source = HubModelSource::new(config.hf_cache_dir.clone(), config.hf_token.clone())?;
        Ok(Arc::new(source))
    }

    async fn object_store(&self, config: &PackagerConfig) -> PackagerResult<Arc<dyn ObjectStore>> {
        let sdk_config = store::load_sdk_config(config.aws_region.clone()).await;
        Ok(Arc::new(S3Store::from_sdk_config(&sdk_config)))
    }

    async fn inference_platform(
        &self,
        config: &PackagerConfig,
    ) -> PackagerResult<Arc<dyn InferencePlatform>> {
        let sdk_config = store::load_sdk_config(config.aws_region.clone()).await;
        Ok(Arc::new(SageMakerPlatform::new(&sdk_config, config)))
    }
}

/// Validate everything, then build the workflow for one command
pub async fn prepare<F>(
    args: &CommandArgs,
    config_path: Option<PathBuf>,
    lookup: F,
    clients: &dyn ClientFactory,
) -> PackagerResult<(Workflow, Invocation)>
where
    F: Fn(&str) -> Option<String>,
{
    // Reject unknown operations before touching configuration
    let operation: Operation = args.operation.parse()?;

    let config = PackagerConfig::load_with(config_path, lookup)?;
    config.validate()?;

    tracing::debug!(
        operation = %operation,
        bucket = %config.bucket,
        models_dir = ?config.models_dir,
        "Configuration loaded"
    );

    let invocation = Invocation::from_args(args, &config)?;
    let workflow = build_workflow(operation, config, clients).await?;
    Ok((workflow, invocation))
}

/// [`prepare`] and run one command
pub async fn execute<F>(
    args: &CommandArgs,
    config_path: Option<PathBuf>,
    lookup: F,
    clients: &dyn ClientFactory,
) -> PackagerResult<Outcome>
where
    F: Fn(&str) -> Option<String>,
{
    let (workflow, invocation) = prepare(args, config_path, lookup, clients).await?;
    workflow.run(invocation).await
}

async fn build_workflow(
    operation: Operation,
    config: PackagerConfig,
    clients: &dyn ClientFactory,
) -> PackagerResult<Workflow> {
    let mut workflow = Workflow::new(config.clone());

    if let Some(root) = &config.scratch_dir {
        workflow = workflow.with_scratch_root(root.clone());
    }
    if operation.needs_source() {
        workflow = workflow.with_source(clients.model_source(&config).await?);
    }
    if operation.needs_store() {
        workflow = workflow.with_store(clients.object_store(&config).await?);
    }
    if operation.needs_platform() {
        workflow = workflow.with_platform(clients.inference_platform(&config).await?);
    }

    Ok(workflow)
}
