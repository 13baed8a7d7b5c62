//! Operation names and argument validation
//!
//! The command surface is a closed set of [`Operation`]s. Raw CLI arguments
//! are checked into an [`Invocation`] before any collaborator is built, so a
//! bad operation name or a missing argument never reaches the network.

use crate::artifact::ModelId;
use crate::config::PackagerConfig;
use crate::error::{PackagerError, PackagerResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SaveAndUploadViaTempdir,
    SaveToDisk,
    UploadFromDisk,
    CreateModel,
    DeployModel,
    Predict,
    UndeployModel,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::SaveAndUploadViaTempdir,
        Operation::SaveToDisk,
        Operation::UploadFromDisk,
        Operation::CreateModel,
        Operation::DeployModel,
        Operation::Predict,
        Operation::UndeployModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SaveAndUploadViaTempdir => "save_and_upload_model_via_tempdir",
            Operation::SaveToDisk => "save_model_to_disk",
            Operation::UploadFromDisk => "upload_model_from_disk",
            Operation::CreateModel => "sagemaker_create_model",
            Operation::DeployModel => "sagemaker_deploy_model",
            Operation::Predict => "sagemaker_predict",
            Operation::UndeployModel => "sagemaker_undeploy_model",
        }
    }

    pub fn needs_source(&self) -> bool {
        matches!(self, Operation::SaveAndUploadViaTempdir | Operation::SaveToDisk)
    }

    pub fn needs_store(&self) -> bool {
        matches!(self, Operation::SaveAndUploadViaTempdir | Operation::UploadFromDisk)
    }

    pub fn needs_platform(&self) -> bool {
        matches!(
            self,
            Operation::CreateModel
                | Operation::DeployModel
                | Operation::Predict
                | Operation::UndeployModel
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PackagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                PackagerError::config(format!("function name '{}' is not recognised", s))
            })
    }
}

/// Raw command-line arguments
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommandArgs {
    /// Operation to run (e.g. save_model_to_disk, sagemaker_create_model)
    pub operation: String,

    /// Full name of the model on HuggingFace, e.g. deepseek-ai/DeepSeek-R1-Distill-Qwen-14B
    /// (the endpoint name for sagemaker_predict / sagemaker_undeploy_model)
    pub model_name: String,

    /// Root directory where all models are stored; the model goes in <models_dir>/<model_name>
    #[arg(long, alias = "models_dir")]
    pub models_dir: Option<PathBuf>,

    /// Directory holding one specific model's files
    #[arg(long, alias = "model_dir")]
    pub model_dir: Option<PathBuf>,

    /// SageMaker instance type for sagemaker_deploy_model
    #[arg(long)]
    pub instance_type: Option<String>,

    /// Endpoint name for sagemaker_predict / sagemaker_undeploy_model
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Prompt text for sagemaker_predict
    #[arg(long)]
    pub input: Option<String>,
}

/// A validated request for one operation
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    SaveAndUploadViaTempdir {
        model_id: ModelId,
    },
    SaveToDisk {
        model_id: ModelId,
        dir: PathBuf,
    },
    UploadFromDisk {
        model_id: ModelId,
        dir: PathBuf,
    },
    CreateModel {
        model_id: ModelId,
    },
    DeployModel {
        model_id: ModelId,
        instance_type: Option<String>,
    },
    Predict {
        endpoint: String,
        input: String,
    },
    UndeployModel {
        endpoint: String,
    },
}

impl Invocation {
    pub fn from_args(args: &CommandArgs, config: &PackagerConfig) -> PackagerResult<Self> {
        let operation: Operation = args.operation.parse()?;

        let invocation = match operation {
            Operation::SaveAndUploadViaTempdir => Invocation::SaveAndUploadViaTempdir {
                model_id: ModelId::new(&args.model_name)?,
            },
            Operation::SaveToDisk => {
                let model_id = ModelId::new(&args.model_name)?;
                // An explicit model directory wins over a models root
                let dir = match (&args.model_dir, &args.models_dir) {
                    (Some(dir), _) => dir.clone(),
                    (None, Some(root)) => root.join(model_id.as_str()),
                    (None, None) => config.models_dir.join(model_id.as_str()),
                };
                Invocation::SaveToDisk { model_id, dir }
            }
            Operation::UploadFromDisk => Invocation::UploadFromDisk {
                model_id: ModelId::new(&args.model_name)?,
                dir: args.model_dir.clone().ok_or_else(|| {
                    PackagerError::config(format!("{} requires --model-dir", operation))
                })?,
            },
            Operation::CreateModel => Invocation::CreateModel {
                model_id: ModelId::new(&args.model_name)?,
            },
            Operation::DeployModel => Invocation::DeployModel {
                model_id: ModelId::new(&args.model_name)?,
                instance_type: args.instance_type.clone(),
            },
            Operation::Predict => Invocation::Predict {
                endpoint: endpoint_arg(args, operation)?,
                input: args.input.clone().ok_or_else(|| {
                    PackagerError::config(format!("{} requires --input", operation))
                })?,
            },
            Operation::UndeployModel => Invocation::UndeployModel {
                endpoint: endpoint_arg(args, operation)?,
            },
        };

        Ok(invocation)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Invocation::SaveAndUploadViaTempdir { .. } => Operation::SaveAndUploadViaTempdir,
            Invocation::SaveToDisk { .. } => Operation::SaveToDisk,
            Invocation::UploadFromDisk { .. } => Operation::UploadFromDisk,
            Invocation::CreateModel { .. } => Operation::CreateModel,
            Invocation::DeployModel { .. } => Operation::DeployModel,
            Invocation::Predict { .. } => Operation::Predict,
            Invocation::UndeployModel { .. } => Operation::UndeployModel,
        }
    }
}

fn endpoint_arg(args: &CommandArgs, operation: Operation) -> PackagerResult<String> {
    let endpoint = args.endpoint.as_deref().unwrap_or(&args.model_name);
    if endpoint.trim().is_empty() {
        return Err(PackagerError::config(format!(
            "{} requires an endpoint name",
            operation
        )));
    }
    Ok(endpoint.to_string())
}
