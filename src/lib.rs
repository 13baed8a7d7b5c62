//! Model Packager - fetch, store and register language model checkpoints
//!
//! Downloads a model's weights and tokenizer from the HuggingFace Hub, stores
//! them on local disk or in S3 under a key prefix derived from the model id,
//! and registers the uploaded artifact with Amazon SageMaker.

pub mod app;
pub mod artifact;
pub mod command;
pub mod config;
pub mod error;
pub mod inference;
pub mod scratch;
pub mod source;
pub mod store;
pub mod workflow;

pub use app::{ClientFactory, DefaultClients};
pub use artifact::{ModelId, RemoteLocation};
pub use command::{CommandArgs, Invocation, Operation};
pub use config::PackagerConfig;
pub use error::{PackagerError, PackagerResult};
pub use inference::{InferencePlatform, ModelRecord, SageMakerPlatform};
pub use scratch::ScratchDir;
pub use source::{HubModelSource, ModelSource};
pub use store::{ObjectStore, S3Store};
pub use workflow::{Outcome, Workflow};
