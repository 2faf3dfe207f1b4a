mod checkpoint;
mod config;
mod diagnostics;
mod host;
mod logger;
mod migrate;
mod orchestrator;
mod runner;
mod update_transform;

pub use checkpoint::{CheckpointController, CheckpointOutcome};
pub use config::{UpdateConfig, DISABLE_VERSION_CHECK_ENV, REGISTRY_ENV};
pub use diagnostics::write_error_to_log_file;
pub use host::{
    FollowUpMigration, ProcessTransformHost, RoutingHost, TransformEvent, TransformFailure,
    TransformHost, TransformReport, TransformRequest,
};
pub use logger::{LogLevel, Logger};
pub use migrate::{HaltReason, MigrationExecutor, SequenceOutcome};
pub use orchestrator::{UpdateCommand, UpdateOptions, UpdateOutcome};
pub use runner::{ExecutionResult, TransformRunner};
pub use update_transform::{
    BuiltinUpdateTransform, UpdateTransformOptions, UPDATE_COLLECTION, UPDATE_TRANSFORM,
};
