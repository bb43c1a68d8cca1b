//! # genroute core
//!
//! Core abstractions and runtime for generation dispatch and task
//! reconciliation.
//!
//! This crate provides the model registry, the prompt middleware pipeline,
//! the fallback-aware dispatcher and the task poller, together with the
//! boundary traits (`Provider`, `JobBoard`, prompt lookups) concrete
//! integrations implement.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod layer;
pub mod middleware;
pub mod provider;
pub mod registry;
pub mod task;
pub mod types;

// Re-exports
pub use config::{DispatchConfig, ExampleEntry, GenrouteConfig, PollerConfig, Surcharges};
pub use dispatch::{Dispatcher, DispatcherBuilder};
pub use error::{Delivery, ErrorCode, GenError};
pub use layer::{Layer, LayeredProvider};
pub use middleware::{
    CharacterDirectory, CharacterProfile, Enhancer, PipelineOutput, Portrait, PromptDraft,
    PromptPipeline, PromptSource, PromptStage, StageKind, StageOutcome, Translator,
};
pub use provider::Provider;
pub use registry::{
    FallbackPolicy, ModelAdapter, ModelRegistry, ModelRegistryBuilder, ParamsOverride,
    TransformContext,
};
pub use task::{
    classify_failure, EntryStatus, FailureKind, JobBoard, MemoryJobBoard, Notification,
    NotificationKind, Notifications, PollOutcome, RecoveryAction, StatusQuery, SubmitReceipt,
    SubmitRejection, Task, TaskId, TaskManager, TaskManagerBuilder, TaskStatus, TaskSubmitter,
    VisibleEntry,
};
pub use types::*;

/// Result type alias for genroute operations
pub type Result<T> = std::result::Result<T, GenError>;
