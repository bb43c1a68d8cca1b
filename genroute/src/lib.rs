//! # genroute
//!
//! Generation dispatch and task reconciliation.
//!
//! genroute turns a caller request plus a model id into one or more
//! asynchronous generation tasks, and then tracks those tasks until they
//! reach a terminal status.
//!
//! ## Features
//!
//! - **Typed model catalog**: one `ModelAdapter` per model, held in an
//!   immutable registry that is checked for dangling references at build time
//! - **Prompt middleware**: mention, style, translate and enhance stages that
//!   degrade instead of failing
//! - **Single-hop fallback**: a failed submission is re-dispatched at most once
//! - **Composable layers**: wrap the submit boundary with logging and retry
//! - **Reconciliation**: a timer-driven poller folds status updates into an
//!   ordered visible list and notifies once per task
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! genroute = { version = "0.1", features = ["full"] }
//! ```
//!
//! ```ignore
//! use genroute::prelude::*;
//! use genroute::provider::{default_registry, ids, HttpGateway};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let gateway = HttpGateway::builder()
//!     .base_url("https://gateway.example.com")
//!     .api_key("your-api-key")
//!     .build()?;
//! let board: Arc<dyn JobBoard> = Arc::new(gateway.clone());
//!
//! let dispatcher = Dispatcher::builder(gateway)
//!     .layer(LoggingLayer::new())
//!     .layer(RetryLayer::new())
//!     .registry(default_registry()?)
//!     .finish()?;
//!
//! let (manager, notifications) = TaskManager::builder(board).build();
//! let submitter = TaskSubmitter::new(Arc::new(dispatcher), manager);
//!
//! let request = GenerationRequest::new()
//!     .with("prompt", "a lighthouse at dusk")
//!     .with("image", "https://example.com/start.png");
//! let receipt = submitter.submit(ids::RAY, request).await?;
//! println!("submitted {:?}", receipt.outcome.task_ids);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: `providers`, `layers` and `plugins`
//! - `providers`: HTTP gateway, OpenAI-compatible prompt assist, model catalog
//! - `layers`: built-in layers (logging, retry)
//! - `plugins`: built-in prompt stages
//! - `full`: all features enabled

// Re-export core types and traits
pub use genroute_core::*;

// Re-export providers under `provider` module
#[cfg(feature = "genroute-provider")]
pub mod provider {
    //! Gateway client, prompt assist and the built-in model catalog.
    pub use genroute_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "genroute-layer")]
pub mod layer {
    //! Built-in provider layers.
    pub use genroute_layer::*;
}

// Re-export plugins under `plugin` module
#[cfg(feature = "genroute-plugin")]
pub mod plugin {
    //! Built-in prompt stages and lookup sources.
    pub use genroute_plugin::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use genroute::prelude::*;
    //! ```

    pub use crate::{
        Dispatcher, FallbackPolicy, GenError, GenerationRequest, JobBoard, Layer, ModelAdapter,
        ModelId, ModelRegistry, Notification, PromptStage, Provider, Result, TaskId, TaskManager,
        TaskStatus, TaskSubmitter, VisibleEntry,
    };

    #[cfg(feature = "genroute-layer")]
    pub use crate::layer::*;

    #[cfg(feature = "genroute-plugin")]
    pub use crate::plugin::*;
}
