//! # genroute layers
//!
//! Built-in layers for the submit boundary.
//!
//! - `LoggingLayer`: one structured span and outcome event per submission
//! - `RetryLayer`: resubmits jobs the gateway provably never accepted
//!
//! ## Usage
//!
//! ```ignore
//! use genroute_core::Dispatcher;
//! use genroute_layer::{LoggingLayer, RetryLayer};
//!
//! let dispatcher = Dispatcher::builder(gateway)
//!     .layer(LoggingLayer::new())
//!     .layer(RetryLayer::new().max_resubmits(3))
//!     .registry(registry)
//!     .finish()?;
//! ```

pub mod logging;
pub mod retry;

// Re-exports
pub use logging::LoggingLayer;
pub use retry::{Backoff, RetryLayer};
