//! Dispatch layer.
//!
//! The dispatcher sits between callers and the submit boundary:
//! - resolves a model and computes its cost
//! - transforms the request, running the prompt pipeline where asked
//! - follows a transform's redirect to the model actually called
//! - submits through the layered provider, falling back at most once

pub mod executor;

pub use executor::{Dispatcher, DispatcherBuilder};
