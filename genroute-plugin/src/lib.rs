//! # genroute plugins
//!
//! Built-in prompt pipeline stages and lookup sources.

pub mod enhance;
pub mod lookup;
pub mod mention;
pub mod style;
pub mod translate;

// Re-exports
pub use enhance::EnhanceStage;
pub use lookup::{interpolate, FnPromptSource, MemoryCharacterDirectory, StaticPromptSource};
pub use mention::MentionStage;
pub use style::StyleStage;
pub use translate::TranslateStage;
