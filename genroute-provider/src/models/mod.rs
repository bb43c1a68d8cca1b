//! Built-in model catalog.
//!
//! One [`ModelAdapter`] per model family, with pricing from [`pricing`].
//! [`default_registry`] registers all of them.

pub mod image;
pub mod params;
pub mod pricing;
pub mod styles;
pub mod video;

pub use image::{KusaStyle, KusaXl, Seedream, SeedreamVersion};
pub use video::{
    ActTwo, InBetween, Minimax, Ray, RayFlashModify, RayFlashModifyLuma, SeedanceTextToVideo,
    VideoUpscale, ViduTextToVideo, Wan,
};

use genroute_core::error::GenError;
use genroute_core::registry::{ModelAdapter, ModelRegistry};

/// Registry keys of the built-in models
pub mod ids {
    use genroute_core::types::ModelId;

    pub const MINIMAX: ModelId = ModelId(1);
    pub const RAY: ModelId = ModelId(2);
    pub const WAN: ModelId = ModelId(4);
    pub const VIDEO_UPSCALE: ModelId = ModelId(18);
    pub const IN_BETWEEN: ModelId = ModelId(20);
    /// Ray 2 Flash modify on fal
    pub const RAY_FLASH_MODIFY: ModelId = ModelId(23);
    pub const ACT_TWO: ModelId = ModelId(24);
    /// Ray 2 Flash modify on Luma, fallback for [`RAY_FLASH_MODIFY`]
    pub const RAY_FLASH_MODIFY_LUMA: ModelId = ModelId(26);
    pub const SEEDANCE_TEXT_TO_VIDEO: ModelId = ModelId(27);
    pub const VIDU_TEXT_TO_VIDEO: ModelId = ModelId(33);
    pub const SEEDREAM: ModelId = ModelId(47);
    pub const SEEDREAM_EDIT: ModelId = ModelId(48);
    pub const KUSAXL: ModelId = ModelId(52);
    pub const SEEDREAM_V4: ModelId = ModelId(60);
    pub const SEEDREAM_V4_EDIT: ModelId = ModelId(61);
}

/// Every built-in adapter
pub fn builtin_models() -> Vec<Box<dyn ModelAdapter>> {
    vec![
        Box::new(Minimax),
        Box::new(Ray),
        Box::new(Wan),
        Box::new(VideoUpscale),
        Box::new(InBetween),
        Box::new(RayFlashModify::default()),
        Box::new(RayFlashModifyLuma),
        Box::new(ActTwo),
        Box::new(SeedanceTextToVideo),
        Box::new(ViduTextToVideo::default()),
        Box::new(Seedream::create(SeedreamVersion::V45)),
        Box::new(Seedream::edit(SeedreamVersion::V45)),
        Box::new(Seedream::create(SeedreamVersion::V4)),
        Box::new(Seedream::edit(SeedreamVersion::V4)),
        Box::new(KusaXl::default()),
    ]
}

/// Registry holding the built-in catalog
pub fn default_registry() -> Result<ModelRegistry, GenError> {
    builtin_models()
        .into_iter()
        .fold(ModelRegistry::builder(), |builder, model| {
            builder.register_arc(model.into())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_closed() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 15);

        for model in registry.iter() {
            if let Some(policy) = model.fallback_policy() {
                assert!(registry.contains(policy.target), "{}", model.id());
            }
            for target in model.redirect_targets() {
                assert!(registry.contains(*target), "{}", model.id());
            }
        }
    }

    #[test]
    fn test_ids_match_adapters() {
        let registry = default_registry().unwrap();
        for id in registry.ids() {
            assert_eq!(registry.resolve(id).unwrap().id(), id);
        }
        assert_eq!(registry.resolve(ids::SEEDREAM_V4_EDIT).unwrap().platform(), "fal");
    }
}
