//! Video model families.

use async_trait::async_trait;
use genroute_core::error::GenError;
use genroute_core::registry::{FallbackPolicy, ModelAdapter, TransformContext};
use genroute_core::types::{GenerationRequest, ModelId, TaskType, Transformed};
use serde_json::{json, Map, Value};

use super::ids;
use super::params::{preset_with_prompt, text_or, text_value_or, Frames};
use super::pricing;

/// Longest clip the Ray Flash modify models accept, in seconds
pub const RAY_FLASH_MAX_DURATION: f64 = 15.0;
pub const ACT_TWO_MIN_DURATION: f64 = 3.0;
pub const ACT_TWO_MAX_DURATION: f64 = 30.0;

/// Style suffixes for text-to-video, indexed by numeric `style_id`
const VIDEO_STYLE_PROMPTS: &[&str] = &[
    "Generate in the style of 2d modern anime made in Japan with clean line art and vibrant colors.",
    "",
    "Generate in Studio Ghibli 2d anime style.",
    "Generate in the style of retro 1990s anime made in 90s Japan with bold line art, slightly muted yet saturated colors, hand-painted cel shading, and film grain texture.",
    "Generate high-quality 2D Japanese anime film with high details. Render the scene in a mystical visual style with ethereal lighting, subtle glowing particles, and mystical and ethereal atmosphere, and slight blue and purple-ish theme.",
    "Generate the 2d anime in horror thriller style with black and red coloring.",
    "Generate in Disney Pixar 3d animation style.",
    "Generate in the style of western 2d cartoon with bold outlines, simplified yet expressive character designs, vibrant flat colors, and exaggerated poses.",
    "Use the kawaii hand-drawn anime style with pastel colors and kawaii elements and hand-drawn elements and sketchy lines.",
    "Generate the animation in Japanese black and white manga style with black and white manga lines, manga panels, speech bubbles, and gliches.",
    "Generate in the style of a cinematic movie with dramatic lighting and a sense of depth and atmosphere. Use dynamic camera angles, rich colors, and a storytelling tone.",
    "Generate in the style of black and white Chinese ink wash animation.",
    "Generate in cyberpunk style with neon lights and cyberpunk visual.",
    "Generate in the style of claymation (clay animation), with handcrafted clay textures, stop-motion aesthetics, and expressive, tactile character designs that look sculpted from real clay.",
    "Generate in the style of simple hand-drawn line animation. Use clean black lines, simple background, simple flat coloring, with minimal details and no shading. The characters and objects should be drawn simple yet expressive.",
];

/// Style suffix for the request's top-level `style_id`, if it names one
pub fn video_style_prompt(request: &GenerationRequest) -> Option<&'static str> {
    let index = request.number("style_id")?;
    if index < 0.0 || index.fract() != 0.0 {
        return None;
    }
    VIDEO_STYLE_PROMPTS
        .get(index as usize)
        .copied()
        .filter(|s| !s.is_empty())
}

fn require_image_and_video<'a>(
    request: &'a GenerationRequest,
    message: &str,
) -> Result<(&'a str, &'a str), GenError> {
    match (request.image(), request.get_str("video")) {
        (Some(image), Some(video)) => Ok((image, video)),
        _ => Err(GenError::invalid_params(message)),
    }
}

fn check_ray_flash_duration(request: &GenerationRequest) -> Result<(), GenError> {
    let selected = request.number("selectedDuration").unwrap_or(5.0);
    if selected > RAY_FLASH_MAX_DURATION {
        return Err(GenError::invalid_params(
            "Video duration must be between 1 and 15 seconds",
        ));
    }
    Ok(())
}

/// Hailuo image-to-video, start frame with an optional end frame
#[derive(Debug, Default)]
pub struct Minimax;

#[async_trait]
impl ModelAdapter for Minimax {
    fn id(&self) -> ModelId {
        ids::MINIMAX
    }

    fn name(&self) -> &str {
        "fal-ai/minimax/hailuo-02/standard/image-to-video"
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Hailuo 02".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let prompt = request
            .prompt()
            .filter(|_| request.has_image())
            .ok_or_else(|| GenError::invalid_params("Invalid params"))?;
        let frames = Frames::from_request(request)?;

        let mut payload = json!({ "prompt": prompt });
        frames.write(&mut payload);
        Ok(Transformed::new(payload))
    }

    async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::IMAGE_TO_VIDEO_MINIMAX)
    }
}

/// Luma Ray 2 image-to-video
#[derive(Debug, Default)]
pub struct Ray;

#[async_trait]
impl ModelAdapter for Ray {
    fn id(&self) -> ModelId {
        ids::RAY
    }

    fn name(&self) -> &str {
        "fal-ai/luma-dream-machine/ray-2/image-to-video"
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Luma Ray 2".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        if !request.has_image() {
            return Err(GenError::invalid_params("Image is required"));
        }
        let frames = Frames::from_request(request)?;

        let mut payload = json!({
            "prompt": request.prompt(),
            "aspect_ratio": text_or(request, "aspect_ratio", "16:9"),
        });
        frames.write(&mut payload);
        Ok(Transformed::new(payload))
    }

    async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::IMAGE_TO_VIDEO_RAY)
    }
}

/// Wan image-to-video.
///
/// Effect and template modes take their prompt from the middleware
/// pipeline, which runs for them even without `need_middleware`.
#[derive(Debug, Default)]
pub struct Wan;

impl Wan {
    fn is_template_mode(request: &GenerationRequest) -> bool {
        let meta = request.meta();
        matches!(meta.mode.as_deref(), Some("effect" | "template")) && meta.style_id.is_some()
    }
}

#[async_trait]
impl ModelAdapter for Wan {
    fn id(&self) -> ModelId {
        ids::WAN
    }

    fn name(&self) -> &str {
        "wan/v2.6/image-to-video"
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Wan 2.6".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let image = request
            .images()
            .into_iter()
            .next()
            .or_else(|| request.image().map(str::to_string))
            .ok_or_else(|| GenError::invalid_params("Image is required"))?;

        let mut prompt = request.prompt().unwrap_or_default().to_string();
        if Self::is_template_mode(request) {
            let mut forced = request.clone();
            let mut meta = match request.get("meta_data") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            meta.insert("need_middleware".to_string(), Value::Bool(true));
            forced.set("meta_data", Value::Object(meta));
            prompt = ctx.rewrite_prompt(&forced, None).await.prompt;
        }

        Ok(Transformed::new(json!({
            "prompt": prompt,
            "image_url": image,
            "aspect_ratio": text_or(request, "aspect_ratio", "16:9"),
            "resolution": text_or(request, "resolution", "720p"),
            "audio_url": request.get_str("audio"),
            "duration": text_value_or(request, "duration", "5"),
            "multi_shots": request.get("multi_shots"),
            "enable_safety_checker": false,
        })))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::wan(
            request.number("duration"),
            request.get_str("resolution"),
        ))
    }
}

/// Real-ESRGAN video upscaling
#[derive(Debug, Default)]
pub struct VideoUpscale;

#[async_trait]
impl ModelAdapter for VideoUpscale {
    fn id(&self) -> ModelId {
        ids::VIDEO_UPSCALE
    }

    fn name(&self) -> &str {
        "lucataco/real-esrgan-video:c23768236472c41b7a121ee735c8073e29080c01b32907740cfada61bff75320"
    }

    fn platform(&self) -> &str {
        "replicate"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Video Upscale".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let video_path = request
            .get_str("video_path")
            .ok_or_else(|| GenError::invalid_params("Video path is required"))?;
        if !video_path.starts_with("http://") && !video_path.starts_with("https://") {
            return Err(GenError::invalid_params("Video path must be a valid URL"));
        }

        Ok(Transformed::new(json!({
            "video_path": video_path,
            "resolution": request.get("resolution"),
            "duration": request.get("duration"),
        })))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::video_upscale(request.number("duration")))
    }
}

/// Keyframe interpolation between up to five images
#[derive(Debug, Default)]
pub struct InBetween;

/// Keyframes beyond this are ignored
const IN_BETWEEN_MAX_FRAMES: usize = 5;

#[async_trait]
impl ModelAdapter for InBetween {
    fn id(&self) -> ModelId {
        ids::IN_BETWEEN
    }

    fn name(&self) -> &str {
        "fofr/tooncrafter:0486ff07368e816ec3d5c69b9581e7a09b55817f567a0d74caad9395c9295c77"
    }

    fn platform(&self) -> &str {
        "replicate"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "inbetween".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let images = request.images();
        if images.len() < 2 {
            return Err(GenError::invalid_params("At least 2 images are required"));
        }

        let mut payload = json!({
            "prompt": request.prompt(),
            "max_width": 512,
            "max_height": 512,
            "loop": false,
            "interpolate": false,
            "negative_prompt": "",
            "color_correction": true,
        });
        for (index, image) in images.iter().take(IN_BETWEEN_MAX_FRAMES).enumerate() {
            payload[format!("image_{}", index + 1)] = json!(image);
        }
        Ok(Transformed::new(payload))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::in_between(request.images().len()))
    }
}

/// Ray 2 Flash video restyle on fal, falling back to Luma's own API
#[derive(Debug)]
pub struct RayFlashModify {
    fallback: FallbackPolicy,
}

impl Default for RayFlashModify {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::always(ids::RAY_FLASH_MODIFY_LUMA),
        }
    }
}

#[async_trait]
impl ModelAdapter for RayFlashModify {
    fn id(&self) -> ModelId {
        ids::RAY_FLASH_MODIFY
    }

    fn name(&self) -> &str {
        "fal-ai/luma-dream-machine/ray-2-flash/modify"
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "V2V General".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let (image, video) = require_image_and_video(request, "Both image and video are required")?;
        check_ray_flash_duration(request)?;

        let mut payload = json!({
            "image_url": image,
            "video_url": video,
        });
        if let Some(prompt) = preset_with_prompt(request) {
            payload["prompt"] = json!(prompt);
        }
        Ok(Transformed::new(payload))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::video_to_video(
            pricing::RAY_FLASH_PER_SECOND,
            request.number("selectedDuration"),
        ))
    }

    fn fallback_policy(&self) -> Option<&FallbackPolicy> {
        Some(&self.fallback)
    }
}

/// Ray 2 Flash video restyle through Luma's native API
#[derive(Debug, Default)]
pub struct RayFlashModifyLuma;

#[async_trait]
impl ModelAdapter for RayFlashModifyLuma {
    fn id(&self) -> ModelId {
        ids::RAY_FLASH_MODIFY_LUMA
    }

    fn name(&self) -> &str {
        "luma/modify-video"
    }

    fn platform(&self) -> &str {
        "luma"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "V2V General".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let (image, video) = require_image_and_video(request, "Both image and video are required")?;
        check_ray_flash_duration(request)?;

        // Luma rejects an empty prompt
        let prompt = preset_with_prompt(request)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "Video style transfer".to_string());

        let mut payload = json!({
            "prompt": prompt,
            "media": { "url": video },
            "first_frame": { "url": image },
            "model": text_or(request, "model", "ray-flash-2"),
            "mode": "reimagine_1",
            "resolution": text_or(request, "resolution", "720p"),
        });

        let duration = request
            .number("actualDuration")
            .filter(|d| *d != 0.0)
            .or_else(|| request.number("selectedDuration"));
        if let Some(duration) = duration.filter(|d| *d > 0.0) {
            let clamped = duration.floor().clamp(1.0, RAY_FLASH_MAX_DURATION) as u32;
            payload["duration"] = json!(format!("{}s", clamped));
        }
        Ok(Transformed::new(payload))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::video_to_video(
            pricing::RAY_FLASH_PER_SECOND,
            request.number("selectedDuration"),
        ))
    }
}

/// Runway Act-Two performance transfer
#[derive(Debug, Default)]
pub struct ActTwo;

impl ActTwo {
    /// Tool whose clips are always portrait
    const PORTRAIT_TOOL: &'static str = "image_animation";
}

#[async_trait]
impl ModelAdapter for ActTwo {
    fn id(&self) -> ModelId {
        ids::ACT_TWO
    }

    fn name(&self) -> &str {
        "act_two"
    }

    fn platform(&self) -> &str {
        "runway"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "V2V Human Video".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let (image, video) = require_image_and_video(request, "Image and video are required")?;

        let ratio = if request.tool() == Some(Self::PORTRAIT_TOOL) {
            "720:1280".to_string()
        } else {
            request
                .get_str("ratio")
                .map(str::to_string)
                .ok_or_else(|| GenError::invalid_params("Aspect ratio is required"))?
        };

        let too_short = |key: &str| {
            request
                .number(key)
                .is_some_and(|d| d != 0.0 && d < ACT_TWO_MIN_DURATION)
        };
        if too_short("actualDuration") || too_short("selectedDuration") {
            return Err(GenError::invalid_params("Video must be at least 3 seconds"));
        }

        let selected = request
            .number("selectedDuration")
            .filter(|d| *d != 0.0)
            .unwrap_or(ACT_TWO_MIN_DURATION);
        if !(ACT_TWO_MIN_DURATION..=ACT_TWO_MAX_DURATION).contains(&selected) {
            return Err(GenError::invalid_params(format!(
                "Video duration must be between {} and {} seconds",
                ACT_TWO_MIN_DURATION, ACT_TWO_MAX_DURATION
            )));
        }

        Ok(Transformed::new(json!({
            "character": { "type": "image", "uri": image },
            "reference": { "type": "video", "uri": video },
            "bodyControl": true,
            "expressionIntensity": request.number("expressionIntensity").filter(|v| *v != 0.0).unwrap_or(3.0),
            "ratio": ratio,
        })))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::video_to_video(
            pricing::ACT_TWO_PER_SECOND,
            request.number("selectedDuration"),
        ))
    }
}

/// Seedance 1.5 Pro text-to-video, prompt rewritten by the middleware
#[derive(Debug, Default)]
pub struct SeedanceTextToVideo;

#[async_trait]
impl ModelAdapter for SeedanceTextToVideo {
    fn id(&self) -> ModelId {
        ids::SEEDANCE_TEXT_TO_VIDEO
    }

    fn name(&self) -> &str {
        "fal-ai/bytedance/seedance/v1.5/pro/text-to-video"
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Seedance 1.5 Pro Text to Video".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        if request.prompt().is_none() {
            return Err(GenError::invalid_params("prompt is required"));
        }
        let rewritten = ctx
            .rewrite_prompt(request, video_style_prompt(request))
            .await;

        Ok(Transformed::new(json!({
            "prompt": rewritten.prompt,
            "resolution": text_or(request, "resolution", "480p"),
            "duration": text_value_or(request, "duration", "5"),
            "aspect_ratio": text_or(request, "aspect_ratio", "16:9"),
        })))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::seedance(
            request.number("duration"),
            request.get_str("resolution"),
            request.get_str("aspect_ratio"),
        ))
    }
}

/// Anime base text-to-video on Grok Imagine.
///
/// Upstream server errors (`"500"`) fall back to Seedance at 480p/5s.
#[derive(Debug)]
pub struct ViduTextToVideo {
    fallback: FallbackPolicy,
}

impl Default for ViduTextToVideo {
    fn default() -> Self {
        let mut overrides = Map::new();
        overrides.insert("resolution".to_string(), json!("480p"));
        overrides.insert("duration".to_string(), json!("5"));

        Self {
            fallback: FallbackPolicy::when(ids::SEEDANCE_TEXT_TO_VIDEO, |failure| {
                failure.code_is("500")
            })
            .with_override(overrides),
        }
    }
}

#[async_trait]
impl ModelAdapter for ViduTextToVideo {
    fn id(&self) -> ModelId {
        ids::VIDU_TEXT_TO_VIDEO
    }

    fn name(&self) -> &str {
        "grok-imagine/text-to-video"
    }

    fn platform(&self) -> &str {
        "kie"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Video
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "Anime Base Text to Video".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        _ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let prompt = request.prompt().unwrap_or_default();
        let prompt = match video_style_prompt(request) {
            Some(style) => format!("{}. {}", prompt, style),
            None => prompt.to_string(),
        };

        // No aspect ratio: the upstream model rejects it
        Ok(Transformed::new(json!({
            "prompt": prompt,
            "mode": "normal",
        })))
    }

    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::vidu_text_to_video(request.number("duration")))
    }

    fn fallback_policy(&self) -> Option<&FallbackPolicy> {
        Some(&self.fallback)
    }
}
