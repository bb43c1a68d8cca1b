//! Image model families.

use async_trait::async_trait;
use genroute_core::error::GenError;
use genroute_core::middleware::Portrait;
use genroute_core::registry::{ModelAdapter, TransformContext};
use genroute_core::types::{GenerationRequest, ModelId, TaskType, Transformed};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::ids;
use super::params::image_size;
use super::pricing;
use super::styles::general_style_prompt;

/// `[style-tag]` markers inside a prompt
static STYLE_TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[.*?\]").ok());

fn strip_style_tags(prompt: &str) -> String {
    match STYLE_TAG.as_ref() {
        Some(re) => re.replace_all(prompt, "").into_owned(),
        None => prompt.to_string(),
    }
}

/// Seedream release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedreamVersion {
    V4,
    V45,
}

/// Seedream text-to-image and edit.
///
/// The create variant redirects to its edit variant as soon as the payload
/// carries reference images.
#[derive(Debug)]
pub struct Seedream {
    version: SeedreamVersion,
    edit: bool,
    redirects: Vec<ModelId>,
}

impl Seedream {
    pub fn create(version: SeedreamVersion) -> Self {
        Self {
            version,
            edit: false,
            redirects: vec![Self::edit_id(version)],
        }
    }

    pub fn edit(version: SeedreamVersion) -> Self {
        Self {
            version,
            edit: true,
            redirects: Vec::new(),
        }
    }

    fn edit_id(version: SeedreamVersion) -> ModelId {
        match version {
            SeedreamVersion::V4 => ids::SEEDREAM_V4_EDIT,
            SeedreamVersion::V45 => ids::SEEDREAM_EDIT,
        }
    }

    /// Prompt preamble naming every reference image
    fn reference_preamble(count: usize) -> String {
        (1..=count)
            .map(|n| {
                format!(
                    "Input image {n} is a reference image named \"reference_{n}\". When the prompt \
                     mentions \"reference_{n}\" or <reference_{n}>, it refers to this specific \
                     reference image. The generated image should incorporate elements from this \
                     reference image as specified in the prompt."
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Lines tying each portrait to its position in `images`
    fn portrait_preamble(portraits: &[Portrait], images: &[String]) -> String {
        let lines: Vec<String> = portraits
            .iter()
            .filter_map(|portrait| {
                let n = images.iter().position(|image| *image == portrait.image)? + 1;
                Some(format!(
                    "Input image {n} is the portrait of character <{}>.",
                    portrait.character_id
                ))
            })
            .collect();
        if lines.is_empty() {
            return String::new();
        }
        format!(
            "{}\nThe generated image should keep the same identity, appearance, facial \
             features, clothing of the input character images.",
            lines.join("\n")
        )
    }
}

#[async_trait]
impl ModelAdapter for Seedream {
    fn id(&self) -> ModelId {
        match (self.version, self.edit) {
            (SeedreamVersion::V45, false) => ids::SEEDREAM,
            (SeedreamVersion::V45, true) => ids::SEEDREAM_EDIT,
            (SeedreamVersion::V4, false) => ids::SEEDREAM_V4,
            (SeedreamVersion::V4, true) => ids::SEEDREAM_V4_EDIT,
        }
    }

    fn name(&self) -> &str {
        match (self.version, self.edit) {
            (SeedreamVersion::V45, false) => "fal-ai/bytedance/seedream/v4.5/text-to-image",
            (SeedreamVersion::V45, true) => "fal-ai/bytedance/seedream/v4.5/edit",
            (SeedreamVersion::V4, false) => "fal-ai/bytedance/seedream/v4/text-to-image",
            (SeedreamVersion::V4, true) => "fal-ai/bytedance/seedream/v4/edit",
        }
    }

    fn platform(&self) -> &str {
        "fal"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Image
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        let base = match self.version {
            SeedreamVersion::V45 => "Seedream",
            SeedreamVersion::V4 => "Seedream 4",
        };
        if self.edit {
            format!("{} Edit", base)
        } else {
            base.to_string()
        }
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let (width, height) =
            image_size(request, (1024, 1024), (1024, 1024), (768, 1024), (1024, 768));
        let rewritten = ctx.rewrite_prompt(request, None).await;

        let mut init_images = request.strings("init_images");
        for image in rewritten.resolved_images {
            if !init_images.contains(&image) {
                init_images.push(image);
            }
        }

        let mut body = format!(
            "Generate a high quality image with the following prompt: {}",
            strip_style_tags(&rewritten.prompt)
        );
        if let Some(style) = general_style_prompt(&rewritten.prompt) {
            body.push(' ');
            body.push_str(style);
        }
        let mut sections = vec![
            Self::reference_preamble(init_images.len()),
            Self::portrait_preamble(&rewritten.portraits, &init_images),
        ];
        sections.retain(|section| !section.is_empty());
        sections.push(body);
        let prompt = sections.join("\n");

        let mut payload = json!({
            "prompt": prompt,
            "image_size": { "width": width, "height": height },
            "enable_safety_checker": false,
        });

        let redirect = if init_images.is_empty() && !self.edit {
            None
        } else {
            payload["image_urls"] = json!(init_images);
            (!self.edit).then(|| Self::edit_id(self.version))
        };
        Ok(Transformed::new(payload).with_redirect(redirect))
    }

    async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(match self.version {
            SeedreamVersion::V45 => pricing::IMAGE_SEEDREAM,
            SeedreamVersion::V4 => pricing::IMAGE_SEEDREAM_V4,
        })
    }

    fn redirect_targets(&self) -> &[ModelId] {
        &self.redirects
    }
}

/// Kusa style tags and their style ids
const KUSA_STYLES: &[(&str, &str)] = &[
    ("[vibrant-anime-style]", "1"),
    ("[high-contrast-glossy-style]", "2"),
    ("[lacquered-illustration-style]", "3"),
    ("[soft-pastel-style]", "4"),
    ("[soft-light-illustration-style]", "6"),
    ("[irasutoya-style]", "8"),
    ("[doodle-style]", "9"),
    ("[chibi-sticker-style]", "11"),
    ("[iridescent-style]", "12"),
    ("[toon-shaded-style]", "14"),
    ("[soft-glossy-style]", "15"),
    ("[grayscale-manga-style]", "16"),
    ("[soft-shading-style]", "17"),
    ("[3d-anime-style]", "18"),
    ("[thick-outline-style]", "19"),
    ("[flat-chibi-style]", "26"),
    ("[watercolor-illustration-style]", "37"),
    ("[flat-illustration-style]", "38"),
    ("[action-manga-style]", "48"),
    ("[minimalist-style]", "53"),
    ("[glossy-anime-style]", "70"),
    ("[retro-anime-style]", "86"),
    ("[flat-anime-style]", "94"),
    ("[bright-anime-style]", "95"),
    ("[pop-anime-style]", "96"),
];

/// Style used when a prompt carries no known tag
pub const KUSA_DEFAULT_STYLE: &str = "70";

/// Style id named by the first `[tag]` in `prompt`
pub fn kusa_style_id(prompt: &str) -> &'static str {
    STYLE_TAG
        .as_ref()
        .and_then(|re| re.find(prompt))
        .and_then(|tag| {
            KUSA_STYLES
                .iter()
                .find(|(value, _)| *value == tag.as_str())
                .map(|(_, id)| *id)
        })
        .unwrap_or(KUSA_DEFAULT_STYLE)
}

/// How a Kusa model picks its style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KusaStyle {
    /// Keep tags in the prompt and use a fixed style
    Fixed(&'static str),
    /// Strip tags from the prompt and derive the style from the first one
    FromTags,
}

/// KusaXL anime text-to-image
#[derive(Debug)]
pub struct KusaXl {
    style: KusaStyle,
}

impl Default for KusaXl {
    fn default() -> Self {
        Self {
            style: KusaStyle::Fixed("1"),
        }
    }
}

impl KusaXl {
    pub fn with_style(style: KusaStyle) -> Self {
        Self { style }
    }
}

#[async_trait]
impl ModelAdapter for KusaXl {
    fn id(&self) -> ModelId {
        ids::KUSAXL
    }

    fn name(&self) -> &str {
        "kusa-xl"
    }

    fn platform(&self) -> &str {
        "kusa"
    }

    fn task_type(&self) -> TaskType {
        TaskType::Image
    }

    fn alias(&self, _request: &GenerationRequest) -> String {
        "KusaXL".to_string()
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        ctx: &TransformContext,
    ) -> Result<Transformed, GenError> {
        let rewritten = ctx.rewrite_prompt(request, None).await.prompt;
        let (prompt, style_id) = match self.style {
            KusaStyle::Fixed(id) => (rewritten, id),
            KusaStyle::FromTags => (strip_style_tags(&rewritten), kusa_style_id(&rewritten)),
        };
        let (width, height) =
            image_size(request, (960, 1680), (1024, 1024), (1152, 768), (768, 1152));

        Ok(Transformed::new(json!({
            "task_type": "TEXT_TO_IMAGE",
            "params": {
                "prompt": format!("{}, rating:general", prompt),
                "style_id": style_id,
                "width": width,
                "height": height,
                "negative_prompt": request.get_str("negative_prompt").unwrap_or_default(),
                "amount": 1,
            }
        })))
    }

    async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
        Ok(pricing::IMAGE_KUSAXL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genroute_core::middleware::{
        PromptDraft, PromptPipeline, PromptStage, StageKind, StageOutcome,
    };
    use genroute_core::types::RequestContext;
    use serde_json::Value;
    use std::sync::Arc;

    fn req(value: Value) -> GenerationRequest {
        GenerationRequest::from_value(value).unwrap()
    }

    fn ctx(id: ModelId) -> TransformContext {
        TransformContext::new(Arc::new(PromptPipeline::default()), RequestContext::new(id))
    }

    #[tokio::test]
    async fn test_seedream_without_references_stays() {
        let model = Seedream::create(SeedreamVersion::V45);
        let out = model
            .transform(&req(json!({"prompt": "a cat [glossy]"})), &ctx(ids::SEEDREAM))
            .await
            .unwrap();
        assert_eq!(out.redirect, None);
        assert_eq!(out.payload.array_len("image_urls"), 0);
        assert_eq!(
            out.payload.get("prompt"),
            Some(&json!("Generate a high quality image with the following prompt: a cat "))
        );
    }

    #[tokio::test]
    async fn test_seedream_redirects_to_edit_with_references() {
        let model = Seedream::create(SeedreamVersion::V4);
        let out = model
            .transform(
                &req(json!({"prompt": "restyle", "init_images": ["ref.png"], "size": "landscape"})),
                &ctx(ids::SEEDREAM_V4),
            )
            .await
            .unwrap();
        assert_eq!(out.redirect, Some(ids::SEEDREAM_V4_EDIT));
        assert_eq!(out.payload.array_len("image_urls"), 1);
        assert_eq!(
            out.payload.get("image_size"),
            Some(&json!({"width": 768, "height": 1024}))
        );
        let prompt = out.payload.get("prompt").and_then(Value::as_str).unwrap();
        assert!(prompt.starts_with("Input image 1 is a reference image named \"reference_1\"."));
        assert_eq!(model.redirect_targets(), &[ids::SEEDREAM_V4_EDIT]);
    }

    #[derive(Debug)]
    struct CastLuna;

    #[async_trait]
    impl PromptStage for CastLuna {
        fn name(&self) -> &str {
            "cast"
        }

        fn kind(&self) -> StageKind {
            StageKind::Mention
        }

        async fn apply(&self, mut draft: PromptDraft, _ctx: &RequestContext) -> StageOutcome {
            draft.prompt = draft.prompt.replace("@luna", "a grey cat");
            draft.images.push("https://cdn/luna.png".to_string());
            draft.portraits.push(Portrait {
                character_id: "luna".to_string(),
                image: "https://cdn/luna.png".to_string(),
            });
            StageOutcome::Continue(draft)
        }
    }

    #[tokio::test]
    async fn test_seedream_prompt_names_portraits_and_style() {
        let model = Seedream::create(SeedreamVersion::V45);
        let pipeline = PromptPipeline::new(vec![Arc::new(CastLuna)]);
        let ctx = TransformContext::new(Arc::new(pipeline), RequestContext::new(ids::SEEDREAM));
        let request = req(json!({
            "prompt": "@luna on a hill [pop-anime-style]",
            "init_images": ["ref.png"],
            "meta_data": {"need_middleware": true},
        }));

        let out = model.transform(&request, &ctx).await.unwrap();
        assert_eq!(
            out.payload.get("image_urls"),
            Some(&json!(["ref.png", "https://cdn/luna.png"]))
        );
        let prompt = out.payload.get("prompt").and_then(Value::as_str).unwrap();
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("Input image 2 is a reference image"));
        assert_eq!(lines[2], "Input image 2 is the portrait of character <luna>.");
        assert!(lines[3].starts_with("The generated image should keep the same identity"));
        assert!(lines[4].starts_with(
            "Generate a high quality image with the following prompt: a grey cat on a hill "
        ));
        assert!(lines[4].ends_with(
            "Use flat coloring, and flat cel-shading. Do not include text or any watermark."
        ));
        assert!(!prompt.contains("[pop-anime-style]"));
    }

    #[tokio::test]
    async fn test_seedream_edit_never_redirects() {
        let model = Seedream::edit(SeedreamVersion::V45);
        let out = model
            .transform(&req(json!({"prompt": "p", "image": "a.png"})), &ctx(ids::SEEDREAM_EDIT))
            .await
            .unwrap();
        assert_eq!(out.redirect, None);
        assert_eq!(out.payload.array_len("image_urls"), 1);
        assert!(model.redirect_targets().is_empty());
        assert_eq!(model.alias(&GenerationRequest::new()), "Seedream Edit");
    }

    #[test]
    fn test_kusa_style_from_first_tag() {
        assert_eq!(kusa_style_id("girl [doodle-style] [3d-anime-style]"), "9");
        assert_eq!(kusa_style_id("girl [unknown]"), KUSA_DEFAULT_STYLE);
        assert_eq!(kusa_style_id("girl"), KUSA_DEFAULT_STYLE);
    }

    #[tokio::test]
    async fn test_kusa_payload() {
        let request = req(json!({"prompt": "girl [doodle-style]", "size": "portrait"}));

        let out = KusaXl::default().transform(&request, &ctx(ids::KUSAXL)).await.unwrap();
        let params = out.payload.get("params").unwrap();
        assert_eq!(params["prompt"], json!("girl [doodle-style], rating:general"));
        assert_eq!(params["style_id"], json!("1"));
        assert_eq!(params["width"], json!(768));
        assert_eq!(params["amount"], json!(1));

        let out = KusaXl::with_style(KusaStyle::FromTags)
            .transform(&request, &ctx(ids::KUSAXL))
            .await
            .unwrap();
        let params = out.payload.get("params").unwrap();
        assert_eq!(params["prompt"], json!("girl , rating:general"));
        assert_eq!(params["style_id"], json!("9"));
    }

    #[tokio::test]
    async fn test_kusa_default_size() {
        let out = KusaXl::default()
            .transform(&req(json!({"prompt": "p"})), &ctx(ids::KUSAXL))
            .await
            .unwrap();
        let params = out.payload.get("params").unwrap();
        assert_eq!((params["width"].clone(), params["height"].clone()), (json!(960), json!(1680)));
    }
}
