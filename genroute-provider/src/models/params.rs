//! Request helpers shared by the model families.

use genroute_core::error::GenError;
use genroute_core::types::GenerationRequest;
use serde_json::{json, Value};

/// Start and optional end frame of an image-to-video request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frames {
    pub first: String,
    pub last: Option<String>,
}

impl Frames {
    /// Resolve frames from `end_frame`, `image` or a two-image `images` list.
    ///
    /// `end_frame` wins; otherwise a single `image` is a start frame only;
    /// otherwise `images` must hold at least a start and an end frame.
    pub fn from_request(request: &GenerationRequest) -> Result<Self, GenError> {
        let images = request.images();

        if let Some(end) = request.get_str("end_frame") {
            let first = request
                .image()
                .map(str::to_string)
                .or_else(|| images.first().cloned())
                .ok_or_else(|| {
                    GenError::invalid_params("First frame image is required when end_frame is provided")
                })?;
            return Ok(Self {
                first,
                last: Some(end.to_string()),
            });
        }

        if let Some(image) = request.image() {
            return Ok(Self {
                first: image.to_string(),
                last: None,
            });
        }

        match images.as_slice() {
            [first, last, ..] => Ok(Self {
                first: first.clone(),
                last: Some(last.clone()),
            }),
            _ => Err(GenError::invalid_params("Please provide 2 images")),
        }
    }

    /// Write `image_url` and, when present, `end_image_url`
    pub fn write(&self, payload: &mut Value) {
        payload["image_url"] = json!(self.first);
        if let Some(last) = &self.last {
            payload["end_image_url"] = json!(last);
        }
    }
}

/// String field with a default
pub fn text_or(request: &GenerationRequest, key: &str, default: &str) -> String {
    request.get_str(key).unwrap_or(default).to_string()
}

/// Field forwarded as a string whether it arrived as text or a number
pub fn text_value_or(request: &GenerationRequest, key: &str, default: &str) -> String {
    match request.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

/// Preset prompt followed by the caller's prompt when it is long enough to
/// carry meaning
pub fn preset_with_prompt(request: &GenerationRequest) -> Option<String> {
    let preset = request.meta().preset_prompt;
    let prompt = request.prompt().filter(|p| p.chars().count() >= 3);
    match (preset, prompt) {
        (Some(preset), Some(prompt)) => Some(format!("{} {}", preset, prompt)),
        (Some(preset), None) => Some(preset),
        (None, Some(prompt)) => Some(prompt.to_string()),
        (None, None) => None,
    }
}

/// Named size presets with an explicit `{width, height}` escape hatch
pub fn image_size(
    request: &GenerationRequest,
    default: (u32, u32),
    square: (u32, u32),
    landscape: (u32, u32),
    portrait: (u32, u32),
) -> (u32, u32) {
    match request.get("size") {
        Some(Value::String(s)) if s == "square" => square,
        Some(Value::String(s)) if s == "landscape" => landscape,
        Some(Value::String(s)) if s == "portrait" => portrait,
        Some(Value::Object(size)) => {
            let dim = |key: &str| {
                size.get(key)
                    .and_then(Value::as_u64)
                    .filter(|v| *v > 0)
                    .map(|v| v as u32)
            };
            match (dim("width"), dim("height")) {
                (Some(width), Some(height)) => (width, height),
                _ => default,
            }
        }
        _ => default,
    }
}
