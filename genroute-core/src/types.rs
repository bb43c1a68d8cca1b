//! Core types for generation dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::task::TaskId;

/// Stable registry key of a generation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ModelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// What a model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Image,
    Video,
}

/// Metadata fields with a fixed meaning. Everything else in `meta_data`
/// is a template input.
pub const STANDARD_META_FIELDS: &[&str] = &[
    "need_middleware",
    "style_id",
    "mode",
    "video_pipeline_type",
    "preset_prompt",
    "no_translate",
];

/// Caller-supplied generation parameters.
///
/// A free-form key/value bag. Typed accessors read the well-known keys
/// leniently: numbers may arrive as JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationRequest {
    params: Map<String, Value>,
}

impl GenerationRequest {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request from a JSON object
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(params) => Ok(Self { params }),
            other => Err(crate::GenError::invalid_params(format!(
                "request must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Set a parameter, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set a parameter in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Numeric value, accepting numeric strings
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Truthy boolean flag
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    /// Non-empty list of strings
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.get_str("prompt")
    }

    pub fn image(&self) -> Option<&str> {
        self.get_str("image")
    }

    pub fn images(&self) -> Vec<String> {
        self.strings("images")
    }

    /// Whether any source image was supplied
    pub fn has_image(&self) -> bool {
        self.image().is_some() || !self.images().is_empty()
    }

    pub fn tool(&self) -> Option<&str> {
        self.get_str("tool")
    }

    /// Number of outputs requested (`num_images`), at least one
    pub fn num_outputs(&self) -> u32 {
        self.number("num_images")
            .filter(|n| *n >= 1.0)
            .map(|n| n as u32)
            .unwrap_or(1)
    }

    /// Parsed `meta_data` block
    pub fn meta(&self) -> RequestMeta {
        RequestMeta::from_value(self.get("meta_data"))
    }

    /// Shallow merge: every key of `overrides` replaces the same key here
    pub fn merge(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            self.params.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.params)
    }
}

/// The `meta_data` block of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMeta {
    /// The prompt middleware pipeline runs only when this is set
    pub need_middleware: bool,
    pub style_id: Option<String>,
    pub mode: Option<String>,
    /// Auxiliary pre-processing tag, used to look up cost surcharges
    pub pipeline_type: Option<String>,
    pub preset_prompt: Option<String>,
    pub no_translate: bool,
    /// Non-standard fields, interpolated into style fragments
    pub template_inputs: Map<String, Value>,
}

impl RequestMeta {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };

        let text = |key: &str| match map.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let template_inputs = map
            .iter()
            .filter(|(key, _)| !STANDARD_META_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            need_middleware: matches!(map.get("need_middleware"), Some(Value::Bool(true))),
            style_id: text("style_id"),
            mode: text("mode"),
            pipeline_type: text("video_pipeline_type"),
            preset_prompt: text("preset_prompt"),
            no_translate: matches!(map.get("no_translate"), Some(Value::Bool(true))),
            template_inputs,
        }
    }
}

/// Provider-specific request body produced by a model transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderPayload(pub Value);

impl ProviderPayload {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Length of an array field, zero when absent
    pub fn array_len(&self, key: &str) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Output of a model transform.
///
/// `redirect` names a different model whose name and platform must be used
/// for the provider call while keeping this payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub payload: ProviderPayload,
    pub redirect: Option<ModelId>,
}

impl Transformed {
    pub fn new(payload: Value) -> Self {
        Self {
            payload: ProviderPayload(payload),
            redirect: None,
        }
    }

    pub fn with_redirect(mut self, redirect: Option<ModelId>) -> Self {
        self.redirect = redirect;
        self
    }
}

/// One invocation of the submit boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    pub request_id: String,
    pub model_id: ModelId,
    /// Provider-side model name
    pub model: String,
    pub platform: String,
    pub task_type: TaskType,
    pub payload: ProviderPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub cost: u64,
}

/// Successful submit-boundary response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_ids: Vec<TaskId>,
}

/// Failure information handed to fallback predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FailureDescriptor {
    pub fn code_is(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

/// Provider information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
}

/// Which leg of the fallback state machine an attempt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Primary,
    Fallback,
}

/// Request context passed through transforms and prompt stages
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub model_id: ModelId,
    pub attempt: Attempt,
}

impl RequestContext {
    pub fn new(model_id: ModelId) -> Self {
        Self {
            request_id: format!("temp-{}", uuid::Uuid::new_v4()),
            model_id,
            attempt: Attempt::Primary,
        }
    }

    /// Same request, retargeted at the fallback model
    pub fn for_fallback(&self, model_id: ModelId) -> Self {
        Self {
            request_id: self.request_id.clone(),
            model_id,
            attempt: Attempt::Fallback,
        }
    }
}

/// Final result of a top-level dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Model whose name/platform was actually called
    pub model_id: ModelId,
    pub alias: String,
    /// Cost of one output on the executed descriptor, surcharge included
    pub unit_cost: u64,
    /// Total charged: `unit_cost` for every accepted submission
    pub cost: u64,
    pub task_ids: Vec<TaskId>,
    /// Primary model id when a fallback hop produced this outcome
    pub fallback_from: Option<ModelId>,
}
