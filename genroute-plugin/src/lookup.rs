//! In-memory and closure-backed lookup sources.

use async_trait::async_trait;
use dashmap::DashMap;
use genroute_core::error::GenError;
use genroute_core::middleware::{CharacterDirectory, CharacterProfile, PromptSource};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

static PLACEHOLDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{(\w+)\}").ok());

/// Fill `{name}` placeholders from `inputs`; unknown names are left as is
pub fn interpolate(template: &str, inputs: &Map<String, Value>) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures<'_>| match inputs.get(&caps[1]) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => caps[0].to_string(),
        Some(other) => other.to_string(),
    })
    .into_owned()
}

type FetchFuture = Pin<Box<dyn Future<Output = Result<Option<String>, GenError>> + Send>>;

/// Prompt source backed by an async closure
pub struct FnPromptSource {
    name: String,
    fetch: Arc<dyn Fn(String, Map<String, Value>) -> FetchFuture + Send + Sync>,
}

impl std::fmt::Debug for FnPromptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPromptSource")
            .field("name", &self.name)
            .finish()
    }
}

impl FnPromptSource {
    /// Wrap `fetch`, called with the style id and the template inputs
    pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(String, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, GenError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            fetch: Arc::new(move |style_id, inputs| Box::pin(fetch(style_id, inputs))),
        }
    }
}

#[async_trait]
impl PromptSource for FnPromptSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        style_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Option<String>, GenError> {
        (self.fetch)(style_id.to_string(), inputs.clone()).await
    }
}

/// Fixed table of prompt templates keyed by style id
#[derive(Debug, Clone, Default)]
pub struct StaticPromptSource {
    name: String,
    templates: HashMap<String, String>,
}

impl StaticPromptSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: HashMap::new(),
        }
    }

    /// Add a template; `{name}` placeholders are filled from template inputs
    pub fn with(mut self, style_id: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(style_id.into(), template.into());
        self
    }
}

#[async_trait]
impl PromptSource for StaticPromptSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        style_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Option<String>, GenError> {
        Ok(self
            .templates
            .get(style_id)
            .map(|template| interpolate(template, inputs)))
    }
}

/// Character directory held in memory
#[derive(Debug, Default)]
pub struct MemoryCharacterDirectory {
    profiles: DashMap<String, CharacterProfile>,
}

impl MemoryCharacterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn insert(&self, profile: CharacterProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn remove(&self, id: &str) -> Option<CharacterProfile> {
        self.profiles.remove(id).map(|(_, profile)| profile)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl CharacterDirectory for MemoryCharacterDirectory {
    async fn lookup(&self, ids: &[String]) -> Result<Vec<CharacterProfile>, GenError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|entry| entry.value().clone()))
            .collect())
    }
}
