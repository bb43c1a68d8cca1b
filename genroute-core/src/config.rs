//! Configuration for dispatch and polling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::GenError;
use crate::types::GenerationRequest;

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Webhook the job gateway reports completion to
    pub callback_url: Option<String>,
    /// Upper bound on `num_images` submissions per dispatch
    pub max_outputs: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            max_outputs: 4,
        }
    }
}

/// Sentinel example entry shown at the end of the visible list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleEntry {
    pub output: String,
    #[serde(default)]
    pub prompt: String,
}

/// Poller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub example: Option<ExampleEntry>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            example: None,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Additive cost surcharges keyed by `meta_data.video_pipeline_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Surcharges(HashMap<String, u64>);

impl Default for Surcharges {
    fn default() -> Self {
        Self(HashMap::from([
            ("type2".to_string(), 0),
            ("type3".to_string(), 0),
        ]))
    }
}

impl Surcharges {
    /// No surcharges at all
    pub fn none() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, pipeline_type: impl Into<String>, amount: u64) -> Self {
        self.0.insert(pipeline_type.into(), amount);
        self
    }

    /// Surcharge for a request; unknown or missing tags cost nothing
    pub fn for_request(&self, request: &GenerationRequest) -> u64 {
        request
            .meta()
            .pipeline_type
            .and_then(|tag| self.0.get(&tag).copied())
            .unwrap_or(0)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenrouteConfig {
    pub dispatch: DispatchConfig,
    pub poller: PollerConfig,
    pub surcharges: Surcharges,
}

impl GenrouteConfig {
    /// Parse a JSON document; missing sections take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, GenError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GenError::configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `GENROUTE_*` environment variables
    pub fn from_env() -> Result<Self, GenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GenError> {
        let mut config = Self::default();

        if let Some(url) = lookup("GENROUTE_CALLBACK_URL").filter(|s| !s.is_empty()) {
            config.dispatch.callback_url = Some(url);
        }
        if let Some(raw) = lookup("GENROUTE_POLL_INTERVAL_MS") {
            config.poller.interval_ms = raw.trim().parse().map_err(|_| {
                GenError::configuration(format!("GENROUTE_POLL_INTERVAL_MS is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = lookup("GENROUTE_MAX_OUTPUTS") {
            config.dispatch.max_outputs = raw.trim().parse().map_err(|_| {
                GenError::configuration(format!("GENROUTE_MAX_OUTPUTS is not a number: {}", raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), GenError> {
        if self.poller.interval_ms == 0 {
            return Err(GenError::configuration("poll interval must be positive"));
        }
        if self.dispatch.max_outputs == 0 {
            return Err(GenError::configuration("max_outputs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = GenrouteConfig::from_json_str("{}").unwrap();
        assert_eq!(config.poller.interval(), Duration::from_millis(5000));
        assert_eq!(config.dispatch.max_outputs, 4);
        assert!(config.poller.example.is_none());
    }

    #[test]
    fn test_json_sections() {
        let config = GenrouteConfig::from_json_str(
            r#"{
                "dispatch": {"callback_url": "https://hooks.example/gen"},
                "poller": {"interval_ms": 2000, "example": {"output": "https://cdn/ex.mp4"}},
                "surcharges": {"type2": 30}
            }"#,
        )
        .unwrap();
        assert_eq!(config.dispatch.max_outputs, 4);
        assert_eq!(config.poller.interval_ms, 2000);

        let req = GenerationRequest::from_value(json!({"meta_data": {"video_pipeline_type": "type2"}}))
            .unwrap();
        assert_eq!(config.surcharges.for_request(&req), 30);
        assert_eq!(config.surcharges.for_request(&GenerationRequest::new()), 0);
    }

    #[test]
    fn test_env_lookup() {
        let config = GenrouteConfig::from_lookup(|key| match key {
            "GENROUTE_POLL_INTERVAL_MS" => Some("750".to_string()),
            "GENROUTE_MAX_OUTPUTS" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.poller.interval_ms, 750);
        assert_eq!(config.dispatch.max_outputs, 2);

        let err = GenrouteConfig::from_lookup(|key| {
            (key == "GENROUTE_POLL_INTERVAL_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(GenrouteConfig::from_json_str(r#"{"poller": {"interval_ms": 0}}"#).is_err());
    }
}
