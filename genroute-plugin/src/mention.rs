//! Character mention resolution.
//!
//! Mentions are written `@character_id` or, in the legacy form,
//! `<character_id>`. Each resolved mention is replaced by the character's
//! prompt text and contributes its portrait to the draft's images.

use async_trait::async_trait;
use genroute_core::middleware::{
    CharacterDirectory, CharacterProfile, Portrait, PromptDraft, PromptStage, StageKind,
    StageOutcome,
};
use genroute_core::types::RequestContext;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

static MENTION: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"@([\w\-().:]+)|<([^>]+)>").ok());

fn mention_id<'a>(caps: &Captures<'a>) -> Option<&'a str> {
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

/// Distinct mentioned ids, in order of first appearance
pub fn mentioned_ids(prompt: &str) -> Vec<String> {
    let Some(re) = MENTION.as_ref() else {
        return Vec::new();
    };
    let mut ids: Vec<String> = Vec::new();
    for caps in re.captures_iter(prompt) {
        if let Some(id) = mention_id(&caps) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// `Momo_Ayase` reads as `Momo Ayase`
pub fn humanize(id: &str) -> String {
    id.replace('_', " ")
}

fn replacement(id: &str, profile: Option<&CharacterProfile>) -> String {
    profile
        .and_then(|p| {
            p.alt_prompt
                .as_deref()
                .filter(|s| !s.is_empty())
                .or_else(|| p.description.as_deref().filter(|s| !s.is_empty()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| humanize(id))
}

fn substitute(prompt: &str, profiles: &HashMap<&str, &CharacterProfile>) -> String {
    let Some(re) = MENTION.as_ref() else {
        return prompt.to_string();
    };
    re.replace_all(prompt, |caps: &Captures<'_>| match mention_id(caps) {
        Some(id) => replacement(id, profiles.get(id).copied()),
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Resolves mentions against a [`CharacterDirectory`]
#[derive(Debug, Clone)]
pub struct MentionStage {
    directory: Arc<dyn CharacterDirectory>,
}

impl MentionStage {
    pub fn new(directory: Arc<dyn CharacterDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl PromptStage for MentionStage {
    fn name(&self) -> &str {
        "mention"
    }

    fn kind(&self) -> StageKind {
        StageKind::Mention
    }

    async fn apply(&self, mut draft: PromptDraft, ctx: &RequestContext) -> StageOutcome {
        let ids = mentioned_ids(&draft.prompt);
        if ids.is_empty() {
            return StageOutcome::Continue(draft);
        }

        let profiles = match self.directory.lookup(&ids).await {
            Ok(profiles) => profiles,
            Err(e) => {
                let humanized = substitute(&draft.prompt, &HashMap::new());
                return StageOutcome::degraded(draft.with_prompt(humanized), &e);
            }
        };

        debug!(
            request_id = %ctx.request_id,
            mentioned = ids.len(),
            resolved = profiles.len(),
            "resolved character mentions"
        );

        let by_id: HashMap<&str, &CharacterProfile> =
            profiles.iter().map(|p| (p.id.as_str(), p)).collect();
        draft.prompt = substitute(&draft.prompt, &by_id);

        for id in &ids {
            let image = by_id.get(id.as_str()).and_then(|p| p.image.as_ref());
            if let Some(image) = image {
                if !draft.images.contains(image) {
                    draft.images.push(image.clone());
                }
                draft.portraits.push(Portrait {
                    character_id: id.clone(),
                    image: image.clone(),
                });
            }
        }

        StageOutcome::Continue(draft)
    }
}
