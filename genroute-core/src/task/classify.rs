//! Failure classification for terminal tasks and rejected submissions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ErrorCode;

/// Notification key for a successful generation
pub const SUCCESS_KEY: &str = "toast:imageToVideo.generateSuccess";

/// Notification category of a terminal task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Content safety rejection, internal errors, and anything unclassified
    GenerationFailed,
    NoFace,
    SmallFace,
    InvalidParams,
    /// Provider reported a code we do not recognise
    HumanModeFailed,
}

impl FailureKind {
    /// Localized notification key
    pub fn message_key(self) -> &'static str {
        match self {
            FailureKind::GenerationFailed => "toast:error.videoGenerationFailed",
            FailureKind::NoFace => "toast:error.noFace",
            FailureKind::SmallFace => "toast:error.smallFace",
            FailureKind::InvalidParams => "toast:error.invalidParams",
            FailureKind::HumanModeFailed => "toast:error.humanModeVideoGenerationFailed",
        }
    }
}

static MESSAGE_PATTERNS: Lazy<Vec<(Regex, FailureKind)>> = Lazy::new(|| {
    [
        (
            r"(?i)inappropriate content|nudity|sexuality|erotic|guardrails",
            FailureKind::GenerationFailed,
        ),
        (r"(?i)no.*face.*found|face.*not.*found", FailureKind::NoFace),
        (r"(?i)small.*face|face.*too.*small", FailureKind::SmallFace),
        (
            r"(?i)internal.*error|server.*error",
            FailureKind::GenerationFailed,
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
    .collect()
});

fn classify_code(code: &str) -> FailureKind {
    match code {
        "NO_FACE_FOUND" => FailureKind::NoFace,
        "SMALL_FACE" => FailureKind::SmallFace,
        "SAFETY.INPUT.TEXT" | "INTERNAL.BAD_OUTPUT.CODE01" | "500" => FailureKind::GenerationFailed,
        "400" => FailureKind::InvalidParams,
        _ => FailureKind::HumanModeFailed,
    }
}

/// Classify a terminal failure.
///
/// The failure text is matched first; the failure code decides when no
/// pattern matches. Never fails: anything unrecognised is a generic failure.
pub fn classify_failure(message: Option<&str>, code: Option<&str>) -> FailureKind {
    if let Some(message) = message.filter(|m| !m.is_empty()) {
        if let Some((_, kind)) = MESSAGE_PATTERNS.iter().find(|(re, _)| re.is_match(message)) {
            return *kind;
        }
    }

    match code.filter(|c| !c.is_empty()) {
        Some(code) => classify_code(code),
        None => FailureKind::GenerationFailed,
    }
}

/// Caller-visible action for a rejected submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Open the pricing paywall
    OpenPaywall,
    /// Show a rate-limit warning, then open the paywall
    WarnAndOpenPaywall,
    /// Show a localized error message
    ShowError(&'static str),
}

impl RecoveryAction {
    pub fn for_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::InsufficientBalance => RecoveryAction::OpenPaywall,
            ErrorCode::RateLimitExceeded => RecoveryAction::WarnAndOpenPaywall,
            ErrorCode::ModelNotFound => {
                RecoveryAction::ShowError("toast:error.generationModelNotFound")
            }
            ErrorCode::TaskNotFound => {
                RecoveryAction::ShowError("toast:error.generationTaskNotFound")
            }
            ErrorCode::InvalidParams => RecoveryAction::ShowError("toast:error.invalidParams"),
            ErrorCode::GenerationFailed => {
                RecoveryAction::ShowError("toast:error.videoGenerationFailed")
            }
        }
    }

    /// Warning shown before the paywall, if any
    pub fn warning_key(self) -> Option<&'static str> {
        match self {
            RecoveryAction::WarnAndOpenPaywall => Some("toast:common.rateLimitExceeded"),
            _ => None,
        }
    }
}
