use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque item identifier, assigned at intake and stable for the item's lifetime.
pub type ItemId = Uuid;

/// Maximum dimension (width or height) after normalization.
pub const MAX_DIMENSION: u32 = 1024;

/// Upper bound on concurrent provider calls during a batch run.
pub const CONCURRENCY_LIMIT: usize = 5;

/// Lifecycle status of a batch item.
///
/// Transitions: `Pending -> Processing -> {Completed, Error}` plus the
/// re-entrant `{Pending, Error} -> Processing`. `Completed` is terminal
/// until the item is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Stock platforms a keyword can be tagged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    AdobeStock,
    Shutterstock,
    Freepik,
}

impl Platform {
    /// Parse a provider-returned platform name. Unknown names yield `None`
    /// and are dropped during response validation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "AdobeStock" | "Adobe Stock" => Some(Self::AdobeStock),
            "Shutterstock" => Some(Self::Shutterstock),
            "Freepik" => Some(Self::Freepik),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdobeStock => "AdobeStock",
            Self::Shutterstock => "Shutterstock",
            Self::Freepik => "Freepik",
        }
    }
}

/// One scored, platform-tagged keyword from an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordMetadata {
    pub word: String,
    /// Relevance score, clamped to [1, 100] during validation.
    pub relevance: u8,
    pub platforms: Vec<Platform>,
}

/// Immutable snapshot of one successful analysis.
///
/// `taglines` preserves the provider's rank order and is non-empty on
/// success. Keyword words are case-sensitively unique within one result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub taglines: Vec<String>,
    pub keywords: Vec<KeywordMetadata>,
    pub description: String,
    /// Suggested social platforms, at most 3 by provider contract
    /// (not enforced locally).
    pub suggested_platforms: Vec<String>,
}

/// One submitted image and its analysis lifecycle, as seen by readers.
///
/// The encoded payload is deliberately absent here; it lives in a side
/// store keyed by `id` so snapshots stay lightweight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: ItemId,
    /// Original file name, if the intake provided one.
    pub file_name: Option<String>,
    /// Dimensions after normalization.
    pub width: u32,
    pub height: u32,
    pub status: ItemStatus,
    /// Present iff `status == Completed`; immutable once set.
    pub result: Option<AnalysisResult>,
    /// Present iff `status == Error`; cleared on re-attempt.
    pub error: Option<String>,
    /// ISO 8601 timestamp of intake.
    pub submitted_at: String,
}

/// Raw intake input: undecoded bytes plus the declared content type.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    /// Declared MIME type, e.g. `image/png`. Non-image types are rejected
    /// before any decode attempt.
    pub mime: String,
    pub file_name: Option<String>,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            file_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}
