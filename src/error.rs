use thiserror::Error;

/// Errors raised at intake, before an item exists in the store.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// The declared content type is not an image; rejected before any
    /// decode attempt.
    #[error("Not an image input: {0}")]
    InvalidInput(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to re-encode image: {0}")]
    Encode(String),
}

/// Errors surfaced by the analysis provider adapter.
///
/// The scheduler treats every variant the same way: the message lands on
/// the item and the batch run continues.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Endpoint unreachable, timed out, or returned a non-success status.
    #[error("Analysis request failed: {0}")]
    Transport(String),

    /// Empty response body or a body that fails schema validation.
    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

/// Message recorded on an item whose payload vanished from the side store.
/// Defensive case: the payload was evicted without removing the item.
pub(crate) const PAYLOAD_LOST: &str = "Stored payload missing for item";
