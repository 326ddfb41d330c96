//! Provider response extraction and schema validation.
//!
//! Vision models wrap their JSON in noise: `<think>` blocks from reasoning
//! models, markdown code fences, leading prose. Extraction strips that
//! noise, then validation is strict: all four schema fields must be
//! present or the whole response is rejected. There is no partially
//! populated result.

use serde::Deserialize;

use crate::error::ProviderError;
use crate::types::{AnalysisResult, KeywordMetadata, Platform};

/// Raw response shape required from the provider.
#[derive(Debug, Deserialize)]
struct WireResult {
    taglines: Vec<String>,
    keywords: Vec<WireKeyword>,
    description: String,
    platforms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireKeyword {
    word: String,
    relevance: f64,
    platforms: Vec<String>,
}

/// Parse a provider response body into a validated [`AnalysisResult`].
///
/// Extraction is tried in order, most structured first:
/// 1. Direct JSON object parse
/// 2. Strip `<think>` blocks, then parse
/// 3. Markdown code block extraction, then parse
///
/// An empty body or a body that fails all three yields
/// [`ProviderError::MalformedResponse`].
pub fn parse_analysis(response: &str) -> Result<AnalysisResult, ProviderError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::MalformedResponse("empty response body".into()));
    }

    if let Ok(wire) = serde_json::from_str::<WireResult>(trimmed) {
        return validate(wire);
    }

    let stripped = strip_think_tags(trimmed);
    let stripped = stripped.trim();
    if let Ok(wire) = serde_json::from_str::<WireResult>(stripped) {
        return validate(wire);
    }

    if let Some(block) = extract_code_block(stripped) {
        if let Ok(wire) = serde_json::from_str::<WireResult>(block.trim()) {
            return validate(wire);
        }
    }

    Err(ProviderError::MalformedResponse(format!(
        "response does not match the analysis schema: {}",
        snippet(trimmed)
    )))
}

/// Strip `<think>...</think>` blocks emitted by reasoning models.
///
/// An unclosed block is stripped to the end of the text.
pub fn strip_think_tags(text: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find("<think>") {
        if let Some(end) = result[start..].find("</think>") {
            result = format!("{}{}", &result[..start], &result[start + end + 8..]);
        } else {
            result = result[..start].to_string();
            break;
        }
    }
    result
}

/// Extract the first fenced code block, preferring a ```json fence.
fn extract_code_block(text: &str) -> Option<&str> {
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            let rest = &text[content_start..];
            if let Some(end) = rest.find("```") {
                return Some(&rest[..end]);
            }
        }
    }
    None
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    }
}

/// Enforce the result invariants on a schema-conforming wire value.
///
/// Taglines are trimmed with empties dropped; an empty tagline list fails
/// the call. Keyword words are case-sensitively deduplicated (first
/// occurrence wins), relevance clamped to [1, 100], unknown platform
/// names dropped, and keywords left without any known platform dropped
/// entirely.
fn validate(wire: WireResult) -> Result<AnalysisResult, ProviderError> {
    let taglines: Vec<String> = wire
        .taglines
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if taglines.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response contained no taglines".into(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    let keywords: Vec<KeywordMetadata> = wire
        .keywords
        .into_iter()
        .filter_map(|k| {
            let word = k.word.trim().to_string();
            if word.is_empty() || !seen.insert(word.clone()) {
                return None;
            }
            let platforms: Vec<Platform> = k
                .platforms
                .iter()
                .filter_map(|p| Platform::parse(p))
                .collect();
            if platforms.is_empty() {
                return None;
            }
            let relevance = k.relevance.round().clamp(1.0, 100.0) as u8;
            Some(KeywordMetadata {
                word,
                relevance,
                platforms,
            })
        })
        .collect();

    Ok(AnalysisResult {
        taglines,
        keywords,
        description: wire.description,
        suggested_platforms: wire.platforms,
    })
}
