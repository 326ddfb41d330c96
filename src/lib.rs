//! # marketing-vision
//!
//! Batch image analysis engine that generates marketing metadata
//! (taglines, weighted platform-tagged keywords, mood description,
//! suggested platforms) with an Ollama vision model.
//!
//! ## Key Features
//!
//! - **Intake normalization** — decodes each submitted image, caps the
//!   larger dimension at 1024, re-encodes to JPEG, and produces an owned
//!   preview handle released exactly once at item removal
//! - **Bounded-concurrency scheduler** — up to 5 overlapping provider
//!   calls per batch run, with snapshot semantics and single-flight
//!   per-item claims
//! - **Partial-failure isolation** — a failed item records its error and
//!   never aborts sibling work; re-running the batch is the recovery path
//! - **Keyword selection model** — per-item chosen keywords, cross-batch
//!   aggregation, and platform/relevance filter views
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketing_vision::{BatchEngine, OllamaVisionProvider, ProviderConfig, RawImage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = OllamaVisionProvider::new(ProviderConfig::with_model("llava"));
//!     let engine = BatchEngine::new(provider);
//!
//!     let bytes = std::fs::read("photo.jpg").unwrap();
//!     engine.submit(vec![RawImage::new(bytes, "image/jpeg").with_name("photo.jpg")]);
//!
//!     engine.process_all().await;
//!
//!     for item in engine.snapshot() {
//!         println!("{:?}: {:?}", item.file_name, item.status);
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod provider;
pub mod selection;
pub mod store;
pub mod types;

pub use engine::{BatchEngine, EngineOptions};
pub use error::{IntakeError, ProviderError};
pub use normalize::{normalize, NormalizeOptions, NormalizedImage, PreviewHandle, PreviewProbe};
pub use parse::{parse_analysis, strip_think_tags};
pub use provider::{AnalysisProvider, GenerateOptions, OllamaVisionProvider, ProviderConfig};
pub use selection::{keyword_view, KeywordFilter, KeywordOrder, SelectionModel};
pub use store::ItemStore;
pub use types::{
    AnalysisResult, BatchItem, ItemId, ItemStatus, KeywordMetadata, Platform, RawImage,
    CONCURRENCY_LIMIT, MAX_DIMENSION,
};
