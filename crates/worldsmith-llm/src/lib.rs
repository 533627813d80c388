//! Model and image clients for the generation pipeline.
//!
//! Provides the `ProviderAdapter` trait and `DynProvider` wrapper, a
//! middleware chain, `LlmClient` with per-call timeouts, the Anthropic
//! Messages adapter, and the `ImageProvider` seam used by the asset
//! generator.

mod anthropic;
mod client;
pub mod images;
mod provider;
mod types;

pub use anthropic::AnthropicAdapter;
pub use client::*;
pub use images::{GeneratedImage, ImageProvider, ImageRequest, OpenAiImageAdapter};
pub use provider::*;
pub use types::*;
