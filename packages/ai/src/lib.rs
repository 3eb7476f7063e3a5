#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Generative polish for deterministic station narratives.
//!
//! Supports Anthropic Claude and `OpenAI` via a common provider trait,
//! auto-detected from available credentials. The adapter performs a
//! single stateless prompt/response exchange per station: the
//! deterministic verdict's facts go in as hard constraints, a stylistic
//! rewrite comes back. The model call carries a bounded timeout, is
//! never retried, and every failure path falls back to the deterministic
//! narrative — polish is an optional enhancement, not a dependency.

pub mod polish;
pub mod providers;

use thiserror::Error;

/// Errors that can occur during AI operations.
///
/// All of these are recoverable by design: callers degrade to the
/// deterministic narrative instead of surfacing them.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to the LLM provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// The bounded request window elapsed.
    #[error("Provider call timed out after {seconds}s")]
    Timeout {
        /// The configured bound.
        seconds: u64,
    },

    /// The provider answered successfully but with no usable text.
    ///
    /// Kept distinct from transport failures so callers can tell "the
    /// service is down" from "the service had nothing to say".
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}
