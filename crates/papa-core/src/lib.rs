//! Core types, configuration, and error handling for Code Review Papa.
//!
//! This crate provides the shared foundation used by the review crate and the binary:
//! - [`PapaError`] : unified error type using `thiserror`, plus the
//!   collaborator errors [`ScmError`] and [`AnalysisError`]
//! - [`PapaConfig`] : configuration loaded from `.papa.toml` and the environment
//! - Shared types: [`PullRequestTarget`], [`ExistingComment`], [`ReviewStep`]

mod config;
mod error;
mod types;

pub use config::{GitHubConfig, LlmConfig, PapaConfig, ReviewConfig, ServerConfig};
pub use error::{AnalysisError, CollaboratorError, PapaError, ReviewError, ScmError};
pub use types::{ExistingComment, PullRequestTarget, ReviewStep};
