//! Pull request review orchestration for Code Review Papa.
//!
//! Provides the pipeline from webhook event to posted comment: event
//! parsing and filtering, credential selection, GitHub and LLM clients,
//! comment formatting, and the review orchestrator with its dedup and size
//! gates.

pub mod auth;
pub mod dispatch;
pub mod event;
pub mod format;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
