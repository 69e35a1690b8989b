//! From a parsed webhook event to at most one posted comment.

use std::future::Future;
use std::sync::Arc;

use papa_core::{PapaConfig, PapaError, PullRequestTarget};
use serde::Serialize;

use crate::auth::Credentials;
use crate::event::PullRequestEvent;
use crate::llm::LlmClient;
use crate::pipeline::{ReviewOutcome, ReviewPipeline};

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum EventOutcome {
    /// The action does not warrant a review. Not an error.
    Ineligible {
        /// The rejected action.
        action: String,
    },
    /// The pipeline ran to a successful terminal state.
    Reviewed {
        /// The terminal state reached.
        outcome: ReviewOutcome,
    },
}

/// Run the event filter and, for eligible events only, the review pipeline.
///
/// `connect` builds the pipeline (credential selection and authentication)
/// and is never called for ineligible events, so those cause no
/// collaborator traffic at all.
///
/// # Errors
///
/// Propagates whatever `connect` fails with, and wraps pipeline failures
/// in [`PapaError::Review`].
pub async fn dispatch<F, Fut>(event: &PullRequestEvent, connect: F) -> Result<EventOutcome, PapaError>
where
    F: FnOnce(&PullRequestEvent) -> Fut,
    Fut: Future<Output = Result<ReviewPipeline, PapaError>>,
{
    if !event.is_eligible() {
        tracing::info!(
            action = %event.action,
            target = %event.target(),
            "ignoring pull request event"
        );
        return Ok(EventOutcome::Ineligible {
            action: event.action.to_string(),
        });
    }

    let pipeline = connect(event).await?;
    let outcome = pipeline.review(&event.target()).await?;
    Ok(EventOutcome::Reviewed { outcome })
}

/// Build the production pipeline: select credentials, authenticate to
/// GitHub, and construct the analysis client.
///
/// # Errors
///
/// Returns [`PapaError::Authentication`] or [`PapaError::Config`] when the
/// GitHub handle or the analysis client cannot be built.
pub async fn connect(
    config: &PapaConfig,
    installation_id: Option<u64>,
) -> Result<ReviewPipeline, PapaError> {
    let credentials = Credentials::select(&config.github, installation_id)?;
    let github = credentials.authenticate(&config.github.api_url).await?;
    let llm = LlmClient::new(&config.llm)?;
    Ok(ReviewPipeline::new(
        Arc::new(github),
        Arc::new(llm),
        config.review.clone(),
    ))
}

/// Review one pull request directly, bypassing the event filter.
///
/// # Errors
///
/// See [`connect`] and [`ReviewPipeline::review`].
pub async fn review_pull_request(
    config: &PapaConfig,
    target: &PullRequestTarget,
    installation_id: Option<u64>,
) -> Result<ReviewOutcome, PapaError> {
    let pipeline = connect(config, installation_id).await?;
    Ok(pipeline.review(target).await?)
}
