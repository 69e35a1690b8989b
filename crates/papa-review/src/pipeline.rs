use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use papa_core::{
    AnalysisError, CollaboratorError, ExistingComment, PullRequestTarget, ReviewConfig,
    ReviewError, ReviewStep, ScmError,
};
use serde::Serialize;

use crate::format::{self, TOO_LARGE_ADVISORY};

/// Source-control capability consumed by the pipeline.
///
/// Implemented by [`crate::github::GitHubClient`] and by the recording
/// double in [`crate::testing`].
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Fetch the unified diff of a pull request.
    async fn fetch_diff(&self, target: &PullRequestTarget) -> Result<String, ScmError>;

    /// List every comment on a pull request.
    async fn list_comments(
        &self,
        target: &PullRequestTarget,
    ) -> Result<Vec<ExistingComment>, ScmError>;

    /// Post one comment on a pull request.
    async fn post_comment(&self, target: &PullRequestTarget, body: &str) -> Result<(), ScmError>;
}

/// Analysis capability consumed by the pipeline.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Submit a diff and return the raw analysis text.
    async fn analyze(&self, diff: &str) -> Result<String, AnalysisError>;
}

/// How a successful review run ended.
///
/// # Examples
///
/// ```
/// use papa_review::pipeline::ReviewOutcome;
///
/// assert!(ReviewOutcome::Posted.posted_comment());
/// assert!(!ReviewOutcome::AlreadyReviewed.posted_comment());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ReviewOutcome {
    /// A signed comment already exists; nothing was done.
    AlreadyReviewed,
    /// The diff was empty; nothing to review.
    EmptyDiff,
    /// The diff was over the size limit; the advisory was posted.
    TooLarge {
        /// Diff length in bytes.
        bytes: usize,
    },
    /// The analysis was formatted and posted.
    Posted,
}

impl ReviewOutcome {
    /// Whether this run left a new comment on the pull request.
    pub fn posted_comment(&self) -> bool {
        matches!(self, ReviewOutcome::TooLarge { .. } | ReviewOutcome::Posted)
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewOutcome::AlreadyReviewed => write!(f, "already reviewed, skipped"),
            ReviewOutcome::EmptyDiff => write!(f, "empty diff, skipped"),
            ReviewOutcome::TooLarge { bytes } => {
                write!(f, "diff too large ({bytes} bytes), advisory posted")
            }
            ReviewOutcome::Posted => write!(f, "review posted"),
        }
    }
}

/// Review orchestrator that drives one pull request from dedup check to post.
///
/// Steps run strictly in order and each may end the run: dedup check, diff
/// retrieval, empty-diff gate, size gate, analysis, formatting, posting.
/// Nothing is retried here; retries belong to whoever redelivers the event.
pub struct ReviewPipeline {
    scm: Arc<dyn SourceControl>,
    analyzer: Arc<dyn Analyzer>,
    config: ReviewConfig,
}

impl ReviewPipeline {
    /// Create a new pipeline from its collaborators and review config.
    pub fn new(
        scm: Arc<dyn SourceControl>,
        analyzer: Arc<dyn Analyzer>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            scm,
            analyzer,
            config,
        }
    }

    /// Review one pull request, posting at most one comment.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError`] naming the target and the step whose
    /// collaborator call failed.
    pub async fn review(&self, target: &PullRequestTarget) -> Result<ReviewOutcome, ReviewError> {
        tracing::info!(
            owner = %target.owner,
            repo = %target.repo,
            number = target.number,
            "reviewing pull request"
        );

        let comments = self
            .scm
            .list_comments(target)
            .await
            .map_err(|e| failed(target, ReviewStep::ListComments, e))?;
        if comments.iter().any(|c| format::is_signed(&c.body)) {
            tracing::info!(%target, "already reviewed, skipping");
            return Ok(ReviewOutcome::AlreadyReviewed);
        }

        let diff = self
            .scm
            .fetch_diff(target)
            .await
            .map_err(|e| failed(target, ReviewStep::FetchDiff, e))?;

        if diff.is_empty() {
            tracing::info!(%target, "empty diff, skipping");
            return Ok(ReviewOutcome::EmptyDiff);
        }

        let bytes = diff.len();
        if bytes > self.config.max_diff_bytes {
            tracing::warn!(
                %target,
                bytes,
                limit = self.config.max_diff_bytes,
                "diff too large, posting advisory"
            );
            self.scm
                .post_comment(target, TOO_LARGE_ADVISORY)
                .await
                .map_err(|e| failed(target, ReviewStep::PostAdvisory, e))?;
            return Ok(ReviewOutcome::TooLarge { bytes });
        }

        let analysis = self
            .analyzer
            .analyze(&diff)
            .await
            .map_err(|e| failed(target, ReviewStep::Analyze, e))?;

        let body = format::format_comment(&analysis);

        self.scm
            .post_comment(target, &body)
            .await
            .map_err(|e| failed(target, ReviewStep::PostComment, e))?;

        tracing::info!(%target, bytes, "review posted");
        Ok(ReviewOutcome::Posted)
    }
}

fn failed(
    target: &PullRequestTarget,
    step: ReviewStep,
    source: impl Into<CollaboratorError>,
) -> ReviewError {
    let err = ReviewError::new(target.clone(), step, source);
    tracing::error!(
        owner = %target.owner,
        repo = %target.repo,
        number = target.number,
        step = %step,
        error = %err.source,
        "review step failed"
    );
    err
}
