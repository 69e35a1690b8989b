//! Recording test doubles for the pipeline's collaborators.
//!
//! Each double answers from canned data and records every call so tests can
//! assert exactly which collaborator calls a run made.

use std::sync::Mutex;

use async_trait::async_trait;
use papa_core::{AnalysisError, ExistingComment, PullRequestTarget, ScmError};

use crate::pipeline::{Analyzer, SourceControl};

/// One recorded source-control call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
    /// `list_comments`
    ListComments(PullRequestTarget),
    /// `fetch_diff`
    FetchDiff(PullRequestTarget),
    /// `post_comment` with the body that was posted.
    PostComment(PullRequestTarget, String),
}

/// In-memory [`SourceControl`] that records its calls.
///
/// # Examples
///
/// ```
/// use papa_review::testing::RecordingSourceControl;
///
/// let scm = RecordingSourceControl::new()
///     .with_comments(["LGTM"])
///     .with_diff("diff --git a/x b/x\n+1 line");
/// assert!(scm.calls().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RecordingSourceControl {
    comments: Vec<ExistingComment>,
    diff: String,
    list_error: Option<ScmError>,
    diff_error: Option<ScmError>,
    post_error: Option<ScmError>,
    calls: Mutex<Vec<ScmCall>>,
}

impl RecordingSourceControl {
    /// A pull request with no comments and an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing comment bodies returned by `list_comments`.
    pub fn with_comments<I, S>(mut self, bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comments = bodies.into_iter().map(ExistingComment::new).collect();
        self
    }

    /// Diff text returned by `fetch_diff`.
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = diff.into();
        self
    }

    /// Make `list_comments` fail.
    pub fn failing_list(mut self, err: ScmError) -> Self {
        self.list_error = Some(err);
        self
    }

    /// Make `fetch_diff` fail.
    pub fn failing_diff(mut self, err: ScmError) -> Self {
        self.diff_error = Some(err);
        self
    }

    /// Make `post_comment` fail. The failed call is still recorded.
    pub fn failing_post(mut self, err: ScmError) -> Self {
        self.post_error = Some(err);
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ScmCall> {
        self.lock().clone()
    }

    /// Bodies passed to `post_comment`, in order.
    pub fn posted(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                ScmCall::PostComment(_, body) => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `fetch_diff` calls.
    pub fn diff_fetches(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, ScmCall::FetchDiff(_)))
            .count()
    }

    fn record(&self, call: ScmCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScmCall>> {
        // A panicking test thread must not hide the calls from the assertions.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SourceControl for RecordingSourceControl {
    async fn fetch_diff(&self, target: &PullRequestTarget) -> Result<String, ScmError> {
        self.record(ScmCall::FetchDiff(target.clone()));
        match &self.diff_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.diff.clone()),
        }
    }

    async fn list_comments(
        &self,
        target: &PullRequestTarget,
    ) -> Result<Vec<ExistingComment>, ScmError> {
        self.record(ScmCall::ListComments(target.clone()));
        match &self.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.comments.clone()),
        }
    }

    async fn post_comment(&self, target: &PullRequestTarget, body: &str) -> Result<(), ScmError> {
        self.record(ScmCall::PostComment(target.clone(), body.to_string()));
        match &self.post_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// In-memory [`Analyzer`] that records the diffs it was given.
#[derive(Debug)]
pub struct RecordingAnalyzer {
    response: Result<String, AnalysisError>,
    calls: Mutex<Vec<String>>,
}

impl RecordingAnalyzer {
    /// Answer every call with `analysis`.
    pub fn responding(analysis: impl Into<String>) -> Self {
        Self {
            response: Ok(analysis.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with `err`.
    pub fn failing(err: AnalysisError) -> Self {
        Self {
            response: Err(err),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Diffs submitted so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn analyze(&self, diff: &str) -> Result<String, AnalysisError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diff.to_string());
        self.response.clone()
    }
}
