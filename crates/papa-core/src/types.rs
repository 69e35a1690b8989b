use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// The pull request a review run is aimed at.
///
/// # Examples
///
/// ```
/// use papa_core::PullRequestTarget;
///
/// let target = PullRequestTarget::new("octocat", "hello-world", 42);
/// assert_eq!(target.to_string(), "octocat/hello-world#42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestTarget {
    /// Repository owner (user or organisation login).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl PullRequestTarget {
    /// Build a target from its parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for PullRequestTarget {
    type Err = String;

    /// Parse an `owner/repo#number` reference.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((owner_repo, number_str)) = s.split_once('#') else {
            return Err(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            ));
        };
        let Some((owner, repo)) = owner_repo.split_once('/') else {
            return Err(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            ));
        };
        if owner.is_empty() || repo.is_empty() {
            return Err(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            ));
        }
        let number: u64 = number_str
            .parse()
            .map_err(|_| format!("invalid PR number: {number_str}"))?;
        Ok(Self::new(owner, repo, number))
    }
}

/// A comment that already exists on a pull request.
///
/// Only the body matters: prior reviews are detected by a substring search
/// for the signature, never by author or structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingComment {
    /// Comment text. GitHub may return `null`, which is read as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExistingComment {
    /// Wrap a body string.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// A collaborator-facing step of the review pipeline.
///
/// Carried by [`crate::ReviewError`] so a failure can be logged with the
/// step it happened in.
///
/// # Examples
///
/// ```
/// use papa_core::ReviewStep;
///
/// assert_eq!(ReviewStep::FetchDiff.to_string(), "fetch_diff");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStep {
    /// Listing existing comments for the dedup check.
    ListComments,
    /// Fetching the unified diff.
    FetchDiff,
    /// Submitting the diff to the analysis collaborator.
    Analyze,
    /// Posting the oversized-diff advisory.
    PostAdvisory,
    /// Posting the formatted review.
    PostComment,
}

impl fmt::Display for ReviewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewStep::ListComments => "list_comments",
            ReviewStep::FetchDiff => "fetch_diff",
            ReviewStep::Analyze => "analyze",
            ReviewStep::PostAdvisory => "post_advisory",
            ReviewStep::PostComment => "post_comment",
        };
        f.write_str(name)
    }
}
