//! Pull request webhook events and the eligibility filter.

use std::fmt;

use papa_core::{PapaError, PullRequestTarget};
use serde::Deserialize;

/// What happened to the pull request.
///
/// # Examples
///
/// ```
/// use papa_review::event::PullRequestAction;
///
/// assert_eq!(PullRequestAction::from("synchronize"), PullRequestAction::Synchronize);
/// assert!(matches!(PullRequestAction::from("closed"), PullRequestAction::Other(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestAction {
    /// A new pull request.
    Opened,
    /// A closed pull request was reopened.
    Reopened,
    /// Title or body changed.
    Edited,
    /// New commits were pushed to the head branch.
    Synchronize,
    /// Anything else (`closed`, `labeled`, ...), kept verbatim for logging.
    Other(String),
}

impl From<&str> for PullRequestAction {
    fn from(action: &str) -> Self {
        match action {
            "opened" => PullRequestAction::Opened,
            "reopened" => PullRequestAction::Reopened,
            "edited" => PullRequestAction::Edited,
            "synchronize" => PullRequestAction::Synchronize,
            other => PullRequestAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullRequestAction::Opened => f.write_str("opened"),
            PullRequestAction::Reopened => f.write_str("reopened"),
            PullRequestAction::Edited => f.write_str("edited"),
            PullRequestAction::Synchronize => f.write_str("synchronize"),
            PullRequestAction::Other(other) => f.write_str(other),
        }
    }
}

/// A parsed `pull_request` webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    /// The event action.
    pub action: PullRequestAction,
    /// Pull request number.
    pub number: u64,
    /// Repository owner login.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// GitHub App installation that delivered the event, if any.
    pub installation_id: Option<u64>,
}

impl PullRequestEvent {
    /// The pull request this event is about.
    pub fn target(&self) -> PullRequestTarget {
        PullRequestTarget::new(&self.owner, &self.repo, self.number)
    }

    /// Whether the event warrants an automated review.
    ///
    /// Pure predicate: `opened`, `reopened`, `edited`, and `synchronize`
    /// are eligible, every other action is not.
    ///
    /// # Examples
    ///
    /// ```
    /// use papa_review::event::parse_event;
    ///
    /// let payload = br#"{
    ///     "action": "closed",
    ///     "number": 3,
    ///     "repository": { "name": "hello", "owner": { "login": "octocat" } }
    /// }"#;
    /// let event = parse_event(payload).unwrap();
    /// assert!(!event.is_eligible());
    /// ```
    pub fn is_eligible(&self) -> bool {
        matches!(
            self.action,
            PullRequestAction::Opened
                | PullRequestAction::Reopened
                | PullRequestAction::Edited
                | PullRequestAction::Synchronize
        )
    }
}

#[derive(Deserialize)]
struct RawEvent {
    action: String,
    number: Option<u64>,
    pull_request: Option<RawPullRequest>,
    repository: RawRepository,
    installation: Option<RawInstallation>,
}

#[derive(Deserialize)]
struct RawPullRequest {
    number: Option<u64>,
}

#[derive(Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
}

#[derive(Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Deserialize)]
struct RawInstallation {
    id: u64,
}

/// Parse a raw `pull_request` webhook body.
///
/// The PR number is read from the top-level `number`, falling back to
/// `pull_request.number`.
///
/// # Errors
///
/// Returns [`PapaError::MalformedEvent`] if the body is not JSON or lacks
/// the action, repository, or PR number.
///
/// # Examples
///
/// ```
/// use papa_review::event::{parse_event, PullRequestAction};
///
/// let payload = br#"{
///     "action": "opened",
///     "number": 42,
///     "repository": { "name": "hello", "owner": { "login": "octocat" } },
///     "installation": { "id": 99 }
/// }"#;
/// let event = parse_event(payload).unwrap();
/// assert_eq!(event.action, PullRequestAction::Opened);
/// assert_eq!(event.number, 42);
/// assert_eq!(event.installation_id, Some(99));
/// ```
pub fn parse_event(payload: &[u8]) -> Result<PullRequestEvent, PapaError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| PapaError::MalformedEvent(format!("invalid webhook payload: {e}")))?;

    let number = raw
        .number
        .or_else(|| raw.pull_request.and_then(|pr| pr.number))
        .ok_or_else(|| PapaError::MalformedEvent("missing pull request number".into()))?;

    if raw.repository.name.is_empty() || raw.repository.owner.login.is_empty() {
        return Err(PapaError::MalformedEvent(
            "repository name or owner is empty".into(),
        ));
    }

    Ok(PullRequestEvent {
        action: PullRequestAction::from(raw.action.as_str()),
        number,
        owner: raw.repository.owner.login,
        repo: raw.repository.name,
        installation_id: raw.installation.map(|i| i.id),
    })
}
