use crate::types::{PullRequestTarget, ReviewStep};

/// Errors that can occur across Code Review Papa.
///
/// Library crates use this type directly; the binary crate converts to
/// `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use papa_core::PapaError;
///
/// let err = PapaError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PapaError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required settings absent or unusable. Fatal at startup.
    #[error("configuration invalid: {0}")]
    #[diagnostic(
        code(papa::config),
        help("set GITHUB_TOKEN (or GitHub App credentials) and DEEPSEEK_KEY, or edit .papa.toml")
    )]
    Config(String),

    /// The webhook payload could not be parsed into a pull request event.
    #[error("malformed event: {0}")]
    #[diagnostic(code(papa::malformed_event))]
    MalformedEvent(String),

    /// Credential resolution failed; the pipeline never starts.
    #[error("authentication failed: {0}")]
    #[diagnostic(code(papa::auth))]
    Authentication(String),

    /// A collaborator call failed inside the review pipeline.
    #[error(transparent)]
    #[diagnostic(code(papa::review))]
    Review(#[from] ReviewError),

    /// A result could not be rendered as JSON.
    #[error("serialization error: {0}")]
    #[diagnostic(code(papa::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure reported by the source-control collaborator.
///
/// # Examples
///
/// ```
/// use papa_core::ScmError;
///
/// let err = ScmError::Api { status: 502, body: "bad gateway".into() };
/// assert_eq!(err.to_string(), "GitHub API error 502: bad gateway");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScmError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider rejected our credentials (HTTP 401/403).
    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    /// Any other non-success response.
    #[error("GitHub API error {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or provider message.
        body: String,
    },
}

impl ScmError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ScmError::Unauthorized(body),
            _ => ScmError::Api { status, body },
        }
    }
}

/// Failure reported by the analysis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// The provider answered with an error (non-success status or an `error` object).
    #[error("provider error: {0}")]
    Provider(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered successfully but without any analysis text.
    #[error("empty response from analysis provider")]
    EmptyResponse,
}

/// Which collaborator failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Source-control failure.
    #[error(transparent)]
    SourceControl(#[from] ScmError),

    /// Analysis failure.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// A review run that failed at a named step.
///
/// # Examples
///
/// ```
/// use papa_core::{PullRequestTarget, ReviewError, ReviewStep, ScmError};
///
/// let err = ReviewError::new(
///     PullRequestTarget::new("octocat", "hello", 7),
///     ReviewStep::FetchDiff,
///     ScmError::Transport("connection reset".into()),
/// );
/// let msg = err.to_string();
/// assert!(msg.contains("octocat/hello#7"));
/// assert!(msg.contains("fetch_diff"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("review of {target} failed at {step}: {source}")]
pub struct ReviewError {
    /// The pull request under review.
    pub target: PullRequestTarget,
    /// The step that failed.
    pub step: ReviewStep,
    /// The underlying collaborator failure.
    #[source]
    pub source: CollaboratorError,
}

impl ReviewError {
    /// Attach a target and step to a collaborator failure.
    pub fn new(
        target: PullRequestTarget,
        step: ReviewStep,
        source: impl Into<CollaboratorError>,
    ) -> Self {
        Self {
            target,
            step,
            source: source.into(),
        }
    }
}
