use async_trait::async_trait;
use papa_core::{ExistingComment, PapaError, PullRequestTarget, ScmError};

use crate::pipeline::SourceControl;

const PER_PAGE: usize = 100;
const USER_AGENT: &str = "code-review-papa";

/// GitHub client for fetching diffs, listing comments, and posting comments.
///
/// Built from an already-resolved token; see [`crate::auth`] for how the
/// token is chosen.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use papa_core::PullRequestTarget;
/// use papa_review::github::GitHubClient;
/// use papa_review::pipeline::SourceControl;
///
/// let client = GitHubClient::new("ghp_xxxx", "https://api.github.com")?;
/// let diff = client
///     .fetch_diff(&PullRequestTarget::new("octocat", "hello-world", 42))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
    api_url: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client authenticated with `token` against `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Config`] if the base URL is invalid or the
    /// client cannot be built.
    pub fn new(token: impl Into<String>, api_url: &str) -> Result<Self, PapaError> {
        let token = token.into();
        let api_url = api_url.trim_end_matches('/').to_string();

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(api_url.as_str())
            .map_err(|e| PapaError::Config(format!("invalid GitHub API URL '{api_url}': {e}")))?
            .build()
            .map_err(|e| PapaError::Config(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PapaError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            token,
            api_url,
        })
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn fetch_diff(&self, target: &PullRequestTarget) -> Result<String, ScmError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, target.owner, target.repo, target.number
        );

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| ScmError::Transport(format!("failed to fetch PR diff: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScmError::from_status(status.as_u16(), body));
        }

        response
            .text()
            .await
            .map_err(|e| ScmError::Transport(format!("failed to read diff response: {e}")))
    }

    async fn list_comments(
        &self,
        target: &PullRequestTarget,
    ) -> Result<Vec<ExistingComment>, ScmError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            target.owner, target.repo, target.number
        );

        let mut comments = Vec::new();
        let mut page = 1u32;
        loop {
            let params = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let batch: Vec<ExistingComment> = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .map_err(scm_error)?;

            let fetched = batch.len();
            comments.extend(batch);
            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }

        tracing::debug!(%target, count = comments.len(), "listed existing comments");
        Ok(comments)
    }

    async fn post_comment(&self, target: &PullRequestTarget, body: &str) -> Result<(), ScmError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            target.owner, target.repo, target.number
        );
        let payload = serde_json::json!({ "body": body });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(scm_error)?;

        Ok(())
    }
}

fn scm_error(err: octocrab::Error) -> ScmError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            ScmError::from_status(source.status_code.as_u16(), source.message.clone())
        }
        _ => ScmError::Transport(err.to_string()),
    }
}
