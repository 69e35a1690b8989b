//! Credential selection and GitHub App token exchange.
//!
//! A private key in the configuration means the bot runs as a GitHub App:
//! a signed JWT is exchanged for an installation token. Otherwise the static
//! token is used. Once app authentication is chosen it either succeeds or
//! fails the invocation; it never falls back to the static token.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use papa_core::{GitHubConfig, PapaError};
use serde::{Deserialize, Serialize};

use crate::github::GitHubClient;

const JWT_LIFETIME_MINUTES: i64 = 10;
// GitHub rejects assertions issued "in the future"; backdate to absorb clock drift.
const JWT_BACKDATE_SECONDS: i64 = 60;

/// How the bot authenticates to GitHub for one invocation.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Static personal or bot token.
    Token(String),
    /// GitHub App installation.
    App {
        /// App identifier, used as the JWT issuer.
        app_id: u64,
        /// PEM-encoded RSA private key.
        private_key: String,
        /// Installation whose token is requested.
        installation_id: u64,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            Credentials::App {
                app_id,
                installation_id,
                ..
            } => f
                .debug_struct("App")
                .field("app_id", app_id)
                .field("private_key", &"<redacted>")
                .field("installation_id", installation_id)
                .finish(),
        }
    }
}

impl Credentials {
    /// Choose the credential strategy.
    ///
    /// App authentication wins whenever a private key is configured. The
    /// installation comes from the event, falling back to the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Authentication`] if a private key is present but
    /// the app id or installation id is missing, and [`PapaError::Config`]
    /// if no credentials are configured at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use papa_core::GitHubConfig;
    /// use papa_review::auth::Credentials;
    ///
    /// let config = GitHubConfig {
    ///     token: Some("ghp_xxxx".into()),
    ///     ..GitHubConfig::default()
    /// };
    /// let creds = Credentials::select(&config, None).unwrap();
    /// assert!(matches!(creds, Credentials::Token(_)));
    /// ```
    pub fn select(
        config: &GitHubConfig,
        event_installation_id: Option<u64>,
    ) -> Result<Self, PapaError> {
        if let Some(private_key) = &config.private_key {
            let app_id = config.app_id.ok_or_else(|| {
                PapaError::Authentication("GitHub App private key set without an app id".into())
            })?;
            let installation_id = event_installation_id
                .or(config.installation_id)
                .ok_or_else(|| {
                    PapaError::Authentication(
                        "GitHub App authentication needs an installation id from the event or GITHUB_APP_INSTALLATION_ID"
                            .into(),
                    )
                })?;
            return Ok(Credentials::App {
                app_id,
                private_key: private_key.clone(),
                installation_id,
            });
        }

        match &config.token {
            Some(token) => Ok(Credentials::Token(token.clone())),
            None => Err(PapaError::Config(
                "no GitHub credentials configured".into(),
            )),
        }
    }

    /// Resolve these credentials into an authenticated GitHub handle.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Authentication`] if the app token exchange fails
    /// for any reason.
    pub async fn authenticate(&self, api_url: &str) -> Result<GitHubClient, PapaError> {
        match self {
            Credentials::Token(token) => {
                tracing::info!("using token-based authentication");
                GitHubClient::new(token.clone(), api_url)
            }
            Credentials::App {
                app_id,
                private_key,
                installation_id,
            } => {
                tracing::info!(app_id, installation_id, "using GitHub App authentication");
                let token =
                    exchange_installation_token(api_url, *app_id, private_key, *installation_id)
                        .await?;
                GitHubClient::new(token, api_url)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Sign the short-lived RS256 assertion that identifies the app.
///
/// # Errors
///
/// Returns [`PapaError::Authentication`] if the key is not a valid RSA PEM
/// or signing fails.
pub fn create_app_jwt(app_id: u64, private_key: &str) -> Result<String, PapaError> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| PapaError::Authentication(format!("failed to parse private key: {e}")))?;

    let now = Utc::now();
    let claims = AppClaims {
        iat: (now - Duration::seconds(JWT_BACKDATE_SECONDS)).timestamp(),
        exp: (now + Duration::minutes(JWT_LIFETIME_MINUTES)).timestamp(),
        iss: app_id.to_string(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| PapaError::Authentication(format!("failed to sign JWT: {e}")))
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Exchange an app assertion for an installation access token.
///
/// # Errors
///
/// Returns [`PapaError::Authentication`] on a malformed key, transport
/// failure, non-success status, or a response without a token.
pub async fn exchange_installation_token(
    api_url: &str,
    app_id: u64,
    private_key: &str,
    installation_id: u64,
) -> Result<String, PapaError> {
    let jwt = create_app_jwt(app_id, private_key)?;
    let url = format!(
        "{}/app/installations/{installation_id}/access_tokens",
        api_url.trim_end_matches('/')
    );

    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", format!("Bearer {jwt}"))
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", "code-review-papa")
        .send()
        .await
        .map_err(|e| PapaError::Authentication(format!("failed to get installation token: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PapaError::Authentication(format!(
            "failed to get installation token, status: {status}, body: {body}"
        )));
    }

    let parsed: InstallationToken = response.json().await.map_err(|e| {
        PapaError::Authentication(format!("failed to parse installation token response: {e}"))
    })?;

    if parsed.token.is_empty() {
        return Err(PapaError::Authentication(
            "installation token response carried an empty token".into(),
        ));
    }
    if let Some(expires_at) = parsed.expires_at {
        tracing::debug!(installation_id, %expires_at, "installation token issued");
    }
    Ok(parsed.token)
}
