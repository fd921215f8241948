//! GitHub App Authentication
//!
//! Resolves the token the bot uses for the REST API and for git pushes:
//! either a token handed in directly (e.g. the Actions `GITHUB_TOKEN`) or a
//! short-lived installation token minted from GitHub App credentials.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// JWT claims for GitHub App authentication
#[derive(Debug, Serialize)]
pub struct GitHubAppClaims {
    /// Issued at time (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issuer (GitHub App ID)
    pub iss: String,
}

/// Generate a JWT for GitHub App authentication
///
/// # Arguments
/// * `app_id` - The GitHub App ID
/// * `private_key_pem` - The private key in PEM format
///
/// # Returns
/// A JWT string valid for 10 minutes
pub fn generate_jwt(app_id: &str, private_key_pem: &[u8]) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("Failed to get current time")?
        .as_secs();

    let claims = GitHubAppClaims {
        iat: now.saturating_sub(60), // clock skew
        exp: now + 600,
        iss: app_id.to_string(),
    };

    let encoding_key =
        EncodingKey::from_rsa_pem(private_key_pem).context("Failed to parse private key")?;

    let header = Header::new(Algorithm::RS256);

    encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
}

/// Installation access token returned by
/// `POST /app/installations/{id}/access_tokens`.
#[derive(Clone, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchange an App JWT for an installation access token.
pub async fn exchange_installation_token(
    http: &reqwest::Client,
    api_url: &str,
    jwt: &str,
    installation_id: u64,
) -> Result<InstallationToken> {
    let url = format!(
        "{}/app/installations/{}/access_tokens",
        api_url.trim_end_matches('/'),
        installation_id
    );

    let response = http
        .post(&url)
        .bearer_auth(jwt)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", "cle-roboto")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .send()
        .await
        .context("Failed to send request to GitHub API")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("GitHub API error ({}): {}", status, body);
    }

    response
        .json::<InstallationToken>()
        .await
        .context("Failed to parse installation token response")
}

/// How the bot authenticates.
#[derive(Clone)]
pub enum Credentials {
    /// A ready-made token.
    Token(String),
    /// GitHub App credentials, exchanged for an installation token.
    App {
        app_id: String,
        private_key_pem: Vec<u8>,
        installation_id: u64,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::App {
                app_id,
                installation_id,
                ..
            } => f
                .debug_struct("App")
                .field("app_id", app_id)
                .field("installation_id", installation_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Produce the token used for API calls and pushes.
    pub async fn resolve(&self, http: &reqwest::Client, api_url: &str) -> Result<String> {
        match self {
            Self::Token(token) => Ok(token.clone()),
            Self::App {
                app_id,
                private_key_pem,
                installation_id,
            } => {
                info!(app_id = %app_id, installation_id, "Generating installation token");
                let jwt = generate_jwt(app_id, private_key_pem)?;
                let token =
                    exchange_installation_token(http, api_url, &jwt, *installation_id).await?;
                info!(expires_at = %token.expires_at, "Installation token issued");
                Ok(token.token)
            }
        }
    }
}
