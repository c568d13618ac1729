use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::AccessToken;
use crate::error::DownloaderError;

pub trait Authorizer: Send + Sync {
    fn authorize(&self, username: &str, password: &str) -> Result<AccessToken, DownloaderError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Clone)]
pub struct TokenHttpClient {
    client: Client,
    base_url: String,
}

impl TokenHttpClient {
    pub fn new(base_url: &str) -> Result<Self, DownloaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-dl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::Auth(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| DownloaderError::Auth(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}/api-token-auth/", self.base_url)
    }
}

impl Authorizer for TokenHttpClient {
    /// Every failure collapses into "invalid credentials"; the cause is only
    /// logged.
    fn authorize(&self, username: &str, password: &str) -> Result<AccessToken, DownloaderError> {
        let invalid = || DownloaderError::Auth("invalid credentials".to_string());

        let response = self
            .client
            .post(self.token_url())
            .json(&TokenRequest { username, password })
            .send()
            .map_err(|err| {
                debug!(error = %err, "token request failed");
                invalid()
            })?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "token endpoint refused credentials");
            return Err(invalid());
        }

        let body: TokenResponse = response.json().map_err(|err| {
            debug!(error = %err, "token response could not be decoded");
            invalid()
        })?;
        if body.token.is_empty() {
            return Err(invalid());
        }
        Ok(AccessToken::new(body.token))
    }
}
