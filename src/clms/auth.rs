use crate::error::{Error, Result};
use crate::http;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 60 * 60;

/// The API key file downloaded from the CLMS account page.
#[derive(Deserialize, Clone)]
pub struct Credential {
    pub client_id: String,
    #[serde(default)]
    pub ip_range: Option<String>,
    // No timezone offset on this one, so it stays a string.
    #[serde(default)]
    pub issued: String,
    pub key_id: String,
    pub private_key: String,
    #[serde(default)]
    pub title: String,
    pub token_uri: String,
    pub user_id: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("token_uri", &self.token_uri)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    token_type: String,
}

/// Short-lived bearer token. Valid for at most an hour after issue; mint a new
/// one per invocation rather than holding on to it.
#[derive(Clone, PartialEq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn authorization(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.0))
            .map_err(|_| Error::Protocol("session token is not a valid header value".to_string()))
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(request.header(AUTHORIZATION, self.authorization()?))
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl Credential {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse API key: {e}")))
    }

    /// Builds the RS256-signed assertion presented to the token endpoint.
    pub fn signed_assertion(&self, now: i64) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(Error::Crypto)?;
        let claims = AssertionClaims {
            iss: self.client_id.clone(),
            sub: self.user_id.clone(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(Error::Signing)
    }

    pub async fn issue_session(&self, client: &Client) -> Result<SessionToken> {
        let assertion = self.signed_assertion(chrono::Utc::now().timestamp())?;
        let url = self.token_uri.as_str();

        let response = client
            .post(url)
            .headers(http::accept_json())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(Error::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| Error::transport(url, e))?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Protocol(format!("failed to decode token response: {e}")))?;
        debug!(
            expires_in = token.expires_in,
            token_type = %token.token_type,
            "issued session token"
        );
        Ok(SessionToken(token.access_token))
    }
}
