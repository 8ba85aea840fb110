// ===============================
// src/credentials.rs
// ===============================
use std::env;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ArchiveConfig, CredentialSource};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential secret {0} is not set")]
    MissingSecret(String),
    #[error("cannot read credential file {path}: {source}")]
    File { path: PathBuf, source: std::io::Error },
    #[error("malformed service account key: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cannot sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint rejected assertion ({status}): {body}")]
    Rejected { status: u16, body: String },
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Service account JSON key (subset of fields yang dipakai).
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

pub trait CredentialLoader: Send + Sync {
    fn load(&self) -> Result<ServiceAccountKey, AuthError>;
    fn describe(&self) -> String;
}

/// Key JSON disimpan di secret environment (mode deploy).
pub struct EnvSecretCredentials {
    pub var: String,
}

impl CredentialLoader for EnvSecretCredentials {
    fn load(&self) -> Result<ServiceAccountKey, AuthError> {
        let raw = env::var(&self.var).map_err(|_| AuthError::MissingSecret(self.var.clone()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn describe(&self) -> String {
        format!("env:{}", self.var)
    }
}

/// Key JSON di file lokal.
pub struct FileCredentials {
    pub path: PathBuf,
}

impl CredentialLoader for FileCredentials {
    fn load(&self) -> Result<ServiceAccountKey, AuthError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| AuthError::File { path: self.path.clone(), source })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

pub fn loader_for(cfg: &ArchiveConfig) -> Box<dyn CredentialLoader> {
    match cfg.credential_source {
        CredentialSource::EnvSecret => Box::new(EnvSecretCredentials { var: cfg.credential_env_var.clone() }),
        CredentialSource::File => Box::new(FileCredentials { path: cfg.credential_file.clone() }),
    }
}

/// Opaque handle: HTTP client + bearer token. Hanya dipakai oleh DriveClient.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    access_token: String,
}

impl AuthorizedClient {
    pub fn with_token(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self { http, access_token: access_token.into() }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// RS256 JWT assertion untuk OAuth2 service-account flow.
pub fn sign_assertion(key: &ServiceAccountKey, now_secs: i64) -> Result<String, AuthError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let claims = Claims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: &key.token_uri,
        iat: now_secs,
        exp: now_secs + ASSERTION_TTL_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&header, &claims, &signing_key)?)
}

pub async fn authorize(loader: &dyn CredentialLoader, http: reqwest::Client) -> Result<AuthorizedClient, AuthError> {
    let key = loader.load()?;
    debug!(source = %loader.describe(), client = %key.client_email, "credentials loaded");

    let assertion = sign_assertion(&key, Utc::now().timestamp())?;
    let rsp = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    if !rsp.status().is_success() {
        let status = rsp.status().as_u16();
        let body = rsp.text().await.unwrap_or_default();
        return Err(AuthError::Rejected { status, body });
    }
    let token: TokenResponse = rsp.json().await?;
    info!(client = %key.client_email, "drive access token acquired");
    Ok(AuthorizedClient::with_token(http, token.access_token))
}

#[cfg(test)]
pub mod fixtures {
    /// Kunci RSA khusus test, tidak pernah dipakai di luar unit test.
    pub const TEST_RSA_PEM: &str = include_str!("../testdata/test_rsa_key.pem");

    pub fn key_json(token_uri: &str) -> String {
        serde_json::json!({
            "type": "service_account",
            "client_email": "bills@example.iam.gserviceaccount.com",
            "private_key": TEST_RSA_PEM,
            "private_key_id": "kid-1",
            "token_uri": token_uri,
        })
        .to_string()
    }
}
