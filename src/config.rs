use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub drive_api_base: String,
    pub drive_upload_base: String,
    pub scopes: Vec<String>,
    pub token_mirror_path: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub download_chunk_size: u64,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// Google `credentials.json` as downloaded from the cloud console.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secrets from {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(raw).context("Invalid client secrets JSON")?;
        file.web
            .or(file.installed)
            .ok_or_else(|| anyhow!("Client secrets must contain a `web` or `installed` section"))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let secrets = match std::env::var("CLIENT_SECRETS_FILE") {
            Ok(path) => Some(ClientSecrets::from_file(Path::new(&path))?),
            Err(_) => None,
        };

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid PORT")?;

        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .ok()
            .or_else(|| secrets.as_ref().map(|s| s.client_id.clone()))
            .context("GOOGLE_CLIENT_ID or CLIENT_SECRETS_FILE must be set")?;

        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .ok()
            .or_else(|| secrets.as_ref().map(|s| s.client_secret.clone()))
            .context("GOOGLE_CLIENT_SECRET or CLIENT_SECRETS_FILE must be set")?;

        let redirect_uri = std::env::var("REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://localhost:{}/oauth2callback", port));
        Url::parse(&redirect_uri).context("Invalid REDIRECT_URI")?;

        let auth_url = std::env::var("AUTH_URL")
            .ok()
            .or_else(|| secrets.as_ref().and_then(|s| s.auth_uri.clone()))
            .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
        Url::parse(&auth_url).context("Invalid AUTH_URL")?;

        let token_url = std::env::var("TOKEN_URL")
            .ok()
            .or_else(|| secrets.as_ref().and_then(|s| s.token_uri.clone()))
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        Url::parse(&token_url).context("Invalid TOKEN_URL")?;

        let scopes = parse_scopes(
            &std::env::var("OAUTH_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPE.to_string()),
        );
        if scopes.is_empty() {
            return Err(anyhow!("OAUTH_SCOPES must name at least one scope"));
        }

        Ok(Self {
            port,
            client_id,
            client_secret,
            redirect_uri,
            auth_url,
            token_url,
            drive_api_base: std::env::var("DRIVE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_DRIVE_API_BASE.to_string()),
            drive_upload_base: std::env::var("DRIVE_UPLOAD_BASE")
                .unwrap_or_else(|_| DEFAULT_DRIVE_UPLOAD_BASE.to_string()),
            scopes,
            token_mirror_path: non_empty_path("TOKEN_MIRROR_PATH"),
            session_file: non_empty_path("SESSION_FILE").or_else(|| {
                dirs::data_local_dir().map(|dir| dir.join("drive-gateway").join("sessions.json"))
            }),
            session_ttl: Duration::from_secs(env_number("SESSION_TTL_SECS", 86_400)?),
            download_chunk_size: env_number("DOWNLOAD_CHUNK_SIZE", 10 * 1024 * 1024)?.max(1),
            request_timeout: Duration::from_secs(env_number("REQUEST_TIMEOUT_SECS", 300)?),
            max_upload_bytes: env_number("MAX_UPLOAD_BYTES", 100 * 1024 * 1024)? as usize,
        })
    }

    pub fn server_address(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }

    /// Baseline config pointing every provider endpoint at `base`.
    #[cfg(test)]
    pub fn for_tests(base: &str) -> Self {
        Self {
            port: 0,
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:8080/oauth2callback".to_string(),
            auth_url: format!("{}/o/oauth2/auth", base),
            token_url: format!("{}/token", base),
            drive_api_base: format!("{}/drive/v3", base),
            drive_upload_base: format!("{}/upload/drive/v3", base),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            token_mirror_path: None,
            session_file: None,
            session_ttl: Duration::from_secs(3600),
            download_chunk_size: 4,
            request_timeout: Duration::from_secs(30),
            max_upload_bytes: 1024 * 1024,
        }
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn env_number(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}
