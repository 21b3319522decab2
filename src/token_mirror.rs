//! Plain-text token file shared with non-web clients.
//!
//! One `key=value` pair per line. The file holds live secrets, so it is always
//! written owner-only.

use crate::types::Credential;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Token fields as read back from a mirror file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirroredTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

pub fn render(credential: &Credential) -> String {
    format!(
        "access_token={}\nrefresh_token={}\ntoken_uri={}\nclient_id={}\nclient_secret={}\n",
        credential.access_token,
        credential.refresh_token.as_deref().unwrap_or_default(),
        credential.token_uri,
        credential.client_id,
        credential.client_secret,
    )
}

pub fn parse(contents: &str) -> MirroredTokens {
    let mut tokens = MirroredTokens::default();
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "access_token" => tokens.access_token = value,
            "refresh_token" => tokens.refresh_token = value,
            "token_uri" => tokens.token_uri = value,
            "client_id" => tokens.client_id = value,
            "client_secret" => tokens.client_secret = value,
            other => debug!("Ignoring unknown token mirror key: {}", other),
        }
    }
    tokens
}

pub fn write(path: &Path, credential: &Credential) -> Result<()> {
    write_private(path, render(credential).as_bytes())?;
    info!("Mirrored tokens to {}", path.display());
    Ok(())
}

pub fn read(path: &Path) -> Result<MirroredTokens> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Unable to open token file {}", path.display()))?;
    Ok(parse(&contents))
}

/// Writes `contents` so that only the owner can read them, creating parent
/// directories as needed.
pub fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    // `mode` only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
