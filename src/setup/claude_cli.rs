use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::storage::Credential;

#[cfg(target_os = "macos")]
const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";

/// Layout of `~/.claude/.credentials.json` as written by the Claude CLI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliCredentialsFile {
    claude_ai_oauth: Option<OAuthCredentials>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    pub access_token: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub rate_limit_tier: Option<String>,
}

impl OAuthCredentials {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at.and_then(DateTime::from_timestamp_millis)
    }

    pub fn into_credential(self) -> Credential {
        let expires_at = self.expires_at();
        Credential::new(self.access_token).with_expiry(expires_at)
    }
}

pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".claude").join(".credentials.json"))
}

/// Reads the Claude CLI's OAuth credentials, preferring the macOS keychain
/// and falling back to the credentials file.
pub fn load() -> Result<OAuthCredentials> {
    if let Some(data) = load_from_keychain() {
        return parse(&data);
    }

    load_from_path(&default_path()?)
}

pub fn load_from_path(path: &Path) -> Result<OAuthCredentials> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            bail!(
                "credentials file not found at {} - please run 'claude' first to authenticate",
                path.display()
            );
        }
        Err(err) => return Err(err).context("Failed to read credentials file"),
    };

    parse(&data)
}

fn parse(data: &str) -> Result<OAuthCredentials> {
    let file: CliCredentialsFile =
        serde_json::from_str(data).context("Failed to parse credentials")?;

    let oauth = file
        .claude_ai_oauth
        .context("no OAuth credentials found - please run 'claude' to authenticate")?;

    if oauth.access_token.is_empty() {
        bail!("no access token found in credentials");
    }

    Ok(oauth)
}

#[cfg(target_os = "macos")]
fn load_from_keychain() -> Option<String> {
    let user = std::env::var("USER").ok()?;
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &user).ok()?;

    match entry.get_password() {
        Ok(data) => Some(data),
        Err(err) => {
            debug!(error = %err, "Claude CLI keychain entry unavailable");
            None
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn load_from_keychain() -> Option<String> {
    debug!("keychain lookup for Claude CLI credentials is macOS only");
    None
}
