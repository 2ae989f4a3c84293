#[cfg(test)]
pub mod memory;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const KEYRING_SERVICE: &str = "llm-usage";

/// Secret for one provider account, as handed to adapters.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub provider: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Account {
    pub fn new(provider: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            created_at: now,
            last_updated: now,
        }
    }

    fn matches(&self, provider: &str, name: &str) -> bool {
        self.provider == provider && self.name == name
    }
}

/// Source of configured accounts and their secrets.
pub trait CredentialStore {
    /// Accounts in configuration order.
    fn list_accounts(&self) -> Result<Vec<Account>>;
    fn save_account(&self, provider: &str, name: &str, credential: &Credential) -> Result<()>;
    fn remove_account(&self, provider: &str, name: &str) -> Result<()>;
    fn rename_account(&self, provider: &str, old_name: &str, new_name: &str) -> Result<()>;
    /// `None` when no secret is stored for the account.
    fn resolve(&self, provider: &str, name: &str) -> Result<Option<Credential>>;
}

/// Ordered account list persisted as `accounts.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct AccountsIndex {
    pub(crate) accounts: Vec<Account>,
}

impl AccountsIndex {
    /// Adds the account, or refreshes it in place so the order is kept.
    pub(crate) fn upsert(&mut self, provider: &str, name: &str) {
        match self
            .accounts
            .iter_mut()
            .find(|account| account.matches(provider, name))
        {
            Some(existing) => existing.last_updated = Utc::now(),
            None => self.accounts.push(Account::new(provider, name)),
        }
    }

    pub(crate) fn remove(&mut self, provider: &str, name: &str) -> Result<()> {
        let len_before = self.accounts.len();
        self.accounts
            .retain(|account| !account.matches(provider, name));

        if self.accounts.len() == len_before {
            bail!("Account '{}' not found for {}", name, provider);
        }

        Ok(())
    }

    pub(crate) fn rename(&mut self, provider: &str, old_name: &str, new_name: &str) -> Result<()> {
        if self
            .accounts
            .iter()
            .any(|account| account.matches(provider, new_name))
        {
            bail!(
                "An account named '{}' already exists for {}",
                new_name,
                provider
            );
        }

        let target = self
            .accounts
            .iter_mut()
            .find(|account| account.matches(provider, old_name))
            .with_context(|| format!("Account '{}' not found for {}", old_name, provider))?;

        target.name = new_name.to_string();
        target.last_updated = Utc::now();

        Ok(())
    }
}

/// Account index on disk, secrets in the OS keyring.
pub struct SecureStorage {
    config_dir: PathBuf,
}

impl SecureStorage {
    pub fn new(config_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("Failed to get config directory")?
                .join("llm-usage"),
        };

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn index_path(&self) -> PathBuf {
        self.config_dir.join("accounts.json")
    }

    fn load_index(&self) -> Result<AccountsIndex> {
        let path = self.index_path();

        if !path.exists() {
            return Ok(AccountsIndex::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read accounts index")?;

        let index: AccountsIndex =
            serde_json::from_str(&content).context("Failed to parse accounts index")?;

        Ok(index)
    }

    fn save_index(&self, index: &AccountsIndex) -> Result<()> {
        let content =
            serde_json::to_string_pretty(index).context("Failed to serialize accounts index")?;

        fs::write(self.index_path(), content).context("Failed to write accounts index")?;

        Ok(())
    }

    fn entry(provider: &str, name: &str) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, &format!("{}:{}", provider, name))
            .context("Failed to create keyring entry")
    }

    fn store_credential(&self, provider: &str, name: &str, credential: &Credential) -> Result<()> {
        let value =
            serde_json::to_string(credential).context("Failed to serialize credentials")?;

        Self::entry(provider, name)?
            .set_password(&value)
            .context("Failed to store credentials in keyring")
    }

    fn delete_credential(&self, provider: &str, name: &str) -> Result<()> {
        // Ignore error if entry doesn't exist
        let _ = Self::entry(provider, name)?.delete_password();
        Ok(())
    }
}

impl CredentialStore for SecureStorage {
    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.load_index()?.accounts)
    }

    fn save_account(&self, provider: &str, name: &str, credential: &Credential) -> Result<()> {
        self.store_credential(provider, name, credential)?;

        let mut index = self.load_index()?;
        index.upsert(provider, name);
        self.save_index(&index)
    }

    fn remove_account(&self, provider: &str, name: &str) -> Result<()> {
        let mut index = self.load_index()?;
        index.remove(provider, name)?;

        self.delete_credential(provider, name)?;
        self.save_index(&index)
    }

    fn rename_account(&self, provider: &str, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }

        let mut index = self.load_index()?;
        index.rename(provider, old_name, new_name)?;

        let credential = self
            .resolve(provider, old_name)?
            .with_context(|| format!("No stored credentials for '{}'", old_name))?;
        self.store_credential(provider, new_name, &credential)?;
        self.delete_credential(provider, old_name)?;

        self.save_index(&index)
    }

    fn resolve(&self, provider: &str, name: &str) -> Result<Option<Credential>> {
        let value = match Self::entry(provider, name)?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => {
                debug!(provider, account = name, "no keyring entry");
                return Ok(None);
            }
            Err(err) => {
                return Err(err).context("Failed to retrieve credentials from keyring");
            }
        };

        let credential =
            serde_json::from_str(&value).context("Failed to parse stored credentials")?;

        Ok(Some(credential))
    }
}
