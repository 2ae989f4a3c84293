use super::{Account, AccountsIndex, Credential, CredentialStore};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Credential store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    index: AccountsIndex,
    secrets: HashMap<(String, String), Credential>,
}

fn key(provider: &str, name: &str) -> (String, String) {
    (provider.to_string(), name.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account to the index without storing a secret for it.
    pub fn add_without_secret(&self, provider: &str, name: &str) {
        self.inner.lock().unwrap().index.upsert(provider, name);
    }
}

impl CredentialStore for MemoryStore {
    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.inner.lock().unwrap().index.accounts.clone())
    }

    fn save_account(&self, provider: &str, name: &str, credential: &Credential) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.secrets.insert(key(provider, name), credential.clone());
        inner.index.upsert(provider, name);
        Ok(())
    }

    fn remove_account(&self, provider: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.index.remove(provider, name)?;
        inner.secrets.remove(&key(provider, name));
        Ok(())
    }

    fn rename_account(&self, provider: &str, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();
        inner.index.rename(provider, old_name, new_name)?;

        let credential = inner
            .secrets
            .remove(&key(provider, old_name))
            .with_context(|| format!("No stored credentials for '{}'", old_name))?;
        inner.secrets.insert(key(provider, new_name), credential);
        Ok(())
    }

    fn resolve(&self, provider: &str, name: &str) -> Result<Option<Credential>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .secrets
            .get(&key(provider, name))
            .cloned())
    }
}
