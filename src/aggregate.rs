use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::error::UsageError;
use crate::providers::{ProviderRegistry, Usage, UsageStats};
use crate::storage::{Credential, CredentialStore};

/// Account name used when a provider is requested but has no accounts.
pub const DEFAULT_ACCOUNT: &str = "default";

/// One configured provider account with its resolved secret.
#[derive(Debug, Clone)]
pub struct ConfiguredAccount {
    pub provider: String,
    pub account: String,
    pub credential: Option<Credential>,
    /// Why the stored secret could not be read, if it could not.
    pub credential_error: Option<String>,
}

/// Resolves the accounts to query, in configuration order.
///
/// When `providers` is non-empty only those providers are kept; a requested
/// provider with no stored account still yields an entry so it is reported
/// as not configured instead of silently disappearing. A secret that cannot
/// be read is recorded on its entry; only listing the accounts can fail.
pub fn resolve_accounts(
    store: &dyn CredentialStore,
    providers: &[String],
) -> Result<Vec<ConfiguredAccount>> {
    let mut resolved = Vec::new();

    for account in store.list_accounts()? {
        if !providers.is_empty() && !providers.contains(&account.provider) {
            continue;
        }

        let (credential, credential_error) = match store.resolve(&account.provider, &account.name)
        {
            Ok(credential) => (credential, None),
            Err(err) => {
                warn!(
                    provider = %account.provider,
                    account = %account.name,
                    error = %format!("{:#}", err),
                    "failed to read stored credential"
                );
                (None, Some(format!("{:#}", err)))
            }
        };

        resolved.push(ConfiguredAccount {
            provider: account.provider,
            account: account.name,
            credential,
            credential_error,
        });
    }

    for provider in providers {
        if !resolved.iter().any(|entry| &entry.provider == provider) {
            resolved.push(ConfiguredAccount {
                provider: provider.clone(),
                account: DEFAULT_ACCOUNT.to_string(),
                credential: None,
                credential_error: None,
            });
        }
    }

    Ok(resolved)
}

/// Fetches usage for every account, one `Usage` per account in input order.
///
/// Provider failures are recorded on their entry and never stop the run.
/// The only error returned is a registry whose factory builds an adapter
/// for a different provider than the one it was registered under.
pub async fn collect(
    accounts: &[ConfiguredAccount],
    registry: &ProviderRegistry,
) -> Result<UsageStats> {
    let mut providers = Vec::with_capacity(accounts.len());

    for entry in accounts {
        let account = Some(entry.account.as_str());

        let Some(registration) = registry.get(&entry.provider) else {
            warn!(provider = %entry.provider, "unknown provider");
            let error = UsageError::not_configured(&entry.provider.to_uppercase());
            providers.push(Usage::failed(&entry.provider, account, error));
            continue;
        };

        if let Some(reason) = &entry.credential_error {
            let error = UsageError::credential_unreadable(&registration.name, reason);
            providers.push(Usage::failed(&entry.provider, account, error));
            continue;
        }

        let credential = match &entry.credential {
            Some(credential) if credential.is_expired() => {
                info!(provider = %entry.provider, account = %entry.account, "credential expired");
                let error = UsageError::credential_expired(&registration.name);
                providers.push(Usage::failed(&entry.provider, account, error));
                continue;
            }
            Some(credential) => credential,
            None => {
                let error = UsageError::not_configured(&registration.name);
                providers.push(Usage::failed(&entry.provider, account, error));
                continue;
            }
        };

        let provider = registration.build(credential);
        if provider.id() != registration.id {
            bail!(
                "provider registered as '{}' built an adapter for '{}'",
                registration.id,
                provider.id()
            );
        }

        debug!(
            provider = %entry.provider,
            adapter = provider.name(),
            account = %entry.account,
            "fetching usage"
        );
        let usage = match provider.fetch_usage().await {
            Ok(report) => {
                debug!(
                    provider = %entry.provider,
                    windows = report.windows.len(),
                    "usage fetched"
                );
                Usage::from_report(&entry.provider, account, report)
            }
            Err(err) => {
                warn!(provider = %entry.provider, account = %entry.account, error = %err, "fetch failed");
                let error = UsageError::fetch_failed(&registration.name, &err);
                Usage::failed(&entry.provider, account, error)
            }
        };

        providers.push(usage);
    }

    Ok(UsageStats { providers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FetchError};
    use crate::providers::{Provider, UsageReport, UsageWindow};
    use crate::storage::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeProvider {
        id: &'static str,
        utilizations: Vec<f64>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Provider for FakeProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.id
        }

        async fn fetch_usage(&self) -> Result<UsageReport, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: "upstream down".to_string(),
                });
            }

            Ok(UsageReport {
                windows: self
                    .utilizations
                    .iter()
                    .map(|u| UsageWindow::new("Window", *u))
                    .collect(),
                ..Default::default()
            })
        }
    }

    fn registry(calls: Arc<AtomicUsize>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        let alpha_calls = calls.clone();
        registry.register("alpha", "Alpha", move |_| {
            Box::new(FakeProvider {
                id: "alpha",
                utilizations: vec![20.0, 81.5, 40.0],
                fail: false,
                calls: alpha_calls.clone(),
            })
        });
        registry.register("beta", "Beta", move |_| {
            Box::new(FakeProvider {
                id: "beta",
                utilizations: vec![99.0],
                fail: true,
                calls: calls.clone(),
            })
        });
        registry
    }

    fn configured(provider: &str, credential: Option<Credential>) -> ConfiguredAccount {
        ConfiguredAccount {
            provider: provider.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            credential,
            credential_error: None,
        }
    }

    #[tokio::test]
    async fn failure_is_isolated_per_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let accounts = vec![
            configured("alpha", Some(Credential::new("a"))),
            configured("beta", Some(Credential::new("b"))),
        ];

        let stats = collect(&accounts, &registry(calls.clone())).await.unwrap();

        assert_eq!(stats.providers.len(), 2);
        assert_eq!(stats.providers[0].provider, "alpha");
        assert!(stats.providers[0].error.is_none());
        assert_eq!(stats.providers[0].windows.len(), 3);

        let beta_error = stats.providers[1].error.as_ref().unwrap();
        assert_eq!(beta_error.kind, ErrorKind::FetchFailed);
        assert!(beta_error.message.starts_with("Beta: "));
        assert!(stats.providers[1].windows.is_empty());

        assert_eq!(stats.max_utilization(), 81.5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_entry_is_reported_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let expired = Credential::new("old")
            .with_expiry(Some(chrono::Utc::now() - chrono::Duration::hours(1)));
        let accounts = vec![
            configured("beta", Some(Credential::new("b"))),
            configured("gamma", Some(Credential::new("g"))),
            configured("alpha", None),
            configured("alpha", Some(expired)),
            configured("alpha", Some(Credential::new("a"))),
        ];

        let stats = collect(&accounts, &registry(calls.clone())).await.unwrap();

        let order: Vec<&str> = stats.providers.iter().map(|u| u.provider.as_str()).collect();
        assert_eq!(order, ["beta", "gamma", "alpha", "alpha", "alpha"]);

        let kinds: Vec<Option<ErrorKind>> = stats
            .providers
            .iter()
            .map(|u| u.error.as_ref().map(|e| e.kind))
            .collect();
        assert_eq!(
            kinds,
            [
                Some(ErrorKind::FetchFailed),
                Some(ErrorKind::NotConfigured),
                Some(ErrorKind::NotConfigured),
                Some(ErrorKind::CredentialExpired),
                None,
            ]
        );
        assert_eq!(
            stats.providers[1].error.as_ref().unwrap().message,
            "GAMMA: not configured"
        );

        // Adapters are only invoked for usable credentials.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mismatched_registration_is_fatal() {
        let mut registry = ProviderRegistry::new();
        registry.register("alpha", "Alpha", |_| {
            Box::new(FakeProvider {
                id: "beta",
                utilizations: Vec::new(),
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        });

        let accounts = vec![configured("alpha", Some(Credential::new("a")))];
        assert!(collect(&accounts, &registry).await.is_err());
    }

    #[tokio::test]
    async fn unimplemented_provider_is_reported() {
        let accounts = vec![configured("zai", Some(Credential::new("key")))];
        let stats = collect(&accounts, &ProviderRegistry::with_defaults())
            .await
            .unwrap();

        let error = stats.providers[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::NotImplemented);
        assert!(error.message.starts_with("Z.AI: "));
    }

    #[test]
    fn resolve_accounts_keeps_store_order() {
        let store = MemoryStore::new();
        store
            .save_account("kimi", "default", &Credential::new("k"))
            .unwrap();
        store
            .save_account("claude", "work", &Credential::new("c"))
            .unwrap();
        store.add_without_secret("claude", "home");

        let accounts = resolve_accounts(&store, &[]).unwrap();
        let pairs: Vec<(&str, &str, bool)> = accounts
            .iter()
            .map(|a| (a.provider.as_str(), a.account.as_str(), a.credential.is_some()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("kimi", "default", true),
                ("claude", "work", true),
                ("claude", "home", false)
            ]
        );
    }

    #[test]
    fn resolve_accounts_reports_requested_but_missing_providers() {
        let store = MemoryStore::new();
        store
            .save_account("kimi", "default", &Credential::new("k"))
            .unwrap();
        store
            .save_account("claude", "default", &Credential::new("c"))
            .unwrap();

        let filter = vec!["claude".to_string(), "zai".to_string()];
        let accounts = resolve_accounts(&store, &filter).unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].provider, "claude");
        assert_eq!(accounts[1].provider, "zai");
        assert!(accounts[1].credential.is_none());
    }

    /// Store whose keyring lookup fails for Claude accounts.
    struct UnreadableClaudeSecret(MemoryStore);

    impl CredentialStore for UnreadableClaudeSecret {
        fn list_accounts(&self) -> Result<Vec<crate::storage::Account>> {
            self.0.list_accounts()
        }

        fn save_account(&self, provider: &str, name: &str, credential: &Credential) -> Result<()> {
            self.0.save_account(provider, name, credential)
        }

        fn remove_account(&self, provider: &str, name: &str) -> Result<()> {
            self.0.remove_account(provider, name)
        }

        fn rename_account(&self, provider: &str, old_name: &str, new_name: &str) -> Result<()> {
            self.0.rename_account(provider, old_name, new_name)
        }

        fn resolve(&self, provider: &str, name: &str) -> Result<Option<Credential>> {
            if provider == "claude" {
                anyhow::bail!("Failed to parse stored credentials");
            }
            self.0.resolve(provider, name)
        }
    }

    #[tokio::test]
    async fn unreadable_secret_only_fails_its_own_entry() {
        let store = UnreadableClaudeSecret(MemoryStore::new());
        store
            .save_account("claude", "default", &Credential::new("c"))
            .unwrap();
        store
            .save_account("alpha", "default", &Credential::new("a"))
            .unwrap();

        let accounts = resolve_accounts(&store, &[]).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts[0].credential.is_none());
        assert!(accounts[0]
            .credential_error
            .as_deref()
            .unwrap()
            .contains("Failed to parse stored credentials"));
        assert!(accounts[1].credential_error.is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = registry(calls.clone());
        registry.register("claude", "Claude", |_| {
            Box::new(FakeProvider {
                id: "claude",
                utilizations: vec![1.0],
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        });

        let stats = collect(&accounts, &registry).await.unwrap();
        assert_eq!(stats.providers.len(), 2);

        let error = stats.providers[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::NotConfigured);
        assert!(error.message.starts_with("Claude: "));
        assert!(error.message.contains("Failed to parse stored credentials"));

        assert!(stats.providers[1].is_ok());
        assert_eq!(stats.max_utilization(), 81.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
