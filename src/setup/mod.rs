pub mod claude_cli;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use tracing::info;

use crate::providers::PROVIDERS;
use crate::storage::{Account, Credential, CredentialStore};

/// Display name for a provider id this build can talk to.
pub fn provider_name(provider: &str) -> Result<&'static str> {
    PROVIDERS
        .iter()
        .find(|(id, _)| *id == provider)
        .map(|(_, name)| *name)
        .with_context(|| {
            let known: Vec<&str> = PROVIDERS.iter().map(|(id, _)| *id).collect();
            format!(
                "Unknown provider '{}' (expected one of: {})",
                provider,
                known.join(", ")
            )
        })
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Account name cannot be empty");
    }
    Ok(trimmed)
}

pub fn add_account(
    store: &dyn CredentialStore,
    provider: &str,
    account: &str,
    secret: &str,
) -> Result<()> {
    provider_name(provider)?;
    let account = validate_name(account)?;

    let secret = secret.trim();
    if secret.is_empty() {
        bail!("API key cannot be empty");
    }

    store
        .save_account(provider, account, &Credential::new(secret))
        .context("Failed to save account")?;

    info!(provider, account, "account saved");
    Ok(())
}

/// Asks for the secret on stdin and stores it.
pub fn prompt_add(store: &dyn CredentialStore, provider: &str, account: &str) -> Result<()> {
    let name = provider_name(provider)?;

    println!("\n🔐 {} Account Setup\n", name);
    print!("Enter your {} API key or access token: ", name);
    io::stdout().flush()?;

    let mut secret = String::new();
    io::stdin()
        .read_line(&mut secret)
        .context("Failed to read API key")?;

    add_account(store, provider, account, &secret)?;
    println!("✓ Saved {} account '{}'", name, account.trim());

    Ok(())
}

pub fn list_accounts(store: &dyn CredentialStore, provider: Option<&str>) -> Result<Vec<Account>> {
    let accounts = store.list_accounts()?;

    Ok(accounts
        .into_iter()
        .filter(|account| provider.map_or(true, |p| account.provider == p))
        .collect())
}

pub fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts configured. Use 'llm-usage setup' to add an account.");
        return;
    }

    println!("\nConfigured Accounts:");
    println!("{}", "─".repeat(50));
    for account in accounts {
        println!(
            "  {} ({}) - added {}",
            account.name,
            account.provider,
            account.created_at.format("%Y-%m-%d")
        );
    }
    println!();
}

pub fn rename_account(
    store: &dyn CredentialStore,
    provider: &str,
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    let new_name = validate_name(new_name)?;
    store.rename_account(provider, old_name, new_name)
}

pub fn remove_account(store: &dyn CredentialStore, provider: &str, name: &str) -> Result<()> {
    store.remove_account(provider, name)
}

/// Imports the Claude CLI's OAuth token as the default Claude account.
///
/// Returns the token's expiry so callers can tell the user when to
/// re-run the migration.
pub fn migrate_claude(store: &dyn CredentialStore) -> Result<Option<DateTime<Utc>>> {
    let oauth = claude_cli::load()?;
    store_claude_oauth(store, oauth)
}

fn store_claude_oauth(
    store: &dyn CredentialStore,
    oauth: claude_cli::OAuthCredentials,
) -> Result<Option<DateTime<Utc>>> {
    if let Some(tier) = &oauth.rate_limit_tier {
        info!(tier = %tier, "migrating Claude CLI credentials");
    }

    let credential = oauth.into_credential();
    let expires_at = credential.expires_at;

    store
        .save_account("claude", crate::aggregate::DEFAULT_ACCOUNT, &credential)
        .context("Failed to save migrated Claude credentials")?;

    Ok(expires_at)
}
