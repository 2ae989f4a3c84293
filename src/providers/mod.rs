pub mod claude;
pub mod kimi;
pub mod zai;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{FetchError, UsageError};
use crate::storage::Credential;

/// Providers known to this build, in the order they are offered to users.
pub const PROVIDERS: &[(&str, &str)] = &[("claude", "Claude"), ("kimi", "Kimi"), ("zai", "Z.AI")];

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("llm-usage/", env!("CARGO_PKG_VERSION"));

/// One observed quota period for a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageWindow {
    pub label: String,
    /// Percentage used. Not clamped, and non-finite when the provider
    /// reports a zero limit.
    #[serde(with = "finite_or_null")]
    pub utilization: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
}

impl UsageWindow {
    pub fn new(label: impl Into<String>, utilization: f64) -> Self {
        Self {
            label: label.into(),
            utilization,
            resets_at: None,
            limit: None,
            used: None,
            remaining: None,
        }
    }

    pub fn with_reset(mut self, resets_at: Option<DateTime<Utc>>) -> Self {
        self.resets_at = resets_at;
        self
    }

    /// Records absolute amounts; `remaining` is always `limit - used`.
    pub fn with_amounts(mut self, limit: f64, used: f64) -> Self {
        self.limit = Some(limit);
        self.used = Some(used);
        self.remaining = Some(limit - used);
        self
    }

    /// Time left until the window resets. Negative once the reset time has
    /// passed.
    pub fn time_until_reset(&self) -> Option<chrono::Duration> {
        self.time_until_reset_from(Utc::now())
    }

    pub fn time_until_reset_from(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.resets_at.map(|resets_at| resets_at - now)
    }

    pub fn has_usable_utilization(&self) -> bool {
        self.utilization.is_finite()
    }
}

/// Prepaid credit balance reported next to the regular windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraCredits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_credits: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
}

/// Provider-specific data that does not fit into a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_usage: Option<ExtraCredits>,
}

impl UsageExtra {
    pub fn is_empty(&self) -> bool {
        self.extra_usage.is_none()
    }
}

/// What an adapter hands back after normalizing a provider response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub windows: Vec<UsageWindow>,
    pub extra: UsageExtra,
}

/// Fetch outcome for one provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default)]
    pub windows: Vec<UsageWindow>,
    #[serde(default, skip_serializing_if = "UsageExtra::is_empty")]
    pub extra: UsageExtra,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UsageError>,
}

impl Usage {
    pub fn from_report(provider: &str, account: Option<&str>, report: UsageReport) -> Self {
        Self {
            provider: provider.to_string(),
            account: account.map(str::to_string),
            windows: report.windows,
            extra: report.extra,
            error: None,
        }
    }

    pub fn failed(provider: &str, account: Option<&str>, error: UsageError) -> Self {
        Self {
            provider: provider.to_string(),
            account: account.map(str::to_string),
            windows: Vec::new(),
            extra: UsageExtra::default(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn classify(max_utilization: f64) -> Self {
        if max_utilization >= 90.0 {
            Severity::Critical
        } else if max_utilization >= 75.0 {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results for every configured provider account, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub providers: Vec<Usage>,
}

impl UsageStats {
    /// Highest finite utilization across all providers without an error.
    pub fn max_utilization(&self) -> f64 {
        self.providers
            .iter()
            .filter(|usage| usage.is_ok())
            .flat_map(|usage| usage.windows.iter())
            .filter(|window| window.has_usable_utilization())
            .fold(0.0, |max, window| max.max(window.utilization))
    }

    pub fn severity(&self) -> Severity {
        Severity::classify(self.max_utilization())
    }

    pub fn provider(&self, id: &str) -> Option<&Usage> {
        self.providers.iter().find(|usage| usage.provider == id)
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    async fn fetch_usage(&self) -> Result<UsageReport, FetchError>;
}

pub type ProviderFactory = Box<dyn Fn(&Credential) -> Box<dyn Provider> + Send + Sync>;

pub struct Registration {
    pub id: String,
    pub name: String,
    factory: ProviderFactory,
}

impl Registration {
    pub fn build(&self, credential: &Credential) -> Box<dyn Provider> {
        (self.factory)(credential)
    }
}

/// Maps provider identifiers to adapter constructors.
#[derive(Default)]
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("claude", "Claude", |credential| {
            Box::new(claude::ClaudeProvider::new(&credential.secret))
        });
        registry.register("kimi", "Kimi", |credential| {
            Box::new(kimi::KimiProvider::new(&credential.secret))
        });
        registry.register("zai", "Z.AI", |_| Box::new(zai::ZaiProvider));
        registry
    }

    /// Registers a constructor, replacing any earlier one for the same id.
    pub fn register<F>(&mut self, id: &str, name: &str, factory: F)
    where
        F: Fn(&Credential) -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.registrations.retain(|registration| registration.id != id);
        self.registrations.push(Registration {
            id: id.to_string(),
            name: name.to_string(),
            factory: Box::new(factory),
        });
    }

    pub fn get(&self, id: &str) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|registration| registration.id == id)
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Sends the request and decodes a successful JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(FetchError::Status { status, body });
    }

    Ok(serde_json::from_str(&body)?)
}

/// JSON has no NaN or infinity, so unusable utilizations travel as `null`.
mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
