use super::{ExtraCredits, Provider, UsageExtra, UsageReport, UsageWindow};
use crate::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

const BASE_URL: &str = "https://api.anthropic.com";
const USAGE_ENDPOINT: &str = "/api/oauth/usage";
const BETA_HEADER: &str = "oauth-2025-04-20";

pub struct ClaudeProvider {
    access_token: String,
}

impl ClaudeProvider {
    pub fn new(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ClaudeProvider {
    fn id(&self) -> &str {
        "claude"
    }

    fn name(&self) -> &str {
        "Claude"
    }

    async fn fetch_usage(&self) -> Result<UsageReport, FetchError> {
        let url = Url::parse(BASE_URL)?.join(USAGE_ENDPOINT)?;
        debug!(%url, "fetching Claude usage");

        let request = super::http_client()?
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("anthropic-beta", BETA_HEADER);

        let response: ClaudeUsageResponse = super::fetch_json(request).await?;
        Ok(normalize(response))
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaudeUsageResponse {
    #[serde(default)]
    pub five_hour: Option<ClaudeWindow>,
    #[serde(default)]
    pub seven_day: Option<ClaudeWindow>,
    #[serde(default)]
    pub seven_day_sonnet: Option<ClaudeWindow>,
    #[serde(default)]
    pub seven_day_opus: Option<ClaudeWindow>,
    #[serde(default)]
    pub seven_day_oauth_apps: Option<ClaudeWindow>,
    #[serde(default)]
    pub iguana_necktie: Option<ClaudeWindow>,
    #[serde(default)]
    pub extra_usage: Option<ClaudeExtraUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ClaudeWindow {
    pub utilization: f64,
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ClaudeExtraUsage {
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub monthly_limit: Option<f64>,
    #[serde(default)]
    pub used_credits: Option<f64>,
    #[serde(default)]
    pub utilization: Option<f64>,
}

/// Turns the fixed set of named windows into an ordered window list.
///
/// Absent windows are skipped. Credits only show up when the account has
/// extra usage enabled.
pub fn normalize(response: ClaudeUsageResponse) -> UsageReport {
    let named = [
        ("5-Hour", response.five_hour),
        ("7-Day", response.seven_day),
        ("7-Day Sonnet", response.seven_day_sonnet),
        ("7-Day Opus", response.seven_day_opus),
        ("7-Day OAuth Apps", response.seven_day_oauth_apps),
        ("Iguana Necktie", response.iguana_necktie),
    ];

    let windows = named
        .into_iter()
        .filter_map(|(label, window)| {
            window.map(|w| UsageWindow::new(label, w.utilization).with_reset(w.resets_at))
        })
        .collect();

    let extra_usage = response
        .extra_usage
        .filter(|extra| extra.is_enabled)
        .map(|extra| ExtraCredits {
            utilization: extra.utilization,
            used_credits: extra.used_credits,
            monthly_limit: extra.monthly_limit,
        });

    UsageReport {
        windows,
        extra: UsageExtra { extra_usage },
    }
}
