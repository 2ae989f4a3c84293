use super::{Provider, UsageExtra, UsageReport, UsageWindow};
use crate::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

const BASE_URL: &str = "https://api.kimi.com";
const USAGE_ENDPOINT: &str = "/coding/v1/usages";
const TIME_UNIT_PREFIX: &str = "TIME_UNIT_";

pub struct KimiProvider {
    api_key: String,
}

impl KimiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for KimiProvider {
    fn id(&self) -> &str {
        "kimi"
    }

    fn name(&self) -> &str {
        "Kimi"
    }

    async fn fetch_usage(&self) -> Result<UsageReport, FetchError> {
        let url = Url::parse(BASE_URL)?.join(USAGE_ENDPOINT)?;
        debug!(%url, "fetching Kimi usage");

        let request = super::http_client()?
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json");

        let response: KimiUsageResponse = super::fetch_json(request).await?;
        Ok(normalize(response))
    }
}

#[derive(Debug, Deserialize)]
pub struct KimiUsageResponse {
    #[serde(default)]
    pub usages: Vec<KimiUsageItem>,
}

#[derive(Debug, Deserialize)]
pub struct KimiUsageItem {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub detail: KimiDetail,
    #[serde(default)]
    pub limits: Vec<KimiRateLimit>,
}

/// Amounts arrive as strings and are parsed on normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KimiDetail {
    #[serde(default)]
    pub limit: String,
    #[serde(default)]
    pub used: String,
    #[serde(default)]
    pub remaining: Option<String>,
    #[serde(default)]
    pub reset_time: String,
}

#[derive(Debug, Deserialize)]
pub struct KimiRateLimit {
    #[serde(default)]
    pub window: Option<KimiWindow>,
    #[serde(default)]
    pub detail: KimiDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KimiWindow {
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub time_unit: String,
}

/// Flattens usage items into windows: each scope window first, followed by
/// its rate-limit windows. Entries with unparsable amounts or without a
/// window descriptor are dropped.
pub fn normalize(response: KimiUsageResponse) -> UsageReport {
    let mut windows = Vec::new();

    for item in response.usages {
        if let Some(window) = parse_detail(scope_label(&item.scope), &item.detail) {
            windows.push(window);
        }

        for limit in &item.limits {
            let Some(descriptor) = &limit.window else {
                warn!(scope = %item.scope, "skipping Kimi rate limit without a window");
                continue;
            };

            let label = rate_limit_label(descriptor.duration, &descriptor.time_unit);
            if let Some(window) = parse_detail(label, &limit.detail) {
                windows.push(window);
            }
        }
    }

    UsageReport {
        windows,
        extra: UsageExtra::default(),
    }
}

fn parse_detail(label: String, detail: &KimiDetail) -> Option<UsageWindow> {
    let (limit, used) = match (
        detail.limit.parse::<f64>(),
        detail.used.parse::<f64>(),
    ) {
        (Ok(limit), Ok(used)) => (limit, used),
        _ => {
            warn!(
                label = %label,
                limit = %detail.limit,
                used = %detail.used,
                "skipping Kimi window with unparsable amounts"
            );
            return None;
        }
    };

    // A zero limit yields a non-finite utilization; renderers show it as N/A.
    let utilization = (used / limit) * 100.0;

    Some(
        UsageWindow::new(label, utilization)
            .with_reset(parse_reset_time(&detail.reset_time))
            .with_amounts(limit, used),
    )
}

fn parse_reset_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }

    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            debug!(value, error = %err, "ignoring unparsable Kimi reset time");
            None
        }
    }
}

/// `FEATURE_CODING` becomes `Feature Coding`.
pub fn scope_label(scope: &str) -> String {
    scope
        .split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `(5, "TIME_UNIT_MINUTES")` becomes `5-Minute Rate Limit`.
///
/// Singularizing only drops a trailing `s`.
pub fn rate_limit_label(duration: i64, time_unit: &str) -> String {
    let unit = time_unit
        .strip_prefix(TIME_UNIT_PREFIX)
        .unwrap_or(time_unit)
        .to_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);

    format!("{}-{} Rate Limit", duration, capitalize(unit))
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
