pub mod json;
pub mod pretty;
pub mod waybar;

const BAR_WIDTH: usize = 20;
const BAR_FULL: &str = "█";
const BAR_EMPTY: &str = "░";

pub fn display_name(provider: &str) -> String {
    match provider {
        "claude" => "Claude (Pro/Max Subscription)".to_string(),
        "kimi" => "Kimi".to_string(),
        "zai" => "Z.AI".to_string(),
        other => other.to_uppercase(),
    }
}

fn short_name(provider: &str) -> String {
    match provider {
        "claude" => "C".to_string(),
        "kimi" => "K".to_string(),
        "zai" => "Z".to_string(),
        other => other
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default(),
    }
}

/// `"Kimi (work)"` or just `"Kimi"` for the default account.
fn provider_title(provider: &str, account: Option<&str>) -> String {
    match account {
        Some(account) if account != crate::aggregate::DEFAULT_ACCOUNT => {
            format!("{} ({})", display_name(provider), account)
        }
        _ => display_name(provider),
    }
}

pub fn progress_bar(percentage: f64) -> String {
    let filled = if percentage.is_finite() {
        ((percentage / 100.0 * BAR_WIDTH as f64) as i64).clamp(0, BAR_WIDTH as i64) as usize
    } else {
        0
    };

    format!(
        "{}{}",
        BAR_FULL.repeat(filled),
        BAR_EMPTY.repeat(BAR_WIDTH - filled)
    )
}

pub fn format_percent(utilization: f64) -> String {
    if utilization.is_finite() {
        format!("{:.1}%", utilization)
    } else {
        "N/A".to_string()
    }
}

/// Compact `1d 2h 5m` style; anything already past is `expired`.
pub fn format_duration(duration: chrono::Duration) -> String {
    if duration < chrono::Duration::zero() {
        return "expired".to_string();
    }

    let total_hours = duration.num_hours();
    let days = total_hours / 24;
    let hours = total_hours % 24;
    let minutes = duration.num_minutes() % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{}m", minutes));
    }

    parts.join(" ")
}
