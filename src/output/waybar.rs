use serde::{Deserialize, Serialize};

use super::{display_name, format_duration, provider_title, short_name};
use crate::providers::UsageStats;

/// Payload for a waybar `custom` module with `return-type: json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaybarOutput {
    pub text: String,
    pub tooltip: String,
    pub class: String,
    pub percentage: u32,
}

pub fn build(stats: &UsageStats) -> WaybarOutput {
    let text = stats
        .providers
        .iter()
        .filter(|usage| usage.is_ok())
        .filter_map(|usage| {
            let first = usage.windows.first()?;
            let percent = if first.has_usable_utilization() {
                format!("{:.0}%", first.utilization)
            } else {
                "N/A".to_string()
            };
            Some(format!("{}:{}", short_name(&usage.provider), percent))
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut tooltip = vec!["LLM Usage".to_string(), String::new()];

    for usage in &stats.providers {
        if usage.error.is_some() {
            tooltip.push(format!("{}: Error", display_name(&usage.provider)));
            continue;
        }

        let title = provider_title(&usage.provider, usage.account.as_deref());
        for window in &usage.windows {
            let mut line = format!(
                "{} {}: {}",
                title,
                window.label,
                super::format_percent(window.utilization)
            );
            if let Some(remaining) = window.time_until_reset() {
                line.push_str(&format!(" (resets in {})", format_duration(remaining)));
            }
            tooltip.push(line);
        }
    }

    WaybarOutput {
        text,
        tooltip: tooltip.join("\n"),
        class: stats.severity().to_string(),
        percentage: stats.max_utilization() as u32,
    }
}

/// Shown in the bar when usage could not be collected at all.
pub fn error(message: &str) -> WaybarOutput {
    WaybarOutput {
        text: "LLM: Error".to_string(),
        tooltip: message.to_string(),
        class: "error".to_string(),
        percentage: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsageError;
    use crate::providers::{Usage, UsageReport, UsageWindow};

    fn stats() -> UsageStats {
        UsageStats {
            providers: vec![
                Usage::from_report(
                    "claude",
                    Some("default"),
                    UsageReport {
                        windows: vec![
                            UsageWindow::new("5-Hour", 76.4),
                            UsageWindow::new("7-Day", 30.0),
                        ],
                        ..Default::default()
                    },
                ),
                Usage::from_report(
                    "kimi",
                    Some("work"),
                    UsageReport {
                        windows: vec![UsageWindow::new("Feature Coding", 12.0)],
                        ..Default::default()
                    },
                ),
                Usage::failed("zai", Some("default"), UsageError::not_configured("Z.AI")),
            ],
        }
    }

    #[test]
    fn summarizes_healthy_providers() {
        let output = build(&stats());

        assert_eq!(output.text, "C:76% K:12%");
        assert_eq!(output.class, "warning");
        assert_eq!(output.percentage, 76);

        let lines: Vec<&str> = output.tooltip.lines().collect();
        assert_eq!(
            lines,
            [
                "LLM Usage",
                "",
                "Claude (Pro/Max Subscription) 5-Hour: 76.4%",
                "Claude (Pro/Max Subscription) 7-Day: 30.0%",
                "Kimi (work) Feature Coding: 12.0%",
                "Z.AI: Error",
            ]
        );
    }

    #[test]
    fn expired_reset_is_spelled_out() {
        let stats = UsageStats {
            providers: vec![Usage::from_report(
                "claude",
                None,
                UsageReport {
                    windows: vec![UsageWindow::new("5-Hour", 91.0)
                        .with_reset(Some(chrono::Utc::now() - chrono::Duration::hours(1)))],
                    ..Default::default()
                },
            )],
        };

        let output = build(&stats);
        assert_eq!(output.class, "critical");
        assert!(output.tooltip.ends_with("5-Hour: 91.0% (resets in expired)"));
    }

    #[test]
    fn error_payload_serializes() {
        let json = serde_json::to_value(error("storage unavailable")).unwrap();
        assert_eq!(json["text"], "LLM: Error");
        assert_eq!(json["class"], "error");
        assert_eq!(json["percentage"], 0);
        assert_eq!(json["tooltip"], "storage unavailable");
    }
}
