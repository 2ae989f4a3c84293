use colored::{ColoredString, Colorize};
use unicode_width::UnicodeWidthStr;

use super::{display_name, format_duration, format_percent, progress_bar, provider_title};
use crate::providers::{ExtraCredits, Severity, Usage, UsageStats, UsageWindow};

pub fn render(stats: &UsageStats) -> String {
    let mut lines = vec![
        "LLM Usage Statistics".bold().to_string(),
        "====================".to_string(),
        String::new(),
    ];

    if stats.providers.is_empty() {
        lines.push("No accounts configured. Run 'llm-usage setup' to add one.".to_string());
    }

    for usage in &stats.providers {
        render_provider(&mut lines, usage);
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_provider(lines: &mut Vec<String>, usage: &Usage) {
    let title = provider_title(&usage.provider, usage.account.as_deref());

    if let Some(error) = &usage.error {
        lines.push(format!("{}:", title));
        lines.push(format!("  {} {}", "Error:".red(), error));
        return;
    }

    lines.push(format!("{}:", title.bold()));
    lines.push("-".repeat(title.width() + 1));

    if usage.windows.is_empty() && usage.extra.is_empty() {
        lines.push(format!("  No usage reported by {}", display_name(&usage.provider)));
    }

    for window in &usage.windows {
        render_window(lines, window);
    }

    if let Some(credits) = &usage.extra.extra_usage {
        render_credits(lines, credits);
    }
}

fn render_window(lines: &mut Vec<String>, window: &UsageWindow) {
    lines.push(format!("  {}:", window.label));
    lines.push(format!(
        "    Usage:    {}  {}",
        progress_bar(window.utilization),
        colorize(window.utilization)
    ));

    if let (Some(used), Some(limit)) = (window.used, window.limit) {
        lines.push(format!("    Amount:   {} / {}", used, limit));
    }

    let resets = match window.time_until_reset() {
        Some(remaining) if remaining < chrono::Duration::zero() => "expired".to_string(),
        Some(remaining) => format!("in {}", format_duration(remaining)),
        None => "N/A".to_string(),
    };
    lines.push(format!("    Resets:   {}", resets));
}

fn render_credits(lines: &mut Vec<String>, credits: &ExtraCredits) {
    lines.push("Extra Usage Credits:".to_string());

    if let Some(utilization) = credits.utilization {
        lines.push(format!(
            "  Usage:    {}  {}",
            progress_bar(utilization),
            colorize(utilization)
        ));
    }

    if let (Some(used), Some(limit)) = (credits.used_credits, credits.monthly_limit) {
        lines.push(format!("  Credits:  ${:.2} / ${:.2}", used, limit));
    }
}

fn colorize(utilization: f64) -> ColoredString {
    let text = format_percent(utilization);
    if !utilization.is_finite() {
        return text.dimmed();
    }

    match Severity::classify(utilization) {
        Severity::Critical => text.red().bold(),
        Severity::Warning => text.yellow(),
        Severity::Normal => text.green(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsageError;
    use crate::providers::{UsageExtra, UsageReport};

    fn plain(stats: &UsageStats) -> String {
        colored::control::set_override(false);
        render(stats)
    }

    #[test]
    fn renders_windows_and_errors() {
        let reset = chrono::Utc::now() + chrono::Duration::hours(2) + chrono::Duration::minutes(30);
        let stats = UsageStats {
            providers: vec![
                Usage::from_report(
                    "kimi",
                    Some("work"),
                    UsageReport {
                        windows: vec![
                            UsageWindow::new("Feature Coding", 42.0)
                                .with_amounts(100.0, 42.0)
                                .with_reset(Some(reset)),
                            UsageWindow::new("5-Minute Rate Limit", f64::NAN),
                        ],
                        extra: UsageExtra::default(),
                    },
                ),
                Usage::failed("zai", Some("default"), UsageError::not_configured("Z.AI")),
            ],
        };

        let output = plain(&stats);

        assert!(output.starts_with("LLM Usage Statistics"));
        assert!(output.contains("Kimi (work):\n------------\n"));
        assert!(output.contains("  Feature Coding:"));
        assert!(output.contains("42.0%"));
        assert!(output.contains("Amount:   42 / 100"));
        assert!(output.contains("Resets:   in 2h"));
        assert!(output.contains("  5-Minute Rate Limit:"));
        assert!(output.contains("N/A"));
        assert!(output.contains("Z.AI:\n  Error: Z.AI: not configured"));
    }

    #[test]
    fn renders_expired_reset_and_credits() {
        let stats = UsageStats {
            providers: vec![Usage::from_report(
                "claude",
                Some("default"),
                UsageReport {
                    windows: vec![UsageWindow::new("5-Hour", 95.0)
                        .with_reset(Some(chrono::Utc::now() - chrono::Duration::hours(1)))],
                    extra: UsageExtra {
                        extra_usage: Some(ExtraCredits {
                            utilization: Some(25.0),
                            used_credits: Some(12.5),
                            monthly_limit: Some(50.0),
                        }),
                    },
                },
            )],
        };

        let output = plain(&stats);

        assert!(output.contains("Claude (Pro/Max Subscription):"));
        assert!(output.contains("Resets:   expired"));
        assert!(output.contains("Extra Usage Credits:"));
        assert!(output.contains("Credits:  $12.50 / $50.00"));
    }

    #[test]
    fn empty_provider_does_not_crash() {
        let stats = UsageStats {
            providers: vec![Usage::from_report("claude", None, UsageReport::default())],
        };

        let output = plain(&stats);
        assert!(output.contains("No usage reported by Claude"));
    }

    #[test]
    fn empty_stats_point_to_setup() {
        let output = plain(&UsageStats::default());
        assert!(output.contains("llm-usage setup"));
    }
}
