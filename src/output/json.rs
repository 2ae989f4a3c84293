use anyhow::{Context, Result};

use crate::providers::UsageStats;

pub fn render(stats: &UsageStats) -> Result<String> {
    serde_json::to_string_pretty(stats).context("Failed to encode usage as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, UsageError};
    use crate::providers::{Usage, UsageReport, UsageWindow};

    #[test]
    fn encodes_and_decodes_labels_and_utilization() {
        let stats = UsageStats {
            providers: vec![
                Usage::from_report(
                    "kimi",
                    Some("default"),
                    UsageReport {
                        windows: vec![
                            UsageWindow::new("Feature Coding", 42.0).with_amounts(100.0, 42.0),
                            UsageWindow::new("5-Minute Rate Limit", 0.1 + 0.2),
                        ],
                        ..Default::default()
                    },
                ),
                Usage::failed(
                    "claude",
                    Some("default"),
                    UsageError::credential_expired("Claude"),
                ),
            ],
        };

        let json = render(&stats).unwrap();
        let decoded: UsageStats = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.providers.len(), 2);
        assert_eq!(decoded.providers[0].provider, "kimi");
        assert_eq!(decoded.providers[0].windows[0].label, "Feature Coding");
        assert!((decoded.providers[0].windows[1].utilization - 0.3).abs() < 1e-9);
        assert_eq!(decoded.providers[0].windows[0].remaining, Some(58.0));
        assert_eq!(
            decoded.providers[1].error.as_ref().unwrap().kind,
            ErrorKind::CredentialExpired
        );
    }

    #[test]
    fn omits_absent_fields() {
        let stats = UsageStats {
            providers: vec![Usage::from_report(
                "claude",
                None,
                UsageReport {
                    windows: vec![UsageWindow::new("5-Hour", 10.0)],
                    ..Default::default()
                },
            )],
        };

        let value: serde_json::Value = serde_json::from_str(&render(&stats).unwrap()).unwrap();
        let usage = &value["providers"][0];

        assert!(usage.get("error").is_none());
        assert!(usage.get("extra").is_none());
        assert!(usage.get("account").is_none());
        assert!(usage["windows"][0].get("resets_at").is_none());
        assert_eq!(usage["windows"][0]["utilization"], 10.0);
    }
}
