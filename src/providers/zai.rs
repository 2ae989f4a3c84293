use super::{Provider, UsageReport};
use crate::error::FetchError;

// Rate limits are only shown on https://z.ai/manage-apikey/rate-limits so far.
// TODO: wire up the rate-limits endpoint once its authentication scheme is known.
pub struct ZaiProvider;

#[async_trait::async_trait]
impl Provider for ZaiProvider {
    fn id(&self) -> &str {
        "zai"
    }

    fn name(&self) -> &str {
        "Z.AI"
    }

    async fn fetch_usage(&self) -> Result<UsageReport, FetchError> {
        Err(FetchError::NotImplemented(
            "Z.AI provider not yet implemented - API endpoint needs research".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_always_reports_not_implemented() {
        let provider = ZaiProvider;
        let err = provider.fetch_usage().await.unwrap_err();

        assert!(matches!(err, FetchError::NotImplemented(_)));
        assert!(err.to_string().contains("Z.AI"));
    }
}
