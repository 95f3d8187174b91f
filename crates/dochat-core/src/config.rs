//! Startup configuration and document URL resolution.
//!
//! The web distribution serves a small JSON document next to the app
//! bundle carrying the WebSocket endpoint and the CloudFront domain used
//! to rewrite stored `s3://` references. Loading it is the one fatal step
//! of session startup: there is no retry and no degraded mode without it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Session bootstrap settings served as `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupConfig {
    pub websocket_url: String,
    pub cloudfront_domain: String,
}

impl StartupConfig {
    /// Rewrites a stored `s3://bucket/key...` reference to its public
    /// CloudFront URL. Any other form passes through unchanged.
    pub fn resolve_document_url(&self, raw: &str) -> String {
        let Some(rest) = raw.strip_prefix("s3://") else {
            return raw.to_string();
        };
        match rest.split_once('/') {
            Some((_bucket, key)) => format!("https://{}/{}", self.cloudfront_domain, key),
            // Bucket-only reference; nothing to rewrite.
            None => raw.to_string(),
        }
    }
}

/// Fetches `config.json` from the app origin.
///
/// # Errors
/// Fails on an invalid origin, an unreachable endpoint, a non-2xx status,
/// or a malformed body. Callers treat any of these as fatal.
pub async fn load_startup_config(
    http: &reqwest::Client,
    app_url: &str,
) -> Result<StartupConfig> {
    let base = app_url.trim_end_matches('/');
    let config_url = format!("{base}/config.json");
    url::Url::parse(&config_url).with_context(|| format!("invalid app origin: {app_url}"))?;

    let response = http
        .get(&config_url)
        .send()
        .await
        .with_context(|| format!("fetching {config_url}"))?
        .error_for_status()
        .context("startup config request failed")?;
    let config: StartupConfig = response
        .json()
        .await
        .context("startup config is not valid JSON")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StartupConfig {
        StartupConfig {
            websocket_url: "wss://example.execute-api.us-west-2.amazonaws.com/prod".to_string(),
            cloudfront_domain: "d111abc.cloudfront.net".to_string(),
        }
    }

    #[test]
    fn test_s3_reference_rewritten_to_cloudfront() {
        assert_eq!(
            config().resolve_document_url("s3://my-bucket/docs/refund-policy.pdf"),
            "https://d111abc.cloudfront.net/docs/refund-policy.pdf"
        );
    }

    #[test]
    fn test_non_s3_reference_passes_through() {
        assert_eq!(
            config().resolve_document_url("https://example.com/a.pdf"),
            "https://example.com/a.pdf"
        );
        assert_eq!(config().resolve_document_url("s3://bucket-only"), "s3://bucket-only");
    }

    #[test]
    fn test_config_json_wire_shape() {
        let parsed: StartupConfig = serde_json::from_str(
            r#"{"websocketUrl":"wss://ws.example/prod","cloudfrontDomain":"cdn.example"}"#,
        )
        .unwrap();
        assert_eq!(parsed.websocket_url, "wss://ws.example/prod");
        assert_eq!(parsed.cloudfront_domain, "cdn.example");
    }
}
