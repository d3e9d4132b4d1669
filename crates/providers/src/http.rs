//! HTTP plumbing shared by the backends.

use std::time::Duration;
use switchboard_core::ModelError;
use tracing::warn;

/// Completion limit used when none is configured.
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 2000;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(e.to_string())
    } else {
        ModelError::Network(e.to_string())
    }
}

/// Turn a non-2xx response into the matching `ModelError`; pass 2xx through.
pub(crate) async fn check_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ModelError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ModelError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ModelError::Authentication(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(backend, status, body = %error_body, "Model backend returned error");
        return Err(ModelError::Api {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}
