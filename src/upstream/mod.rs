//! Upstream Code Assist transport: endpoint selection, the 429-bounded
//! retry wrapper, and upstream error classification.

use crate::accounts::{AccountLease, AccountManagerHandle};
use crate::config::ResolvedVariantConfig;
use crate::error::{CastorError, IsRetryable};
use backon::{ExponentialBuilder, Retryable};
use castor_schema::codeassist::CodeAssistRequest;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// Marker Google puts at the head of quota/permission 403 bodies that mean
/// "request too large for this account's context", not "bad credential".
const PERMISSION_DENIED_MARKER: &str = "The caller does not";

#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    stream: Url,
    no_stream: Url,
}

impl UpstreamEndpoints {
    pub fn new(base: &Url) -> Self {
        let mut stream = base.clone();
        stream.set_path("/v1internal:streamGenerateContent");
        stream.set_query(Some("alt=sse"));

        let mut no_stream = base.clone();
        no_stream.set_path("/v1internal:generateContent");
        no_stream.set_query(None);

        Self { stream, no_stream }
    }

    pub fn select(&self, stream: bool) -> &Url {
        if stream { &self.stream } else { &self.no_stream }
    }
}

pub struct UpstreamClient {
    http: reqwest::Client,
    endpoints: UpstreamEndpoints,
    retry: ExponentialBuilder,
}

impl UpstreamClient {
    pub fn new(cfg: &ResolvedVariantConfig, http: reqwest::Client) -> Self {
        let retry = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(cfg.retry_times)
            .with_jitter();
        Self {
            http,
            endpoints: UpstreamEndpoints::new(&cfg.api_url),
            retry,
        }
    }

    /// POST the chat envelope. Only HTTP 429 is retried, against the same
    /// account; rotating accounts between logical attempts is the handler's
    /// call, not the transport's. A credential-level 403 disables the
    /// account through the manager before the error propagates.
    pub async fn call(
        &self,
        manager: &AccountManagerHandle,
        lease: &AccountLease,
        envelope: &CodeAssistRequest,
        stream: bool,
    ) -> Result<reqwest::Response, CastorError> {
        let url = self.endpoints.select(stream).clone();

        let op = || async {
            let resp = self
                .http
                .post(url.clone())
                .bearer_auth(lease.access_token.as_ref())
                .json(envelope)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            let body = resp.text().await.unwrap_or_default();
            let err = classify(status, body);
            match &err {
                CastorError::UpstreamPermissionDenied { .. } => {
                    // Context-overflow style 403; the credential is fine.
                    warn!(
                        token_id = %lease.token_id,
                        model = %envelope.model,
                        "Upstream permission-denied (context) error"
                    );
                }
                CastorError::UpstreamStatus { status, .. }
                    if *status == StatusCode::FORBIDDEN
                        || *status == StatusCode::UNAUTHORIZED =>
                {
                    warn!(
                        token_id = %lease.token_id,
                        model = %envelope.model,
                        status = %status,
                        "Upstream rejected credential; disabling account"
                    );
                    manager.report_invalid(&lease.token_id);
                }
                other => {
                    warn!(
                        token_id = %lease.token_id,
                        model = %envelope.model,
                        "Upstream error: {other}"
                    );
                }
            }
            Err(err)
        };

        let result = op
            .retry(self.retry)
            .when(|err: &CastorError| err.is_retryable())
            .notify(|err, dur: Duration| {
                error!(
                    "Upstream rate limited ({}), retry after {:?}",
                    err, dur
                );
            })
            .await;

        if result.is_ok() {
            info!(
                token_id = %lease.token_id,
                model = %envelope.model,
                stream,
                "Upstream call succeeded"
            );
        }
        result
    }
}

/// Map a non-success upstream status into the core error taxonomy.
pub fn classify(status: StatusCode, body: String) -> CastorError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CastorError::UpstreamRateLimit {
            message: extract_message(&body)
                .unwrap_or_else(|| "Upstream rate limit exceeded".to_string()),
        },
        StatusCode::FORBIDDEN if body.contains(PERMISSION_DENIED_MARKER) => {
            CastorError::UpstreamPermissionDenied {
                message: extract_message(&body).unwrap_or(body),
            }
        }
        _ => CastorError::UpstreamStatus { status, body },
    }
}

/// Pull `error.message` out of a structured Google error body.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}
