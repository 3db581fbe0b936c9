//! Token lifecycle operations: refresh against the Google OAuth endpoint and
//! the one-shot project-id bootstrap via `loadCodeAssist` / `onboardUser`.

use super::variant::UpstreamVariant;
use crate::error::{IsRetryable, OauthError};
use backon::{ExponentialBuilder, Retryable};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use castor_schema::codeassist::{LoadCodeAssistResponse, OnboardOperation};
use oauth2::{RefreshToken, TokenResponse};
use serde_json::{Value, json};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const ONBOARD_MAX_ATTEMPTS: usize = 5;
const ONBOARD_POLL_INTERVAL: Duration = Duration::from_secs(2);

static OAUTH_RETRY_POLICY: LazyLock<ExponentialBuilder> = LazyLock::new(|| {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
        .with_jitter()
});

/// The fields a successful refresh replaces on an account.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
    pub email: Option<String>,
}

/// POST `grant_type=refresh_token` with the variant's client credentials.
pub async fn refresh_access_token(
    variant: &UpstreamVariant,
    refresh_token: &str,
    http: &reqwest::Client,
) -> Result<RefreshedToken, OauthError> {
    let refresh_token = RefreshToken::new(refresh_token.to_string());
    let op = || async {
        variant
            .oauth_client()
            .exchange_refresh_token(&refresh_token)
            .request_async(http)
            .await
            .map_err(OauthError::from)
    };

    let response = op
        .retry(*OAUTH_RETRY_POLICY)
        .when(|e: &OauthError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("OAuth refresh retrying after error {err}, sleeping {dur:?}");
        })
        .await?;

    let expires_in = response
        .expires_in()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(3600);
    let email = response
        .extra_fields()
        .id_token
        .as_deref()
        .and_then(email_from_id_token);

    Ok(RefreshedToken {
        access_token: response.access_token().secret().clone(),
        expires_in,
        email,
    })
}

/// Resolve the companion project id for an account.
///
/// `loadCodeAssist` answers directly for already-onboarded accounts
/// (`currentTier` present). Otherwise `onboardUser` is polled up to five
/// times at two-second intervals; `Ok(None)` after that means the caller
/// should disable the account.
pub async fn fetch_project_id(
    base_url: &Url,
    access_token: &str,
    http: &reqwest::Client,
) -> Result<Option<String>, OauthError> {
    let load_json = post_internal(
        base_url,
        "/v1internal:loadCodeAssist",
        access_token,
        &json!({"metadata": {"pluginType": "GEMINI"}}),
        http,
    )
    .await?;
    debug!(body = %load_json, "loadCodeAssist upstream body");

    let load: LoadCodeAssistResponse =
        serde_json::from_value(load_json).map_err(|e| OauthError::Other {
            message: format!("loadCodeAssist parse error: {e}"),
        })?;

    if load.current_tier.is_some() {
        return Ok(load.cloudaicompanion_project);
    }

    let tier_id = load.default_tier_id().to_string();
    info!(tier = %tier_id, "No companion project yet; onboarding");

    for attempt in 1..=ONBOARD_MAX_ATTEMPTS {
        let onboard_json = post_internal(
            base_url,
            "/v1internal:onboardUser",
            access_token,
            &json!({
                "tierId": tier_id,
                "metadata": {"pluginType": "GEMINI"},
            }),
            http,
        )
        .await?;
        debug!(body = %onboard_json, "onboardUser upstream body");

        let operation: OnboardOperation =
            serde_json::from_value(onboard_json).map_err(|e| OauthError::Other {
                message: format!("onboardUser parse error: {e}"),
            })?;

        if operation.done {
            return Ok(operation.project_id());
        }

        if attempt < ONBOARD_MAX_ATTEMPTS {
            info!(
                "onboardUser pending (attempt {attempt}/{ONBOARD_MAX_ATTEMPTS}), retrying in {ONBOARD_POLL_INTERVAL:?}"
            );
            tokio::time::sleep(ONBOARD_POLL_INTERVAL).await;
        }
    }

    Ok(None)
}

async fn post_internal(
    base_url: &Url,
    path: &str,
    access_token: &str,
    body: &Value,
    http: &reqwest::Client,
) -> Result<Value, OauthError> {
    let mut url = base_url.clone();
    url.set_path(path);

    let op = || async {
        let resp = http
            .post(url.clone())
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OauthError::UpstreamStatus(resp.status()));
        }
        resp.json::<Value>().await.map_err(OauthError::Request)
    };

    op.retry(*OAUTH_RETRY_POLICY)
        .when(|e: &OauthError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("Code Assist call retrying after error {err}, sleeping {dur:?}");
        })
        .await
}

/// Best-effort email extraction from an ID token. Only the payload is
/// base64url-decoded; the signature is not verified (the token came straight
/// from Google over TLS).
fn email_from_id_token(id_token: &str) -> Option<String> {
    let payload_b64 = id_token.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;
    claims
        .get("email")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_jwt(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
        format!("{header}.{payload_b64}.sig")
    }

    #[test]
    fn email_is_read_from_id_token_payload() {
        let token = make_test_jwt(&json!({"email": "a@example.com", "sub": "1"}));
        assert_eq!(email_from_id_token(&token).as_deref(), Some("a@example.com"));
    }

    #[test]
    fn malformed_id_token_yields_none() {
        assert_eq!(email_from_id_token("not-a-jwt"), None);
        assert_eq!(email_from_id_token("a.%%%.c"), None);
    }
}
