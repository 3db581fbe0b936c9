//! Startup refresh fan-out.
//!
//! On manager start, every expired enabled account is refreshed
//! concurrently, bounded by the pool size and rate-limited to the configured
//! OAuth TPS. Failures are isolated per account; the manager applies the
//! outcomes (including 400/403 auto-disable) in one batch.

use super::oauth_ops::{RefreshedToken, refresh_access_token};
use super::variant::UpstreamVariant;
use crate::error::OauthError;
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub(super) struct RefreshJob {
    pub token_id: String,
    pub refresh_token: String,
}

#[derive(Debug)]
pub(super) struct RefreshOutcome {
    pub token_id: String,
    pub result: Result<RefreshedToken, OauthError>,
}

pub(super) async fn refresh_accounts_concurrently(
    variant: &UpstreamVariant,
    jobs: Vec<RefreshJob>,
    http: &reqwest::Client,
    oauth_tps: usize,
) -> Vec<RefreshOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }

    // UpstreamVariant is Copy; owned copies keep the spawned futures 'static.
    let variant = *variant;

    let tps = u32::try_from(oauth_tps.max(1)).unwrap_or(u32::MAX);
    let burst = tps.saturating_mul(2).max(1);
    let limiter = Arc::new(RateLimiter::direct(
        Quota::per_second(NonZeroU32::new(tps).expect("tps is non-zero"))
            .allow_burst(NonZeroU32::new(burst).expect("burst is non-zero")),
    ));
    let concurrency = (oauth_tps.saturating_mul(2)).max(1);

    info!(
        variant = variant.name,
        jobs = jobs.len(),
        concurrency,
        tps,
        "Refreshing expired accounts"
    );

    stream::iter(jobs)
        .map(|job| {
            let limiter = limiter.clone();
            let http = http.clone();
            async move {
                limiter.until_ready().await;
                let result = refresh_access_token(&variant, &job.refresh_token, &http).await;
                RefreshOutcome {
                    token_id: job.token_id,
                    result,
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await
}
