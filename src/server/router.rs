use crate::accounts::{AccountManagerHandle, UpstreamVariant, VariantKind};
use crate::config::{Config, ResolvedVariantConfig, StreamConfig};
use crate::server::guards::auth::RequireKeyAuth;
use crate::server::routes;
use crate::stream::ImageStore;
use crate::upstream::UpstreamClient;
use axum::{
    Router,
    extract::Request,
    http::{HeaderName, StatusCode, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use base64::Engine as _;
use castor_sigcache::SignatureCache;
use rand::RngCore;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// One upstream variant's serving bundle.
pub struct Channel {
    pub variant: UpstreamVariant,
    pub cfg: Arc<ResolvedVariantConfig>,
    pub manager: AccountManagerHandle,
    pub upstream: UpstreamClient,
}

struct StateInner {
    antigravity: Channel,
    geminicli: Channel,
    sigcache: Arc<SignatureCache>,
    stream_cfg: StreamConfig,
    image_store: ImageStore,
    api_key: Arc<str>,
    started_at: Instant,
}

#[derive(Clone)]
pub struct CastorState(Arc<StateInner>);

impl CastorState {
    pub fn new(
        cfg: &Config,
        antigravity_cfg: Arc<ResolvedVariantConfig>,
        geminicli_cfg: Arc<ResolvedVariantConfig>,
        antigravity_manager: AccountManagerHandle,
        geminicli_manager: AccountManagerHandle,
        sigcache: Arc<SignatureCache>,
    ) -> Self {
        let antigravity = Channel {
            variant: crate::accounts::ANTIGRAVITY,
            upstream: UpstreamClient::new(
                &antigravity_cfg,
                build_chat_client(crate::accounts::ANTIGRAVITY.user_agent, &antigravity_cfg),
            ),
            manager: antigravity_manager,
            cfg: antigravity_cfg,
        };
        let geminicli = Channel {
            variant: crate::accounts::GEMINICLI,
            upstream: UpstreamClient::new(
                &geminicli_cfg,
                build_chat_client(crate::accounts::GEMINICLI.user_agent, &geminicli_cfg),
            ),
            manager: geminicli_manager,
            cfg: geminicli_cfg,
        };

        Self(Arc::new(StateInner {
            antigravity,
            geminicli,
            sigcache,
            stream_cfg: cfg.stream.clone(),
            image_store: ImageStore::new(&cfg.basic.data_dir),
            api_key: Arc::from(cfg.basic.api_key.as_str()),
            started_at: Instant::now(),
        }))
    }

    pub fn channel(&self, kind: VariantKind) -> &Channel {
        match kind {
            VariantKind::Antigravity => &self.0.antigravity,
            VariantKind::GeminiCli => &self.0.geminicli,
        }
    }

    pub fn sigcache(&self) -> Arc<SignatureCache> {
        self.0.sigcache.clone()
    }

    pub fn stream_cfg(&self) -> &StreamConfig {
        &self.0.stream_cfg
    }

    pub fn image_store(&self) -> ImageStore {
        self.0.image_store.clone()
    }

    pub fn api_key(&self) -> &str {
        &self.0.api_key
    }

    pub fn uptime(&self) -> Duration {
        self.0.started_at.elapsed()
    }
}

/// Per-variant chat client: spoofed User-Agent, long read timeout for
/// generations, optional proxy, HTTP/1-only when multiplexing is off.
fn build_chat_client(user_agent: &str, cfg: &ResolvedVariantConfig) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    // Long total timeout: generations stream for minutes; liveness while a
    // body is open comes from heartbeats, not the client timeout.
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
        .timeout(Duration::from_secs(10 * 60));

    if let Some(proxy_url) = cfg.proxy.clone() {
        let proxy = reqwest::Proxy::all(proxy_url.as_str()).expect("invalid proxy url");
        builder = builder.proxy(proxy);
    }

    if !cfg.enable_multiplexing {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    } else {
        builder = builder.http2_adaptive_window(true);
    }

    builder
        .default_headers(headers)
        .build()
        .expect("failed to build reqwest client")
}

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    // For SSE responses this is time-to-first-byte, not stream duration.
    let latency_ms = start.elapsed().as_millis() as u64;
    let line = format!(
        "| {:>3} | {} | {:^7} | {} | {}ms | {}",
        status.as_u16(),
        request_id,
        method.as_str(),
        uri.path(),
        latency_ms,
        user_agent
    );
    if status.is_server_error() {
        error!("{line}");
    } else if status.is_client_error() {
        warn!("{line}");
    } else {
        info!("{line}");
    }

    resp
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub fn castor_router(state: CastorState) -> Router {
    let api = Router::new()
        // Antigravity-backed dialects.
        .route("/v1/chat/completions", post(routes::openai::antigravity_chat))
        .route("/v1/messages", post(routes::claude::antigravity_messages))
        .route(
            "/v1beta/models/{*path}",
            post(routes::gemini::antigravity_generate),
        )
        .route("/v1/models", get(routes::models::antigravity_openai_models))
        .route("/v1beta/models", get(routes::models::antigravity_gemini_models))
        // Gemini CLI-backed dialects.
        .route("/cli/v1/chat/completions", post(routes::openai::cli_chat))
        .route("/cli/v1/messages", post(routes::claude::cli_messages))
        .route(
            "/cli/v1beta/models/{*path}",
            post(routes::gemini::cli_generate),
        )
        .route("/cli/v1/models", get(routes::models::cli_openai_models))
        .route("/cli/v1beta/models", get(routes::models::cli_gemini_models))
        // Ops.
        .route("/health", get(routes::ops::health))
        .route("/v1/memory", get(routes::ops::memory))
        // Admin token surface.
        .merge(routes::admin::router())
        .layer(middleware::from_extractor_with_state::<RequireKeyAuth, _>(
            state.clone(),
        ));

    Router::new()
        .merge(api)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
