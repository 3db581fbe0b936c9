use serde::{Deserialize, Serialize};
use url::Url;

pub(super) const ANTIGRAVITY_API_URL: &str = "https://daily-cloudcode-pa.googleapis.com";
pub(super) const GEMINICLI_API_URL: &str = "https://cloudcode-pa.googleapis.com";

/// Defaults shared by both upstream variants; each variant may override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderDefaults {
    /// Optional upstream HTTP proxy for reqwest clients.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing; disabled forces HTTP/1 with no pooling.
    #[serde(default = "default_true")]
    pub enable_multiplexing: bool,

    /// 429 retry budget for upstream chat calls.
    #[serde(default = "default_retry_times")]
    pub retry_times: usize,

    /// Upstream connect+read timeout in seconds (non-stream portion).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Access tokens are refreshed this many seconds before nominal expiry.
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,

    /// OAuth refresh requests per second for the startup refresh fan-out.
    #[serde(default = "default_oauth_tps")]
    pub oauth_tps: usize,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            proxy: None,
            enable_multiplexing: true,
            retry_times: default_retry_times(),
            timeout_secs: default_timeout_secs(),
            refresh_buffer_secs: default_refresh_buffer_secs(),
            oauth_tps: default_oauth_tps(),
        }
    }
}

/// Per-variant configuration (TOML tables `providers.antigravity` and
/// `providers.geminicli`). Unset fields fall back to `providers.defaults`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VariantConfig {
    /// Upstream base URL override; mainly for test servers.
    #[serde(default)]
    pub api_url: Option<Url>,

    #[serde(default)]
    pub proxy: Option<Url>,

    /// Models served for this variant. Also drives the model-list endpoints.
    #[serde(default)]
    pub model_list: Option<Vec<String>>,

    #[serde(default)]
    pub enable_multiplexing: Option<bool>,

    #[serde(default)]
    pub retry_times: Option<usize>,

    #[serde(default)]
    pub oauth_tps: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedVariantConfig {
    pub api_url: Url,
    pub proxy: Option<Url>,
    pub model_list: Vec<String>,
    pub enable_multiplexing: bool,
    pub retry_times: usize,
    pub timeout_secs: u64,
    pub refresh_buffer_secs: u64,
    pub oauth_tps: usize,
}

impl VariantConfig {
    pub(super) fn resolve(
        &self,
        defaults: &ProviderDefaults,
        default_api_url: &str,
    ) -> ResolvedVariantConfig {
        ResolvedVariantConfig {
            api_url: self
                .api_url
                .clone()
                .unwrap_or_else(|| Url::parse(default_api_url).expect("valid fixed base URL")),
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            model_list: self.model_list.clone().unwrap_or_else(default_model_list),
            enable_multiplexing: self
                .enable_multiplexing
                .unwrap_or(defaults.enable_multiplexing),
            retry_times: self.retry_times.unwrap_or(defaults.retry_times),
            timeout_secs: defaults.timeout_secs,
            refresh_buffer_secs: defaults.refresh_buffer_secs,
            oauth_tps: self.oauth_tps.unwrap_or(defaults.oauth_tps),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub defaults: ProviderDefaults,

    #[serde(default)]
    pub antigravity: VariantConfig,

    #[serde(default)]
    pub geminicli: VariantConfig,
}

/// Account rotation policy (`rotation` table). Hot-reloadable through the
/// admin surface; changing it clears request counters only.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub strategy: RotationStrategyName,

    /// Requests served by one account before advancing, for the
    /// `request_count` strategy.
    #[serde(default = "default_request_count")]
    pub request_count: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategyName::default(),
            request_count: default_request_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategyName {
    #[default]
    RoundRobin,
    RequestCount,
    QuotaExhausted,
}

/// Stream-engine behavior (`stream` table).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Serve non-stream requests by collecting an upstream stream.
    #[serde(default)]
    pub fake_non_stream: bool,

    /// Comment-frame heartbeat interval for open SSE bodies.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Include thought signatures in client-visible responses.
    #[serde(default)]
    pub pass_signature_to_client: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fake_non_stream: false,
            heartbeat_secs: default_heartbeat_secs(),
            pass_signature_to_client: false,
        }
    }
}

/// Signature-cache gating (`sigcache` table).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SigCacheConfig {
    #[serde(default)]
    pub cache_all_signatures: bool,

    #[serde(default = "default_true")]
    pub cache_tool_signatures: bool,

    #[serde(default = "default_true")]
    pub cache_image_signatures: bool,

    #[serde(default = "default_true")]
    pub cache_thinking: bool,
}

impl Default for SigCacheConfig {
    fn default() -> Self {
        Self {
            cache_all_signatures: false,
            cache_tool_signatures: true,
            cache_image_signatures: true,
            cache_thinking: true,
        }
    }
}

impl SigCacheConfig {
    pub fn gating_policy(&self) -> castor_sigcache::GatingPolicy {
        castor_sigcache::GatingPolicy {
            cache_all: self.cache_all_signatures,
            cache_tool: self.cache_tool_signatures,
            cache_image: self.cache_image_signatures,
            cache_thinking: self.cache_thinking,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_times() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_refresh_buffer_secs() -> u64 {
    300
}

fn default_oauth_tps() -> usize {
    5
}

fn default_request_count() -> u32 {
    10
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_model_list() -> Vec<String> {
    vec![
        "gemini-2.5-pro".to_string(),
        "gemini-2.5-flash".to_string(),
        "gemini-3-pro-preview".to_string(),
    ]
}
