mod basic;
mod providers;

pub use basic::BasicConfig;
pub use providers::{
    ProviderDefaults, ProvidersConfig, ResolvedVariantConfig, RotationConfig, RotationStrategyName,
    SigCacheConfig, StreamConfig, VariantConfig,
};

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server settings (`basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Account rotation policy (`rotation` table).
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Stream-engine behavior (`stream` table).
    #[serde(default)]
    pub stream: StreamConfig,

    /// Signature-cache gating (`sigcache` table).
    #[serde(default)]
    pub sigcache: SigCacheConfig,

    /// Upstream variant settings (`providers` table).
    #[serde(default)]
    pub providers: ProvidersConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration without validating required fields; library code
    /// and tests use this.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Loads configuration and validates the fields the server binary
    /// cannot run without.
    pub fn from_toml() -> Self {
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration from {DEFAULT_CONFIG_FILE}: {err}")
        });
        if cfg.basic.api_key.trim().is_empty() {
            panic!("basic.api_key must be set and non-empty");
        }
        cfg
    }

    pub fn antigravity(&self) -> ResolvedVariantConfig {
        self.providers
            .antigravity
            .resolve(&self.providers.defaults, providers::ANTIGRAVITY_API_URL)
    }

    pub fn geminicli(&self) -> ResolvedVariantConfig {
        self.providers
            .geminicli
            .resolve(&self.providers.defaults, providers::GEMINICLI_API_URL)
    }
}
