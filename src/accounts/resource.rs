use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One upstream Google account, as persisted in the store file.
///
/// Identity is `refresh_token`; everything else is replaceable. `timestamp`
/// is the issuance time of `access_token` in milliseconds since the epoch,
/// so expiry is `timestamp + expires_in * 1000`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub access_token: String,

    pub refresh_token: String,

    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,

    /// Milliseconds since epoch when `access_token` was issued.
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default = "default_enable")]
    pub enable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        default,
        rename = "projectId",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,

    #[serde(default, rename = "hasQuota", skip_serializing_if = "Option::is_none")]
    pub has_quota: Option<bool>,
}

fn default_enable() -> bool {
    true
}

impl Account {
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: refresh_token.into(),
            expires_in: 0,
            timestamp: 0,
            enable: true,
            email: None,
            project_id: None,
            has_quota: None,
        }
    }

    /// Expired means within `buffer` of the nominal expiry (inclusive), so a
    /// token is refreshed before a long request can outlive it.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        let expiry_ms = self.timestamp.saturating_add(self.expires_in.saturating_mul(1000));
        Utc::now().timestamp_millis() + buffer.as_millis() as i64 >= expiry_ms
    }

    /// Apply a successful token refresh: the three lifetime fields move
    /// together or not at all.
    pub fn apply_refresh(&mut self, access_token: String, expires_in: i64) {
        self.access_token = access_token;
        self.expires_in = expires_in;
        self.timestamp = Utc::now().timestamp_millis();
    }
}

/// Read-only view of an account handed to request handlers. Handlers never
/// mutate accounts; refreshes replace fields through the manager.
#[derive(Debug, Clone)]
pub struct AccountLease {
    pub token_id: Arc<str>,
    pub access_token: Arc<str>,
    pub project_id: Option<Arc<str>>,
    pub email: Option<Arc<str>>,
}

/// Admin-surface projection: raw refresh tokens never leave the manager.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub token_id: String,
    pub enable: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_quota: Option<bool>,
    pub request_count: u32,
}

/// Admin-surface patch applied by `updateTokenById`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    #[serde(default)]
    pub enable: Option<bool>,

    #[serde(default, rename = "projectId")]
    pub project_id: Option<String>,

    #[serde(default, rename = "hasQuota")]
    pub has_quota: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_honors_buffer() {
        let mut account = Account::from_refresh_token("rt");
        account.apply_refresh("at".to_string(), 3600);
        assert!(!account.is_expired(Duration::from_secs(300)));
        // A buffer larger than the remaining lifetime flips it.
        assert!(account.is_expired(Duration::from_secs(3700)));
    }

    #[test]
    fn zero_timestamp_is_always_expired() {
        let account = Account::from_refresh_token("rt");
        assert!(account.is_expired(Duration::from_secs(0)));
    }

    #[test]
    fn serde_uses_store_field_names() {
        let mut account = Account::from_refresh_token("rt1");
        account.project_id = Some("proj".to_string());
        account.has_quota = Some(true);
        let value = serde_json::to_value(&account).unwrap();
        assert!(value.get("projectId").is_some());
        assert!(value.get("hasQuota").is_some());
        assert!(value.get("refresh_token").is_some());
    }

    #[test]
    fn enable_defaults_to_true_when_absent() {
        let account: Account =
            serde_json::from_value(serde_json::json!({"refresh_token": "rt"})).unwrap();
        assert!(account.enable);
    }
}
