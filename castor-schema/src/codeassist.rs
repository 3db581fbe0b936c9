//! Cloud Code Assist envelope types.
//!
//! Both upstream variants speak the same `v1internal` surface: chat requests
//! wrap a Gemini request body in `{model, project, request}`, responses wrap
//! the Gemini response body in `{response}`, and account bootstrap uses
//! `loadCodeAssist` / `onboardUser`.

use crate::gemini::{GenerateContentRequest, GenerateContentResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound chat envelope for `v1internal:generateContent` /
/// `v1internal:streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
pub struct CodeAssistRequest {
    pub model: String,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt_id: Option<String>,
    pub request: GenerateContentRequest,
}

/// Inbound envelope: `{"response": {...}}` around the Gemini body. Some
/// streamed frames arrive bare, so parsing falls back to the inner shape.
#[derive(Debug, Deserialize)]
pub struct CodeAssistResponse {
    pub response: GenerateContentResponse,
}

/// Parse an upstream payload that is either enveloped or bare.
pub fn unwrap_response(value: Value) -> Result<GenerateContentResponse, serde_json::Error> {
    if value.get("response").is_some_and(Value::is_object) {
        let envelope: CodeAssistResponse = serde_json::from_value(value)?;
        Ok(envelope.response)
    } else {
        serde_json::from_value(value)
    }
}

/// `v1internal:loadCodeAssist` response. The presence of `currentTier` means
/// the account is already onboarded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCodeAssistResponse {
    #[serde(default)]
    pub current_tier: Option<Value>,

    #[serde(default)]
    pub cloudaicompanion_project: Option<String>,

    #[serde(default)]
    pub allowed_tiers: Vec<TierInfo>,
}

impl LoadCodeAssistResponse {
    /// Tier id to onboard with: the default allowed tier, else `free-tier`.
    pub fn default_tier_id(&self) -> &str {
        self.allowed_tiers
            .iter()
            .find(|tier| tier.is_default == Some(true))
            .map(|tier| tier.id.as_str())
            .unwrap_or("free-tier")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierInfo {
    pub id: String,
    #[serde(default)]
    pub is_default: Option<bool>,
}

/// `v1internal:onboardUser` long-running-operation response.
#[derive(Debug, Clone, Deserialize)]
pub struct OnboardOperation {
    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub response: Option<OnboardResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardResponse {
    #[serde(default)]
    pub cloudaicompanion_project: Option<Value>,
}

impl OnboardOperation {
    /// Extract the provisioned project id, which upstream returns either as a
    /// plain string or as `{"id": "..."}`.
    pub fn project_id(&self) -> Option<String> {
        let value = self.response.as_ref()?.cloudaicompanion_project.as_ref()?;
        match value {
            Value::String(id) => Some(id.clone()),
            Value::Object(obj) => obj
                .get("id")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_accepts_enveloped_and_bare_bodies() {
        let enveloped = json!({
            "response": {"candidates": [{"content": {"parts": [{"text": "a"}]}}]}
        });
        let bare = json!({
            "candidates": [{"content": {"parts": [{"text": "a"}]}}]
        });

        assert_eq!(unwrap_response(enveloped).unwrap().candidates.len(), 1);
        assert_eq!(unwrap_response(bare).unwrap().candidates.len(), 1);
    }

    #[test]
    fn onboarded_account_reports_current_tier() {
        let resp: LoadCodeAssistResponse = serde_json::from_value(json!({
            "currentTier": {"id": "standard-tier"},
            "cloudaicompanionProject": "proj-1"
        }))
        .unwrap();
        assert!(resp.current_tier.is_some());
        assert_eq!(resp.cloudaicompanion_project.as_deref(), Some("proj-1"));
    }

    #[test]
    fn default_tier_prefers_is_default_flag() {
        let resp: LoadCodeAssistResponse = serde_json::from_value(json!({
            "allowedTiers": [
                {"id": "legacy-tier"},
                {"id": "standard-tier", "isDefault": true}
            ]
        }))
        .unwrap();
        assert_eq!(resp.default_tier_id(), "standard-tier");

        let empty: LoadCodeAssistResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.default_tier_id(), "free-tier");
    }

    #[test]
    fn onboard_project_id_accepts_string_and_object() {
        let as_string: OnboardOperation = serde_json::from_value(json!({
            "done": true,
            "response": {"cloudaicompanionProject": "proj-42"}
        }))
        .unwrap();
        assert_eq!(as_string.project_id().as_deref(), Some("proj-42"));

        let as_object: OnboardOperation = serde_json::from_value(json!({
            "done": true,
            "response": {"cloudaicompanionProject": {"id": "proj-42"}}
        }))
        .unwrap();
        assert_eq!(as_object.project_id().as_deref(), Some("proj-42"));

        let pending: OnboardOperation = serde_json::from_value(json!({"done": false})).unwrap();
        assert_eq!(pending.project_id(), None);
    }
}
