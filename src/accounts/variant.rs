use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    Client as OAuth2Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
    StandardRevocableToken, StandardTokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Fixed Gemini CLI OAuth client credentials (not overridable via config).
const GEMINICLI_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const GEMINICLI_CLIENT_SECRET: &str = "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";

/// Fixed Antigravity OAuth client credentials.
const ANTIGRAVITY_CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
const ANTIGRAVITY_CLIENT_SECRET: &str = "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";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Antigravity,
    GeminiCli,
}

/// Everything that distinguishes the two upstream variants: host, spoofed
/// User-Agent, OAuth client, store file, and whether chat calls need a
/// bootstrapped project id up front.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamVariant {
    pub kind: VariantKind,
    pub name: &'static str,
    pub user_agent: &'static str,
    pub store_file: &'static str,
    /// Antigravity refuses chat calls without a project id; the CLI variant
    /// only needs one for `v1internal:*`, which every chat call here is, so
    /// both end up requiring it before dispatch.
    pub requires_project_id: bool,
    client_id: &'static str,
    client_secret: &'static str,
}

pub const ANTIGRAVITY: UpstreamVariant = UpstreamVariant {
    kind: VariantKind::Antigravity,
    name: "antigravity",
    user_agent: "antigravity/1.16.5 linux/amd64",
    store_file: "accounts.json",
    requires_project_id: true,
    client_id: ANTIGRAVITY_CLIENT_ID,
    client_secret: ANTIGRAVITY_CLIENT_SECRET,
};

pub const GEMINICLI: UpstreamVariant = UpstreamVariant {
    kind: VariantKind::GeminiCli,
    name: "geminicli",
    user_agent: "GeminiCLI/0.26.0/gemini-3-pro-preview (linux; x64)",
    store_file: "geminicli_accounts.json",
    requires_project_id: true,
    client_id: GEMINICLI_CLIENT_ID,
    client_secret: GEMINICLI_CLIENT_SECRET,
};

impl UpstreamVariant {
    /// OAuth2 client for the token endpoint. Only the refresh grant is used;
    /// no redirect or auth-code endpoints are configured.
    pub(super) fn oauth_client(&self) -> GoogleOauth2Client {
        OAuth2Client::new(ClientId::new(self.client_id.to_string()))
            .set_client_secret(ClientSecret::new(self.client_secret.to_string()))
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URI.to_string()).expect("valid fixed token URI"),
            )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(super) struct GoogleTokenField {
    #[serde(rename = "id_token")]
    pub id_token: Option<String>,
}
impl ExtraTokenFields for GoogleTokenField {}

pub(super) type GoogleTokenResponse = StandardTokenResponse<GoogleTokenField, BasicTokenType>;

pub(super) type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    GoogleTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
