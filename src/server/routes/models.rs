use crate::accounts::VariantKind;
use crate::server::router::CastorState;
use axum::{Json, extract::State};
use castor_schema::gemini::GeminiModelList;
use castor_schema::openai::OpenaiModelList;

fn openai_list(state: &CastorState, kind: VariantKind) -> OpenaiModelList {
    let channel = state.channel(kind);
    OpenaiModelList::from_model_names(channel.cfg.model_list.iter().cloned(), channel.variant.name)
}

fn gemini_list(state: &CastorState, kind: VariantKind) -> GeminiModelList {
    GeminiModelList::from_model_names(state.channel(kind).cfg.model_list.iter().cloned())
}

pub async fn antigravity_openai_models(State(state): State<CastorState>) -> Json<OpenaiModelList> {
    Json(openai_list(&state, VariantKind::Antigravity))
}

pub async fn antigravity_gemini_models(State(state): State<CastorState>) -> Json<GeminiModelList> {
    Json(gemini_list(&state, VariantKind::Antigravity))
}

pub async fn cli_openai_models(State(state): State<CastorState>) -> Json<OpenaiModelList> {
    Json(openai_list(&state, VariantKind::GeminiCli))
}

pub async fn cli_gemini_models(State(state): State<CastorState>) -> Json<GeminiModelList> {
    Json(gemini_list(&state, VariantKind::GeminiCli))
}
