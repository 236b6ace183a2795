use actix_web::{web, HttpRequest, HttpResponse};
use deliberation_core::cancellation::CancellationToken;
use deliberation_core::types::{ClaimTree, LlmConfig, Topic};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::headers::extract_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CruxesRequest {
    #[serde(rename = "cruxTree")]
    pub crux_tree: ClaimTree,
    pub llm: LlmConfig,
    pub topics: Vec<Topic>,
    #[serde(rename = "topK", default)]
    pub top_k: usize,
}

pub async fn cruxes(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CruxesRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = extract_api_key(&req);
    let pipeline = state.build_pipeline(&body.llm.model_name, api_key);
    let token = CancellationToken::new();
    let result = pipeline
        .cruxes(&body.crux_tree, &body.llm, &body.topics, body.top_k, &token)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}
