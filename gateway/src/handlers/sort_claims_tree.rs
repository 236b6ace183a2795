use actix_web::{web, HttpRequest, HttpResponse};
use deliberation_core::cancellation::CancellationToken;
use deliberation_core::types::{ClaimTree, LlmConfig};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::headers::extract_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SortClaimsTreeRequest {
    pub tree: ClaimTree,
    pub llm: LlmConfig,
    pub sort: String,
}

pub async fn sort_claims_tree(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SortClaimsTreeRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = extract_api_key(&req);
    let pipeline = state.build_pipeline(&body.llm.model_name, api_key);
    let token = CancellationToken::new();
    let result = pipeline
        .sort_claims_tree(&body.tree, &body.llm, &body.sort, &token)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}
