use actix_web::{web, HttpRequest, HttpResponse};
use deliberation_core::cancellation::CancellationToken;
use deliberation_core::types::{Comment, LlmConfig, Taxonomy};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::headers::extract_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimsRequest {
    pub comments: Vec<Comment>,
    pub llm: LlmConfig,
    pub tree: Taxonomy,
}

pub async fn claims(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ClaimsRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = extract_api_key(&req);
    let pipeline = state.build_pipeline(&body.llm.model_name, api_key);
    let token = CancellationToken::new();
    let result = pipeline
        .claims(&body.comments, &body.llm, &body.tree, &token)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}
