use actix_web::{web, HttpRequest, HttpResponse};
use deliberation_core::cancellation::CancellationToken;
use deliberation_core::types::{Comment, LlmConfig};
use serde::Deserialize;

use crate::error::GatewayError;
use crate::headers::extract_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TopicTreeRequest {
    pub comments: Vec<Comment>,
    pub llm: LlmConfig,
}

pub async fn topic_tree(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<TopicTreeRequest>,
) -> Result<HttpResponse, GatewayError> {
    let api_key = extract_api_key(&req);
    let pipeline = state.build_pipeline(&body.llm.model_name, api_key);
    let token = CancellationToken::new();
    let result = pipeline.taxonomy(&body.comments, &body.llm, &token).await?;
    Ok(HttpResponse::Ok().json(result))
}
