use actix_web::{HttpResponse, ResponseError};
use deliberation_core::error::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("request body failed validation: {0}")]
    BadRequest(String),
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::Pipeline(PipelineError::InputInvalid(msg)) => {
                HttpResponse::BadRequest().json(error_body(msg))
            }
            GatewayError::Pipeline(PipelineError::Cancelled) => {
                HttpResponse::build(actix_web::http::StatusCode::from_u16(499).unwrap())
                    .json(error_body("request cancelled"))
            }
            GatewayError::Pipeline(PipelineError::Completer(completer_err)) => {
                HttpResponse::BadGateway().json(error_body(&completer_err.to_string()))
            }
            GatewayError::BadRequest(msg) => HttpResponse::BadRequest().json(error_body(msg)),
        }
    }
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}
