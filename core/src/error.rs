use thiserror::Error;

pub type JsonExtractResult<T> = Result<T, JsonExtractError>;

#[derive(Error, Debug)]
pub enum JsonExtractError {
    #[error("no JSON extraction strategy succeeded; content started with: {0}")]
    Exhausted(String),
}

#[derive(Error, Debug)]
pub enum CompleterError {
    #[error("LLM transport failure: {0}")]
    Transport(String),
    #[error("completion response missing expected field: {0}")]
    MalformedResponse(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error(transparent)]
    Completer(#[from] CompleterError),
    #[error("request cancelled")]
    Cancelled,
}
