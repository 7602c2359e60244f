use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("must be signed in")]
    Unauthenticated,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("this choice has already been selected by another participant")]
    ChoiceTaken { element_id: String, choice_id: String },

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    Internal(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        ApiError::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::ChoiceTaken { .. } => "choice_taken",
            ApiError::BadParams(_) => "bad_params",
            ApiError::Internal(_) | ApiError::Json(_) => "internal",
            ApiError::Db(_) => "db_error",
            ApiError::Io(_) => "io_error",
            ApiError::NoWorkspace => "no_workspace",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::ChoiceTaken {
                element_id,
                choice_id,
            } => Some(json!({ "elementId": element_id, "choiceId": choice_id })),
            _ => None,
        }
    }
}
