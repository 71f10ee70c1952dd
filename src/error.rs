use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("you are not allowed to do that")]
    NotAuthorized,
    #[error("{0} is already on this trip")]
    AlreadyMember(String),
    #[error("not found")]
    NotFound,
    #[error("write failed, please try again: {0}")]
    TransientWrite(String),
}

impl AppError {
    /// Transient write failures are the only kind that is safe and useful to
    /// retry; every other variant needs the caller to change something first.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientWrite(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized => StatusCode::FORBIDDEN,
            AppError::AlreadyMember(_) => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::TransientWrite(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}
