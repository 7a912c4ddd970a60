use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("signature rejected: {0}")]
    Signature(&'static str),

    #[error("subscription verification failed")]
    Verification,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported object type: {0}")]
    UnsupportedObject(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Signature(_) | Self::Verification => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedObject(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self, "webhook request rejected");
        (status, self.to_string()).into_response()
    }
}
