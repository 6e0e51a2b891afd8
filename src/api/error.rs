use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::error::FraudError;
use crate::policy::PolicyError;

use super::response::ErrorResponse;

impl FraudError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FraudError::NotFound { .. } => StatusCode::NOT_FOUND,
            FraudError::InvalidState(_) => StatusCode::CONFLICT,
            FraudError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FraudError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for FraudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(error = %self, "Request failed on an unavailable dependency");
        }
        (status, Json(ErrorResponse::new(self.to_string(), self.code()))).into_response()
    }
}

/// A rejected policy file is the operator's input problem.
impl From<PolicyError> for FraudError {
    fn from(err: PolicyError) -> Self {
        FraudError::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FraudError::not_found("case", "1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FraudError::InvalidState("done".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            FraudError::InvalidArgument("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FraudError::Unavailable("db".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
