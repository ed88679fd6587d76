//! Maps [`QueueError`] onto HTTP responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::QueueError;

/// Handler error. Wraps the domain error so handlers can use `?`.
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(QueueError::InvalidArgument(message.into()))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            // Tenant identity doubles as authorization, so an unknown tenant
            // looks the same as a missing resource.
            QueueError::InvalidTenant(_) => (StatusCode::NOT_FOUND, "INVALID_TENANT"),
            QueueError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            QueueError::InvalidArgument(_) | QueueError::Json(_) | QueueError::Toml(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
            }
            QueueError::Contention(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONTENTION"),
            QueueError::Store(_) | QueueError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_FAILURE")
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error = if status.is_server_error() {
            tracing::error!(status = %status, code, error = %self.0, "request failed");
            if status == StatusCode::SERVICE_UNAVAILABLE {
                self.0.to_string()
            } else {
                "internal error".to_string()
            }
        } else {
            self.0.to_string()
        };

        let mut response = (status, Json(ErrorBody { error, code })).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn status_of(err: QueueError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn maps_each_failure_class() {
        assert_eq!(status_of(QueueError::InvalidTenant("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(QueueError::NotFound("9".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(QueueError::InvalidArgument("nextTicket".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(QueueError::Contention("acme".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(QueueError::Store(StoreError::Backend("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn contention_asks_to_retry() {
        let response = ApiError(QueueError::Contention("acme".into())).into_response();
        assert_eq!(response.headers()["retry-after"], "1");
    }
}
