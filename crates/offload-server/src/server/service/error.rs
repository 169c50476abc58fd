//! Maps failures to HTTP responses.
//!
//! Every failure leaves the service through [`ApiError`], which is also the
//! only place where failures are logged. Bodies are short plain-text status
//! lines such as `400 Bad Request\n`.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use offload_core::{Error, range::unsatisfied_range};

#[derive(Debug)]
pub enum ApiError {
    /// A failure reported by a core component.
    Core(Error),
    /// A CRUD request declared a content type other than JSON.
    UnsupportedMediaType { content_type: String },
    /// A failure of the HTTP layer itself (blocking task, response builder).
    Internal { context: String },
}

impl ApiError {
    pub fn internal(context: impl ToString) -> Self {
        Self::Internal {
            context: context.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(err) => match err {
                Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
                Error::Spawn { .. }
                | Error::InvalidState { .. }
                | Error::WorkerCrashed { .. }
                | Error::WorkerTerminated { .. }
                | Error::Store(_)
                | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl core::fmt::Display for ApiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Core(err) => write!(f, "{err}"),
            Self::UnsupportedMediaType { content_type } => {
                write!(f, "Unsupported content type: {content_type}")
            }
            Self::Internal { context } => write!(f, "Internal error: {context}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Request failed with {status}: {self}");
        } else {
            tracing::debug!("Request rejected with {status}: {self}");
        }

        let body = format!(
            "{} {}\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        );
        let mut response = (status, body).into_response();

        if let Self::Core(Error::RangeNotSatisfiable { total_size }) = self {
            if let Ok(value) = HeaderValue::from_str(&unsatisfied_range(total_size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use offload_core::store::StoreError;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (
                Error::BadRequest {
                    reason: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::NotFound {
                    resource: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::RangeNotSatisfiable { total_size: 1 },
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
            (Error::WorkerCrashed { id: 0 }, StatusCode::INTERNAL_SERVER_ERROR),
            (
                Error::WorkerTerminated { id: 0 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Spawn {
                    context: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Store(StoreError::Closed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Timeout {
                    after: Duration::from_secs(1),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (Error::ServiceShutdown, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn unsatisfiable_range_carries_content_range() {
        let response = ApiError::from(Error::RangeNotSatisfiable { total_size: 1000 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            HeaderValue::from_static("bytes */1000")
        );
    }
}
