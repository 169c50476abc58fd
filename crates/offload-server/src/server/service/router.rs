//! Routing table of the service.
//!
//! Each [`Endpoint`] is a fixed first path segment. Parameterized endpoints
//! take their argument as the second segment; without it they answer `400`.
//! Any other path answers `404` with the list of known endpoints.

use super::handler::{self, AppState};
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{MethodRouter, get, post},
};
use core::fmt;
use tower_http::trace::TraceLayer;

/// Named operations reachable over HTTP, in listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    JsonSmall,
    FibonacciBlocker,
    FibonacciNonBlocking,
    FibonacciParallel,
    VideoServing,
    MemoryIntensive,
    JsonProcessing,
    InsertUser,
    CreateUser,
    DeleteUser,
    GetUser,
    UpdateUser,
}

impl Endpoint {
    pub const ALL: [Self; 12] = [
        Self::JsonSmall,
        Self::FibonacciBlocker,
        Self::FibonacciNonBlocking,
        Self::FibonacciParallel,
        Self::VideoServing,
        Self::MemoryIntensive,
        Self::JsonProcessing,
        Self::InsertUser,
        Self::CreateUser,
        Self::DeleteUser,
        Self::GetUser,
        Self::UpdateUser,
    ];

    /// First path segment, without the leading slash.
    pub const fn segment(self) -> &'static str {
        match self {
            Self::JsonSmall => "json-small",
            Self::FibonacciBlocker => "fibonacci-blocker",
            Self::FibonacciNonBlocking => "fibonacci-non-blocking",
            Self::FibonacciParallel => "fibonacci-parallel",
            Self::VideoServing => "video-serving",
            Self::MemoryIntensive => "memory-intensive",
            Self::JsonProcessing => "json-processing",
            Self::InsertUser => "insertUser",
            Self::CreateUser => "createUser",
            Self::DeleteUser => "deleteUser",
            Self::GetUser => "getUser",
            Self::UpdateUser => "updateUser",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segment())
    }
}

/// Body of the `404` response.
pub fn endpoint_listing() -> String {
    let mut listing = String::from("404 Not Found\n\nThe available endpoints are:\n");
    for endpoint in Endpoint::ALL {
        listing.push_str(&format!("- {endpoint}\n"));
    }
    listing.push_str("- /health (server health check)");
    listing
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, endpoint_listing())
}

/// Builds the application with every endpoint, the `404` fallback and
/// request tracing.
pub fn router(state: AppState) -> Router {
    let routes = Endpoint::ALL.into_iter().fold(Router::new(), |router, endpoint| {
        let path = endpoint.to_string();
        match endpoint {
            Endpoint::JsonSmall => router.route(&path, get(handler::json_small)),
            Endpoint::FibonacciBlocker => with_param(router, &path, get(handler::fibonacci_blocker)),
            Endpoint::FibonacciNonBlocking => {
                with_param(router, &path, get(handler::fibonacci_non_blocking))
            }
            Endpoint::FibonacciParallel => {
                with_param(router, &path, get(handler::fibonacci_parallel))
            }
            Endpoint::VideoServing => router.route(&path, get(handler::video_serving)),
            Endpoint::MemoryIntensive => {
                with_param(router, &path, get(handler::memory_intensive))
            }
            Endpoint::JsonProcessing => router
                .route(&path, get(handler::json_processing_default))
                .route(&format!("{path}/{{n}}"), get(handler::json_processing)),
            Endpoint::InsertUser | Endpoint::CreateUser => {
                router.route(&path, post(handler::insert_user))
            }
            Endpoint::DeleteUser => router.route(&path, post(handler::delete_user)),
            Endpoint::GetUser => router.route(&path, post(handler::get_user)),
            Endpoint::UpdateUser => router.route(&path, post(handler::update_user)),
        }
    });

    routes
        .route("/health", get(handler::health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn with_param(
    router: Router<AppState>,
    path: &str,
    method_router: MethodRouter<AppState>,
) -> Router<AppState> {
    router
        .route(path, get(handler::missing_param))
        .route(&format!("{path}/{{n}}"), method_router)
}
