mod error;
mod handlers;
mod middleware;

pub use error::ApiError;
pub use handlers::parse_convert_request;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{MethodRouter, get},
};

use crate::application::convert::{Converter, PageConfig};

use middleware::{log_responses, set_request_context};

/// Identity reported by the status route.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

#[derive(Clone)]
pub struct HttpState {
    pub converter: Arc<Converter>,
    pub service: Arc<ServiceInfo>,
    pub page: PageConfig,
}

/// Build the conversion router: status on `GET`, conversion on `POST`, for `/` and `/api`.
pub fn build_router(state: HttpState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", conversion_endpoint())
        .route("/api", conversion_endpoint())
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}

fn conversion_endpoint() -> MethodRouter<HttpState> {
    get(handlers::service_status)
        .post(handlers::convert_document)
        .fallback(handlers::method_not_allowed)
}
