//! HTTP handler functions for the run club API.

use actix_web::{HttpResponse, web};
use runclub_map_server_models::{ApiError, ApiHealth};
use runclub_map_sheet::collection::load_collection;

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/runclubs`
///
/// Always `200` with a feature collection. When the sheet cannot be read
/// the collection is empty.
pub async fn runclubs(state: web::Data<AppState>) -> HttpResponse {
    let collection = load_collection(state.source.as_ref(), &state.ranges, state.schema).await;
    log::debug!("Serving {} clubs", collection.len());
    HttpResponse::Ok().json(collection)
}

/// `OPTIONS /api/runclubs` without CORS preflight headers.
pub async fn options() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Any other method on `/api/runclubs`.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ApiError::new("Method not allowed"))
}
