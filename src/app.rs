use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::features::{health, qr};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 组装完整路由：`/qr`、`/health`、Swagger UI，以及全局中间件。
pub fn build_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/health", get(health::health_check))
        .merge(qr::create_qr_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 最外层：保证 TraceLayer 的日志也落在 request_id span 内
        .layer(axum::middleware::from_fn(request_id_middleware))
}
