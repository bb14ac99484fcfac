use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::features::{avatar, health};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 组装全部路由与全局中间件
pub fn build_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/health", get(health::handler::health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(avatar::create_avatar_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // request_id 在最外层，保证 TraceLayer 的日志也落在带 request_id 的 span 里
        .layer(axum::middleware::from_fn(request_id_middleware))
}
