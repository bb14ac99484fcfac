use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::avatar::handler::get_avatar,
    ),
    components(schemas(
        crate::features::health::handler::HealthResponse,
        crate::features::avatar::AvatarStyle,
        crate::features::avatar::NetworkId,
    )),
    tags(
        (
            name = "Avatar",
            description = "头像合成：按 token/bundle 的图层合成 PNG，短时间窗口内复用已渲染文件。"
        ),
        (name = "Health", description = "健康检查：服务探活。"),
    ),
    info(
        title = "Bundle Avatar API",
        version = env!("CARGO_PKG_VERSION"),
        description = "链上 token bundle 头像合成服务（Axum + utoipa）。"
    )
)]
pub struct ApiDoc;
