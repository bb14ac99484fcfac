use axum::{
    Router,
    extract::{Path, State},
    response::Response,
    routing::get,
};

use crate::{error::AppError, state::AppState};

use super::types::AvatarPathParams;

#[utoipa::path(
    get,
    path = "/{avatar}/{network}/{collectionId}/{tokenId}",
    summary = "获取合成头像",
    description = "解析 token（或 bundle）的全部图层，按样式合成 PNG 并落盘缓存。缓存窗口内的重复请求直接返回已有文件（200），新渲染返回 201。",
    params(
        ("avatar" = String, Path, description = "头像样式：square|circle|rounded"),
        ("network" = String, Path, description = "网络：unique|quartz|opal|sapphire"),
        ("collectionId" = u32, Path, description = "集合 ID（>= 1）"),
        ("tokenId" = u32, Path, description = "Token ID")
    ),
    responses(
        (status = 200, description = "缓存命中，PNG 图片"),
        (status = 201, description = "新渲染完成，PNG 图片"),
        (status = 400, description = "参数错误（纯文本消息）", body = String),
        (status = 500, description = "链上解析/合成/读取失败（纯文本消息）", body = String)
    ),
    tag = "Avatar"
)]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(params): Path<AvatarPathParams>,
) -> Result<Response, AppError> {
    state.pipeline.serve(&params).await
}

pub fn create_avatar_router() -> Router<AppState> {
    Router::new().route(
        "/:avatar/:network/:collectionId/:tokenId",
        get(get_avatar),
    )
}
