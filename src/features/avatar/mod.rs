mod compositor;
mod flight;
pub mod handler;
mod pipeline;
mod rasterizer;
mod resolver;
mod staleness;
mod store;
mod streamer;
mod types;
mod validator;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::shutdown::ShutdownHandle;

pub use compositor::Compositor;
pub use flight::{FlightRole, RenderFlights};
pub use handler::create_avatar_router;
pub use pipeline::{AvatarPipeline, PipelineOptions, RenderOutcome};
pub use rasterizer::{ImageRasterizer, LayerRasterizer, compose_layers, encode_png};
pub use resolver::{BundleResolver, UniqueRestResolver};
pub use staleness::{Clock, ManualClock, StalenessCache, SystemClock};
pub use store::{CacheKey, ImageStore};
pub use streamer::{PNG_CONTENT_TYPE, stream_image};
pub use types::{
    AvatarPathParams, AvatarRequest, AvatarStyle, CollectionId, Layer, NetworkId, TokenId,
};
pub use validator::validate;

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cache_ttl: config.render.cache_ttl(),
            coalesce: config.render.coalesce,
            style_in_cache_key: config.render.style_in_cache_key,
        }
    }
}

/// 用生产协作方（Unique REST + 图层栅格合成）构建处理管线
pub fn build_pipeline(config: &AppConfig) -> Result<AvatarPipeline, AppError> {
    let store = ImageStore::open(config.storage_path())?;

    let chain_client = crate::http::chain_client(&config.chain)
        .map_err(|e| AppError::Internal(format!("构建链上 HTTP client 失败: {e}")))?;
    let layer_client = crate::http::layer_client(&config.chain)
        .map_err(|e| AppError::Internal(format!("构建图层 HTTP client 失败: {e}")))?;

    let resolver = Arc::new(UniqueRestResolver::new(
        chain_client.clone(),
        config.chain.clone(),
    ));
    let rasterizer = Arc::new(ImageRasterizer::new(
        layer_client.clone(),
        config.render.canvas_size,
        config.chain.ipfs_gateway.clone(),
        config.render.effective_parallelism(),
    ));

    Ok(AvatarPipeline::new(
        store,
        resolver,
        rasterizer,
        Arc::new(SystemClock),
        PipelineOptions::from_config(config),
    ))
}

/// 周期性清理过期的缓存条目，收到退出信号后停止。
pub fn spawn_cache_sweeper(
    cache: Arc<StalenessCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: ShutdownHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.sweep_expired(clock.now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = cache.len(), "清理过期缓存条目");
                    }
                }
                _ = shutdown.wait() => {
                    tracing::debug!("缓存清理任务退出");
                    break;
                }
            }
        }
    })
}
