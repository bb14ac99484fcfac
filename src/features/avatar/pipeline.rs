use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{http::StatusCode, response::Response};
use futures_util::future::{BoxFuture, FutureExt};

use crate::error::AppError;

use super::compositor::Compositor;
use super::flight::{FlightRole, RenderFlights};
use super::rasterizer::LayerRasterizer;
use super::resolver::BundleResolver;
use super::staleness::{Clock, StalenessCache};
use super::store::{CacheKey, ImageStore};
use super::streamer;
use super::types::{AvatarPathParams, AvatarRequest};
use super::validator;

/// 管线行为选项
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub cache_ttl: Duration,
    /// 是否合并同一缓存键的并发渲染
    pub coalesce: bool,
    /// 样式是否参与缓存键
    pub style_in_cache_key: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(3000),
            coalesce: true,
            style_in_cache_key: false,
        }
    }
}

/// 缓存判定结果，对应响应状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 未过期，直接返回已有文件（200）
    Cached,
    /// 本次请求完成（或等到了）一次新渲染（201）
    Rendered,
}

impl RenderOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            RenderOutcome::Cached => StatusCode::OK,
            RenderOutcome::Rendered => StatusCode::CREATED,
        }
    }
}

/// 单次请求的处理管线：
/// 校验 → 缓存键 → 过期判定 →（未命中：解析图层 → 合成落盘 → 记录）→ 流式返回。
///
/// 任一阶段失败即终止，不做自动重试。
pub struct AvatarPipeline {
    store: ImageStore,
    cache: Arc<StalenessCache>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn BundleResolver>,
    compositor: Arc<Compositor>,
    flights: Option<RenderFlights>,
    style_in_cache_key: bool,
}

impl AvatarPipeline {
    pub fn new(
        store: ImageStore,
        resolver: Arc<dyn BundleResolver>,
        rasterizer: Arc<dyn LayerRasterizer>,
        clock: Arc<dyn Clock>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            cache: Arc::new(StalenessCache::new(options.cache_ttl)),
            clock,
            resolver,
            compositor: Arc::new(Compositor::new(rasterizer)),
            flights: options.coalesce.then(RenderFlights::new),
            style_in_cache_key: options.style_in_cache_key,
        }
    }

    pub fn cache(&self) -> &Arc<StalenessCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// 完整处理一次请求并生成图片响应
    pub async fn serve(&self, raw: &AvatarPathParams) -> Result<Response, AppError> {
        let (path, outcome) = self.prepare(raw).await?;
        tracing::info!("Serving {}...", path.display());
        streamer::stream_image(&path, outcome.status()).await
    }

    /// 执行到流式返回之前的所有阶段，返回图片路径与缓存判定结果。
    pub async fn prepare(&self, raw: &AvatarPathParams) -> Result<(PathBuf, RenderOutcome), AppError> {
        let req = validator::validate(raw)?;
        let key = CacheKey::for_request(&req, self.style_in_cache_key);
        let path = self.store.path_for(&key).await?;

        if !self.cache.should_render(&key, self.clock.now()) {
            tracing::debug!(key = %key, "缓存命中");
            return Ok((path, RenderOutcome::Cached));
        }
        tracing::debug!(key = %key, "缓存未命中，开始渲染");

        match &self.flights {
            Some(flights) => {
                let (role, result) = flights
                    .run(
                        &key,
                        || self.cache.should_render(&key, self.clock.now()),
                        || self.render_job(req, key.clone(), path.clone()),
                    )
                    .await;
                match role {
                    FlightRole::Leader => {}
                    FlightRole::Follower => tracing::debug!(key = %key, "合并到进行中的渲染"),
                    FlightRole::Skipped => {
                        tracing::debug!(key = %key, "渲染刚完成，直接返回");
                        return Ok((path, RenderOutcome::Cached));
                    }
                }
                result?;
            }
            None => self.render_job(req, key.clone(), path.clone()).await?,
        }
        Ok((path, RenderOutcome::Rendered))
    }

    /// 解析图层 → 合成落盘 → 记录渲染时间。失败时不记录。
    fn render_job(
        &self,
        req: AvatarRequest,
        key: CacheKey,
        path: PathBuf,
    ) -> BoxFuture<'static, Result<(), AppError>> {
        let resolver = self.resolver.clone();
        let compositor = self.compositor.clone();
        let cache = self.cache.clone();
        let clock = self.clock.clone();
        async move {
            let t0 = Instant::now();
            let layers = resolver
                .resolve(req.network, req.collection_id, req.token_id)
                .await?;
            tracing::debug!(key = %key, layers = layers.len(), "图层解析完成");

            let bytes = compositor.compose(&layers, req.avatar, &path).await?;
            cache.record(&key, clock.now());
            tracing::info!(
                key = %key,
                layers = layers.len(),
                bytes,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "渲染完成"
            );
            Ok(())
        }
        .boxed()
    }
}
