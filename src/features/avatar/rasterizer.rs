use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::future::try_join_all;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::error::AppError;

use super::types::{AvatarStyle, Layer};

/// 栅格合成协作方：按顺序叠加图层并产出图片字节（PNG）。
#[async_trait]
pub trait LayerRasterizer: Send + Sync {
    async fn rasterize(&self, layers: &[Layer], style: AvatarStyle) -> Result<Vec<u8>, AppError>;
}

/// 下载图层 → 解码 → 叠加 → 遮罩 → PNG 编码
pub struct ImageRasterizer {
    client: Client,
    canvas_size: u32,
    ipfs_gateway: String,
    /// 控制并发渲染的信号量（限制 CPU 密集型任务数量）
    semaphore: Arc<Semaphore>,
}

impl ImageRasterizer {
    pub fn new(client: Client, canvas_size: u32, ipfs_gateway: String, max_parallel: usize) -> Self {
        Self {
            client,
            canvas_size,
            ipfs_gateway,
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    async fn fetch_layer(&self, layer: &Layer) -> Result<Bytes, AppError> {
        let url = layer_fetch_url(&layer.image_url, &self.ipfs_gateway)?;
        let resp = self.client.get(&url).send().await.map_err(|e| {
            AppError::Composition(format!("Failed to fetch layer {url}: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Composition(format!(
                "Failed to fetch layer {url}: {status}"
            )));
        }
        resp.bytes()
            .await
            .map_err(|e| AppError::Composition(format!("Failed to read layer {url}: {e}")))
    }
}

#[async_trait]
impl LayerRasterizer for ImageRasterizer {
    async fn rasterize(&self, layers: &[Layer], style: AvatarStyle) -> Result<Vec<u8>, AppError> {
        let t0 = Instant::now();
        let sources = try_join_all(layers.iter().map(|l| self.fetch_layer(l))).await?;
        let fetch_ms = t0.elapsed().as_millis();

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("获取渲染信号量失败: {e}")))?;

        let size = self.canvas_size;
        // 解码/缩放/编码都是阻塞的 CPU 任务，必须移出 tokio worker。
        let png = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let images = sources
                .iter()
                .enumerate()
                .map(|(i, bytes)| {
                    image::load_from_memory(bytes).map_err(|e| {
                        AppError::Composition(format!("Failed to decode layer #{i}: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let canvas = compose_layers(&images, style, size);
            encode_png(&canvas)
        })
        .await
        .map_err(|e| AppError::Internal(format!("阻塞合成任务执行失败: {e}")))??;

        tracing::info!(
            layers = layers.len(),
            %style,
            fetch_ms = fetch_ms as u64,
            total_ms = t0.elapsed().as_millis() as u64,
            bytes = png.len(),
            "头像合成完成"
        );
        Ok(png)
    }
}

/// `ipfs://` 改写到网关，其余只接受 http(s)。
fn layer_fetch_url(raw: &str, ipfs_gateway: &str) -> Result<String, AppError> {
    if let Some(rest) = raw.strip_prefix("ipfs://") {
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        return Ok(format!("{}/{}", ipfs_gateway.trim_end_matches('/'), rest));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.to_string());
    }
    Err(AppError::Composition(format!("Unsupported layer url {raw}")))
}

/// 按顺序把图层等比缩放、居中叠加到方形画布上，最后应用样式遮罩。
pub fn compose_layers(images: &[DynamicImage], style: AvatarStyle, size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(size, size);
    for img in images {
        let fitted = if img.width() == size && img.height() == size {
            img.to_rgba8()
        } else {
            img.resize(size, size, FilterType::Triangle).to_rgba8()
        };
        let x = (size - fitted.width()) / 2;
        let y = (size - fitted.height()) / 2;
        imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));
    }
    apply_mask(&mut canvas, style);
    canvas
}

fn apply_mask(canvas: &mut RgbaImage, style: AvatarStyle) {
    let size = canvas.width();
    let radius = match style {
        AvatarStyle::Square => return,
        AvatarStyle::Circle => size as f32 / 2.0,
        AvatarStyle::Rounded => size as f32 / 8.0,
    };
    for (x, y, px) in canvas.enumerate_pixels_mut() {
        if !inside_rounded_rect(x, y, size, radius) {
            px.0[3] = 0;
        }
    }
}

/// 像素中心是否落在圆角正方形内（radius = size/2 时即为圆形）
fn inside_rounded_rect(x: u32, y: u32, size: u32, radius: f32) -> bool {
    let s = size as f32;
    let px = x as f32 + 0.5;
    let py = y as f32 + 0.5;
    let cx = px.clamp(radius, s - radius);
    let cy = py.clamp(radius, s - radius);
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= radius * radius
}

/// 使用 png crate 编码 RGBA 画布
pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, AppError> {
    let (w, h) = canvas.dimensions();
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Default);
        encoder.set_filter(png::FilterType::Paeth);
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::Composition(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(canvas.as_raw())
            .map_err(|e| AppError::Composition(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::Composition(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}
