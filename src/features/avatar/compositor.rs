use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;

use super::rasterizer::LayerRasterizer;
use super::types::{AvatarStyle, Layer};

/// 合成图层并落盘
pub struct Compositor {
    rasterizer: Arc<dyn LayerRasterizer>,
}

impl Compositor {
    pub fn new(rasterizer: Arc<dyn LayerRasterizer>) -> Self {
        Self { rasterizer }
    }

    /// 生成图片并写入 `path`，返回写入字节数。
    pub async fn compose(
        &self,
        layers: &[Layer],
        style: AvatarStyle,
        path: &Path,
    ) -> Result<u64, AppError> {
        let bytes = self.rasterizer.rasterize(layers, style).await?;
        write_atomic(path, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// 先写同目录临时文件再 rename，读者只会看到完整的旧图或完整的新图。
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let tmp = temp_sibling(path)?;
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AppError::Composition(format!(
            "Failed to write {}: {e}",
            tmp.display()
        )));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AppError::Composition(format!(
            "Failed to move image into {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> Result<PathBuf, AppError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Composition(format!("Invalid image path {}", path.display())))?;
    Ok(path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedRasterizer(Result<Vec<u8>, AppError>);

    #[async_trait]
    impl LayerRasterizer for FixedRasterizer {
        async fn rasterize(&self, _: &[Layer], _: AvatarStyle) -> Result<Vec<u8>, AppError> {
            self.0.clone()
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bundle_avatar_compose_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn compose_persists_rasterized_bytes() {
        let dir = temp_dir();
        let path = dir.join("opal-1-1.png");
        let compositor = Compositor::new(Arc::new(FixedRasterizer(Ok(b"png-bytes".to_vec()))));

        let written = compositor
            .compose(&[], AvatarStyle::Square, &path)
            .await
            .expect("compose");
        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&path).expect("read image"), b"png-bytes");
        assert_eq!(leftover_temp_files(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_render_leaves_existing_image_untouched() {
        let dir = temp_dir();
        let path = dir.join("opal-1-1.png");
        std::fs::write(&path, b"previous").expect("seed image");
        let compositor = Compositor::new(Arc::new(FixedRasterizer(Err(AppError::Composition(
            "decode failed".into(),
        )))));

        let err = compositor
            .compose(&[], AvatarStyle::Circle, &path)
            .await
            .expect_err("compose should fail");
        assert_eq!(err, AppError::Composition("decode failed".into()));
        assert_eq!(std::fs::read(&path).expect("read image"), b"previous");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails_without_leftovers() {
        let dir = temp_dir();
        let path = dir.join("gone").join("opal-1-1.png");
        let compositor = Compositor::new(Arc::new(FixedRasterizer(Ok(vec![1, 2, 3]))));

        let err = compositor
            .compose(&[], AvatarStyle::Square, &path)
            .await
            .expect_err("write should fail");
        assert!(matches!(err, AppError::Composition(_)));
        assert_eq!(leftover_temp_files(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
