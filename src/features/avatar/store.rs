use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

use super::types::{AvatarRequest, AvatarStyle, CollectionId, NetworkId, TokenId};

/// 缓存键，同时也是存储目录下的文件名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// `{network}-{collectionId}-{tokenId}.png`
    pub fn new(network: NetworkId, collection_id: CollectionId, token_id: TokenId) -> Self {
        Self(format!("{network}-{collection_id}-{token_id}.png"))
    }

    /// `{avatar}-{network}-{collectionId}-{tokenId}.png`
    pub fn with_style(
        avatar: AvatarStyle,
        network: NetworkId,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Self {
        Self(format!("{avatar}-{network}-{collection_id}-{token_id}.png"))
    }

    /// 按配置决定样式是否参与缓存键
    pub fn for_request(req: &AvatarRequest, style_in_key: bool) -> Self {
        if style_in_key {
            Self::with_style(req.avatar, req.network, req.collection_id, req.token_id)
        } else {
            Self::new(req.network, req.collection_id, req.token_id)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 渲染结果的落盘目录
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// 打开存储目录，不存在时创建。
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        if !root.exists() {
            tracing::info!("📁 创建图片存储目录: {:?}", root);
            fs::create_dir_all(&root).map_err(|e| {
                AppError::PathConstruction(format!(
                    "Unable to create storage root {}: {e}",
                    root.display()
                ))
            })?;
        }
        check_root(&root, fs::metadata(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 缓存键对应的文件路径，每次都确认存储目录仍然可用
    pub async fn path_for(&self, key: &CacheKey) -> Result<PathBuf, AppError> {
        check_root(&self.root, tokio::fs::metadata(&self.root).await)?;
        Ok(self.root.join(key.as_str()))
    }
}

fn check_root(root: &Path, meta: std::io::Result<fs::Metadata>) -> Result<(), AppError> {
    let meta = meta.map_err(|e| {
        AppError::PathConstruction(format!(
            "Storage root {} is not accessible: {e}",
            root.display()
        ))
    })?;
    if !meta.is_dir() {
        return Err(AppError::PathConstruction(format!(
            "Storage root {} is not a directory",
            root.display()
        )));
    }
    if meta.permissions().readonly() {
        return Err(AppError::PathConstruction(format!(
            "Storage root {} is read-only",
            root.display()
        )));
    }
    Ok(())
}
