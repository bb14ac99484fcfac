use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::avatar::{ImageStore, NetworkId};
use std::fs;
use std::path::Path;

/// 执行启动检查
///
/// 1. 打开图片存储目录（不存在时由 `ImageStore::open` 创建）
/// 2. 写入探测文件，确认目录可写
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    let store = ImageStore::open(config.storage_path())?;
    probe_writable(store.root())?;
    tracing::info!("✅ 图片存储目录可用: {:?}", store.root());

    tracing::info!(
        "🌐 已启用网络: {}",
        NetworkId::ALL
            .iter()
            .map(|n| format!("{n}={}", config.chain.endpoints.base_url(*n)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!("✅ 启动检查完成");
    Ok(())
}

fn probe_writable(root: &Path) -> Result<(), AppError> {
    let probe = root.join(".write-probe");
    fs::write(&probe, b"ok")
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|e| AppError::Internal(format!("图片存储目录不可写 {}: {e}", root.display())))
}
