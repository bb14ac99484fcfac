use std::sync::Arc;

use crate::features::avatar::AvatarPipeline;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 头像处理管线（持有缓存、存储目录与协作方）
    pub pipeline: Arc<AvatarPipeline>,
}

impl AppState {
    pub fn new(pipeline: AvatarPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
