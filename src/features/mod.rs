/// 头像合成与缓存
pub mod avatar;

/// 健康检查
pub mod health;
