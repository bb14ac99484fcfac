use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

use crate::config::ChainConfig;

/// 全局复用的 HTTP Client（统一连接池/Keep-Alive），避免每次请求重复创建。
///
/// 链上 REST 与图层下载的超时不同，这里按用途拆分 client；
/// 首次调用时按传入配置初始化，之后的调用复用同一实例。
static CHAIN_CLIENT: OnceCell<Client> = OnceCell::new();
static LAYER_CLIENT: OnceCell<Client> = OnceCell::new();

fn build(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    // 0 表示不限制
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build()
}

/// 链上 REST 请求使用的 client
pub fn chain_client(cfg: &ChainConfig) -> Result<&'static Client, reqwest::Error> {
    CHAIN_CLIENT.get_or_try_init(|| build(cfg.timeout_secs))
}

/// 图层图片下载使用的 client
pub fn layer_client(cfg: &ChainConfig) -> Result<&'static Client, reqwest::Error> {
    LAYER_CLIENT.get_or_try_init(|| build(cfg.layer_timeout_secs))
}
