use std::time::Duration;

use bundle_avatar::features::avatar;
use bundle_avatar::startup::run_startup_checks;
use bundle_avatar::{AppConfig, AppState, ShutdownManager, build_router};

#[tokio::main]
async fn main() {
    // 日志级别来自配置，配置加载失败时日志尚未初始化
    if let Err(e) = AppConfig::init_global() {
        eprintln!("Config init failed: {e}");
        std::process::exit(1);
    }
    let config = AppConfig::global();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bundle_avatar={},tower_http=info", config.logging.level).into()
            }),
        )
        .init();

    let shutdown_manager = ShutdownManager::new();

    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_startup_checks(config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let pipeline = match avatar::build_pipeline(config) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Pipeline init failed: {}", e);
            std::process::exit(1);
        }
    };
    let app_state = AppState::new(pipeline);

    // 过期缓存条目清理
    let sweeper = if config.render.sweep_interval_secs > 0 {
        Some(avatar::spawn_cache_sweeper(
            app_state.pipeline.cache().clone(),
            app_state.pipeline.clock().clone(),
            Duration::from_secs(config.render.sweep_interval_secs),
            shutdown_manager.handle(),
        ))
    } else {
        tracing::warn!("缓存清理已关闭，渲染时间表将随请求的 token 数量持续增长");
        None
    };

    let app = build_router(app_state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!(
        "Storage: {:?} (ttl={}ms, coalesce={}, style_in_cache_key={})",
        config.storage_path(),
        config.render.cache_ttl_ms,
        config.render.coalesce,
        config.render.style_in_cache_key
    );

    let shutdown_timeout = config.shutdown.timeout_duration();
    let signal_manager = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = signal_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    // 收到退出信号后最多再等 shutdown_timeout，超时则强制退出
    let deadline = async {
        shutdown_manager.wait_for_shutdown().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        res = graceful => {
            if let Err(e) = res {
                tracing::error!("服务器运行错误: {}", e);
                std::process::exit(1);
            }
        }
        _ = deadline => {
            tracing::warn!("优雅退出超时（{}秒），强制退出", config.shutdown.timeout_secs);
        }
    }

    if let Some(handle) = sweeper
        && let Err(e) = handle.await
    {
        tracing::warn!("缓存清理任务异常退出: {}", e);
    }

    tracing::info!("服务器已关闭");
}
