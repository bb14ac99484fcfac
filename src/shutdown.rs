//! 优雅退出管理模块
//!
//! 监听 SIGINT/SIGTERM（Windows 下为 Ctrl+C），通知 HTTP 服务与后台任务退出。

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// 应用请求退出
    Application,
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),
}

/// 优雅退出管理器。只记录第一次触发的退出原因。
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 触发优雅退出，重复触发会被忽略
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if first {
            info!("触发优雅退出: {:?}", reason);
        } else {
            debug!("重复的退出信号被忽略");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 等待退出信号（已触发时立即返回）
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        self.handle()
            .wait()
            .await
            .unwrap_or(ShutdownReason::Application)
    }

    /// 供后台任务监听退出事件
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// 启动信号处理器
    pub async fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            info!("启动Unix信号处理器");
            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

            let manager = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("接收到SIGINT信号 (Ctrl+C)");
                        manager.trigger_shutdown(ShutdownReason::Interrupt);
                    }
                    _ = sigterm.recv() => {
                        info!("接收到SIGTERM信号");
                        manager.trigger_shutdown(ShutdownReason::Terminate);
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            info!("启动Ctrl+C信号处理器");
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("监听Ctrl+C信号失败: {}", e);
                    return;
                }
                info!("接收到Ctrl+C信号");
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            });
        }

        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 优雅退出句柄
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownHandle {
    /// 等待退出信号；管理器被释放时返回 None
    pub async fn wait(&mut self) -> Option<ShutdownReason> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => {
                error!("退出信号通道已关闭");
                None
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_trigger_wins() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutting_down());

        manager.trigger_shutdown(ShutdownReason::Interrupt);
        manager.trigger_shutdown(ShutdownReason::Terminate);

        assert!(manager.is_shutting_down());
        assert_eq!(manager.wait_for_shutdown().await, ShutdownReason::Interrupt);
    }

    #[tokio::test]
    async fn handle_observes_later_trigger() {
        let manager = ShutdownManager::new();
        let mut handle = manager.handle();
        assert!(!handle.is_shutting_down());

        let trigger = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger_shutdown(ShutdownReason::Application);
        });

        assert_eq!(handle.wait().await, Some(ShutdownReason::Application));
        assert!(handle.is_shutting_down());
    }

    #[tokio::test]
    async fn wait_does_not_return_before_trigger() {
        let manager = ShutdownManager::new();
        let res = tokio::time::timeout(Duration::from_millis(50), manager.wait_for_shutdown()).await;
        assert!(res.is_err());
    }
}
