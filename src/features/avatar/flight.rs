use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::AppError;

use super::store::CacheKey;

type FlightFuture = Shared<BoxFuture<'static, Result<(), AppError>>>;

/// 本请求在 flight 中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    /// 发起渲染
    Leader,
    /// 等待已有渲染的结果
    Follower,
    /// 无进行中的渲染，且 `needed` 判定无需渲染（上一个 flight 刚完成并已记录）
    Skipped,
}

/// 按缓存键合并并发渲染：同一键同时只有一个渲染在进行，后到者等待其结果。
///
/// 渲染以独立任务运行，发起请求断开不会取消其他等待者。不同键之间互不阻塞。
#[derive(Clone, Default)]
pub struct RenderFlights {
    inflight: Arc<Mutex<HashMap<CacheKey, FlightFuture>>>,
}

impl RenderFlights {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入 `key` 正在进行的渲染，或用 `job` 发起一个新的渲染。
    ///
    /// `needed` 在持有 in-flight 锁时求值：flight 先完成记录再移除自身，
    /// 所以这里看不到 flight 时，缓存判定已经反映了它的结果。
    pub async fn run<P, F>(
        &self,
        key: &CacheKey,
        needed: P,
        job: F,
    ) -> (FlightRole, Result<(), AppError>)
    where
        P: FnOnce() -> bool,
        F: FnOnce() -> BoxFuture<'static, Result<(), AppError>>,
    {
        let (role, flight) = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(key) {
                Some(existing) => (FlightRole::Follower, existing.clone()),
                None if !needed() => return (FlightRole::Skipped, Ok(())),
                None => {
                    let flight = self.spawn(key.clone(), job());
                    inflight.insert(key.clone(), flight.clone());
                    (FlightRole::Leader, flight)
                }
            }
        };
        (role, flight.await)
    }

    /// 当前进行中的渲染数量
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn spawn(&self, key: CacheKey, job: BoxFuture<'static, Result<(), AppError>>) -> FlightFuture {
        let inflight = self.inflight.clone();
        let handle = tokio::spawn(async move {
            let result = job.await;
            inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            result
        });
        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(AppError::Internal(format!("渲染任务执行失败: {e}"))))
        }
        .boxed()
        .shared()
    }
}
