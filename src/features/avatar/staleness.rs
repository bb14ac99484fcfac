use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::store::CacheKey;

/// 时间来源（便于测试时手动推进时间）
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// 真实单调时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 缓存键 → 最近一次成功渲染时间。
///
/// 仅是"是否需要重新渲染"的提示，不代表文件一定存在；进程重启即清空。
#[derive(Debug)]
pub struct StalenessCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Instant>>,
}

impl StalenessCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 无记录，或距上次渲染已过 ttl（含等于）时返回 true。
    pub fn should_render(&self, key: &CacheKey, now: Instant) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            None => true,
            Some(&at) => self.is_expired(at, now),
        }
    }

    /// 无条件覆盖该键的渲染时间
    pub fn record(&self, key: &CacheKey, now: Instant) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), now);
    }

    pub fn last_render(&self, key: &CacheKey) -> Option<Instant> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 删除已过期条目，返回删除数量。
    ///
    /// 过期条目与缺失条目对 `should_render` 的结果相同，删除不改变缓存判定。
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, &mut at| !self.is_expired(at, now));
        before - entries.len()
    }

    fn is_expired(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::avatar::types::{CollectionId, NetworkId, TokenId};

    fn key(token: u32) -> CacheKey {
        CacheKey::new(NetworkId::Unique, CollectionId(1), TokenId(token))
    }

    #[test]
    fn unseen_key_needs_render() {
        let cache = StalenessCache::new(Duration::from_millis(3000));
        assert!(cache.should_render(&key(1), Instant::now()));
        assert!(cache.is_empty());
    }

    #[test]
    fn fresh_entry_suppresses_render_until_ttl() {
        let clock = ManualClock::new();
        let cache = StalenessCache::new(Duration::from_millis(3000));
        cache.record(&key(1), clock.now());

        clock.advance(Duration::from_millis(2999));
        assert!(!cache.should_render(&key(1), clock.now()));

        clock.advance(Duration::from_millis(1));
        assert!(cache.should_render(&key(1), clock.now()));
    }

    #[test]
    fn record_overwrites_timestamp() {
        let clock = ManualClock::new();
        let cache = StalenessCache::new(Duration::from_secs(3));
        let first = clock.now();
        cache.record(&key(1), first);
        clock.advance(Duration::from_secs(5));
        cache.record(&key(1), clock.now());

        assert_eq!(cache.last_render(&key(1)), Some(first + Duration::from_secs(5)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let clock = ManualClock::new();
        let cache = StalenessCache::new(Duration::from_secs(3));
        cache.record(&key(1), clock.now());
        assert!(!cache.should_render(&key(1), clock.now()));
        assert!(cache.should_render(&key(2), clock.now()));
    }

    #[test]
    fn sweep_only_drops_expired_entries() {
        let clock = ManualClock::new();
        let cache = StalenessCache::new(Duration::from_secs(3));
        cache.record(&key(1), clock.now());
        clock.advance(Duration::from_secs(2));
        cache.record(&key(2), clock.now());
        clock.advance(Duration::from_secs(1));

        assert_eq!(cache.sweep_expired(clock.now()), 1);
        assert_eq!(cache.last_render(&key(1)), None);
        assert!(!cache.should_render(&key(2), clock.now()));
    }
}
