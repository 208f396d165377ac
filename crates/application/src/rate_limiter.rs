use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Duration;
use domain::{DomainError, Timestamp};

/// 单个时间窗口内允许的最大次数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    pub window: Duration,
    pub max_hits: u32,
}

impl WindowRule {
    pub fn new(window: Duration, max_hits: u32) -> Self {
        Self { window, max_hits }
    }
}

/// 限流错误类型
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {max_hits} per {window_secs}s, retry after {retry_after_secs}s")]
    Exceeded {
        max_hits: u32,
        window_secs: i64,
        retry_after_secs: u64,
    },

    #[error("Rate limiter unavailable")]
    Unavailable,
}

impl RateLimitError {
    /// 转换为面向用户的领域错误
    pub fn into_domain(self, action: &str) -> DomainError {
        match self {
            RateLimitError::Exceeded {
                retry_after_secs, ..
            } => DomainError::rate_limited(
                format!("{action}过于频繁，请在 {retry_after_secs} 秒后重试"),
                retry_after_secs,
            ),
            RateLimitError::Unavailable => {
                DomainError::rate_limited(format!("{action}暂时不可用，请稍后重试"), 1)
            }
        }
    }
}

/// 按键计数的滑动窗口限流器
///
/// 同一个键可以同时受多条规则约束（例如每小时 6 次且每天 12 次），
/// 每条规则独立判断，任意一条超限即拒绝。
pub struct SlidingWindowLimiter {
    rules: Vec<WindowRule>,
    hits: Mutex<HashMap<String, VecDeque<Timestamp>>>,
}

impl SlidingWindowLimiter {
    pub fn new(rules: Vec<WindowRule>) -> Self {
        Self {
            rules,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// 检查是否允许一次新的操作，不记录
    pub fn check(&self, key: &str, now: Timestamp) -> Result<(), RateLimitError> {
        let hits = self.hits.lock().map_err(|_| RateLimitError::Unavailable)?;
        match hits.get(key) {
            Some(history) => self.evaluate(history, now),
            None => Ok(()),
        }
    }

    /// 记录一次操作
    pub fn record(&self, key: &str, now: Timestamp) -> Result<(), RateLimitError> {
        let mut hits = self.hits.lock().map_err(|_| RateLimitError::Unavailable)?;
        let history = hits.entry(key.to_owned()).or_default();
        history.push_back(now);
        self.trim(history, now);
        Ok(())
    }

    /// 检查并在允许时记录，两步在同一把锁内完成
    pub fn check_and_record(&self, key: &str, now: Timestamp) -> Result<(), RateLimitError> {
        let mut hits = self.hits.lock().map_err(|_| RateLimitError::Unavailable)?;
        let history = hits.entry(key.to_owned()).or_default();
        self.trim(history, now);
        self.evaluate(history, now)?;
        history.push_back(now);
        Ok(())
    }

    /// 清理过期的记录（防止内存泄漏）
    pub fn cleanup(&self, now: Timestamp) {
        if let Ok(mut hits) = self.hits.lock() {
            hits.retain(|_, history| {
                self.trim(history, now);
                !history.is_empty()
            });
        }
    }

    fn longest_window(&self) -> Duration {
        self.rules
            .iter()
            .map(|rule| rule.window)
            .max()
            .unwrap_or_else(Duration::zero)
    }

    fn trim(&self, history: &mut VecDeque<Timestamp>, now: Timestamp) {
        let horizon = now - self.longest_window();
        while history.front().is_some_and(|hit| *hit <= horizon) {
            history.pop_front();
        }
    }

    fn evaluate(&self, history: &VecDeque<Timestamp>, now: Timestamp) -> Result<(), RateLimitError> {
        for rule in &self.rules {
            let start = now - rule.window;
            let in_window: Vec<&Timestamp> = history.iter().filter(|hit| **hit > start).collect();
            if in_window.len() as u32 >= rule.max_hits {
                // 窗口内最早的一次到期后才能再次操作
                let oldest = in_window
                    .len()
                    .checked_sub(rule.max_hits as usize)
                    .and_then(|idx| in_window.get(idx))
                    .copied()
                    .copied()
                    .unwrap_or(now);
                let retry_after = (oldest + rule.window - now).num_seconds().max(1) as u64;
                return Err(RateLimitError::Exceeded {
                    max_hits: rule.max_hits,
                    window_secs: rule.window.num_seconds(),
                    retry_after_secs: retry_after,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_rate_limiting() {
        let limiter = SlidingWindowLimiter::new(vec![WindowRule::new(Duration::hours(1), 3)]);
        let now = Utc::now();

        for i in 0..3 {
            assert!(
                limiter.check_and_record("1.2.3.4", now).is_ok(),
                "hit {} should be allowed",
                i + 1
            );
        }

        match limiter.check_and_record("1.2.3.4", now) {
            Err(RateLimitError::Exceeded {
                max_hits,
                retry_after_secs,
                ..
            }) => {
                assert_eq!(max_hits, 3);
                assert_eq!(retry_after_secs, 3600);
            }
            other => panic!("Expected Exceeded error, got {other:?}"),
        }

        // 其他键不受影响
        assert!(limiter.check_and_record("5.6.7.8", now).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(vec![WindowRule::new(Duration::minutes(1), 1)]);
        let start = Utc::now();

        assert!(limiter.check_and_record("k", start).is_ok());
        assert!(limiter.check_and_record("k", start + Duration::seconds(30)).is_err());
        assert!(limiter.check_and_record("k", start + Duration::seconds(61)).is_ok());
    }

    #[test]
    fn test_multiple_rules() {
        let limiter = SlidingWindowLimiter::new(vec![
            WindowRule::new(Duration::hours(1), 2),
            WindowRule::new(Duration::days(1), 3),
        ]);
        let start = Utc::now();

        assert!(limiter.check_and_record("k", start).is_ok());
        assert!(limiter.check_and_record("k", start).is_ok());
        assert!(limiter.check_and_record("k", start).is_err());

        let later = start + Duration::hours(2);
        assert!(limiter.check_and_record("k", later).is_ok());
        // 每日上限
        assert!(limiter.check_and_record("k", later).is_err());
    }

    #[test]
    fn test_check_does_not_record() {
        let limiter = SlidingWindowLimiter::new(vec![WindowRule::new(Duration::hours(1), 1)]);
        let now = Utc::now();

        assert!(limiter.check("k", now).is_ok());
        assert!(limiter.check("k", now).is_ok());
        limiter.record("k", now).unwrap();
        assert!(limiter.check("k", now).is_err());
    }

    #[test]
    fn test_cleanup_drops_stale_keys() {
        let limiter = SlidingWindowLimiter::new(vec![WindowRule::new(Duration::minutes(1), 1)]);
        let now = Utc::now();
        limiter.record("k", now).unwrap();

        limiter.cleanup(now + Duration::minutes(2));
        assert!(limiter.check("k", now + Duration::minutes(2)).is_ok());
        assert!(limiter.hits.lock().unwrap().is_empty());
    }
}
