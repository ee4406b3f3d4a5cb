use std::{collections::HashMap, net::IpAddr};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    last_failure: DateTime<Utc>,
}

/// Consecutive failed logins per client address.
pub struct LoginLimiter {
    max_attempts: u32,
    lockout: Duration,
    attempts: Mutex<HashMap<IpAddr, Attempts>>,
}

impl LoginLimiter {
    pub fn new(max_attempts: u32, lockout_minutes: i64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout: Duration::minutes(lockout_minutes.max(0)),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// `Some(until)` while `ip` is locked out.
    pub async fn locked_until(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut attempts = self.attempts.lock().await;
        let a = *attempts.get(&ip)?;
        if a.failures < self.max_attempts {
            return None;
        }
        let until = a.last_failure + self.lockout;
        if now < until {
            return Some(until);
        }
        attempts.remove(&ip);
        None
    }

    /// Records a failed login for `ip`. Entries whose lockout window has
    /// passed are dropped on the way.
    pub async fn failure(&self, ip: IpAddr, now: DateTime<Utc>) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let lockout = self.lockout;
        attempts.retain(|_, a| a.last_failure + lockout > now);
        let a = attempts.entry(ip).or_insert(Attempts {
            failures: 0,
            last_failure: now,
        });
        a.failures += 1;
        a.last_failure = now;
        a.failures
    }

    pub async fn success(&self, ip: IpAddr) {
        self.attempts.lock().await.remove(&ip);
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn locks_after_max_failures() {
        let l = LoginLimiter::new(3, 10);
        let t0 = Utc::now();
        for i in 0..2 {
            l.failure(ip(1), t0 + Duration::seconds(i)).await;
            assert!(l.locked_until(ip(1), t0 + Duration::seconds(i)).await.is_none());
        }
        let last = t0 + Duration::seconds(2);
        assert_eq!(l.failure(ip(1), last).await, 3);
        assert_eq!(l.locked_until(ip(1), last).await, Some(last + Duration::minutes(10)));
        assert!(l.locked_until(ip(2), last).await.is_none());
    }

    #[tokio::test]
    async fn lockout_expires() {
        let l = LoginLimiter::new(2, 10);
        let t0 = Utc::now();
        l.failure(ip(1), t0).await;
        l.failure(ip(1), t0).await;
        assert!(l.locked_until(ip(1), t0 + Duration::minutes(9)).await.is_some());
        assert!(l.locked_until(ip(1), t0 + Duration::minutes(10)).await.is_none());
        // counter starts over
        assert_eq!(l.failure(ip(1), t0 + Duration::minutes(11)).await, 1);
    }

    #[tokio::test]
    async fn success_resets() {
        let l = LoginLimiter::new(2, 10);
        let t0 = Utc::now();
        l.failure(ip(1), t0).await;
        l.success(ip(1)).await;
        assert_eq!(l.failure(ip(1), t0).await, 1);
        assert!(l.locked_until(ip(1), t0).await.is_none());
    }

    #[tokio::test]
    async fn stale_addresses_are_forgotten() {
        let l = LoginLimiter::new(5, 10);
        let t0 = Utc::now();
        for last in 1..=20 {
            l.failure(ip(last), t0).await;
        }
        assert_eq!(l.attempts.lock().await.len(), 20);

        l.failure(ip(99), t0 + Duration::minutes(10)).await;
        let attempts = l.attempts.lock().await;
        assert_eq!(attempts.len(), 1);
        assert!(attempts.contains_key(&ip(99)));
    }
}
