use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
};
use crate::error::AppError;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Per-key request limiter: `attempts` per `window`, replenished evenly.
///
/// The clock is injected so tests can drive time. State lives in process
/// memory only and is evicted explicitly through [`KeyedRateLimiter::sweep`];
/// nothing survives a restart or is shared between instances.
pub struct KeyedRateLimiter<C: Clock = DefaultClock> {
    limiter: Arc<RateLimiter<String, DashMapStateStore<String>, C, NoOpMiddleware<C::Instant>>>,
    clock: C,
}

impl<C: Clock> Clone for KeyedRateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            clock: self.clock.clone(),
        }
    }
}

impl KeyedRateLimiter<DefaultClock> {
    pub fn new(attempts: u32, window_seconds: u64) -> Result<Self, AppError> {
        Self::with_clock(attempts, window_seconds, DefaultClock::default())
    }
}

impl<C: Clock> KeyedRateLimiter<C> {
    pub fn with_clock(attempts: u32, window_seconds: u64, clock: C) -> Result<Self, AppError> {
        let quota = quota(attempts, window_seconds)?;
        Ok(Self {
            limiter: Arc::new(RateLimiter::dashmap_with_clock(quota, &clock)),
            clock,
        })
    }

    /// Consume one attempt for `key`. `Err` carries how long until the next
    /// attempt would be allowed.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.limiter
            .check_key(&key.to_string())
            .map_err(|negative| negative.wait_time_from(self.clock.now()))
    }

    /// Drop every key whose quota has fully replenished. Returns the number of
    /// keys still tracked.
    pub fn sweep(&self) -> usize {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        self.limiter.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

fn quota(attempts: u32, window_seconds: u64) -> Result<Quota, AppError> {
    let burst = NonZeroU32::new(attempts).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("rate limit attempts must be positive"))
    })?;
    let period = Duration::from_millis((window_seconds * 1000) / attempts as u64);
    let quota = Quota::with_period(period).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "rate limit window of {}s is too short for {} attempts",
            window_seconds,
            attempts
        ))
    })?;
    Ok(quota.allow_burst(burst))
}

/// Client address for rate limiting: first `x-forwarded-for` entry, then the
/// peer address when the server was started with connect info.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware for IP-keyed rate limiting
pub async fn rate_limit_middleware<C>(
    State(limiter): State<KeyedRateLimiter<C>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    C: Clock + Send + Sync + 'static,
{
    let Some(ip) = client_ip(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check(&ip.to_string()) {
        Ok(()) => Ok(next.run(request).await),
        Err(wait) => {
            tracing::warn!(client_ip = %ip, retry_after_secs = wait.as_secs(), "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(wait.as_secs().max(1)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn limiter(attempts: u32, window: u64) -> (KeyedRateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let limiter = KeyedRateLimiter::with_clock(attempts, window, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn allows_burst_then_rejects() {
        let (limiter, _clock) = limiter(3, 60);

        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_ok());

        let wait = limiter.check("10.0.0.1").unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(20));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn replenishes_as_clock_advances() {
        let (limiter, clock) = limiter(3, 60);
        for _ in 0..3 {
            limiter.check("k").unwrap();
        }
        assert!(limiter.check("k").is_err());

        clock.advance(Duration::from_secs(20));
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());
    }

    #[test]
    fn sweep_evicts_replenished_keys() {
        let (limiter, clock) = limiter(2, 10);
        limiter.check("a").unwrap();
        limiter.check("b").unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::from_secs(11));
        assert_eq!(limiter.sweep(), 0);
    }

    #[test]
    fn wall_clock_limiter_tracks_keys() {
        let limiter = KeyedRateLimiter::new(2, 60).unwrap();

        assert!(limiter.check("10.0.0.9").is_ok());
        assert!(limiter.check("10.0.0.9").is_ok());
        assert!(limiter.check("10.0.0.9").is_err());
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.sweep(), 1);
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(KeyedRateLimiter::new(0, 60).is_err());
    }
}
