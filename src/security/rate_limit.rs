//! Request throttling for the credential endpoints.

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use super::events::SECURITY;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

/// Capability consulted before the authenticator runs. A shared store
/// (Redis and the like) can stand in for the in-process limiter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_record(&self, client_key: &str) -> RateDecision;
}

/// Sliding-window limiter: at most `max_requests` per `window` per client.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    hits: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            hits: DashMap::new(),
            max_requests: max_requests as usize,
            window,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    fn record_at(&self, client_key: &str, now: Instant) -> RateDecision {
        let mut entry = self.hits.entry(client_key.to_owned()).or_default();
        while entry
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            entry.pop_front();
        }

        if entry.len() >= self.max_requests {
            let oldest = entry.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return RateDecision::Denied { retry_after };
        }

        entry.push_back(now);
        RateDecision::Allowed
    }

    /// Drops clients with no hits inside the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|t| now.duration_since(*t) < self.window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }

    /// Sweeps idle clients once per window for as long as the limiter lives.
    pub fn spawn_cleanup(self: &Arc<Self>) {
        let limiter = Arc::downgrade(self);
        let period = self.window;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(limiter) = limiter.upgrade() else { break };
                limiter.cleanup();
            }
        });
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check_and_record(&self, client_key: &str) -> RateDecision {
        self.record_at(client_key, Instant::now())
    }
}

/// Rate-limit key for a request: the peer address. Forwarding headers
/// (first `x-forwarded-for` hop, then `x-real-ip`) take precedence only when
/// `trust_proxy` is set; otherwise any client could rotate them.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let forwarded = || {
        let first_hop = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        first_hop.or(real_ip).map(str::to_owned)
    };

    trust_proxy
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn throttle(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, state.config.trust_proxy_headers);

    if let RateDecision::Denied { retry_after } = state.rate_limiter.check_and_record(&key).await {
        warn!(
            target: SECURITY,
            event = "RATE_LIMIT_EXCEEDED",
            client = %key,
            path = %request.uri().path(),
        );
        return Err(AppError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        });
    }

    Ok(next.run(request).await)
}
