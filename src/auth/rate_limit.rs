// Copyright 2025 Userhub Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-window rate limiting keyed by client address.
//!
//! Counts reset hard at each window boundary rather than sliding.
//! State is process-local and lost on restart; quotas here are soft
//! throttles, not security boundaries.

use axum::{extract::Request, middleware::Next, response::Response};
use moka::sync::Cache;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ApiError;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Enable rate limiting
    pub enabled: bool,
    /// Maximum number of tracked clients
    pub max_clients: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
            enabled: true,
            max_clients: 100_000,
        }
    }
}

impl RateLimitConfig {
    /// Per-minute quota, the only granularity routes configure.
    pub fn per_minute(max_requests: u32, enabled: bool) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            enabled,
            ..Default::default()
        }
    }
}

/// Per-key window counter.
///
/// The window index swap uses compare-exchange so that concurrent
/// requests at a boundary cannot double-reset the count.
#[derive(Debug)]
struct WindowCounter {
    window_index: AtomicU64,
    count: AtomicU32,
    epoch: Instant,
}

impl WindowCounter {
    fn new(epoch: Instant) -> Self {
        Self {
            window_index: AtomicU64::new(0),
            count: AtomicU32::new(0),
            epoch,
        }
    }

    fn try_acquire(&self, max_requests: u32, window: Duration) -> Result<u32, Duration> {
        let window_ms = window.as_millis().max(1) as u64;
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let current = now_ms / window_ms;

        let seen = self.window_index.load(Ordering::Acquire);
        if seen < current
            && self
                .window_index
                .compare_exchange(seen, current, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // Hard reset at the boundary. Losers of the race keep
            // counting in the fresh window.
            self.count.store(0, Ordering::Release);
        }

        let used = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if used <= max_requests {
            Ok(max_requests - used)
        } else {
            let window_end_ms = (current + 1) * window_ms;
            Err(Duration::from_millis(window_end_ms.saturating_sub(now_ms)))
        }
    }
}

/// Result of a rate limit check
#[derive(Debug)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in the current window
        remaining: u32,
    },
    /// Request is rate limited
    RateLimited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

/// Fixed-window rate limiter.
///
/// Keys live in a bounded moka cache with idle-based eviction so that
/// tracking many unique addresses cannot grow memory without bound.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Cache<String, Arc<WindowCounter>>,
    epoch: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        // Entries idle for several windows have nothing left to count.
        let ttl = config.window * 10;
        let counters = Cache::builder()
            .max_capacity(config.max_clients)
            .time_to_idle(ttl)
            .build();

        Self {
            config,
            counters,
            epoch: Instant::now(),
        }
    }

    /// Check whether a request from `identifier` is within quota.
    pub fn check_rate_limit(&self, identifier: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let epoch = self.epoch;
        let counter = self
            .counters
            .get_with(identifier.to_string(), || Arc::new(WindowCounter::new(epoch)));

        match counter.try_acquire(self.config.max_requests, self.config.window) {
            Ok(remaining) => RateLimitResult::Allowed { remaining },
            Err(retry_after) => RateLimitResult::RateLimited { retry_after },
        }
    }

    /// Current number of tracked clients
    pub fn client_count(&self) -> u64 {
        self.counters.run_pending_tasks();
        self.counters.entry_count()
    }
}

/// Extract the client address from request headers, preferring proxy
/// headers over nothing at all.
pub fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Middleware enforcing a limiter on whatever routes it is layered onto.
/// Runs before the handler; rejection short-circuits with 429.
pub async fn enforce(
    limiter: Arc<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());

    match limiter.check_rate_limit(&client) {
        RateLimitResult::Allowed { .. } => Ok(next.run(request).await),
        RateLimitResult::RateLimited { retry_after } => {
            tracing::debug!("Rate limit exceeded for {client}");
            Err(ApiError::RateLimited { retry_after })
        }
    }
}
