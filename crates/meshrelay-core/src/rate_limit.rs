//! Two-tier admission control.
//!
//! Each user has a token bucket (`burst_allowance` capacity, refilled at
//! `messages_per_minute`) plus a cooldown; one global bucket caps the whole
//! relay at `global_messages_per_minute`. A message is admitted only if the
//! user bucket, the global bucket and the cooldown all allow it, in which
//! case one token is taken from both buckets. Otherwise nothing changes.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use meshrelay_types::config::RateLimitConfig;

/// Slack for float accumulation when a bucket refills to exactly one token.
const TOKEN_EPSILON: f64 = 1e-9;

/// Outcome of an admission check. Rejection is a value, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdmissionDecision {
    pub admitted: bool,
    /// Seconds until the same user could be admitted; 0 when admitted.
    pub retry_after_seconds: f64,
}

impl AdmissionDecision {
    fn admit() -> Self {
        Self {
            admitted: true,
            retry_after_seconds: 0.0,
        }
    }

    fn reject(retry_after_seconds: f64) -> Self {
        Self {
            admitted: false,
            retry_after_seconds,
        }
    }
}

/// Remaining global headroom, for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalSnapshot {
    pub tokens_available: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, per_minute: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            per_second: f64::from(per_minute) / 60.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.last_refill = now;
    }

    fn is_full(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= self.capacity
    }

    fn has_token(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= 1.0
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Seconds until one whole token is available.
    fn wait_seconds(&self) -> f64 {
        if self.has_token() || self.per_second <= 0.0 {
            0.0
        } else {
            (1.0 - self.tokens) / self.per_second
        }
    }
}

#[derive(Debug)]
struct UserState {
    bucket: TokenBucket,
    cooldown_until: Option<Instant>,
}

pub struct RateLimiter {
    per_user_capacity: u32,
    per_user_rate: u32,
    cooldown: Duration,
    vip_users: HashSet<String>,
    users: DashMap<String, UserState>,
    global: Mutex<TokenBucket>,
    global_capacity: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let global_capacity = config.global_messages_per_minute.max(1);
        Self {
            per_user_capacity: config.burst_allowance.max(1),
            per_user_rate: config.messages_per_minute,
            cooldown: config.cooldown(),
            vip_users: config.vip_users.iter().cloned().collect(),
            users: DashMap::new(),
            global: Mutex::new(TokenBucket::full(
                global_capacity,
                config.global_messages_per_minute,
                Instant::now(),
            )),
            global_capacity,
        }
    }

    /// Check and, if admitted, consume tokens for `user_id` now.
    pub fn check(&self, user_id: &str) -> AdmissionDecision {
        self.check_at(user_id, Instant::now())
    }

    /// Check with an explicit clock reading.
    pub fn check_at(&self, user_id: &str, now: Instant) -> AdmissionDecision {
        if self.vip_users.contains(user_id) {
            return AdmissionDecision::admit();
        }

        // Lock order: user entry, then global bucket.
        let mut entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserState {
                bucket: TokenBucket::full(self.per_user_capacity, self.per_user_rate, now),
                cooldown_until: None,
            });
        let user = entry.value_mut();
        user.bucket.refill(now);

        let mut global = self.global.lock().unwrap_or_else(|e| e.into_inner());
        global.refill(now);

        let cooldown_left = user
            .cooldown_until
            .map(|until| until.saturating_duration_since(now).as_secs_f64())
            .unwrap_or(0.0);

        if cooldown_left <= 0.0 && user.bucket.has_token() && global.has_token() {
            user.bucket.take();
            global.take();
            user.cooldown_until = (!self.cooldown.is_zero()).then(|| now + self.cooldown);
            return AdmissionDecision::admit();
        }

        let retry_after = cooldown_left
            .max(user.bucket.wait_seconds())
            .max(global.wait_seconds());
        tracing::debug!(
            user_id,
            retry_after_seconds = retry_after,
            user_tokens = user.bucket.tokens,
            global_tokens = global.tokens,
            "Admission rejected"
        );
        AdmissionDecision::reject(retry_after)
    }

    /// Forget everything about a user.
    pub fn reset_user(&self, user_id: &str) {
        self.users.remove(user_id);
    }

    /// Drop users whose bucket has refilled and whose cooldown has passed.
    /// A fresh entry for them would be identical. Returns how many were dropped.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let before = self.users.len();
        self.users.retain(|_, state| {
            state.bucket.refill(now);
            let cooling = state.cooldown_until.is_some_and(|until| until > now);
            cooling || !state.bucket.is_full()
        });
        before.saturating_sub(self.users.len())
    }

    pub fn global_snapshot(&self) -> GlobalSnapshot {
        self.global_snapshot_at(Instant::now())
    }

    pub fn global_snapshot_at(&self, now: Instant) -> GlobalSnapshot {
        let mut global = self.global.lock().unwrap_or_else(|e| e.into_inner());
        global.refill(now);
        GlobalSnapshot {
            tokens_available: global.tokens.floor() as u32,
            capacity: self.global_capacity,
        }
    }

    pub fn is_vip(&self, user_id: &str) -> bool {
        self.vip_users.contains(user_id)
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }
}
