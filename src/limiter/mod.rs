//! Regenerative Rate Limiter — per-client admission control
//!
//! Each client owns a bucket of individually-expiring tokens. Tokens are
//! minted lazily on access at a fixed production rate and pruned once at
//! call entry, so a `has_token` → `consume_token` pair within one request
//! can never disagree about expiry.
//!
//! The production rate is the product of three tunables carried over from
//! the original deployment (`photon_rate * atp_per_photon *
//! light_intensity`, defaults 100 × 0.1 × 1.0 = 10 tokens/sec). Unlike
//! that deployment, minting here is scaled by elapsed wall-clock time and
//! the bucket is capped, so rapid polling cannot grow a client's budget —
//! see `rapid_polling_is_bounded` in the tests for the behavior change.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::config::LimiterConfig;

/// A time-boxed admission credit for one client.
#[derive(Debug, Clone)]
pub struct Token {
    /// Opaque token identifier
    pub id: String,
    /// Mint time
    pub minted_at: Instant,
    /// Expiry time — always `minted_at + token_lifespan`
    pub expires_at: Instant,
}

/// Rate limit status reported to clients (HTTP 429 bodies and /health).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStatus {
    /// Currently available tokens
    pub tokens: usize,
    /// Bucket capacity
    pub max_tokens: usize,
    /// Production rate in tokens per second
    pub regeneration_rate: f64,
}

/// Per-client token bucket.
struct ClientBucket {
    /// Outstanding tokens, oldest first
    tokens: Vec<Token>,
    /// Mint clock — advanced by exactly the production consumed, so
    /// fractional token production carries over between calls
    last_mint: Instant,
}

/// Per-client admission control with lazily regenerated tokens.
///
/// All methods take `&self`; state lives behind one mutex so calls from
/// concurrent request handlers serialize per the limiter, and each call
/// observes a single consistent `now`.
pub struct RegenerativeLimiter {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, ClientBucket>>,
}

impl RegenerativeLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `client_id` has at least one live token.
    pub fn has_token(&self, client_id: &str) -> bool {
        let mut clients = self.lock();
        let bucket = self.touch(&mut clients, client_id, Instant::now());
        !bucket.tokens.is_empty()
    }

    /// Consume the oldest token for `client_id`.
    ///
    /// Returns `false` when the bucket is empty — a normal negative
    /// result, surfaced by HTTP callers as 429.
    pub fn consume_token(&self, client_id: &str) -> bool {
        let mut clients = self.lock();
        let bucket = self.touch(&mut clients, client_id, Instant::now());
        if bucket.tokens.is_empty() {
            debug!(client = client_id, "token bucket empty");
            return false;
        }
        let token = bucket.tokens.remove(0);
        debug!(client = client_id, token = %token.id, remaining = bucket.tokens.len(), "token consumed");
        true
    }

    /// Current token count for `client_id` (after minting and pruning).
    pub fn token_count(&self, client_id: &str) -> usize {
        let mut clients = self.lock();
        self.touch(&mut clients, client_id, Instant::now()).tokens.len()
    }

    /// Rate limit status for `client_id`.
    pub fn status(&self, client_id: &str) -> LimiterStatus {
        let mut clients = self.lock();
        let tokens = self.touch(&mut clients, client_id, Instant::now()).tokens.len();
        LimiterStatus {
            tokens,
            max_tokens: self.config.max_tokens,
            regeneration_rate: self.config.regeneration_rate(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBucket>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring a client's bucket up to date: mint whatever production has
    /// accrued since the last mint, then prune expired tokens. This is
    /// the only place tokens are created or expired, and it runs exactly
    /// once per public call.
    fn touch<'a>(
        &self,
        clients: &'a mut HashMap<String, ClientBucket>,
        client_id: &str,
        now: Instant,
    ) -> &'a mut ClientBucket {
        let lifespan = Duration::from_millis(self.config.token_lifespan_ms);
        let bucket = clients.entry(client_id.to_string()).or_insert_with(|| {
            // First contact mints one immediate token so a new client's
            // first request is admitted.
            debug!(client = client_id, "new client bucket");
            ClientBucket {
                tokens: vec![mint_token(now, lifespan)],
                last_mint: now,
            }
        });

        let rate = self.config.regeneration_rate();
        if rate > 0.0 {
            let elapsed = now.saturating_duration_since(bucket.last_mint);
            let due = (elapsed.as_secs_f64() * rate).floor() as u64;
            if due > 0 {
                let room = self.config.max_tokens.saturating_sub(bucket.tokens.len());
                let minted = (due as usize).min(room);
                for _ in 0..minted {
                    bucket.tokens.push(mint_token(now, lifespan));
                }
                // Advance the clock by the full production window even
                // when the bucket was full — overflow production is lost,
                // it does not bank.
                bucket.last_mint += Duration::from_secs_f64(due as f64 / rate);
            }
        }

        bucket.tokens.retain(|t| t.expires_at > now);
        bucket
    }
}

fn mint_token(now: Instant, lifespan: Duration) -> Token {
    Token {
        id: crate::short_id("token"),
        minted_at: now,
        expires_at: now + lifespan,
    }
}
