//! Fixed-window request counting per client address.
//!
//! Each client key owns a counter holding the number of requests admitted in
//! the current window and the instant of the last admitted request. The
//! counter table is an `scc::HashMap`, so a check only locks the bucket that
//! holds its key; unrelated clients never contend.
//!
//! Stale counters are removed by a sweep task owned by the limiter. The task
//! is started explicitly with [`FixedWindowLimiter::spawn_sweeper`] and stops
//! on [`FixedWindowLimiter::shutdown`] or when the limiter is dropped.
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use scc::{HashMap, hash_map::Entry};
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::config::models::RateLimitConfig;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Rate limit exceeded")]
pub struct RateLimitExceeded;

#[derive(Debug, Clone, Copy)]
struct ClientCounter {
    last_seen: Instant,
    count: u64,
}

pub struct FixedWindowLimiter {
    counters: HashMap<String, ClientCounter>,
    capacity: u64,
    window: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FixedWindowLimiter {
    pub fn new(capacity: u64, window: Duration, sweep_interval: Duration) -> Result<Self, String> {
        if capacity == 0 {
            return Err("Rate limit 'requests' must be greater than 0".to_string());
        }
        if window.is_zero() || sweep_interval.is_zero() {
            return Err("Rate limit durations must be greater than zero".to_string());
        }

        Ok(Self {
            counters: HashMap::new(),
            capacity,
            window,
            sweep_interval,
            cancel: CancellationToken::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// Build a limiter from a `RateLimitConfig` definition.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, String> {
        let window = humantime::parse_duration(&config.window)
            .map_err(|e| format!("Invalid window '{}': {e}", config.window))?;
        let sweep_interval = humantime::parse_duration(&config.sweep_interval)
            .map_err(|e| format!("Invalid sweep interval '{}': {e}", config.sweep_interval))?;

        tracing::info!(
            requests = config.requests,
            window = %config.window,
            sweep_interval = %config.sweep_interval,
            "Creating fixed-window rate limiter"
        );

        Self::new(config.requests, window, sweep_interval)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }

    /// Admit or reject one request from `key`.
    pub async fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(key, Instant::now()).await
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub async fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        match self.counters.entry_async(key.to_string()).await {
            Entry::Vacant(vacant) => {
                vacant.insert_entry(ClientCounter {
                    last_seen: now,
                    count: 1,
                });
                Ok(())
            }
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if now.saturating_duration_since(counter.last_seen) > self.window {
                    counter.count = 1;
                    counter.last_seen = now;
                    Ok(())
                } else if counter.count >= self.capacity {
                    Err(RateLimitExceeded)
                } else {
                    counter.count += 1;
                    counter.last_seen = now;
                    Ok(())
                }
            }
        }
    }

    /// Drop counters idle for longer than the sweep interval.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let before = self.counters.len();
        let max_idle = self.sweep_interval;
        self.counters
            .retain_async(|_, counter| now.saturating_duration_since(counter.last_seen) <= max_idle)
            .await;
        before.saturating_sub(self.counters.len())
    }

    /// Start the periodic sweep. Calling this more than once is a no-op.
    ///
    /// The task holds only a weak reference, so it never keeps the limiter
    /// alive on its own.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let limiter = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let period = self.sweep_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else { break };
                        let removed = limiter.sweep().await;
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = limiter.tracked_clients(),
                                "Swept idle rate limit counters"
                            );
                        }
                    }
                }
            }
            tracing::debug!("Rate limit sweeper stopped");
        }));
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
            }
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for FixedWindowLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
