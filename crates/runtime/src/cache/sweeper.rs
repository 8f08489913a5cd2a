//! Periodic expiry sweep for the replay guard.
//!
//! This is the gateway's only background job. It owns nothing but a handle
//! to the cache and follows a `Notify`-based start/stop lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::RequestCache;
use crate::config::ReplayConfig;

pub struct CacheSweeper {
    cache: Arc<RequestCache>,
    retention: Duration,
    sweep_interval: Duration,
    shutdown_notify: Arc<Notify>,
    is_running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CacheSweeper {
    pub fn new(cache: Arc<RequestCache>, config: &ReplayConfig) -> Self {
        Self {
            cache,
            retention: config.retention,
            sweep_interval: config.sweep_interval,
            shutdown_notify: Arc::new(Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Start the sweep loop. Calling `start` on a running sweeper is a no-op.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let cache = self.cache.clone();
        let shutdown = self.shutdown_notify.clone();
        let retention = self.retention;
        let period = self.sweep_interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; sweeping an empty cache at
            // startup is harmless.
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.evict_older_than(retention);
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                remaining = cache.len(),
                                "Evicted expired request ids from replay guard"
                            );
                        }
                    }
                    _ = shutdown.notified() => {
                        tracing::info!("Replay guard sweeper shutting down");
                        break;
                    }
                }
            }
        }));

        tracing::info!(
            "Replay guard sweeper started (interval {:?}, retention {:?})",
            period,
            retention
        );
    }

    /// Graceful shutdown, waits for the loop to exit. Idempotent.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown_notify.notify_one();
        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                tracing::error!("Replay guard sweeper task failed: {}", e);
            }
        }
    }
}
