//! 过期 API key 清理任务
//!
//! 固定周期触发，与请求流量无关。进程内同时运行的清理不超过
//! `max_concurrent` 个：到点时若没有空闲许可，本次跳过，等下一个周期。
//! 收到关闭信号后不再触发新的清理，并等待正在执行的清理完成。

use crate::{config::SweeperConfig, error::AppError, repository::ApiKeyRepository};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// 清理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweeperStats {
    pub firings: u64,
    pub failures: u64,
    pub skipped: u64,
    pub deleted: u64,
}

#[derive(Default)]
struct Counters {
    firings: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    deleted: AtomicU64,
}

pub struct ExpirySweeper {
    api_keys: ApiKeyRepository,
    interval: Duration,
    firing_timeout: Duration,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    counters: Counters,
}

impl ExpirySweeper {
    pub fn new(
        api_keys: ApiKeyRepository,
        interval: Duration,
        max_concurrent: usize,
        firing_timeout: Duration,
    ) -> Self {
        Self {
            api_keys,
            interval,
            firing_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            counters: Counters::default(),
        }
    }

    pub fn from_config(api_keys: ApiKeyRepository, config: &SweeperConfig) -> Self {
        Self::new(
            api_keys,
            Duration::from_secs(config.interval_secs),
            config.max_concurrent,
            Duration::from_secs(config.firing_timeout_secs),
        )
    }

    /// 取消该 token 即触发优雅关闭
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> SweeperStats {
        SweeperStats {
            firings: self.counters.firings.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
        }
    }

    /// 执行一次清理，带超时
    pub async fn run_once(&self) -> Result<u64, AppError> {
        self.counters.firings.fetch_add(1, Ordering::Relaxed);

        let result =
            match tokio::time::timeout(self.firing_timeout, self.api_keys.delete_expired_api_keys())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Internal(format!(
                    "expired api key sweep timed out after {:?}",
                    self.firing_timeout
                ))),
            };

        match &result {
            Ok(deleted) => {
                self.counters.deleted.fetch_add(*deleted, Ordering::Relaxed);
                metrics::counter!("api_keys_expired_deleted_total").increment(*deleted);
                if *deleted > 0 {
                    tracing::info!(deleted, "Deleted expired api keys");
                } else {
                    tracing::debug!("No expired api keys to delete");
                }
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("api_key_sweep_failures_total").increment(1);
                tracing::error!(error = %e, "Expired api key sweep failed");
            }
        }

        result
    }

    /// 周期运行直到收到关闭信号
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.permits.available_permits(),
            "Expiry sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即返回，第一次清理在一个周期之后
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.fire(),
            }
        }

        tracing::info!("Expiry sweeper stopping, waiting for in-flight sweeps");
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Expiry sweeper stopped");
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn fire(self: &Arc<Self>) {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Previous sweeps still running, rescheduled to next interval");
                return;
            }
        };

        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let _permit = permit;
            // 错误已在 run_once 中记录，不影响后续周期
            let _ = this.run_once().await;
        });
    }
}
