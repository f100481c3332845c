// ABOUTME: Background task that periodically deletes expired codes, flows, sessions, refresh tokens
// ABOUTME: Runs alongside request handling; stops on an explicit shutdown signal
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_core::errors::AppResult;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Stores;
use crate::utils::clock::Clock;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Authorization codes
    pub codes: u64,
    /// Flow sessions
    pub flows: u64,
    /// SSO sessions
    pub sso_sessions: u64,
    /// Refresh token records
    pub refresh_tokens: u64,
}

impl SweepReport {
    /// Total rows removed
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.codes + self.flows + self.sso_sessions + self.refresh_tokens
    }
}

/// Periodic expiry cleanup over every store with a TTL
#[derive(Clone)]
pub struct ExpirySweeper {
    stores: Stores,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// Running sweeper; dropping it also stops the task
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to finish
    pub async fn shutdown(self) {
        if let Err(e) = self.shutdown_tx.send(()).await {
            debug!(error = ?e, "Sweeper already stopped");
        }
        if let Err(e) = self.task.await {
            warn!(error = ?e, "Sweeper task ended abnormally");
        }
    }
}

impl ExpirySweeper {
    /// Sweeper over `stores` that runs every `interval`
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            stores,
            clock,
            interval,
        }
    }

    /// Delete everything expired as of the clock's current time. A failing
    /// store is logged and skipped.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let report = SweepReport {
            codes: Self::counted(
                "authorization codes",
                self.stores.codes.delete_expired_codes(now).await,
            ),
            flows: Self::counted(
                "flow sessions",
                self.stores.flows.delete_expired_flows(now).await,
            ),
            sso_sessions: Self::counted(
                "sso sessions",
                self.stores.sso_sessions.delete_expired_sessions(now).await,
            ),
            refresh_tokens: Self::counted(
                "refresh tokens",
                self.stores.refresh_tokens.delete_expired_refresh_tokens(now).await,
            ),
        };
        if report.total() > 0 {
            debug!(
                codes = report.codes,
                flows = report.flows,
                sso_sessions = report.sso_sessions,
                refresh_tokens = report.refresh_tokens,
                "Swept expired records"
            );
        }
        report
    }

    fn counted(what: &str, result: AppResult<u64>) -> u64 {
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to sweep expired {what}");
            0
        })
    }

    /// Start the background loop
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Expiry sweeper received shutdown signal");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown_tx, task }
    }
}
