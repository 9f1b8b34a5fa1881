//! Periodic token refresh sweep
//!
//! The [`TokenRefreshSweep`] refreshes every active account whose token is
//! close to expiry, once at start and then on a fixed interval. It is owned
//! through the [`SweepHandle`] returned by [`TokenRefreshSweep::start`]; the
//! daemon shuts it down together with the HTTP server.
//!
//! ## Flow
//!
//! ```text
//! interval tick ──→ AccountService::refresh_all(false) ──→ log outcome
//!       ▲                                                     │
//!       └──────────────── until CancellationToken fires ◀─────┘
//! ```
//!
//! The sweep takes no locks; racing with a refresh triggered elsewhere is
//! harmless, the latest stored credential wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::accounts::{AccountRefreshResult, AccountService, RefreshOutcome};

/// Background refresher for all active accounts
pub struct TokenRefreshSweep {
    accounts: Arc<AccountService>,
    interval: Duration,
}

impl TokenRefreshSweep {
    pub fn new(accounts: Arc<AccountService>, interval: Duration) -> Self {
        Self { accounts, interval }
    }

    /// Runs a single sweep and logs per-account failures
    pub async fn run_once(&self) -> Vec<AccountRefreshResult> {
        match self.accounts.refresh_all(false).await {
            Ok(results) => {
                for result in &results {
                    match &result.outcome {
                        RefreshOutcome::Failed { error } => error!(
                            account_id = %result.account_id,
                            email = %result.email,
                            %error,
                            "Account needs re-authorization"
                        ),
                        outcome => debug!(account_id = %result.account_id, ?outcome, "Sweep result"),
                    }
                }
                results
            }
            Err(e) => {
                error!(error = %e, "Token refresh sweep could not list accounts");
                Vec::new()
            }
        }
    }

    /// Spawns the sweep loop
    pub fn start(self) -> SweepHandle {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting token refresh sweep"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }

            info!("Token refresh sweep stopped");
        });

        SweepHandle { handle, cancel }
    }
}

/// Owner of a running sweep
#[derive(Debug)]
pub struct SweepHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl SweepHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the loop and waits for an in-flight sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Token refresh sweep task failed");
        }
    }
}
