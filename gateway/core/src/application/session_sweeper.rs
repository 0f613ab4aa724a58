// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session Sweeper - background expiry sweep
//!
//! On a fixed interval removes expired sessions from the store, drops
//! associations whose session is gone and expires unanswered logins. The task
//! is owned by whoever starts it and stops when its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::association_bridge::AssociationBridge;
use crate::application::authentication_service::AuthenticationService;
use crate::domain::session_store::SessionStore;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub associations: usize,
    pub pending_logins: usize,
}

pub struct SessionSweeper {
    sessions: Arc<dyn SessionStore>,
    bridge: Arc<AssociationBridge>,
    auth: Option<Arc<AuthenticationService>>,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<dyn SessionStore>, bridge: Arc<AssociationBridge>, interval: Duration) -> Self {
        Self {
            sessions,
            bridge,
            auth: None,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Also expire pending logins on every sweep.
    pub fn with_authentication(mut self, auth: Arc<AuthenticationService>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Cancel this token to stop the background task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(interval_seconds = self.interval.as_secs(), "Starting session sweeper");

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(
                                sessions = report.sessions,
                                associations = report.associations,
                                pending_logins = report.pending_logins,
                                "Session sweep removed expired entries"
                            );
                        }
                        Ok(_) => debug!("Session sweep found nothing to remove"),
                        Err(e) => warn!("Session sweep failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping session sweeper");
                    break;
                }
            }
        }

        info!("Session sweeper stopped");
    }

    /// One full sweep: sessions first, so the association pass sees them gone.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let sessions = self.sessions.cleanup().await?;
        let associations = self.bridge.prune().await?;
        let pending_logins = match &self.auth {
            Some(auth) => auth.sweep().await?,
            None => 0,
        };
        Ok(SweepReport {
            sessions,
            associations,
            pending_logins,
        })
    }
}
