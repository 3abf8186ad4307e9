//! Interval scheduler for the two sweeps.
//!
//! Explicitly constructed and owned by `main`; `start` spawns one task per
//! sweep, `stop` signals shutdown over broadcast and waits for both loops
//! to drain. A sweep error is logged and the loop keeps ticking.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use tollgate_channel::ChannelManager;

use crate::config::SweepConfig;
use crate::sweep;

pub struct SweepScheduler {
    manager: Arc<ChannelManager>,
    db: Arc<Mutex<Connection>>,
    config: SweepConfig,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn new(
        manager: Arc<ChannelManager>,
        db: Arc<Mutex<Connection>>,
        config: SweepConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            manager,
            db,
            config,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Spawn the settle and expire loops.
    pub fn start(&mut self) {
        let settle_interval = Duration::from_secs(self.config.settle_interval_secs);
        let expire_interval = Duration::from_secs(self.config.expire_interval_secs);
        let warning_window = self.config.warning_window_secs;

        let manager = self.manager.clone();
        let db = self.db.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(settle_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) =
                            sweep::auto_settle_sweep(&manager, &db, warning_window).await
                        {
                            tracing::error!(error = %e, "auto-settle sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("auto-settle loop stopped");
        }));

        let manager = self.manager.clone();
        let db = self.db.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(expire_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sweep::expire_sweep(&manager, &db).await {
                            tracing::error!(error = %e, "expire sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("expire loop stopped");
        }));

        tracing::info!(
            settle_interval_secs = self.config.settle_interval_secs,
            expire_interval_secs = self.config.expire_interval_secs,
            warning_window_secs = warning_window,
            "sweep scheduler started"
        );
    }

    /// Signal shutdown and wait for both loops to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("sweep scheduler stopped");
    }
}
