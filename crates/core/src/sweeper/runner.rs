//! Sweeper loop implementation.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::engine::StageEngine;
use crate::finalizer::Finalizer;
use crate::ledger::{JobClass, JobLedger, JobStatus, LedgerError};
use crate::metrics;

use super::config::SweeperConfig;

/// Maximum jobs failed per class in one pass.
const SWEEP_BATCH: i64 = 100;

/// Result of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub assets_timed_out: usize,
    pub renders_timed_out: usize,
    /// Bundles whose gate or finalizer was re-run.
    pub bundles_touched: usize,
    /// Bundles stuck in `Analyzing` whose asset dispatch was retried.
    pub bundles_redispatched: usize,
}

pub struct Sweeper {
    config: SweeperConfig,
    ledger: Arc<dyn JobLedger>,
    engine: Arc<StageEngine>,
    finalizer: Arc<Finalizer>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Sweeper {
    pub fn new(
        config: SweeperConfig,
        ledger: Arc<dyn JobLedger>,
        engine: Arc<StageEngine>,
        finalizer: Arc<Finalizer>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            ledger,
            engine,
            finalizer,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the background loop.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sweeper already running");
            return;
        }

        let sweeper = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Sweeper loop started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Sweeper loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match sweeper.sweep_once().await {
                            Ok(report) if report != SweepReport::default() => info!(
                                "Sweep failed {} asset and {} render jobs across {} bundles, retried {} stalled bundles",
                                report.assets_timed_out,
                                report.renders_timed_out,
                                report.bundles_touched,
                                report.bundles_redispatched
                            ),
                            Ok(_) => debug!("Sweep found no stuck jobs"),
                            Err(e) => warn!("Sweep error: {}", e),
                        }
                    }
                }
            }
            info!("Sweeper loop stopped");
        });
    }

    /// Stop the background loop.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Sweeper not running");
            return;
        }

        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!("Sweeper stopped");
    }

    /// Run one pass: fail timed-out jobs, then re-evaluate their bundles.
    /// Bundles that never got their asset jobs are dispatched again.
    pub async fn sweep_once(&self) -> Result<SweepReport, LedgerError> {
        let asset_bundles = self.expire(JobClass::Asset, self.config.asset_timeout_secs)?;
        let render_bundles = self.expire(JobClass::Render, self.config.render_timeout_secs)?;

        let mut report = SweepReport {
            assets_timed_out: asset_bundles.len(),
            renders_timed_out: render_bundles.len(),
            ..Default::default()
        };

        let asset_bundles: BTreeSet<String> = asset_bundles.into_iter().collect();
        let render_bundles: BTreeSet<String> = render_bundles.into_iter().collect();
        report.bundles_touched = asset_bundles.union(&render_bundles).count();

        for bundle_id in &asset_bundles {
            if let Err(e) = self.engine.run_fan_in_gate(bundle_id).await {
                error!("Fan-in gate for swept bundle {} errored: {}", bundle_id, e);
            }
        }
        for bundle_id in &render_bundles {
            if let Err(e) = self.finalizer.try_finalize(bundle_id).await {
                error!("Finalization of swept bundle {} errored: {}", bundle_id, e);
            }
        }

        match self
            .engine
            .resume_stalled(cutoff(self.config.asset_timeout_secs), SWEEP_BATCH)
            .await
        {
            Ok(resumed) => report.bundles_redispatched = resumed.len(),
            Err(e) => error!("Listing stalled bundles errored: {}", e),
        }

        Ok(report)
    }

    /// Fail stale jobs of one class. Returns the bundle id of each job failed.
    fn expire(&self, class: JobClass, timeout_secs: u64) -> Result<Vec<String>, LedgerError> {
        let mut bundles = Vec::new();
        for job in self.ledger.list_stale(class, cutoff(timeout_secs), SWEEP_BATCH)? {
            let message = format!("timed out after {}s without a callback", timeout_secs);
            let outcome = self
                .ledger
                .update_status(&job.id, JobStatus::Failed, None, Some(message))?;

            if outcome.is_applied() {
                warn!(
                    "Timed out {} job {} for bundle {} (handle {})",
                    job.kind, job.id, job.bundle_id, job.handle
                );
                metrics::JOBS_SWEPT.with_label_values(&[class.as_str()]).inc();
                bundles.push(job.bundle_id);
            }
        }
        Ok(bundles)
    }
}

/// Instant before which a record counts as stale.
fn cutoff(timeout_secs: u64) -> DateTime<Utc> {
    let timeout = i64::try_from(timeout_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
