//! Background lease renewal
//!
//! One task per held lock. It extends the lease every interval and stops on
//! the first failed extension, flipping the shared status to lost. It never
//! interrupts the holder; the holder finds out by polling the status.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use super::model::{LockStatus, LockToken};
use crate::metrics;
use crate::store::LeaseStore;

/// Everything the renewal loop needs, owned by the task
pub(crate) struct RenewalParams {
    pub store: Arc<dyn LeaseStore>,
    pub name: String,
    pub key: String,
    pub token: LockToken,
    pub ttl: Duration,
    pub interval: Duration,
    pub max_renewals: u32,
    pub status: Arc<LockStatus>,
}

/// Handle to a running renewal task
pub(crate) struct RenewalTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RenewalTask {
    pub(crate) fn spawn(params: RenewalParams) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(params, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signal the task and wait until it has fully exited.
    ///
    /// An extension already in flight completes before this returns, so no
    /// renewal can land after the caller moves on to release.
    pub(crate) async fn stop(self) {
        let _ = self.stop_tx.try_send(());
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            warn!(error = %e, "Lock renewal task panicked");
        }
    }

    /// Stop without waiting; used where awaiting is impossible
    pub(crate) fn abort(self) {
        self.handle.abort();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run(params: RenewalParams, mut stop_rx: mpsc::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + params.interval, params.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => {
                break;
            }
            _ = ticker.tick() => {
                if !params.status.is_acquired() {
                    break;
                }
                if params.max_renewals > 0 && params.status.renewals() >= params.max_renewals {
                    debug!(
                        name = %params.name,
                        renewals = params.max_renewals,
                        "Renewal limit reached, lease will expire"
                    );
                    break;
                }

                match params.store.extend(&params.key, &params.token, params.ttl).await {
                    Ok(true) => {
                        let count = params.status.record_renewal();
                        debug!(name = %params.name, renewals = count, "Lease renewed");
                    }
                    Ok(false) => {
                        if params.status.mark_lost() {
                            metrics::record_renewal_failure();
                            warn!(
                                name = %params.name,
                                "Lease renewal rejected: lease expired or taken over"
                            );
                        }
                        break;
                    }
                    Err(e) => {
                        if params.status.mark_lost() {
                            metrics::record_renewal_failure();
                            warn!(
                                name = %params.name,
                                error = %e,
                                "Lease renewal failed, treating lock as lost"
                            );
                        }
                        break;
                    }
                }
            }
        }
    }
}
