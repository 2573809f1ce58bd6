use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::model::AllocationEvent;
use crate::observability::INVALIDATIONS_TOTAL;
use crate::session::AllocationSession;

/// Background task that re-queries a session's round on a fixed interval.
pub async fn run_poller(session: Arc<AllocationSession>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; the caller has just refreshed.
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(e) = session.refresh().await {
            // Transient; the next tick retries.
            debug!("poller skip for session {}: {e}", session.id());
        }
    }
}

/// Refresh every session concurrently. Returns how many failed.
pub async fn refresh_all(sessions: &[Arc<AllocationSession>]) -> usize {
    let results = join_all(sessions.iter().map(|s| s.refresh())).await;
    results.iter().filter(|r| r.is_err()).count()
}

/// Re-query whenever another session commits a change to the same round.
/// Events the session published itself are skipped; a lagged receiver
/// refreshes once to catch up.
pub async fn run_invalidation_listener(session: Arc<AllocationSession>, mut rx: broadcast::Receiver<AllocationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) if event.origin() == session.id() => continue,
            Ok(event) => {
                metrics::counter!(INVALIDATIONS_TOTAL).increment(1);
                debug!("session {} invalidated by {}", session.id(), event.origin());
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("session {} lagged {skipped} invalidations", session.id());
            }
            Err(RecvError::Closed) => {
                info!("invalidation channel closed for session {}", session.id());
                return;
            }
        }
        if let Err(e) = session.refresh().await {
            warn!("session {} refresh after invalidation failed: {e}", session.id());
        }
    }
}
