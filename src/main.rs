use std::sync::Arc;

use tracing::{info, warn};

use seasonal::backend::InMemoryBackend;
use seasonal::classify::{classify_all, SectionAllocationState};
use seasonal::config::Config;
use seasonal::notify::RefreshHub;
use seasonal::poller::{run_invalidation_listener, run_poller};
use seasonal::session::{AcceptRequest, AllocationSession, Readiness, SessionContext};
use seasonal::state::{MemorySelectionStore, SelectionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    seasonal::observability::init(config.metrics_port)?;

    let json = tokio::fs::read_to_string(&config.data).await?;
    let backend = Arc::new(InMemoryBackend::from_json(&json)?);
    let snapshot = backend.snapshot().await;
    let reservation_unit_pk = config
        .reservation_unit
        .or_else(|| snapshot.reservation_units.first().map(|u| u.pk))
        .ok_or("round snapshot has no reservation units")?;
    let context = SessionContext {
        application_round_pk: snapshot.application_round_pk,
        reservation_unit_pk,
    };

    info!(
        "seasonal allocation: round {} unit {reservation_unit_pk}",
        context.application_round_pk
    );
    info!("  data: {}", config.data.display());
    info!(
        "  grid: {:02}:00-{:02}:00, {} min cells",
        config.grid.first_hour(),
        config.grid.last_hour() + 1,
        config.grid.step()
    );
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let store = Arc::new(MemorySelectionStore::new(config.selection.clone()));
    let hub = Arc::new(RefreshHub::new());
    let session = Arc::new(
        AllocationSession::new(context, backend.clone(), store.clone(), hub.clone()).with_window(config.grid),
    );
    session.restore().await;
    session.refresh().await?;

    println!("{}", session.grid().await);
    if let Some(data) = session.data().await {
        let classified = classify_all(&data.application_sections, reservation_unit_pk);
        for state in [
            SectionAllocationState::Unallocated,
            SectionAllocationState::PartiallyAllocated,
            SectionAllocationState::Allocated,
            SectionAllocationState::Declined,
        ] {
            let names: Vec<&str> = classified.get(state).iter().map(|s| s.name.as_str()).collect();
            println!("{:>20}: {}", state.as_str(), names.join(", "));
        }
    }

    match session.focused_option().await {
        Some(option) => match session.evaluate(option.pk).await {
            Readiness::Ready(ready) => {
                info!("selection {} ready for section {}", ready.window, ready.section_pk);
                match session.accept(AcceptRequest::new(option.pk)).await {
                    Ok(slot) => info!(
                        "allocated slot {}: {} {}-{}",
                        slot.pk, slot.day_of_the_week, slot.begin_time, slot.end_time
                    ),
                    Err(e) => warn!("allocation failed ({}): {e}", e.message_key()),
                }
            }
            Readiness::Blocked(blocker) => info!("selection not ready: {blocker:?}"),
        },
        None => info!("no focused section with an option on unit {reservation_unit_pk}"),
    }
    println!("selection: {}", store.read());

    if let Some(period) = config.poll_interval {
        let rx = hub.subscribe(context.application_round_pk);
        tokio::spawn(run_invalidation_listener(session.clone(), rx));
        tokio::spawn(run_poller(session.clone(), period));
        info!("watching round every {}s, ctrl-c to stop", period.as_secs());
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
    }

    Ok(())
}
