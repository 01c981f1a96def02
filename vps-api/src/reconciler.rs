use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use vps_orchestrator::{ReconcileReport, VpsOrchestrator};

pub async fn start_reconciler_task(orchestrator: VpsOrchestrator, interval_secs: u64) {
    let mut interval = interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Reconciler task running (checks every {} seconds)",
        interval_secs
    );

    loop {
        interval.tick().await;

        if let Err(e) = reconcile_records(&orchestrator).await {
            error!("Reconciliation failed: {}", e);
        }
    }
}

/// One sweep over all records.
pub async fn reconcile_records(orchestrator: &VpsOrchestrator) -> anyhow::Result<ReconcileReport> {
    let report = orchestrator.reconcile_all().await?;

    if report.updated > 0 || report.failed > 0 {
        info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failed,
            "Reconciliation finished"
        );
    } else {
        debug!(checked = report.checked, "All records in sync");
    }

    Ok(report)
}
