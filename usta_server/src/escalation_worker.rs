use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;
use usta_engine::{events::EventProducers, BlockApi, MarketplacePolicy, PaymentVerificationApi, SqliteDatabase};

/// Starts the escalation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each tick blocks the customers and artisans whose receipt deadlines have passed, then lifts timed blocks that have
/// run out. Escalations live in the database, so a restart picks up where the last run left off.
pub fn start_escalation_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    policy: MarketplacePolicy,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let payments = PaymentVerificationApi::new(db.clone(), producers.clone()).with_policy(policy);
        let blocks = BlockApi::new(db, producers);
        info!("🕰️ Escalation worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running escalation job");
            match payments.run_due_escalations().await {
                Ok(report) if report.is_empty() => {},
                Ok(report) => {
                    info!(
                        "🕰️ Escalations: {} blocked, {} no longer applied, {} failed",
                        report.executed.len(),
                        report.stale,
                        report.failed
                    );
                    for record in &report.executed {
                        debug!("🕰️ Blocked {}: {} ({})", record.subject(), record.reason, record.required_payment);
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running escalation job: {e}");
                },
            }
            match blocks.lift_expired_blocks().await {
                Ok(lifted) if lifted.is_empty() => {},
                Ok(lifted) => info!("🕰️ {} timed blocks expired", lifted.len()),
                Err(e) => error!("🕰️ Error lifting expired blocks: {e}"),
            }
        }
    })
}
