//! Scheduled dispatch engine — background loop delivering due items.
//!
//! Every tick the loop renders "now" in the due-time wire format, fetches
//! pending items ascending by due time, and delivers every item whose due
//! time has passed (lexical comparison, valid for the fixed-width format).
//! Deliveries within a round run with bounded concurrency and a per-item
//! timeout, so one unreachable destination cannot stall the round.
//!
//! Each item's terminal status is claimed through the repository's
//! conditional transition. A lost claim means the item was already handled
//! and is skipped, which keeps delivery bookkeeping at-most-once even if
//! rounds were ever to overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PostbeamConfig;
use crate::delivery::{DeliveryAdapter, DeliveryContent, Notifier};
use crate::error::{DatabaseError, DeliveryError};
use crate::model::{DueTime, EventKind, ScheduleStatus, ScheduledItem};
use crate::store::Repository;

/// What happened to one due item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Sent,
    Failed,
    /// Claim lost; another round already settled the item.
    Skipped,
}

/// Counters for one dispatch round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundStats {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Dispatcher {
    repo: Arc<dyn Repository>,
    adapter: Arc<dyn DeliveryAdapter>,
    notifier: Arc<dyn Notifier>,
    config: PostbeamConfig,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        adapter: Arc<dyn DeliveryAdapter>,
        notifier: Arc<dyn Notifier>,
        config: PostbeamConfig,
    ) -> Self {
        Self {
            repo,
            adapter,
            notifier,
            config,
        }
    }

    /// Spawn the poll loop.
    ///
    /// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop after
    /// the current round; an in-flight round always finishes its per-item
    /// status updates.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            info!(
                "Dispatch loop started — polling every {}s",
                self.config.poll_interval.as_secs()
            );

            let mut tick = tokio::time::interval(self.config.poll_interval);

            loop {
                tick.tick().await;

                if shutdown.load(Ordering::Relaxed) {
                    info!("Dispatch loop shutting down");
                    return;
                }

                // A bad round must not kill the loop.
                let now = DueTime::now_utc();
                match self.run_round(&now).await {
                    Ok(stats) if stats.due > 0 => {
                        info!(
                            due = stats.due,
                            sent = stats.sent,
                            failed = stats.failed,
                            skipped = stats.skipped,
                            "Dispatch round finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("Dispatch round failed: {e}"),
                }
            }
        });

        (handle, shutdown_flag)
    }

    /// Run one dispatch round against the given "now".
    ///
    /// Items are taken in ascending due order; delivery futures start in that
    /// order even when they overlap.
    pub async fn run_round(&self, now: &DueTime) -> Result<RoundStats, DatabaseError> {
        let pending = self.repo.list_pending_scheduled().await?;
        let due_items: Vec<ScheduledItem> = pending
            .into_iter()
            .filter(|item| item.due_at.is_due(now))
            .collect();

        let mut stats = RoundStats {
            due: due_items.len(),
            ..RoundStats::default()
        };
        if due_items.is_empty() {
            return Ok(stats);
        }
        debug!(due = due_items.len(), now = %now, "Dispatching due items");

        // Futures are built up front, in due order, before the stream drives
        // them; `buffered` then also starts them in that order.
        let concurrency = self.config.max_concurrent_deliveries.max(1);
        let deliveries: Vec<_> = due_items
            .iter()
            .map(|item| self.dispatch_item(item))
            .collect();
        let outcomes: Vec<_> = futures::stream::iter(deliveries)
            .buffered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(ItemOutcome::Sent) => stats.sent += 1,
                Ok(ItemOutcome::Failed) => stats.failed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    // Bookkeeping error for one item; the rest of the round
                    // has already proceeded independently.
                    error!("Dispatch bookkeeping failed: {e}");
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn dispatch_item(&self, item: &ScheduledItem) -> Result<ItemOutcome, DatabaseError> {
        let content = DeliveryContent::from_scheduled(item);

        let delivery = tokio::time::timeout(
            self.config.delivery_timeout,
            self.adapter.deliver(&item.destination_id, &content),
        )
        .await
        .unwrap_or(Err(DeliveryError::Timeout {
            destination: item.destination_id.clone(),
            timeout: self.config.delivery_timeout,
        }));

        match delivery {
            Ok(()) => {
                if !self
                    .repo
                    .transition_scheduled(item.id, ScheduleStatus::Sent)
                    .await?
                {
                    warn!(item_id = item.id, "Item already settled, skipping");
                    return Ok(ItemOutcome::Skipped);
                }

                self.repo
                    .log_event(
                        item.owner_id,
                        EventKind::ScheduledSent,
                        &format!("Scheduled post delivered to {}", item.destination_name),
                        Some(&item.destination_id),
                        item.post_id,
                    )
                    .await?;
                info!(
                    item_id = item.id,
                    destination_id = %item.destination_id,
                    "Scheduled item sent"
                );

                self.notify(
                    item.owner_id,
                    &format!(
                        "Your scheduled post was delivered to {}.",
                        item.destination_name
                    ),
                )
                .await;
                Ok(ItemOutcome::Sent)
            }

            Err(e) => {
                if !self
                    .repo
                    .transition_scheduled(item.id, ScheduleStatus::Failed)
                    .await?
                {
                    warn!(item_id = item.id, "Item already settled, skipping");
                    return Ok(ItemOutcome::Skipped);
                }

                self.repo
                    .log_event(
                        item.owner_id,
                        EventKind::ScheduledFailed,
                        &format!(
                            "Scheduled post to {} failed: {e}",
                            item.destination_name
                        ),
                        Some(&item.destination_id),
                        item.post_id,
                    )
                    .await?;
                warn!(
                    item_id = item.id,
                    destination_id = %item.destination_id,
                    "Scheduled item failed: {e}"
                );

                self.notify(
                    item.owner_id,
                    &format!(
                        "Your scheduled post to {} failed: {e}",
                        item.destination_name
                    ),
                )
                .await;
                Ok(ItemOutcome::Failed)
            }
        }
    }

    /// Best-effort owner notification, gated by the user's settings. The
    /// item is already settled by the time this runs, so nothing here may
    /// affect the outcome.
    async fn notify(&self, owner_id: i64, text: &str) {
        match self.repo.get_settings(owner_id).await {
            Ok(settings) if settings.notifications_enabled => {
                self.notifier.notify_owner(owner_id, text).await;
            }
            Ok(_) => {}
            Err(e) => warn!(owner_id, "Could not read notification settings: {e}"),
        }
    }
}
