//! PollingReconciler processor.
//!
//! Periodically re-queries the provider for orders stuck in `pending` or
//! `processing` that already carry a provider order id, and applies the
//! answer through the fulfillment dispatcher. This catches every status
//! change the webhook path missed.
//!
//! Each sweep also parks `processing` orders that never received a provider
//! order id once `orphan_grace` has passed, so a dispatch whose failure
//! could not be recorded still ends up in manual review.

use crate::config::{ConfigStore, ReconcilerConfig};
use crate::processors::fulfillment::{FulfillmentDispatcher, StatusUpdate};
use crate::provider::FulfillmentProvider;
use crate::repository::Repository;
use crate::entities::OrderStatus;
use crate::utils::utc_now;
use gtop_sdk::objects::ReconcileReportResponse;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const ORPHAN_REASON: &str = "no provider order was placed";

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Orders examined.
    pub checked: u32,
    /// Orders whose lookup succeeded and whose state changed.
    pub updated: u32,
    pub completed: u32,
    pub failed: u32,
    /// Orphaned orders moved to `pending_manual`.
    pub parked: u32,
}

impl From<ReconcileReport> for ReconcileReportResponse {
    fn from(report: ReconcileReport) -> Self {
        Self {
            checked: report.checked,
            updated: report.updated,
            completed: report.completed,
            failed: report.failed,
            parked: report.parked,
        }
    }
}

pub struct PollingReconciler {
    repo: Arc<dyn Repository>,
    provider: Arc<dyn FulfillmentProvider>,
    dispatcher: Arc<FulfillmentDispatcher>,
    config: ConfigStore<ReconcilerConfig>,
}

impl PollingReconciler {
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn FulfillmentProvider>,
        dispatcher: Arc<FulfillmentDispatcher>,
        config: ConfigStore<ReconcilerConfig>,
    ) -> Self {
        Self {
            repo,
            provider,
            dispatcher,
            config,
        }
    }

    /// Run one sweep. Per-order failures are logged and skipped; only a
    /// failure to list the candidates is returned.
    #[tracing::instrument(skip_all, err, name = "ReconcilerSweep")]
    pub async fn sweep(&self) -> Result<ReconcileReport, sqlx::Error> {
        let config = self.config.snapshot().await;
        let orders = self.repo.list_stuck_orders(config.batch_size).await?;
        let mut report = ReconcileReport::default();

        for (index, order) in orders.iter().enumerate() {
            if index > 0 && !config.request_delay.is_zero() {
                tokio::time::sleep(config.request_delay).await;
            }
            report.checked += 1;

            let Some(provider_order_id) = order.provider_order_id.as_deref() else {
                continue;
            };
            let remote = match self.provider.get_order(provider_order_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(order_id = %order.id, provider_order_id, error = %e, "Provider lookup failed");
                    continue;
                }
            };

            match self.dispatcher.apply_provider_status(order, &remote).await {
                Ok(StatusUpdate::Unchanged) => {
                    debug!(order_id = %order.id, provider_status = %remote.status, "No change");
                }
                Ok(update) => {
                    report.updated += 1;
                    match update {
                        StatusUpdate::Transitioned {
                            to: OrderStatus::Completed,
                            ..
                        } => report.completed += 1,
                        StatusUpdate::Transitioned {
                            to: OrderStatus::Failed,
                            ..
                        } => report.failed += 1,
                        _ => {}
                    }
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "Failed to apply provider status");
                }
            }
        }

        report.parked = self.park_orphans(&config).await?;
        Ok(report)
    }

    async fn park_orphans(&self, config: &ReconcilerConfig) -> Result<u32, sqlx::Error> {
        let cutoff = utc_now() - config.orphan_grace;
        let orphans = self
            .repo
            .list_orphaned_orders(cutoff, config.batch_size)
            .await?;
        let mut parked = 0;
        for order in &orphans {
            match self.dispatcher.park(order, ORPHAN_REASON).await {
                Ok(Some(_)) => {
                    warn!(order_id = %order.id, "Parked processing order without provider order");
                    parked += 1;
                }
                Ok(None) => {}
                Err(e) => error!(order_id = %order.id, error = %e, "Failed to park orphaned order"),
            }
        }
        Ok(parked)
    }

    /// Sweep every `interval` until shutdown. A config reload restarts the
    /// wait with the new interval.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("PollingReconciler started");
        let mut watcher = self.config.subscribe();

        loop {
            let interval = self.config.read().await.interval;

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("PollingReconciler received shutdown signal");
                        break;
                    }
                }

                changed = watcher.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let interval_secs = self.config.read().await.interval.as_secs();
                    info!(interval_secs, "Reconciler config reloaded");
                }

                _ = tokio::time::sleep(interval) => {
                    match self.sweep().await {
                        Ok(report) => info!(
                            checked = report.checked,
                            updated = report.updated,
                            completed = report.completed,
                            failed = report.failed,
                            parked = report.parked,
                            "Reconciler sweep finished"
                        ),
                        Err(e) => error!(error = %e, "Reconciler sweep failed"),
                    }
                }
            }
        }

        info!("PollingReconciler shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::order_event_channel;
    use crate::provider::DeliveryItem;
    use crate::repository::OrderRepository;
    use crate::testing::{InMemoryRepository, ScriptedProvider, provider_order, sample_order};
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn reconciler(
        repo: Arc<InMemoryRepository>,
        provider: Arc<ScriptedProvider>,
    ) -> PollingReconciler {
        let (tx, _rx) = order_event_channel();
        let dispatcher = Arc::new(FulfillmentDispatcher::new(
            repo.clone(),
            provider.clone(),
            tx,
        ));
        PollingReconciler::new(
            repo,
            provider,
            dispatcher,
            ConfigStore::new(ReconcilerConfig {
                request_delay: Duration::ZERO,
                ..ReconcilerConfig::default()
            }),
        )
    }

    fn stuck(repo: &InMemoryRepository, status: OrderStatus, provider_id: &str) -> uuid::Uuid {
        let mut order = sample_order(status, Decimal::TEN);
        order.provider_order_id = Some(provider_id.to_string());
        repo.insert_order(order).id
    }

    #[tokio::test]
    async fn test_failed_lookup_is_skipped() {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let first = stuck(&repo, OrderStatus::Processing, "P-1");
        let second = stuck(&repo, OrderStatus::Processing, "P-2");
        let third = stuck(&repo, OrderStatus::Pending, "P-3");
        provider.on_lookup(
            "P-1",
            Ok(provider_order("P-1", "COMPLETED", vec![DeliveryItem::Code("X".into())])),
        );
        provider.on_lookup("P-2", Err("timeout".to_string()));
        provider.on_lookup("P-3", Ok(provider_order("P-3", "FAILED", vec![])));

        let report = reconciler(repo.clone(), provider.clone())
            .sweep()
            .await
            .unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                checked: 3,
                updated: 2,
                completed: 1,
                failed: 1,
                parked: 0,
            }
        );

        let status = |id| {
            let repo = repo.clone();
            async move { repo.get_order(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(first).await, OrderStatus::Completed);
        assert_eq!(status(second).await, OrderStatus::Processing);
        assert_eq!(status(third).await, OrderStatus::Failed);
        assert_eq!(provider.lookups(), vec!["P-1", "P-2", "P-3"]);
    }

    #[tokio::test]
    async fn test_batch_size_and_order_age() {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        for i in 0..5 {
            let id = format!("P-{i}");
            stuck(&repo, OrderStatus::Processing, &id);
            provider.on_lookup(&id, Ok(provider_order(&id, "PROCESSING", vec![])));
        }
        let reconciler = reconciler(repo, provider.clone());
        reconciler
            .config
            .update(ReconcilerConfig {
                batch_size: 2,
                request_delay: Duration::ZERO,
                ..ReconcilerConfig::default()
            })
            .await;

        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(provider.lookups(), vec!["P-0", "P-1"]);
    }

    #[tokio::test]
    async fn test_new_codes_on_processing_order_count_as_update() {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let id = stuck(&repo, OrderStatus::Processing, "P-9");
        provider.on_lookup(
            "P-9",
            Ok(provider_order("P-9", "PROCESSING", vec![DeliveryItem::Code("A".into())])),
        );

        let report = reconciler(repo.clone(), provider).sweep().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.completed, 0);
        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.delivery_items, Some(vec!["A".to_string()]));
    }

    #[tokio::test]
    async fn test_orphaned_processing_order_is_parked_after_grace() {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let order = repo.insert_order(sample_order(OrderStatus::Processing, Decimal::TEN));
        provider.on_create(Ok(provider_order("G-7", "PROCESSING", vec![])));

        // Storing the provider id fails, and so does the fallback park.
        repo.fail_order_writes(2);
        let (tx, _rx) = order_event_channel();
        let dispatcher = FulfillmentDispatcher::new(repo.clone(), provider.clone(), tx);
        assert!(dispatcher.dispatch_or_park(order.clone()).await.is_err());
        let stranded = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stranded.status, OrderStatus::Processing);
        assert_eq!(stranded.provider_order_id, None);

        let reconciler = reconciler(repo.clone(), provider);
        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.parked, 0);
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::Processing
        );

        repo.backdate_order(order.id, Duration::from_secs(11 * 60));
        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.parked, 1);
        assert_eq!(report.checked, 0);
        let parked = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(parked.status, OrderStatus::PendingManual);
        assert!(
            parked
                .status_message
                .unwrap()
                .contains("no provider order was placed")
        );

        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.parked, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let reconciler = Arc::new(reconciler(repo, provider));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
