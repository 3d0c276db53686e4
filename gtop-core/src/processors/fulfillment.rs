//! Fulfillment dispatcher.
//!
//! Places provider orders for paid orders and applies provider statuses to
//! the order state machine. Both the webhook path and the polling reconciler
//! go through [`FulfillmentDispatcher::apply_provider_status`], so the two
//! can never disagree about what a provider status means.

use crate::entities::OrderStatus;
use crate::entities::orders::{OrderRecord, OrderTransition};
use crate::events::{OrderEvent, OrderEventSender};
use crate::provider::{
    FulfillmentProvider, ProviderError, ProviderOrder, ProviderOrderRequest, map_provider_status,
    normalize_delivery_items,
};
use crate::repository::Repository;
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Separator between the steps recorded in an order's status message.
const MESSAGE_SEPARATOR: &str = " | ";

/// Errors that stop a dispatch. The caller parks the order in
/// `pending_manual` with the error text as reason.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("order {order_id} is {status}, expected processing")]
    NotProcessing { order_id: Uuid, status: OrderStatus },

    #[error("no provider product linked to order {0}")]
    MissingProductLink(Uuid),
}

/// What applying a provider status did to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Transitioned { from: OrderStatus, to: OrderStatus },
    /// Same status, newly reported delivery items stored.
    ItemsStored,
    Unchanged,
}

/// Result of [`FulfillmentDispatcher::dispatch_or_park`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    Dispatched(OrderRecord),
    Parked { order_id: Uuid, reason: String },
}

/// Dispatch an order that is already `processing` by id.
#[derive(Debug, Clone)]
pub struct FulfillOrder {
    pub order_id: Uuid,
}

pub struct FulfillmentDispatcher {
    repo: Arc<dyn Repository>,
    provider: Arc<dyn FulfillmentProvider>,
    events: OrderEventSender,
}

impl FulfillmentDispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn FulfillmentProvider>,
        events: OrderEventSender,
    ) -> Self {
        Self {
            repo,
            provider,
            events,
        }
    }

    /// Place the provider order for `order` and apply the status the
    /// provider answers with. Returns the order as stored afterwards.
    #[tracing::instrument(skip_all, err, fields(order_id = %order.id))]
    pub async fn dispatch(&self, order: &OrderRecord) -> Result<OrderRecord, FulfillmentError> {
        if order.status != OrderStatus::Processing {
            return Err(FulfillmentError::NotProcessing {
                order_id: order.id,
                status: order.status,
            });
        }

        let (product_id, type_id) = self.resolve_product(order).await?;
        let request = ProviderOrderRequest {
            product_id,
            type_id,
            player_id: order.player_id.clone(),
            server_id: order.server_id.clone(),
            quantity: 1,
            reference: order.id.to_string(),
        };
        let remote = self.provider.create_order(&request).await?;
        self.repo
            .set_provider_order_id(order.id, remote.order_id.clone())
            .await?;
        info!(
            provider_order_id = %remote.order_id,
            provider_status = %remote.status,
            "Provider order created"
        );

        let mut current = order.clone();
        current.provider_order_id = Some(remote.order_id.clone());
        self.apply_provider_status(&current, &remote).await?;

        Ok(self.repo.get_order(order.id).await?.unwrap_or(current))
    }

    /// Dispatch, and on any failure move the order to `pending_manual` so it
    /// is never silently dropped.
    pub async fn dispatch_or_park(
        &self,
        order: OrderRecord,
    ) -> Result<FulfillmentOutcome, sqlx::Error> {
        match self.dispatch(&order).await {
            Ok(updated) => Ok(FulfillmentOutcome::Dispatched(updated)),
            Err(e) => {
                let reason = e.to_string();
                error!(order_id = %order.id, error = %reason, "Fulfillment dispatch failed");
                self.park(&order, &reason).await?;
                Ok(FulfillmentOutcome::Parked {
                    order_id: order.id,
                    reason,
                })
            }
        }
    }

    /// `processing -> pending_manual` with `reason` appended to the message.
    pub async fn park(
        &self,
        order: &OrderRecord,
        reason: &str,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let transition = OrderTransition {
            order_id: order.id,
            from: OrderStatus::Processing,
            to: OrderStatus::PendingManual,
            status_message: chain_message(
                order.status_message.as_deref(),
                &format!("Fulfillment failed: {reason}"),
            ),
            delivery_items: None,
        };
        let parked = self.transition(transition).await?;
        if parked.is_none() {
            warn!(order_id = %order.id, status = %order.status, "Order could not be parked, status changed");
        }
        Ok(parked)
    }

    /// Apply the provider's view of an order to our record.
    ///
    /// Unknown provider statuses leave the order untouched. A `pending` or
    /// `paid` order whose provider status is terminal is first moved to
    /// `processing`, so every write is a legal state machine edge.
    pub async fn apply_provider_status(
        &self,
        order: &OrderRecord,
        remote: &ProviderOrder,
    ) -> Result<StatusUpdate, sqlx::Error> {
        let Some(target) = map_provider_status(&remote.status) else {
            warn!(
                order_id = %order.id,
                provider_status = %remote.status,
                "Unknown provider status, leaving order unchanged"
            );
            return Ok(StatusUpdate::Unchanged);
        };
        if order.status.is_terminal() {
            return Ok(StatusUpdate::Unchanged);
        }

        let items = normalize_delivery_items(&remote.delivery_items);
        let new_items =
            (!items.is_empty() && order.delivery_items.as_ref() != Some(&items)).then_some(items);

        if target == order.status {
            return match new_items {
                Some(items) => {
                    self.repo.store_delivery_items(order.id, items).await?;
                    Ok(StatusUpdate::ItemsStored)
                }
                None => Ok(StatusUpdate::Unchanged),
            };
        }

        let mut current = order.status;
        let mut message = order.status_message.clone();
        if target.is_terminal() && current != OrderStatus::Processing {
            let step = OrderTransition {
                order_id: order.id,
                from: current,
                to: OrderStatus::Processing,
                status_message: chain_message(
                    message.as_deref(),
                    &format!("Provider order {} is {}", remote.order_id, remote.status),
                ),
                delivery_items: None,
            };
            let Some(stepped) = self.transition(step).await? else {
                return Ok(StatusUpdate::Unchanged);
            };
            current = stepped.status;
            message = stepped.status_message;
        }

        if !current.can_transition_to(target) {
            warn!(order_id = %order.id, from = %current, to = %target, "Ignoring illegal transition");
            return Ok(StatusUpdate::Unchanged);
        }

        let text = match target {
            OrderStatus::Completed => match &new_items {
                Some(items) => format!(
                    "Delivered {} item(s) via provider order {}",
                    items.len(),
                    remote.order_id
                ),
                None => format!("Completed by provider order {}", remote.order_id),
            },
            OrderStatus::Failed => format!(
                "Provider order {} failed: {}",
                remote.order_id,
                remote.message.as_deref().unwrap_or("no reason given")
            ),
            _ => format!("Provider order {} is {}", remote.order_id, remote.status),
        };
        let transition = OrderTransition {
            order_id: order.id,
            from: current,
            to: target,
            status_message: chain_message(message.as_deref(), &text),
            delivery_items: new_items,
        };

        Ok(match self.transition(transition).await? {
            Some(_) => StatusUpdate::Transitioned {
                from: order.status,
                to: target,
            },
            None => StatusUpdate::Unchanged,
        })
    }

    async fn resolve_product(
        &self,
        order: &OrderRecord,
    ) -> Result<(String, String), FulfillmentError> {
        if let (Some(product), Some(kind)) = (&order.provider_product_id, &order.provider_type_id) {
            return Ok((product.clone(), kind.clone()));
        }
        let Some(package_id) = order.package_id else {
            return Err(FulfillmentError::MissingProductLink(order.id));
        };
        self.repo
            .get_product_link(package_id)
            .await?
            .map(|link| (link.provider_product_id, link.provider_type_id))
            .ok_or(FulfillmentError::MissingProductLink(order.id))
    }

    /// Apply one edge; wakes the notification sender on terminal targets.
    async fn transition(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let (order_id, from, to) = (transition.order_id, transition.from, transition.to);
        let updated = self.repo.transition_order(transition).await?;
        match &updated {
            Some(order) => {
                info!(order_id = %order_id, from = %from, to = %to, "Order status changed");
                if order.status.is_terminal() {
                    self.notify(order_id, order.status);
                }
            }
            None => debug!(order_id = %order_id, from = %from, to = %to, "Transition lost, order changed concurrently"),
        }
        Ok(updated)
    }

    fn notify(&self, order_id: Uuid, status: OrderStatus) {
        match self
            .events
            .try_send(OrderEvent::NotificationQueued { order_id, status })
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(order_id = %order_id, "Event channel full, sender will pick the row up on its sweep");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(order_id = %order_id, "Event channel closed");
            }
        }
    }
}

impl Processor<FulfillOrder> for FulfillmentDispatcher {
    type Output = FulfillmentOutcome;
    type Error = FulfillmentError;
    #[tracing::instrument(skip_all, err, name = "FulfillOrder", fields(order_id = %query.order_id))]
    async fn process(&self, query: FulfillOrder) -> Result<FulfillmentOutcome, FulfillmentError> {
        let order = self
            .repo
            .get_order(query.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(query.order_id))?;
        if order.status != OrderStatus::Processing {
            return Err(FulfillmentError::NotProcessing {
                order_id: order.id,
                status: order.status,
            });
        }
        Ok(self.dispatch_or_park(order).await?)
    }
}

/// Append a step to a status message.
pub fn chain_message(previous: Option<&str>, next: &str) -> String {
    match previous.map(str::trim).filter(|p| !p.is_empty()) {
        Some(previous) => format!("{previous}{MESSAGE_SEPARATOR}{next}"),
        None => next.to_string(),
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

    fn setup() -> (
        Arc<InMemoryRepository>,
        Arc<ScriptedProvider>,
        FulfillmentDispatcher,
        crate::events::OrderEventReceiver,
    ) {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let (tx, rx) = order_event_channel();
        let dispatcher = FulfillmentDispatcher::new(repo.clone(), provider.clone(), tx);
        (repo, provider, dispatcher, rx)
    }

    #[test]
    fn test_chain_message() {
        assert_eq!(chain_message(None, "a"), "a");
        assert_eq!(chain_message(Some("  "), "a"), "a");
        assert_eq!(chain_message(Some("a"), "b"), "a | b");
    }

    #[tokio::test]
    async fn test_dispatch_completes_and_stores_codes() {
        let (repo, provider, dispatcher, mut rx) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Processing, Decimal::new(500, 2)));
        provider.on_create(Ok(provider_order(
            "G-1",
            "COMPLETED",
            vec![
                DeliveryItem::Code("CODE-1".to_string()),
                DeliveryItem::Code(" CODE-1 ".to_string()),
            ],
        )));

        let updated = dispatcher.dispatch(&order).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert_eq!(updated.provider_order_id.as_deref(), Some("G-1"));
        assert_eq!(updated.delivery_items, Some(vec!["CODE-1".to_string()]));
        assert_eq!(repo.outbox().len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            OrderEvent::NotificationQueued {
                order_id: order.id,
                status: OrderStatus::Completed
            }
        );

        let sent = provider.created_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reference, order.id.to_string());
        assert_eq!(sent[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_provider_rejection_parks_order() {
        let (repo, provider, dispatcher, _rx) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Processing, Decimal::ONE_HUNDRED));
        provider.on_create(Err("out of stock".to_string()));

        let outcome = dispatcher.dispatch_or_park(order.clone()).await.unwrap();
        assert!(matches!(outcome, FulfillmentOutcome::Parked { .. }));

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::PendingManual);
        assert!(stored.status_message.unwrap().contains("out of stock"));
        assert_eq!(repo.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_product_link_parks_order() {
        let (repo, _provider, dispatcher, _rx) = setup();
        let mut order = sample_order(OrderStatus::Processing, Decimal::ONE);
        order.provider_product_id = None;
        order.provider_type_id = None;
        order.package_id = None;
        let order = repo.insert_order(order);

        let outcome = dispatcher.dispatch_or_park(order.clone()).await.unwrap();
        let FulfillmentOutcome::Parked { reason, .. } = outcome else {
            panic!("expected the order to be parked");
        };
        assert!(reason.contains("no provider product"));
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::PendingManual
        );
    }

    #[tokio::test]
    async fn test_pending_order_steps_through_processing() {
        let (repo, _provider, dispatcher, _rx) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Pending, Decimal::ONE));
        let remote = provider_order("G-2", "failed", vec![]);

        let update = dispatcher.apply_provider_status(&order, &remote).await.unwrap();
        assert_eq!(
            update,
            StatusUpdate::Transitioned {
                from: OrderStatus::Pending,
                to: OrderStatus::Failed
            }
        );
        assert_eq!(
            repo.transitions(order.id),
            vec![
                (OrderStatus::Pending, OrderStatus::Processing),
                (OrderStatus::Processing, OrderStatus::Failed)
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_status_leaves_order_alone() {
        let (repo, _provider, dispatcher, _rx) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Processing, Decimal::ONE));
        let remote = provider_order("G-3", "ON_HOLD", vec![]);

        let update = dispatcher.apply_provider_status(&order, &remote).await.unwrap();
        assert_eq!(update, StatusUpdate::Unchanged);
        assert!(repo.transitions(order.id).is_empty());
    }

    #[tokio::test]
    async fn test_fulfill_processor_requires_processing() {
        let (repo, _provider, dispatcher, _rx) = setup();
        let order = repo.insert_order(sample_order(OrderStatus::Completed, Decimal::ONE));

        let result = dispatcher.process(FulfillOrder { order_id: order.id }).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::NotProcessing {
                status: OrderStatus::Completed,
                ..
            })
        ));
    }
}
