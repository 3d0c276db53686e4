//! Application state shared across all request handlers.

use gtop_core::config::{SharedConfig, VerificationCacheConfig};
use gtop_core::events::OrderEventSender;
use gtop_core::processors::{FulfillmentDispatcher, PollingReconciler};
use gtop_core::provider::FulfillmentProvider;
use gtop_core::repository::Repository;
use gtop_core::services::{
    AdminWalletService, CheckoutService, PaymentWebhookService, PlayerVerifier,
    ProductLinkService, WalletService,
};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    /// Runtime configuration (sections can be reloaded via SIGHUP).
    pub config: SharedConfig,
    pub dispatcher: Arc<FulfillmentDispatcher>,
    pub reconciler: Arc<PollingReconciler>,
    pub webhooks: Arc<PaymentWebhookService>,
    pub wallet: Arc<WalletService>,
    pub admin_wallet: Arc<AdminWalletService>,
    pub product_links: Arc<ProductLinkService>,
    pub checkout: Arc<CheckoutService>,
    pub verifier: Arc<PlayerVerifier>,
}

impl AppState {
    /// Wire every service over one repository and provider.
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn FulfillmentProvider>,
        config: SharedConfig,
        events: OrderEventSender,
        verification: VerificationCacheConfig,
    ) -> Self {
        let dispatcher = Arc::new(FulfillmentDispatcher::new(
            repo.clone(),
            provider.clone(),
            events,
        ));
        let reconciler = Arc::new(PollingReconciler::new(
            repo.clone(),
            provider.clone(),
            dispatcher.clone(),
            config.reconciler.clone(),
        ));

        Self {
            webhooks: Arc::new(PaymentWebhookService::new(repo.clone(), dispatcher.clone())),
            wallet: Arc::new(WalletService::new(repo.clone())),
            admin_wallet: Arc::new(AdminWalletService::new(repo.clone())),
            product_links: Arc::new(ProductLinkService::new(repo.clone())),
            checkout: Arc::new(CheckoutService::new(repo.clone())),
            verifier: Arc::new(PlayerVerifier::new(repo.clone(), provider, verification.ttl)),
            repo,
            config,
            dispatcher,
            reconciler,
        }
    }
}
