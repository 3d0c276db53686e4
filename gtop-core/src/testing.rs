//! In-memory fakes for tests: a [`Repository`] with the same observable
//! semantics as the Postgres one, a scripted [`FulfillmentProvider`], and a
//! recording [`Notifier`].
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! downstream crates' tests.

use crate::entities::notification_outbox::OutboxEntry;
use crate::entities::orders::{ClaimOrderForProcessing, NewOrder, OrderRecord, OrderTransition};
use crate::entities::packages::Package;
use crate::entities::product_links::{ProductLink, UpsertProductLink};
use crate::entities::users::SessionUser;
use crate::entities::verification_configs::VerificationConfig;
use crate::entities::wallet_transactions::{NewWalletEntry, UserBalance, WalletTransaction};
use crate::entities::OrderStatus;
use crate::processors::notification_sender::{Notifier, NotifyError};
use crate::provider::{
    DeliveryItem, FulfillmentProvider, PlayerCheck, PlayerCheckRequest, ProviderError,
    ProviderOrder, ProviderOrderRequest,
};
use crate::repository::{
    AccountRepository, CatalogRepository, OrderPurchase, OrderRepository, OutboxRepository,
    PurchaseOutcome, WalletEntryOutcome, WalletRepository, check_purchase,
};
use crate::utils::utc_now;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// An order with provider ids set and no owner, for tests.
pub fn sample_order(status: OrderStatus, amount: Decimal) -> OrderRecord {
    let now = utc_now();
    OrderRecord {
        id: Uuid::new_v4(),
        user_id: None,
        package_id: None,
        game_name: "Mobile Legends".to_string(),
        package_name: "86 Diamonds".to_string(),
        player_id: "12345678".to_string(),
        server_id: Some("2001".to_string()),
        amount,
        currency: "USD".to_string(),
        payment_method: None,
        provider_order_id: None,
        provider_product_id: Some("P-86".to_string()),
        provider_type_id: Some("T-1".to_string()),
        delivery_items: None,
        status,
        status_message: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn provider_order(order_id: &str, status: &str, delivery_items: Vec<DeliveryItem>) -> ProviderOrder {
    ProviderOrder {
        order_id: order_id.to_string(),
        status: status.to_string(),
        delivery_items,
        message: None,
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    id: Uuid,
    email: Option<String>,
    created_at: time::PrimitiveDateTime,
}

#[derive(Default)]
struct State {
    users: Vec<StoredUser>,
    sessions: HashMap<Vec<u8>, SessionUser>,
    /// Insertion order doubles as creation order.
    orders: Vec<OrderRecord>,
    transitions: Vec<(Uuid, OrderStatus, OrderStatus)>,
    ledger: Vec<WalletTransaction>,
    packages: HashMap<Uuid, Package>,
    links: Vec<ProductLink>,
    verification_configs: HashMap<String, VerificationConfig>,
    verification_config_reads: usize,
    outbox: Vec<OutboxEntry>,
    fail_next_paid_update: bool,
    failing_order_writes: usize,
}

impl State {
    /// Consume one injected order write failure, if any are left.
    fn take_write_failure(&mut self) -> Result<(), sqlx::Error> {
        if self.failing_order_writes == 0 {
            return Ok(());
        }
        self.failing_order_writes -= 1;
        Err(sqlx::Error::PoolTimedOut)
    }

    fn order_mut(&mut self, order_id: Uuid) -> Option<&mut OrderRecord> {
        self.orders.iter_mut().find(|o| o.id == order_id)
    }

    fn balance(&self, user_id: Uuid) -> Decimal {
        self.ledger
            .iter()
            .rev()
            .find(|row| row.user_id == user_id)
            .map(|row| row.balance_after)
            .unwrap_or(Decimal::ZERO)
    }

    fn reference_taken(&self, reference_id: Option<&str>) -> bool {
        reference_id.is_some_and(|r| {
            self.ledger
                .iter()
                .any(|row| row.reference_id.as_deref() == Some(r))
        })
    }

    fn push_ledger_row(&mut self, entry: &NewWalletEntry, balance_before: Decimal) -> Option<WalletTransaction> {
        let draft = entry.draft(balance_before)?;
        let row = WalletTransaction {
            id: self.ledger.len() as i64 + 1,
            user_id: draft.user_id,
            entry_type: draft.entry_type,
            amount: draft.amount,
            balance_before: draft.balance_before,
            balance_after: draft.balance_after,
            order_id: draft.order_id,
            reference_id: draft.reference_id,
            description: draft.description,
            created_at: utc_now(),
        };
        self.ledger.push(row.clone());
        Some(row)
    }
}

/// In-memory stand-in for the Postgres repository.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).users.push(StoredUser {
            id,
            email: Some(email.to_string()),
            created_at: utc_now(),
        });
        id
    }

    pub fn add_user_with_id(&self, id: Uuid) -> Uuid {
        lock(&self.state).users.push(StoredUser {
            id,
            email: None,
            created_at: utc_now(),
        });
        id
    }

    /// Register a session for the raw bearer `token`.
    pub fn add_session(&self, token: &str, user_id: Uuid, is_admin: bool) {
        let mut state = lock(&self.state);
        let email = state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .and_then(|u| u.email.clone());
        state.sessions.insert(
            gtop_sdk::auth::hash_session_token(token),
            SessionUser {
                user_id,
                email,
                is_admin,
            },
        );
    }

    pub fn add_package(&self, game_name: &str, name: &str, price: Decimal) -> Uuid {
        let package = Package {
            id: Uuid::new_v4(),
            game_name: game_name.to_string(),
            name: name.to_string(),
            price,
            currency: "USD".to_string(),
            active: true,
        };
        let id = package.id;
        lock(&self.state).packages.insert(id, package);
        id
    }

    pub fn add_verification_config(&self, config: VerificationConfig) {
        lock(&self.state)
            .verification_configs
            .insert(config.game_name.to_lowercase(), config);
    }

    /// How many times a verification config was read from storage.
    pub fn verification_config_reads(&self) -> usize {
        lock(&self.state).verification_config_reads
    }

    pub fn insert_order(&self, order: OrderRecord) -> OrderRecord {
        lock(&self.state).orders.push(order.clone());
        order
    }

    /// Status edges applied to `order_id`, in order.
    pub fn transitions(&self, order_id: Uuid) -> Vec<(OrderStatus, OrderStatus)> {
        lock(&self.state)
            .transitions
            .iter()
            .filter(|(id, _, _)| *id == order_id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn outbox(&self) -> Vec<OutboxEntry> {
        lock(&self.state).outbox.clone()
    }

    pub fn ledger(&self, user_id: Uuid) -> Vec<WalletTransaction> {
        lock(&self.state)
            .ledger
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn all_ledger_rows(&self) -> Vec<WalletTransaction> {
        lock(&self.state).ledger.clone()
    }

    /// Make the next wallet purchase's `pending -> paid` update touch no row.
    pub fn fail_next_paid_update(&self) {
        lock(&self.state).fail_next_paid_update = true;
    }

    /// Make the next `count` provider id writes or status transitions fail
    /// with a storage error.
    pub fn fail_order_writes(&self, count: usize) {
        lock(&self.state).failing_order_writes = count;
    }

    /// Pretend `order_id` was last touched `age` ago.
    pub fn backdate_order(&self, order_id: Uuid, age: std::time::Duration) {
        if let Some(order) = lock(&self.state).order_mut(order_id) {
            order.updated_at = utc_now() - age;
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepository {
    async fn create_order(&self, order: NewOrder) -> Result<OrderRecord, sqlx::Error> {
        let now = utc_now();
        let record = OrderRecord {
            id: Uuid::now_v7(),
            user_id: order.user_id,
            package_id: order.package_id,
            game_name: order.game_name,
            package_name: order.package_name,
            player_id: order.player_id,
            server_id: order.server_id,
            amount: order.amount,
            currency: order.currency,
            payment_method: order.payment_method,
            provider_order_id: None,
            provider_product_id: order.provider_product_id,
            provider_type_id: order.provider_type_id,
            delivery_items: None,
            status: OrderStatus::Pending,
            status_message: None,
            created_at: now,
            updated_at: now,
        };
        lock(&self.state).orders.push(record.clone());
        Ok(record)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, sqlx::Error> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn claim_order(
        &self,
        claim: ClaimOrderForProcessing,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let mut state = lock(&self.state);
        let Some(order) = state.order_mut(claim.order_id) else {
            return Ok(None);
        };
        if !order.status.is_claimable() {
            return Ok(None);
        }
        let from = order.status;
        order.status = OrderStatus::Processing;
        order.payment_method = Some(claim.payment_method);
        order.status_message = Some(claim.status_message);
        order.updated_at = utc_now();
        let claimed = order.clone();
        state
            .transitions
            .push((claim.order_id, from, OrderStatus::Processing));
        Ok(Some(claimed))
    }

    async fn transition_order(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        if !transition.from.can_transition_to(transition.to) {
            return Err(sqlx::Error::Protocol(format!(
                "illegal transition {} -> {}",
                transition.from, transition.to
            )));
        }
        let mut state = lock(&self.state);
        state.take_write_failure()?;
        let Some(order) = state.order_mut(transition.order_id) else {
            return Ok(None);
        };
        if order.status != transition.from {
            return Ok(None);
        }
        order.status = transition.to;
        order.status_message = Some(transition.status_message);
        if let Some(items) = transition.delivery_items {
            order.delivery_items = Some(items);
        }
        order.updated_at = utc_now();
        let updated = order.clone();

        state
            .transitions
            .push((updated.id, transition.from, transition.to));
        if updated.status.is_terminal() {
            let now = utc_now();
            let id = state.outbox.len() as i64 + 1;
            state.outbox.push(OutboxEntry {
                id,
                order_id: updated.id,
                message: updated.notification_text(),
                attempts: 0,
                next_attempt_at: now,
                delivered_at: None,
                last_error: None,
                created_at: now,
            });
        }
        Ok(Some(updated))
    }

    async fn set_provider_order_id(
        &self,
        order_id: Uuid,
        provider_order_id: String,
    ) -> Result<(), sqlx::Error> {
        let mut state = lock(&self.state);
        state.take_write_failure()?;
        if let Some(order) = state.order_mut(order_id) {
            order.provider_order_id = Some(provider_order_id);
        }
        Ok(())
    }

    async fn store_delivery_items(
        &self,
        order_id: Uuid,
        delivery_items: Vec<String>,
    ) -> Result<(), sqlx::Error> {
        if let Some(order) = lock(&self.state).order_mut(order_id) {
            order.delivery_items = Some(delivery_items);
        }
        Ok(())
    }

    async fn list_stuck_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, sqlx::Error> {
        Ok(lock(&self.state)
            .orders
            .iter()
            .filter(|o| {
                matches!(o.status, OrderStatus::Pending | OrderStatus::Processing)
                    && o.provider_order_id.is_some()
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_orphaned_orders(
        &self,
        updated_before: time::PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, sqlx::Error> {
        let mut orphans: Vec<OrderRecord> = lock(&self.state)
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Processing
                    && o.provider_order_id.is_none()
                    && o.updated_at < updated_before
            })
            .cloned()
            .collect();
        orphans.sort_by_key(|o| o.updated_at);
        orphans.truncate(limit.max(0) as usize);
        Ok(orphans)
    }
}

#[async_trait]
impl WalletRepository for InMemoryRepository {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, sqlx::Error> {
        Ok(lock(&self.state).balance(user_id))
    }

    async fn append_entry(
        &self,
        entry: NewWalletEntry,
    ) -> Result<WalletEntryOutcome, sqlx::Error> {
        let mut state = lock(&self.state);
        let balance = state.balance(entry.user_id);
        if state.reference_taken(entry.reference_id.as_deref()) {
            return Ok(WalletEntryOutcome::Duplicate { balance });
        }
        Ok(match state.push_ledger_row(&entry, balance) {
            Some(row) => WalletEntryOutcome::Applied(row),
            None => WalletEntryOutcome::InsufficientBalance { balance },
        })
    }

    async fn purchase_order(
        &self,
        purchase: OrderPurchase,
    ) -> Result<PurchaseOutcome, sqlx::Error> {
        let mut state = lock(&self.state);
        let balance = state.balance(purchase.user_id);
        let order = state
            .orders
            .iter()
            .find(|o| o.id == purchase.order_id)
            .cloned();
        let entry = match check_purchase(&purchase, order.as_ref(), balance) {
            Ok(entry) => entry,
            Err(outcome) => return Ok(outcome),
        };
        if state.reference_taken(entry.reference_id.as_deref()) {
            return Ok(PurchaseOutcome::OrderUpdateFailed);
        }
        if std::mem::take(&mut state.fail_next_paid_update) {
            return Ok(PurchaseOutcome::OrderUpdateFailed);
        }
        if entry.draft(balance).is_none() {
            return Ok(PurchaseOutcome::InsufficientBalance { balance });
        }

        if let Some(order) = state.order_mut(purchase.order_id) {
            order.status = OrderStatus::Paid;
            order.payment_method = Some("wallet".to_string());
            order.status_message = Some("Paid from wallet balance".to_string());
            order.updated_at = utc_now();
        }
        state
            .transitions
            .push((purchase.order_id, OrderStatus::Pending, OrderStatus::Paid));
        match state.push_ledger_row(&entry, balance) {
            Some(row) => Ok(PurchaseOutcome::Paid(row)),
            None => Ok(PurchaseOutcome::InsufficientBalance { balance }),
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn find_session(&self, token_hash: Vec<u8>) -> Result<Option<SessionUser>, sqlx::Error> {
        Ok(lock(&self.state).sessions.get(&token_hash).cloned())
    }

    async fn find_users_by_id_prefix(&self, prefix: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        let prefix = prefix.to_lowercase();
        Ok(lock(&self.state)
            .users
            .iter()
            .filter(|u| u.id.to_string().starts_with(&prefix))
            .map(|u| u.id)
            .take(2)
            .collect())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(lock(&self.state).users.iter().any(|u| u.id == user_id))
    }

    async fn list_user_balances(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserBalance>, sqlx::Error> {
        let state = lock(&self.state);
        Ok(state
            .users
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|u| UserBalance {
                user_id: u.id,
                email: u.email.clone(),
                balance: state.balance(u.id),
                created_at: u.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn get_package(&self, package_id: Uuid) -> Result<Option<Package>, sqlx::Error> {
        Ok(lock(&self.state).packages.get(&package_id).cloned())
    }

    async fn get_product_link(
        &self,
        package_id: Uuid,
    ) -> Result<Option<ProductLink>, sqlx::Error> {
        Ok(lock(&self.state)
            .links
            .iter()
            .find(|l| l.package_id == package_id)
            .cloned())
    }

    async fn upsert_product_link(
        &self,
        link: UpsertProductLink,
    ) -> Result<ProductLink, sqlx::Error> {
        let mut state = lock(&self.state);
        let stored = ProductLink {
            package_id: link.package_id,
            provider_product_id: link.provider_product_id,
            provider_type_id: link.provider_type_id,
            created_at: utc_now(),
        };
        match state.links.iter_mut().find(|l| l.package_id == link.package_id) {
            Some(existing) => {
                existing.provider_product_id = stored.provider_product_id.clone();
                existing.provider_type_id = stored.provider_type_id.clone();
                Ok(existing.clone())
            }
            None => {
                state.links.push(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn list_product_links(&self) -> Result<Vec<ProductLink>, sqlx::Error> {
        Ok(lock(&self.state).links.iter().rev().cloned().collect())
    }

    async fn get_verification_config(
        &self,
        game_name: &str,
    ) -> Result<Option<VerificationConfig>, sqlx::Error> {
        let mut state = lock(&self.state);
        state.verification_config_reads += 1;
        Ok(state
            .verification_configs
            .get(&game_name.to_lowercase())
            .cloned())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryRepository {
    async fn due_notifications(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, sqlx::Error> {
        let now = utc_now();
        Ok(lock(&self.state)
            .outbox
            .iter()
            .filter(|e| {
                e.delivered_at.is_none() && e.attempts < max_attempts && e.next_attempt_at <= now
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_notification_delivered(&self, id: i64) -> Result<(), sqlx::Error> {
        if let Some(entry) = lock(&self.state).outbox.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.delivered_at = Some(utc_now());
        }
        Ok(())
    }

    async fn reschedule_notification(
        &self,
        id: i64,
        delay_secs: i64,
        error: String,
    ) -> Result<(), sqlx::Error> {
        if let Some(entry) = lock(&self.state).outbox.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.last_error = Some(error);
            entry.next_attempt_at = utc_now() + time::Duration::seconds(delay_secs);
        }
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    creates: VecDeque<Result<ProviderOrder, String>>,
    lookups: HashMap<String, Result<ProviderOrder, String>>,
    player_checks: HashMap<String, PlayerCheck>,
    created: Vec<ProviderOrderRequest>,
    looked_up: Vec<String>,
    checked: Vec<String>,
}

/// Provider fake answering from scripted responses. Unscripted calls fail
/// with a rejection.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next `create_order`. `Err` becomes a
    /// provider rejection with that message.
    pub fn on_create(&self, response: Result<ProviderOrder, String>) {
        lock(&self.script).creates.push_back(response);
    }

    pub fn on_lookup(&self, provider_order_id: &str, response: Result<ProviderOrder, String>) {
        lock(&self.script)
            .lookups
            .insert(provider_order_id.to_string(), response);
    }

    pub fn on_check_player(&self, game_code: &str, check: PlayerCheck) {
        lock(&self.script)
            .player_checks
            .insert(game_code.to_string(), check);
    }

    pub fn created_requests(&self) -> Vec<ProviderOrderRequest> {
        lock(&self.script).created.clone()
    }

    pub fn lookups(&self) -> Vec<String> {
        lock(&self.script).looked_up.clone()
    }

    pub fn player_checks(&self) -> Vec<String> {
        lock(&self.script).checked.clone()
    }
}

fn rejected(message: impl Into<String>) -> ProviderError {
    ProviderError::Rejected {
        message: message.into(),
    }
}

#[async_trait]
impl FulfillmentProvider for ScriptedProvider {
    async fn create_order(
        &self,
        request: &ProviderOrderRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        let mut script = lock(&self.script);
        script.created.push(request.clone());
        match script.creates.pop_front() {
            Some(response) => response.map_err(rejected),
            None => Err(rejected("no scripted create response")),
        }
    }

    async fn get_order(&self, provider_order_id: &str) -> Result<ProviderOrder, ProviderError> {
        let mut script = lock(&self.script);
        script.looked_up.push(provider_order_id.to_string());
        match script.lookups.get(provider_order_id) {
            Some(response) => response.clone().map_err(rejected),
            None => Err(rejected("no scripted lookup response")),
        }
    }

    async fn check_player(
        &self,
        request: &PlayerCheckRequest,
    ) -> Result<PlayerCheck, ProviderError> {
        let mut script = lock(&self.script);
        script.checked.push(request.game_code.clone());
        script
            .player_checks
            .get(&request.game_code)
            .cloned()
            .ok_or_else(|| rejected("no scripted player check"))
    }
}

/// Notifier fake that records every alert text.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Rejected {
                status: 502,
                description: "chat channel unavailable".to_string(),
            });
        }
        lock(&self.sent).push(text.to_string());
        Ok(())
    }
}
