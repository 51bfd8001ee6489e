/// Interfaces to the systems the workflows coordinate with, plus in-memory
/// implementations used by tests and by the operator binary.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::WorkflowError;
use crate::state::{DomainOrder, DomainRecord, OrderRequest, OrderState};

/// Identifiers handed back by billing for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingOrder {
    pub order_id: String,
    pub invoice_id: String,
}

#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_order(&self, customer_id: &str, request: &OrderRequest) -> Result<BillingOrder, WorkflowError>;

    /// Returns the invoice id.
    async fn create_renewal_invoice(&self, domain: &DomainRecord, years: u32) -> Result<String, WorkflowError>;

    async fn is_order_active(&self, order_id: &str) -> Result<bool, WorkflowError>;
}

#[async_trait]
pub trait ProvisioningGateway: Send + Sync {
    async fn activate(&self, order: &DomainOrder) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: DomainOrder) -> Result<(), WorkflowError>;

    async fn get(&self, order_id: &str) -> Result<Option<DomainOrder>, WorkflowError>;

    /// Move the order from `expected` to `next` atomically. Fails with
    /// `StateConflict` when the stored state is not `expected` or the move
    /// is not a valid transition.
    async fn transition(&self, order_id: &str, expected: OrderState, next: OrderState) -> Result<DomainOrder, WorkflowError>;

    /// Overwrite the non-state fields of an order.
    async fn update(&self, order: &DomainOrder) -> Result<(), WorkflowError>;
}

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get(&self, domain_id: &str) -> Result<Option<DomainRecord>, WorkflowError>;

    async fn put(&self, domain: DomainRecord) -> Result<(), WorkflowError>;
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> WorkflowError {
    WorkflowError::Store("store lock poisoned".into())
}

// ─── In-memory implementations ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, DomainOrder>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: DomainOrder) -> Result<(), WorkflowError> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        if orders.contains_key(&order.order_id) {
            return Err(WorkflowError::Store(format!("order {} already exists", order.order_id)));
        }
        orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<DomainOrder>, WorkflowError> {
        Ok(self.orders.lock().map_err(poisoned)?.get(order_id).cloned())
    }

    async fn transition(&self, order_id: &str, expected: OrderState, next: OrderState) -> Result<DomainOrder, WorkflowError> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))?;
        if order.state != expected || !expected.can_transition_to(next) {
            return Err(WorkflowError::conflict(order_id, expected, order.state));
        }
        order.state = next;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn update(&self, order: &DomainOrder) -> Result<(), WorkflowError> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        let stored = orders
            .get_mut(&order.order_id)
            .ok_or_else(|| WorkflowError::OrderNotFound(order.order_id.clone()))?;
        let state = stored.state;
        *stored = order.clone();
        stored.state = state;
        stored.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDomainStore {
    domains: Mutex<HashMap<String, DomainRecord>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains(domains: impl IntoIterator<Item = DomainRecord>) -> Self {
        let store = Self::default();
        if let Ok(mut map) = store.domains.lock() {
            map.extend(domains.into_iter().map(|d| (d.domain_id.clone(), d)));
        }
        store
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn get(&self, domain_id: &str) -> Result<Option<DomainRecord>, WorkflowError> {
        Ok(self.domains.lock().map_err(poisoned)?.get(domain_id).cloned())
    }

    async fn put(&self, domain: DomainRecord) -> Result<(), WorkflowError> {
        self.domains.lock().map_err(poisoned)?.insert(domain.domain_id.clone(), domain);
        Ok(())
    }
}

/// Billing that issues uuid order and invoice ids. Orders become active once
/// [`MemoryBilling::mark_paid`] is called.
#[derive(Default)]
pub struct MemoryBilling {
    paid: Mutex<HashSet<String>>,
    invoices: Mutex<Vec<String>>,
}

impl MemoryBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_paid(&self, order_id: &str) {
        if let Ok(mut paid) = self.paid.lock() {
            paid.insert(order_id.to_string());
        }
    }

    /// Every invoice issued so far, in order.
    pub fn invoices(&self) -> Vec<String> {
        self.invoices.lock().map(|i| i.clone()).unwrap_or_default()
    }

    fn issue(&self, prefix: &str) -> Result<String, WorkflowError> {
        let invoice_id = format!("{}_{}", prefix, uuid::Uuid::new_v4().simple());
        self.invoices
            .lock()
            .map_err(|_| WorkflowError::Billing("invoice ledger poisoned".into()))?
            .push(invoice_id.clone());
        Ok(invoice_id)
    }
}

#[async_trait]
impl BillingGateway for MemoryBilling {
    async fn create_order(&self, customer_id: &str, request: &OrderRequest) -> Result<BillingOrder, WorkflowError> {
        let order_id = format!("ord_{}", uuid::Uuid::new_v4().simple());
        let invoice_id = self.issue("inv")?;
        tracing::debug!(customer_id, domain = request.domain_name(), %order_id, "billing order created");
        Ok(BillingOrder { order_id, invoice_id })
    }

    async fn create_renewal_invoice(&self, domain: &DomainRecord, years: u32) -> Result<String, WorkflowError> {
        let invoice_id = self.issue("rnw")?;
        tracing::debug!(domain = %domain.domain_name, years, %invoice_id, "renewal invoice created");
        Ok(invoice_id)
    }

    async fn is_order_active(&self, order_id: &str) -> Result<bool, WorkflowError> {
        let paid = self
            .paid
            .lock()
            .map_err(|_| WorkflowError::Billing("payment ledger poisoned".into()))?;
        Ok(paid.contains(order_id))
    }
}

/// Provisioning that records each activation.
#[derive(Default)]
pub struct MemoryProvisioning {
    activated: Mutex<Vec<String>>,
}

impl MemoryProvisioning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activations(&self) -> Vec<String> {
        self.activated.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProvisioningGateway for MemoryProvisioning {
    async fn activate(&self, order: &DomainOrder) -> Result<(), WorkflowError> {
        self.activated
            .lock()
            .map_err(|_| WorkflowError::Provisioning("activation ledger poisoned".into()))?
            .push(order.order_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pending_order;

    #[tokio::test]
    async fn transition_is_compare_and_swap() {
        let store = MemoryOrderStore::new();
        store.insert(pending_order("ord_1", "example.com")).await.unwrap();

        let moved = store
            .transition("ord_1", OrderState::AwaitingPayment, OrderState::Registering)
            .await
            .unwrap();
        assert_eq!(moved.state, OrderState::Registering);

        let err = store
            .transition("ord_1", OrderState::AwaitingPayment, OrderState::Registering)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { actual: OrderState::Registering, .. }));
    }

    #[tokio::test]
    async fn invalid_moves_are_rejected_even_when_state_matches() {
        let store = MemoryOrderStore::new();
        store.insert(pending_order("ord_1", "example.com")).await.unwrap();
        let err = store
            .transition("ord_1", OrderState::AwaitingPayment, OrderState::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn update_keeps_the_stored_state() {
        let store = MemoryOrderStore::new();
        store.insert(pending_order("ord_1", "example.com")).await.unwrap();
        let mut changed = pending_order("ord_1", "example.com");
        changed.state = OrderState::Completed;
        changed.registrar_reference = Some("R-1".into());
        store.update(&changed).await.unwrap();

        let stored = store.get("ord_1").await.unwrap().unwrap();
        assert_eq!(stored.state, OrderState::AwaitingPayment);
        assert_eq!(stored.registrar_reference.as_deref(), Some("R-1"));
    }

    #[tokio::test]
    async fn billing_tracks_payment() {
        let billing = MemoryBilling::new();
        assert!(!billing.is_order_active("ord_x").await.unwrap());
        billing.mark_paid("ord_x");
        assert!(billing.is_order_active("ord_x").await.unwrap());
    }
}
