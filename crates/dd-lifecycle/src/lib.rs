//! Domain order lifecycle.
//!
//! Workflows that take a domain from order to registration, provisioning and
//! renewal on top of a [`RegistrarClient`]. Workflow state lives in the
//! [`OrderStore`] and [`DomainStore`]; the workflow types themselves hold
//! nothing between calls.
//!
//! Guarantees:
//! - a paid order triggers at most one `register_domain` (or
//!   `transfer_domain`) call, however often payment is reported;
//! - an auto-renewal sweep renews a given expiration at most once;
//! - only registrar reads are retried, and only on transport failures.

use std::sync::Arc;

use dd_registrar::RegistrarClient;

pub mod collaborators;
pub mod error;
pub mod file_store;
pub mod locks;
pub mod provisioning;
pub mod registration;
pub mod renewal;
pub mod retry;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::{
    BillingGateway, BillingOrder, DomainStore, MemoryBilling, MemoryDomainStore, MemoryOrderStore, MemoryProvisioning,
    OrderStore, ProvisioningGateway,
};
pub use error::WorkflowError;
pub use file_store::FileDomainStore;
pub use locks::KeyedLocks;
pub use provisioning::ProvisioningWorkflow;
pub use registration::{RegistrationInput, RegistrationWorkflow};
pub use renewal::RenewalWorkflow;
pub use retry::RetryPolicy;
pub use state::{
    DomainOrder, DomainRecord, FailureDetail, NextAction, OrderRequest, OrderState, RenewalMarker, WorkflowResult,
    WorkflowStatus,
};

/// Everything a workflow talks to. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowContext {
    pub registrar: Arc<dyn RegistrarClient>,
    pub billing: Arc<dyn BillingGateway>,
    pub provisioning: Arc<dyn ProvisioningGateway>,
    pub orders: Arc<dyn OrderStore>,
    pub domains: Arc<dyn DomainStore>,
    pub locks: KeyedLocks,
    pub retry: RetryPolicy,
    /// How far ahead of expiration auto-renewal kicks in.
    pub renewal_window: chrono::Duration,
}

impl WorkflowContext {
    /// In-memory collaborators around `registrar`.
    pub fn in_memory(registrar: Arc<dyn RegistrarClient>) -> Self {
        Self {
            registrar,
            billing: Arc::new(MemoryBilling::new()),
            provisioning: Arc::new(MemoryProvisioning::new()),
            orders: Arc::new(MemoryOrderStore::new()),
            domains: Arc::new(MemoryDomainStore::new()),
            locks: KeyedLocks::new(),
            retry: RetryPolicy::default(),
            renewal_window: chrono::Duration::days(30),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_renewal_window(mut self, window: chrono::Duration) -> Self {
        self.renewal_window = window;
        self
    }

    pub fn with_domains(mut self, domains: Arc<dyn DomainStore>) -> Self {
        self.domains = domains;
        self
    }
}
